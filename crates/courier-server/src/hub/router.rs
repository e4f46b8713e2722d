//! Routing rules: which live connections receive a message.

use courier_core::{Message, Role};

use super::connection::Connection;

/// Whether `connection` should receive `message`.
///
/// Agents receive everything for their website; visitors receive everything
/// for their conversation. Pure predicate — delivery (and its
/// enqueue-or-evict consequences) belongs to the hub.
#[must_use]
pub fn matches(connection: &Connection, message: &Message) -> bool {
    match connection.role {
        Role::Agent => connection.website_id.as_str() == message.website_id,
        Role::Visitor => connection
            .conversation_id
            .as_ref()
            .is_some_and(|c| c.as_str() == message.conversation_id),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc;

    fn visitor(conversation: &str) -> Connection {
        let (tx, _rx) = mpsc::channel(4);
        Connection::visitor("v1".into(), "w1".into(), conversation.into(), tx)
    }

    fn agent(website: &str) -> Connection {
        let (tx, _rx) = mpsc::channel(4);
        Connection::agent("a1".into(), website.into(), tx)
    }

    fn chat(website: &str, conversation: &str) -> Message {
        serde_json::from_value(serde_json::json!({
            "type": "chat",
            "website_id": website,
            "conversation_id": conversation,
            "sender_type": "visitor",
            "sender_id": "v1",
            "content": "hi",
            "timestamp": 1,
        }))
        .unwrap()
    }

    #[test]
    fn agent_matches_its_website() {
        assert!(matches(&agent("w1"), &chat("w1", "c1")));
    }

    #[test]
    fn agent_ignores_other_websites() {
        assert!(!matches(&agent("w2"), &chat("w1", "c1")));
    }

    #[test]
    fn agent_matches_regardless_of_conversation() {
        assert!(matches(&agent("w1"), &chat("w1", "c-any")));
    }

    #[test]
    fn visitor_matches_its_conversation() {
        assert!(matches(&visitor("c1"), &chat("w1", "c1")));
    }

    #[test]
    fn visitor_ignores_other_conversations() {
        assert!(!matches(&visitor("c2"), &chat("w1", "c1")));
    }

    #[test]
    fn visitor_matches_across_websites_by_conversation_only() {
        // Conversation identity is what binds a visitor, not the website.
        assert!(matches(&visitor("c1"), &chat("w-other", "c1")));
    }

    #[test]
    fn empty_conversation_never_matches_a_visitor() {
        assert!(!matches(&visitor("c1"), &chat("w1", "")));
    }
}
