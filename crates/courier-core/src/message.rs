//! The wire envelope exchanged with WebSocket clients and the broker.
//!
//! The JSON shape is fixed: `type`, `website_id`, `conversation_id`,
//! `sender_type`, `sender_id`, `content`, `timestamp` (unix seconds). Every
//! field except `type` tolerates absence and parses as its zero value, so a
//! minimal producer can send just `{"type": "typing", ...}`.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Which population a connection belongs to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// A website visitor, scoped to one conversation.
    Visitor,
    /// A support agent, scoped to one website.
    Agent,
}

impl Role {
    /// Wire representation of the role.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Visitor => "visitor",
            Self::Agent => "agent",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Message discriminator. Unknown values survive a parse/serialize round
/// trip unchanged.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum MessageType {
    /// A chat line; persisted via the broker and routed live.
    Chat,
    /// A typing indicator; routed live only, never persisted.
    Typing,
    /// A read receipt; forwarded to the broker and routed live.
    Read,
    /// Server-originated notice (e.g. the connect confirmation).
    System,
    /// Anything this relay does not recognize.
    Other(String),
}

impl MessageType {
    /// Wire representation of the type.
    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::Chat => "chat",
            Self::Typing => "typing",
            Self::Read => "read",
            Self::System => "system",
            Self::Other(s) => s,
        }
    }
}

impl From<String> for MessageType {
    fn from(s: String) -> Self {
        match s.as_str() {
            "chat" => Self::Chat,
            "typing" => Self::Typing,
            "read" => Self::Read,
            "system" => Self::System,
            _ => Self::Other(s),
        }
    }
}

impl From<MessageType> for String {
    fn from(t: MessageType) -> Self {
        match t {
            MessageType::Other(s) => s,
            other => other.as_str().to_owned(),
        }
    }
}

impl fmt::Display for MessageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One relay message, treated as an immutable value once parsed (the only
/// permitted mutation is [`Message::ensure_timestamp`] before routing).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Message {
    /// Message discriminator.
    #[serde(rename = "type")]
    pub kind: MessageType,
    /// Website the message belongs to.
    #[serde(default)]
    pub website_id: String,
    /// Conversation the message belongs to.
    #[serde(default)]
    pub conversation_id: String,
    /// Role of the sender (`visitor`, `agent`, `system`).
    #[serde(default)]
    pub sender_type: String,
    /// Sender's own identifier.
    #[serde(default)]
    pub sender_id: String,
    /// Opaque payload; carried verbatim.
    #[serde(default)]
    pub content: serde_json::Value,
    /// Unix seconds. Zero means "not set by the producer".
    #[serde(default)]
    pub timestamp: i64,
}

impl Message {
    /// Build the `system` welcome notice sent on every successful connect.
    #[must_use]
    pub fn system(website_id: &str, conversation_id: &str, content: &str) -> Self {
        Self {
            kind: MessageType::System,
            website_id: website_id.to_owned(),
            conversation_id: conversation_id.to_owned(),
            sender_type: "system".to_owned(),
            sender_id: "0".to_owned(),
            content: serde_json::Value::String(content.to_owned()),
            timestamp: now_unix(),
        }
    }

    /// Populate `timestamp` with the current time if the producer left it
    /// zero. Every message passes through this before routing or forwarding.
    pub fn ensure_timestamp(&mut self) {
        if self.timestamp == 0 {
            self.timestamp = now_unix();
        }
    }

    /// Serialize to the wire JSON.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

/// Current unix time in seconds.
#[must_use]
pub fn now_unix() -> i64 {
    chrono::Utc::now().timestamp()
}
