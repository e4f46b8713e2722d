//! # courier-broker
//!
//! The contract between the relay and the external pub/sub broker that a
//! separate backend listens on:
//!
//! - [`MessageBroker`] — publish/subscribe over named topics
//! - [`topics`] — the well-known topic names
//! - [`ReadReceipt`] — the reduced event shape published for read receipts
//! - [`MemoryBroker`] — in-process implementation for tests and
//!   single-process deployments
//!
//! The broker is constructed once at startup and injected wherever it is
//! needed; nothing in the relay reaches for it as ambient global state.

#![deny(unsafe_code)]

use std::collections::HashMap;

use async_trait::async_trait;
use futures::stream::{BoxStream, StreamExt};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::broadcast;
use tokio_stream::wrappers::BroadcastStream;

use courier_core::Message;

/// Well-known topic names shared with the backend.
pub mod topics {
    /// Chat lines published for persistence.
    pub const CHAT_MESSAGES: &str = "chat_messages";
    /// Read receipts published for the backend to mark conversations read.
    pub const MESSAGE_READ: &str = "message_read";
    /// Agent-originated events delivered from the backend into the relay.
    pub const AGENT_MESSAGES: &str = "agent_messages";
}

/// Errors surfaced by a broker implementation.
#[derive(Debug, Error)]
pub enum BrokerError {
    /// The broker connection could not be established or was lost.
    #[error("broker connection failed: {0}")]
    Connection(String),
    /// A publish was rejected or could not be delivered to the broker.
    #[error("publish to '{topic}' failed: {reason}")]
    Publish {
        /// Topic the publish targeted.
        topic: String,
        /// Implementation-specific failure description.
        reason: String,
    },
    /// A subscription could not be established.
    #[error("subscribe to '{topic}' failed: {reason}")]
    Subscribe {
        /// Topic the subscription targeted.
        topic: String,
        /// Implementation-specific failure description.
        reason: String,
    },
}

/// A lazy sequence of raw payloads delivered on one topic.
pub type PayloadStream = BoxStream<'static, String>;

/// Pub/sub transport to the backend. Implementations must be cheap to share
/// (`Arc<dyn MessageBroker>`) and safe to call from any task.
#[async_trait]
pub trait MessageBroker: Send + Sync {
    /// Publish one serialized payload on `topic`. Publishing to a topic with
    /// no subscribers succeeds.
    async fn publish(&self, topic: &str, payload: String) -> Result<(), BrokerError>;

    /// Open a subscription on `topic`, yielding each delivered payload.
    async fn subscribe(&self, topic: &str) -> Result<PayloadStream, BrokerError>;
}

/// The reduced event shape published on [`topics::MESSAGE_READ`]: enough for
/// the backend to mark a conversation read up to now, deliberately unbound
/// from individual message IDs.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReadReceipt {
    /// Always `"read"`.
    #[serde(rename = "type")]
    pub kind: String,
    /// Conversation being acknowledged.
    pub conversation_id: String,
    /// Role of the reader.
    pub sender_type: String,
    /// Reader's own identifier.
    pub sender_id: String,
}

impl ReadReceipt {
    /// Reduce a full `read` message to the receipt shape.
    #[must_use]
    pub fn from_message(message: &Message) -> Self {
        Self {
            kind: "read".to_owned(),
            conversation_id: message.conversation_id.clone(),
            sender_type: message.sender_type.clone(),
            sender_id: message.sender_id.clone(),
        }
    }
}

/// In-process broker backed by one `tokio::sync::broadcast` channel per
/// topic. Slow subscribers that lag past the channel capacity lose the
/// oldest payloads, mirroring the fire-and-forget delivery of a real
/// pub/sub broker.
pub struct MemoryBroker {
    channels: Mutex<HashMap<String, broadcast::Sender<String>>>,
    capacity: usize,
}

impl MemoryBroker {
    /// Default per-topic buffer capacity.
    pub const DEFAULT_CAPACITY: usize = 256;

    /// Create a broker with the default per-topic capacity.
    #[must_use]
    pub fn new() -> Self {
        Self::with_capacity(Self::DEFAULT_CAPACITY)
    }

    /// Create a broker with an explicit per-topic capacity.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            channels: Mutex::new(HashMap::new()),
            capacity,
        }
    }

    fn channel(&self, topic: &str) -> broadcast::Sender<String> {
        let mut channels = self.channels.lock();
        channels
            .entry(topic.to_owned())
            .or_insert_with(|| broadcast::channel(self.capacity).0)
            .clone()
    }
}

impl Default for MemoryBroker {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl MessageBroker for MemoryBroker {
    async fn publish(&self, topic: &str, payload: String) -> Result<(), BrokerError> {
        // A send error only means nobody is subscribed right now.
        let _ = self.channel(topic).send(payload);
        Ok(())
    }

    async fn subscribe(&self, topic: &str) -> Result<PayloadStream, BrokerError> {
        let rx = self.channel(topic).subscribe();
        let stream = BroadcastStream::new(rx).filter_map(|item| async move {
            match item {
                Ok(payload) => Some(payload),
                Err(err) => {
                    tracing::warn!(error = %err, "memory broker subscriber lagged");
                    None
                }
            }
        });
        Ok(stream.boxed())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use courier_core::MessageType;

    #[tokio::test]
    async fn publish_then_subscribe_round_trip() {
        let broker = MemoryBroker::new();
        let mut stream = broker.subscribe("t1").await.unwrap();
        broker.publish("t1", "payload".to_owned()).await.unwrap();
        assert_eq!(stream.next().await.unwrap(), "payload");
    }

    #[tokio::test]
    async fn publish_without_subscribers_succeeds() {
        let broker = MemoryBroker::new();
        broker.publish("empty", "dropped".to_owned()).await.unwrap();
    }

    #[tokio::test]
    async fn topics_are_independent() {
        let broker = MemoryBroker::new();
        let mut chat = broker.subscribe(topics::CHAT_MESSAGES).await.unwrap();
        let mut read = broker.subscribe(topics::MESSAGE_READ).await.unwrap();

        broker
            .publish(topics::CHAT_MESSAGES, "a chat".to_owned())
            .await
            .unwrap();

        assert_eq!(chat.next().await.unwrap(), "a chat");
        // The read topic saw nothing.
        let pending = tokio::time::timeout(
            std::time::Duration::from_millis(50),
            read.next(),
        )
        .await;
        assert!(pending.is_err());
    }

    #[tokio::test]
    async fn multiple_subscribers_each_receive() {
        let broker = MemoryBroker::new();
        let mut s1 = broker.subscribe("fan").await.unwrap();
        let mut s2 = broker.subscribe("fan").await.unwrap();

        broker.publish("fan", "hello".to_owned()).await.unwrap();

        assert_eq!(s1.next().await.unwrap(), "hello");
        assert_eq!(s2.next().await.unwrap(), "hello");
    }

    #[tokio::test]
    async fn subscription_preserves_order() {
        let broker = MemoryBroker::new();
        let mut stream = broker.subscribe("ordered").await.unwrap();
        for i in 0..5 {
            broker.publish("ordered", format!("m{i}")).await.unwrap();
        }
        for i in 0..5 {
            assert_eq!(stream.next().await.unwrap(), format!("m{i}"));
        }
    }

    #[test]
    fn read_receipt_reduction() {
        let raw = r#"{
            "type": "read",
            "website_id": "w1",
            "conversation_id": "c1",
            "sender_type": "visitor",
            "sender_id": "v1",
            "content": null,
            "timestamp": 123
        }"#;
        let message: Message = serde_json::from_str(raw).unwrap();
        assert_eq!(message.kind, MessageType::Read);

        let receipt = ReadReceipt::from_message(&message);
        let value: serde_json::Value = serde_json::to_value(&receipt).unwrap();
        let obj = value.as_object().unwrap();
        assert_eq!(obj.len(), 4, "receipt must stay reduced: {value}");
        assert_eq!(value["type"], "read");
        assert_eq!(value["conversation_id"], "c1");
        assert_eq!(value["sender_type"], "visitor");
        assert_eq!(value["sender_id"], "v1");
        assert!(obj.get("website_id").is_none());
    }
}
