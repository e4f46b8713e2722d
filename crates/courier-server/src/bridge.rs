//! Bridge between the hub and the external broker.
//!
//! Outbound: persistence-worthy events (chat lines, read receipts) are
//! published on their well-known topics for the backend to consume.
//! Inbound: agent-originated events arrive on their own topic and are routed
//! straight into the hub, bypassing every connection's read loop.
//!
//! A publish or parse failure here is logged and the event dropped; it never
//! terminates a connection or the subscription task.

use std::sync::Arc;

use futures::StreamExt;
use metrics::counter;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use courier_broker::{topics, BrokerError, MessageBroker, PayloadStream, ReadReceipt};
use courier_core::Message;

use crate::hub::Hub;
use crate::metrics::{
    BROKER_INBOUND_EVENTS_TOTAL, BROKER_INBOUND_PARSE_ERRORS_TOTAL, BROKER_PUBLISHES_TOTAL,
    BROKER_PUBLISH_ERRORS_TOTAL,
};

/// Relays events between the hub and the injected broker.
pub struct BrokerBridge {
    broker: Arc<dyn MessageBroker>,
    hub: Arc<Hub>,
}

impl BrokerBridge {
    /// Create a bridge over the given broker and hub.
    pub fn new(broker: Arc<dyn MessageBroker>, hub: Arc<Hub>) -> Self {
        Self { broker, hub }
    }

    /// Publish a chat message on the persistence topic.
    pub async fn publish_chat(&self, message: &Message) {
        let payload = match message.to_json() {
            Ok(json) => json,
            Err(err) => {
                warn!(error = %err, "failed to serialize chat message for the broker");
                return;
            }
        };
        self.publish(topics::CHAT_MESSAGES, payload).await;
    }

    /// Publish the reduced read receipt for a `read` message.
    pub async fn publish_read(&self, message: &Message) {
        let receipt = ReadReceipt::from_message(message);
        let payload = match serde_json::to_string(&receipt) {
            Ok(json) => json,
            Err(err) => {
                warn!(error = %err, "failed to serialize read receipt for the broker");
                return;
            }
        };
        self.publish(topics::MESSAGE_READ, payload).await;
    }

    async fn publish(&self, topic: &'static str, payload: String) {
        match self.broker.publish(topic, payload).await {
            Ok(()) => {
                counter!(BROKER_PUBLISHES_TOTAL, "topic" => topic).increment(1);
            }
            Err(err) => {
                warn!(topic, error = %err, "broker publish failed, event dropped");
                counter!(BROKER_PUBLISH_ERRORS_TOTAL, "topic" => topic).increment(1);
            }
        }
    }

    /// Open the agent-events subscription and spawn the inbound pump.
    ///
    /// Failing to open the subscription is returned to the caller — the
    /// process cannot do its job without it. Once running, individual bad
    /// payloads are dropped and the pump keeps going.
    pub async fn start_inbound(
        self: Arc<Self>,
        cancel: CancellationToken,
    ) -> Result<tokio::task::JoinHandle<()>, BrokerError> {
        let stream = self.broker.subscribe(topics::AGENT_MESSAGES).await?;
        Ok(tokio::spawn(async move {
            self.pump_inbound(stream, cancel).await;
        }))
    }

    /// Drain the inbound subscription until it ends or shutdown is signalled.
    async fn pump_inbound(&self, mut stream: PayloadStream, cancel: CancellationToken) {
        info!(topic = topics::AGENT_MESSAGES, "broker inbound subscription running");
        loop {
            tokio::select! {
                payload = stream.next() => {
                    let Some(payload) = payload else {
                        info!("broker inbound subscription ended");
                        break;
                    };
                    self.route_inbound(&payload);
                }
                () = cancel.cancelled() => {
                    info!("broker inbound subscription stopping for shutdown");
                    break;
                }
            }
        }
    }

    fn route_inbound(&self, payload: &str) {
        let mut message: Message = match serde_json::from_str(payload) {
            Ok(m) => m,
            Err(err) => {
                warn!(error = %err, "failed to parse broker payload, dropping");
                counter!(BROKER_INBOUND_PARSE_ERRORS_TOTAL).increment(1);
                return;
            }
        };
        message.ensure_timestamp();
        debug!(kind = %message.kind, conversation_id = %message.conversation_id, "routing broker event");
        counter!(BROKER_INBOUND_EVENTS_TOTAL).increment(1);
        self.hub.route(&message);
    }
}
