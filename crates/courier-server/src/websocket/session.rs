//! Per-connection read/write discipline.
//!
//! Each accepted connection runs two loops: the read loop (this task) pulls
//! frames off the socket under an inactivity deadline and dispatches them,
//! and a spawned write loop drains the outbound queue onto the socket,
//! coalescing queued frames into one physical write and pinging when idle.
//! Teardown from either side converges on `Hub::unregister`.

use std::sync::Arc;
use std::time::Duration;

use axum::extract::ws::{Message as WsMessage, WebSocket};
use futures::stream::SplitSink;
use futures::{SinkExt, StreamExt};
use metrics::counter;
use tokio::sync::mpsc;
use tokio::time::timeout;
use tracing::{debug, info, instrument, warn};

use courier_core::{Message, MessageType};

use crate::bridge::BrokerBridge;
use crate::config::ServerConfig;
use crate::hub::{Connection, Hub};
use crate::metrics::{WS_DISCONNECTIONS_TOTAL, WS_FRAME_PARSE_ERRORS_TOTAL};

/// The deadlines and ping cadence a session runs under.
#[derive(Clone, Copy, Debug)]
pub struct SessionTimings {
    /// Liveness ping cadence while the outbound queue is idle.
    pub ping_interval: Duration,
    /// How long the read side waits for any inbound frame.
    pub read_timeout: Duration,
    /// Budget for one physical write.
    pub write_timeout: Duration,
}

impl From<&ServerConfig> for SessionTimings {
    fn from(config: &ServerConfig) -> Self {
        Self {
            ping_interval: config.ping_interval(),
            read_timeout: config.read_timeout(),
            write_timeout: config.write_timeout(),
        }
    }
}

/// Run one connection to completion.
///
/// Returns when the socket ends, errors, or stays silent past the read
/// deadline; the connection is then unregistered (closing its queue) and the
/// write task is stopped.
#[instrument(skip_all, fields(conn_id = %connection.id, role = %connection.role))]
pub async fn run(
    socket: WebSocket,
    connection: Arc<Connection>,
    outbound: mpsc::Receiver<Arc<str>>,
    hub: Arc<Hub>,
    bridge: Arc<BrokerBridge>,
    timings: SessionTimings,
) {
    let (ws_tx, mut ws_rx) = socket.split();
    let writer = tokio::spawn(write_loop(
        ws_tx,
        outbound,
        timings.ping_interval,
        timings.write_timeout,
    ));

    loop {
        let frame = match timeout(timings.read_timeout, ws_rx.next()).await {
            Err(_) => {
                info!("read deadline elapsed, closing connection");
                break;
            }
            Ok(None) => break,
            Ok(Some(Err(err))) => {
                debug!(error = %err, "websocket stream error");
                break;
            }
            Ok(Some(Ok(frame))) => frame,
        };

        match frame {
            WsMessage::Text(text) => dispatch(text.as_str(), &connection, &hub, &bridge).await,
            WsMessage::Binary(data) => match std::str::from_utf8(&data) {
                Ok(text) => dispatch(text, &connection, &hub, &bridge).await,
                Err(_) => debug!(len = data.len(), "dropping non-UTF8 binary frame"),
            },
            WsMessage::Close(_) => {
                debug!("client sent close frame");
                break;
            }
            // Any control frame counts as activity; the deadline restarts
            // with the next loop iteration.
            WsMessage::Ping(_) | WsMessage::Pong(_) => {}
        }
    }

    hub.unregister(&connection.id);
    counter!(WS_DISCONNECTIONS_TOTAL, "role" => connection.role.as_str()).increment(1);
    writer.abort();
}

/// Drain the outbound queue onto the socket.
///
/// Frames already queued behind the one just received are coalesced into the
/// same physical write, newline-joined. A closed queue means the hub removed
/// this connection: notify the peer with a Close frame and stop. Every write
/// (pings included) runs under the write deadline.
async fn write_loop(
    mut ws_tx: SplitSink<WebSocket, WsMessage>,
    mut outbound: mpsc::Receiver<Arc<str>>,
    ping_interval: Duration,
    write_timeout: Duration,
) {
    let mut ping = tokio::time::interval(ping_interval);
    // The first tick completes immediately; skip it.
    let _ = ping.tick().await;

    loop {
        tokio::select! {
            frame = outbound.recv() => {
                let Some(first) = frame else {
                    let _ = timeout(write_timeout, ws_tx.send(WsMessage::Close(None))).await;
                    break;
                };
                let mut batch = String::from(&*first);
                while let Ok(next) = outbound.try_recv() {
                    batch.push('\n');
                    batch.push_str(&next);
                }
                match timeout(write_timeout, ws_tx.send(WsMessage::Text(batch.into()))).await {
                    Ok(Ok(())) => {}
                    Ok(Err(err)) => {
                        debug!(error = %err, "write failed, stopping write loop");
                        break;
                    }
                    Err(_) => {
                        warn!("write deadline elapsed, stopping write loop");
                        break;
                    }
                }
                // Payload traffic proves the link; ping only after idleness.
                ping.reset();
            }
            _ = ping.tick() => {
                match timeout(write_timeout, ws_tx.send(WsMessage::Ping(Vec::new().into()))).await {
                    Ok(Ok(())) => {}
                    _ => {
                        debug!("liveness ping failed, stopping write loop");
                        break;
                    }
                }
            }
        }
    }
}

/// Parse one inbound frame and dispatch it by type.
///
/// A frame that fails to parse is logged and dropped; the connection lives
/// on. `chat` is published for persistence then routed live; `typing` is
/// routed live only; `read` publishes its receipt then routes live. Other
/// types (including `system`) are ignored.
async fn dispatch(text: &str, connection: &Connection, hub: &Hub, bridge: &BrokerBridge) {
    let mut message: Message = match serde_json::from_str(text) {
        Ok(m) => m,
        Err(err) => {
            warn!(error = %err, "failed to parse inbound frame, dropping");
            counter!(WS_FRAME_PARSE_ERRORS_TOTAL).increment(1);
            return;
        }
    };
    message.ensure_timestamp();

    match message.kind {
        MessageType::Chat => {
            bridge.publish_chat(&message).await;
            hub.route(&message);
        }
        MessageType::Typing => hub.route(&message),
        MessageType::Read => {
            bridge.publish_read(&message).await;
            hub.route(&message);
        }
        MessageType::System | MessageType::Other(_) => {
            debug!(kind = %message.kind, conn_id = %connection.id, "ignoring frame with unhandled type");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use tokio::time::timeout as tokio_timeout;

    use courier_broker::{topics, MemoryBroker, MessageBroker};

    fn rig() -> (Arc<MemoryBroker>, Arc<Hub>, Arc<BrokerBridge>) {
        let broker = Arc::new(MemoryBroker::new());
        let hub = Arc::new(Hub::new());
        let bridge = Arc::new(BrokerBridge::new(broker.clone(), hub.clone()));
        (broker, hub, bridge)
    }

    fn visitor(conversation: &str) -> (Arc<Connection>, mpsc::Receiver<Arc<str>>) {
        let (tx, rx) = mpsc::channel(32);
        let conn = Connection::visitor("v1".into(), "w1".into(), conversation.into(), tx);
        (Arc::new(conn), rx)
    }

    fn agent(website: &str) -> (Arc<Connection>, mpsc::Receiver<Arc<str>>) {
        let (tx, rx) = mpsc::channel(32);
        let conn = Connection::agent("a1".into(), website.into(), tx);
        (Arc::new(conn), rx)
    }

    const CHAT_FRAME: &str = r#"{
        "type": "chat",
        "website_id": "w1",
        "conversation_id": "c1",
        "sender_type": "visitor",
        "sender_id": "v1",
        "content": "hi",
        "timestamp": 0
    }"#;

    #[tokio::test]
    async fn chat_is_published_and_routed() {
        let (broker, hub, bridge) = rig();
        let (sender, _sender_rx) = visitor("c1");
        let (listener, mut listener_rx) = agent("w1");
        hub.register(listener);
        let mut chats = broker.subscribe(topics::CHAT_MESSAGES).await.unwrap();

        dispatch(CHAT_FRAME, &sender, &hub, &bridge).await;

        let published = tokio_timeout(Duration::from_secs(1), chats.next())
            .await
            .unwrap()
            .unwrap();
        let published: serde_json::Value = serde_json::from_str(&published).unwrap();
        assert_eq!(published["content"], "hi");

        let routed = listener_rx.try_recv().unwrap();
        let routed: serde_json::Value = serde_json::from_str(&routed).unwrap();
        assert_eq!(routed["content"], "hi");
    }

    #[tokio::test]
    async fn chat_timestamp_is_defaulted_before_forwarding() {
        let (broker, hub, bridge) = rig();
        let (sender, _sender_rx) = visitor("c1");
        let mut chats = broker.subscribe(topics::CHAT_MESSAGES).await.unwrap();

        let before = courier_core::message::now_unix();
        dispatch(CHAT_FRAME, &sender, &hub, &bridge).await;

        let published = tokio_timeout(Duration::from_secs(1), chats.next())
            .await
            .unwrap()
            .unwrap();
        let published: serde_json::Value = serde_json::from_str(&published).unwrap();
        assert!(published["timestamp"].as_i64().unwrap() >= before);
    }

    #[tokio::test]
    async fn typing_routes_without_publishing() {
        let (broker, hub, bridge) = rig();
        let (sender, _sender_rx) = visitor("c1");
        let (listener, mut listener_rx) = agent("w1");
        hub.register(listener);
        let mut chats = broker.subscribe(topics::CHAT_MESSAGES).await.unwrap();
        let mut reads = broker.subscribe(topics::MESSAGE_READ).await.unwrap();

        let frame = r#"{"type":"typing","website_id":"w1","conversation_id":"c1","sender_type":"visitor","sender_id":"v1"}"#;
        dispatch(frame, &sender, &hub, &bridge).await;

        assert!(listener_rx.try_recv().is_ok());
        assert!(
            tokio_timeout(Duration::from_millis(50), chats.next()).await.is_err(),
            "typing must never reach the chat topic"
        );
        assert!(tokio_timeout(Duration::from_millis(50), reads.next()).await.is_err());
    }

    #[tokio::test]
    async fn read_publishes_receipt_and_routes() {
        let (broker, hub, bridge) = rig();
        let (sender, _sender_rx) = visitor("c1");
        let (listener, mut listener_rx) = agent("w1");
        hub.register(listener);
        let mut reads = broker.subscribe(topics::MESSAGE_READ).await.unwrap();

        let frame = r#"{"type":"read","website_id":"w1","conversation_id":"c1","sender_type":"visitor","sender_id":"v1"}"#;
        dispatch(frame, &sender, &hub, &bridge).await;

        let receipt = tokio_timeout(Duration::from_secs(1), reads.next())
            .await
            .unwrap()
            .unwrap();
        let receipt: serde_json::Value = serde_json::from_str(&receipt).unwrap();
        assert_eq!(receipt["type"], "read");
        assert_eq!(receipt["conversation_id"], "c1");
        assert!(receipt.get("website_id").is_none());

        assert!(listener_rx.try_recv().is_ok());
    }

    #[tokio::test]
    async fn malformed_frame_is_dropped_quietly() {
        let (broker, hub, bridge) = rig();
        let (sender, _sender_rx) = visitor("c1");
        let (listener, mut listener_rx) = agent("w1");
        hub.register(listener);
        let mut chats = broker.subscribe(topics::CHAT_MESSAGES).await.unwrap();

        dispatch("{ not json", &sender, &hub, &bridge).await;

        assert!(listener_rx.try_recv().is_err());
        assert!(tokio_timeout(Duration::from_millis(50), chats.next()).await.is_err());
    }

    #[tokio::test]
    async fn unknown_type_is_ignored() {
        let (broker, hub, bridge) = rig();
        let (sender, _sender_rx) = visitor("c1");
        let (listener, mut listener_rx) = agent("w1");
        hub.register(listener);
        let mut chats = broker.subscribe(topics::CHAT_MESSAGES).await.unwrap();

        let frame = r#"{"type":"presence","website_id":"w1","conversation_id":"c1"}"#;
        dispatch(frame, &sender, &hub, &bridge).await;

        assert!(listener_rx.try_recv().is_err());
        assert!(tokio_timeout(Duration::from_millis(50), chats.next()).await.is_err());
    }

    #[tokio::test]
    async fn system_frames_from_clients_are_ignored() {
        let (_broker, hub, bridge) = rig();
        let (sender, _sender_rx) = visitor("c1");
        let (listener, mut listener_rx) = agent("w1");
        hub.register(listener);

        let frame = r#"{"type":"system","website_id":"w1","conversation_id":"c1","content":"spoof"}"#;
        dispatch(frame, &sender, &hub, &bridge).await;

        assert!(listener_rx.try_recv().is_err());
    }

    #[test]
    fn timings_from_config() {
        let config = ServerConfig::default();
        let timings = SessionTimings::from(&config);
        assert_eq!(timings.ping_interval, Duration::from_secs(54));
        assert_eq!(timings.read_timeout, Duration::from_secs(60));
        assert_eq!(timings.write_timeout, Duration::from_secs(10));
    }
}
