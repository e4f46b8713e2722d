//! The hub: the single source of truth for which connections are alive.

use std::collections::HashMap;
use std::sync::Arc;

use metrics::{counter, gauge};
use parking_lot::Mutex;
use tracing::{debug, info, warn};

use courier_core::{ConnectionId, Message, Role};

use super::connection::{Connection, SendOutcome};
use super::router;
use crate::metrics::{HUB_EVICTIONS_TOTAL, MESSAGES_ROUTED_TOTAL, WS_CONNECTIONS_ACTIVE};

/// Live-connection counts by role, as reported on `/health`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct HubCounts {
    /// All live connections.
    pub total: usize,
    /// Live visitor connections.
    pub visitors: usize,
    /// Live agent connections.
    pub agents: usize,
}

/// Concurrent registry of live connections.
///
/// One mutex guards the whole live set; `register`, `unregister`, and
/// `broadcast` each take it for their full duration, so fan-out never
/// observes a connection mid-add or mid-removal. Nothing suspends while the
/// lock is held — delivery inside `broadcast` is a non-blocking enqueue, and
/// a connection that cannot take the frame is evicted on the spot.
pub struct Hub {
    connections: Mutex<HashMap<ConnectionId, Arc<Connection>>>,
}

impl Hub {
    /// Create an empty hub.
    #[must_use]
    pub fn new() -> Self {
        Self {
            connections: Mutex::new(HashMap::new()),
        }
    }

    /// Add a connection to the live set. It becomes a fan-out target the
    /// moment this returns.
    pub fn register(&self, connection: Arc<Connection>) {
        let mut connections = self.connections.lock();
        info!(
            conn_id = %connection.id,
            peer_id = %connection.peer_id,
            role = %connection.role,
            website_id = %connection.website_id,
            "client connected"
        );
        let _ = connections.insert(connection.id.clone(), connection);
        gauge!(WS_CONNECTIONS_ACTIVE).set(approx_len(&connections));
    }

    /// Remove a connection if present and close its outbound queue. Calling
    /// this twice for the same connection is a no-op the second time.
    pub fn unregister(&self, id: &ConnectionId) {
        let mut connections = self.connections.lock();
        if let Some(connection) = connections.remove(id) {
            let _ = connection.close();
            info!(conn_id = %id, peer_id = %connection.peer_id, "client disconnected");
            gauge!(WS_CONNECTIONS_ACTIVE).set(approx_len(&connections));
        }
    }

    /// Fan one serialized payload out to every live connection satisfying
    /// `predicate`, using a non-blocking enqueue. A connection whose queue
    /// is full is treated as dead: its queue is closed and it is removed
    /// from the live set within this same call.
    pub fn broadcast<F>(&self, predicate: F, payload: &Arc<str>)
    where
        F: Fn(&Connection) -> bool,
    {
        let mut connections = self.connections.lock();
        let mut dead: Vec<ConnectionId> = Vec::new();

        for (id, connection) in connections.iter() {
            if !predicate(connection) {
                continue;
            }
            match connection.enqueue(Arc::clone(payload)) {
                SendOutcome::Sent => {}
                SendOutcome::Full => {
                    warn!(conn_id = %id, "outbound queue full, evicting slow consumer");
                    let _ = connection.close();
                    counter!(HUB_EVICTIONS_TOTAL).increment(1);
                    dead.push(id.clone());
                }
                SendOutcome::Closed => {
                    debug!(conn_id = %id, "outbound queue already closed, dropping from live set");
                    dead.push(id.clone());
                }
            }
        }

        for id in dead {
            let _ = connections.remove(&id);
        }
        gauge!(WS_CONNECTIONS_ACTIVE).set(approx_len(&connections));
    }

    /// Serialize `message` once and deliver it to every connection the
    /// routing rules select: agents on the message's website, visitors in
    /// the message's conversation.
    pub fn route(&self, message: &Message) {
        let payload: Arc<str> = match serde_json::to_string(message) {
            Ok(json) => Arc::from(json),
            Err(err) => {
                warn!(kind = %message.kind, error = %err, "failed to serialize message for routing");
                return;
            }
        };
        counter!(MESSAGES_ROUTED_TOTAL, "type" => message.kind.as_str().to_owned()).increment(1);
        self.broadcast(|connection| router::matches(connection, message), &payload);
    }

    /// Live counts by role.
    #[must_use]
    pub fn counts(&self) -> HubCounts {
        let connections = self.connections.lock();
        let mut counts = HubCounts {
            total: connections.len(),
            ..HubCounts::default()
        };
        for connection in connections.values() {
            match connection.role {
                Role::Visitor => counts.visitors += 1,
                Role::Agent => counts.agents += 1,
            }
        }
        counts
    }

    /// Number of live connections.
    #[must_use]
    pub fn len(&self) -> usize {
        self.connections.lock().len()
    }

    /// Whether the live set is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.connections.lock().is_empty()
    }

    /// Whether a connection is currently live.
    #[must_use]
    pub fn contains(&self, id: &ConnectionId) -> bool {
        self.connections.lock().contains_key(id)
    }
}

impl Default for Hub {
    fn default() -> Self {
        Self::new()
    }
}

#[allow(clippy::cast_precision_loss)]
fn approx_len(connections: &HashMap<ConnectionId, Arc<Connection>>) -> f64 {
    connections.len() as f64
}
