//! One live client connection as the hub sees it.

use std::sync::Arc;
use std::time::Instant;

use parking_lot::Mutex;
use tokio::sync::mpsc;

use courier_core::{ConnectionId, ConversationId, PeerId, Role, WebsiteId};

/// Result of a non-blocking enqueue onto a connection's outbound queue.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SendOutcome {
    /// The frame was queued.
    Sent,
    /// The queue is at capacity; the consumer is not draining.
    Full,
    /// The queue was already closed.
    Closed,
}

/// A registered connection: identity fixed at accept time plus the sending
/// half of its outbound queue.
///
/// The sender lives behind a `Mutex<Option<..>>` so that closing the queue
/// (on unregister or eviction) happens exactly once; after [`close`] the
/// queue can never be written to again and the write loop observes `None`
/// on its next receive.
///
/// [`close`]: Connection::close
pub struct Connection {
    /// Unique registry key, generated at accept time.
    pub id: ConnectionId,
    /// The connecting party's own identifier (visitor ID or agent ID).
    pub peer_id: PeerId,
    /// Which population this connection belongs to.
    pub role: Role,
    /// Website scope.
    pub website_id: WebsiteId,
    /// Conversation scope; present for visitors only.
    pub conversation_id: Option<ConversationId>,
    /// When the connection was accepted.
    pub connected_at: Instant,
    outbound: Mutex<Option<mpsc::Sender<Arc<str>>>>,
}

impl Connection {
    /// Create a visitor connection bound to one conversation.
    #[must_use]
    pub fn visitor(
        peer_id: PeerId,
        website_id: WebsiteId,
        conversation_id: ConversationId,
        tx: mpsc::Sender<Arc<str>>,
    ) -> Self {
        Self {
            id: ConnectionId::new(),
            peer_id,
            role: Role::Visitor,
            website_id,
            conversation_id: Some(conversation_id),
            connected_at: Instant::now(),
            outbound: Mutex::new(Some(tx)),
        }
    }

    /// Create an agent connection scoped to one website.
    #[must_use]
    pub fn agent(peer_id: PeerId, website_id: WebsiteId, tx: mpsc::Sender<Arc<str>>) -> Self {
        Self {
            id: ConnectionId::new(),
            peer_id,
            role: Role::Agent,
            website_id,
            conversation_id: None,
            connected_at: Instant::now(),
            outbound: Mutex::new(Some(tx)),
        }
    }

    /// Attempt a non-blocking enqueue of one serialized frame.
    pub fn enqueue(&self, frame: Arc<str>) -> SendOutcome {
        let guard = self.outbound.lock();
        let Some(tx) = guard.as_ref() else {
            return SendOutcome::Closed;
        };
        match tx.try_send(frame) {
            Ok(()) => SendOutcome::Sent,
            Err(mpsc::error::TrySendError::Full(_)) => SendOutcome::Full,
            Err(mpsc::error::TrySendError::Closed(_)) => SendOutcome::Closed,
        }
    }

    /// Close the outbound queue. Returns `true` only on the first call;
    /// subsequent calls are no-ops.
    pub fn close(&self) -> bool {
        self.outbound.lock().take().is_some()
    }

    /// Whether the outbound queue has been closed.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.outbound.lock().is_none()
    }
}
