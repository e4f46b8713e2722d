//! Coordinated shutdown across the listener, bridge, and session tasks.

use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Fans one shutdown signal out to every long-running task and bounds how
/// long the process waits for them to finish.
pub struct ShutdownCoordinator {
    token: CancellationToken,
}

impl ShutdownCoordinator {
    /// Create a coordinator in the running state.
    #[must_use]
    pub fn new() -> Self {
        Self {
            token: CancellationToken::new(),
        }
    }

    /// A token tasks can await; cancelled once shutdown is triggered.
    #[must_use]
    pub fn token(&self) -> CancellationToken {
        self.token.clone()
    }

    /// Signal shutdown. Safe to call more than once.
    pub fn trigger(&self) {
        self.token.cancel();
    }

    /// Whether shutdown has been signalled.
    #[must_use]
    pub fn is_triggered(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Trigger shutdown and wait up to `timeout` for the given task handles
    /// to complete. Tasks still running after the deadline are left to die
    /// with the process.
    pub async fn drain(&self, handles: Vec<JoinHandle<()>>, timeout: Duration) {
        self.trigger();
        info!(
            task_count = handles.len(),
            timeout_secs = timeout.as_secs(),
            "draining tasks for shutdown"
        );
        let all = futures::future::join_all(handles);
        if tokio::time::timeout(timeout, all).await.is_err() {
            warn!(timeout_secs = timeout.as_secs(), "shutdown drain timed out");
        }
    }
}

impl Default for ShutdownCoordinator {
    fn default() -> Self {
        Self::new()
    }
}
