//! `/health` endpoint body.

use std::time::Instant;

use serde::Serialize;

use crate::hub::HubCounts;

/// Health check response.
#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    /// Always `"ok"` while the process is serving.
    pub status: String,
    /// Seconds since startup.
    pub uptime_secs: u64,
    /// All live connections.
    pub connections: usize,
    /// Live visitor connections.
    pub visitors: usize,
    /// Live agent connections.
    pub agents: usize,
}

/// Build a health response from live counters.
#[must_use]
pub fn health_check(start_time: Instant, counts: HubCounts) -> HealthResponse {
    HealthResponse {
        status: "ok".into(),
        uptime_secs: start_time.elapsed().as_secs(),
        connections: counts.total,
        visitors: counts.visitors,
        agents: counts.agents,
    }
}
