//! Server configuration with `COURIER_*` environment overrides.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Configuration for the relay server.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Host to bind (default `"127.0.0.1"`).
    pub host: String,
    /// Port to bind (default `0` for auto-assign).
    pub port: u16,
    /// Max inbound WebSocket message size in bytes.
    pub max_message_size: usize,
    /// Capacity of each connection's outbound queue.
    pub send_queue_capacity: usize,
    /// Seconds between liveness pings on an idle connection.
    pub ping_interval_secs: u64,
    /// Seconds a connection may stay silent before its read side gives up.
    pub read_timeout_secs: u64,
    /// Seconds allowed for one physical write before the connection is
    /// considered dead.
    pub write_timeout_secs: u64,
    /// Seconds to wait for tasks to drain during shutdown.
    pub shutdown_timeout_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".into(),
            port: 0,
            max_message_size: 512_000, // 500 KB
            send_queue_capacity: 256,
            ping_interval_secs: 54,
            read_timeout_secs: 60,
            write_timeout_secs: 10,
            shutdown_timeout_secs: 30,
        }
    }
}

impl ServerConfig {
    /// Apply `COURIER_*` environment overrides. Invalid or out-of-range
    /// values are ignored, falling back to the existing value.
    pub fn apply_env_overrides(&mut self) {
        if let Some(v) = read_env_string("COURIER_HOST") {
            self.host = v;
        }
        if let Some(v) = read_env_u64("COURIER_PORT", 0, 65_535) {
            self.port = u16::try_from(v).unwrap_or(self.port);
        }
        if let Some(v) = read_env_u64("COURIER_MAX_MESSAGE_SIZE", 1024, 64 * 1024 * 1024) {
            self.max_message_size = usize::try_from(v).unwrap_or(self.max_message_size);
        }
        if let Some(v) = read_env_u64("COURIER_SEND_QUEUE_CAPACITY", 1, 65_536) {
            self.send_queue_capacity = usize::try_from(v).unwrap_or(self.send_queue_capacity);
        }
        if let Some(v) = read_env_u64("COURIER_PING_INTERVAL_SECS", 1, 3600) {
            self.ping_interval_secs = v;
        }
        if let Some(v) = read_env_u64("COURIER_READ_TIMEOUT_SECS", 1, 3600) {
            self.read_timeout_secs = v;
        }
        if let Some(v) = read_env_u64("COURIER_WRITE_TIMEOUT_SECS", 1, 600) {
            self.write_timeout_secs = v;
        }
        if let Some(v) = read_env_u64("COURIER_SHUTDOWN_TIMEOUT_SECS", 1, 600) {
            self.shutdown_timeout_secs = v;
        }
    }

    /// Liveness ping interval.
    #[must_use]
    pub fn ping_interval(&self) -> Duration {
        Duration::from_secs(self.ping_interval_secs)
    }

    /// Inactivity read deadline.
    #[must_use]
    pub fn read_timeout(&self) -> Duration {
        Duration::from_secs(self.read_timeout_secs)
    }

    /// Per-write deadline.
    #[must_use]
    pub fn write_timeout(&self) -> Duration {
        Duration::from_secs(self.write_timeout_secs)
    }

    /// Shutdown drain budget.
    #[must_use]
    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_secs(self.shutdown_timeout_secs)
    }
}

fn read_env_string(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.is_empty())
}

fn read_env_u64(key: &str, min: u64, max: u64) -> Option<u64> {
    let raw = std::env::var(key).ok()?;
    parse_u64_in_range(&raw, min, max)
}

/// Strict integer parsing: the whole string must be a number inside
/// `[min, max]`, otherwise the value is rejected.
fn parse_u64_in_range(raw: &str, min: u64, max: u64) -> Option<u64> {
    let value: u64 = raw.trim().parse().ok()?;
    (min..=max).contains(&value).then_some(value)
}
