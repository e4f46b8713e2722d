//! Prometheus metrics recorder and the names recorded across the crate.

use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use tracing::info;

/// Install the global Prometheus recorder.
///
/// Returns the handle used to render `/metrics`. Call once at startup,
/// before any metric is recorded.
pub fn install_recorder() -> PrometheusHandle {
    let handle = PrometheusBuilder::new()
        .install_recorder()
        .expect("failed to install metrics recorder");
    info!("prometheus metrics recorder installed");
    handle
}

/// Render the Prometheus text exposition from the installed recorder.
pub fn render(handle: &PrometheusHandle) -> String {
    handle.render()
}

// Metric name constants, to keep call sites typo-proof.

/// WebSocket connections accepted (counter, labels: role).
pub const WS_CONNECTIONS_TOTAL: &str = "ws_connections_total";
/// WebSocket disconnections (counter, labels: role).
pub const WS_DISCONNECTIONS_TOTAL: &str = "ws_disconnections_total";
/// Currently live WebSocket connections (gauge).
pub const WS_CONNECTIONS_ACTIVE: &str = "ws_connections_active";
/// Inbound frames that failed to parse (counter).
pub const WS_FRAME_PARSE_ERRORS_TOTAL: &str = "ws_frame_parse_errors_total";
/// Slow consumers evicted by the hub (counter).
pub const HUB_EVICTIONS_TOTAL: &str = "hub_evictions_total";
/// Messages routed through the hub (counter, labels: type).
pub const MESSAGES_ROUTED_TOTAL: &str = "relay_messages_routed_total";
/// Events published to the broker (counter, labels: topic).
pub const BROKER_PUBLISHES_TOTAL: &str = "broker_publishes_total";
/// Broker publishes that failed (counter, labels: topic).
pub const BROKER_PUBLISH_ERRORS_TOTAL: &str = "broker_publish_errors_total";
/// Events delivered from the broker's inbound subscription (counter).
pub const BROKER_INBOUND_EVENTS_TOTAL: &str = "broker_inbound_events_total";
/// Inbound broker payloads that failed to parse (counter).
pub const BROKER_INBOUND_PARSE_ERRORS_TOTAL: &str = "broker_inbound_parse_errors_total";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn build_and_render() {
        // Local recorder + handle, no global install (avoids cross-test clashes).
        let handle = PrometheusBuilder::new().build_recorder().handle();
        let output = handle.render();
        assert!(output.is_empty() || output.contains('\n') || output.contains('#'));
    }

    #[test]
    fn metric_names_are_snake_case() {
        let names = [
            WS_CONNECTIONS_TOTAL,
            WS_DISCONNECTIONS_TOTAL,
            WS_CONNECTIONS_ACTIVE,
            WS_FRAME_PARSE_ERRORS_TOTAL,
            HUB_EVICTIONS_TOTAL,
            MESSAGES_ROUTED_TOTAL,
            BROKER_PUBLISHES_TOTAL,
            BROKER_PUBLISH_ERRORS_TOTAL,
            BROKER_INBOUND_EVENTS_TOTAL,
            BROKER_INBOUND_PARSE_ERRORS_TOTAL,
        ];
        for name in names {
            assert!(
                name.chars().all(|c| c.is_ascii_lowercase() || c == '_'),
                "metric name '{name}' must be snake_case"
            );
        }
    }
}
