//! `RelayServer` — the axum HTTP + WebSocket surface over the hub.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use axum::extract::State;
use axum::response::Json;
use axum::routing::get;
use axum::Router;
use metrics_exporter_prometheus::PrometheusHandle;
use tokio::task::JoinHandle;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{error, info};

use courier_broker::MessageBroker;

use crate::bridge::BrokerBridge;
use crate::config::ServerConfig;
use crate::health::{self, HealthResponse};
use crate::hub::Hub;
use crate::metrics;
use crate::shutdown::ShutdownCoordinator;
use crate::websocket::ingress;

/// Shared state available to every handler.
#[derive(Clone)]
pub struct AppState {
    /// The live-connection hub.
    pub hub: Arc<Hub>,
    /// Bridge to the external broker.
    pub bridge: Arc<BrokerBridge>,
    /// Server configuration.
    pub config: Arc<ServerConfig>,
    /// Shutdown coordinator.
    pub shutdown: Arc<ShutdownCoordinator>,
    /// When the server started.
    pub start_time: Instant,
    /// Handle for rendering `/metrics`.
    pub metrics: PrometheusHandle,
}

/// The relay server: owns the hub, the bridge, and the HTTP surface.
pub struct RelayServer {
    config: Arc<ServerConfig>,
    hub: Arc<Hub>,
    bridge: Arc<BrokerBridge>,
    shutdown: Arc<ShutdownCoordinator>,
    start_time: Instant,
    metrics: PrometheusHandle,
}

impl RelayServer {
    /// Create a server over the given broker.
    pub fn new(
        config: ServerConfig,
        broker: Arc<dyn MessageBroker>,
        metrics: PrometheusHandle,
    ) -> Self {
        let hub = Arc::new(Hub::new());
        let bridge = Arc::new(BrokerBridge::new(broker, Arc::clone(&hub)));
        Self {
            config: Arc::new(config),
            hub,
            bridge,
            shutdown: Arc::new(ShutdownCoordinator::new()),
            start_time: Instant::now(),
            metrics,
        }
    }

    /// Build the axum router with all routes and layers.
    pub fn router(&self) -> Router {
        let state = AppState {
            hub: Arc::clone(&self.hub),
            bridge: Arc::clone(&self.bridge),
            config: Arc::clone(&self.config),
            shutdown: Arc::clone(&self.shutdown),
            start_time: self.start_time,
            metrics: self.metrics.clone(),
        };

        Router::new()
            .route("/health", get(health_handler))
            .route("/metrics", get(metrics_handler))
            .route("/ws/visitor", get(ingress::visitor_ws))
            .route("/ws/agent", get(ingress::agent_ws))
            // The widget is embedded on arbitrary customer sites.
            .layer(CorsLayer::permissive())
            .layer(TraceLayer::new_for_http())
            .with_state(state)
    }

    /// Bind the configured address and serve until shutdown is triggered.
    ///
    /// Returns the bound address (useful with port `0`) and the serve task.
    pub async fn listen(&self) -> std::io::Result<(SocketAddr, JoinHandle<()>)> {
        let listener =
            tokio::net::TcpListener::bind((self.config.host.as_str(), self.config.port)).await?;
        let addr = listener.local_addr()?;
        let app = self.router();
        let token = self.shutdown.token();

        let handle = tokio::spawn(async move {
            let serve = axum::serve(listener, app)
                .with_graceful_shutdown(async move { token.cancelled().await });
            if let Err(err) = serve.await {
                error!(error = %err, "relay listener failed");
            }
        });

        info!(%addr, "relay listening");
        Ok((addr, handle))
    }

    /// The live-connection hub.
    pub fn hub(&self) -> &Arc<Hub> {
        &self.hub
    }

    /// The broker bridge.
    pub fn bridge(&self) -> &Arc<BrokerBridge> {
        &self.bridge
    }

    /// The shutdown coordinator.
    pub fn shutdown(&self) -> &Arc<ShutdownCoordinator> {
        &self.shutdown
    }

    /// The server configuration.
    pub fn config(&self) -> &ServerConfig {
        &self.config
    }
}

/// `GET /health`
async fn health_handler(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(health::health_check(state.start_time, state.hub.counts()))
}

/// `GET /metrics`
async fn metrics_handler(State(state): State<AppState>) -> String {
    metrics::render(&state.metrics)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use metrics_exporter_prometheus::PrometheusBuilder;
    use tower::ServiceExt;

    use courier_broker::MemoryBroker;

    fn make_server() -> RelayServer {
        let handle = PrometheusBuilder::new().build_recorder().handle();
        RelayServer::new(ServerConfig::default(), Arc::new(MemoryBroker::new()), handle)
    }

    #[test]
    fn default_config_binds_loopback() {
        let server = make_server();
        assert_eq!(server.config().host, "127.0.0.1");
        assert_eq!(server.config().port, 0);
    }

    #[test]
    fn hub_starts_empty() {
        let server = make_server();
        assert!(server.hub().is_empty());
    }

    #[test]
    fn shutdown_starts_untriggered() {
        let server = make_server();
        assert!(!server.shutdown().is_triggered());
    }

    #[tokio::test]
    async fn health_endpoint_returns_ok() {
        let app = make_server().router();
        let req = Request::builder().uri("/health").body(Body::empty()).unwrap();

        let resp = app.oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);

        let body = axum::body::to_bytes(resp.into_body(), 10_000).await.unwrap();
        let parsed: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(parsed["status"], "ok");
        assert_eq!(parsed["connections"], 0);
        assert_eq!(parsed["visitors"], 0);
        assert_eq!(parsed["agents"], 0);
        assert!(parsed["uptime_secs"].is_number());
    }

    #[tokio::test]
    async fn metrics_endpoint_renders_text() {
        let app = make_server().router();
        let req = Request::builder().uri("/metrics").body(Body::empty()).unwrap();

        let resp = app.oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn ws_routes_reject_plain_http() {
        // Without upgrade headers the extractor refuses the request; the
        // route itself must exist (404 would mean it does not).
        let app = make_server().router();
        let req = Request::builder()
            .uri("/ws/visitor?website_id=w1&visitor_id=v1&conversation_id=c1")
            .body(Body::empty())
            .unwrap();

        let resp = app.oneshot(req).await.unwrap();
        assert_ne!(resp.status(), StatusCode::NOT_FOUND);
        assert!(!resp.status().is_success());
    }

    #[tokio::test]
    async fn unknown_route_returns_404() {
        let app = make_server().router();
        let req = Request::builder().uri("/nope").body(Body::empty()).unwrap();
        let resp = app.oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn listen_auto_assigns_a_port() {
        let server = make_server();
        let (addr, handle) = server.listen().await.unwrap();
        assert_ne!(addr.port(), 0);

        server.shutdown().trigger();
        handle.await.unwrap();
    }
}
