//! WebSocket ingress: validates identity parameters, constructs the
//! connection, and hands it to the session loops.

use std::sync::Arc;

use axum::extract::ws::{WebSocket, WebSocketUpgrade};
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use metrics::counter;
use serde::Deserialize;
use tokio::sync::mpsc;
use tracing::warn;

use courier_core::Message;

use crate::hub::Connection;
use crate::metrics::WS_CONNECTIONS_TOTAL;
use crate::server::AppState;
use crate::websocket::session::{self, SessionTimings};

/// Content of the `system` message confirming a successful connect.
pub const WELCOME_CONTENT: &str = "Connected to chat server";

/// Identity parameters a visitor must supply.
#[derive(Debug, Deserialize)]
pub struct VisitorParams {
    /// Website the visitor is chatting on.
    #[serde(default)]
    pub website_id: String,
    /// The visitor's own identifier.
    #[serde(default)]
    pub visitor_id: String,
    /// Conversation the visitor participates in.
    #[serde(default)]
    pub conversation_id: String,
}

/// Identity parameters an agent must supply.
#[derive(Debug, Deserialize)]
pub struct AgentParams {
    /// The agent's own identifier.
    #[serde(default)]
    pub agent_id: String,
    /// Website the agent serves.
    #[serde(default)]
    pub website_id: String,
}

/// `GET /ws/visitor?website_id=&visitor_id=&conversation_id=`
pub async fn visitor_ws(
    State(state): State<AppState>,
    Query(params): Query<VisitorParams>,
    ws: WebSocketUpgrade,
) -> Response {
    if params.website_id.is_empty()
        || params.visitor_id.is_empty()
        || params.conversation_id.is_empty()
    {
        return missing_params();
    }
    let ws = ws.max_message_size(state.config.max_message_size);
    ws.on_upgrade(move |socket| async move {
        let (tx, rx) = mpsc::channel(state.config.send_queue_capacity);
        let connection = Arc::new(Connection::visitor(
            params.visitor_id.into(),
            params.website_id.clone().into(),
            params.conversation_id.clone().into(),
            tx,
        ));
        let welcome = Message::system(&params.website_id, &params.conversation_id, WELCOME_CONTENT);
        accept(socket, connection, rx, welcome, state).await;
    })
    .into_response()
}

/// `GET /ws/agent?agent_id=&website_id=`
pub async fn agent_ws(
    State(state): State<AppState>,
    Query(params): Query<AgentParams>,
    ws: WebSocketUpgrade,
) -> Response {
    if params.agent_id.is_empty() || params.website_id.is_empty() {
        return missing_params();
    }
    let ws = ws.max_message_size(state.config.max_message_size);
    ws.on_upgrade(move |socket| async move {
        let (tx, rx) = mpsc::channel(state.config.send_queue_capacity);
        let connection = Arc::new(Connection::agent(
            params.agent_id.into(),
            params.website_id.clone().into(),
            tx,
        ));
        let welcome = Message::system(&params.website_id, "", WELCOME_CONTENT);
        accept(socket, connection, rx, welcome, state).await;
    })
    .into_response()
}

fn missing_params() -> Response {
    (
        StatusCode::BAD_REQUEST,
        Json(serde_json::json!({"error": "Missing required parameters"})),
    )
        .into_response()
}

/// Queue the welcome, register with the hub, and run the session to
/// completion. The welcome goes onto the queue before the loops start, so it
/// is the first frame the client sees.
async fn accept(
    socket: WebSocket,
    connection: Arc<Connection>,
    outbound: mpsc::Receiver<Arc<str>>,
    welcome: Message,
    state: AppState,
) {
    match welcome.to_json() {
        Ok(json) => {
            let _ = connection.enqueue(Arc::from(json));
        }
        Err(err) => warn!(error = %err, "failed to serialize welcome message"),
    }

    counter!(WS_CONNECTIONS_TOTAL, "role" => connection.role.as_str()).increment(1);
    state.hub.register(Arc::clone(&connection));

    let timings = SessionTimings::from(state.config.as_ref());
    session::run(
        socket,
        connection,
        outbound,
        Arc::clone(&state.hub),
        Arc::clone(&state.bridge),
        timings,
    )
    .await;
}
