use crate::backend::Backend;
use crate::config::AppConfig;
use crate::error::BridgeError;
use crate::mcp::{MessageDispatcher, ToolBridge, ToolRegistry};
use crate::stream::{
    to_sse_event, ConnectionLease, ConnectionRegistry, ConnectionSettings, StreamConnection,
};
use axum::{
    body::Body,
    extract::{Path, State},
    http::header,
    response::{sse::Sse, IntoResponse},
    Json,
};
use serde_json::json;
use std::convert::Infallible;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::info;

/// Application state shared across handlers
#[derive(Clone)]
pub struct ApiState {
    pub dispatcher: Arc<MessageDispatcher>,
    pub connections: Arc<ConnectionRegistry>,
    pub stream: ConnectionSettings,
    /// Whether the credential variable was present at startup
    pub credentials_configured: bool,
    /// Parent of every connection's shutdown token
    pub shutdown: CancellationToken,
}

impl ApiState {
    pub fn new(
        config: &AppConfig,
        backend: Arc<dyn Backend>,
        credentials_configured: bool,
    ) -> Self {
        let bridge = Arc::new(ToolBridge::new(backend, ToolRegistry::builtin()));
        Self {
            dispatcher: Arc::new(MessageDispatcher::new(
                bridge,
                config.stream.max_frame_bytes,
            )),
            connections: Arc::new(ConnectionRegistry::new()),
            stream: ConnectionSettings::from(&config.stream),
            credentials_configured,
            shutdown: CancellationToken::new(),
        }
    }

    fn tools(&self) -> &ToolRegistry {
        self.dispatcher.bridge().tools()
    }
}

pub(crate) async fn health_check(State(state): State<ApiState>) -> impl IntoResponse {
    Json(json!({
        "status": "ok",
        "service": env!("CARGO_PKG_NAME"),
        "version": env!("CARGO_PKG_VERSION"),
        "active_connections": state.connections.len(),
    }))
}

pub(crate) async fn server_info() -> impl IntoResponse {
    Json(json!({
        "name": env!("CARGO_PKG_NAME"),
        "version": env!("CARGO_PKG_VERSION"),
        "description": env!("CARGO_PKG_DESCRIPTION"),
        "authors": env!("CARGO_PKG_AUTHORS"),
    }))
}

/// Diagnostic probe; reports whether credentials exist, never their contents.
pub(crate) async fn connection_test(State(state): State<ApiState>) -> impl IntoResponse {
    Json(json!({
        "status": "ok",
        "message": "Notion API proxy is running",
        "env_var_exists": state.credentials_configured,
    }))
}

pub(crate) async fn list_tools(State(state): State<ApiState>) -> impl IntoResponse {
    Json(json!({
        "tools": state.tools().list(),
    }))
}

pub(crate) async fn get_tool(
    State(state): State<ApiState>,
    Path(name): Path<String>,
) -> Result<impl IntoResponse, BridgeError> {
    let descriptor = state
        .tools()
        .get(&name)
        .ok_or(BridgeError::UnknownTool(name))?;
    Ok(Json(descriptor.clone()))
}

// Streaming handler

/// Accept a client stream: events go out as SSE, tool calls come in on the request body.
pub(crate) async fn event_stream(State(state): State<ApiState>, body: Body) -> impl IntoResponse {
    let id = state.connections.register();
    let (connection, outbox) = StreamConnection::open(id, state.stream, &state.shutdown);
    info!(
        "Accepted stream connection {} ({} open)",
        id,
        state.connections.len()
    );

    let dispatcher = Arc::clone(&state.dispatcher);
    let inbound = Arc::clone(&connection);
    tokio::spawn(async move {
        dispatcher.run(inbound, body.into_data_stream()).await;
    });

    let lease = ConnectionLease::new(connection, Arc::clone(&state.connections));
    let events = futures::stream::unfold((outbox, lease), |(mut outbox, lease)| async move {
        let event = outbox.next().await?;
        Some((Ok::<_, Infallible>(to_sse_event(&event)), (outbox, lease)))
    });

    (
        [
            (header::CONTENT_TYPE, "text/event-stream"),
            (header::CACHE_CONTROL, "no-cache"),
            (header::CONNECTION, "keep-alive"),
        ],
        Sse::new(events),
    )
}
