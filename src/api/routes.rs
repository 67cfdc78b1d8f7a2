use crate::api::handlers::ApiState;
use axum::{routing::get, Router};

pub fn health_routes() -> Router<ApiState> {
    Router::new()
        .route("/health", get(super::handlers::health_check))
        .route("/info", get(super::handlers::server_info))
        .route("/test", get(super::handlers::connection_test))
}

pub fn tool_routes() -> Router<ApiState> {
    Router::new()
        .route("/tools", get(super::handlers::list_tools))
        .route("/tools/{name}", get(super::handlers::get_tool))
}

pub fn stream_routes() -> Router<ApiState> {
    // GET only; axum answers every other method with 405
    Router::new().route("/sse", get(super::handlers::event_stream))
}
