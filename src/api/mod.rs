pub mod handlers;
pub mod routes;

use crate::backend::{Credentials, HttpBackend};
use crate::config::AppConfig;
use anyhow::Result;
use axum::Router;
use handlers::ApiState;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::info;

pub async fn start_server(config: AppConfig, credentials: Credentials) -> Result<()> {
    let addr = format!("{}:{}", config.http.host, config.http.port);

    // Backend client carries the credential headers for every forwarded call
    let backend = HttpBackend::new(
        config.backend.base_url.clone(),
        &credentials,
        config.backend.request_timeout(),
    )?;

    let state = ApiState::new(&config, Arc::new(backend), credentials.is_configured());
    let shutdown = state.shutdown.clone();

    let app = build_router(state);

    let listener = tokio::net::TcpListener::bind(&addr).await?;

    info!("HTTP server listening on {}", addr);
    info!("Health check: http://{}/health", addr);
    info!("Connection test: http://{}/test", addr);
    info!("Tool list: http://{}/tools", addr);
    info!("Event stream: http://{}/sse", addr);
    info!("Forwarding tool calls to {}", config.backend.base_url);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(shutdown))
        .await?;

    info!("Server stopped");
    Ok(())
}

/// Assemble every route with the shared layers applied
pub fn build_router(state: ApiState) -> Router {
    Router::new()
        .merge(routes::health_routes())
        .merge(routes::tool_routes())
        .merge(routes::stream_routes())
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn shutdown_signal(shutdown: CancellationToken) {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C signal, shutting down...");
        },
        _ = terminate => {
            info!("Received SIGTERM signal, shutting down...");
        },
    }

    // Open event streams never end on their own; closing them lets serve() drain
    shutdown.cancel();
}
