#![allow(dead_code)]

use axum::{
    body::Body,
    http::{Request, Response},
    Router,
};
use futures::{channel::mpsc, Stream, StreamExt};
use notion_sse_bridge::{
    api::{build_router, handlers::ApiState},
    backend::{Credentials, HttpBackend},
    config::AppConfig,
};
use serde_json::Value;
use std::{pin::Pin, sync::Arc, time::Duration};
use tower::ServiceExt;

/// How long a test waits for the next event before failing
pub const EVENT_TIMEOUT: Duration = Duration::from_secs(5);

// ──────────────────────────────────────────────
// App construction
// ──────────────────────────────────────────────

/// Config pointing the backend at `base_url` (usually an httpmock server).
pub fn create_test_config(base_url: impl Into<String>) -> AppConfig {
    let mut config = AppConfig::default();
    config.backend.base_url = base_url.into();
    config.backend.request_timeout_secs = 5;
    config
}

/// State with a real HTTP backend; keep a clone to inspect the connection registry.
pub fn build_test_state(config: &AppConfig, credentials: &Credentials) -> ApiState {
    let backend = HttpBackend::new(
        config.backend.base_url.clone(),
        credentials,
        config.backend.request_timeout(),
    )
    .unwrap();
    ApiState::new(config, Arc::new(backend), credentials.is_configured())
}

/// Build a test Router (no HTTP server, uses tower::oneshot).
pub fn build_test_app(state: ApiState) -> Router {
    build_router(state)
}

/// Helper to extract JSON from a response body.
pub async fn response_json(response: Response<Body>) -> Value {
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&body).unwrap()
}

pub async fn get(app: &Router, uri: &str) -> Response<Body> {
    app.clone()
        .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
        .await
        .unwrap()
}

// ──────────────────────────────────────────────
// Event stream client
// ──────────────────────────────────────────────

type Inbound = mpsc::UnboundedSender<Result<String, std::io::Error>>;

/// One open `/sse` exchange: the request body we write to, the events we read.
pub struct StreamClient {
    pub response_headers: axum::http::HeaderMap,
    inbound: Inbound,
    events: Pin<Box<dyn Stream<Item = Result<axum::body::Bytes, axum::Error>> + Send>>,
    buffer: String,
}

impl StreamClient {
    /// Open a stream against `app`; the request body stays open until dropped.
    pub async fn connect(app: &Router) -> Self {
        let (inbound, rx) = mpsc::unbounded::<Result<String, std::io::Error>>();
        let request = Request::builder()
            .method("GET")
            .uri("/sse")
            .body(Body::from_stream(rx))
            .unwrap();

        let response = app.clone().oneshot(request).await.unwrap();
        assert!(response.status().is_success());

        let response_headers = response.headers().clone();
        Self {
            response_headers,
            inbound,
            events: Box::pin(response.into_body().into_data_stream()),
            buffer: String::new(),
        }
    }

    /// Write a raw fragment to the inbound body.
    pub fn send_raw(&self, fragment: impl Into<String>) {
        self.inbound.unbounded_send(Ok(fragment.into())).unwrap();
    }

    pub fn send(&self, message: &Value) {
        self.send_raw(message.to_string());
    }

    /// Make the inbound body fail as if the transport broke.
    pub fn fail_inbound(&self) {
        let error = std::io::Error::new(std::io::ErrorKind::ConnectionReset, "reset");
        self.inbound.unbounded_send(Err(error)).unwrap();
    }

    /// Next SSE record's JSON payload.
    pub async fn next_event(&mut self) -> Value {
        loop {
            if let Some(end) = self.buffer.find("\n\n") {
                let record: String = self.buffer.drain(..end + 2).collect();
                let data: Vec<&str> = record
                    .lines()
                    .filter_map(|line| line.strip_prefix("data:"))
                    .map(str::trim_start)
                    .collect();
                if data.is_empty() {
                    continue;
                }
                return serde_json::from_str(&data.join("\n")).unwrap();
            }

            let chunk = tokio::time::timeout(EVENT_TIMEOUT, self.events.next())
                .await
                .expect("timed out waiting for event")
                .expect("event stream ended")
                .unwrap();
            self.buffer.push_str(std::str::from_utf8(&chunk).unwrap());
        }
    }

    /// Next event that is not a heartbeat.
    pub async fn next_non_ping(&mut self) -> Value {
        loop {
            let event = self.next_event().await;
            if event["type"] != "ping" {
                return event;
            }
        }
    }

    /// Whether the event stream has ended within `wait`.
    pub async fn ended_within(&mut self, wait: Duration) -> bool {
        let deadline = tokio::time::Instant::now() + wait;
        loop {
            match tokio::time::timeout_at(deadline, self.events.next()).await {
                Ok(None) => return true,
                Ok(Some(_)) => continue,
                Err(_) => return false,
            }
        }
    }
}

/// A `function_call` message for the Notion tool.
pub fn function_call(id: Value, parameters: Value) -> Value {
    serde_json::json!({
        "type": "function_call",
        "id": id,
        "payload": {"name": "notion-api", "parameters": parameters}
    })
}
