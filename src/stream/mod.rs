pub mod connection;
pub mod registry;

pub use connection::{ConnectionId, ConnectionSettings, Outbox, StreamConnection};
pub use registry::{ConnectionLease, ConnectionRegistry};

use crate::mcp::OutboundEvent;
use axum::response::sse::Event;
use tracing::error;

const SERIALIZATION_FAILURE: &str =
    r#"{"type":"error","payload":{"message":"internal serialization error"}}"#;

/// Frame an event as a single `data: <json>` SSE record.
pub fn to_sse_event(event: &OutboundEvent) -> Event {
    match serde_json::to_string(event) {
        Ok(json) => Event::default().data(json),
        Err(e) => {
            error!("Failed to serialize {} event: {}", event.kind(), e);
            Event::default().data(SERIALIZATION_FAILURE)
        }
    }
}
