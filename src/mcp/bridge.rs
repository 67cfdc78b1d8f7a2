// Bridge between stream function calls and the backend REST API.
// Each call runs on its own task and carries its own correlation id, so no
// central request table is needed.

use super::tools::{ApiRequest, ToolRegistry};
use super::types::{FunctionCall, OutboundEvent};
use crate::backend::{Backend, BackendResponse};
use crate::error::{BridgeError, Result};
use crate::stream::StreamConnection;
use std::sync::Arc;
use tracing::{debug, warn};

/// Turns validated function calls into exactly one backend request each.
#[derive(Clone)]
pub struct ToolBridge {
    backend: Arc<dyn Backend>,
    tools: Arc<ToolRegistry>,
}

impl ToolBridge {
    pub fn new(backend: Arc<dyn Backend>, tools: Arc<ToolRegistry>) -> Self {
        Self { backend, tools }
    }

    pub fn tools(&self) -> &Arc<ToolRegistry> {
        &self.tools
    }

    /// Whether `name` is a tool this bridge can invoke
    pub fn handles(&self, name: &str) -> bool {
        self.tools.contains(name)
    }

    /// Run the call and emit its response on `connection`.
    ///
    /// Returns whether the response was accepted; results for a closed
    /// connection are dropped.
    pub async fn invoke(&self, connection: &Arc<StreamConnection>, call: FunctionCall) -> bool {
        let in_flight = connection.track_call();
        let event = self.execute(&call).await;
        let delivered = in_flight.connection().emit(event).await;
        if !delivered {
            debug!(
                "Result for call {} discarded, connection {} is closed",
                call.id,
                connection.id()
            );
        }
        delivered
    }

    /// Execute the call and build the response envelope, tagged with the call id.
    pub async fn execute(&self, call: &FunctionCall) -> OutboundEvent {
        match self.forward(call).await {
            Ok(response) => {
                if !response.is_success() {
                    warn!(
                        "Backend answered call {} with status {}, passing body through",
                        call.id, response.status
                    );
                }
                OutboundEvent::function_response(call.id.clone(), response.body)
            }
            Err(e) => {
                warn!("Call {} to '{}' failed: {}", call.id, call.name, e);
                OutboundEvent::error(Some(call.id.clone()), e.to_string())
            }
        }
    }

    async fn forward(&self, call: &FunctionCall) -> Result<BackendResponse> {
        if !self.handles(&call.name) {
            return Err(BridgeError::UnknownTool(call.name.clone()));
        }

        let request = ApiRequest::from_parameters(&call.parameters)?;
        let body = if request.method.carries_body() {
            request.body.as_ref()
        } else {
            if request.body.is_some() {
                debug!(
                    "Ignoring body of call {}, {} requests carry none",
                    call.id, request.method
                );
            }
            None
        };

        debug!(
            "Bridging call {} to {} {}",
            call.id, request.method, request.path
        );
        self.backend.call(request.method, &request.path, body).await
    }
}
