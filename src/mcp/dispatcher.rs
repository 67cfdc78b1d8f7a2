use super::bridge::ToolBridge;
use super::frame::FrameDecoder;
use super::types::{FunctionCall, OutboundEvent, RawFunctionCall, FUNCTION_CALL};
use crate::error::{BridgeError, Result};
use crate::stream::StreamConnection;
use futures::{Stream, StreamExt};
use serde_json::Value;
use std::fmt::Display;
use std::sync::Arc;
use tracing::{debug, warn};

/// Routes inbound stream messages to the tool bridge.
///
/// Never serializes calls: every recognized function call is spawned onto
/// its own task, so responses may be emitted in any order.
#[derive(Clone)]
pub struct MessageDispatcher {
    bridge: Arc<ToolBridge>,
    max_frame_bytes: usize,
}

impl MessageDispatcher {
    pub fn new(bridge: Arc<ToolBridge>, max_frame_bytes: usize) -> Self {
        Self {
            bridge,
            max_frame_bytes,
        }
    }

    pub fn bridge(&self) -> &Arc<ToolBridge> {
        &self.bridge
    }

    /// Consume a connection's inbound fragments until the body ends, fails,
    /// or the connection closes.
    pub async fn run<S, B, E>(&self, connection: Arc<StreamConnection>, fragments: S)
    where
        S: Stream<Item = std::result::Result<B, E>>,
        B: AsRef<[u8]>,
        E: Display,
    {
        let mut decoder = FrameDecoder::new(self.max_frame_bytes);
        futures::pin_mut!(fragments);

        loop {
            let next = tokio::select! {
                _ = connection.closed() => {
                    debug!("Connection {} closed, no longer reading input", connection.id());
                    return;
                }
                next = fragments.next() => next,
            };

            match next {
                Some(Ok(fragment)) => {
                    for frame in decoder.push(fragment.as_ref()) {
                        self.dispatch(&connection, frame).await;
                    }
                }
                Some(Err(e)) => {
                    // Nobody to report to: the transport itself is gone
                    warn!("Inbound stream of connection {} failed: {}", connection.id(), e);
                    connection.close();
                    return;
                }
                None => break,
            }
        }

        if let Some(leftover) = decoder.finish() {
            connection
                .emit(OutboundEvent::error(None, leftover.to_string()))
                .await;
        }
        debug!("Inbound stream of connection {} ended", connection.id());
    }

    /// Handle one decoded frame; parse failures are reported without an id.
    pub(crate) async fn dispatch(&self, connection: &Arc<StreamConnection>, frame: Result<Value>) {
        match frame {
            Ok(message) => self.route(connection, message).await,
            Err(e) => {
                warn!("Malformed message on connection {}: {}", connection.id(), e);
                connection
                    .emit(OutboundEvent::error(None, e.to_string()))
                    .await;
            }
        }
    }

    /// Hand a parsed message to the bridge if it is an actionable function call.
    pub async fn route(&self, connection: &Arc<StreamConnection>, message: Value) {
        let kind = message.get("type").and_then(Value::as_str);
        if kind != Some(FUNCTION_CALL) {
            debug!("Ignoring message of type {:?}", kind);
            return;
        }

        let Some(name) = message.pointer("/payload/name").and_then(Value::as_str) else {
            debug!("Ignoring function_call without a tool name");
            return;
        };
        if !self.bridge.handles(name) {
            debug!("Ignoring function_call for unregistered tool '{}'", name);
            return;
        }

        let call = match validate(message) {
            Ok(call) => call,
            Err(e) => {
                warn!("Rejected function_call on connection {}: {}", connection.id(), e);
                connection
                    .emit(OutboundEvent::error(None, e.to_string()))
                    .await;
                return;
            }
        };

        debug!(
            "Dispatching call {} to '{}' on connection {}",
            call.id,
            call.name,
            connection.id()
        );
        let bridge = Arc::clone(&self.bridge);
        let connection = Arc::clone(connection);
        tokio::spawn(async move {
            bridge.invoke(&connection, call).await;
        });
    }
}

fn validate(message: Value) -> Result<FunctionCall> {
    let raw: RawFunctionCall = serde_json::from_value(message).map_err(BridgeError::malformed)?;
    FunctionCall::try_from(raw)
}
