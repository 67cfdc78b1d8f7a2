use crate::error::BridgeError;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;

/// `type` discriminator of actionable inbound messages
pub const FUNCTION_CALL: &str = "function_call";

/// HTTP verbs a tool call may use against the backend
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum HttpMethod {
    #[default]
    Get,
    Post,
    Patch,
    Delete,
}

impl HttpMethod {
    pub const ALL: [HttpMethod; 4] = [
        HttpMethod::Get,
        HttpMethod::Post,
        HttpMethod::Patch,
        HttpMethod::Delete,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            HttpMethod::Get => "GET",
            HttpMethod::Post => "POST",
            HttpMethod::Patch => "PATCH",
            HttpMethod::Delete => "DELETE",
        }
    }

    /// Whether a request body is forwarded for this method
    pub fn carries_body(&self) -> bool {
        matches!(self, HttpMethod::Post | HttpMethod::Patch)
    }
}

impl fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for HttpMethod {
    type Err = BridgeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        HttpMethod::ALL
            .into_iter()
            .find(|m| m.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| {
                BridgeError::InvalidParameter(format!(
                    "method '{}' is not one of GET, POST, PATCH, DELETE",
                    s
                ))
            })
    }
}

impl From<HttpMethod> for reqwest::Method {
    fn from(method: HttpMethod) -> Self {
        match method {
            HttpMethod::Get => reqwest::Method::GET,
            HttpMethod::Post => reqwest::Method::POST,
            HttpMethod::Patch => reqwest::Method::PATCH,
            HttpMethod::Delete => reqwest::Method::DELETE,
        }
    }
}

/// Wire shape of an inbound `function_call` envelope
#[derive(Debug, Clone, Deserialize)]
pub(crate) struct RawFunctionCall {
    /// `None` only when the key is absent; an explicit `null` is a valid id
    #[serde(default, deserialize_with = "present")]
    pub id: Option<Value>,
    pub payload: RawCallPayload,
}

fn present<'de, D>(deserializer: D) -> Result<Option<Value>, D::Error>
where
    D: Deserializer<'de>,
{
    Value::deserialize(deserializer).map(Some)
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct RawCallPayload {
    pub name: String,
    #[serde(default)]
    pub parameters: Value,
}

/// A function call that passed envelope validation and is ready for the bridge
#[derive(Debug, Clone, PartialEq)]
pub struct FunctionCall {
    /// Correlation token copied verbatim onto the response
    pub id: Value,
    pub name: String,
    pub parameters: Value,
}

impl FunctionCall {
    pub fn new(id: Value, name: impl Into<String>, parameters: Value) -> Self {
        Self {
            id,
            name: name.into(),
            parameters,
        }
    }
}

impl TryFrom<RawFunctionCall> for FunctionCall {
    type Error = BridgeError;

    fn try_from(raw: RawFunctionCall) -> Result<Self, Self::Error> {
        let id = raw.id.ok_or_else(|| {
            BridgeError::MalformedMessage("function_call is missing an id".to_string())
        })?;
        Ok(Self {
            id,
            name: raw.payload.name,
            parameters: raw.payload.parameters,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResponsePayload {
    pub data: Value,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorPayload {
    pub message: String,
}

/// Every event written to the client stream
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OutboundEvent {
    ConnectionEstablished,
    Ping,
    FunctionResponse {
        id: Value,
        payload: ResponsePayload,
    },
    Error {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        id: Option<Value>,
        payload: ErrorPayload,
    },
}

impl OutboundEvent {
    pub fn function_response(id: Value, data: Value) -> Self {
        OutboundEvent::FunctionResponse {
            id,
            payload: ResponsePayload { data },
        }
    }

    pub fn error(id: Option<Value>, message: impl Into<String>) -> Self {
        OutboundEvent::Error {
            id,
            payload: ErrorPayload {
                message: message.into(),
            },
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            OutboundEvent::ConnectionEstablished => "connection_established",
            OutboundEvent::Ping => "ping",
            OutboundEvent::FunctionResponse { .. } => "function_response",
            OutboundEvent::Error { .. } => "error",
        }
    }

    /// Correlation id, if the event answers a specific call
    pub fn id(&self) -> Option<&Value> {
        match self {
            OutboundEvent::FunctionResponse { id, .. } => Some(id),
            OutboundEvent::Error { id, .. } => id.as_ref(),
            _ => None,
        }
    }
}
