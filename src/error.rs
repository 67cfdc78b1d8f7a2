use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum BridgeError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Malformed message: {0}")]
    MalformedMessage(String),

    #[error("Unknown tool: {0}")]
    UnknownTool(String),

    #[error("Missing required parameter: {0}")]
    MissingParameter(String),

    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    #[error("Backend request failed: {0}")]
    BackendFault(String),

    #[error("Backend request timed out after {0:?}")]
    BackendTimeout(Duration),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

pub type Result<T> = std::result::Result<T, BridgeError>;

impl BridgeError {
    /// Convert error to HTTP status code
    pub fn status_code(&self) -> axum::http::StatusCode {
        use axum::http::StatusCode;
        match self {
            BridgeError::Config(_) => StatusCode::INTERNAL_SERVER_ERROR,
            BridgeError::MalformedMessage(_) => StatusCode::BAD_REQUEST,
            BridgeError::UnknownTool(_) => StatusCode::NOT_FOUND,
            BridgeError::MissingParameter(_) => StatusCode::BAD_REQUEST,
            BridgeError::InvalidParameter(_) => StatusCode::BAD_REQUEST,
            BridgeError::BackendFault(_) => StatusCode::BAD_GATEWAY,
            BridgeError::BackendTimeout(_) => StatusCode::GATEWAY_TIMEOUT,
            BridgeError::Io(_) => StatusCode::INTERNAL_SERVER_ERROR,
            BridgeError::Json(_) => StatusCode::BAD_REQUEST,
            BridgeError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub(crate) fn backend_fault(err: impl std::fmt::Display) -> Self {
        BridgeError::BackendFault(err.to_string())
    }

    pub(crate) fn malformed(err: impl std::fmt::Display) -> Self {
        BridgeError::MalformedMessage(err.to_string())
    }
}

// Implement conversion from anyhow::Error for convenience
impl From<anyhow::Error> for BridgeError {
    fn from(err: anyhow::Error) -> Self {
        BridgeError::Internal(err.to_string())
    }
}

impl axum::response::IntoResponse for BridgeError {
    fn into_response(self) -> axum::response::Response {
        let status = self.status_code();
        let body = serde_json::json!({
            "error": self.to_string(),
            "code": status.as_u16(),
        });

        (status, axum::Json(body)).into_response()
    }
}
