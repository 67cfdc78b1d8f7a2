use serde::Deserialize;
use std::time::Duration;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub http: HttpConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub backend: BackendConfig,
    #[serde(default)]
    pub stream: StreamConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    pub host: String,
    pub port: u16,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 3000,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "pretty".to_string(),
        }
    }
}

/// Where function calls are forwarded to and how credentials are found.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct BackendConfig {
    /// Prefix every tool `path` is appended to, verbatim.
    pub base_url: String,
    pub request_timeout_secs: u64,
    /// Name of the environment variable holding the credential header JSON.
    pub credentials_env: String,
}

impl BackendConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.notion.com/v1".to_string(),
            request_timeout_secs: 30,
            credentials_env: "OPENAPI_MCP_HEADERS".to_string(),
        }
    }
}

/// Per-connection stream settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StreamConfig {
    pub heartbeat_interval_secs: u64,
    pub channel_capacity: usize,
    pub max_frame_bytes: usize,
}

impl StreamConfig {
    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_secs(self.heartbeat_interval_secs)
    }
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            heartbeat_interval_secs: 30,
            channel_capacity: 64,
            max_frame_bytes: 1024 * 1024,
        }
    }
}
