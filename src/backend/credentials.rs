use crate::error::{BridgeError, Result};
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use serde_json::Value;
use std::fmt;
use tracing::{debug, info};

/// Static outbound headers used to authenticate backend requests.
///
/// Loaded once at startup and handed to [`super::HttpBackend`]; request
/// handlers never look at the environment themselves. `Debug` only prints
/// header names so secrets never end up in logs.
#[derive(Clone, Default)]
pub struct Credentials {
    headers: HeaderMap,
    configured: bool,
}

impl Credentials {
    /// An empty credential set (unauthenticated backend calls).
    pub fn empty() -> Self {
        Self::default()
    }

    /// Read credentials from the JSON object stored in environment variable `var`.
    ///
    /// An unset variable yields an empty set; a set but malformed variable is an error.
    pub fn from_env(var: &str) -> Result<Self> {
        match std::env::var(var) {
            Ok(raw) => {
                let credentials = Self::from_json(&raw).map_err(|e| {
                    BridgeError::Config(format!("Invalid credentials in ${}: {}", var, e))
                })?;
                info!(
                    "Loaded {} credential header(s) from ${}",
                    credentials.len(),
                    var
                );
                Ok(credentials)
            }
            Err(std::env::VarError::NotPresent) => {
                debug!("${} not set, backend calls will be unauthenticated", var);
                Ok(Self::empty())
            }
            Err(e) => Err(BridgeError::Config(format!("Cannot read ${}: {}", var, e))),
        }
    }

    /// Parse a JSON object mapping header names to string values.
    pub fn from_json(raw: &str) -> Result<Self> {
        let value: Value = serde_json::from_str(raw)?;
        let Value::Object(map) = value else {
            return Err(BridgeError::Config(
                "credentials must be a JSON object of header names to values".to_string(),
            ));
        };

        let mut headers = HeaderMap::with_capacity(map.len());
        for (name, value) in map {
            let Value::String(value) = value else {
                return Err(BridgeError::Config(format!(
                    "credential header '{}' must be a string",
                    name
                )));
            };
            let header_name = HeaderName::from_bytes(name.as_bytes()).map_err(|_| {
                BridgeError::Config(format!("'{}' is not a valid header name", name))
            })?;
            let mut header_value = HeaderValue::from_str(&value).map_err(|_| {
                BridgeError::Config(format!("value of header '{}' is not valid", name))
            })?;
            header_value.set_sensitive(true);
            headers.insert(header_name, header_value);
        }

        Ok(Self {
            headers,
            configured: true,
        })
    }

    /// Whether a credential source was present at startup, even if it held no headers.
    pub fn is_configured(&self) -> bool {
        self.configured
    }

    pub fn len(&self) -> usize {
        self.headers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.headers.is_empty()
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field(
                "headers",
                &self.headers.keys().map(HeaderName::as_str).collect::<Vec<_>>(),
            )
            .field("configured", &self.configured)
            .finish()
    }
}
