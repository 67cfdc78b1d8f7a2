use super::credentials::Credentials;
use crate::error::{BridgeError, Result};
use crate::mcp::HttpMethod;
use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, CONTENT_TYPE};
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, error, warn};

/// A completed HTTP exchange with the backend.
///
/// The status is informational only; the body is handed to the client
/// whatever the status was.
#[derive(Debug, Clone, PartialEq)]
pub struct BackendResponse {
    pub status: u16,
    pub body: Value,
}

impl BackendResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// The request/response contract the bridge needs from a backend.
#[async_trait]
pub trait Backend: Send + Sync {
    /// Issue exactly one request. Errors are transport-level faults only.
    async fn call(
        &self,
        method: HttpMethod,
        path: &str,
        body: Option<&Value>,
    ) -> Result<BackendResponse>;
}

/// `reqwest` implementation talking to a fixed base URL.
#[derive(Clone)]
pub struct HttpBackend {
    http: reqwest::Client,
    base_url: String,
    headers: HeaderMap,
    timeout: Duration,
}

impl HttpBackend {
    pub fn new(
        base_url: impl Into<String>,
        credentials: &Credentials,
        timeout: Duration,
    ) -> Result<Self> {
        let http = reqwest::Client::builder()
            .build()
            .map_err(|e| BridgeError::Config(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            http,
            base_url: base_url.into(),
            headers: merge_headers(credentials),
            timeout,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub(crate) fn url_for(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }
}

/// JSON content type first, then credentials so they win on collision.
fn merge_headers(credentials: &Credentials) -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    for (name, value) in credentials.headers() {
        headers.insert(name.clone(), value.clone());
    }
    headers
}

#[async_trait]
impl Backend for HttpBackend {
    async fn call(
        &self,
        method: HttpMethod,
        path: &str,
        body: Option<&Value>,
    ) -> Result<BackendResponse> {
        let url = self.url_for(path);
        debug!("Backend request: {} {}", method, url);

        let mut request = self
            .http
            .request(method.into(), &url)
            .headers(self.headers.clone())
            .timeout(self.timeout);
        if let Some(body) = body {
            request = request.body(serde_json::to_vec(body)?);
        }

        let response = request.send().await.map_err(|e| {
            if e.is_timeout() {
                BridgeError::BackendTimeout(self.timeout)
            } else {
                error!("Backend request {} {} failed: {}", method, url, e);
                BridgeError::backend_fault(e)
            }
        })?;

        let status = response.status().as_u16();
        let bytes = response.bytes().await.map_err(|e| {
            if e.is_timeout() {
                BridgeError::BackendTimeout(self.timeout)
            } else {
                BridgeError::backend_fault(e)
            }
        })?;

        let body = if bytes.iter().all(u8::is_ascii_whitespace) {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).map_err(|e| {
                warn!(
                    "Backend returned a non-JSON body for {} {} (status {}): {}",
                    method, url, status, e
                );
                BridgeError::BackendFault(format!(
                    "response body is not valid JSON (status {}): {}",
                    status, e
                ))
            })?
        };

        debug!("Backend response: {} {} -> {}", method, url, status);
        Ok(BackendResponse { status, body })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::prelude::*;
    use serde_json::json;

    fn backend_for(server: &MockServer, credentials: &Credentials) -> HttpBackend {
        HttpBackend::new(server.url("/v1"), credentials, Duration::from_secs(5)).unwrap()
    }

    #[test]
    fn test_url_is_exact_concatenation() {
        let backend = HttpBackend::new(
            "https://api.notion.com/v1",
            &Credentials::empty(),
            Duration::from_secs(5),
        )
        .unwrap();
        assert_eq!(backend.url_for("/pages/1"), "https://api.notion.com/v1/pages/1");
        assert_eq!(backend.base_url(), "https://api.notion.com/v1");
    }

    #[test]
    fn test_credentials_override_content_type() {
        let creds = Credentials::from_json(
            r#"{"Content-Type": "application/vnd.custom+json", "Authorization": "Bearer t"}"#,
        )
        .unwrap();
        let headers = merge_headers(&creds);
        assert_eq!(headers[CONTENT_TYPE], "application/vnd.custom+json");
        assert_eq!(headers["authorization"], "Bearer t");
    }

    #[tokio::test]
    async fn test_get_sends_no_body() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(GET)
                    .path("/v1/pages/1")
                    .header("content-type", "application/json")
                    .body("");
                then.status(200).json_body(json!({"object": "page", "id": "1"}));
            })
            .await;

        let backend = backend_for(&server, &Credentials::empty());
        let response = backend.call(HttpMethod::Get, "/pages/1", None).await.unwrap();

        mock.assert_async().await;
        assert_eq!(response.status, 200);
        assert_eq!(response.body, json!({"object": "page", "id": "1"}));
    }

    #[tokio::test]
    async fn test_post_sends_json_body_and_credentials() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(POST)
                    .path("/v1/pages")
                    .header("content-type", "application/json")
                    .header("authorization", "Bearer secret")
                    .header("notion-version", "2022-06-28")
                    .json_body(json!({"title": "x"}));
                then.status(200).json_body(json!({"id": "new"}));
            })
            .await;

        let creds = Credentials::from_json(
            r#"{"Authorization": "Bearer secret", "Notion-Version": "2022-06-28"}"#,
        )
        .unwrap();
        let backend = backend_for(&server, &creds);
        let body = json!({"title": "x"});
        let response = backend
            .call(HttpMethod::Post, "/pages", Some(&body))
            .await
            .unwrap();

        mock.assert_async().await;
        assert_eq!(response.body["id"], "new");
    }

    #[tokio::test]
    async fn test_non_success_status_is_passed_through() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/v1/pages/missing");
                then.status(404)
                    .json_body(json!({"object": "error", "code": "object_not_found"}));
            })
            .await;

        let backend = backend_for(&server, &Credentials::empty());
        let response = backend
            .call(HttpMethod::Get, "/pages/missing", None)
            .await
            .unwrap();

        assert_eq!(response.status, 404);
        assert!(!response.is_success());
        assert_eq!(response.body["code"], "object_not_found");
    }

    #[tokio::test]
    async fn test_non_json_body_is_fault() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/v1/broken");
                then.status(502).body("<html>Bad Gateway</html>");
            })
            .await;

        let backend = backend_for(&server, &Credentials::empty());
        let err = backend
            .call(HttpMethod::Get, "/broken", None)
            .await
            .unwrap_err();

        assert!(matches!(err, BridgeError::BackendFault(_)));
        assert!(err.to_string().contains("502"));
    }

    #[tokio::test]
    async fn test_empty_body_is_null() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(DELETE).path("/v1/blocks/1");
                then.status(204);
            })
            .await;

        let backend = backend_for(&server, &Credentials::empty());
        let response = backend
            .call(HttpMethod::Delete, "/blocks/1", None)
            .await
            .unwrap();

        assert_eq!(response.status, 204);
        assert_eq!(response.body, Value::Null);
    }

    #[tokio::test]
    async fn test_connection_refused_is_fault() {
        // Nothing listens on port 9 (discard) on a test machine
        let backend = HttpBackend::new(
            "http://127.0.0.1:9/v1",
            &Credentials::empty(),
            Duration::from_secs(5),
        )
        .unwrap();

        let result = backend.call(HttpMethod::Get, "/pages/1", None).await;
        assert!(matches!(
            result,
            Err(BridgeError::BackendFault(_)) | Err(BridgeError::BackendTimeout(_))
        ));
    }
}
