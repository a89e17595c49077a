//! reqwest-backed [`ApiClient`].
//!
//! Requests go to `<base_url>/api/v1<operation>` with bearer auth. A
//! connection failure is retried with exponential backoff. A timeout is
//! retried for GET and PATCH only: a timed-out POST may already have
//! created the record. An HTTP error status is returned to the caller
//! immediately.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use backoff::backoff::Backoff;
use backoff::ExponentialBackoff;
use serde_json::Value;
use tracing::{debug, warn};

use super::{ApiClient, ApiResponse, Method};
use crate::error::{ApiError, SyncError, SyncResult};

/// Path prefix of the versioned REST API.
const API_PREFIX: &str = "/api/v1";

/// HTTP client for one integration.
pub struct HttpApiClient {
    client: reqwest::Client,
    base: String,
    token: String,
    requests: AtomicU64,
}

impl HttpApiClient {
    /// Creates a client.
    ///
    /// ## Arguments
    /// * `base_url` - Service root, e.g. `https://crm.example.com`
    /// * `token` - Bearer token
    /// * `timeout` - Per-request timeout
    pub fn new(base_url: &str, token: impl Into<String>, timeout: Duration) -> SyncResult<Self> {
        let parsed = url::Url::parse(base_url)?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(SyncError::InvalidUrl(format!(
                "{}: scheme must be http or https",
                base_url
            )));
        }

        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| SyncError::InvalidConfig(format!("HTTP client: {}", e)))?;

        Ok(HttpApiClient {
            client,
            base: format!("{}{}", base_url.trim_end_matches('/'), API_PREFIX),
            token: token.into(),
            requests: AtomicU64::new(0),
        })
    }

    fn create_backoff() -> ExponentialBackoff {
        ExponentialBackoff {
            initial_interval: Duration::from_millis(250),
            max_interval: Duration::from_secs(5),
            multiplier: 2.0,
            max_elapsed_time: Some(Duration::from_secs(30)),
            ..Default::default()
        }
    }

    fn build(&self, operation: &str, parameters: &Value, method: Method) -> reqwest::RequestBuilder {
        let url = format!("{}{}", self.base, operation);

        let builder = match method {
            Method::Get => self.client.get(&url).query(&query_pairs(parameters)),
            Method::Post => self.client.post(&url).json(parameters),
            Method::Patch => self.client.patch(&url).json(parameters),
        };

        builder.bearer_auth(&self.token)
    }

    /// Whether a failed send may be repeated.
    fn is_retryable(method: Method, error: &reqwest::Error) -> bool {
        error.is_connect() || (error.is_timeout() && method.is_idempotent())
    }

    async fn send_once(
        &self,
        operation: &str,
        parameters: &Value,
        method: Method,
    ) -> Result<reqwest::Response, reqwest::Error> {
        self.requests.fetch_add(1, Ordering::Relaxed);
        self.build(operation, parameters, method).send().await
    }
}

#[async_trait]
impl ApiClient for HttpApiClient {
    async fn request(
        &self,
        operation: &str,
        parameters: Value,
        method: Method,
    ) -> Result<ApiResponse, ApiError> {
        let mut backoff = Self::create_backoff();
        let mut attempt = 0u32;

        let response = loop {
            attempt += 1;

            match self.send_once(operation, &parameters, method).await {
                Ok(response) => break response,
                Err(e) if Self::is_retryable(method, &e) => match backoff.next_backoff() {
                    Some(duration) => {
                        warn!(%method, operation, attempt, ?duration, error = %e, "Request failed, retrying");
                        tokio::time::sleep(duration).await;
                    }
                    None => return Err(ApiError::transport(e.to_string())),
                },
                Err(e) => return Err(ApiError::transport(e.to_string())),
            }
        };

        let status = response.status();
        debug!(%method, operation, status = status.as_u16(), "Response received");

        // Create/update responses may have an empty body.
        let text = response
            .text()
            .await
            .map_err(|e| ApiError::transport(e.to_string()))?;
        let body = if text.trim().is_empty() {
            Value::Null
        } else {
            serde_json::from_str(&text).unwrap_or(Value::String(text))
        };

        if status.as_u16() > 299 {
            let message = body
                .get("message")
                .or_else(|| body.get("error"))
                .and_then(Value::as_str)
                .map(str::to_string)
                .unwrap_or_else(|| status.canonical_reason().unwrap_or("Request failed").to_string());
            return Err(ApiError::new(message, status.as_u16()));
        }

        Ok(ApiResponse {
            status_code: status.as_u16(),
            body,
        })
    }

    fn request_count(&self) -> u64 {
        self.requests.load(Ordering::Relaxed)
    }
}

/// Flattens GET parameters into query pairs, dropping nulls.
fn query_pairs(parameters: &Value) -> Vec<(String, String)> {
    let Some(map) = parameters.as_object() else {
        return Vec::new();
    };

    map.iter()
        .filter_map(|(key, value)| {
            let rendered = match value {
                Value::Null => return None,
                Value::String(s) => s.clone(),
                other => other.to_string(),
            };
            Some((key.clone(), rendered))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::atomic::AtomicUsize;
    use std::sync::Arc;
    use tokio::io::AsyncReadExt;
    use tokio::net::TcpListener;

    #[test]
    fn test_query_pairs() {
        let pairs = query_pairs(&json!({
            "page": 3,
            "modified_since": "2024-03-05 09:00:00",
            "skip": null
        }));

        assert_eq!(
            pairs,
            vec![
                ("modified_since".to_string(), "2024-03-05 09:00:00".to_string()),
                ("page".to_string(), "3".to_string()),
            ]
        );
        assert!(query_pairs(&Value::Null).is_empty());
    }

    #[test]
    fn test_new_validates_base_url() {
        let client =
            HttpApiClient::new("https://crm.example.com/", "token", Duration::from_secs(5)).unwrap();
        assert_eq!(client.base, "https://crm.example.com/api/v1");
        assert_eq!(client.request_count(), 0);

        assert!(HttpApiClient::new("not a url", "t", Duration::from_secs(5)).is_err());
        assert!(HttpApiClient::new("ftp://crm.example.com", "t", Duration::from_secs(5)).is_err());
    }

    #[tokio::test]
    async fn test_unreachable_host_is_transport_error() {
        let client =
            HttpApiClient::new("http://127.0.0.1:9", "token", Duration::from_millis(200)).unwrap();

        // Drive a single attempt so the test does not wait out the backoff.
        let err = client
            .send_once("/people", &json!({"page": 1}), Method::Get)
            .await
            .unwrap_err();
        assert!(err.is_connect() || err.is_timeout());
        assert_eq!(client.request_count(), 1);
    }

    #[test]
    fn test_only_idempotent_methods_retry_timeouts() {
        assert!(Method::Get.is_idempotent());
        assert!(Method::Patch.is_idempotent());
        assert!(!Method::Post.is_idempotent());
    }

    /// Accepts connections, reads the request, never answers.
    async fn silent_server() -> (String, Arc<AtomicUsize>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let connections = Arc::new(AtomicUsize::new(0));

        let counter = connections.clone();
        tokio::spawn(async move {
            let mut open = Vec::new();
            while let Ok((mut socket, _)) = listener.accept().await {
                counter.fetch_add(1, Ordering::SeqCst);
                let mut buf = [0u8; 4096];
                let _ = socket.read(&mut buf).await;
                open.push(socket);
            }
        });

        (format!("http://{}", addr), connections)
    }

    #[tokio::test]
    async fn test_timed_out_create_is_not_resent() {
        let (base, connections) = silent_server().await;
        let client = HttpApiClient::new(&base, "token", Duration::from_millis(200)).unwrap();

        let result = tokio::time::timeout(
            Duration::from_secs(3),
            client.request("/people", json!({"email": "ada@example.com"}), Method::Post),
        )
        .await
        .expect("a timed-out POST must fail without backing off");

        let err = result.unwrap_err();
        assert!(err.is_transport());
        assert_eq!(client.request_count(), 1);
        assert_eq!(connections.load(Ordering::SeqCst), 1);
    }
}
