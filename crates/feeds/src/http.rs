//! HTTP transport seam and the retrying JSON client.
//!
//! Every provider and webhook call goes through [`RetryingClient`], which owns
//! the retry policy. The transport itself only moves bytes; status checks,
//! retries and JSON decoding happen here so they can be exercised against
//! [`crate::mock::MockTransport`] without a network.

use crate::retry::{RetryPolicy, Sleeper, TokioSleeper};
use async_trait::async_trait;
use serde_json::Value;
use stablecoin_core::ReportError;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Timeout applied to each individual request.
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(20);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HttpMethod {
    Get,
    Post,
}

impl HttpMethod {
    pub fn as_str(self) -> &'static str {
        match self {
            HttpMethod::Get => "GET",
            HttpMethod::Post => "POST",
        }
    }
}

/// An outbound request.
///
/// `endpoint` is a short label used in errors and logs instead of the URL,
/// since webhook URLs carry their token in the path.
#[derive(Debug, Clone, PartialEq)]
pub struct HttpRequest {
    pub endpoint: &'static str,
    pub method: HttpMethod,
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub query: Vec<(String, String)>,
    pub body: Option<Value>,
}

impl HttpRequest {
    pub fn get(endpoint: &'static str, url: impl Into<String>) -> Self {
        Self {
            endpoint,
            method: HttpMethod::Get,
            url: url.into(),
            headers: Vec::new(),
            query: Vec::new(),
            body: None,
        }
    }

    pub fn post_json(endpoint: &'static str, url: impl Into<String>, body: Value) -> Self {
        Self {
            endpoint,
            method: HttpMethod::Post,
            url: url.into(),
            headers: Vec::new(),
            query: Vec::new(),
            body: Some(body),
        }
    }

    pub fn header(mut self, name: &str, value: &str) -> Self {
        self.headers.push((name.to_string(), value.to_string()));
        self
    }

    pub fn query(mut self, name: &str, value: impl ToString) -> Self {
        self.query.push((name.to_string(), value.to_string()));
        self
    }

    pub fn header_value(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    pub fn query_value(&self, name: &str) -> Option<&str> {
        self.query
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }
}

/// Raw response: status code and body text.
#[derive(Debug, Clone, PartialEq)]
pub struct HttpResponse {
    pub status: u16,
    pub body: String,
}

impl HttpResponse {
    pub fn new(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Sends a single request. Connection failures and timeouts are errors;
/// any HTTP status, including errors, is a response.
#[async_trait]
pub trait HttpTransport: Send + Sync {
    async fn execute(&self, request: &HttpRequest) -> Result<HttpResponse, ReportError>;
}

/// Transport backed by `reqwest`.
#[derive(Debug, Clone)]
pub struct ReqwestTransport {
    client: reqwest::Client,
}

impl ReqwestTransport {
    pub fn new(timeout: Duration) -> Result<Self, ReportError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ReportError::Config(format!("Failed to build HTTP client: {}", e)))?;
        Ok(Self { client })
    }
}

#[async_trait]
impl HttpTransport for ReqwestTransport {
    async fn execute(&self, request: &HttpRequest) -> Result<HttpResponse, ReportError> {
        let mut builder = match request.method {
            HttpMethod::Get => self.client.get(&request.url),
            HttpMethod::Post => self.client.post(&request.url),
        };
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        if !request.query.is_empty() {
            builder = builder.query(&request.query);
        }
        if let Some(body) = &request.body {
            builder = builder.json(body);
        }

        let response = builder
            .send()
            .await
            .map_err(|e| transport_error(request.endpoint, e))?;
        let status = response.status().as_u16();
        let body = response
            .text()
            .await
            .map_err(|e| transport_error(request.endpoint, e))?;

        Ok(HttpResponse { status, body })
    }
}

fn transport_error(endpoint: &str, error: reqwest::Error) -> ReportError {
    if error.is_timeout() {
        ReportError::Timeout(endpoint.to_string())
    } else {
        ReportError::Connection {
            endpoint: endpoint.to_string(),
            message: error.without_url().to_string(),
        }
    }
}

/// Applies the retry policy on top of a transport.
#[derive(Clone)]
pub struct RetryingClient {
    transport: Arc<dyn HttpTransport>,
    sleeper: Arc<dyn Sleeper>,
    policy: RetryPolicy,
}

impl RetryingClient {
    pub fn new(transport: Arc<dyn HttpTransport>) -> Self {
        Self {
            transport,
            sleeper: Arc::new(TokioSleeper),
            policy: RetryPolicy::default(),
        }
    }

    pub fn with_sleeper(mut self, sleeper: Arc<dyn Sleeper>) -> Self {
        self.sleeper = sleeper;
        self
    }

    pub fn with_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn sleeper(&self) -> &Arc<dyn Sleeper> {
        &self.sleeper
    }

    /// Send a request, retrying transient failures.
    ///
    /// Returns the first successful (2xx) response, or the last error once
    /// the policy gives up.
    pub async fn send(&self, request: &HttpRequest) -> Result<HttpResponse, ReportError> {
        let mut attempt = 1;
        loop {
            let error = match self.transport.execute(request).await {
                Ok(response) if response.is_success() => return Ok(response),
                Ok(response) => ReportError::HttpStatus {
                    status: response.status,
                    endpoint: request.endpoint.to_string(),
                },
                Err(e) => e,
            };

            if !self.policy.should_retry(&error, attempt) {
                debug!(
                    endpoint = request.endpoint,
                    attempt,
                    error = %error,
                    "Request failed, not retrying"
                );
                return Err(error);
            }

            let delay = self.policy.delay_for_attempt(attempt);
            warn!(
                endpoint = request.endpoint,
                attempt,
                max_attempts = self.policy.max_attempts(),
                delay_ms = delay.as_millis() as u64,
                error = %error,
                "Transient request failure, retrying"
            );
            self.sleeper.sleep(delay).await;
            attempt += 1;
        }
    }

    /// Send a request and decode the body as JSON.
    pub async fn request_json(&self, request: &HttpRequest) -> Result<Value, ReportError> {
        let response = self.send(request).await?;
        serde_json::from_str(&response.body).map_err(|_| {
            ReportError::data_unavailable(format!("Invalid JSON response from {}", request.endpoint))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::{MockTransport, RecordingSleeper};
    use pretty_assertions::assert_eq;
    use serde_json::json;

    const URL: &str = "https://api.test/data";

    fn client(transport: &Arc<MockTransport>, sleeper: &Arc<RecordingSleeper>) -> RetryingClient {
        RetryingClient::new(transport.clone()).with_sleeper(sleeper.clone())
    }

    #[tokio::test]
    async fn test_retries_rate_limit_then_succeeds() {
        let transport = Arc::new(MockTransport::new());
        transport.push_status(HttpMethod::Get, URL, 429);
        transport.push_status(HttpMethod::Get, URL, 503);
        transport.push_json(HttpMethod::Get, URL, json!({"ok": true}));
        let sleeper = Arc::new(RecordingSleeper::new());

        let value = client(&transport, &sleeper)
            .request_json(&HttpRequest::get("test", URL))
            .await
            .unwrap();

        assert_eq!(value, json!({"ok": true}));
        assert_eq!(
            sleeper.recorded(),
            vec![Duration::from_secs(1), Duration::from_secs(2)]
        );
        assert_eq!(transport.requests().len(), 3);
    }

    #[tokio::test]
    async fn test_gives_up_after_max_attempts_with_last_error() {
        let transport = Arc::new(MockTransport::new());
        transport.push_status(HttpMethod::Get, URL, 500);
        transport.push_status(HttpMethod::Get, URL, 502);
        transport.push_status(HttpMethod::Get, URL, 503);
        let sleeper = Arc::new(RecordingSleeper::new());

        let err = client(&transport, &sleeper)
            .send(&HttpRequest::get("test", URL))
            .await
            .unwrap_err();

        assert!(matches!(err, ReportError::HttpStatus { status: 503, .. }));
        assert_eq!(transport.requests().len(), 3);
        assert_eq!(sleeper.recorded().len(), 2);
    }

    #[tokio::test]
    async fn test_client_error_not_retried() {
        let transport = Arc::new(MockTransport::new());
        transport.push_status(HttpMethod::Get, URL, 404);
        let sleeper = Arc::new(RecordingSleeper::new());

        let err = client(&transport, &sleeper)
            .send(&HttpRequest::get("test", URL))
            .await
            .unwrap_err();

        assert_eq!(err.to_string(), "HTTP 404 from test");
        assert_eq!(transport.requests().len(), 1);
        assert!(sleeper.recorded().is_empty());
    }

    #[tokio::test]
    async fn test_connection_error_retried() {
        let transport = Arc::new(MockTransport::new());
        transport.push_error(
            HttpMethod::Get,
            URL,
            ReportError::Connection {
                endpoint: "test".to_string(),
                message: "refused".to_string(),
            },
        );
        transport.push_json(HttpMethod::Get, URL, json!([]));
        let sleeper = Arc::new(RecordingSleeper::new());

        let value = client(&transport, &sleeper)
            .request_json(&HttpRequest::get("test", URL))
            .await
            .unwrap();
        assert_eq!(value, json!([]));
        assert_eq!(sleeper.recorded(), vec![Duration::from_secs(1)]);
    }

    #[tokio::test]
    async fn test_invalid_json_is_data_error() {
        let transport = Arc::new(MockTransport::new());
        transport.push_response(HttpMethod::Get, URL, HttpResponse::new(200, "<html>"));
        let sleeper = Arc::new(RecordingSleeper::new());

        let err = client(&transport, &sleeper)
            .request_json(&HttpRequest::get("test", URL))
            .await
            .unwrap_err();
        assert!(err.is_data_unavailable());
        assert_eq!(err.to_string(), "Invalid JSON response from test");
        assert_eq!(transport.requests().len(), 1);
    }

    #[test]
    fn test_request_builders() {
        let request = HttpRequest::get("dune.results", URL)
            .header("X-Dune-API-Key", "secret")
            .query("offset", 0)
            .query("limit", 1000);
        assert_eq!(request.header_value("x-dune-api-key"), Some("secret"));
        assert_eq!(request.query_value("limit"), Some("1000"));
        assert_eq!(request.method.as_str(), "GET");
        assert!(request.body.is_none());
    }
}
