//! JSON REST client for Redmine.
//!
//! [`RedmineClient::request_json`] is the only network primitive. It retries
//! throttling (429) and server errors (5xx) as well as transport failures,
//! with a linear backoff (`backoff * attempt`). What it raises once retries
//! run out is what drives cache fallback upstream:
//!
//! - the server kept answering with 429/5xx → [`Error::Backend`]
//! - no response at all → [`Error::RedmineUnavailable`]
//!
//! Transport sits behind [`HttpTransport`] so tests can substitute an
//! in-memory Redmine.

use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use serde_json::{Value, json};

use crate::error::{Error, NetworkErrorKind, Result};

pub const API_KEY_HEADER: &str = "X-Redmine-API-Key";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HttpMethod {
    Get,
    Post,
    Put,
}

impl HttpMethod {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Get => "GET",
            Self::Post => "POST",
            Self::Put => "PUT",
        }
    }
}

impl fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct HttpRequest {
    pub method: HttpMethod,
    pub url: String,
    pub query: Vec<(String, String)>,
    pub headers: Vec<(String, String)>,
    pub body: Option<Value>,
}

impl HttpRequest {
    /// Value of a query parameter, if present.
    #[must_use]
    pub fn param(&self, key: &str) -> Option<&str> {
        self.query
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    pub status: u16,
    pub body: String,
}

/// A request that produced no HTTP response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportError {
    pub kind: NetworkErrorKind,
    pub message: String,
}

/// Sends one HTTP request.
pub trait HttpTransport: Send + Sync {
    fn send(
        &self,
        request: HttpRequest,
    ) -> impl Future<Output = std::result::Result<HttpResponse, TransportError>> + Send;
}

impl<T: HttpTransport> HttpTransport for Arc<T> {
    fn send(
        &self,
        request: HttpRequest,
    ) -> impl Future<Output = std::result::Result<HttpResponse, TransportError>> + Send {
        (**self).send(request)
    }
}

/// `reqwest`-backed transport.
#[derive(Debug, Clone)]
pub struct ReqwestTransport {
    client: reqwest::Client,
}

impl ReqwestTransport {
    /// Build a transport whose every request carries `timeout`.
    ///
    /// # Errors
    ///
    /// Returns an error if the TLS backend cannot be initialised.
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| Error::Backend(format!("failed to build HTTP client: {e}")))?;
        Ok(Self { client })
    }
}

fn classify(error: &reqwest::Error) -> NetworkErrorKind {
    if error.is_timeout() {
        NetworkErrorKind::Timeout
    } else if error.is_connect() {
        NetworkErrorKind::Connect
    } else {
        NetworkErrorKind::Request
    }
}

impl HttpTransport for ReqwestTransport {
    async fn send(&self, request: HttpRequest) -> std::result::Result<HttpResponse, TransportError> {
        let method = match request.method {
            HttpMethod::Get => reqwest::Method::GET,
            HttpMethod::Post => reqwest::Method::POST,
            HttpMethod::Put => reqwest::Method::PUT,
        };
        let mut builder = self.client.request(method, &request.url).query(&request.query);
        for (name, value) in &request.headers {
            builder = builder.header(name, value);
        }
        if let Some(body) = &request.body {
            builder = builder.json(body);
        }

        let to_transport = |e: reqwest::Error| TransportError {
            kind: classify(&e),
            message: e.to_string(),
        };
        let response = builder.send().await.map_err(to_transport)?;
        let status = response.status().as_u16();
        let body = response.text().await.map_err(to_transport)?;
        Ok(HttpResponse { status, body })
    }
}

/// Retry budget for one logical request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub attempts: u32,
    pub backoff: Duration,
}

impl RetryPolicy {
    #[must_use]
    pub const fn new(attempts: u32, backoff: Duration) -> Self {
        Self { attempts, backoff }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(3, Duration::from_millis(500))
    }
}

fn is_retryable_status(status: u16) -> bool {
    status == 429 || (500..600).contains(&status)
}

/// Empty or non-JSON bodies read as `{}`.
fn parse_body(body: &str) -> Value {
    if body.trim().is_empty() {
        return json!({});
    }
    serde_json::from_str(body).unwrap_or_else(|_| json!({}))
}

fn snippet(body: &str) -> String {
    let trimmed = body.trim();
    match trimmed.char_indices().nth(200) {
        Some((idx, _)) => format!("{}...", &trimmed[..idx]),
        None => trimmed.to_string(),
    }
}

/// Authenticated client for one Redmine instance.
#[derive(Debug, Clone)]
pub struct RedmineClient<T> {
    transport: T,
    base_url: String,
    api_key: String,
    retry: RetryPolicy,
}

impl<T: HttpTransport> RedmineClient<T> {
    pub fn new(transport: T, base_url: &str, api_key: &str, retry: RetryPolicy) -> Self {
        Self {
            transport,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
            retry,
        }
    }

    #[must_use]
    pub fn retry(&self) -> RetryPolicy {
        self.retry
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    /// Send a request and decode the JSON response.
    ///
    /// # Errors
    ///
    /// `Backend` for a non-success status (after retries for 429/5xx),
    /// `RedmineUnavailable` if no attempt got a response.
    pub async fn request_json(
        &self,
        method: HttpMethod,
        path: &str,
        payload: Option<&Value>,
        params: &[(String, String)],
        policy: RetryPolicy,
    ) -> Result<Value> {
        let request = HttpRequest {
            method,
            url: self.url(path),
            query: params.to_vec(),
            headers: vec![(API_KEY_HEADER.to_string(), self.api_key.clone())],
            body: payload.cloned(),
        };
        let attempts = policy.attempts.max(1);
        let mut last_error = None;

        for attempt in 1..=attempts {
            tracing::debug!(%method, path, attempt, "redmine request");
            match self.transport.send(request.clone()).await {
                Ok(response) if (200..300).contains(&response.status) => {
                    return Ok(parse_body(&response.body));
                }
                Ok(response) if is_retryable_status(response.status) => {
                    tracing::warn!(%method, path, attempt, status = response.status, "redmine request throttled or failed; retrying");
                    last_error = Some(Error::Backend(format!(
                        "Redmine {method} {path} failed with HTTP {}: {}",
                        response.status,
                        snippet(&response.body)
                    )));
                }
                Ok(response) => {
                    return Err(Error::Backend(format!(
                        "Redmine {method} {path} rejected with HTTP {}: {}",
                        response.status,
                        snippet(&response.body)
                    )));
                }
                Err(e) => {
                    tracing::warn!(%method, path, attempt, kind = %e.kind, error = %e.message, "redmine unreachable");
                    last_error = Some(Error::RedmineUnavailable {
                        kind: e.kind,
                        message: e.message,
                    });
                }
            }
            if attempt < attempts {
                tokio::time::sleep(policy.backoff * attempt).await;
            }
        }

        Err(last_error.unwrap_or_else(|| {
            Error::Backend(format!("Redmine {method} {path} was never attempted"))
        }))
    }

    /// GET with the client's default retry policy.
    ///
    /// # Errors
    ///
    /// See [`Self::request_json`].
    pub async fn get(&self, path: &str, params: &[(String, String)]) -> Result<Value> {
        self.request_json(HttpMethod::Get, path, None, params, self.retry)
            .await
    }

    /// POST a JSON payload.
    ///
    /// # Errors
    ///
    /// See [`Self::request_json`].
    pub async fn post(&self, path: &str, payload: &Value) -> Result<Value> {
        self.request_json(HttpMethod::Post, path, Some(payload), &[], self.retry)
            .await
    }

    /// PUT a JSON payload.
    ///
    /// # Errors
    ///
    /// See [`Self::request_json`].
    pub async fn put(&self, path: &str, payload: &Value) -> Result<Value> {
        self.request_json(HttpMethod::Put, path, Some(payload), &[], self.retry)
            .await
    }
}
