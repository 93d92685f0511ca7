use super::error::{AttemptError, TransportError};
use super::retry::RetryPolicy;
use crate::util::validate_url;
use futures::StreamExt;
use reqwest::Method;
use std::collections::HashMap;
use std::time::Duration;
use url::Url;

/// User-Agent sent with every request
pub const USER_AGENT: &str = concat!("feedrelay/", env!("CARGO_PKG_VERSION"));

/// Response bodies above this size are rejected (10MB)
pub const MAX_RESPONSE_SIZE: usize = 10 * 1024 * 1024;

/// Per-request settings layered on top of the client's [`RetryPolicy`].
#[derive(Debug, Clone)]
pub struct RequestSpec {
    pub method: Method,
    pub headers: Vec<(String, String)>,
    pub body: Option<String>,
    /// Overrides the client's per-attempt timeout
    pub timeout: Option<Duration>,
    /// Overrides the client's retry count
    pub retries: Option<u32>,
}

impl RequestSpec {
    pub fn get() -> Self {
        Self {
            method: Method::GET,
            headers: Vec::new(),
            body: None,
            timeout: None,
            retries: None,
        }
    }

    /// POST with a JSON body and matching `Content-Type`.
    pub fn post_json(body: String) -> Self {
        Self {
            method: Method::POST,
            headers: vec![("Content-Type".to_string(), "application/json".to_string())],
            body: Some(body),
            timeout: None,
            retries: None,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn with_retries(mut self, retries: u32) -> Self {
        self.retries = Some(retries);
        self
    }
}

/// A successful (2xx) response with its body fully read.
#[derive(Debug, Clone)]
pub struct HttpResponse {
    pub status: u16,
    pub body: Vec<u8>,
    /// Header names are lowercase; repeated headers are joined with `", "`
    pub headers: HashMap<String, String>,
}

impl HttpResponse {
    /// Body decoded as UTF-8, replacing invalid sequences.
    pub fn text(&self) -> std::borrow::Cow<'_, str> {
        String::from_utf8_lossy(&self.body)
    }
}

/// HTTP client with per-attempt timeout and fixed-delay retry.
///
/// Cloning is cheap: `reqwest::Client` is reference-counted internally.
#[derive(Debug, Clone)]
pub struct TransportClient {
    client: reqwest::Client,
    policy: RetryPolicy,
    max_response_size: usize,
}

impl TransportClient {
    pub fn new(policy: RetryPolicy) -> Self {
        Self::with_client(reqwest::Client::new(), policy)
    }

    /// Builds a transport around an existing `reqwest::Client` (custom TLS, proxies).
    pub fn with_client(client: reqwest::Client, policy: RetryPolicy) -> Self {
        Self {
            client,
            policy,
            max_response_size: MAX_RESPONSE_SIZE,
        }
    }

    pub fn with_max_response_size(mut self, limit: usize) -> Self {
        self.max_response_size = limit;
        self
    }

    pub fn policy(&self) -> RetryPolicy {
        self.policy
    }

    /// Sends a request, retrying failed attempts according to the policy.
    ///
    /// # Errors
    ///
    /// - [`TransportError::InvalidUrl`] if `url` is not an http(s) URL; no
    ///   request is made
    /// - [`TransportError::Exhausted`] once every attempt has failed
    pub async fn send(&self, url: &str, spec: &RequestSpec) -> Result<HttpResponse, TransportError> {
        let url = validate_url(url)?;

        let policy = RetryPolicy {
            timeout: spec.timeout.unwrap_or(self.policy.timeout),
            retries: spec.retries.unwrap_or(self.policy.retries),
            delay: self.policy.delay,
        };
        let label = format!("{} {}", spec.method, redacted(&url));
        let url = &url;

        policy.run(&label, move |_| self.attempt(url, spec)).await
    }

    /// Convenience for `send(url, &RequestSpec::get())`.
    pub async fn get(&self, url: &str) -> Result<HttpResponse, TransportError> {
        self.send(url, &RequestSpec::get()).await
    }

    async fn attempt(&self, url: &Url, spec: &RequestSpec) -> Result<HttpResponse, AttemptError> {
        let mut request = self
            .client
            .request(spec.method.clone(), url.clone())
            .header(reqwest::header::USER_AGENT, USER_AGENT);

        for (name, value) in &spec.headers {
            request = request.header(name.as_str(), value.as_str());
        }
        if let Some(body) = &spec.body {
            request = request.body(body.clone());
        }

        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(AttemptError::from_status(status));
        }

        let mut headers: HashMap<String, String> = HashMap::new();
        for (name, value) in response.headers() {
            if let Ok(value) = value.to_str() {
                headers
                    .entry(name.as_str().to_string())
                    .and_modify(|existing| {
                        existing.push_str(", ");
                        existing.push_str(value);
                    })
                    .or_insert_with(|| value.to_string());
            }
        }

        let body = read_limited_bytes(response, self.max_response_size).await?;

        Ok(HttpResponse {
            status: status.as_u16(),
            body,
            headers,
        })
    }
}

/// Scheme, host and port only: paths and queries can hold webhook tokens.
fn redacted(url: &Url) -> String {
    match url.port() {
        Some(port) => format!("{}://{}:{}", url.scheme(), url.host_str().unwrap_or(""), port),
        None => format!("{}://{}", url.scheme(), url.host_str().unwrap_or("")),
    }
}

async fn read_limited_bytes(
    response: reqwest::Response,
    limit: usize,
) -> Result<Vec<u8>, AttemptError> {
    // Fast path: check Content-Length header
    if let Some(len) = response.content_length() {
        if len > limit as u64 {
            return Err(AttemptError::ResponseTooLarge(limit));
        }
    }

    let mut bytes = Vec::new();
    let mut stream = response.bytes_stream();

    while let Some(chunk) = stream.next().await {
        let chunk = chunk?;
        if bytes.len().saturating_add(chunk.len()) > limit {
            return Err(AttemptError::ResponseTooLarge(limit));
        }
        bytes.extend_from_slice(&chunk);
    }

    Ok(bytes)
}
