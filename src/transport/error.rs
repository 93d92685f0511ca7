use crate::util::UrlValidationError;
use std::time::Duration;
use thiserror::Error;

/// Failure of a single request attempt.
///
/// The `Display` text of these variants is embedded verbatim in
/// [`TransportError::Exhausted`], so it is kept stable.
#[derive(Debug, Error)]
pub enum AttemptError {
    /// Response arrived with a non-2xx status code
    #[error("HTTP error {code}: {reason}")]
    Status { code: u16, reason: String },
    /// Attempt exceeded the per-attempt timeout
    #[error("Request timeout after {}ms", .0.as_millis())]
    Timeout(Duration),
    /// Network-level error (DNS, connection, TLS, body stream)
    #[error("Request failed: {0}")]
    Request(#[from] reqwest::Error),
    /// Response body exceeded the size limit
    #[error("Response too large (exceeds {0} bytes)")]
    ResponseTooLarge(usize),
}

impl AttemptError {
    pub(crate) fn from_status(status: reqwest::StatusCode) -> Self {
        AttemptError::Status {
            code: status.as_u16(),
            reason: status.canonical_reason().unwrap_or("Unknown").to_string(),
        }
    }
}

/// Errors returned by [`TransportClient::send`](super::TransportClient::send).
#[derive(Debug, Error)]
pub enum TransportError {
    /// The URL was rejected before any request was made.
    ///
    /// The URL itself is deliberately left out of the message: webhook URLs
    /// carry credentials.
    #[error("Invalid request URL: {0}")]
    InvalidUrl(#[from] UrlValidationError),
    /// Every attempt failed; `last` is the final attempt's error.
    #[error("HTTP request failed after {attempts} attempts: {last}")]
    Exhausted {
        attempts: u32,
        #[source]
        last: AttemptError,
    },
}

impl TransportError {
    /// HTTP status of the final attempt, if it failed on a status code.
    pub fn status(&self) -> Option<u16> {
        match self {
            TransportError::Exhausted {
                last: AttemptError::Status { code, .. },
                ..
            } => Some(*code),
            _ => None,
        }
    }
}
