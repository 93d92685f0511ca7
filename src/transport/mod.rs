//! Bounded-retry, timeout-bounded HTTP request primitive.
//!
//! Both the feed source and the webhook notifier go through
//! [`TransportClient::send`], which wraps a single request attempt in the
//! [`RetryPolicy`] decorator:
//!
//! - every attempt is bounded by a per-attempt timeout
//! - a non-2xx status, a transport error or a timeout fails the attempt
//! - failed attempts are retried after a fixed delay (no exponential backoff)
//! - when attempts run out the error names the attempt count and the last
//!   underlying failure
//!
//! # Example
//!
//! ```ignore
//! use feedrelay::transport::{RequestSpec, RetryPolicy, TransportClient};
//!
//! let client = TransportClient::new(RetryPolicy::default());
//! let response = client.send("https://example.com/feed.xml", &RequestSpec::get()).await?;
//! println!("{} bytes", response.body.len());
//! ```

mod client;
mod error;
mod retry;

pub use client::{HttpResponse, RequestSpec, TransportClient, MAX_RESPONSE_SIZE, USER_AGENT};
pub use error::{AttemptError, TransportError};
pub use retry::RetryPolicy;
