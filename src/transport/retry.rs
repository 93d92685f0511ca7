use super::error::{AttemptError, TransportError};
use std::future::Future;
use std::time::Duration;

/// Default per-attempt timeout
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(3);
/// Default retry count (1 retry = 2 total attempts)
pub const DEFAULT_RETRIES: u32 = 1;
/// Default fixed delay between attempts
pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_secs(1);

/// Timeout and fixed-delay retry settings applied around one request attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Upper bound for a single attempt, including reading the body
    pub timeout: Duration,
    /// Number of retries after the first attempt
    pub retries: u32,
    /// Sleep between a failed attempt and the next one
    pub delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_TIMEOUT,
            retries: DEFAULT_RETRIES,
            delay: DEFAULT_RETRY_DELAY,
        }
    }
}

impl RetryPolicy {
    /// Total number of attempts this policy allows.
    pub fn attempts(&self) -> u32 {
        self.retries.saturating_add(1)
    }

    /// Runs `attempt` until it succeeds or the attempts are used up.
    ///
    /// Each call to `attempt` receives the 1-based attempt number and is
    /// bounded by [`RetryPolicy::timeout`]; an elapsed timeout counts as a
    /// failed attempt. Attempts run strictly one after another with
    /// [`RetryPolicy::delay`] in between and no delay after the last one.
    ///
    /// # Errors
    ///
    /// [`TransportError::Exhausted`] carrying the final attempt's error.
    pub async fn run<T, F, Fut>(&self, label: &str, mut attempt: F) -> Result<T, TransportError>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, AttemptError>>,
    {
        let total = self.attempts();
        let mut n = 1;

        loop {
            tracing::debug!(request = %label, attempt = n, total = total, "Request attempt");

            let outcome = match tokio::time::timeout(self.timeout, attempt(n)).await {
                Ok(result) => result,
                Err(_) => Err(AttemptError::Timeout(self.timeout)),
            };

            match outcome {
                Ok(value) => return Ok(value),
                Err(e) if n < total => {
                    tracing::warn!(
                        request = %label,
                        attempt = n,
                        total = total,
                        delay_ms = self.delay.as_millis() as u64,
                        error = %e,
                        "Request attempt failed, retrying after delay"
                    );
                    tokio::time::sleep(self.delay).await;
                    n += 1;
                }
                Err(e) => {
                    tracing::warn!(
                        request = %label,
                        attempts = total,
                        error = %e,
                        "Request failed, no attempts left"
                    );
                    return Err(TransportError::Exhausted {
                        attempts: total,
                        last: e,
                    });
                }
            }
        }
    }
}
