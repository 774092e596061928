//! Retry logic with linear backoff and per-attempt timeouts
//!
//! The engine runs an async operation up to `max_retries + 1` times. Each attempt
//! is bounded by the policy's timeout; a timed-out attempt is converted into the
//! caller's error type through `From<AttemptTimeout>` and treated like any other
//! failure. Errors decide for themselves whether another attempt may help via
//! [`IsRetryable`].
//!
//! # Example
//!
//! ```no_run
//! use taskwatch::retry::{AttemptTimeout, IsRetryable, with_retry};
//! use taskwatch::config::RetryPolicy;
//!
//! #[derive(Debug)]
//! enum MyError {
//!     Transient,
//!     Permanent,
//! }
//!
//! impl std::fmt::Display for MyError {
//!     fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
//!         write!(f, "{:?}", self)
//!     }
//! }
//!
//! impl IsRetryable for MyError {
//!     fn is_retryable(&self) -> bool {
//!         matches!(self, MyError::Transient)
//!     }
//! }
//!
//! impl From<AttemptTimeout> for MyError {
//!     fn from(_: AttemptTimeout) -> Self {
//!         MyError::Transient
//!     }
//! }
//!
//! # async fn example() -> Result<(), MyError> {
//! let policy = RetryPolicy::reads();
//! let value = with_retry(&policy, |_attempt| async {
//!     Ok::<_, MyError>(42)
//! }).await?;
//! # Ok(())
//! # }
//! ```

use crate::config::RetryPolicy;
use crate::error::{Error, RequestError};
use rand::Rng;
use std::future::Future;
use std::time::Duration;

/// Trait for errors that can be classified as retryable or not
///
/// Transient failures (timeouts, connection errors, 5xx) return `true`.
/// Failures that will repeat on every attempt (4xx, bad input) return `false`.
pub trait IsRetryable {
    /// Returns true if the error is transient and the operation should be retried
    fn is_retryable(&self) -> bool;
}

impl IsRetryable for RequestError {
    fn is_retryable(&self) -> bool {
        match self {
            RequestError::Timeout(_) => true,
            // Client errors will not succeed on retry
            RequestError::Status { status, .. } => !(400..500).contains(status),
            RequestError::Network(e) => !e.status().is_some_and(|s| s.is_client_error()),
            RequestError::Decode(_) => false,
            RequestError::InvalidRequest(_) => false,
        }
    }
}

impl IsRetryable for Error {
    fn is_retryable(&self) -> bool {
        match self {
            Error::Request(e) => e.is_retryable(),
            Error::Http(e) => e.is_timeout() || e.is_connect(),
            Error::Poll(_) => true,
            Error::Config { .. }
            | Error::InvalidTaskId(_)
            | Error::NoRuntime
            | Error::InvalidUrl(_)
            | Error::Serialization(_)
            | Error::Other(_) => false,
        }
    }
}

/// Marker produced when an attempt exceeds the policy timeout
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct AttemptTimeout(pub Duration);

/// Delay to wait before retry number `retry` (1-indexed)
///
/// Linear backoff: `retry_delay * retry`. Retry 0 (the first attempt) has no delay.
pub fn backoff_delay(policy: &RetryPolicy, retry: u32) -> Duration {
    policy.retry_delay.saturating_mul(retry)
}

/// Execute an async operation with linear backoff retry logic
///
/// The operation receives the zero-based attempt index. Returns the first
/// success, the first non-retryable error, or the last error once
/// `policy.max_retries` retries are exhausted.
pub async fn with_retry<F, Fut, T, E>(policy: &RetryPolicy, mut operation: F) -> Result<T, E>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: IsRetryable + std::fmt::Display + From<AttemptTimeout>,
{
    let mut attempt: u32 = 0;

    loop {
        let result = match tokio::time::timeout(policy.timeout, operation(attempt)).await {
            Ok(result) => result,
            Err(_) => Err(E::from(AttemptTimeout(policy.timeout))),
        };

        match result {
            Ok(value) => {
                if attempt > 0 {
                    tracing::info!(attempts = attempt + 1, "operation succeeded after retry");
                }
                return Ok(value);
            }
            Err(e) if e.is_retryable() && attempt < policy.max_retries => {
                attempt += 1;

                let delay = backoff_delay(policy, attempt);
                let delay = if policy.jitter {
                    add_jitter(delay)
                } else {
                    delay
                };

                tracing::warn!(
                    error = %e,
                    attempt,
                    max_retries = policy.max_retries,
                    delay_ms = delay.as_millis() as u64,
                    "operation failed, retrying"
                );

                tokio::time::sleep(delay).await;
            }
            Err(e) => {
                if e.is_retryable() {
                    tracing::error!(
                        error = %e,
                        attempts = attempt + 1,
                        "operation failed after all retry attempts exhausted"
                    );
                } else {
                    tracing::error!(
                        error = %e,
                        attempts = attempt + 1,
                        "operation failed with non-retryable error"
                    );
                }
                return Err(e);
            }
        }
    }
}

/// Scale a delay by a uniform factor in `[1, 2)`
fn add_jitter(delay: Duration) -> Duration {
    let mut rng = rand::thread_rng();
    let factor: f64 = rng.gen_range(1.0..2.0);
    Duration::from_secs_f64(delay.as_secs_f64() * factor)
}
