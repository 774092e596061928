//! Error types for taskwatch
//!
//! Two layers of errors live here:
//! - [`RequestError`] classifies a single failed HTTP attempt (timeout, status,
//!   network, decode). The retry engine uses it to decide whether to try again.
//! - [`Error`] is the crate error returned from construction and configuration
//!   paths (invalid URL, invalid policy, missing runtime).
//!
//! Normal runtime failures never surface as `Err` across the public boundary:
//! the request client folds them into a failed `RequestOutcome` and the tracker
//! folds them into a `failed` task state.

use std::time::Duration;
use thiserror::Error;

/// Result type alias for taskwatch operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for taskwatch
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error with context about which setting is invalid
    #[error("configuration error: {message}")]
    Config {
        /// Human-readable error message describing the configuration issue
        message: String,
        /// The configuration key that caused the error (e.g., "timeout")
        key: Option<String>,
    },

    /// Task identifier was empty or otherwise unusable
    #[error("invalid task identifier: {0:?}")]
    InvalidTaskId(String),

    /// Tracking was activated outside of a tokio runtime
    #[error("no tokio runtime available to drive task tracking")]
    NoRuntime,

    /// Endpoint or base URL could not be parsed
    #[error("invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    /// HTTP client could not be constructed
    #[error("HTTP client error: {0}")]
    Http(#[from] reqwest::Error),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// A request failed after the retry policy gave up
    #[error("request failed: {0}")]
    Request(#[from] RequestError),

    /// A poller could not produce a result for this tick
    #[error("poll failed: {0}")]
    Poll(String),

    /// Other error
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Shorthand for a configuration error tied to a specific key
    pub fn config(key: &str, message: impl Into<String>) -> Self {
        Error::Config {
            message: message.into(),
            key: Some(key.to_string()),
        }
    }
}

/// Failure of a single HTTP attempt
#[derive(Debug, Error)]
pub enum RequestError {
    /// The attempt exceeded its wall-clock budget and was aborted
    #[error("request timed out after {}ms", .0.as_millis())]
    Timeout(Duration),

    /// The server answered with a non-2xx status
    #[error("HTTP {status} {reason}: {body}")]
    Status {
        /// Numeric status code
        status: u16,
        /// Canonical reason phrase (may be empty)
        reason: String,
        /// Excerpt of the response body
        body: String,
    },

    /// Connection, DNS, TLS or body transfer failure
    #[error("network error: {0}")]
    Network(#[source] reqwest::Error),

    /// A successful response body could not be decoded
    #[error("failed to decode response: {0}")]
    Decode(String),

    /// The request could not be built (bad URL, bad header, etc.)
    #[error("invalid request: {0}")]
    InvalidRequest(String),
}

impl RequestError {
    /// Status code carried by this error, if the server answered at all
    pub fn status(&self) -> Option<u16> {
        match self {
            RequestError::Status { status, .. } => Some(*status),
            RequestError::Network(e) => e.status().map(|s| s.as_u16()),
            _ => None,
        }
    }

    /// True for 4xx responses, which will not succeed on retry
    pub fn is_client_error(&self) -> bool {
        self.status().is_some_and(|s| (400..500).contains(&s))
    }
}

impl From<crate::retry::AttemptTimeout> for RequestError {
    fn from(timeout: crate::retry::AttemptTimeout) -> Self {
        RequestError::Timeout(timeout.0)
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_error_message_includes_code_reason_and_body() {
        let err = RequestError::Status {
            status: 503,
            reason: "Service Unavailable".to_string(),
            body: "try later".to_string(),
        };
        assert_eq!(err.to_string(), "HTTP 503 Service Unavailable: try later");
        assert_eq!(err.status(), Some(503));
        assert!(!err.is_client_error());
    }

    #[test]
    fn client_error_range_is_half_open() {
        let status = |code| RequestError::Status {
            status: code,
            reason: String::new(),
            body: String::new(),
        };
        assert!(!status(399).is_client_error());
        assert!(status(400).is_client_error());
        assert!(status(404).is_client_error());
        assert!(status(499).is_client_error());
        assert!(!status(500).is_client_error());
    }

    #[test]
    fn timeout_message_is_in_milliseconds() {
        let err = RequestError::Timeout(Duration::from_millis(1500));
        assert_eq!(err.to_string(), "request timed out after 1500ms");
        assert_eq!(err.status(), None);
    }

    #[test]
    fn config_helper_records_key() {
        match Error::config("max_history", "must be at least 1") {
            Error::Config { message, key } => {
                assert_eq!(message, "must be at least 1");
                assert_eq!(key.as_deref(), Some("max_history"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn request_error_converts_into_crate_error() {
        let err: Error = RequestError::Decode("bad json".to_string()).into();
        assert_eq!(
            err.to_string(),
            "request failed: failed to decode response: bad json"
        );
    }
}
