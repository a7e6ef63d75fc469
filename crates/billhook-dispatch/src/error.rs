//! Error types for notification dispatch.
//!
//! Covers the full failure taxonomy of the dispatch pipeline: transport
//! failures, HTTP status classes, payload serialization, queue backpressure,
//! and shutdown. Each error knows whether it is worth retrying, which is the
//! single input the retry scheduler needs.

use std::{fmt, time::Duration};

use thiserror::Error;

/// Result type alias for dispatch operations.
pub type Result<T> = std::result::Result<T, DispatchError>;

/// Failure modes of the notification dispatcher.
#[derive(Debug, Clone, Error)]
pub enum DispatchError {
    /// Network-level connectivity failure (unreachable, refused, reset).
    #[error("network connection failed: {message}")]
    NetworkError {
        /// Description of the network failure
        message: String,
    },

    /// HTTP request timeout exceeded.
    #[error("request timeout after {timeout_seconds}s")]
    Timeout {
        /// Seconds waited before giving up on the request
        timeout_seconds: u64,
    },

    /// Endpoint rejected the notification (4xx other than 429).
    #[error("client error: HTTP {status_code}")]
    ClientError {
        /// HTTP status code (4xx)
        status_code: u16,
        /// Truncated response body
        body: String,
    },

    /// Endpoint failed to process the notification (5xx or unexpected status).
    #[error("server error: HTTP {status_code}")]
    ServerError {
        /// HTTP status code
        status_code: u16,
        /// Truncated response body
        body: String,
    },

    /// Endpoint asked us to slow down (HTTP 429).
    #[error("rate limited: retry after {retry_after_seconds}s")]
    RateLimited {
        /// Seconds to wait before the next attempt
        retry_after_seconds: u64,
    },

    /// Event could not be encoded into a payload.
    ///
    /// The defect is data-shaped, not transient: the event is dropped and
    /// never retried.
    #[error("payload serialization failed: {message}")]
    Serialization {
        /// Description of the encoding failure
        message: String,
    },

    /// Task queue is at capacity; the submission was rejected.
    #[error("queue at capacity ({capacity}), submission rejected")]
    Backpressure {
        /// Configured queue bound
        capacity: usize,
    },

    /// Invalid dispatcher or client configuration.
    #[error("invalid configuration: {message}")]
    ConfigurationError {
        /// Configuration error message
        message: String,
    },

    /// Worker shutdown requested.
    #[error("worker shutdown requested")]
    ShutdownRequested,

    /// Workers did not finish within the shutdown grace period.
    #[error("shutdown timed out after {timeout:?}")]
    ShutdownTimeout {
        /// Grace period that was exceeded
        timeout: Duration,
    },

    /// A worker task panicked.
    #[error("worker {worker_id} panicked: {error}")]
    WorkerPanic {
        /// Identifier of the panicked worker
        worker_id: usize,
        /// Join error description
        error: String,
    },

    /// Unexpected internal error.
    #[error("internal dispatch error: {message}")]
    InternalError {
        /// Internal error message
        message: String,
    },
}

impl DispatchError {
    /// Creates a network error from a message.
    pub fn network(message: impl Into<String>) -> Self {
        Self::NetworkError { message: message.into() }
    }

    /// Creates a timeout error.
    pub fn timeout(timeout_seconds: u64) -> Self {
        Self::Timeout { timeout_seconds }
    }

    /// Creates a client error from an HTTP response.
    pub fn client_error(status_code: u16, body: impl Into<String>) -> Self {
        Self::ClientError { status_code, body: body.into() }
    }

    /// Creates a server error from an HTTP response.
    pub fn server_error(status_code: u16, body: impl Into<String>) -> Self {
        Self::ServerError { status_code, body: body.into() }
    }

    /// Creates a rate limit error with retry guidance.
    pub fn rate_limited(retry_after_seconds: u64) -> Self {
        Self::RateLimited { retry_after_seconds }
    }

    /// Creates a serialization error.
    pub fn serialization(message: impl Into<String>) -> Self {
        Self::Serialization { message: message.into() }
    }

    /// Creates a backpressure error.
    pub fn backpressure(capacity: usize) -> Self {
        Self::Backpressure { capacity }
    }

    /// Creates a configuration error.
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::ConfigurationError { message: message.into() }
    }

    /// Creates an internal error.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::InternalError { message: message.into() }
    }

    /// Returns true for temporary failures that the scheduler may retry.
    ///
    /// Network errors, timeouts, server errors (5xx), and rate limits are
    /// transient. Client errors (4xx), serialization failures, backpressure,
    /// and lifecycle errors are not.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::NetworkError { .. }
            | Self::Timeout { .. }
            | Self::ServerError { .. }
            | Self::RateLimited { .. } => true,

            Self::ClientError { .. }
            | Self::Serialization { .. }
            | Self::Backpressure { .. }
            | Self::ConfigurationError { .. }
            | Self::ShutdownRequested
            | Self::ShutdownTimeout { .. }
            | Self::WorkerPanic { .. }
            | Self::InternalError { .. } => false,
        }
    }

    /// Returns the endpoint-requested retry delay, if any.
    ///
    /// Only rate-limit responses carry one; everything else follows the
    /// exponential backoff schedule.
    pub fn retry_after_seconds(&self) -> Option<u64> {
        match self {
            Self::RateLimited { retry_after_seconds } => Some(*retry_after_seconds),
            _ => None,
        }
    }
}

/// Coarse error category used as a structured log field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Network connectivity issues (including timeouts).
    Network,
    /// HTTP client errors (4xx).
    Client,
    /// HTTP server errors (5xx).
    Server,
    /// Rate limiting.
    RateLimit,
    /// Payload encoding problems.
    Serialization,
    /// Queue capacity exceeded.
    Backpressure,
    /// Configuration problems.
    Configuration,
    /// Internal or lifecycle errors.
    Internal,
}

impl From<&DispatchError> for ErrorCategory {
    fn from(error: &DispatchError) -> Self {
        match error {
            DispatchError::NetworkError { .. } | DispatchError::Timeout { .. } => Self::Network,
            DispatchError::ClientError { .. } => Self::Client,
            DispatchError::ServerError { .. } => Self::Server,
            DispatchError::RateLimited { .. } => Self::RateLimit,
            DispatchError::Serialization { .. } => Self::Serialization,
            DispatchError::Backpressure { .. } => Self::Backpressure,
            DispatchError::ConfigurationError { .. } => Self::Configuration,
            DispatchError::ShutdownRequested
            | DispatchError::ShutdownTimeout { .. }
            | DispatchError::WorkerPanic { .. }
            | DispatchError::InternalError { .. } => Self::Internal,
        }
    }
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Network => write!(f, "network"),
            Self::Client => write!(f, "client"),
            Self::Server => write!(f, "server"),
            Self::RateLimit => write!(f, "rate_limit"),
            Self::Serialization => write!(f, "serialization"),
            Self::Backpressure => write!(f, "backpressure"),
            Self::Configuration => write!(f, "configuration"),
            Self::Internal => write!(f, "internal"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retryable_errors_identified_correctly() {
        assert!(DispatchError::network("connection refused").is_retryable());
        assert!(DispatchError::timeout(10).is_retryable());
        assert!(DispatchError::server_error(503, "unavailable").is_retryable());
        assert!(DispatchError::rate_limited(60).is_retryable());

        assert!(!DispatchError::client_error(404, "not found").is_retryable());
        assert!(!DispatchError::serialization("bad object id").is_retryable());
        assert!(!DispatchError::backpressure(1024).is_retryable());
        assert!(!DispatchError::configuration("invalid URL").is_retryable());
        assert!(!DispatchError::ShutdownRequested.is_retryable());
    }

    #[test]
    fn rate_limit_retry_after_extracted() {
        assert_eq!(DispatchError::rate_limited(120).retry_after_seconds(), Some(120));
        assert_eq!(DispatchError::timeout(10).retry_after_seconds(), None);
        assert_eq!(DispatchError::server_error(500, "").retry_after_seconds(), None);
    }

    #[test]
    fn error_categories_mapped_correctly() {
        assert_eq!(ErrorCategory::from(&DispatchError::network("x")), ErrorCategory::Network);
        assert_eq!(ErrorCategory::from(&DispatchError::timeout(5)), ErrorCategory::Network);
        assert_eq!(
            ErrorCategory::from(&DispatchError::client_error(400, "")),
            ErrorCategory::Client
        );
        assert_eq!(
            ErrorCategory::from(&DispatchError::serialization("x")),
            ErrorCategory::Serialization
        );
        assert_eq!(
            ErrorCategory::from(&DispatchError::backpressure(16)),
            ErrorCategory::Backpressure
        );
    }

    #[test]
    fn error_display_format() {
        assert_eq!(DispatchError::timeout(10).to_string(), "request timeout after 10s");
        assert_eq!(
            DispatchError::backpressure(256).to_string(),
            "queue at capacity (256), submission rejected"
        );
    }
}
