//! Error types for protected calls and breaker configuration.

use std::time::Duration;

use bytes::Bytes;
use thiserror::Error;

/// Result of one attempt or one protected execution.
pub type CallResult = Result<Bytes, CallError>;

/// Error type for protected calls.
#[derive(Debug, Clone, Error)]
pub enum CallError {
    /// No response was received (connection refused, reset, DNS failure...).
    #[error("transport failure: {0}")]
    Transport(String),

    /// The callee answered with a 5xx status.
    #[error("server responded with status {status}")]
    Server {
        /// HTTP status code, always `>= 500`.
        status: u16,
        /// Response body as received.
        payload: Bytes,
    },

    /// The callee answered with a 4xx status. Never retried.
    #[error("request rejected with status {status}")]
    Client {
        /// HTTP status code in `400..500`.
        status: u16,
        /// Response body as received.
        payload: Bytes,
    },

    /// Every permitted attempt failed with a retryable error.
    #[error("all {attempts} attempts failed, last error: {last}")]
    RetriesExhausted {
        /// Number of attempts made.
        attempts: u32,
        /// The error observed on the final attempt.
        #[source]
        last: Box<CallError>,
    },

    /// The breaker refused to attempt the call.
    #[error("circuit breaker '{breaker}' is open")]
    CircuitOpen {
        /// Name of the breaker that short-circuited.
        breaker: String,
    },

    /// The overall deadline elapsed before the call completed.
    #[error("call did not complete within {0:?}")]
    Timeout(Duration),

    /// The unit of work was abandoned through its cancellation token.
    #[error("call was cancelled")]
    Cancelled,

    /// The task running the call ended without delivering a result.
    #[error("call task ended without delivering a result")]
    TaskAborted,
}

impl CallError {
    /// Whether another attempt may succeed where this one failed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, CallError::Transport(_) | CallError::Server { .. })
    }

    /// Whether the error counts against the breaker's health.
    ///
    /// A client error means the callee is up and answering, so it is not a
    /// breaker failure. A short-circuit is never recorded at all.
    pub fn is_breaker_failure(&self) -> bool {
        !matches!(self, CallError::Client { .. } | CallError::CircuitOpen { .. })
    }

    /// HTTP status carried by the error, looking through retry exhaustion.
    pub fn status(&self) -> Option<u16> {
        match self {
            CallError::Server { status, .. } | CallError::Client { status, .. } => Some(*status),
            CallError::RetriesExhausted { last, .. } => last.status(),
            _ => None,
        }
    }

    /// Short label used for logs and metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            CallError::Transport(_) => "transport",
            CallError::Server { .. } => "server",
            CallError::Client { .. } => "client",
            CallError::RetriesExhausted { .. } => "retries_exhausted",
            CallError::CircuitOpen { .. } => "circuit_open",
            CallError::Timeout(_) => "timeout",
            CallError::Cancelled => "cancelled",
            CallError::TaskAborted => "task_aborted",
        }
    }
}

/// Invalid breaker settings.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigError {
    /// `error_threshold_percent` must lie in `0..=100`.
    #[error("error threshold percent must be between 0 and 100, got {0}")]
    ThresholdOutOfRange(u32),

    /// At least one attempt is required.
    #[error("max retry attempts must be at least 1")]
    NoAttempts,

    /// The rolling window needs at least one bucket.
    #[error("rolling window needs at least one bucket")]
    NoBuckets,

    /// The rolling window is too short for its bucket count.
    #[error("rolling window of {window:?} cannot be split into {buckets} buckets")]
    WindowTooSmall {
        /// Configured window length.
        window: Duration,
        /// Configured bucket count.
        buckets: u32,
    },

    /// Exponential backoff must not shrink.
    #[error("backoff multiplier must be a finite value of at least 1.0, got {0}")]
    InvalidMultiplier(f64),
}
