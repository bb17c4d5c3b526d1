//! Bounded retries with backoff.

use tokio_util::sync::CancellationToken;

use crate::call::{Response, UnitOfWork};
use crate::config::BreakerConfig;
use crate::error::{CallError, CallResult};
use crate::policy::Backoff;

/// Runs a unit of work until it yields a terminal outcome or runs out of attempts.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryExecutor {
    max_attempts: u32,
    backoff: Backoff,
}

impl Default for RetryExecutor {
    fn default() -> Self {
        Self::new(3, Backoff::default())
    }
}

impl RetryExecutor {
    /// Creates an executor making at most `max_attempts` attempts (at least one).
    pub fn new(max_attempts: u32, backoff: Backoff) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            backoff,
        }
    }

    /// Creates an executor from a breaker's retry settings.
    pub fn from_config(config: &BreakerConfig) -> Self {
        Self::new(config.max_retry_attempts(), config.retry_backoff().clone())
    }

    /// Maximum attempts per run.
    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Runs `unit` until it succeeds, fails terminally or exhausts its attempts.
    ///
    /// Transport failures and 5xx responses are retried after the backoff
    /// delay. Any status below 500 ends the run at once: 4xx comes back as
    /// [`CallError::Client`] and the rest as the payload. When every attempt
    /// failed the last error is wrapped in [`CallError::RetriesExhausted`].
    /// Cancelling `token` during a backoff wait stops the run with
    /// [`CallError::Cancelled`].
    pub async fn run<W>(&self, unit: &W, token: &CancellationToken) -> CallResult
    where
        W: UnitOfWork,
    {
        let mut attempt = 0;

        loop {
            attempt += 1;

            let err = match unit.attempt(token.clone()).await.and_then(Response::into_result) {
                Ok(payload) => return Ok(payload),
                Err(err) if !err.is_retryable() => return Err(err),
                Err(err) => err,
            };

            if attempt >= self.max_attempts {
                tracing::warn!(attempt, error = %err, "attempt failed, no retries left");
                return Err(CallError::RetriesExhausted {
                    attempts: attempt,
                    last: Box::new(err),
                });
            }

            let delay = self.backoff.delay(attempt);
            tracing::warn!(
                attempt,
                max_attempts = self.max_attempts,
                delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                error = %err,
                "attempt failed, retrying"
            );

            tokio::select! {
                _ = token.cancelled() => return Err(CallError::Cancelled),
                _ = tokio::time::sleep(delay) => {}
            }
        }
    }
}
