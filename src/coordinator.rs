//! Runs a call on its own task and races it against a deadline.

use std::future::Future;
use std::time::Duration;

use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;
use tracing::Instrument;

use crate::error::{CallError, CallResult};

/// Bounds the wall-clock time of one protected call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CallCoordinator {
    overall_timeout: Duration,
}

impl CallCoordinator {
    /// Creates a coordinator enforcing `overall_timeout`.
    pub fn new(overall_timeout: Duration) -> Self {
        Self { overall_timeout }
    }

    /// The deadline applied to every call.
    pub fn overall_timeout(&self) -> Duration {
        self.overall_timeout
    }

    /// Spawns `call` and waits for its result or the deadline, whichever comes first.
    ///
    /// The call receives a token that is cancelled when the deadline fires or
    /// when the returned future is dropped. The spawned task then drops the
    /// in-flight call instead of letting it run on in the background. The
    /// task hands its single result over a oneshot channel, so a result
    /// nobody waits for any more is simply discarded.
    pub async fn execute_with_timeout<F, Fut>(&self, call: F) -> CallResult
    where
        F: FnOnce(CancellationToken) -> Fut + Send + 'static,
        Fut: Future<Output = CallResult> + Send + 'static,
    {
        let token = CancellationToken::new();
        let (tx, rx) = oneshot::channel();

        let task_token = token.clone();
        tokio::spawn(
            async move {
                let result = tokio::select! {
                    result = call(task_token.clone()) => result,
                    _ = task_token.cancelled() => Err(CallError::Cancelled),
                };
                // The receiver is gone once the deadline fired.
                let _ = tx.send(result);
            }
            .in_current_span(),
        );

        let _cancel_on_exit = token.clone().drop_guard();

        tokio::select! {
            delivered = rx => delivered.unwrap_or(Err(CallError::TaskAborted)),
            _ = tokio::time::sleep(self.overall_timeout) => {
                token.cancel();
                let timeout_ms = u64::try_from(self.overall_timeout.as_millis()).unwrap_or(u64::MAX);
                tracing::warn!(timeout_ms, "call timed out");
                Err(CallError::Timeout(self.overall_timeout))
            }
        }
    }
}
