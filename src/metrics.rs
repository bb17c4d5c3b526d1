//! Failure tracking and metrics for circuit breakers.

use smallvec::SmallVec;
use std::time::Duration;
use tokio::time::Instant;

use crate::state::State;

/// How a permitted call ended, as seen by the breaker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallOutcome {
    /// The callee answered with a non-error status.
    Success,
    /// The callee answered with a 4xx status.
    Rejected,
    /// Retries were exhausted or the call task failed.
    Failure,
    /// The overall deadline elapsed.
    Timeout,
}

impl CallOutcome {
    /// Lowercase label used in logs and metrics.
    pub fn as_str(&self) -> &'static str {
        match self {
            CallOutcome::Success => "success",
            CallOutcome::Rejected => "rejected",
            CallOutcome::Failure => "failure",
            CallOutcome::Timeout => "timeout",
        }
    }
}

/// Trait for metrics sinks that can receive circuit breaker events.
pub trait MetricSink: Send + Sync + 'static {
    /// Records a state transition event.
    fn record_state_transition(&self, breaker: &str, from: State, to: State);

    /// Records a call that was refused without being attempted.
    fn record_short_circuit(&self, breaker: &str);

    /// Records the outcome and wall-clock duration of a permitted call.
    fn record_call(&self, breaker: &str, outcome: CallOutcome, duration: Duration);
}

/// A null metrics sink that discards all events.
pub struct NullMetricSink;

impl MetricSink for NullMetricSink {
    fn record_state_transition(&self, _breaker: &str, _from: State, _to: State) {}
    fn record_short_circuit(&self, _breaker: &str) {}
    fn record_call(&self, _breaker: &str, _outcome: CallOutcome, _duration: Duration) {}
}

/// Point-in-time view of a breaker, safe to hand out to callers.
#[derive(Debug, Clone, PartialEq)]
pub struct BreakerSnapshot {
    /// Breaker name.
    pub name: String,
    /// State at the time of the snapshot.
    pub state: State,
    /// Calls observed in the rolling window.
    pub total_calls: u64,
    /// Failed calls observed in the rolling window.
    pub failures: u64,
    /// Successful calls observed in the rolling window.
    pub successes: u64,
    /// Percentage of failed calls in the window, `0.0` when empty.
    pub error_percentage: f64,
    /// Time since the last state transition.
    pub time_in_state: Duration,
}

/// Totals over the live buckets of a [`RollingWindow`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WindowSnapshot {
    /// Successful calls.
    pub successes: u64,
    /// Failed calls.
    pub failures: u64,
}

impl WindowSnapshot {
    /// Calls observed.
    pub fn total(&self) -> u64 {
        self.successes + self.failures
    }

    /// Failure percentage in `0.0..=100.0`.
    pub fn error_percentage(&self) -> f64 {
        let total = self.total();
        if total == 0 {
            return 0.0;
        }

        self.failures as f64 * 100.0 / total as f64
    }
}

#[derive(Debug, Clone, Copy)]
struct Bucket {
    started: Instant,
    successes: u64,
    failures: u64,
}

/// A time window for tracking outcomes with fixed buckets.
///
/// Buckets older than the window are dropped lazily on every access.
#[derive(Debug)]
pub struct RollingWindow {
    buckets: SmallVec<[Bucket; 16]>,
    window_size: Duration,
    bucket_size: Duration,
}

impl RollingWindow {
    /// Creates a window of `window_size` split into `bucket_count` buckets.
    ///
    /// A zero `bucket_count` is treated as one bucket.
    pub fn new(window_size: Duration, bucket_count: u32) -> Self {
        let bucket_size = window_size / bucket_count.max(1);
        Self {
            buckets: SmallVec::new(),
            window_size,
            bucket_size,
        }
    }

    /// Records a successful call.
    pub fn record_success(&mut self) {
        self.current_bucket().successes += 1;
    }

    /// Records a failed call.
    pub fn record_failure(&mut self) {
        self.current_bucket().failures += 1;
    }

    /// Sums the buckets still inside the window.
    pub fn snapshot(&mut self) -> WindowSnapshot {
        self.evict_expired(Instant::now());

        self.buckets
            .iter()
            .fold(WindowSnapshot::default(), |acc, bucket| WindowSnapshot {
                successes: acc.successes + bucket.successes,
                failures: acc.failures + bucket.failures,
            })
    }

    /// Forgets every recorded call.
    pub fn reset(&mut self) {
        self.buckets.clear();
    }

    fn current_bucket(&mut self) -> &mut Bucket {
        let now = Instant::now();
        self.evict_expired(now);

        let fresh = match self.buckets.last() {
            Some(bucket) => now.duration_since(bucket.started) >= self.bucket_size,
            None => true,
        };
        if fresh {
            self.buckets.push(Bucket {
                started: now,
                successes: 0,
                failures: 0,
            });
        }

        let last = self.buckets.len() - 1;
        &mut self.buckets[last]
    }

    fn evict_expired(&mut self, now: Instant) {
        let expired = self
            .buckets
            .iter()
            .take_while(|bucket| now.duration_since(bucket.started) >= self.window_size)
            .count();
        if expired > 0 {
            self.buckets.drain(..expired);
        }
    }
}
