//! Policies deciding when a breaker trips and how long retries wait.

use std::time::Duration;

use crate::metrics::WindowSnapshot;

/// Trip decision based on request volume and failure percentage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TripPolicy {
    request_volume_threshold: u64,
    error_threshold_percent: u32,
}

impl TripPolicy {
    /// Creates a new trip policy.
    pub fn new(request_volume_threshold: u64, error_threshold_percent: u32) -> Self {
        Self {
            request_volume_threshold,
            error_threshold_percent,
        }
    }

    /// Determines if the circuit should trip open given the current window.
    ///
    /// Nothing trips before `request_volume_threshold` calls were observed.
    pub fn should_trip(&self, window: &WindowSnapshot) -> bool {
        let total = window.total();
        if total == 0 || total < self.request_volume_threshold {
            return false;
        }

        // Integer comparison keeps exact thresholds such as 5/10 at 50%.
        window.failures.saturating_mul(100)
            >= total.saturating_mul(u64::from(self.error_threshold_percent))
    }
}

/// Delay strategy between retry attempts.
///
/// Both variants are deterministic, which keeps retry timing testable.
#[derive(Debug, Clone, PartialEq)]
pub enum Backoff {
    /// Wait the same delay before every retry.
    Fixed(Duration),

    /// Multiply the delay after every retry, capped at `max`.
    Exponential {
        /// Delay before the first retry.
        initial: Duration,
        /// Growth factor applied per retry, at least `1.0`.
        multiplier: f64,
        /// Upper bound for any single delay.
        max: Duration,
    },
}

impl Default for Backoff {
    fn default() -> Self {
        Backoff::Fixed(Duration::from_millis(100))
    }
}

impl Backoff {
    /// Delay to wait before retry number `retry` (1-based).
    pub fn delay(&self, retry: u32) -> Duration {
        match self {
            Backoff::Fixed(delay) => *delay,
            Backoff::Exponential {
                initial,
                multiplier,
                max,
            } => {
                let exponent = i32::try_from(retry.saturating_sub(1)).unwrap_or(i32::MAX);
                let secs = initial.as_secs_f64() * multiplier.powi(exponent);
                if !secs.is_finite() || secs >= max.as_secs_f64() {
                    return *max;
                }

                Duration::from_secs_f64(secs.max(0.0))
            }
        }
    }
}
