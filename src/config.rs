//! Configuration for circuit breakers.

use std::time::Duration;

use crate::error::ConfigError;
use crate::policy::{Backoff, TripPolicy};

/// Immutable settings of one named breaker.
///
/// Build one with [`BreakerConfig::builder`]; [`Default`] gives the values
/// the domain-availability client has always run with.
#[derive(Debug, Clone, PartialEq)]
pub struct BreakerConfig {
    overall_timeout: Duration,
    sleep_window: Duration,
    request_volume_threshold: u64,
    error_threshold_percent: u32,
    max_retry_attempts: u32,
    retry_backoff: Backoff,
    rolling_window: Duration,
    rolling_buckets: u32,
}

impl Default for BreakerConfig {
    fn default() -> Self {
        Self {
            overall_timeout: Duration::from_millis(5000),
            sleep_window: Duration::from_millis(5000),
            request_volume_threshold: 10,
            error_threshold_percent: 50,
            max_retry_attempts: 3,
            retry_backoff: Backoff::default(),
            rolling_window: Duration::from_secs(10),
            rolling_buckets: 10,
        }
    }
}

impl BreakerConfig {
    /// Creates a new builder starting from the defaults.
    pub fn builder() -> BreakerBuilder {
        BreakerBuilder::new()
    }

    /// Maximum wall-clock time for one protected execution.
    pub fn overall_timeout(&self) -> Duration {
        self.overall_timeout
    }

    /// How long an open breaker waits before admitting a trial.
    pub fn sleep_window(&self) -> Duration {
        self.sleep_window
    }

    /// Minimum calls in the window before the failure rate is evaluated.
    pub fn request_volume_threshold(&self) -> u64 {
        self.request_volume_threshold
    }

    /// Failure percentage at or above which the breaker trips.
    pub fn error_threshold_percent(&self) -> u32 {
        self.error_threshold_percent
    }

    /// Attempts per execution, including the first one.
    pub fn max_retry_attempts(&self) -> u32 {
        self.max_retry_attempts
    }

    /// Delay policy between attempts.
    pub fn retry_backoff(&self) -> &Backoff {
        &self.retry_backoff
    }

    /// Length of the rolling metrics window.
    pub fn rolling_window(&self) -> Duration {
        self.rolling_window
    }

    /// Number of buckets the rolling window is split into.
    pub fn rolling_buckets(&self) -> u32 {
        self.rolling_buckets
    }

    pub(crate) fn trip_policy(&self) -> TripPolicy {
        TripPolicy::new(self.request_volume_threshold, self.error_threshold_percent)
    }

    fn validate(self) -> Result<Self, ConfigError> {
        if self.error_threshold_percent > 100 {
            return Err(ConfigError::ThresholdOutOfRange(
                self.error_threshold_percent,
            ));
        }
        if self.max_retry_attempts == 0 {
            return Err(ConfigError::NoAttempts);
        }
        if self.rolling_buckets == 0 {
            return Err(ConfigError::NoBuckets);
        }
        if (self.rolling_window / self.rolling_buckets).is_zero() {
            return Err(ConfigError::WindowTooSmall {
                window: self.rolling_window,
                buckets: self.rolling_buckets,
            });
        }
        if let Backoff::Exponential { multiplier, .. } = self.retry_backoff {
            if !multiplier.is_finite() || multiplier < 1.0 {
                return Err(ConfigError::InvalidMultiplier(multiplier));
            }
        }

        Ok(self)
    }
}

/// Builder for creating breaker configurations.
#[derive(Debug, Clone, Default)]
pub struct BreakerBuilder {
    config: BreakerConfig,
}

impl BreakerBuilder {
    /// Creates a new builder with default settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the maximum wall-clock time of one execution.
    pub fn overall_timeout(mut self, timeout: Duration) -> Self {
        self.config.overall_timeout = timeout;
        self
    }

    /// Sets how long the breaker stays open before trialing.
    pub fn sleep_window(mut self, window: Duration) -> Self {
        self.config.sleep_window = window;
        self
    }

    /// Sets the minimum number of calls required before considering the error rate.
    pub fn request_volume_threshold(mut self, volume: u64) -> Self {
        self.config.request_volume_threshold = volume;
        self
    }

    /// Sets the failure percentage (0-100) that will trip the circuit.
    pub fn error_threshold_percent(mut self, percent: u32) -> Self {
        self.config.error_threshold_percent = percent;
        self
    }

    /// Sets the number of attempts per execution.
    pub fn max_retry_attempts(mut self, attempts: u32) -> Self {
        self.config.max_retry_attempts = attempts;
        self
    }

    /// Sets the delay policy between attempts.
    pub fn retry_backoff(mut self, backoff: Backoff) -> Self {
        self.config.retry_backoff = backoff;
        self
    }

    /// Sets the rolling window length and bucket count.
    pub fn rolling_window(mut self, window: Duration, buckets: u32) -> Self {
        self.config.rolling_window = window;
        self.config.rolling_buckets = buckets;
        self
    }

    /// Validates and returns the configuration.
    pub fn build(self) -> Result<BreakerConfig, ConfigError> {
        self.config.validate()
    }
}

#[cfg(feature = "serde")]
pub use settings::{BackoffDescriptor, BackoffSettings, BreakerSettings};

#[cfg(feature = "serde")]
mod settings {
    use std::time::Duration;

    use serde::{Deserialize, Serialize};

    use super::BreakerConfig;
    use crate::error::ConfigError;
    use crate::policy::Backoff;

    /// Serializable breaker options, as they appear in config files.
    ///
    /// Durations are milliseconds. Missing keys fall back to the defaults.
    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    #[serde(default, rename_all = "camelCase")]
    pub struct BreakerSettings {
        /// Maximum wall-clock time of one execution, in milliseconds.
        pub overall_timeout: u64,
        /// Open duration before a trial, in milliseconds.
        pub sleep_window: u64,
        /// Minimum calls before the failure rate counts.
        pub request_volume_threshold: u64,
        /// Failure percentage that trips the breaker.
        pub error_threshold_percent: u32,
        /// Attempts per execution.
        pub max_retry_attempts: u32,
        /// Delay between attempts.
        pub retry_backoff: BackoffSettings,
        /// Rolling window length, in milliseconds.
        pub rolling_window: u64,
        /// Buckets in the rolling window.
        pub rolling_buckets: u32,
    }

    /// Backoff as either plain milliseconds or a policy descriptor.
    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    #[serde(untagged)]
    pub enum BackoffSettings {
        /// Fixed delay in milliseconds.
        Millis(u64),
        /// Explicit policy.
        Policy(BackoffDescriptor),
    }

    /// Named backoff policy.
    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    #[serde(tag = "kind", rename_all = "lowercase")]
    pub enum BackoffDescriptor {
        /// Same delay before every retry.
        Fixed {
            /// Delay in milliseconds.
            #[serde(rename = "delayMs")]
            delay_ms: u64,
        },
        /// Growing delay, capped.
        Exponential {
            /// First delay in milliseconds.
            #[serde(rename = "initialMs")]
            initial_ms: u64,
            /// Growth factor per retry.
            multiplier: f64,
            /// Cap in milliseconds.
            #[serde(rename = "maxMs")]
            max_ms: u64,
        },
    }

    impl Default for BreakerSettings {
        fn default() -> Self {
            BreakerSettings::from(&BreakerConfig::default())
        }
    }

    impl From<&BreakerConfig> for BreakerSettings {
        fn from(config: &BreakerConfig) -> Self {
            Self {
                overall_timeout: millis(config.overall_timeout),
                sleep_window: millis(config.sleep_window),
                request_volume_threshold: config.request_volume_threshold,
                error_threshold_percent: config.error_threshold_percent,
                max_retry_attempts: config.max_retry_attempts,
                retry_backoff: BackoffSettings::from(&config.retry_backoff),
                rolling_window: millis(config.rolling_window),
                rolling_buckets: config.rolling_buckets,
            }
        }
    }

    impl From<&Backoff> for BackoffSettings {
        fn from(backoff: &Backoff) -> Self {
            match backoff {
                Backoff::Fixed(delay) => BackoffSettings::Millis(millis(*delay)),
                Backoff::Exponential {
                    initial,
                    multiplier,
                    max,
                } => BackoffSettings::Policy(BackoffDescriptor::Exponential {
                    initial_ms: millis(*initial),
                    multiplier: *multiplier,
                    max_ms: millis(*max),
                }),
            }
        }
    }

    impl From<BackoffSettings> for Backoff {
        fn from(settings: BackoffSettings) -> Self {
            match settings {
                BackoffSettings::Millis(ms)
                | BackoffSettings::Policy(BackoffDescriptor::Fixed { delay_ms: ms }) => {
                    Backoff::Fixed(Duration::from_millis(ms))
                }
                BackoffSettings::Policy(BackoffDescriptor::Exponential {
                    initial_ms,
                    multiplier,
                    max_ms,
                }) => Backoff::Exponential {
                    initial: Duration::from_millis(initial_ms),
                    multiplier,
                    max: Duration::from_millis(max_ms),
                },
            }
        }
    }

    impl TryFrom<BreakerSettings> for BreakerConfig {
        type Error = ConfigError;

        fn try_from(settings: BreakerSettings) -> Result<Self, Self::Error> {
            BreakerConfig::builder()
                .overall_timeout(Duration::from_millis(settings.overall_timeout))
                .sleep_window(Duration::from_millis(settings.sleep_window))
                .request_volume_threshold(settings.request_volume_threshold)
                .error_threshold_percent(settings.error_threshold_percent)
                .max_retry_attempts(settings.max_retry_attempts)
                .retry_backoff(settings.retry_backoff.into())
                .rolling_window(
                    Duration::from_millis(settings.rolling_window),
                    settings.rolling_buckets,
                )
                .build()
        }
    }

    fn millis(duration: Duration) -> u64 {
        u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
    }
}
