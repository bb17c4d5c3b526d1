#![cfg(feature = "serde")]

use callguard::{Backoff, BackoffSettings, BreakerConfig, BreakerSettings, ConfigError};
use std::time::Duration;

#[test]
fn test_partial_settings_fill_in_defaults() {
    let settings: BreakerSettings = serde_json::from_str(
        r#"{
            "overallTimeout": 2000,
            "errorThresholdPercent": 25,
            "retryBackoff": 250
        }"#,
    )
    .unwrap();

    let config = BreakerConfig::try_from(settings).unwrap();
    assert_eq!(config.overall_timeout(), Duration::from_secs(2));
    assert_eq!(config.error_threshold_percent(), 25);
    assert_eq!(config.retry_backoff(), &Backoff::Fixed(Duration::from_millis(250)));

    let defaults = BreakerConfig::default();
    assert_eq!(config.sleep_window(), defaults.sleep_window());
    assert_eq!(
        config.request_volume_threshold(),
        defaults.request_volume_threshold()
    );
    assert_eq!(config.max_retry_attempts(), defaults.max_retry_attempts());
}

#[test]
fn test_backoff_descriptors() {
    let fixed: BackoffSettings =
        serde_json::from_str(r#"{"kind":"fixed","delayMs":75}"#).unwrap();
    assert_eq!(Backoff::from(fixed), Backoff::Fixed(Duration::from_millis(75)));

    let exponential: BackoffSettings = serde_json::from_str(
        r#"{"kind":"exponential","initialMs":100,"multiplier":2.0,"maxMs":1000}"#,
    )
    .unwrap();
    assert_eq!(
        Backoff::from(exponential),
        Backoff::Exponential {
            initial: Duration::from_millis(100),
            multiplier: 2.0,
            max: Duration::from_secs(1),
        }
    );
}

#[test]
fn test_out_of_range_percent_is_rejected() {
    let settings: BreakerSettings =
        serde_json::from_str(r#"{"errorThresholdPercent":150}"#).unwrap();

    assert_eq!(
        BreakerConfig::try_from(settings),
        Err(ConfigError::ThresholdOutOfRange(150))
    );
}

#[test]
fn test_zero_attempts_is_rejected() {
    let settings: BreakerSettings = serde_json::from_str(r#"{"maxRetryAttempts":0}"#).unwrap();

    assert_eq!(
        BreakerConfig::try_from(settings),
        Err(ConfigError::NoAttempts)
    );
}

#[test]
fn test_settings_mirror_a_config() {
    let config = BreakerConfig::builder()
        .overall_timeout(Duration::from_millis(1500))
        .retry_backoff(Backoff::Exponential {
            initial: Duration::from_millis(50),
            multiplier: 3.0,
            max: Duration::from_millis(900),
        })
        .build()
        .unwrap();

    let json = serde_json::to_value(BreakerSettings::from(&config)).unwrap();
    assert_eq!(json["overallTimeout"], 1500);
    assert_eq!(json["retryBackoff"]["kind"], "exponential");
    assert_eq!(json["retryBackoff"]["maxMs"], 900);

    let back: BreakerSettings = serde_json::from_value(json).unwrap();
    assert_eq!(BreakerConfig::try_from(back).unwrap(), config);
}
