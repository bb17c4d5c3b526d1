//! # callguard
//!
//! Protects a service from a slow or failing third-party API by combining a
//! circuit breaker, bounded retries and an overall deadline around every
//! outbound call.
//!
//! ## How a call flows
//!
//! 1. [`BreakerManager::execute`] looks up (or creates) the breaker for a name.
//! 2. The breaker decides whether the call may run at all. An open breaker
//!    short-circuits straight to the fallback without touching the callee.
//! 3. A permitted call is spawned on its own task by the [`CallCoordinator`],
//!    which races it against the breaker's overall timeout.
//! 4. Inside that task the [`RetryExecutor`] attempts the unit of work,
//!    retrying transport failures and 5xx answers with a backoff delay.
//! 5. The outcome is recorded in the breaker's rolling window; failures are
//!    handed to the caller-supplied fallback.
//!
//! Breakers move through three states:
//!
//! - **Closed**: calls pass through and outcomes are counted.
//! - **Open**: calls are refused until the sleep window has elapsed.
//! - **Half-Open**: one trial call is let through to test recovery.
//!
//! ## Basic Usage
//!
//! ```rust
//! use callguard::prelude::*;
//! use std::time::Duration;
//!
//! # tokio_test::block_on(async {
//! let manager = BreakerManager::new();
//! manager.register(
//!     "domains",
//!     BreakerConfig::builder()
//!         .overall_timeout(Duration::from_secs(2))
//!         .sleep_window(Duration::from_secs(5))
//!         .build()
//!         .unwrap(),
//! );
//!
//! let result = manager
//!     .execute(
//!         "domains",
//!         |_token: CancellationToken| async {
//!             Ok::<_, CallError>(Response::ok(r#"{"available":true}"#))
//!         },
//!         |err: CallError| Err(err),
//!     )
//!     .await;
//!
//! assert_eq!(result.unwrap(), r#"{"available":true}"#);
//! # });
//! ```
//!
//! ## Cancellation
//!
//! Every attempt receives a [`CancellationToken`](tokio_util::sync::CancellationToken).
//! When the overall timeout fires the token is cancelled and the spawned
//! task drops the in-flight attempt, so slow calls do not pile up in the
//! background.
//!
//! ## Features
//!
//! - `serde` - [`BreakerSettings`] for loading options from config files (default)
//! - `http` - [`http::HttpCall`], a reqwest-backed unit of work
//! - `prometheus` - Prometheus metrics integration

#![forbid(unsafe_code)]
#![deny(missing_docs)]
#![cfg_attr(docsrs, feature(doc_cfg))]

mod breaker;
mod call;
mod config;
mod coordinator;
mod error;
mod hook;
mod manager;
mod metrics;
mod policy;
pub mod prelude;
mod retry;
mod state;

#[cfg(feature = "http")]
#[cfg_attr(docsrs, doc(cfg(feature = "http")))]
pub mod http;

#[cfg(feature = "prometheus")]
mod prometheus;

// Re-exports
pub use breaker::{passthrough, CircuitBreaker};
pub use call::{Response, UnitOfWork};
pub use config::{BreakerBuilder, BreakerConfig};
#[cfg(feature = "serde")]
pub use config::{BackoffDescriptor, BackoffSettings, BreakerSettings};
pub use coordinator::CallCoordinator;
pub use error::{CallError, CallResult, ConfigError};
pub use hook::HookRegistry;
pub use manager::{BreakerManager, ManagerBuilder};
pub use metrics::{
    BreakerSnapshot, CallOutcome, MetricSink, NullMetricSink, RollingWindow, WindowSnapshot,
};
pub use policy::{Backoff, TripPolicy};
#[cfg(feature = "prometheus")]
pub use prometheus::PrometheusSink;
pub use retry::RetryExecutor;
pub use state::State;
