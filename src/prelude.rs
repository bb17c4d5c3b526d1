//! Re-exports common types for convenient usage.
//!
//! # Example
//! ```rust,no_run
//! use callguard::prelude::*;
//! ```

pub use crate::breaker::{passthrough, CircuitBreaker};
pub use crate::call::{Response, UnitOfWork};
pub use crate::config::BreakerConfig;
pub use crate::error::{CallError, CallResult};
pub use crate::manager::BreakerManager;
pub use crate::policy::Backoff;
pub use crate::state::State;
pub use tokio_util::sync::CancellationToken;
