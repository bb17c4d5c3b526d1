//! Registry of named circuit breakers.

use std::collections::HashMap;
use std::sync::Arc;

use ahash::RandomState;
use parking_lot::RwLock;

use crate::breaker::{passthrough, CircuitBreaker};
use crate::call::UnitOfWork;
use crate::config::BreakerConfig;
use crate::error::{CallError, CallResult};
use crate::hook::HookRegistry;
use crate::metrics::{BreakerSnapshot, MetricSink, NullMetricSink};
use crate::state::State;

struct ManagerInner {
    breakers: RwLock<HashMap<String, Arc<CircuitBreaker>, RandomState>>,
    default_config: BreakerConfig,
    metric_sink: Arc<dyn MetricSink>,
    hooks: Arc<HookRegistry>,
}

/// Owns one [`CircuitBreaker`] per name.
///
/// Construct one per process (or per test) and share it by cloning; clones
/// are cheap and see the same breakers.
#[derive(Clone)]
pub struct BreakerManager {
    inner: Arc<ManagerInner>,
}

impl Default for BreakerManager {
    fn default() -> Self {
        Self::builder().build()
    }
}

impl BreakerManager {
    /// Creates a manager with default settings, no metrics and no hooks.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a new builder for customizing a manager.
    pub fn builder() -> ManagerBuilder {
        ManagerBuilder::new()
    }

    /// Registers `name` with explicit settings.
    ///
    /// The first registration wins: if the breaker already exists it is
    /// returned unchanged, keeping its state and metrics.
    pub fn register(&self, name: &str, config: BreakerConfig) -> Arc<CircuitBreaker> {
        if let Some(existing) = self.breaker(name) {
            if existing.config() != &config {
                tracing::debug!(breaker = name, "breaker already registered, keeping its settings");
            }
            return existing;
        }

        let mut breakers = self.inner.breakers.write();
        let breaker = breakers
            .entry(name.to_owned())
            .or_insert_with(|| Arc::new(self.new_breaker(name, config)));
        Arc::clone(breaker)
    }

    /// Returns the breaker for `name`, creating it with the default settings.
    pub fn get_or_create(&self, name: &str) -> Arc<CircuitBreaker> {
        if let Some(existing) = self.breaker(name) {
            return existing;
        }

        let mut breakers = self.inner.breakers.write();
        let breaker = breakers.entry(name.to_owned()).or_insert_with(|| {
            tracing::debug!(breaker = name, "creating breaker with default settings");
            Arc::new(self.new_breaker(name, self.inner.default_config.clone()))
        });
        Arc::clone(breaker)
    }

    /// Looks up an existing breaker.
    pub fn breaker(&self, name: &str) -> Option<Arc<CircuitBreaker>> {
        self.inner.breakers.read().get(name).cloned()
    }

    /// Current state of `name`, if it exists.
    pub fn state(&self, name: &str) -> Option<State> {
        self.breaker(name).map(|breaker| breaker.current_state())
    }

    /// Snapshot of `name`, if it exists.
    pub fn snapshot(&self, name: &str) -> Option<BreakerSnapshot> {
        self.breaker(name).map(|breaker| breaker.snapshot())
    }

    /// Snapshots of every breaker, sorted by name.
    pub fn snapshots(&self) -> Vec<BreakerSnapshot> {
        let breakers: Vec<_> = self.inner.breakers.read().values().cloned().collect();
        let mut snapshots: Vec<_> = breakers.iter().map(|b| b.snapshot()).collect();
        snapshots.sort_by(|a, b| a.name.cmp(&b.name));
        snapshots
    }

    /// Executes `unit` under the breaker called `name`.
    ///
    /// See [`CircuitBreaker::execute`] for how `fallback` is used.
    pub async fn execute<W, Fb>(&self, name: &str, unit: W, fallback: Fb) -> CallResult
    where
        W: UnitOfWork,
        Fb: FnOnce(CallError) -> CallResult,
    {
        self.get_or_create(name).execute(unit, fallback).await
    }

    /// Executes `unit` under `name`, returning failures as they are.
    pub async fn call<W>(&self, name: &str, unit: W) -> CallResult
    where
        W: UnitOfWork,
    {
        self.execute(name, unit, passthrough).await
    }

    fn new_breaker(&self, name: &str, config: BreakerConfig) -> CircuitBreaker {
        CircuitBreaker::new(
            name,
            config,
            Arc::clone(&self.inner.metric_sink),
            Arc::clone(&self.inner.hooks),
        )
    }
}

/// Builder for creating breaker managers.
pub struct ManagerBuilder {
    default_config: BreakerConfig,
    metric_sink: Arc<dyn MetricSink>,
    hooks: Arc<HookRegistry>,
}

impl Default for ManagerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl ManagerBuilder {
    /// Creates a new builder with default settings.
    pub fn new() -> Self {
        Self {
            default_config: BreakerConfig::default(),
            metric_sink: Arc::new(NullMetricSink),
            hooks: Arc::new(HookRegistry::new()),
        }
    }

    /// Sets the settings used for breakers created on first use.
    pub fn default_config(mut self, config: BreakerConfig) -> Self {
        self.default_config = config;
        self
    }

    /// Sets a metric sink shared by every breaker.
    pub fn metric_sink<M: MetricSink>(mut self, sink: M) -> Self {
        self.metric_sink = Arc::new(sink);
        self
    }

    /// Sets a hook registry shared by every breaker.
    pub fn hooks(mut self, hooks: HookRegistry) -> Self {
        self.hooks = Arc::new(hooks);
        self
    }

    /// Builds the manager.
    pub fn build(self) -> BreakerManager {
        BreakerManager {
            inner: Arc::new(ManagerInner {
                breakers: RwLock::new(HashMap::default()),
                default_config: self.default_config,
                metric_sink: self.metric_sink,
                hooks: self.hooks,
            }),
        }
    }
}
