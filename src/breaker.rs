//! Core circuit breaker implementation.

use std::sync::Arc;

use parking_lot::Mutex;
use tokio::time::Instant;
use tracing::Instrument;

use crate::call::UnitOfWork;
use crate::config::BreakerConfig;
use crate::coordinator::CallCoordinator;
use crate::error::{CallError, CallResult};
use crate::hook::HookRegistry;
use crate::metrics::{BreakerSnapshot, CallOutcome, MetricSink, RollingWindow};
use crate::policy::TripPolicy;
use crate::retry::RetryExecutor;
use crate::state::{State, StateMachine, Transition};

/// State and metrics of one breaker, always mutated together.
struct BreakerCore {
    machine: StateMachine,
    window: RollingWindow,
}

/// Which kind of admission a call was granted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Admission {
    Normal,
    Trial,
}

/// A granted admission. Dropping it unsettled gives an in-flight trial back.
///
/// `generation` is the state machine generation at admission; a permit from
/// an earlier generation never drives transitions.
struct Permit<'a> {
    breaker: &'a CircuitBreaker,
    admission: Admission,
    generation: u64,
    settled: bool,
}

impl Permit<'_> {
    fn settle(mut self, result: &CallResult) {
        self.settled = true;
        self.breaker.post_call(self.admission, self.generation, result);
    }
}

impl Drop for Permit<'_> {
    fn drop(&mut self) {
        if !self.settled && self.admission == Admission::Trial {
            self.breaker.abandon_trial(self.generation);
        }
    }
}

/// A named circuit breaker wrapping outbound calls.
///
/// Each permitted call runs on its own task through a [`CallCoordinator`]
/// and a [`RetryExecutor`] built from the breaker's [`BreakerConfig`].
pub struct CircuitBreaker {
    name: Arc<str>,
    config: BreakerConfig,
    policy: TripPolicy,
    retry: RetryExecutor,
    coordinator: CallCoordinator,
    core: Mutex<BreakerCore>,
    metric_sink: Arc<dyn MetricSink>,
    hooks: Arc<HookRegistry>,
}

impl CircuitBreaker {
    /// Creates a new circuit breaker with the specified settings.
    pub fn new(
        name: impl Into<Arc<str>>,
        config: BreakerConfig,
        metric_sink: Arc<dyn MetricSink>,
        hooks: Arc<HookRegistry>,
    ) -> Self {
        let core = BreakerCore {
            machine: StateMachine::new(),
            window: RollingWindow::new(config.rolling_window(), config.rolling_buckets()),
        };

        Self {
            name: name.into(),
            policy: config.trip_policy(),
            retry: RetryExecutor::from_config(&config),
            coordinator: CallCoordinator::new(config.overall_timeout()),
            config,
            core: Mutex::new(core),
            metric_sink,
            hooks,
        }
    }

    /// Name the breaker is registered under.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Settings the breaker was created with.
    pub fn config(&self) -> &BreakerConfig {
        &self.config
    }

    /// Gets the current state of the circuit breaker.
    pub fn current_state(&self) -> State {
        self.core.lock().machine.current()
    }

    /// Captures state and window counters in one consistent read.
    pub fn snapshot(&self) -> BreakerSnapshot {
        let mut core = self.core.lock();
        let window = core.window.snapshot();

        BreakerSnapshot {
            name: self.name.to_string(),
            state: core.machine.current(),
            total_calls: window.total(),
            failures: window.failures,
            successes: window.successes,
            error_percentage: window.error_percentage(),
            time_in_state: core.machine.time_in_state(),
        }
    }

    /// Executes `unit` under breaker protection.
    ///
    /// When the breaker refuses the call, or the call fails after retries or
    /// times out, `fallback` receives the error and its result is returned.
    /// A 4xx answer is handed back as [`CallError::Client`] without calling
    /// the fallback, since it says nothing bad about the callee's health.
    pub async fn execute<W, Fb>(&self, unit: W, fallback: Fb) -> CallResult
    where
        W: UnitOfWork,
        Fb: FnOnce(CallError) -> CallResult,
    {
        let permit = match self.pre_call() {
            Ok(permit) => permit,
            Err(err) => {
                self.metric_sink.record_short_circuit(&self.name);
                self.hooks.execute_short_circuit_hook(&self.name);
                tracing::debug!(breaker = %self.name, "call short-circuited");
                return fallback(err);
            }
        };

        let retry = self.retry.clone();
        let span = tracing::debug_span!("protected_call", breaker = %self.name);
        let start = Instant::now();
        let result = self
            .coordinator
            .execute_with_timeout(move |token| async move { retry.run(&unit, &token).await })
            .instrument(span)
            .await;
        let duration = start.elapsed();

        self.metric_sink
            .record_call(&self.name, outcome_of(&result), duration);
        permit.settle(&result);

        match result {
            Ok(payload) => {
                tracing::debug!(breaker = %self.name, ?duration, "protected call succeeded");
                Ok(payload)
            }
            Err(err) if !err.is_breaker_failure() => Err(err),
            Err(err) => fallback(err),
        }
    }

    /// Checks if a call is allowed based on the current state.
    fn pre_call(&self) -> Result<Permit<'_>, CallError> {
        let mut core = self.core.lock();

        let (admission, transition) = match core.machine.current() {
            State::Closed => (Admission::Normal, None),
            State::Open => {
                if core.machine.time_in_state() < self.config.sleep_window() {
                    return Err(self.open_error());
                }
                let transition = core.machine.transition_to(State::HalfOpen);
                core.machine.claim_trial();
                (Admission::Trial, transition)
            }
            State::HalfOpen => {
                if !core.machine.claim_trial() {
                    return Err(self.open_error());
                }
                (Admission::Trial, None)
            }
        };
        let generation = core.machine.generation();
        drop(core);

        // Execute hooks outside the lock path
        if let Some(transition) = transition {
            self.announce(transition);
        }

        Ok(Permit {
            breaker: self,
            admission,
            generation,
            settled: false,
        })
    }

    /// Processes the result of a call to update stats and potentially change state.
    fn post_call(&self, admission: Admission, generation: u64, result: &CallResult) {
        let failed = matches!(result, Err(err) if err.is_breaker_failure());
        let mut core = self.core.lock();

        let current = if core.machine.generation() == generation {
            Some(core.machine.current())
        } else {
            None
        };
        let transition = match (admission, current) {
            (Admission::Trial, Some(State::HalfOpen)) if failed => {
                core.machine.transition_to(State::Open)
            }
            (Admission::Trial, Some(State::HalfOpen)) => {
                core.window.reset();
                core.machine.transition_to(State::Closed)
            }
            (Admission::Normal, Some(State::Closed)) if failed => {
                core.window.record_failure();
                let window = core.window.snapshot();
                if self.policy.should_trip(&window) {
                    core.machine.transition_to(State::Open)
                } else {
                    None
                }
            }
            (Admission::Normal, Some(State::Closed)) => {
                core.window.record_success();
                None
            }
            // The breaker moved on while this call was in flight.
            _ => None,
        };
        drop(core);

        if failed {
            self.hooks.execute_failure_hook(&self.name);
        } else {
            self.hooks.execute_success_hook(&self.name);
        }
        if let Some(transition) = transition {
            self.announce(transition);
        }
    }

    /// Reopens the breaker when its current trial is dropped before it resolved.
    fn abandon_trial(&self, generation: u64) {
        let transition = {
            let mut core = self.core.lock();
            if core.machine.generation() == generation
                && core.machine.current() == State::HalfOpen
            {
                core.machine.transition_to(State::Open)
            } else {
                None
            }
        };

        if let Some(transition) = transition {
            tracing::debug!(breaker = %self.name, "trial call abandoned");
            self.announce(transition);
        }
    }

    /// Forces the circuit breaker to the open state.
    ///
    /// Calls already in flight, including a half-open trial, no longer affect
    /// the state when they finish.
    pub fn force_open(&self) -> bool {
        let transition = self.core.lock().machine.transition_to(State::Open);
        self.announce_forced(transition)
    }

    /// Forces the circuit breaker to the closed state.
    ///
    /// Calls already in flight, including a half-open trial, no longer affect
    /// the state or the window when they finish.
    pub fn force_closed(&self) -> bool {
        let transition = {
            let mut core = self.core.lock();
            let transition = core.machine.transition_to(State::Closed);
            if transition.is_some() {
                core.window.reset();
            }
            transition
        };
        self.announce_forced(transition)
    }

    /// Resets the circuit breaker's statistics.
    pub fn reset_stats(&self) {
        self.core.lock().window.reset();
    }

    fn announce_forced(&self, transition: Option<Transition>) -> bool {
        match transition {
            Some(transition) => {
                self.announce(transition);
                true
            }
            None => false,
        }
    }

    fn announce(&self, Transition { from, to }: Transition) {
        match to {
            State::Open => tracing::warn!(breaker = %self.name, %from, "circuit opened"),
            State::HalfOpen => tracing::info!(breaker = %self.name, "circuit half-open, admitting trial"),
            State::Closed => tracing::info!(breaker = %self.name, %from, "circuit closed"),
        }

        self.hooks.execute_state_transition_hook(&self.name, to);
        self.metric_sink
            .record_state_transition(&self.name, from, to);
    }

    fn open_error(&self) -> CallError {
        CallError::CircuitOpen {
            breaker: self.name.to_string(),
        }
    }
}

fn outcome_of(result: &CallResult) -> CallOutcome {
    match result {
        Ok(_) => CallOutcome::Success,
        Err(CallError::Client { .. }) => CallOutcome::Rejected,
        Err(CallError::Timeout(_)) => CallOutcome::Timeout,
        Err(_) => CallOutcome::Failure,
    }
}

/// Fallback that logs the error and hands it back unchanged.
///
/// This is what [`crate::BreakerManager::call`] uses when the caller has no
/// degraded response to offer.
pub fn passthrough(err: CallError) -> CallResult {
    tracing::error!(error = %err, kind = err.kind(), "protected call failed");
    Err(err)
}
