//! Hook registry for circuit breaker events.
//!
//! Hooks receive the name of the breaker that raised the event, so one
//! registry can be shared by every breaker of a manager.

use crate::state::State;
use parking_lot::RwLock;
use std::sync::Arc;

type HookFn = Arc<dyn Fn(&str) + Send + Sync + 'static>;

/// A registry for circuit breaker event hooks.
#[derive(Default)]
pub struct HookRegistry {
    on_open: RwLock<Option<HookFn>>,
    on_close: RwLock<Option<HookFn>>,
    on_half_open: RwLock<Option<HookFn>>,
    on_short_circuit: RwLock<Option<HookFn>>,
    on_success: RwLock<Option<HookFn>>,
    on_failure: RwLock<Option<HookFn>>,
}

impl HookRegistry {
    /// Creates a new empty hook registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the hook to call when a breaker opens.
    pub fn set_on_open<F>(&self, f: F)
    where
        F: Fn(&str) + Send + Sync + 'static,
    {
        *self.on_open.write() = Some(Arc::new(f));
    }

    /// Sets the hook to call when a breaker closes.
    pub fn set_on_close<F>(&self, f: F)
    where
        F: Fn(&str) + Send + Sync + 'static,
    {
        *self.on_close.write() = Some(Arc::new(f));
    }

    /// Sets the hook to call when a breaker half-opens.
    pub fn set_on_half_open<F>(&self, f: F)
    where
        F: Fn(&str) + Send + Sync + 'static,
    {
        *self.on_half_open.write() = Some(Arc::new(f));
    }

    /// Sets the hook to call when a call is refused without being attempted.
    pub fn set_on_short_circuit<F>(&self, f: F)
    where
        F: Fn(&str) + Send + Sync + 'static,
    {
        *self.on_short_circuit.write() = Some(Arc::new(f));
    }

    /// Sets the hook to call when a call succeeds.
    pub fn set_on_success<F>(&self, f: F)
    where
        F: Fn(&str) + Send + Sync + 'static,
    {
        *self.on_success.write() = Some(Arc::new(f));
    }

    /// Sets the hook to call when a call fails.
    pub fn set_on_failure<F>(&self, f: F)
    where
        F: Fn(&str) + Send + Sync + 'static,
    {
        *self.on_failure.write() = Some(Arc::new(f));
    }

    /// Executes the appropriate hook for a state transition.
    pub fn execute_state_transition_hook(&self, breaker: &str, to: State) {
        let slot = match to {
            State::Open => &self.on_open,
            State::Closed => &self.on_close,
            State::HalfOpen => &self.on_half_open,
        };
        Self::fire(slot, breaker);
    }

    /// Executes the short-circuit hook.
    pub fn execute_short_circuit_hook(&self, breaker: &str) {
        Self::fire(&self.on_short_circuit, breaker);
    }

    /// Executes the success hook.
    pub fn execute_success_hook(&self, breaker: &str) {
        Self::fire(&self.on_success, breaker);
    }

    /// Executes the failure hook.
    pub fn execute_failure_hook(&self, breaker: &str) {
        Self::fire(&self.on_failure, breaker);
    }

    fn fire(slot: &RwLock<Option<HookFn>>, breaker: &str) {
        // Clone out so a hook may re-register hooks without deadlocking.
        let hook = slot.read().clone();
        if let Some(hook) = hook {
            hook(breaker);
        }
    }
}
