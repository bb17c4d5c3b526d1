//! Circuit breaker state machine implementation.

use std::fmt;
use std::time::Duration;

use tokio::time::Instant;

/// Represents the possible states of a circuit breaker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum State {
    /// Circuit is closed and calls are attempted.
    Closed,

    /// Circuit is open and calls are short-circuited to the fallback.
    Open,

    /// Circuit is letting a single trial call through to test recovery.
    HalfOpen,
}

impl State {
    /// Lowercase label used in logs and metrics.
    pub fn as_str(&self) -> &'static str {
        match self {
            State::Closed => "closed",
            State::Open => "open",
            State::HalfOpen => "half-open",
        }
    }
}

impl fmt::Display for State {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A state change that took effect, reported to hooks and sinks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Transition {
    pub(crate) from: State,
    pub(crate) to: State,
}

/// State plus the bookkeeping needed to gate trials.
///
/// Always accessed under the owning breaker's lock, so plain fields suffice.
#[derive(Debug)]
pub(crate) struct StateMachine {
    state: State,
    last_transition: Instant,
    generation: u64,
    trial_in_flight: bool,
}

impl StateMachine {
    pub(crate) fn new() -> Self {
        Self {
            state: State::Closed,
            last_transition: Instant::now(),
            generation: 0,
            trial_in_flight: false,
        }
    }

    pub(crate) fn current(&self) -> State {
        self.state
    }

    pub(crate) fn time_in_state(&self) -> Duration {
        self.last_transition.elapsed()
    }

    /// Counts transitions. Permits carry the value they were admitted under.
    pub(crate) fn generation(&self) -> u64 {
        self.generation
    }

    /// Moves to `to`, stamping the transition time. No-op when already there.
    pub(crate) fn transition_to(&mut self, to: State) -> Option<Transition> {
        if self.state == to {
            return None;
        }

        let from = self.state;
        self.state = to;
        self.last_transition = Instant::now();
        self.generation += 1;
        self.trial_in_flight = false;
        Some(Transition { from, to })
    }

    /// Claims the single half-open trial. Only one caller wins per trial.
    pub(crate) fn claim_trial(&mut self) -> bool {
        if self.state != State::HalfOpen || self.trial_in_flight {
            return false;
        }

        self.trial_in_flight = true;
        true
    }
}
