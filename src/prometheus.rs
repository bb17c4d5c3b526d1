//! Prometheus metric sink.

use std::time::Duration;

use prometheus_client::encoding::EncodeLabelSet;
use prometheus_client::metrics::counter::Counter;
use prometheus_client::metrics::family::Family;
use prometheus_client::metrics::gauge::Gauge;
use prometheus_client::metrics::histogram::{exponential_buckets, Histogram};
use prometheus_client::registry::Registry;

use crate::metrics::{CallOutcome, MetricSink};
use crate::state::State;

#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
struct BreakerLabels {
    breaker: String,
}

#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
struct TransitionLabels {
    breaker: String,
    from: String,
    to: String,
}

#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
struct CallLabels {
    breaker: String,
    outcome: String,
}

fn call_duration_histogram() -> Histogram {
    // 5ms up to roughly 10s.
    Histogram::new(exponential_buckets(0.005, 2.0, 12))
}

/// Metric sink exporting breaker activity through `prometheus-client`.
///
/// Clones share the same underlying metric families.
#[derive(Clone)]
pub struct PrometheusSink {
    transitions: Family<TransitionLabels, Counter>,
    short_circuits: Family<BreakerLabels, Counter>,
    calls: Family<CallLabels, Counter>,
    call_duration: Family<CallLabels, Histogram, fn() -> Histogram>,
    state: Family<BreakerLabels, Gauge>,
}

impl PrometheusSink {
    /// Creates the metric families and registers them under `callguard_*`.
    pub fn new(registry: &mut Registry) -> Self {
        let sink = Self {
            transitions: Family::default(),
            short_circuits: Family::default(),
            calls: Family::default(),
            call_duration: Family::new_with_constructor(call_duration_histogram as fn() -> Histogram),
            state: Family::default(),
        };

        registry.register(
            "callguard_state_transitions",
            "Circuit breaker state transitions",
            sink.transitions.clone(),
        );
        registry.register(
            "callguard_short_circuits",
            "Calls refused by an open circuit breaker",
            sink.short_circuits.clone(),
        );
        registry.register(
            "callguard_calls",
            "Permitted calls by outcome",
            sink.calls.clone(),
        );
        registry.register(
            "callguard_call_duration_seconds",
            "Wall-clock duration of permitted calls",
            sink.call_duration.clone(),
        );
        registry.register(
            "callguard_state",
            "Current breaker state (0 closed, 1 open, 2 half-open)",
            sink.state.clone(),
        );

        sink
    }
}

impl MetricSink for PrometheusSink {
    fn record_state_transition(&self, breaker: &str, from: State, to: State) {
        self.transitions
            .get_or_create(&TransitionLabels {
                breaker: breaker.to_owned(),
                from: from.as_str().to_owned(),
                to: to.as_str().to_owned(),
            })
            .inc();

        let value = match to {
            State::Closed => 0,
            State::Open => 1,
            State::HalfOpen => 2,
        };
        self.state
            .get_or_create(&BreakerLabels {
                breaker: breaker.to_owned(),
            })
            .set(value);
    }

    fn record_short_circuit(&self, breaker: &str) {
        self.short_circuits
            .get_or_create(&BreakerLabels {
                breaker: breaker.to_owned(),
            })
            .inc();
    }

    fn record_call(&self, breaker: &str, outcome: CallOutcome, duration: Duration) {
        let labels = CallLabels {
            breaker: breaker.to_owned(),
            outcome: outcome.as_str().to_owned(),
        };
        self.calls.get_or_create(&labels).inc();
        self.call_duration
            .get_or_create(&labels)
            .observe(duration.as_secs_f64());
    }
}
