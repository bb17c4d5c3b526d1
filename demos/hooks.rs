//! Hooks and Metrics Example
//!
//! This example demonstrates:
//! 1. Using hooks for monitoring circuit breaker events
//! 2. Plugging a custom metric sink into the manager
//! 3. Forcing a breaker open and closed by hand

use callguard::prelude::*;
use callguard::{CallOutcome, HookRegistry, MetricSink};
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;

/// Keeps a running tally of breaker events. Clones share the tally.
#[derive(Clone, Default)]
struct TallySink {
    lines: Arc<Mutex<Vec<String>>>,
}

impl MetricSink for TallySink {
    fn record_state_transition(&self, breaker: &str, from: State, to: State) {
        self.lines
            .lock()
            .push(format!("{breaker}: {from} -> {to}"));
    }

    fn record_short_circuit(&self, breaker: &str) {
        self.lines.lock().push(format!("{breaker}: short-circuited"));
    }

    fn record_call(&self, breaker: &str, outcome: CallOutcome, duration: Duration) {
        self.lines
            .lock()
            .push(format!("{breaker}: {} in {duration:?}", outcome.as_str()));
    }
}

fn service(status: u16) -> impl UnitOfWork {
    move |_token: CancellationToken| async move {
        Ok::<_, CallError>(Response::new(status, format!("status {status}")))
    }
}

#[tokio::main]
async fn main() {
    println!("=== Hooks and Metrics Example ===\n");

    // 1. Set up a hook registry for observability
    let hooks = HookRegistry::new();
    hooks.set_on_open(|name| println!("[{name}] circuit OPENED due to too many failures"));
    hooks.set_on_close(|name| println!("[{name}] circuit CLOSED after successful recovery"));
    hooks.set_on_half_open(|name| println!("[{name}] circuit HALF-OPEN, testing recovery"));
    hooks.set_on_short_circuit(|name| println!("[{name}] call refused"));
    hooks.set_on_success(|name| println!("[{name}] call succeeded"));
    hooks.set_on_failure(|name| println!("[{name}] call failed"));

    // 2. Share a metric sink across every breaker
    let sink = TallySink::default();
    let manager = BreakerManager::builder()
        .default_config(
            BreakerConfig::builder()
                .sleep_window(Duration::from_millis(500))
                .request_volume_threshold(3)
                .max_retry_attempts(1)
                .build()
                .expect("valid breaker settings"),
        )
        .metric_sink(sink.clone())
        .hooks(hooks)
        .build();

    // 3. Trip the breaker, wait out the sleep window, then recover
    for status in [200, 500, 500, 500] {
        let _ = manager.call("inventory", service(status)).await;
    }
    let _ = manager.call("inventory", service(200)).await;

    tokio::time::sleep(Duration::from_millis(600)).await;
    let _ = manager.call("inventory", service(200)).await;

    // 4. Manual control
    let breaker = manager.get_or_create("inventory");
    breaker.force_open();
    let _ = manager.call("inventory", service(200)).await;
    breaker.force_closed();

    println!("\n=== Recorded metrics ===");
    for line in sink.lines.lock().iter() {
        println!("{line}");
    }

    println!("\n=== Breakers ===");
    for snapshot in manager.snapshots() {
        println!(
            "{}: {} ({} calls, {:.1}% errors)",
            snapshot.name, snapshot.state, snapshot.total_calls, snapshot.error_percentage
        );
    }
}
