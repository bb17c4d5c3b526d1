use bytes::Bytes;
use callguard::{
    Backoff, BreakerConfig, BreakerManager, CallError, CallOutcome, HookRegistry, MetricSink,
    Response, State, UnitOfWork,
};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;

const SERVICE: &str = "domains";

fn test_config() -> BreakerConfig {
    BreakerConfig::builder()
        .overall_timeout(Duration::from_secs(60))
        .sleep_window(Duration::from_secs(1))
        .request_volume_threshold(10)
        .error_threshold_percent(50)
        .max_retry_attempts(1)
        .retry_backoff(Backoff::Fixed(Duration::ZERO))
        .build()
        .unwrap()
}

fn manager() -> BreakerManager {
    let manager = BreakerManager::new();
    manager.register(SERVICE, test_config());
    manager
}

fn counting(calls: Arc<AtomicU32>, status: u16) -> impl UnitOfWork {
    move |_token: CancellationToken| {
        calls.fetch_add(1, Ordering::SeqCst);
        async move { Ok::<_, CallError>(Response::new(status, "body")) }
    }
}

fn responding(status: u16) -> impl UnitOfWork {
    counting(Arc::new(AtomicU32::new(0)), status)
}

/// A unit that signals `started` and then waits for `gate` before answering.
fn gated(started: Arc<Notify>, gate: Arc<Notify>, status: u16) -> impl UnitOfWork {
    move |_token: CancellationToken| {
        let started = Arc::clone(&started);
        let gate = Arc::clone(&gate);
        async move {
            started.notify_one();
            gate.notified().await;
            Ok::<_, CallError>(Response::new(status, "trial"))
        }
    }
}

async fn trip(manager: &BreakerManager) {
    for _ in 0..10 {
        let _ = manager.call(SERVICE, responding(503)).await;
    }
    assert_eq!(manager.state(SERVICE), Some(State::Open));
}

#[tokio::test(start_paused = true)]
async fn test_trips_once_volume_and_error_rate_are_reached() {
    let manager = manager();

    for _ in 0..5 {
        assert!(manager.call(SERVICE, responding(200)).await.is_ok());
    }
    for _ in 0..4 {
        let result = manager.call(SERVICE, responding(503)).await;
        assert!(matches!(result, Err(CallError::RetriesExhausted { .. })));
    }
    // 9 calls, 44% failed
    assert_eq!(manager.state(SERVICE), Some(State::Closed));

    let _ = manager.call(SERVICE, responding(503)).await;
    // 10 calls, 50% failed
    assert_eq!(manager.state(SERVICE), Some(State::Open));
}

#[tokio::test(start_paused = true)]
async fn test_stays_closed_below_volume_threshold() {
    let manager = manager();

    for _ in 0..9 {
        let _ = manager.call(SERVICE, responding(500)).await;
    }

    let snapshot = manager.snapshot(SERVICE).unwrap();
    assert_eq!(snapshot.state, State::Closed);
    assert_eq!(snapshot.failures, 9);
    assert_eq!(snapshot.error_percentage, 100.0);
}

#[tokio::test(start_paused = true)]
async fn test_open_breaker_never_invokes_unit() {
    let manager = manager();
    trip(&manager).await;

    let calls = Arc::new(AtomicU32::new(0));
    let attempts = (0..20).map(|_| {
        manager.execute(SERVICE, counting(Arc::clone(&calls), 200), |err| {
            assert!(matches!(err, CallError::CircuitOpen { .. }));
            Ok(Bytes::from_static(b"cached"))
        })
    });
    let results = futures::future::join_all(attempts).await;

    assert_eq!(calls.load(Ordering::SeqCst), 0);
    assert!(results.iter().all(|r| r.as_ref().unwrap() == "cached"));
    assert_eq!(manager.state(SERVICE), Some(State::Open));
}

#[tokio::test(start_paused = true)]
async fn test_half_open_admits_a_single_trial() {
    let manager = manager();
    trip(&manager).await;
    tokio::time::advance(Duration::from_secs(2)).await;

    let started = Arc::new(Notify::new());
    let gate = Arc::new(Notify::new());
    let trial = {
        let manager = manager.clone();
        let unit = gated(Arc::clone(&started), Arc::clone(&gate), 200);
        tokio::spawn(async move { manager.call(SERVICE, unit).await })
    };

    started.notified().await;
    assert_eq!(manager.state(SERVICE), Some(State::HalfOpen));

    let calls = Arc::new(AtomicU32::new(0));
    let second = manager
        .call(SERVICE, counting(Arc::clone(&calls), 200))
        .await;
    assert!(matches!(second, Err(CallError::CircuitOpen { .. })));
    assert_eq!(calls.load(Ordering::SeqCst), 0);

    gate.notify_one();
    let result = trial.await.unwrap();
    assert_eq!(result.unwrap(), "trial");
    assert_eq!(manager.state(SERVICE), Some(State::Closed));
}

#[tokio::test(start_paused = true)]
async fn test_trial_success_resets_metrics() {
    let manager = manager();
    trip(&manager).await;
    tokio::time::advance(Duration::from_secs(2)).await;

    assert!(manager.call(SERVICE, responding(200)).await.is_ok());
    let snapshot = manager.snapshot(SERVICE).unwrap();
    assert_eq!(snapshot.state, State::Closed);
    assert_eq!(snapshot.total_calls, 0);

    let _ = manager.call(SERVICE, responding(503)).await;
    assert_eq!(manager.state(SERVICE), Some(State::Closed));
}

#[tokio::test(start_paused = true)]
async fn test_trial_failure_reopens_breaker() {
    let manager = manager();
    trip(&manager).await;
    tokio::time::advance(Duration::from_secs(2)).await;

    let result = manager.call(SERVICE, responding(502)).await;
    assert!(matches!(result, Err(CallError::RetriesExhausted { .. })));
    assert_eq!(manager.state(SERVICE), Some(State::Open));

    // The sleep window starts over.
    let calls = Arc::new(AtomicU32::new(0));
    let result = manager
        .call(SERVICE, counting(Arc::clone(&calls), 200))
        .await;
    assert!(matches!(result, Err(CallError::CircuitOpen { .. })));
    assert_eq!(calls.load(Ordering::SeqCst), 0);
}

#[tokio::test(start_paused = true)]
async fn test_abandoned_trial_reopens_breaker() {
    let manager = manager();
    trip(&manager).await;
    tokio::time::advance(Duration::from_secs(2)).await;

    let started = Arc::new(Notify::new());
    let gate = Arc::new(Notify::new());
    let trial = {
        let manager = manager.clone();
        let unit = gated(Arc::clone(&started), gate, 200);
        tokio::spawn(async move { manager.call(SERVICE, unit).await })
    };

    started.notified().await;
    trial.abort();
    assert!(trial.await.unwrap_err().is_cancelled());
    assert_eq!(manager.state(SERVICE), Some(State::Open));
}

#[tokio::test(start_paused = true)]
async fn test_stale_trial_does_not_settle_a_newer_one() {
    let manager = manager();
    let breaker = manager.get_or_create(SERVICE);
    breaker.force_open();
    tokio::time::advance(Duration::from_secs(2)).await;

    let started_a = Arc::new(Notify::new());
    let gate_a = Arc::new(Notify::new());
    let trial_a = {
        let manager = manager.clone();
        let unit = gated(Arc::clone(&started_a), Arc::clone(&gate_a), 200);
        tokio::spawn(async move { manager.call(SERVICE, unit).await })
    };
    started_a.notified().await;

    // Reopen under the first trial and let a second one in.
    breaker.force_open();
    tokio::time::advance(Duration::from_secs(2)).await;

    let started_b = Arc::new(Notify::new());
    let gate_b = Arc::new(Notify::new());
    let trial_b = {
        let manager = manager.clone();
        let unit = gated(Arc::clone(&started_b), Arc::clone(&gate_b), 500);
        tokio::spawn(async move { manager.call(SERVICE, unit).await })
    };
    started_b.notified().await;
    assert_eq!(manager.state(SERVICE), Some(State::HalfOpen));

    gate_a.notify_one();
    assert_eq!(trial_a.await.unwrap().unwrap(), "trial");
    assert_eq!(manager.state(SERVICE), Some(State::HalfOpen));

    gate_b.notify_one();
    let result = trial_b.await.unwrap();
    assert!(matches!(result, Err(CallError::RetriesExhausted { .. })));
    assert_eq!(manager.state(SERVICE), Some(State::Open));
}

#[tokio::test(start_paused = true)]
async fn test_dropped_stale_trial_leaves_newer_one_in_charge() {
    let manager = manager();
    let breaker = manager.get_or_create(SERVICE);
    breaker.force_open();
    tokio::time::advance(Duration::from_secs(2)).await;

    let started_a = Arc::new(Notify::new());
    let trial_a = {
        let manager = manager.clone();
        let unit = gated(Arc::clone(&started_a), Arc::new(Notify::new()), 200);
        tokio::spawn(async move { manager.call(SERVICE, unit).await })
    };
    started_a.notified().await;

    breaker.force_open();
    tokio::time::advance(Duration::from_secs(2)).await;

    let started_b = Arc::new(Notify::new());
    let gate_b = Arc::new(Notify::new());
    let trial_b = {
        let manager = manager.clone();
        let unit = gated(Arc::clone(&started_b), Arc::clone(&gate_b), 200);
        tokio::spawn(async move { manager.call(SERVICE, unit).await })
    };
    started_b.notified().await;

    trial_a.abort();
    assert!(trial_a.await.unwrap_err().is_cancelled());
    assert_eq!(manager.state(SERVICE), Some(State::HalfOpen));

    gate_b.notify_one();
    assert_eq!(trial_b.await.unwrap().unwrap(), "trial");
    assert_eq!(manager.state(SERVICE), Some(State::Closed));
}

#[tokio::test(start_paused = true)]
async fn test_trial_timeout_reopens_breaker() {
    let manager = BreakerManager::new();
    manager.register(
        SERVICE,
        BreakerConfig::builder()
            .overall_timeout(Duration::from_millis(100))
            .sleep_window(Duration::from_secs(1))
            .max_retry_attempts(1)
            .build()
            .unwrap(),
    );
    trip(&manager).await;
    tokio::time::advance(Duration::from_secs(2)).await;

    let slow = |_token: CancellationToken| async {
        tokio::time::sleep(Duration::from_secs(10)).await;
        Ok::<_, CallError>(Response::ok("late"))
    };
    let result = manager.call(SERVICE, slow).await;

    assert!(matches!(result, Err(CallError::Timeout(_))));
    assert_eq!(manager.state(SERVICE), Some(State::Open));
}

#[tokio::test(start_paused = true)]
async fn test_expired_failures_do_not_trip() {
    let manager = manager();

    for _ in 0..9 {
        let _ = manager.call(SERVICE, responding(503)).await;
    }
    assert_eq!(manager.snapshot(SERVICE).unwrap().failures, 9);

    // Past the default 10s rolling window.
    tokio::time::advance(Duration::from_secs(11)).await;
    let _ = manager.call(SERVICE, responding(503)).await;

    let snapshot = manager.snapshot(SERVICE).unwrap();
    assert_eq!(snapshot.state, State::Closed);
    assert_eq!(snapshot.failures, 1);
}

struct DropFlag(Arc<AtomicBool>);

impl Drop for DropFlag {
    fn drop(&mut self) {
        self.0.store(true, Ordering::SeqCst);
    }
}

#[tokio::test(start_paused = true)]
async fn test_timeout_is_a_failure_and_cancels_the_call() {
    let manager = BreakerManager::new();
    manager.register(
        SERVICE,
        BreakerConfig::builder()
            .overall_timeout(Duration::from_millis(100))
            .build()
            .unwrap(),
    );

    let dropped = Arc::new(AtomicBool::new(false));
    let completed = Arc::new(AtomicBool::new(false));
    let unit = {
        let dropped = Arc::clone(&dropped);
        let completed = Arc::clone(&completed);
        move |_token: CancellationToken| {
            let flag = DropFlag(Arc::clone(&dropped));
            let completed = Arc::clone(&completed);
            async move {
                let _flag = flag;
                tokio::time::sleep(Duration::from_secs(10)).await;
                completed.store(true, Ordering::SeqCst);
                Ok::<_, CallError>(Response::ok("late"))
            }
        }
    };

    let fallback_saw = Arc::new(Mutex::new(None));
    let seen = Arc::clone(&fallback_saw);
    let result = manager
        .execute(SERVICE, unit, move |err| {
            *seen.lock() = Some(err.kind());
            Err(err)
        })
        .await;

    assert!(matches!(result, Err(CallError::Timeout(t)) if t == Duration::from_millis(100)));
    assert_eq!(*fallback_saw.lock(), Some("timeout"));
    assert_eq!(manager.snapshot(SERVICE).unwrap().failures, 1);

    tokio::time::sleep(Duration::from_millis(10)).await;
    assert!(dropped.load(Ordering::SeqCst));
    assert!(!completed.load(Ordering::SeqCst));
}

#[tokio::test(start_paused = true)]
async fn test_client_error_skips_fallback_and_counts_as_success() {
    let manager = manager();
    let fallback_called = Arc::new(AtomicBool::new(false));
    let flag = Arc::clone(&fallback_called);

    let result = manager
        .execute(SERVICE, responding(404), move |err| {
            flag.store(true, Ordering::SeqCst);
            Err(err)
        })
        .await;

    assert!(matches!(result, Err(CallError::Client { status: 404, .. })));
    assert!(!fallback_called.load(Ordering::SeqCst));
    let snapshot = manager.snapshot(SERVICE).unwrap();
    assert_eq!(snapshot.successes, 1);
    assert_eq!(snapshot.failures, 0);
}

#[tokio::test(start_paused = true)]
async fn test_manual_control() {
    let manager = manager();
    let breaker = manager.get_or_create(SERVICE);

    // Force open
    assert!(breaker.force_open());
    assert_eq!(breaker.current_state(), State::Open);
    let result = manager.call(SERVICE, responding(200)).await;
    assert!(matches!(result, Err(CallError::CircuitOpen { .. })));

    // Trying to open again should return false (no change)
    assert!(!breaker.force_open());

    assert!(breaker.force_closed());
    assert_eq!(breaker.current_state(), State::Closed);
    assert!(!breaker.force_closed());
    assert!(manager.call(SERVICE, responding(200)).await.is_ok());

    breaker.reset_stats();
    assert_eq!(breaker.snapshot().total_calls, 0);
}

#[tokio::test(start_paused = true)]
async fn test_registry_creates_breakers_on_first_use() {
    let manager = BreakerManager::new();
    assert!(manager.breaker("lazy").is_none());

    let result = manager.call("lazy", responding(200)).await;
    assert_eq!(result.unwrap(), "body");
    assert_eq!(manager.state("lazy"), Some(State::Closed));
    assert_eq!(
        manager.breaker("lazy").unwrap().config(),
        &BreakerConfig::default()
    );

    // An isolated manager shares nothing.
    assert!(BreakerManager::new().breaker("lazy").is_none());
}

#[tokio::test(start_paused = true)]
async fn test_first_registration_wins() {
    let manager = manager();
    trip(&manager).await;

    let again = manager.register(SERVICE, BreakerConfig::default());
    assert_eq!(again.config(), &test_config());
    assert_eq!(again.current_state(), State::Open);

    manager.get_or_create("alpha");
    let names: Vec<_> = manager.snapshots().into_iter().map(|s| s.name).collect();
    assert_eq!(names, vec!["alpha".to_string(), SERVICE.to_string()]);
}

#[tokio::test(start_paused = true)]
async fn test_hooks_fire_with_breaker_name() {
    let events = Arc::new(Mutex::new(Vec::new()));
    let hooks = HookRegistry::new();
    for (label, slot) in [("open", 0), ("half-open", 1), ("close", 2), ("short", 3)] {
        let events = Arc::clone(&events);
        let record = move |name: &str| events.lock().push(format!("{label}:{name}"));
        match slot {
            0 => hooks.set_on_open(record),
            1 => hooks.set_on_half_open(record),
            2 => hooks.set_on_close(record),
            _ => hooks.set_on_short_circuit(record),
        }
    }

    let manager = BreakerManager::builder().hooks(hooks).build();
    manager.register(SERVICE, test_config());
    trip(&manager).await;
    let _ = manager.call(SERVICE, responding(200)).await;
    tokio::time::advance(Duration::from_secs(2)).await;
    let _ = manager.call(SERVICE, responding(200)).await;

    assert_eq!(
        *events.lock(),
        vec![
            "open:domains".to_string(),
            "short:domains".to_string(),
            "half-open:domains".to_string(),
            "close:domains".to_string(),
        ]
    );
}

#[derive(Clone, Default)]
struct RecordingSink {
    transitions: Arc<Mutex<Vec<(State, State)>>>,
    calls: Arc<Mutex<Vec<CallOutcome>>>,
    short_circuits: Arc<AtomicU32>,
}

impl MetricSink for RecordingSink {
    fn record_state_transition(&self, _breaker: &str, from: State, to: State) {
        self.transitions.lock().push((from, to));
    }

    fn record_short_circuit(&self, _breaker: &str) {
        self.short_circuits.fetch_add(1, Ordering::SeqCst);
    }

    fn record_call(&self, _breaker: &str, outcome: CallOutcome, _duration: Duration) {
        self.calls.lock().push(outcome);
    }
}

#[tokio::test(start_paused = true)]
async fn test_metric_sink_sees_every_event() {
    let sink = RecordingSink::default();
    let manager = BreakerManager::builder()
        .default_config(test_config())
        .metric_sink(sink.clone())
        .build();

    let _ = manager.call(SERVICE, responding(404)).await;
    trip(&manager).await;
    let _ = manager.call(SERVICE, responding(200)).await;
    tokio::time::advance(Duration::from_secs(2)).await;
    let _ = manager.call(SERVICE, responding(500)).await;

    assert_eq!(
        *sink.transitions.lock(),
        vec![
            (State::Closed, State::Open),
            (State::Open, State::HalfOpen),
            (State::HalfOpen, State::Open),
        ]
    );
    // The 404 kept one success in the window, so the ninth failure tripped
    // the breaker and the tenth call was already refused.
    assert_eq!(sink.short_circuits.load(Ordering::SeqCst), 2);
    let calls = sink.calls.lock();
    assert_eq!(calls[0], CallOutcome::Rejected);
    assert_eq!(calls.len(), 11);
    assert!(calls[1..].iter().all(|c| *c == CallOutcome::Failure));
}
