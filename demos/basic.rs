use bytes::Bytes;
use callguard::prelude::*;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

// A service that answers 503 on every even request for its first ten calls
fn flaky_service(counter: Arc<AtomicU32>) -> impl UnitOfWork {
    move |_token: CancellationToken| {
        let count = counter.fetch_add(1, Ordering::SeqCst) + 1;
        async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            if count <= 10 && count % 2 == 0 {
                Ok::<_, CallError>(Response::new(503, "service unavailable"))
            } else {
                Ok(Response::ok(format!("reply #{count}")))
            }
        }
    }
}

#[tokio::main]
async fn main() {
    let manager = BreakerManager::new();
    manager.register(
        "flaky",
        BreakerConfig::builder()
            .overall_timeout(Duration::from_secs(1))
            .sleep_window(Duration::from_secs(2))
            .request_volume_threshold(4)
            .error_threshold_percent(50)
            .max_retry_attempts(1)
            .build()
            .expect("valid breaker settings"),
    );

    println!("Circuit initial state: {:?}", manager.state("flaky"));

    let counter = Arc::new(AtomicU32::new(0));

    for i in 1..=15 {
        println!("\nAttempt {}: ", i);

        let result = manager
            .execute("flaky", flaky_service(Arc::clone(&counter)), |err| {
                match err {
                    CallError::CircuitOpen { .. } => Ok(Bytes::from_static(b"cached reply")),
                    other => Err(other),
                }
            })
            .await;

        match result {
            Ok(payload) => println!("Call returned: {}", String::from_utf8_lossy(&payload)),
            Err(err) => println!("Call failed with error: {}", err),
        }

        if let Some(snapshot) = manager.snapshot("flaky") {
            println!(
                "Current state: {}, Error rate: {:.2}%",
                snapshot.state, snapshot.error_percentage
            );
            if snapshot.state == State::Open {
                println!("Circuit is open, waiting before retry...");
                tokio::time::sleep(Duration::from_secs(1)).await;
            }
        }

        tokio::time::sleep(Duration::from_millis(300)).await;
    }
}
