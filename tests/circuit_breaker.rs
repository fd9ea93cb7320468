//! Breaker state-machine scenarios across open, fast-fail and recovery.

use pagepilot_breaker::{BreakerConfig, BreakerError, BreakerRegistry, CircuitBreaker, CircuitState};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

fn scenario_breaker() -> CircuitBreaker {
    CircuitBreaker::new(
        BreakerConfig::builder()
            .name("scenario")
            .failure_threshold(3)
            .success_threshold(2)
            .recovery_timeout(Duration::from_millis(100))
            .monitoring_window(Duration::from_secs(10))
            .build(),
    )
}

#[tokio::test]
async fn opens_fast_fails_then_recovers() {
    let breaker = scenario_breaker();

    for _ in 0..3 {
        let result = breaker
            .execute(|| async { Err::<(), _>("upstream exploded") })
            .await;
        assert!(matches!(result, Err(BreakerError::Inner(_))));
    }
    assert_eq!(breaker.state(), CircuitState::Open);

    // The fourth call must fast-fail without invoking the dependency.
    let invoked = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&invoked);
    let result = breaker
        .execute(move || async move {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok::<_, String>(())
        })
        .await;
    assert!(matches!(result, Err(BreakerError::CircuitOpen { .. })));
    assert_eq!(invoked.load(Ordering::SeqCst), 0);

    tokio::time::sleep(Duration::from_millis(150)).await;

    for _ in 0..2 {
        breaker
            .execute(|| async { Ok::<_, String>("recovered") })
            .await
            .unwrap();
    }

    let snapshot = breaker.snapshot();
    assert_eq!(snapshot.state, CircuitState::Closed);
    assert_eq!(snapshot.total_failures, 3);
    assert_eq!(snapshot.total_successes, 2);
}

#[tokio::test]
async fn failures_outside_the_window_do_not_count() {
    let breaker = CircuitBreaker::new(
        BreakerConfig::builder()
            .name("windowed")
            .failure_threshold(2)
            .monitoring_window(Duration::from_millis(80))
            .build(),
    );

    let _ = breaker.execute(|| async { Err::<(), _>("one") }).await;
    tokio::time::sleep(Duration::from_millis(120)).await;
    let _ = breaker.execute(|| async { Err::<(), _>("two") }).await;

    // The first failure aged out of the window before the second landed.
    assert_eq!(breaker.state(), CircuitState::Closed);
    assert_eq!(breaker.snapshot().failures_in_window, 1);
}

#[tokio::test]
async fn circuit_open_error_suggests_retry_delay() {
    let breaker = CircuitBreaker::new(
        BreakerConfig::builder()
            .name("retry-after")
            .failure_threshold(1)
            .recovery_timeout(Duration::from_secs(60))
            .build(),
    );
    let _ = breaker.execute(|| async { Err::<(), _>("down") }).await;

    match breaker.execute(|| async { Ok::<_, String>(()) }).await {
        Err(BreakerError::CircuitOpen { retry_after, .. }) => {
            assert!(retry_after > Duration::from_secs(50));
        }
        other => panic!("expected CircuitOpen, got {other:?}"),
    }
}

#[tokio::test]
async fn registry_shares_breakers_across_call_sites() {
    let registry = BreakerRegistry::new();

    let from_dispatch = registry.external_service("local-docs");
    for _ in 0..5 {
        let _ = from_dispatch
            .execute(|| async { Err::<(), _>("source down") })
            .await;
    }

    // A second lookup observes the same tripped circuit.
    let from_admin = registry.external_service("local-docs");
    assert_eq!(from_admin.state(), CircuitState::Open);

    let summary = registry.health_summary();
    assert_eq!(summary.failed, 1);
    assert_eq!(summary.total, 1);

    assert!(registry.reset("external:local-docs"));
    assert_eq!(from_dispatch.state(), CircuitState::Closed);
}
