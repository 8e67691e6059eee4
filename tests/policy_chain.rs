//! End-to-end behaviour of composed policies.

mod common;

use common::{init_tracing, TestError};
use mainstay::{
    Backoff, CircuitBreakerConfig, Hooks, InstantSleeper, ManualClock, Policy, ResilienceError,
    RetryPolicy,
};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

fn quick_retry(max_attempts: usize) -> RetryPolicy<TestError> {
    RetryPolicy::builder()
        .max_attempts(max_attempts)
        .backoff(Backoff::constant(Duration::ZERO))
        .with_sleeper(InstantSleeper)
        .build()
}

#[tokio::test]
async fn breaker_cycle_open_half_open_closed() {
    init_tracing();
    let clock = ManualClock::new();
    let policy: Policy<&'static str, TestError> = Policy::builder("")
        .with_circuit_breaker(CircuitBreakerConfig {
            failure_threshold: 2,
            recovery_timeout: Duration::from_secs(1),
            half_open_max_attempts: 1,
        })
        .with_clock(clock.clone())
        .build();

    for _ in 0..2 {
        let result = policy
            .execute(|| async { Err(ResilienceError::Inner(TestError("down"))) })
            .await;
        assert!(result.unwrap_err().is_inner());
    }

    // Circuit is open: rejected without invoking the operation.
    let calls = Arc::new(AtomicUsize::new(0));
    let calls_clone = calls.clone();
    let rejected = policy
        .execute(move || {
            let calls = calls_clone.clone();
            async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok("up")
            }
        })
        .await;
    assert!(rejected.unwrap_err().is_circuit_open());
    assert_eq!(calls.load(Ordering::SeqCst), 0);

    // After the recovery window, a probe succeeds and closes the circuit.
    clock.advance(Duration::from_secs(2));
    let probe = policy.execute(|| async { Ok("up") }).await;
    assert_eq!(probe.unwrap(), "up");

    let after = policy.execute(|| async { Ok("up") }).await;
    assert_eq!(after.unwrap(), "up");
}

#[tokio::test]
async fn retry_recovers_and_reports_attempts() {
    let attempts_seen = Arc::new(Mutex::new(Vec::new()));
    let attempts_clone = attempts_seen.clone();
    let policy: Policy<&'static str, TestError> = Policy::builder("")
        .with_retry(quick_retry(3))
        .with_hooks(Hooks::new().on_retry(move |attempt, _| {
            attempts_clone.lock().unwrap().push(attempt);
        }))
        .build();

    let calls = Arc::new(AtomicUsize::new(0));
    let calls_clone = calls.clone();
    let result = policy
        .execute(move || {
            let calls = calls_clone.clone();
            async move {
                if calls.fetch_add(1, Ordering::SeqCst) < 2 {
                    Err(ResilienceError::Inner(TestError("flaky")))
                } else {
                    Ok("ok")
                }
            }
        })
        .await;

    assert_eq!(result.unwrap(), "ok");
    assert_eq!(calls.load(Ordering::SeqCst), 3);
    assert_eq!(*attempts_seen.lock().unwrap(), vec![1, 2]);
}

#[tokio::test]
async fn permanent_error_bypasses_retries() {
    let policy: Policy<&'static str, TestError> =
        Policy::builder("").with_retry(quick_retry(5)).build();

    let calls = Arc::new(AtomicUsize::new(0));
    let calls_clone = calls.clone();
    let result = policy
        .execute(move || {
            let calls = calls_clone.clone();
            async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(ResilienceError::permanent(TestError("schema mismatch")))
            }
        })
        .await;

    assert_eq!(calls.load(Ordering::SeqCst), 1);
    let error = result.unwrap_err();
    assert!(error.is_permanent());
    assert!(!error.is_retry_exhausted());
    assert_eq!(error.into_inner().unwrap().0, "schema mismatch");
}

#[tokio::test]
async fn token_bucket_burst_then_refill() {
    let clock = ManualClock::new();
    let policy: Policy<u32, TestError> =
        Policy::builder("").with_rate_limit(5.0).with_clock(clock.clone()).build();

    let mut admitted = 0;
    let mut limited = 0;
    for i in 0..8 {
        match policy.execute(move || async move { Ok(i) }).await {
            Ok(_) => admitted += 1,
            Err(error) => {
                assert!(error.is_rate_limited());
                limited += 1;
            }
        }
    }
    assert_eq!(admitted, 5);
    assert_eq!(limited, 3);

    clock.advance(Duration::from_secs(1));
    for i in 0..5 {
        assert!(policy.execute(move || async move { Ok(i) }).await.is_ok());
    }
}

#[tokio::test(start_paused = true)]
async fn hedge_triggers_and_wins() {
    let triggered = Arc::new(AtomicUsize::new(0));
    let won = Arc::new(AtomicUsize::new(0));
    let (t, w) = (triggered.clone(), won.clone());

    let policy: Policy<&'static str, TestError> = Policy::builder("")
        .with_hedge(Duration::from_millis(20))
        .with_hooks(
            Hooks::new()
                .on_hedge_triggered(move || {
                    t.fetch_add(1, Ordering::SeqCst);
                })
                .on_hedge_won(move || {
                    w.fetch_add(1, Ordering::SeqCst);
                }),
        )
        .build();

    let calls = Arc::new(AtomicUsize::new(0));
    let calls_clone = calls.clone();
    let result = policy
        .execute(move || {
            let calls = calls_clone.clone();
            async move {
                if calls.fetch_add(1, Ordering::SeqCst) == 0 {
                    tokio::time::sleep(Duration::from_secs(5)).await;
                    Ok("primary")
                } else {
                    Ok("hedge")
                }
            }
        })
        .await;

    assert_eq!(result.unwrap(), "hedge");
    assert_eq!(triggered.load(Ordering::SeqCst), 1);
    assert_eq!(won.load(Ordering::SeqCst), 1);
}

#[tokio::test(start_paused = true)]
async fn timeout_bounds_total_time_across_retries() {
    let timeouts = Arc::new(AtomicUsize::new(0));
    let timeouts_clone = timeouts.clone();

    let policy: Policy<&'static str, TestError> = Policy::builder("")
        .with_timeout(Duration::from_millis(120))
        .with_retry(quick_retry(10))
        .with_hooks(Hooks::new().on_timeout(move || {
            timeouts_clone.fetch_add(1, Ordering::SeqCst);
        }))
        .build();

    let calls = Arc::new(AtomicUsize::new(0));
    let calls_clone = calls.clone();
    let result = policy
        .execute(move || {
            let calls = calls_clone.clone();
            async move {
                calls.fetch_add(1, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(50)).await;
                Err(ResilienceError::Inner(TestError("slow and failing")))
            }
        })
        .await;

    assert!(result.unwrap_err().is_timeout());
    assert_eq!(timeouts.load(Ordering::SeqCst), 1);
    let seen = calls.load(Ordering::SeqCst);
    assert!(
        (2..=3).contains(&seen),
        "the deadline cuts the retry loop short, saw {} attempts",
        seen
    );
}

#[tokio::test]
async fn bulkhead_rejects_overflow_through_policy() {
    let policy: Policy<&'static str, TestError> =
        Policy::builder("").with_bulkhead(1).build();

    let gate = Arc::new(tokio::sync::Barrier::new(2));
    let gate_clone = gate.clone();
    let holder_policy = policy.clone();
    let holder = tokio::spawn(async move {
        holder_policy
            .execute(move || {
                let gate = gate_clone.clone();
                async move {
                    gate.wait().await;
                    tokio::time::sleep(Duration::from_millis(100)).await;
                    Ok("held")
                }
            })
            .await
    });

    gate.wait().await;
    let overflow = policy.execute(|| async { Ok("extra") }).await;
    assert!(overflow.unwrap_err().is_bulkhead());

    assert_eq!(holder.await.unwrap().unwrap(), "held");

    // Slot released; next call is admitted.
    assert!(policy.execute(|| async { Ok("again") }).await.is_ok());
}

#[tokio::test]
async fn fallback_recovers_the_whole_stack() {
    let used = Arc::new(AtomicUsize::new(0));
    let used_clone = used.clone();
    let policy: Policy<&'static str, TestError> = Policy::builder("")
        .with_fallback("cached default")
        .with_retry(quick_retry(2))
        .with_hooks(Hooks::new().on_fallback_used(move |_| {
            used_clone.fetch_add(1, Ordering::SeqCst);
        }))
        .build();

    let result = policy
        .execute(|| async { Err(ResilienceError::Inner(TestError("down"))) })
        .await;
    assert_eq!(result.unwrap(), "cached default");
    assert_eq!(used.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn full_stack_success_path_touches_nothing() {
    init_tracing();
    let events = Arc::new(AtomicUsize::new(0));
    let (a, b, c) = (events.clone(), events.clone(), events.clone());

    let policy: Policy<u32, TestError> = Policy::builder("")
        .with_fallback(0)
        .with_timeout(Duration::from_secs(5))
        .with_circuit_breaker(CircuitBreakerConfig::default())
        .with_rate_limit(1000.0)
        .with_bulkhead(16)
        .with_retry(quick_retry(3))
        .with_hedge(Duration::from_secs(1))
        .with_hooks(
            Hooks::new()
                .on_fallback_used(move |_| {
                    a.fetch_add(1, Ordering::SeqCst);
                })
                .on_timeout(move || {
                    b.fetch_add(1, Ordering::SeqCst);
                })
                .on_hedge_triggered(move || {
                    c.fetch_add(1, Ordering::SeqCst);
                }),
        )
        .build();

    for i in 0..10 {
        assert_eq!(policy.execute(move || async move { Ok(i) }).await.unwrap(), i);
    }
    assert_eq!(events.load(Ordering::SeqCst), 0, "no failure events on the happy path");
}

#[tokio::test]
async fn policy_without_patterns_matches_direct_call() {
    let policy: Policy<u32, TestError> = Policy::builder("").build();

    assert_eq!(policy.execute(|| async { Ok(5) }).await.unwrap(), 5);

    let error = policy
        .execute(|| async { Err(ResilienceError::Inner(TestError("raw"))) })
        .await
        .unwrap_err();
    match error {
        ResilienceError::Inner(e) => assert_eq!(e, TestError("raw")),
        e => panic!("expected untouched error, got {:?}", e),
    }
}

#[tokio::test]
async fn concurrent_executions_share_pattern_state() {
    let clock = ManualClock::new();
    let policy: Policy<u32, TestError> =
        Policy::builder("").with_rate_limit(4.0).with_clock(clock.clone()).build();

    let mut handles = Vec::new();
    for i in 0..8 {
        let policy = policy.clone();
        handles.push(tokio::spawn(
            async move { policy.execute(move || async move { Ok(i) }).await },
        ));
    }

    let results = futures::future::join_all(handles).await;
    let admitted = results.iter().filter(|r| r.as_ref().unwrap().is_ok()).count();
    assert_eq!(admitted, 4, "one shared bucket across clones");
}
