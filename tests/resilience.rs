use shot_lifter::contract::{MockObjectStore, ObjectStore};
use shot_lifter::error::StoreError;
use shot_lifter::resilience::{
    BreakerConfig, CircuitState, ResiliencePolicy, ResilientStore, RetryConfig,
};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

fn policy(max_attempts: u32) -> Arc<ResiliencePolicy> {
    Arc::new(ResiliencePolicy::new(
        RetryConfig {
            max_attempts,
            attempt_timeout: Duration::from_secs(30),
            retry_delay: Duration::ZERO,
        },
        BreakerConfig {
            failure_threshold: 0.8,
            window: Duration::from_secs(100),
            cooldown: Duration::from_secs(30),
            minimum_calls: 5,
        },
    ))
}

fn flaky_get(failures_before_success: usize, calls: Arc<AtomicUsize>) -> MockObjectStore {
    let mut store = MockObjectStore::new();
    store.expect_get_object().returning(move |_, _| {
        let n = calls.fetch_add(1, Ordering::SeqCst);
        if n < failures_before_success {
            Err(StoreError::backend("get_object", format!("attempt {n} failed")))
        } else {
            Ok(b"payload".to_vec())
        }
    });
    store
}

#[tokio::test]
async fn succeeds_on_third_attempt() {
    let calls = Arc::new(AtomicUsize::new(0));
    let store = ResilientStore::new(flaky_get(2, calls.clone()), policy(3));

    let bytes = store.get_object("bucket", "a/1.png").await.expect("third attempt succeeds");
    assert_eq!(bytes, b"payload");
    assert_eq!(calls.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn exhausting_attempts_surfaces_operation_failed() {
    let calls = Arc::new(AtomicUsize::new(0));
    let store = ResilientStore::new(flaky_get(usize::MAX, calls.clone()), policy(3));

    let err = store.get_object("bucket", "a/1.png").await.unwrap_err();
    assert_eq!(calls.load(Ordering::SeqCst), 3);
    match err {
        StoreError::OperationFailed {
            operation,
            attempts,
            source,
        } => {
            assert_eq!(operation, "get_object");
            assert_eq!(attempts, 3);
            assert!(source.to_string().contains("attempt 2 failed"), "{source}");
        }
        other => panic!("expected OperationFailed, got {other:?}"),
    }
}

#[tokio::test]
async fn definitive_answers_are_not_retried() {
    let mut inner = MockObjectStore::new();
    inner.expect_get_object().times(1).returning(|bucket, key| {
        Err(StoreError::NotFound {
            bucket: bucket.to_owned(),
            key: key.to_owned(),
        })
    });
    let store = ResilientStore::new(inner, policy(3));

    let err = store.get_object("bucket", "missing.png").await.unwrap_err();
    assert!(matches!(err, StoreError::NotFound { .. }), "{err:?}");
    assert_eq!(store.policy().breaker().state(), CircuitState::Closed);
}

#[tokio::test]
async fn open_circuit_rejects_without_calling_the_backend() {
    let calls = Arc::new(AtomicUsize::new(0));
    let mut inner = MockObjectStore::new();
    let counter = calls.clone();
    inner.expect_put_object().returning(move |_, _, _, _| {
        counter.fetch_add(1, Ordering::SeqCst);
        Err(StoreError::backend("put_object", "500"))
    });
    let store = ResilientStore::new(inner, policy(1));

    for _ in 0..5 {
        let err = store.put_object("bucket", "k", b"x", None).await.unwrap_err();
        assert!(matches!(err, StoreError::OperationFailed { .. }), "{err:?}");
    }
    assert_eq!(calls.load(Ordering::SeqCst), 5);
    assert_eq!(store.policy().breaker().state(), CircuitState::Open);

    let err = store.put_object("bucket", "k", b"x", None).await.unwrap_err();
    assert!(matches!(err, StoreError::CircuitOpen { operation: "put_object" }), "{err:?}");
    assert_eq!(calls.load(Ordering::SeqCst), 5, "backend not invoked while open");
}

#[tokio::test]
async fn one_breaker_guards_every_operation() {
    let mut inner = MockObjectStore::new();
    inner
        .expect_put_object()
        .returning(|_, _, _, _| Err(StoreError::backend("put_object", "500")));
    inner.expect_get_object().never();
    inner.expect_list_objects().never();
    let store = ResilientStore::new(inner, policy(5));

    // A single call retries five times, which is enough to trip the breaker.
    let err = store.put_object("bucket", "k", b"x", None).await.unwrap_err();
    assert!(matches!(err, StoreError::OperationFailed { attempts: 5, .. }), "{err:?}");

    let err = store.get_object("bucket", "k").await.unwrap_err();
    assert!(matches!(err, StoreError::CircuitOpen { operation: "get_object" }), "{err:?}");
}

#[tokio::test]
async fn breaker_opening_mid_retry_stops_retrying() {
    let calls = Arc::new(AtomicUsize::new(0));
    let store = ResilientStore::new(flaky_get(usize::MAX, calls.clone()), policy(10));

    let err = store.get_object("bucket", "k").await.unwrap_err();
    assert!(matches!(err, StoreError::CircuitOpen { .. }), "{err:?}");
    assert_eq!(calls.load(Ordering::SeqCst), 5);
}

#[tokio::test(start_paused = true)]
async fn trial_after_cooldown_closes_the_circuit() {
    let calls = Arc::new(AtomicUsize::new(0));
    let store = ResilientStore::new(flaky_get(5, calls.clone()), policy(1));

    for _ in 0..5 {
        assert!(store.get_object("bucket", "k").await.is_err());
    }
    assert_eq!(store.policy().breaker().state(), CircuitState::Open);
    assert!(matches!(
        store.get_object("bucket", "k").await,
        Err(StoreError::CircuitOpen { .. })
    ));

    tokio::time::advance(Duration::from_secs(31)).await;
    let bytes = store.get_object("bucket", "k").await.expect("trial succeeds");
    assert_eq!(bytes, b"payload");
    assert_eq!(store.policy().breaker().state(), CircuitState::Closed);
    assert_eq!(calls.load(Ordering::SeqCst), 6);
}

#[tokio::test(start_paused = true)]
async fn slow_attempts_time_out_and_are_retried() {
    let policy = ResiliencePolicy::new(
        RetryConfig {
            max_attempts: 2,
            attempt_timeout: Duration::from_secs(1),
            retry_delay: Duration::from_millis(10),
        },
        BreakerConfig::default(),
    );
    let attempts = AtomicUsize::new(0);

    let result = policy
        .call("put_object", || async {
            let n = attempts.fetch_add(1, Ordering::SeqCst);
            if n == 0 {
                tokio::time::sleep(Duration::from_secs(60)).await;
            }
            Ok::<_, StoreError>(n)
        })
        .await;

    assert_eq!(result.unwrap(), 1);
    assert_eq!(attempts.load(Ordering::SeqCst), 2);
}

#[tokio::test(start_paused = true)]
async fn every_attempt_timing_out_reports_the_timeout() {
    let policy = ResiliencePolicy::new(
        RetryConfig {
            max_attempts: 2,
            attempt_timeout: Duration::from_secs(1),
            retry_delay: Duration::ZERO,
        },
        BreakerConfig::default(),
    );

    let err = policy
        .call("list_objects", || async {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok::<(), StoreError>(())
        })
        .await
        .unwrap_err();

    let msg = err.to_string();
    assert!(msg.contains("list_objects failed after 2 attempts"), "{msg}");
    assert!(msg.contains("timed out"), "{msg}");
}
