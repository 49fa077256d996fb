//! Integration tests for resilience module
//!
//! Exercises the token bucket and the retry executor through the public
//! crate surface only.

#![cfg(feature = "runtime")]

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use relay_common::resilience::{
    BucketDecision, RetryConfig, RetryDecision, RetryError, RetryExecutor, TokenBucket,
    TokenBucketConfig,
};
use relay_common::MockClock;

#[derive(Debug, Clone, PartialEq)]
enum TestError {
    Transient,
    Permanent,
}

/// Validates that a non-refilling bucket grants exactly its capacity.
///
/// Assertions:
/// - 10 of 15 immediate requests are granted.
/// - Every denial carries no retry hint, since the bucket never refills.
#[test]
fn test_bucket_grants_exactly_capacity_without_refill() {
    let bucket = TokenBucket::with_clock(
        TokenBucketConfig { capacity: 10, refill_rate_per_second: 0.0 },
        MockClock::new(),
    )
    .expect("valid config");

    let decisions: Vec<_> = (0..15).map(|_| bucket.try_acquire()).collect();
    let granted = decisions.iter().filter(|d| **d == BucketDecision::Granted).count();

    assert_eq!(granted, 10);
    assert!(decisions[10..].iter().all(|d| *d == BucketDecision::Denied { retry_after: None }));
}

/// Validates refill over simulated time.
///
/// Assertions:
/// - An empty bucket refilling at 5/s grants one token after 200ms.
/// - The second request in the same instant is denied with a 200ms hint.
#[test]
fn test_bucket_refills_with_elapsed_time() {
    let clock = MockClock::new();
    let bucket = TokenBucket::with_clock(
        TokenBucketConfig { capacity: 1, refill_rate_per_second: 5.0 },
        clock.clone(),
    )
    .expect("valid config");

    assert_eq!(bucket.try_acquire(), BucketDecision::Granted);
    clock.advance_millis(200);
    assert_eq!(bucket.try_acquire(), BucketDecision::Granted);

    match bucket.try_acquire() {
        BucketDecision::Denied { retry_after: Some(wait) } => {
            assert!((wait.as_secs_f64() - 0.2).abs() < 1e-6, "hint was {wait:?}");
        }
        other => panic!("expected denial with hint, got {other:?}"),
    }
}

/// Validates concurrent async callers never overspend the bucket.
///
/// Assertions:
/// - 50 tasks racing on a capacity-10 bucket yield exactly 10 grants.
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_bucket_concurrent_tasks() {
    let bucket = Arc::new(
        TokenBucket::with_clock(
            TokenBucketConfig { capacity: 10, refill_rate_per_second: 0.0 },
            MockClock::new(),
        )
        .expect("valid config"),
    );

    let handles: Vec<_> = (0..50)
        .map(|_| {
            let bucket = Arc::clone(&bucket);
            tokio::spawn(async move { bucket.try_acquire() == BucketDecision::Granted })
        })
        .collect();

    let mut granted = 0;
    for handle in handles {
        if handle.await.expect("task panicked") {
            granted += 1;
        }
    }
    assert_eq!(granted, 10);
}

/// Validates the executor recovers from transient failures.
///
/// Assertions:
/// - The operation succeeds on the third attempt.
/// - The outcome reports three attempts.
#[tokio::test(start_paused = true)]
async fn test_retry_recovers_from_transient_failures() {
    let calls = Arc::new(AtomicU32::new(0));
    let config = RetryConfig::builder()
        .max_attempts(5)
        .exponential_backoff(Duration::from_millis(10), 2.0, Duration::from_millis(100))
        .no_jitter()
        .build()
        .expect("valid config");
    let executor = RetryExecutor::new(config, |e: &TestError, _: u32| match e {
        TestError::Transient => RetryDecision::Retry,
        TestError::Permanent => RetryDecision::Stop,
    });

    let counter = Arc::clone(&calls);
    let outcome = executor
        .execute_with_outcome(|| {
            let counter = Arc::clone(&counter);
            async move {
                if counter.fetch_add(1, Ordering::SeqCst) < 2 {
                    Err(TestError::Transient)
                } else {
                    Ok("done")
                }
            }
        })
        .await;

    assert_eq!(outcome.attempts, 3);
    assert!((outcome.total_delay.as_secs_f64() - 0.03).abs() < 1e-6);
    assert_eq!(outcome.result.expect("should succeed"), "done");
}

/// Validates that permanent failures are not retried.
///
/// Assertions:
/// - Exactly one call is made.
/// - The error surfaces as `NonRetryable` carrying the original error.
#[tokio::test]
async fn test_retry_stops_on_permanent_failure() {
    let calls = Arc::new(AtomicU32::new(0));
    let executor = RetryExecutor::new(RetryConfig::default(), |e: &TestError, _: u32| match e {
        TestError::Transient => RetryDecision::Retry,
        TestError::Permanent => RetryDecision::Stop,
    });

    let counter = Arc::clone(&calls);
    let result: Result<(), _> = executor
        .execute(|| {
            counter.fetch_add(1, Ordering::SeqCst);
            async { Err(TestError::Permanent) }
        })
        .await;

    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert!(matches!(result, Err(RetryError::NonRetryable { error: TestError::Permanent })));
}

/// Validates a server-supplied delay overrides the backoff schedule.
///
/// Assertions:
/// - The executor waits the hinted duration, not the configured backoff.
#[tokio::test(start_paused = true)]
async fn test_retry_after_hint_is_honored() {
    let calls = Arc::new(AtomicU32::new(0));
    let config = RetryConfig::builder()
        .max_attempts(2)
        .fixed_backoff(Duration::from_millis(1))
        .no_jitter()
        .build()
        .expect("valid config");
    let executor = RetryExecutor::new(config, |_: &TestError, _: u32| {
        RetryDecision::RetryAfter(Duration::from_secs(2))
    });

    let started = tokio::time::Instant::now();
    let counter = Arc::clone(&calls);
    let outcome = executor
        .execute_with_outcome(|| {
            let counter = Arc::clone(&counter);
            async move {
                if counter.fetch_add(1, Ordering::SeqCst) == 0 {
                    Err(TestError::Transient)
                } else {
                    Ok(())
                }
            }
        })
        .await;

    assert!(outcome.result.is_ok());
    assert!(started.elapsed() >= Duration::from_secs(2));
    assert_eq!(outcome.total_delay, Duration::from_secs(2));
}
