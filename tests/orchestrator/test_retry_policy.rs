use draftmill::core::config::RetryConfig;
use draftmill::core::error::AppError;
use draftmill::core::types::ErrorCategory;
use draftmill::core::workflow::retry::{run_with_retry, RetryPolicy};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

fn fast_policy(max_attempts: u32) -> RetryPolicy {
    RetryPolicy {
        max_attempts,
        initial_delay: Duration::from_millis(1),
        backoff_multiplier: 2.0,
        max_delay: Duration::from_millis(4),
        jitter: Duration::ZERO,
    }
}

#[test]
fn test_policy_from_config() {
    let config = RetryConfig {
        max_attempts: 5,
        initial_delay_ms: 200,
        backoff_multiplier: 3.0,
        max_delay_ms: 10_000,
        jitter_ms: 25,
    };
    let policy = RetryPolicy::from_config(&config);
    assert_eq!(policy.max_attempts, 5);
    assert_eq!(policy.initial_delay, Duration::from_millis(200));
    assert_eq!(policy.backoff_multiplier, 3.0);
    assert_eq!(policy.max_delay, Duration::from_millis(10_000));
    assert_eq!(policy.jitter, Duration::from_millis(25));
}

#[test]
fn test_zero_attempts_clamped_to_one() {
    let config = RetryConfig {
        max_attempts: 0,
        ..RetryConfig::default()
    };
    assert_eq!(RetryPolicy::from_config(&config).max_attempts, 1);
}

#[tokio::test]
async fn test_rate_limit_category_is_retried() {
    let calls = Arc::new(AtomicU32::new(0));
    let counter = calls.clone();
    let result = run_with_retry(&fast_policy(3), move |_| {
        let counter = counter.clone();
        async move {
            if counter.fetch_add(1, Ordering::SeqCst) == 0 {
                Err(AppError::new(ErrorCategory::RateLimitError, "429 from upstream"))
            } else {
                Ok("done")
            }
        }
    })
    .await
    .unwrap();

    assert_eq!(result.value, "done");
    assert_eq!(result.retry_count, 1);
    assert_eq!(calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_unknown_category_falls_back_to_message_classification() {
    // "connection reset" in the message makes an otherwise unclassified
    // failure retryable.
    let calls = Arc::new(AtomicU32::new(0));
    let counter = calls.clone();
    let result = run_with_retry(&fast_policy(3), move |_| {
        let counter = counter.clone();
        async move {
            if counter.fetch_add(1, Ordering::SeqCst) == 0 {
                Err(AppError::new(
                    ErrorCategory::Unknown,
                    "upstream call failed: Connection reset by peer",
                ))
            } else {
                Ok(())
            }
        }
    })
    .await
    .unwrap();
    assert_eq!(result.retry_count, 1);

    // An unclassified failure without a transient-looking message aborts.
    let calls = Arc::new(AtomicU32::new(0));
    let counter = calls.clone();
    let err = run_with_retry(&fast_policy(3), move |_| {
        let counter = counter.clone();
        async move {
            counter.fetch_add(1, Ordering::SeqCst);
            Err::<(), _>(AppError::new(ErrorCategory::Unknown, "schema mismatch"))
        }
    })
    .await
    .unwrap_err();
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(err.retry_count, 0);
}

#[tokio::test]
async fn test_gate_blocked_never_retried() {
    let calls = Arc::new(AtomicU32::new(0));
    let counter = calls.clone();
    let err = run_with_retry(&fast_policy(5), move |_| {
        let counter = counter.clone();
        async move {
            counter.fetch_add(1, Ordering::SeqCst);
            Err::<(), _>(AppError::new(
                ErrorCategory::GateBlockedError,
                "awaiting approval",
            ))
        }
    })
    .await
    .unwrap_err();
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(err.category, ErrorCategory::GateBlockedError);
}

#[tokio::test]
async fn test_display_carries_retry_annotation() {
    let err = run_with_retry(&fast_policy(2), |_| async {
        Err::<(), _>(AppError::new(ErrorCategory::TimeoutError, "call timed out"))
    })
    .await
    .unwrap_err();

    assert_eq!(err.retry_count, 1);
    let rendered = err.to_string();
    assert!(rendered.contains("call timed out"), "{}", rendered);
    assert!(rendered.contains("after 1 retries"), "{}", rendered);
}

#[tokio::test]
async fn test_attempt_numbers_passed_to_operation() {
    let seen = Arc::new(std::sync::Mutex::new(Vec::new()));
    let sink = seen.clone();
    let _ = run_with_retry(&fast_policy(3), move |attempt| {
        let sink = sink.clone();
        async move {
            sink.lock().unwrap().push(attempt);
            Err::<(), _>(AppError::new(ErrorCategory::TransientError, "flaky"))
        }
    })
    .await;
    assert_eq!(*seen.lock().unwrap(), vec![1, 2, 3]);
}
