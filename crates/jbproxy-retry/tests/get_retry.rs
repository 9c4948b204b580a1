//! Integration coverage for the deadline-bounded retry executor's public
//! surface (`get`/`execute`), exercised from outside the crate the way a
//! caller would use it.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use jbproxy_retry::{get, AttemptHookArgs, RetryConfig, RetryError};
use tokio::time::Instant;

fn always_retryable(_: &String) -> bool {
    true
}

fn no_hook() -> Option<fn(AttemptHookArgs<String>) -> std::future::Ready<()>> {
    None
}

#[tokio::test]
async fn success_on_first_attempt() {
    let deadline = Instant::now() + Duration::from_secs(5);
    let config = RetryConfig::default();

    let result: Result<i32, RetryError<String>> =
        get(deadline, &config, always_retryable, no_hook(), || async {
            Ok::<_, String>(7)
        })
        .await;

    assert_eq!(result.unwrap(), 7);
}

#[tokio::test(start_paused = true)]
async fn retries_until_success() {
    let deadline = Instant::now() + Duration::from_secs(60);
    let config = RetryConfig {
        max_attempts: 5,
        initial_backoff: Duration::from_millis(10),
        max_backoff: Duration::from_millis(100),
        backoff_multiplier: 2.0,
    };

    let attempts = Arc::new(AtomicU32::new(0));
    let attempts_clone = attempts.clone();

    let result: Result<&'static str, RetryError<String>> = get(
        deadline,
        &config,
        always_retryable,
        no_hook(),
        move || {
            let attempts = attempts_clone.clone();
            async move {
                if attempts.fetch_add(1, Ordering::SeqCst) + 1 < 3 {
                    Err("fail".to_string())
                } else {
                    Ok("done")
                }
            }
        },
    )
    .await;

    assert_eq!(result.unwrap(), "done");
    assert_eq!(attempts.load(Ordering::SeqCst), 3);
}

#[tokio::test(start_paused = true)]
async fn exhausts_attempts_and_raises_last_error() {
    let deadline = Instant::now() + Duration::from_secs(60);
    let config = RetryConfig {
        max_attempts: 3,
        initial_backoff: Duration::from_millis(10),
        max_backoff: Duration::from_millis(10),
        backoff_multiplier: 1.0,
    };
    let attempts = Arc::new(AtomicU32::new(0));
    let attempts_clone = attempts.clone();

    let result: Result<(), RetryError<String>> = get(
        deadline,
        &config,
        always_retryable,
        no_hook(),
        move || {
            attempts_clone.fetch_add(1, Ordering::SeqCst);
            async { Err::<(), _>("always".to_string()) }
        },
    )
    .await;

    match result {
        Err(RetryError::Exhausted { attempts: n, last }) => {
            assert_eq!(n, 3);
            assert_eq!(last, "always");
        }
        other => panic!("expected Exhausted, got {other:?}"),
    }
    assert_eq!(attempts.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn non_retryable_error_stops_after_one_attempt() {
    let deadline = Instant::now() + Duration::from_secs(5);
    let config = RetryConfig::default();
    let attempts = Arc::new(AtomicU32::new(0));
    let attempts_clone = attempts.clone();

    let result: Result<(), RetryError<String>> = get(
        deadline,
        &config,
        |e: &String| e != "boom",
        no_hook(),
        move || {
            attempts_clone.fetch_add(1, Ordering::SeqCst);
            async { Err::<(), _>("boom".to_string()) }
        },
    )
    .await;

    assert!(matches!(result, Err(RetryError::NonRetryable(e)) if e == "boom"));
    assert_eq!(attempts.load(Ordering::SeqCst), 1);
}

#[tokio::test(start_paused = true)]
async fn attempt_hook_observes_each_retryable_failure() {
    let deadline = Instant::now() + Duration::from_secs(60);
    let config = RetryConfig {
        max_attempts: 5,
        initial_backoff: Duration::from_millis(500),
        max_backoff: Duration::from_millis(2000),
        backoff_multiplier: 2.0,
    };
    let attempts = Arc::new(AtomicU32::new(0));
    let attempts_clone = attempts.clone();
    let seen = Arc::new(std::sync::Mutex::new(Vec::new()));
    let seen_clone = seen.clone();

    let result: Result<&'static str, RetryError<String>> = get(
        deadline,
        &config,
        always_retryable,
        Some(move |args: AttemptHookArgs<String>| {
            seen_clone.lock().unwrap().push((args.attempt, args.backoff));
            async {}
        }),
        move || {
            let attempts = attempts_clone.clone();
            async move {
                if attempts.fetch_add(1, Ordering::SeqCst) + 1 < 4 {
                    Err("fail".to_string())
                } else {
                    Ok("ok")
                }
            }
        },
    )
    .await;

    assert_eq!(result.unwrap(), "ok");
    assert_eq!(
        *seen.lock().unwrap(),
        vec![
            (1, Duration::from_millis(500)),
            (2, Duration::from_millis(1000)),
            (3, Duration::from_millis(2000)),
        ]
    );
}

#[tokio::test(start_paused = true)]
async fn deadline_exceeded_before_any_attempt_returns_timeout() {
    let deadline = Instant::now();
    let config = RetryConfig::default();

    let result: Result<(), RetryError<String>> =
        get(deadline, &config, always_retryable, no_hook(), || async {
            Ok::<(), String>(())
        })
        .await;

    assert!(matches!(result, Err(RetryError::Timeout)));
}
