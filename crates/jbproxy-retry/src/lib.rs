//! Generic deadline-bounded retry executor with exponential backoff.
//!
//! Mirrors the upstream proxy's attempt/backoff/deadline algorithm: each
//! attempt is itself bounded by the remaining time to the deadline, a
//! caller-supplied predicate decides whether a failure is worth retrying,
//! and an optional async hook runs after every failed-but-retryable attempt
//! (commonly used to trigger a session restart) before the backoff sleep.

use std::fmt;
use std::future::Future;
use std::time::Duration;

use tokio::time::Instant;

/// Backoff and attempt-count parameters for [`get`] and [`execute`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryConfig {
    pub max_attempts: u32,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
    pub backoff_multiplier: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            initial_backoff: Duration::from_secs_f64(1.0),
            max_backoff: Duration::from_secs_f64(60.0),
            backoff_multiplier: 3.0,
        }
    }
}

/// Passed to the attempt hook after a retryable failure, before the backoff
/// sleep for that attempt.
#[derive(Debug, Clone)]
pub struct AttemptHookArgs<E> {
    /// 1-based count of the attempt that just failed.
    pub attempt: u32,
    /// The backoff duration about to be slept for this attempt.
    pub backoff: Duration,
    pub error: E,
    /// Absolute deadline for the whole retry loop.
    pub deadline: Instant,
}

/// Failure outcome of [`get`]/[`execute`].
#[derive(Debug)]
pub enum RetryError<E> {
    /// The deadline passed before any attempt returned, or one attempt's own
    /// bounded timeout elapsed.
    Timeout,
    /// A non-retryable error (per the caller's predicate) was returned
    /// immediately, without consuming further attempts.
    NonRetryable(E),
    /// `max_attempts` were used up without success.
    Exhausted { attempts: u32, last: E },
}

impl<E: fmt::Display> fmt::Display for RetryError<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RetryError::Timeout => write!(f, "retry deadline exceeded"),
            RetryError::NonRetryable(e) => write!(f, "non-retryable error: {e}"),
            RetryError::Exhausted { attempts, last } => {
                write!(f, "exhausted {attempts} attempt(s), last error: {last}")
            }
        }
    }
}

impl<E: fmt::Debug + fmt::Display> std::error::Error for RetryError<E> {}

/// Runs `make_future` repeatedly until it succeeds, a non-retryable error is
/// returned, `deadline` passes, or `config.max_attempts` is exhausted.
///
/// Each attempt is bounded by the time remaining to `deadline`. On a
/// retryable failure, `attempt_hook` (if given) is invoked with the error
/// and the backoff about to be slept, itself bounded by the remaining
/// deadline; the hook's own errors are ignored since it exists purely for
/// side effects (e.g. restarting a session) and must never mask the
/// original failure. Backoff starts at `config.initial_backoff` and is
/// multiplied by `config.backoff_multiplier` after each sleep, capped at
/// `config.max_backoff`. Retry parameters are clamped to the primitive's
/// contract (`max_attempts >= 1`, `initial_backoff >= 0.1s`, `max_backoff >=
/// 1s`, `backoff_multiplier >= 1`) before the loop starts, so a misconfigured
/// caller can't produce a zero-length sleep or a shrinking backoff.
pub async fn get<T, E, Fut, MakeFut, Hook, HookFut>(
    deadline: Instant,
    config: &RetryConfig,
    is_retryable: impl Fn(&E) -> bool,
    mut attempt_hook: Option<Hook>,
    mut make_future: MakeFut,
) -> Result<T, RetryError<E>>
where
    E: Clone,
    Fut: Future<Output = Result<T, E>>,
    MakeFut: FnMut() -> Fut,
    Hook: FnMut(AttemptHookArgs<E>) -> HookFut,
    HookFut: Future<Output = ()>,
{
    let max_attempts = config.max_attempts.max(1);
    let initial_backoff = config.initial_backoff.max(Duration::from_secs_f64(0.1));
    let max_backoff = config.max_backoff.max(Duration::from_secs_f64(1.0));
    let backoff_multiplier = config.backoff_multiplier.max(1.0);

    let mut attempt: u32 = 0;
    let mut backoff = initial_backoff;

    loop {
        attempt += 1;

        let now = Instant::now();
        if now >= deadline {
            return Err(RetryError::Timeout);
        }
        let remaining = deadline - now;

        let error = match tokio::time::timeout(remaining, make_future()).await {
            Ok(Ok(value)) => return Ok(value),
            Ok(Err(e)) => e,
            Err(_elapsed) => return Err(RetryError::Timeout),
        };

        if !is_retryable(&error) {
            return Err(RetryError::NonRetryable(error));
        }
        if attempt >= max_attempts {
            return Err(RetryError::Exhausted {
                attempts: attempt,
                last: error,
            });
        }

        // The deadline may have passed while the attempt itself ran; never
        // synthesize a timeout over a real error from this point on, raise
        // `last_err` instead (matching the original `raise last_err`).
        let now = Instant::now();
        if now >= deadline {
            return Err(RetryError::Exhausted {
                attempts: attempt,
                last: error,
            });
        }

        if let Some(hook) = attempt_hook.as_mut() {
            let hook_remaining = deadline - now;
            let args = AttemptHookArgs {
                attempt,
                backoff,
                error: error.clone(),
                deadline,
            };
            let _ = tokio::time::timeout(hook_remaining, hook(args)).await;
        }

        let now = Instant::now();
        if now >= deadline {
            return Err(RetryError::Exhausted {
                attempts: attempt,
                last: error,
            });
        }
        let sleep_for = backoff.min(deadline - now);
        tokio::time::sleep(sleep_for).await;

        let next = backoff.as_secs_f64() * backoff_multiplier;
        backoff = Duration::from_secs_f64(next).min(max_backoff);
    }
}

/// Thin wrapper around [`get`] for operations with no return value.
pub async fn execute<E, Fut, MakeFut, Hook, HookFut>(
    deadline: Instant,
    config: &RetryConfig,
    is_retryable: impl Fn(&E) -> bool,
    attempt_hook: Option<Hook>,
    make_future: MakeFut,
) -> Result<(), RetryError<E>>
where
    E: Clone,
    Fut: Future<Output = Result<(), E>>,
    MakeFut: FnMut() -> Fut,
    Hook: FnMut(AttemptHookArgs<E>) -> HookFut,
    HookFut: Future<Output = ()>,
{
    get(deadline, config, is_retryable, attempt_hook, make_future).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::rc::Rc;

    fn always_retryable(_: &String) -> bool {
        true
    }

    fn no_hook() -> Option<fn(AttemptHookArgs<String>) -> std::future::Ready<()>> {
        None
    }

    #[tokio::test]
    async fn success_first_attempt() {
        let deadline = Instant::now() + Duration::from_secs(5);
        let config = RetryConfig::default();

        let result: Result<i32, RetryError<String>> = get(
            deadline,
            &config,
            always_retryable,
            no_hook(),
            || async { Ok::<_, String>(42) },
        )
        .await;

        assert!(matches!(result, Ok(42)));
    }

    #[tokio::test(start_paused = true)]
    async fn retry_then_success() {
        let deadline = Instant::now() + Duration::from_secs(60);
        let config = RetryConfig {
            max_attempts: 5,
            initial_backoff: Duration::from_millis(10),
            max_backoff: Duration::from_millis(100),
            backoff_multiplier: 2.0,
        };

        let attempts = Rc::new(RefCell::new(0u32));
        let attempts_clone = attempts.clone();

        let result: Result<&'static str, RetryError<String>> = get(
            deadline,
            &config,
            always_retryable,
            no_hook(),
            move || {
                let attempts = attempts_clone.clone();
                async move {
                    *attempts.borrow_mut() += 1;
                    if *attempts.borrow() < 3 {
                        Err("not yet".to_string())
                    } else {
                        Ok("done")
                    }
                }
            },
        )
        .await;

        assert_eq!(result.unwrap(), "done");
        assert_eq!(*attempts.borrow(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn exhausts_attempts() {
        let deadline = Instant::now() + Duration::from_secs(60);
        let config = RetryConfig {
            max_attempts: 3,
            initial_backoff: Duration::from_millis(1),
            max_backoff: Duration::from_millis(10),
            backoff_multiplier: 2.0,
        };

        let result: Result<(), RetryError<String>> = get(
            deadline,
            &config,
            always_retryable,
            no_hook(),
            || async { Err::<(), _>("boom".to_string()) },
        )
        .await;

        match result {
            Err(RetryError::Exhausted { attempts, last }) => {
                assert_eq!(attempts, 3);
                assert_eq!(last, "boom");
            }
            other => panic!("expected Exhausted, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn non_retryable_bypasses_remaining_attempts() {
        let deadline = Instant::now() + Duration::from_secs(5);
        let config = RetryConfig::default();
        let attempts = Rc::new(RefCell::new(0u32));
        let attempts_clone = attempts.clone();

        let result: Result<(), RetryError<String>> = get(
            deadline,
            &config,
            |e: &String| e != "fatal",
            no_hook(),
            move || {
                let attempts = attempts_clone.clone();
                async move {
                    *attempts.borrow_mut() += 1;
                    Err::<(), _>("fatal".to_string())
                }
            },
        )
        .await;

        assert!(matches!(result, Err(RetryError::NonRetryable(e)) if e == "fatal"));
        assert_eq!(*attempts.borrow(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn attempt_hook_sequence_and_backoff() {
        let deadline = Instant::now() + Duration::from_secs(60);
        let config = RetryConfig {
            max_attempts: 10,
            initial_backoff: Duration::from_millis(500),
            max_backoff: Duration::from_millis(2000),
            backoff_multiplier: 2.0,
        };

        let attempts = Rc::new(RefCell::new(0u32));
        let attempts_clone = attempts.clone();
        let seen_backoffs: Rc<RefCell<Vec<Duration>>> = Rc::new(RefCell::new(Vec::new()));
        let seen_backoffs_clone = seen_backoffs.clone();

        let result: Result<&'static str, RetryError<String>> = get(
            deadline,
            &config,
            always_retryable,
            Some(move |args: AttemptHookArgs<String>| {
                seen_backoffs_clone.borrow_mut().push(args.backoff);
                async {}
            }),
            move || {
                let attempts = attempts_clone.clone();
                async move {
                    *attempts.borrow_mut() += 1;
                    if *attempts.borrow() < 4 {
                        Err("not yet".to_string())
                    } else {
                        Ok("done")
                    }
                }
            },
        )
        .await;

        assert_eq!(result.unwrap(), "done");
        assert_eq!(
            *seen_backoffs.borrow(),
            vec![
                Duration::from_millis(500),
                Duration::from_millis(1000),
                Duration::from_millis(2000),
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn hook_consuming_the_deadline_surfaces_last_err_not_timeout() {
        // A hook that itself sleeps past the deadline must not cause the
        // genuine upstream error to be replaced by a spurious `Timeout`.
        let deadline = Instant::now() + Duration::from_millis(50);
        let config = RetryConfig {
            max_attempts: 5,
            initial_backoff: Duration::from_millis(10),
            max_backoff: Duration::from_millis(100),
            backoff_multiplier: 2.0,
        };

        let result: Result<(), RetryError<String>> = get(
            deadline,
            &config,
            always_retryable,
            Some(|_args: AttemptHookArgs<String>| async {
                tokio::time::sleep(Duration::from_millis(100)).await;
            }),
            || async { Err::<(), _>("upstream exploded".to_string()) },
        )
        .await;

        match result {
            Err(RetryError::Exhausted { last, .. }) => {
                assert_eq!(last, "upstream exploded");
            }
            other => panic!("expected Exhausted carrying the real error, got {other:?}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn out_of_range_config_is_clamped_to_the_contract() {
        // multiplier < 1 would otherwise shrink backoff on every retry,
        // breaking the monotone-non-decreasing guarantee.
        let deadline = Instant::now() + Duration::from_secs(60);
        let config = RetryConfig {
            max_attempts: 2,
            initial_backoff: Duration::ZERO,
            max_backoff: Duration::from_millis(1),
            backoff_multiplier: 0.1,
        };

        let seen_backoffs: Rc<RefCell<Vec<Duration>>> = Rc::new(RefCell::new(Vec::new()));
        let seen_backoffs_clone = seen_backoffs.clone();

        let result: Result<(), RetryError<String>> = get(
            deadline,
            &config,
            always_retryable,
            Some(move |args: AttemptHookArgs<String>| {
                seen_backoffs_clone.borrow_mut().push(args.backoff);
                async {}
            }),
            || async { Err::<(), _>("boom".to_string()) },
        )
        .await;

        assert!(matches!(result, Err(RetryError::Exhausted { attempts, .. }) if attempts == 2));
        // initial_backoff clamps to >= 0.1s and max_backoff to >= 1s, so the
        // one observed backoff (after attempt 1) is never zero.
        let backoffs = seen_backoffs.borrow();
        assert_eq!(backoffs.len(), 1);
        assert!(backoffs[0] >= Duration::from_millis(100));
    }

    #[tokio::test]
    async fn execute_discards_success_value() {
        let deadline = Instant::now() + Duration::from_secs(5);
        let config = RetryConfig::default();

        let result = execute(
            deadline,
            &config,
            always_retryable,
            no_hook(),
            || async { Ok::<(), String>(()) },
        )
        .await;

        assert!(result.is_ok());
    }
}
