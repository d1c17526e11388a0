//! Retry logic with exponential backoff
//!
//! Each attempt of an operation is reported as an [`Attempt`]: success, a
//! transient failure worth retrying, or a fatal failure. [`with_retry`] consumes
//! those outcomes, waiting between attempts with a wait that doubles (by
//! default) up to a cap. Both the wait and the attempt itself race against a
//! [`CancellationToken`], so shutdown never has to sit out a backoff.
//!
//! # Example
//!
//! ```no_run
//! use swift_output::config::RetryConfig;
//! use swift_output::retry::{Attempt, with_retry};
//! use tokio_util::sync::CancellationToken;
//!
//! # async fn example() {
//! let config = RetryConfig::default();
//! let cancel = CancellationToken::new();
//! let result = with_retry(&config, &cancel, |_| {}, |_attempt| async {
//!     Attempt::<_, std::io::Error>::Success(42)
//! })
//! .await;
//! assert_eq!(result.ok(), Some(42));
//! # }
//! ```

use crate::config::RetryConfig;
use crate::error::StoreError;
use rand::Rng;
use std::fmt;
use std::future::Future;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Trait for errors that can be classified as retryable or not
///
/// Transient failures (network errors, service errors, expired tokens) should return `true`.
/// Permanent failures (missing local file, malformed target, misconfiguration) should return `false`.
pub trait IsRetryable {
    /// Returns true if the error is transient and the operation should be retried
    fn is_retryable(&self) -> bool;
}

impl IsRetryable for StoreError {
    fn is_retryable(&self) -> bool {
        match self {
            // The file is gone; retrying cannot bring it back
            StoreError::LocalFileMissing(_) => false,
            StoreError::InvalidTarget(_) => false,
            StoreError::Config(_) => false,
            StoreError::Io(e) => e.kind() != std::io::ErrorKind::NotFound,
            // Everything the service or the network says is worth another try
            StoreError::Auth(_) => true,
            StoreError::Status { .. } => true,
            StoreError::Network(_) => true,
        }
    }
}

/// Outcome of a single attempt
#[derive(Debug)]
pub enum Attempt<T, E> {
    /// The operation succeeded
    Success(T),
    /// The operation failed and may succeed if tried again
    Retryable(E),
    /// The operation failed and must not be tried again
    Fatal(E),
}

impl<T, E: IsRetryable> From<Result<T, E>> for Attempt<T, E> {
    fn from(result: Result<T, E>) -> Self {
        match result {
            Ok(value) => Attempt::Success(value),
            Err(e) if e.is_retryable() => Attempt::Retryable(e),
            Err(e) => Attempt::Fatal(e),
        }
    }
}

/// Why a retry loop ended without success
#[derive(Debug)]
pub enum GiveUp<E> {
    /// An attempt failed with a non-retryable error
    Fatal {
        /// Attempts made, including the failing one
        attempts: u32,
        /// The error
        error: E,
    },
    /// Every allowed attempt failed
    Exhausted {
        /// Attempts made
        attempts: u32,
        /// Error of the last attempt
        error: E,
        /// Message of the first attempt's error, kept for diagnostics
        first_error: String,
    },
    /// The cancellation token fired during an attempt or a wait
    Interrupted {
        /// Attempts started
        attempts: u32,
        /// Error of the last completed attempt, if any
        last_error: Option<E>,
    },
}

/// Details of a retry about to happen, passed to the notice callback
#[derive(Debug)]
pub struct RetryNotice<'a, E> {
    /// Retry number (1-based)
    pub retry: u32,
    /// Maximum number of retries
    pub limit: u32,
    /// Wait before the retry
    pub wait: Duration,
    /// Error that caused the retry
    pub error: &'a E,
}

/// Bookkeeping for one retry sequence
struct RetryState<E> {
    attempts: u32,
    first_error: Option<String>,
    last_error: Option<E>,
    next_wait: Duration,
}

impl<E> RetryState<E> {
    fn new(initial: Duration) -> Self {
        Self {
            attempts: 0,
            first_error: None,
            last_error: None,
            next_wait: initial,
        }
    }

    fn interrupted(self) -> GiveUp<E> {
        GiveUp::Interrupted {
            attempts: self.attempts,
            last_error: self.last_error,
        }
    }
}

/// Execute an async operation with exponential backoff retry logic
///
/// `operation` receives the 1-based attempt number. `config.max_attempts` is
/// the number of retries after the first attempt, so at most
/// `max_attempts + 1` attempts are made. `on_retry` is called before every wait.
///
/// # Returns
///
/// The successful value, or a [`GiveUp`] carrying the error that ended the loop.
/// After exhausted retries that is the *last* error.
pub async fn with_retry<F, Fut, T, E, N>(
    config: &RetryConfig,
    cancel: &CancellationToken,
    mut on_retry: N,
    mut operation: F,
) -> Result<T, GiveUp<E>>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Attempt<T, E>>,
    E: fmt::Display,
    N: FnMut(&RetryNotice<'_, E>),
{
    let mut state = RetryState::new(config.initial_delay);

    loop {
        if cancel.is_cancelled() {
            return Err(state.interrupted());
        }
        state.attempts += 1;

        let outcome = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(state.interrupted()),
            outcome = operation(state.attempts) => outcome,
        };

        let error = match outcome {
            Attempt::Success(value) => {
                if state.attempts > 1 {
                    tracing::info!(attempts = state.attempts, "Operation succeeded after retry");
                }
                return Ok(value);
            }
            Attempt::Fatal(error) => {
                tracing::error!(
                    error = %error,
                    attempts = state.attempts,
                    "Operation failed with non-retryable error"
                );
                return Err(GiveUp::Fatal {
                    attempts: state.attempts,
                    error,
                });
            }
            Attempt::Retryable(error) => error,
        };

        let first_error = state
            .first_error
            .get_or_insert_with(|| error.to_string())
            .clone();

        let retry = state.attempts;
        if retry > config.max_attempts {
            tracing::error!(
                error = %error,
                first_error = %first_error,
                attempts = state.attempts,
                "Operation failed after all retry attempts exhausted"
            );
            return Err(GiveUp::Exhausted {
                attempts: state.attempts,
                error,
                first_error,
            });
        }

        let wait = if config.jitter {
            add_jitter(state.next_wait).min(config.max_delay)
        } else {
            state.next_wait
        };

        on_retry(&RetryNotice {
            retry,
            limit: config.max_attempts,
            wait,
            error: &error,
        });
        state.last_error = Some(error);

        tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(state.interrupted()),
            _ = tokio::time::sleep(wait) => {}
        }

        state.next_wait = next_delay(state.next_wait, config);
    }
}

/// Wait that follows `current`: multiplied, then capped at `max_delay`
pub fn next_delay(current: Duration, config: &RetryConfig) -> Duration {
    let next = current.as_secs_f64() * config.backoff_multiplier;
    if !next.is_finite() || next >= config.max_delay.as_secs_f64() {
        config.max_delay
    } else {
        Duration::from_secs_f64(next)
    }
}

/// The waits a retry sequence uses without jitter, in order
pub fn backoff_schedule(config: &RetryConfig) -> impl Iterator<Item = Duration> + '_ {
    std::iter::successors(Some(config.initial_delay), move |d| {
        Some(next_delay(*d, config))
    })
    .take(config.max_attempts as usize)
}

/// Add random jitter to a delay to prevent thundering herd
///
/// Jitter is uniformly distributed between 0% and 100% of the delay.
/// This means the actual delay will be between `delay` and `2 * delay`.
fn add_jitter(delay: Duration) -> Duration {
    let mut rng = rand::thread_rng();
    let jitter_factor: f64 = rng.gen_range(0.0..=1.0);
    let jittered_secs = delay.as_secs_f64() * (1.0 + jitter_factor);
    Duration::from_secs_f64(jittered_secs)
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU32, Ordering};
    use tokio::time::Instant;

    #[derive(Debug, PartialEq)]
    enum TestError {
        Transient(u32),
        Permanent,
    }

    impl std::fmt::Display for TestError {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            match self {
                TestError::Transient(n) => write!(f, "transient error {n}"),
                TestError::Permanent => write!(f, "permanent error"),
            }
        }
    }

    impl IsRetryable for TestError {
        fn is_retryable(&self) -> bool {
            matches!(self, TestError::Transient(_))
        }
    }

    /// Paused-clock waits land on millisecond ticks; allow for that rounding
    fn assert_waited(start: Instant, expected: Duration) {
        let elapsed = start.elapsed();
        assert!(
            elapsed >= expected && elapsed < expected + Duration::from_millis(10),
            "expected to wait {expected:?}, waited {elapsed:?}"
        );
    }

    fn config(max_attempts: u32) -> RetryConfig {
        RetryConfig {
            max_attempts,
            initial_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(30),
            backoff_multiplier: 2.0,
            jitter: false,
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_success_no_retry() {
        let cancel = CancellationToken::new();
        let counter = Arc::new(AtomicU32::new(0));
        let start = Instant::now();

        let result = with_retry(&config(10), &cancel, |_| {}, |_| {
            let counter = counter.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Attempt::<_, TestError>::Success(42)
            }
        })
        .await;

        assert_eq!(result.unwrap(), 42);
        assert_eq!(counter.load(Ordering::SeqCst), 1, "should only call once");
        assert_eq!(start.elapsed(), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_transient_then_succeed_waits_sum_of_backoffs() {
        let cancel = CancellationToken::new();
        let mut notices = Vec::new();
        let start = Instant::now();

        let result = with_retry(
            &config(10),
            &cancel,
            |n: &RetryNotice<'_, TestError>| notices.push((n.retry, n.limit, n.wait)),
            |attempt| async move {
                if attempt < 4 {
                    Attempt::Retryable(TestError::Transient(attempt))
                } else {
                    Attempt::Success(attempt)
                }
            },
        )
        .await;

        assert_eq!(result.unwrap(), 4);
        // 500ms + 1s + 2s
        assert_waited(start, Duration::from_millis(3500));
        assert_eq!(
            notices,
            vec![
                (1, 10, Duration::from_millis(500)),
                (2, 10, Duration::from_millis(1000)),
                (3, 10, Duration::from_millis(2000)),
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_exhausted_returns_last_error() {
        let cancel = CancellationToken::new();
        let counter = Arc::new(AtomicU32::new(0));

        let result = with_retry(&config(2), &cancel, |_| {}, |attempt| {
            let counter = counter.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Attempt::<i32, _>::Retryable(TestError::Transient(attempt))
            }
        })
        .await;

        match result {
            Err(GiveUp::Exhausted {
                attempts,
                error,
                first_error,
            }) => {
                assert_eq!(attempts, 3);
                assert_eq!(error, TestError::Transient(3), "must surface the last error");
                assert_eq!(first_error, "transient error 1");
            }
            other => panic!("expected Exhausted, got {other:?}"),
        }
        assert_eq!(
            counter.load(Ordering::SeqCst),
            3,
            "should try initial + 2 retries"
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_permanent_error_no_retry() {
        let cancel = CancellationToken::new();
        let counter = Arc::new(AtomicU32::new(0));
        let start = Instant::now();

        let result = with_retry(&config(10), &cancel, |_| {}, |_| {
            let counter = counter.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Attempt::<i32, _>::Fatal(TestError::Permanent)
            }
        })
        .await;

        assert!(matches!(
            result,
            Err(GiveUp::Fatal {
                attempts: 1,
                error: TestError::Permanent
            })
        ));
        assert_eq!(
            counter.load(Ordering::SeqCst),
            1,
            "should not retry permanent error"
        );
        assert_eq!(start.elapsed(), Duration::ZERO, "no backoff wait");
    }

    #[tokio::test(start_paused = true)]
    async fn zero_max_attempts_fails_on_first_transient_error() {
        let cancel = CancellationToken::new();

        let result = with_retry(&config(0), &cancel, |_| {}, |attempt| async move {
            Attempt::<i32, _>::Retryable(TestError::Transient(attempt))
        })
        .await;

        assert!(matches!(
            result,
            Err(GiveUp::Exhausted { attempts: 1, .. })
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_max_delay_cap() {
        let config = RetryConfig {
            max_attempts: 5,
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(3),
            backoff_multiplier: 10.0,
            jitter: false,
        };
        let cancel = CancellationToken::new();
        let start = Instant::now();

        let _ = with_retry(&config, &cancel, |_| {}, |attempt| async move {
            Attempt::<i32, _>::Retryable(TestError::Transient(attempt))
        })
        .await;

        // 1 + 3 + 3 + 3 + 3
        assert_waited(start, Duration::from_secs(13));
    }

    #[test]
    fn default_schedule_doubles_up_to_thirty_seconds() {
        let config = RetryConfig::default();
        let waits: Vec<u64> = backoff_schedule(&config)
            .map(|d| d.as_millis() as u64)
            .collect();
        assert_eq!(
            waits,
            vec![500, 1000, 2000, 4000, 8000, 16000, 30000, 30000, 30000, 30000]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn cancellation_during_wait_interrupts() {
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(750)).await;
            trigger.cancel();
        });
        let start = Instant::now();

        let result = with_retry(&config(10), &cancel, |_| {}, |attempt| async move {
            Attempt::<i32, _>::Retryable(TestError::Transient(attempt))
        })
        .await;

        match result {
            Err(GiveUp::Interrupted {
                attempts,
                last_error,
            }) => {
                assert_eq!(attempts, 2);
                assert_eq!(last_error, Some(TestError::Transient(2)));
            }
            other => panic!("expected Interrupted, got {other:?}"),
        }
        assert!(start.elapsed() < Duration::from_millis(1500));
    }

    #[tokio::test(start_paused = true)]
    async fn cancellation_during_attempt_interrupts() {
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(100)).await;
            trigger.cancel();
        });

        let result = with_retry(&config(10), &cancel, |_| {}, |_| async {
            std::future::pending::<Attempt<i32, TestError>>().await
        })
        .await;

        assert!(matches!(
            result,
            Err(GiveUp::Interrupted {
                attempts: 1,
                last_error: None
            })
        ));
    }

    #[tokio::test]
    async fn already_cancelled_token_makes_no_attempt() {
        let cancel = CancellationToken::new();
        cancel.cancel();
        let counter = AtomicU32::new(0);

        let result = with_retry(&config(10), &cancel, |_| {}, |_| {
            counter.fetch_add(1, Ordering::SeqCst);
            async { Attempt::<i32, TestError>::Success(1) }
        })
        .await;

        assert!(matches!(
            result,
            Err(GiveUp::Interrupted { attempts: 0, .. })
        ));
        assert_eq!(counter.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn jittered_wait_never_exceeds_max_delay() {
        let config = RetryConfig {
            max_attempts: 3,
            initial_delay: Duration::from_millis(800),
            max_delay: Duration::from_secs(1),
            backoff_multiplier: 2.0,
            jitter: true,
        };
        let cancel = CancellationToken::new();
        let mut waits = Vec::new();

        let _ = with_retry(
            &config,
            &cancel,
            |n: &RetryNotice<'_, TestError>| waits.push(n.wait),
            |attempt| async move { Attempt::<i32, _>::Retryable(TestError::Transient(attempt)) },
        )
        .await;

        assert_eq!(waits.len(), 3);
        assert!(waits[0] >= Duration::from_millis(800));
        assert!(waits.iter().all(|w| *w <= Duration::from_secs(1)));
    }

    #[test]
    fn add_jitter_stays_within_bounds_over_many_iterations() {
        let delay = Duration::from_millis(50);
        for i in 0..200 {
            let jittered = add_jitter(delay);
            assert!(
                jittered >= delay,
                "iteration {i}: jittered {jittered:?} < base delay {delay:?}"
            );
            assert!(
                jittered <= delay * 2,
                "iteration {i}: jittered {jittered:?} > 2x base delay {:?}",
                delay * 2
            );
        }
    }

    #[test]
    fn attempt_from_result_uses_classification() {
        let ok: Attempt<i32, TestError> = Ok(1).into();
        assert!(matches!(ok, Attempt::Success(1)));
        let transient: Attempt<i32, TestError> = Err(TestError::Transient(1)).into();
        assert!(matches!(transient, Attempt::Retryable(_)));
        let permanent: Attempt<i32, TestError> = Err(TestError::Permanent).into();
        assert!(matches!(permanent, Attempt::Fatal(_)));
    }

    #[test]
    fn store_error_classification() {
        assert!(!StoreError::LocalFileMissing(PathBuf::from("/tmp/x")).is_retryable());
        assert!(!StoreError::InvalidTarget("bad key".into()).is_retryable());
        assert!(!StoreError::Config("no endpoint".into()).is_retryable());
        assert!(
            !StoreError::Io(std::io::Error::new(std::io::ErrorKind::NotFound, "gone"))
                .is_retryable()
        );

        assert!(
            StoreError::Io(std::io::Error::new(
                std::io::ErrorKind::ConnectionReset,
                "reset"
            ))
            .is_retryable()
        );
        assert!(
            StoreError::Status {
                status: 503,
                message: "unavailable".into()
            }
            .is_retryable()
        );
        assert!(
            StoreError::Status {
                status: 404,
                message: "no container".into()
            }
            .is_retryable(),
            "service errors are retried like any other remote failure"
        );
        assert!(StoreError::Auth("token expired".into()).is_retryable());
    }
}
