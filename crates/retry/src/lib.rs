#![deny(
    trivial_numeric_casts,
    missing_docs,
    unsafe_code,
    unstable_features,
    unused_import_braces,
    unused_qualifications,
    unused_extern_crates,
    unused_results
)]
#![warn(rust_2021_compatibility, unreachable_pub)]

//! Bounded exponential backoff with jitter, and non-retryable error
//! classification, wrapping an arbitrary fallible async operation.

use std::time::Duration;

use rand::Rng;

/// Implemented by error types the retry executor can classify. Errors that
/// are not retryable (e.g. a 4xx client error, or a validation failure)
/// should return `false` so the executor gives up after the first attempt.
pub trait Retryable {
    /// Returns whether this error should be retried.
    fn is_retryable(&self) -> bool;
}

/// Configuration for the retry executor.
#[derive(Debug, Clone, Copy)]
pub struct RetryConfig {
    /// Maximum retry attempts after the initial attempt.
    pub max_retries: u32,
    /// Delay before the first retry.
    pub initial_delay: Duration,
    /// Upper bound on any single delay.
    pub max_delay: Duration,
    /// Backoff growth factor applied per attempt.
    pub multiplier: f64,
}

/// The final result of a retried operation.
#[derive(Debug, Clone)]
pub struct RetryOutcome<T, E> {
    /// Whether the operation ultimately succeeded.
    pub success: bool,
    /// The successful value, if any.
    pub value: Option<T>,
    /// The last observed error, if the operation failed.
    pub error: Option<E>,
    /// Total number of attempts made (at least 1).
    pub attempts: u32,
    /// Wall-clock time elapsed across every attempt and delay.
    pub total_elapsed: Duration,
}

/// Computes the delay before attempt `i` (1-indexed: the first retry is
/// `i == 1`), including uniform jitter in `±10%`.
pub fn backoff_delay(config: &RetryConfig, attempt: u32) -> Duration {
    debug_assert!(attempt >= 1);
    let exponent = (attempt - 1) as i32;
    let base_ms = config.initial_delay.as_millis() as f64 * config.multiplier.powi(exponent);
    let capped_ms = base_ms.min(config.max_delay.as_millis() as f64);

    let jitter_fraction = rand::thread_rng().gen_range(-0.1..=0.1);
    let jittered_ms = (capped_ms * (1.0 + jitter_fraction)).max(0.0).round() as u64;
    Duration::from_millis(jittered_ms)
}

/// Runs `operation` up to `config.max_retries + 1` times, sleeping between
/// attempts per [`backoff_delay`], stopping early when the error is
/// classified non-retryable. The operation is considered failed only after
/// every attempt is exhausted.
pub async fn execute<T, E, F, Fut>(config: &RetryConfig, mut operation: F) -> RetryOutcome<T, E>
where
    E: Retryable,
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<T, E>>,
{
    let start = tokio::time::Instant::now();
    let mut attempts = 0u32;
    let mut last_error = None;

    loop {
        attempts += 1;
        match operation().await {
            Ok(value) => {
                return RetryOutcome {
                    success: true,
                    value: Some(value),
                    error: None,
                    attempts,
                    total_elapsed: start.elapsed(),
                };
            }
            Err(error) => {
                let retryable = error.is_retryable();
                last_error = Some(error);

                if !retryable {
                    tracing::debug!(attempts, "retry executor stopping: error classified non-retryable");
                    break;
                }
                if attempts > config.max_retries {
                    tracing::debug!(attempts, "retry executor stopping: attempts exhausted");
                    break;
                }

                let delay = backoff_delay(config, attempts);
                tracing::debug!(attempts, delay_ms = delay.as_millis() as u64, "retry executor backing off");
                tokio::time::sleep(delay).await;
            }
        }
    }

    RetryOutcome {
        success: false,
        value: None,
        error: last_error,
        attempts,
        total_elapsed: start.elapsed(),
    }
}

#[cfg(test)]
mod test {
    use std::sync::atomic::{AtomicU32, Ordering};

    use super::*;

    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    struct FakeError {
        retryable: bool,
    }

    impl Retryable for FakeError {
        fn is_retryable(&self) -> bool {
            self.retryable
        }
    }

    fn fast_config(max_retries: u32) -> RetryConfig {
        RetryConfig {
            max_retries,
            initial_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(5),
            multiplier: 2.0,
        }
    }

    #[test]
    fn delay_is_capped_and_within_jitter_bounds() {
        let config = RetryConfig {
            max_retries: 5,
            initial_delay: Duration::from_millis(1000),
            max_delay: Duration::from_millis(3000),
            multiplier: 2.0,
        };

        // attempt 3: base = 1000 * 2^2 = 4000, capped to 3000, jitter +-10%.
        for _ in 0..50 {
            let delay = backoff_delay(&config, 3).as_millis();
            assert!((2700..=3300).contains(&delay), "delay {delay} out of bounds");
        }
    }

    #[tokio::test]
    async fn succeeds_on_first_attempt_without_retrying() {
        let calls = AtomicU32::new(0);
        let outcome = execute(&fast_config(3), || async {
            let _ = calls.fetch_add(1, Ordering::SeqCst);
            Ok::<_, FakeError>(42)
        })
        .await;

        assert!(outcome.success);
        assert_eq!(outcome.value, Some(42));
        assert_eq!(outcome.attempts, 1);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn retries_up_to_max_retries_plus_one_attempts() {
        let calls = AtomicU32::new(0);
        let outcome = execute(&fast_config(2), || async {
            let _ = calls.fetch_add(1, Ordering::SeqCst);
            Err::<i32, _>(FakeError { retryable: true })
        })
        .await;

        assert!(!outcome.success);
        assert_eq!(outcome.attempts, 3);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn non_retryable_error_stops_after_first_attempt() {
        let calls = AtomicU32::new(0);
        let outcome = execute(&fast_config(5), || async {
            let _ = calls.fetch_add(1, Ordering::SeqCst);
            Err::<i32, _>(FakeError { retryable: false })
        })
        .await;

        assert!(!outcome.success);
        assert_eq!(outcome.attempts, 1);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn succeeds_after_transient_failures() {
        let calls = AtomicU32::new(0);
        let outcome = execute(&fast_config(3), || async {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            if n < 2 {
                Err(FakeError { retryable: true })
            } else {
                Ok(7)
            }
        })
        .await;

        assert!(outcome.success);
        assert_eq!(outcome.value, Some(7));
        assert_eq!(outcome.attempts, 3);
    }
}
