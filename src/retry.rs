//! Bounded retry for transient persistence faults
//!
//! This module wraps metadata-store operations with bounded retry on
//! transient-fault classification. Business-rule failures (conflicts,
//! not-found, constraint violations) are never retried; version conflicts in
//! particular must be resolved by re-reading and reapplying at the call site,
//! not by blind resubmission. Retries apply to the store mutation only —
//! event publication happens strictly after the mutation is confirmed
//! committed, outside this wrapper.
//!
//! # Example
//!
//! ```no_run
//! use file_broker::retry::execute_with_retry;
//! use file_broker::config::RetryConfig;
//! use file_broker::Error;
//!
//! # async fn example() -> Result<(), Error> {
//! let config = RetryConfig::default();
//! let result = execute_with_retry(&config, || async {
//!     // Your metadata operation here
//!     Ok::<_, Error>(())
//! }).await?;
//! # Ok(())
//! # }
//! ```

use crate::config::RetryConfig;
use crate::error::{DatabaseError, Error, StorageError};
use rand::Rng;
use std::future::Future;
use std::time::Duration;

/// Trait for errors that can be classified as retryable or not
///
/// Transient failures (connection reset, lock contention, timeout) should
/// return `true`. Permanent failures (constraint violation, not-found,
/// business-rule conflicts) should return `false`.
pub trait IsRetryable {
    /// Returns true if the error is transient and the operation should be retried
    fn is_retryable(&self) -> bool;
}

/// Implementation of IsRetryable for our Error type
impl IsRetryable for Error {
    fn is_retryable(&self) -> bool {
        match self {
            Error::Database(e) => match e {
                // Connection-level faults are expected to clear on retry
                DatabaseError::ConnectionFailed(_) => true,
                // SQLite reports lock contention through the query error text
                DatabaseError::QueryFailed(msg) => {
                    msg.contains("locked")
                        || msg.contains("busy")
                        || msg.contains("timeout")
                        || msg.contains("connection")
                }
                // A lost optimistic update is a legitimate conflict; the
                // caller must re-read and reapply, not resubmit blindly
                DatabaseError::VersionConflict { .. } => false,
                DatabaseError::MigrationFailed(_) => false,
                DatabaseError::NotFound(_) => false,
                DatabaseError::ConstraintViolation(_) => false,
            },
            Error::Sqlx(e) => matches!(
                e,
                sqlx::Error::Io(_) | sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed
            ),
            Error::Storage(e) => matches!(e, StorageError::Unavailable(_)),
            // I/O errors can be retryable in some cases
            Error::Io(e) => matches!(
                e.kind(),
                std::io::ErrorKind::TimedOut
                    | std::io::ErrorKind::ConnectionRefused
                    | std::io::ErrorKind::ConnectionReset
                    | std::io::ErrorKind::ConnectionAborted
                    | std::io::ErrorKind::NotConnected
                    | std::io::ErrorKind::BrokenPipe
                    | std::io::ErrorKind::Interrupted
            ),
            // Tenancy, authorization, and status errors are business outcomes
            Error::Config { .. } => false,
            Error::Validation(_) => false,
            Error::ServiceNotConfigured { .. } => false,
            Error::ServiceOwnerNotConfigured { .. } => false,
            Error::NotFound(_) => false,
            Error::Conflict { .. } => false,
            Error::ChecksumMismatch { .. } => false,
            Error::ScanRejected(_) => false,
            // Already the result of exhausted retries
            Error::Unavailable { .. } => false,
            Error::Serialization(_) => false,
            Error::ShuttingDown => false,
            Error::Other(_) => false,
        }
    }
}

/// Execute a metadata operation with bounded retry on transient faults
///
/// # Arguments
///
/// * `config` - Retry configuration (max attempts, delays, backoff multiplier, jitter)
/// * `operation` - Async closure returning `Result<T, Error>`
///
/// # Returns
///
/// The successful result, the original error for non-retryable failures, or
/// [`Error::Unavailable`] annotated with the attempt count once a transient
/// fault has exhausted all attempts.
pub async fn execute_with_retry<F, Fut, T>(config: &RetryConfig, mut operation: F) -> Result<T, Error>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, Error>>,
{
    let mut attempt = 0;
    let mut delay = config.initial_delay;

    loop {
        match operation().await {
            Ok(result) => {
                if attempt > 0 {
                    tracing::info!(attempts = attempt + 1, "operation succeeded after retry");
                }
                return Ok(result);
            }
            Err(e) if e.is_retryable() && attempt < config.max_attempts => {
                attempt += 1;

                tracing::warn!(
                    error = %e,
                    attempt = attempt,
                    max_attempts = config.max_attempts,
                    delay_ms = delay.as_millis(),
                    "transient fault, retrying"
                );

                let jittered_delay = if config.jitter {
                    add_jitter(delay)
                } else {
                    delay
                };

                tokio::time::sleep(jittered_delay).await;

                let next_delay =
                    Duration::from_secs_f64(delay.as_secs_f64() * config.backoff_multiplier);
                delay = next_delay.min(config.max_delay);
            }
            Err(e) => {
                if e.is_retryable() {
                    tracing::error!(
                        error = %e,
                        attempts = attempt + 1,
                        "transient fault persisted through all retry attempts"
                    );
                    return Err(Error::Unavailable {
                        attempts: attempt + 1,
                    });
                }
                return Err(e);
            }
        }
    }
}

/// Add random jitter to a delay to prevent thundering herd
///
/// Jitter is uniformly distributed between 0% and 100% of the delay, so the
/// actual delay is between `delay` and `2 * delay`.
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
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn transient() -> Error {
        Error::Database(DatabaseError::QueryFailed("database is locked".into()))
    }

    fn permanent() -> Error {
        Error::Database(DatabaseError::ConstraintViolation("duplicate key".into()))
    }

    fn fast_config(max_attempts: u32) -> RetryConfig {
        RetryConfig {
            max_attempts,
            initial_delay: Duration::from_millis(10),
            max_delay: Duration::from_secs(1),
            backoff_multiplier: 1.0,
            jitter: false,
        }
    }

    #[tokio::test]
    async fn success_does_not_retry() {
        let config = RetryConfig::default();
        let counter = Arc::new(AtomicU32::new(0));
        let counter_clone = counter.clone();

        let result = execute_with_retry(&config, || {
            let counter = counter_clone.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok::<_, Error>(42)
            }
        })
        .await;

        assert_eq!(result.unwrap(), 42);
        assert_eq!(counter.load(Ordering::SeqCst), 1, "should only call once");
    }

    #[tokio::test]
    async fn two_transient_failures_then_success_takes_exactly_three_attempts() {
        let config = fast_config(2);
        let counter = Arc::new(AtomicU32::new(0));
        let counter_clone = counter.clone();

        let result = execute_with_retry(&config, || {
            let counter = counter_clone.clone();
            async move {
                let count = counter.fetch_add(1, Ordering::SeqCst);
                if count < 2 { Err(transient()) } else { Ok(42) }
            }
        })
        .await;

        assert_eq!(result.unwrap(), 42);
        assert_eq!(
            counter.load(Ordering::SeqCst),
            3,
            "should retry twice before success"
        );
    }

    #[tokio::test]
    async fn always_transient_fails_after_exactly_three_attempts() {
        let config = fast_config(2);
        let counter = Arc::new(AtomicU32::new(0));
        let counter_clone = counter.clone();

        let result = execute_with_retry(&config, || {
            let counter = counter_clone.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Err::<i32, _>(transient())
            }
        })
        .await;

        assert_eq!(
            counter.load(Ordering::SeqCst),
            3,
            "initial try + 2 retries = 3 attempts, never indefinite"
        );
        match result {
            Err(Error::Unavailable { attempts }) => {
                assert_eq!(attempts, 3, "exhaustion must be annotated with attempt count");
            }
            other => panic!("expected Unavailable after exhaustion, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn permanent_error_propagates_without_retry() {
        let config = RetryConfig::default();
        let counter = Arc::new(AtomicU32::new(0));
        let counter_clone = counter.clone();

        let result = execute_with_retry(&config, || {
            let counter = counter_clone.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Err::<i32, _>(permanent())
            }
        })
        .await;

        assert!(matches!(
            result,
            Err(Error::Database(DatabaseError::ConstraintViolation(_)))
        ));
        assert_eq!(
            counter.load(Ordering::SeqCst),
            1,
            "should not retry permanent error"
        );
    }

    #[tokio::test]
    async fn version_conflict_is_never_retried_by_the_wrapper() {
        let config = fast_config(3);
        let counter = Arc::new(AtomicU32::new(0));
        let counter_clone = counter.clone();

        let result = execute_with_retry(&config, || {
            let counter = counter_clone.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Err::<i32, _>(Error::Database(DatabaseError::VersionConflict {
                    record: "file transfer 1".into(),
                }))
            }
        })
        .await;

        assert!(
            matches!(
                result,
                Err(Error::Database(DatabaseError::VersionConflict { .. }))
            ),
            "conflict must surface for re-read-then-reapply, not be resubmitted blindly"
        );
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn fixed_backoff_keeps_delays_constant() {
        let config = fast_config(3);

        let timestamps = Arc::new(tokio::sync::Mutex::new(Vec::new()));
        let ts_clone = timestamps.clone();

        let _result = execute_with_retry(&config, || {
            let ts = ts_clone.clone();
            async move {
                ts.lock().await.push(std::time::Instant::now());
                Err::<i32, _>(transient())
            }
        })
        .await;

        let ts = timestamps.lock().await;
        assert_eq!(ts.len(), 4, "initial + 3 retries = 4 calls");

        // With multiplier 1.0 every gap should be ~10ms
        for i in 1..ts.len() {
            let gap = ts[i].duration_since(ts[i - 1]);
            assert!(
                gap >= Duration::from_millis(8),
                "gap {i} should be at least the fixed delay, was {gap:?}"
            );
            assert!(
                gap <= Duration::from_millis(200),
                "gap {i} should not grow, was {gap:?}"
            );
        }
    }

    // -----------------------------------------------------------------------
    // add_jitter bounds verification
    // -----------------------------------------------------------------------

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
    fn add_jitter_on_zero_delay_returns_zero() {
        assert_eq!(add_jitter(Duration::ZERO), Duration::ZERO);
    }

    // -----------------------------------------------------------------------
    // IsRetryable classification
    // -----------------------------------------------------------------------

    #[test]
    fn locked_database_is_retryable() {
        assert!(transient().is_retryable());
        assert!(
            Error::Database(DatabaseError::QueryFailed("server busy".into())).is_retryable()
        );
        assert!(
            Error::Database(DatabaseError::QueryFailed("connection reset".into())).is_retryable()
        );
    }

    #[test]
    fn connection_failed_is_retryable() {
        assert!(
            Error::Database(DatabaseError::ConnectionFailed("refused".into())).is_retryable()
        );
    }

    #[test]
    fn query_failure_without_transient_keywords_is_not_retryable() {
        assert!(
            !Error::Database(DatabaseError::QueryFailed("syntax error".into())).is_retryable(),
            "a broken query will not heal on retry"
        );
    }

    #[test]
    fn storage_unavailable_is_retryable() {
        assert!(Error::Storage(StorageError::Unavailable("endpoint down".into())).is_retryable());
    }

    #[test]
    fn storage_not_found_is_not_retryable() {
        assert!(!Error::Storage(StorageError::NotFound(9)).is_retryable());
    }

    #[test]
    fn io_timeout_is_retryable_but_permission_denied_is_not() {
        let timeout = Error::Io(std::io::Error::new(std::io::ErrorKind::TimedOut, "timeout"));
        assert!(timeout.is_retryable());

        let denied = Error::Io(std::io::Error::new(
            std::io::ErrorKind::PermissionDenied,
            "denied",
        ));
        assert!(
            !denied.is_retryable(),
            "PermissionDenied is permanent, not transient"
        );
    }

    #[test]
    fn business_rule_errors_are_never_retryable() {
        assert!(
            !Error::Conflict {
                operation: "download".into(),
                current_status: "initialized".into(),
            }
            .is_retryable()
        );
        assert!(!Error::NotFound("file transfer 1".into()).is_retryable());
        assert!(
            !Error::ChecksumMismatch {
                declared: "a".into(),
                computed: "b".into(),
            }
            .is_retryable()
        );
        assert!(!Error::ScanRejected("eicar".into()).is_retryable());
        assert!(
            !Error::ServiceNotConfigured {
                service_code: "invoice".into(),
                service_edition_code: "1".into(),
            }
            .is_retryable()
        );
    }

    #[test]
    fn exhausted_unavailable_is_not_retryable_again() {
        assert!(
            !Error::Unavailable { attempts: 3 }.is_retryable(),
            "nesting wrappers must not multiply the retry bound"
        );
    }

    #[test]
    fn shutting_down_is_not_retryable() {
        assert!(!Error::ShuttingDown.is_retryable());
    }
}
