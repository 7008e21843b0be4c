//! Retry logic with exponential backoff
//!
//! This module provides the attempt loop used by the fetch worker. Whether a
//! failure is retried is decided only by the error's [`IsRetryable`] tag.
//! Delays grow as `backoff_base * 2^(attempt-1)`, capped at `max_backoff`,
//! plus uniform random jitter to avoid synchronized retries.
//!
//! # Example
//!
//! ```no_run
//! use netuid_fetch::retry::{IsRetryable, with_retry};
//! use netuid_fetch::config::RetryConfig;
//!
//! #[derive(Debug)]
//! enum MyError {
//!     Transient,
//!     Permanent,
//! }
//!
//! impl std::fmt::Display for MyError {
//!     fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
//!         write!(f, "{:?}", self)
//!     }
//! }
//!
//! impl IsRetryable for MyError {
//!     fn is_retryable(&self) -> bool {
//!         matches!(self, MyError::Transient)
//!     }
//! }
//!
//! # async fn example() -> Result<(), MyError> {
//! let config = RetryConfig::default();
//! let outcome = with_retry(&config, |_attempt| async {
//!     // Your operation here
//!     Ok::<_, MyError>(())
//! })
//! .await;
//! outcome.result?;
//! # Ok(())
//! # }
//! ```

use crate::config::RetryConfig;
use crate::error::FetchError;
use rand::Rng;
use std::future::Future;
use std::time::Duration;

/// Trait for errors that can be classified as retryable or not
///
/// Transient failures (timeouts, non-zero exits, empty output, local write
/// errors) should return `true`. Failures that no amount of retrying can fix
/// (the external tool is not installed) should return `false`.
pub trait IsRetryable {
    /// Returns true if the error is transient and the operation should be retried
    fn is_retryable(&self) -> bool;
}

impl IsRetryable for FetchError {
    fn is_retryable(&self) -> bool {
        match self {
            // Retrying a missing binary only hammers the same failure
            FetchError::ToolMissing { .. } => false,
            FetchError::Timeout(_)
            | FetchError::NonZeroExit { .. }
            | FetchError::EmptyPayload
            | FetchError::WriteFailure { .. }
            | FetchError::Launch { .. }
            | FetchError::WorkerFault(_) => true,
        }
    }
}

/// Final result of a retried operation, with the number of attempts it took
#[derive(Debug)]
pub struct RetryOutcome<T, E> {
    /// Last result produced by the operation
    pub result: Result<T, E>,
    /// Attempts made, including the final one
    pub attempts: u32,
}

/// Execute an async operation with exponential backoff retry logic
///
/// `operation` receives the 1-based attempt number. At most
/// `config.max_attempts` attempts are made (at least one). A non-retryable
/// error ends the loop immediately.
///
/// # Arguments
///
/// * `config` - Retry configuration (attempts, backoff base and cap, jitter)
/// * `operation` - Async closure that returns `Result<T, E>` where E implements IsRetryable
pub async fn with_retry<F, Fut, T, E>(
    config: &RetryConfig,
    mut operation: F,
) -> RetryOutcome<T, E>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: IsRetryable + std::fmt::Display,
{
    let max_attempts = config.max_attempts.max(1);
    let mut attempt = 1;

    loop {
        match operation(attempt).await {
            Ok(result) => {
                if attempt > 1 {
                    tracing::debug!(attempts = attempt, "Operation succeeded after retry");
                }
                return RetryOutcome {
                    result: Ok(result),
                    attempts: attempt,
                };
            }
            Err(e) if e.is_retryable() && attempt < max_attempts => {
                let delay = add_jitter(backoff_delay(config, attempt), config.jitter);

                tracing::debug!(
                    error = %e,
                    attempt = attempt,
                    max_attempts = max_attempts,
                    delay_ms = delay.as_millis() as u64,
                    "Attempt failed, backing off"
                );

                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(e) => {
                if e.is_retryable() {
                    tracing::debug!(
                        error = %e,
                        attempts = attempt,
                        "Operation failed after all retry attempts exhausted"
                    );
                } else {
                    tracing::debug!(error = %e, "Operation failed with non-retryable error");
                }
                return RetryOutcome {
                    result: Err(e),
                    attempts: attempt,
                };
            }
        }
    }
}

/// Delay before the attempt following `attempt` (1-based), without jitter
///
/// `backoff_base * 2^(attempt-1)`, capped at `max_backoff`. Non-decreasing in
/// `attempt`.
///
/// ```
/// use netuid_fetch::config::RetryConfig;
/// use netuid_fetch::retry::backoff_delay;
/// use std::time::Duration;
///
/// let config = RetryConfig {
///     backoff_base: Duration::from_millis(100),
///     ..Default::default()
/// };
/// assert_eq!(backoff_delay(&config, 1), Duration::from_millis(100));
/// assert_eq!(backoff_delay(&config, 3), Duration::from_millis(400));
/// ```
#[must_use]
pub fn backoff_delay(config: &RetryConfig, attempt: u32) -> Duration {
    let exponent = attempt.saturating_sub(1);
    2u32.checked_pow(exponent)
        .and_then(|factor| config.backoff_base.checked_mul(factor))
        .map_or(config.max_backoff, |delay| delay.min(config.max_backoff))
}

/// Add uniform random jitter in `[0, max_jitter]` to a delay
fn add_jitter(delay: Duration, max_jitter: Duration) -> Duration {
    if max_jitter.is_zero() {
        return delay;
    }
    let mut rng = rand::thread_rng();
    let jitter_secs: f64 = rng.gen_range(0.0..=max_jitter.as_secs_f64());
    delay + Duration::from_secs_f64(jitter_secs)
}
