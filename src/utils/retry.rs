//! Retry utilities with exponential backoff
//!
//! Used by the notification dispatcher to redeliver booking confirmations.
//! The booking path itself never retries through this module.

use std::future::Future;
use std::time::Duration;
use tracing::{debug, warn};

/// Configuration for retry behavior
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Maximum number of retry attempts after the first try
    pub max_retries: u32,

    /// Base delay in milliseconds for exponential backoff
    pub base_delay_ms: u64,

    /// Maximum delay in milliseconds (caps exponential growth)
    pub max_delay_ms: u64,

    /// Multiplier for exponential backoff (default: 2.0)
    pub backoff_multiplier: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 5,
            base_delay_ms: 1000,
            max_delay_ms: 60_000,
            backoff_multiplier: 2.0,
        }
    }
}

impl RetryConfig {
    /// Create a retry configuration with custom delays
    pub fn with_delays(max_retries: u32, base_delay_ms: u64, max_delay_ms: u64) -> Self {
        Self {
            max_retries,
            base_delay_ms,
            max_delay_ms,
            backoff_multiplier: 2.0,
        }
    }

    /// Total attempts including the first one
    pub fn max_attempts(&self) -> u32 {
        self.max_retries + 1
    }

    /// Delay before the given attempt (attempt 0 runs immediately)
    pub fn calculate_delay(&self, attempt: u32) -> Duration {
        let delay_ms = if attempt == 0 {
            0
        } else {
            let exponential =
                self.base_delay_ms as f64 * self.backoff_multiplier.powi((attempt - 1) as i32);
            (exponential as u64).min(self.max_delay_ms)
        };

        Duration::from_millis(delay_ms)
    }
}

/// Final failure of a retried operation
#[derive(Debug)]
pub struct Exhausted<E> {
    /// Attempts made, including the first
    pub attempts: u32,
    /// Error returned by the last attempt
    pub last_error: E,
}

/// Run `operation` until it succeeds, `should_retry` rejects the error, or
/// the retry budget is spent.
///
/// # Example
///
/// ```no_run
/// use crewbook::utils::retry::{with_retry_if, RetryConfig};
///
/// # async fn deliver() -> Result<(), std::io::Error> { Ok(()) }
/// # async fn run() {
/// let config = RetryConfig::with_delays(3, 500, 10_000);
/// let outcome = with_retry_if(&config, || deliver(), |_e| true).await;
/// if let Err(exhausted) = outcome {
///     eprintln!("gave up after {} attempts", exhausted.attempts);
/// }
/// # }
/// ```
pub async fn with_retry_if<T, E, F, Fut, P>(
    config: &RetryConfig,
    mut operation: F,
    should_retry: P,
) -> Result<T, Exhausted<E>>
where
    E: std::fmt::Display,
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    P: Fn(&E) -> bool,
{
    let mut attempt = 0;

    loop {
        if attempt > 0 {
            let delay = config.calculate_delay(attempt);
            debug!(
                attempt = attempt,
                delay_ms = delay.as_millis() as u64,
                "Retrying operation after delay"
            );
            tokio::time::sleep(delay).await;
        }

        match operation().await {
            Ok(value) => {
                if attempt > 0 {
                    debug!(attempt = attempt, "Operation succeeded after retry");
                }
                return Ok(value);
            }
            Err(e) => {
                attempt += 1;
                if !should_retry(&e) {
                    warn!(error = %e, "Non-retryable error encountered");
                    return Err(Exhausted {
                        attempts: attempt,
                        last_error: e,
                    });
                }
                if attempt >= config.max_attempts() {
                    warn!(attempts = attempt, error = %e, "Retry budget exhausted");
                    return Err(Exhausted {
                        attempts: attempt,
                        last_error: e,
                    });
                }
                warn!(
                    attempt = attempt,
                    max_retries = config.max_retries,
                    error = %e,
                    "Operation failed, will retry"
                );
            }
        }
    }
}
