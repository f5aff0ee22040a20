//! Retry logic with exponential backoff.
//!
//! Backoff is deterministic: the Nth retry sleeps for `base * 2^(N-1)`,
//! capped at `max_delay`. After `max_attempts` retries the last error is
//! surfaced unchanged.

use std::time::Duration;

/// Configuration for retry behavior.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Maximum number of retry attempts (0 = no retries).
    pub max_attempts: u32,

    /// Base delay; the first retry waits exactly this long.
    pub base_delay: Duration,

    /// Ceiling applied to the computed delay.
    pub max_delay: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(60),
        }
    }
}

impl RetryConfig {
    /// Create a config with no retries (fail fast).
    pub fn no_retry() -> Self {
        Self { max_attempts: 0, ..Default::default() }
    }

    /// Create a config bounded by the configured retry limit.
    pub fn with_max_attempts(max_attempts: u32) -> Self {
        Self { max_attempts, ..Default::default() }
    }

    /// Delay before the Nth retry (1-based). Attempt 0 never sleeps.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        if attempt == 0 {
            return Duration::ZERO;
        }
        let factor = 2u64.saturating_pow(attempt.saturating_sub(1));
        let millis = (self.base_delay.as_millis() as u64).saturating_mul(factor);
        Duration::from_millis(millis).min(self.max_delay)
    }
}

/// Result of a retried operation.
#[derive(Debug)]
pub struct RetryResult<T, E> {
    /// The final result (success or last error).
    pub result: Result<T, E>,

    /// Number of attempts made.
    pub attempts: u32,

    /// Total time spent, including sleeps.
    pub total_time: Duration,

    /// Whether the operation was retried at all.
    pub was_retried: bool,
}

impl<T, E> RetryResult<T, E> {
    /// Check if the operation succeeded.
    pub fn is_ok(&self) -> bool {
        self.result.is_ok()
    }

    /// Get the result.
    pub fn into_result(self) -> Result<T, E> {
        self.result
    }
}

/// Retry an operation with the given configuration.
///
/// `sleep` is injected so tests can observe the schedule without waiting.
pub fn retry_with_sleep<T, E, F, S>(
    config: &RetryConfig,
    mut operation: F,
    mut sleep: S,
) -> RetryResult<T, E>
where
    F: FnMut() -> Result<T, E>,
    S: FnMut(Duration),
{
    let start = std::time::Instant::now();
    let mut attempts = 0;
    let max_attempts = config.max_attempts + 1; // +1 for the initial attempt

    loop {
        attempts += 1;
        let result = operation();

        if result.is_ok() || attempts >= max_attempts {
            return RetryResult {
                result,
                attempts,
                total_time: start.elapsed(),
                was_retried: attempts > 1,
            };
        }

        sleep(config.delay_for_attempt(attempts));
    }
}

/// Retry an operation, sleeping on the current thread between attempts.
pub fn retry<T, E, F>(config: &RetryConfig, operation: F) -> RetryResult<T, E>
where
    F: FnMut() -> Result<T, E>,
{
    retry_with_sleep(config, operation, std::thread::sleep)
}
