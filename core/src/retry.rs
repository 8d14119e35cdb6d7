//! Bounded retry policy for transient storage failures.
//!
//! The policy object only decides; callers own the clock and the sleep.
//! Only transient errors are retried, validation and not-found never.

use std::time::Duration;

use crate::error::CoreError;

/// Exponential backoff policy with a hard attempt cap
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(1),
        }
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, base_delay: Duration, max_delay: Duration) -> Self {
        Self {
            max_attempts,
            base_delay,
            max_delay,
        }
    }

    /// Whether an error class is worth retrying at all
    pub fn is_transient(error: &CoreError) -> bool {
        matches!(
            error,
            CoreError::Database(_) | CoreError::Bus(_) | CoreError::Lock(_)
        )
    }

    /// Whether another attempt should follow attempt number `attempt`
    /// (1-based) that failed with `error`.
    pub fn should_retry(&self, attempt: u32, error: &CoreError) -> bool {
        attempt < self.max_attempts && Self::is_transient(error)
    }

    /// Delay before the retry following attempt `attempt` (1-based),
    /// doubling from the base and clamped to the maximum.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
        self.base_delay.saturating_mul(factor).min(self.max_delay)
    }
}
