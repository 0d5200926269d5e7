//! Retry policy for transient job failures
//!
//! Exponential backoff with a hard cap. The scheduler consults the policy
//! per attempt; the one-shot full-transfer fallback for integrity errors is
//! separate and lives in the scheduler's attempt loop.

use std::time::Duration;

use tidesync_core::config::RetryConfig;

/// Upper bound on a single backoff sleep, regardless of attempt count.
const MAX_DELAY: Duration = Duration::from_secs(60);

/// Backoff schedule for transient failures.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    max_attempts: u32,
    base_delay: Duration,
}

impl RetryPolicy {
    #[must_use]
    pub fn new(config: &RetryConfig) -> Self {
        Self {
            max_attempts: config.max_attempts.max(1),
            base_delay: Duration::from_millis(config.base_delay_ms),
        }
    }

    /// Whether another attempt is allowed after `attempt` failures.
    #[must_use]
    pub fn allows_retry(&self, attempt: u32) -> bool {
        attempt < self.max_attempts
    }

    /// Delay before retry number `attempt` (1-based): base doubled per
    /// previous attempt, capped.
    #[must_use]
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let factor = 1u64 << attempt.saturating_sub(1).min(16);
        self.base_delay.saturating_mul(factor as u32).min(MAX_DELAY)
    }
}
