//! Retry policy for live probes.

use std::time::Duration;

use crate::config::ProbeConfig;

/// Bounded retry with exponential backoff.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first.
    pub max_attempts: u32,
    /// Delay before the first retry; doubled for each later one.
    pub base_delay: Duration,
    /// Deadline for each attempt.
    pub attempt_timeout: Duration,
}

impl RetryPolicy {
    /// Creates a policy.
    #[must_use]
    pub const fn new(max_attempts: u32, base_delay: Duration, attempt_timeout: Duration) -> Self {
        Self {
            max_attempts,
            base_delay,
            attempt_timeout,
        }
    }

    /// Builds the policy configured under `probe:`.
    #[must_use]
    pub fn from_config(config: &ProbeConfig) -> Self {
        Self::new(config.max_attempts.max(1), config.backoff(), config.timeout())
    }

    /// Whether another attempt is allowed after `attempts` have been made.
    #[must_use]
    pub const fn should_retry(&self, attempts: u32) -> bool {
        attempts < self.max_attempts
    }

    /// Delay before retry number `retry` (0 is the first retry).
    #[must_use]
    pub fn delay(&self, retry: u32) -> Duration {
        self.base_delay.saturating_mul(2u32.saturating_pow(retry))
    }
}

impl Default for RetryPolicy {
    /// 3 attempts, 1s base backoff, 30s per attempt.
    fn default() -> Self {
        Self::from_config(&ProbeConfig::default())
    }
}
