//! Reconnect policy: bounded attempts with capped exponential backoff.

use std::time::Duration;

/// Default retry budget after an abnormal close.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 6;
/// Delay before the first reconnect attempt.
pub const DEFAULT_INITIAL_DELAY: Duration = Duration::from_millis(1_000);
/// Upper bound on any single reconnect delay.
pub const DEFAULT_MAX_DELAY: Duration = Duration::from_millis(30_000);

/// Bounded reconnect policy used by `TaskEventChannel`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ReconnectPolicy {
    /// Number of reconnect attempts allowed between two successful opens.
    pub max_attempts: u32,
    /// Delay for attempt 1; doubles for every following attempt.
    pub initial_delay: Duration,
    /// Cap applied after doubling.
    pub max_delay: Duration,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            initial_delay: DEFAULT_INITIAL_DELAY,
            max_delay: DEFAULT_MAX_DELAY,
        }
    }
}

impl ReconnectPolicy {
    /// True when 1-indexed `attempt` is still inside the budget.
    pub fn allows(&self, attempt: u32) -> bool {
        attempt >= 1 && attempt <= self.max_attempts
    }

    /// Delay before 1-indexed `attempt`: `min(max_delay, initial_delay * 2^(attempt-1))`.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(31);
        let millis = self
            .initial_delay
            .as_millis()
            .saturating_mul(1u128 << exponent)
            .min(self.max_delay.as_millis());
        Duration::from_millis(u64::try_from(millis).unwrap_or(u64::MAX))
    }
}
