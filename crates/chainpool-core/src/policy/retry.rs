//! Exponential backoff retry policy.

use std::time::Duration;

/// Configuration for the retry policy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryConfig {
    /// How many times each endpoint in a pool is tried before giving up.
    pub max_retries_per_endpoint: u32,
    /// Delay before the first retry; doubles on every further attempt.
    pub backoff_base: Duration,
    /// Upper bound on a single delay.
    pub max_backoff: Option<Duration>,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries_per_endpoint: 3,
            backoff_base: Duration::from_millis(100),
            max_backoff: Some(Duration::from_secs(30)),
        }
    }
}

/// Stateless retry policy: computes the delay given the attempt number.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub config: RetryConfig,
}

impl RetryPolicy {
    pub fn new(config: RetryConfig) -> Self {
        Self { config }
    }

    /// Delay after the `attempt`-th failure (1-based):
    /// `backoff_base * 2^(attempt-1)`, saturating, capped at `max_backoff`.
    pub fn wait_for(&self, attempt: u32) -> Duration {
        let exp = attempt.saturating_sub(1);
        let factor = 1u32.checked_shl(exp).unwrap_or(u32::MAX);
        let delay = self.config.backoff_base.saturating_mul(factor);
        match self.config.max_backoff {
            Some(cap) => delay.min(cap),
            None => delay,
        }
    }

    /// Attempt budget for a pool of `pool_size` endpoints. Never zero.
    pub fn total_attempts(&self, pool_size: usize) -> u32 {
        let size = u32::try_from(pool_size).unwrap_or(u32::MAX).max(1);
        self.max_retries_per_endpoint().saturating_mul(size)
    }

    /// Retries per endpoint. Never zero.
    pub fn max_retries_per_endpoint(&self) -> u32 {
        self.config.max_retries_per_endpoint.max(1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy(base_ms: u64, cap: Option<Duration>) -> RetryPolicy {
        RetryPolicy::new(RetryConfig {
            max_retries_per_endpoint: 2,
            backoff_base: Duration::from_millis(base_ms),
            max_backoff: cap,
        })
    }

    #[test]
    fn delay_doubles() {
        let p = policy(100, None);
        assert_eq!(p.wait_for(1), Duration::from_millis(100));
        assert_eq!(p.wait_for(2), Duration::from_millis(200));
        assert_eq!(p.wait_for(3), Duration::from_millis(400));
    }

    #[test]
    fn delay_capped_at_max() {
        let p = policy(100, Some(Duration::from_millis(500)));
        assert_eq!(p.wait_for(3), Duration::from_millis(400));
        assert_eq!(p.wait_for(4), Duration::from_millis(500));
        assert_eq!(p.wait_for(20), Duration::from_millis(500));
    }

    #[test]
    fn huge_attempt_saturates() {
        let p = policy(100, None);
        assert!(p.wait_for(64) >= p.wait_for(32));
    }

    #[test]
    fn budget_is_retries_times_pool_size() {
        let p = policy(100, None);
        assert_eq!(p.total_attempts(3), 6);
        assert_eq!(p.total_attempts(1), 2);
    }

    #[test]
    fn zero_retries_still_tries_once() {
        let p = RetryPolicy::new(RetryConfig {
            max_retries_per_endpoint: 0,
            ..Default::default()
        });
        assert_eq!(p.total_attempts(2), 2);
    }
}
