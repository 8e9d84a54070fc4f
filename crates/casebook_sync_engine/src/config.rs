//! Engine configuration and retry policy.

use casebook_protocol::DeviceCredentials;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Exponential backoff policy for retryable sync failures.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Retries after the initial attempt.
    pub max_retries: u32,
    /// Delay before the first retry.
    pub base_delay: Duration,
    /// Upper bound on any single delay.
    pub max_delay: Duration,
    /// Fraction of the delay randomized away, `0.0..=1.0`, to keep a fleet
    /// of devices from retrying in lockstep.
    pub jitter: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 5,
            base_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(30),
            jitter: 0.2,
        }
    }
}

impl RetryConfig {
    /// No retries at all.
    pub fn disabled() -> Self {
        Self {
            max_retries: 0,
            ..Self::default()
        }
    }

    /// Delay before retry `attempt` (0-based): exponential, capped, jittered.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let exp = self
            .base_delay
            .saturating_mul(2u32.saturating_pow(attempt))
            .min(self.max_delay);
        if self.jitter <= 0.0 {
            return exp;
        }
        let jitter_span = exp.as_millis() as f64 * self.jitter.min(1.0);
        let offset = (pseudo_random() % 1000) as f64 / 1000.0 * jitter_span;
        exp.saturating_sub(Duration::from_millis(offset as u64))
    }
}

// Subsecond clock digits give enough spread for backoff jitter.
fn pseudo_random() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .subsec_nanos() as u64
}

/// Configuration for the sync coordinator.
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Credentials presented on every authenticated request.
    pub credentials: DeviceCredentials,
    /// Rows requested per pull page.
    pub pull_batch_size: u32,
    /// Backoff policy for `sync_with_retry`.
    pub retry: RetryConfig,
}

impl SyncConfig {
    /// Creates a configuration with default paging and retry settings.
    pub fn new(credentials: DeviceCredentials) -> Self {
        Self {
            credentials,
            pull_batch_size: 200,
            retry: RetryConfig::default(),
        }
    }

    /// Sets the pull page size.
    pub fn with_pull_batch_size(mut self, size: u32) -> Self {
        self.pull_batch_size = size;
        self
    }

    /// Sets the retry policy.
    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_grows_and_caps() {
        let retry = RetryConfig {
            jitter: 0.0,
            ..RetryConfig::default()
        };
        assert_eq!(retry.delay_for_attempt(0), Duration::from_millis(500));
        assert_eq!(retry.delay_for_attempt(1), Duration::from_secs(1));
        assert_eq!(retry.delay_for_attempt(2), Duration::from_secs(2));
        assert_eq!(retry.delay_for_attempt(10), Duration::from_secs(30));
    }

    #[test]
    fn jitter_never_exceeds_the_cap() {
        let retry = RetryConfig::default();
        for attempt in 0..8 {
            assert!(retry.delay_for_attempt(attempt) <= retry.max_delay);
        }
    }

    #[test]
    fn disabled_retry() {
        assert_eq!(RetryConfig::disabled().max_retries, 0);
    }
}
