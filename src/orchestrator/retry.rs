use std::time::Duration;

use backoff::backoff::Backoff;
use backoff::ExponentialBackoff;

/// How often a strategy is retried on retryable failures, and how long to wait
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub backoff_base: Duration,
    pub backoff_max: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 2,
            backoff_base: Duration::from_millis(500),
            backoff_max: Duration::from_secs(8),
        }
    }
}

impl RetryPolicy {
    pub fn new(max_retries: u32, backoff_base: Duration, backoff_max: Duration) -> Self {
        Self {
            max_retries,
            backoff_base,
            backoff_max,
        }
    }

    /// Doubling schedule from `backoff_base` up to `backoff_max`, without
    /// jitter or an elapsed-time limit; the retry count bounds it instead
    pub fn schedule(&self) -> ExponentialBackoff {
        ExponentialBackoff {
            current_interval: self.backoff_base,
            initial_interval: self.backoff_base,
            randomization_factor: 0.0,
            multiplier: 2.0,
            max_interval: self.backoff_max.max(self.backoff_base),
            max_elapsed_time: None,
            ..ExponentialBackoff::default()
        }
    }

    /// Delay before retry number `retry` (0-based): `base * 2^retry`, capped
    pub fn backoff(&self, retry: u32) -> Duration {
        let mut schedule = self.schedule();
        let mut delay = self.backoff_base;
        for _ in 0..=retry.min(64) {
            delay = schedule.next_backoff().unwrap_or(self.backoff_max);
        }
        delay.min(self.backoff_max.max(self.backoff_base))
    }
}
