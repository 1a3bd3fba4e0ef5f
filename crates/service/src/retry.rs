use std::time::Duration;

use tokio::time::sleep;
use tracing::debug;

/// Retry policy for idempotent upstream reads: one extra attempt with
/// exponential backoff unless disabled. Writes never go through this path.
#[derive(Clone)]
pub struct RetryPolicy {
    max_attempts: u32,
    backoff_base: Duration,
    backoff_max: Duration,
    enabled: bool,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, backoff_base: Duration, backoff_max: Duration, enabled: bool) -> Self {
        Self { max_attempts, backoff_base, backoff_max, enabled }
    }

    /// Spec default: a single internal retry for idempotent reads.
    pub fn single_retry(enabled: bool) -> Self {
        Self::new(2, Duration::from_millis(100), Duration::from_millis(500), enabled)
    }

    pub fn max_attempts(&self) -> u32 {
        if self.enabled {
            self.max_attempts
        } else {
            1
        }
    }

    pub fn should_retry(&self, attempt: u32, retryable: bool) -> bool {
        if !self.enabled || !retryable {
            return false;
        }
        attempt < self.max_attempts
    }

    pub fn backoff_for(&self, attempt: u32) -> Duration {
        if attempt == 0 {
            return Duration::ZERO;
        }
        let backoff_ms = self.backoff_base.as_millis() as u64 * (2_u64.pow(attempt - 1));
        Duration::from_millis(backoff_ms.min(self.backoff_max.as_millis() as u64))
    }

    pub async fn wait_before_retry(&self, attempt: u32) {
        let backoff = self.backoff_for(attempt);
        if backoff.is_zero() {
            return;
        }
        debug!("retrying in {:?} (attempt {})", backoff, attempt);
        sleep(backoff).await;
    }
}
