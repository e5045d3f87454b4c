use std::future::Future;
use std::time::Duration;
use tracing::warn;

use crate::error::Result;

/// At-least-once retry of individual remote calls with capped exponential backoff.
///
/// Only failures classified as retryable by [`crate::error::Error::is_retryable`]
/// are attempted again; validation and auth failures return immediately.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    max_attempts: u32,
    initial_backoff: Duration,
    max_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(3, Duration::from_millis(500), Duration::from_secs(8))
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, initial_backoff: Duration, max_backoff: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            initial_backoff,
            max_backoff,
        }
    }

    /// Single attempt, no waiting.
    pub fn none() -> Self {
        Self::new(1, Duration::ZERO, Duration::ZERO)
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Delay before the retry that follows failed attempt number `attempt` (0-based).
    pub fn backoff_for(&self, attempt: u32) -> Duration {
        let factor = 1u32 << attempt.min(10);
        let delay = self.initial_backoff.saturating_mul(factor);
        if self.max_backoff.is_zero() {
            delay
        } else {
            delay.min(self.max_backoff)
        }
    }

    pub async fn run<T, F, Fut>(&self, label: &str, mut op: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let mut attempt = 0;
        loop {
            match op().await {
                Ok(value) => return Ok(value),
                Err(err) if err.is_retryable() && attempt + 1 < self.max_attempts => {
                    let delay = self.backoff_for(attempt);
                    warn!(
                        ?err,
                        label,
                        attempt = attempt + 1,
                        max_attempts = self.max_attempts,
                        "remote call failed; backing off"
                    );
                    if !delay.is_zero() {
                        tokio::time::sleep(delay).await;
                    }
                    attempt += 1;
                }
                Err(err) => return Err(err),
            }
        }
    }
}
