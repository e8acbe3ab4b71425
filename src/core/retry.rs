// Bounded retry for venue calls
//
// Every call into the execution venue is wrapped here: retryable faults
// (disconnects) are retried up to `max_attempts` with a fixed backoff,
// then surfaced as MaxRetriesExceeded. Non-retryable errors (rejections,
// validation) pass through immediately.

use std::time::Duration;

use tokio::time::sleep;
use tracing::warn;

use crate::error::{TradingError, TradingResult};

#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff: Duration::from_millis(200),
        }
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, backoff: Duration) -> Self {
        Self { max_attempts, backoff }
    }

    /// Run a synchronous venue operation under this policy. The closure is
    /// re-invoked after the backoff on each retryable failure.
    pub async fn run<T, F>(&self, what: &str, mut operation: F) -> TradingResult<T>
    where
        F: FnMut() -> TradingResult<T>,
    {
        let mut attempt = 1;
        loop {
            match operation() {
                Ok(value) => return Ok(value),
                Err(err) if err.is_retryable() && attempt < self.max_attempts => {
                    warn!(
                        "⚠️  {} failed (attempt {}/{}), retrying in {:?}: {}",
                        what, attempt, self.max_attempts, self.backoff, err
                    );
                    attempt += 1;
                    sleep(self.backoff).await;
                }
                Err(err) if err.is_retryable() => {
                    return Err(TradingError::MaxRetriesExceeded(format!("{}: {}", what, err)));
                }
                Err(err) => return Err(err),
            }
        }
    }
}
