//! Bounded retry with exponential backoff for read-only exchange calls
//!
//! Only transport failures are retried; rejections, bad parameters and auth
//! failures propagate immediately. Order submission never goes through this
//! wrapper: a timed-out order may still have been accepted by the exchange,
//! so repeating it is not safe.

use std::future::Future;
use std::time::Duration;

use tokio::time::sleep;
use tracing::{debug, warn};

use crate::domain::repositories::exchange_client::ExchangeResult;

#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Total attempts, including the first.
    pub max_attempts: u32,
    /// Delay before the first retry; doubles on each further retry.
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 4,
            base_delay: Duration::from_millis(500),
        }
    }
}

impl RetryPolicy {
    fn delay_for(&self, retry_index: u32) -> Duration {
        self.base_delay * 2u32.saturating_pow(retry_index)
    }
}

/// Run `operation`, retrying transient failures up to the policy's bound.
/// The last error is propagated once attempts are exhausted.
pub async fn with_backoff<T, F, Fut>(policy: &RetryPolicy, operation: F) -> ExchangeResult<T>
where
    F: Fn() -> Fut,
    Fut: Future<Output = ExchangeResult<T>>,
{
    let mut attempt: u32 = 0;
    loop {
        match operation().await {
            Ok(value) => {
                if attempt > 0 {
                    debug!(attempts = attempt + 1, "Exchange call succeeded after retry");
                }
                return Ok(value);
            }
            Err(e) if e.is_retryable() && attempt + 1 < policy.max_attempts => {
                let delay = policy.delay_for(attempt);
                warn!(
                    error = %e,
                    attempt = attempt + 1,
                    max_attempts = policy.max_attempts,
                    delay_ms = delay.as_millis() as u64,
                    "Transient exchange error, backing off"
                );
                sleep(delay).await;
                attempt += 1;
            }
            Err(e) => return Err(e),
        }
    }
}
