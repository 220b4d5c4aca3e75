//! Retry with exponential backoff for quota/rate-limit failures.

use std::fmt::Display;
use std::future::Future;
use std::time::Duration;

use log::warn;

use crate::error::is_quota_message;

/// How many times to retry a quota-limited call and how long to wait first.
///
/// The delay doubles after every retry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub initial_delay: Duration,
}

impl RetryPolicy {
    /// Text generation: 2s, 4s, 8s.
    pub const TEXT: RetryPolicy = RetryPolicy::new(3, Duration::from_millis(2000));
    /// Image generation is expensive to re-issue, so it only gets one retry.
    pub const IMAGE: RetryPolicy = RetryPolicy::new(1, Duration::from_millis(3000));

    pub const fn new(max_retries: u32, initial_delay: Duration) -> Self {
        Self {
            max_retries,
            initial_delay,
        }
    }

    pub async fn execute<T, E, F, Fut>(&self, operation: F) -> Result<T, E>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Display,
    {
        execute(operation, self.max_retries, self.initial_delay).await
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::TEXT
    }
}

/// Runs `operation`, retrying while it fails with a quota signal.
///
/// Any other failure, or a quota failure once `max_retries` is used up, is
/// returned unchanged.
pub async fn execute<T, E, F, Fut>(
    mut operation: F,
    mut max_retries: u32,
    mut delay: Duration,
) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: Display,
{
    loop {
        match operation().await {
            Ok(value) => return Ok(value),
            Err(e) => {
                if max_retries == 0 || !is_quota_message(&e.to_string()) {
                    return Err(e);
                }

                warn!(
                    "Quota hit, retrying in {}ms... ({} retries left)",
                    delay.as_millis(),
                    max_retries
                );
                tokio::time::sleep(delay).await;

                max_retries -= 1;
                delay = delay.saturating_mul(2);
            }
        }
    }
}
