//! Bounded retry with a fixed delay.
//!
//! Used to poll a freshly started dependency until it accepts connections.
//! The delay between attempts is constant.

use std::fmt::Display;
use std::future::Future;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Number of attempts every backend polls with.
pub const DEFAULT_ATTEMPTS: u32 = 10;

/// How often and how long to poll.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Maximum number of invocations (at least one is always made).
    pub attempts: u32,
    /// Pause between two invocations.
    pub delay: Duration,
}

impl RetryPolicy {
    pub fn new(attempts: u32, delay: Duration) -> Self {
        Self { attempts, delay }
    }

    /// The standard ten-attempt budget with the given delay.
    pub fn with_delay(delay: Duration) -> Self {
        Self::new(DEFAULT_ATTEMPTS, delay)
    }

    /// Runs `operation` under this policy.
    pub async fn run<T, E, F, Fut>(&self, operation: F) -> Result<T, E>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Display,
    {
        retry(self.attempts, self.delay, operation).await
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::with_delay(Duration::from_secs(1))
    }
}

/// Invokes `operation` up to `max_attempts` times, sleeping `delay` in between.
///
/// Returns the first success without further calls. When every attempt
/// fails, only the last error is returned; earlier ones are logged at debug
/// level and dropped.
pub async fn retry<T, E, F, Fut>(max_attempts: u32, delay: Duration, mut operation: F) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: Display,
{
    let max_attempts = max_attempts.max(1);
    let mut attempt = 1;

    loop {
        match operation().await {
            Ok(value) => {
                if attempt > 1 {
                    tracing::debug!(attempt, "Operation succeeded after retry");
                }
                return Ok(value);
            }
            Err(e) if attempt >= max_attempts => {
                tracing::warn!(attempt, max_attempts, error = %e, "Giving up after final attempt");
                return Err(e);
            }
            Err(e) => {
                tracing::debug!(
                    attempt,
                    max_attempts,
                    delay_ms = delay.as_millis() as u64,
                    error = %e,
                    "Attempt failed, retrying"
                );
                attempt += 1;
                tokio::time::sleep(delay).await;
            }
        }
    }
}
