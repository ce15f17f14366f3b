use std::future::Future;
use std::time::Duration;

use log::warn;
use tokio::time::sleep;

use crate::constants::{MAX_TRANSFER_RETRIES, RETRY_BASE_DELAY_MS, RETRY_MAX_DELAY_SECS};

/// Result of a single transport attempt.
pub enum Attempt<T, E> {
    Done(T),
    /// Worth retrying (dispatch errors, throttling, 5xx)
    Transient(E),
    /// Retrying cannot help (access denied, missing bucket, bad request)
    Fatal(E),
}

/// Bounded exponential backoff for transport calls.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: usize,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: MAX_TRANSFER_RETRIES,
            base_delay: Duration::from_millis(RETRY_BASE_DELAY_MS),
            max_delay: Duration::from_secs(RETRY_MAX_DELAY_SECS),
        }
    }
}

impl RetryPolicy {
    pub fn with_max_attempts(max_attempts: usize) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            ..Self::default()
        }
    }

    /// Delay before retrying after failed attempt number `attempt` (1-based).
    pub fn delay_for(&self, attempt: usize) -> Duration {
        let factor = 2u32.saturating_pow(attempt.min(16) as u32);
        self.base_delay.saturating_mul(factor).min(self.max_delay)
    }

    /// Run `call` until it succeeds, fails fatally, or attempts run out.
    ///
    /// On failure returns the last error together with the number of
    /// attempts made.
    pub async fn run<T, E, F, Fut>(&self, operation: &str, mut call: F) -> Result<T, (E, usize)>
    where
        E: std::fmt::Display,
        F: FnMut() -> Fut,
        Fut: Future<Output = Attempt<T, E>>,
    {
        let mut attempt = 0;
        loop {
            attempt += 1;
            match call().await {
                Attempt::Done(value) => return Ok(value),
                Attempt::Fatal(e) => return Err((e, attempt)),
                Attempt::Transient(e) => {
                    if attempt >= self.max_attempts {
                        return Err((e, attempt));
                    }
                    let delay = self.delay_for(attempt);
                    warn!(
                        "{} attempt {} failed, retrying in {:?}: {}",
                        operation, attempt, delay, e
                    );
                    sleep(delay).await;
                }
            }
        }
    }
}
