use std::fmt::Display;
use std::future::Future;
use std::time::Duration;

pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;
pub const DEFAULT_BASE_DELAY: Duration = Duration::from_secs(1);

/// Bounded exponential backoff without jitter.
///
/// Attempt `i` (0-indexed) that fails before the last one is followed by a
/// pause of `base_delay * 2^i`, so the default policy waits 1s, then 2s.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        RetryPolicy {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            base_delay: DEFAULT_BASE_DELAY,
        }
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, base_delay: Duration) -> Self {
        RetryPolicy {
            max_attempts,
            base_delay,
        }
    }

    /// A policy that tries exactly once.
    pub fn no_retry() -> Self {
        RetryPolicy::new(1, Duration::ZERO)
    }

    pub fn delay_for(&self, attempt: u32) -> Duration {
        self.base_delay.saturating_mul(2u32.saturating_pow(attempt))
    }

    fn attempts(&self) -> u32 {
        self.max_attempts.max(1)
    }
}

/// Runs `attempt` until it succeeds or the policy is exhausted, sleeping
/// between tries. The last error is returned unchanged.
pub async fn retry<T, E, F, Fut>(policy: &RetryPolicy, label: &str, mut attempt: F) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: Display,
{
    let attempts = policy.attempts();
    let mut i = 0;
    loop {
        match attempt().await {
            Ok(value) => return Ok(value),
            Err(err) if i + 1 >= attempts => {
                log::error!("{} failed after {} attempt(s): {}", label, attempts, err);
                return Err(err);
            }
            Err(err) => {
                let delay = policy.delay_for(i);
                log::warn!(
                    "{} attempt {}/{} failed: {}; retrying in {:?}",
                    label,
                    i + 1,
                    attempts,
                    err,
                    delay
                );
                tokio::time::sleep(delay).await;
                i += 1;
            }
        }
    }
}
