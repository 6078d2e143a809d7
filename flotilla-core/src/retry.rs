//! Retry with exponential backoff and jitter.

use std::future::Future;
use std::time::Duration;

use rand::Rng;
use tracing::debug;

use crate::descriptor::ResourceId;
use crate::error::{ReconcileError, RemoteError};
use crate::reconciler::Action;

/// Backoff policy for transient remote errors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first call.
    pub max_attempts: u32,
    /// Delay before the first retry. Doubles on each retry.
    pub base_delay: Duration,
    pub max_delay: Duration,
    /// Add up to half the delay again at random.
    pub jitter: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            base_delay: Duration::from_millis(200),
            max_delay: Duration::from_secs(20),
            jitter: true,
        }
    }
}

impl RetryPolicy {
    /// Single attempt, never retry.
    pub fn none() -> Self {
        Self {
            max_attempts: 1,
            ..Self::default()
        }
    }

    /// Delay before retry number `retry` (0-based).
    ///
    /// Without the cap, each delay is strictly larger than the previous one
    /// even with jitter: the jittered delay stays below 1.5x its base while
    /// the next base is 2x.
    pub fn delay_for(&self, retry: u32) -> Duration {
        let factor = 1u32.checked_shl(retry).unwrap_or(u32::MAX);
        let delay = self.base_delay.saturating_mul(factor).min(self.max_delay);
        if !self.jitter || delay.is_zero() {
            return delay;
        }

        let spread = (delay.as_millis() / 2).min(u64::MAX as u128) as u64;
        let extra = if spread == 0 {
            0
        } else {
            rand::thread_rng().gen_range(0..spread)
        };
        (delay + Duration::from_millis(extra)).min(self.max_delay)
    }

    /// Run `op` until it succeeds, fails with a non-retryable error, or the
    /// attempt budget is spent. Every backoff delay slept is appended to
    /// `delays`.
    pub async fn run<T, F, Fut>(
        &self,
        id: &ResourceId,
        action: Action,
        delays: &mut Vec<Duration>,
        mut op: F,
    ) -> Result<T, Exhausted>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, RemoteError>>,
    {
        let max_attempts = self.max_attempts.max(1);
        let mut attempt = 1;
        loop {
            match op().await {
                Ok(value) => return Ok(value),
                Err(error) if error.is_retryable() && attempt < max_attempts => {
                    let delay = self.delay_for(attempt - 1);
                    debug!(
                        %id,
                        %action,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %error,
                        "Transient remote error, backing off"
                    );
                    tokio::time::sleep(delay).await;
                    delays.push(delay);
                    attempt += 1;
                }
                Err(error) => {
                    return Err(Exhausted {
                        error,
                        attempts: attempt,
                    });
                }
            }
        }
    }
}

/// Last error of a retried call and how many attempts were made.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Exhausted {
    pub error: RemoteError,
    pub attempts: u32,
}

impl Exhausted {
    pub fn into_error(self, action: Action) -> ReconcileError {
        ReconcileError::Remote {
            action,
            attempts: self.attempts,
            source: self.error,
        }
    }
}

/// How long to wait for a created resource to report ACTIVE.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SettlePolicy {
    pub attempts: u32,
    pub interval: Duration,
}

impl Default for SettlePolicy {
    fn default() -> Self {
        Self {
            attempts: 10,
            interval: Duration::from_secs(1),
        }
    }
}
