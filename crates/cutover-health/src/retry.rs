//! Bounded retry polling.
//!
//! One utility shared by the health gate and the stability monitor:
//! an optional warm-up delay, then up to `attempts` observations at a
//! fixed interval. Returns on the first passing observation. Every
//! suspension point is a plain `tokio::time::sleep`, so the loop is
//! cancellable and composes with an outer deadline.

use std::future::Future;
use std::time::Duration;

use thiserror::Error;
use tokio::time::sleep;
use tracing::debug;

/// Attempt budget for one polling loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Maximum observations before giving up.
    pub attempts: u32,
    /// Fixed delay between observations.
    pub interval: Duration,
    /// Delay before the first observation.
    pub warmup: Duration,
}

impl RetryPolicy {
    pub fn new(attempts: u32, interval: Duration) -> Self {
        Self {
            attempts,
            interval,
            warmup: Duration::ZERO,
        }
    }

    pub fn with_warmup(mut self, warmup: Duration) -> Self {
        self.warmup = warmup;
        self
    }
}

/// The predicate never passed within the attempt budget.
#[derive(Debug, Error, PartialEq, Eq)]
#[error("no passing observation within {attempts} attempts")]
pub struct Exhausted {
    pub attempts: u32,
}

/// Poll `attempt` under `policy` until it returns `true`.
///
/// Returns the 1-based attempt number that passed, or [`Exhausted`]
/// once the budget is spent. No sleep follows the final attempt.
pub async fn poll<F, Fut>(policy: &RetryPolicy, mut attempt: F) -> Result<u32, Exhausted>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = bool>,
{
    if !policy.warmup.is_zero() {
        debug!(warmup = ?policy.warmup, "waiting before first observation");
        sleep(policy.warmup).await;
    }

    for n in 1..=policy.attempts {
        if attempt(n).await {
            debug!(attempt = n, "observation passed");
            return Ok(n);
        }
        debug!(attempt = n, max = policy.attempts, "observation failed");
        if n < policy.attempts {
            sleep(policy.interval).await;
        }
    }

    Err(Exhausted {
        attempts: policy.attempts,
    })
}
