//! Process-wide request pacing.

use governor::{DefaultDirectRateLimiter, Quota, RateLimiter};
use std::sync::Arc;
use std::time::Duration;

/// Minimum interval between two requests to the arXiv API.
pub const POLITENESS_INTERVAL: Duration = Duration::from_secs(3);

/// A shared gate that lets at most one request through per interval.
///
/// Clones share the same limiter state, so every session crawling in
/// parallel draws from one budget.
#[derive(Clone)]
pub struct RateGate {
    limiter: Option<Arc<DefaultDirectRateLimiter>>,
    interval: Duration,
}

impl RateGate {
    /// Gate allowing one request per `interval`; a zero interval never waits
    pub fn new(interval: Duration) -> Self {
        let limiter = Quota::with_period(interval).map(|quota| Arc::new(RateLimiter::direct(quota)));
        Self { limiter, interval }
    }

    /// Gate that never waits
    pub fn unlimited() -> Self {
        Self {
            limiter: None,
            interval: Duration::ZERO,
        }
    }

    /// Wait until the next request is allowed
    pub async fn acquire(&self) {
        if let Some(limiter) = &self.limiter {
            limiter.until_ready().await;
        }
    }
}

impl Default for RateGate {
    fn default() -> Self {
        Self::new(POLITENESS_INTERVAL)
    }
}

impl std::fmt::Debug for RateGate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RateGate")
            .field("interval", &self.interval)
            .field("limited", &self.limiter.is_some())
            .finish()
    }
}
