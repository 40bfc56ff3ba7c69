//! Retry utilities with exponential backoff for resilient API calls.

use async_trait::async_trait;
use rand::Rng;
use std::sync::Mutex;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use crate::crawler::CrawlError;

/// Configuration for retry behavior
///
/// The delay before retry `n` (1-based) is
/// `min(initial_delay * backoff_multiplier^(n-1), max_delay) + jitter`,
/// with jitter drawn uniformly from `0..=max_jitter`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryConfig {
    /// Maximum number of attempts, including the first one
    pub max_attempts: u32,
    /// Delay before the first retry
    pub initial_delay: Duration,
    /// Cap on the exponential part of the delay
    pub max_delay: Duration,
    /// Multiplier for exponential backoff
    pub backoff_multiplier: f64,
    /// Upper bound of the random jitter added to each delay
    pub max_jitter: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            initial_delay: Duration::from_secs(2),
            max_delay: Duration::from_secs(120),
            backoff_multiplier: 2.0,
            max_jitter: Duration::from_millis(500),
        }
    }
}

impl RetryConfig {
    /// Set the attempt bound
    pub fn max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = attempts.max(1);
        self
    }

    /// Disable jitter, mostly useful in tests
    pub fn without_jitter(mut self) -> Self {
        self.max_jitter = Duration::ZERO;
        self
    }

    /// Backoff delay after failed attempt `attempt`, without jitter
    pub fn backoff(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1) as f64;
        let delay_secs = self.initial_delay.as_secs_f64() * self.backoff_multiplier.powf(exponent);
        // A negative product waits zero, NaN falls back to max_delay
        Duration::from_secs_f64(delay_secs.min(self.max_delay.as_secs_f64()).max(0.0))
    }

    fn jitter(&self) -> Duration {
        let max_ms = self.max_jitter.as_millis() as u64;
        if max_ms == 0 {
            return Duration::ZERO;
        }
        Duration::from_millis(rand::thread_rng().gen_range(0..=max_ms))
    }
}

/// Something that can wait. Injected so backoff can be observed in tests.
#[async_trait]
pub trait Sleeper: Send + Sync + std::fmt::Debug {
    async fn sleep(&self, duration: Duration);
}

/// Sleeps on the tokio timer
#[derive(Debug, Default, Clone, Copy)]
pub struct TokioSleeper;

#[async_trait]
impl Sleeper for TokioSleeper {
    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

/// Records requested delays and returns immediately
#[derive(Debug, Default)]
pub struct RecordingSleeper {
    slept: Mutex<Vec<Duration>>,
}

impl RecordingSleeper {
    /// Create a new recording sleeper
    pub fn new() -> Self {
        Self::default()
    }

    /// Every delay requested so far, in order
    pub fn delays(&self) -> Vec<Duration> {
        self.slept.lock().map(|d| d.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl Sleeper for RecordingSleeper {
    async fn sleep(&self, duration: Duration) {
        if let Ok(mut slept) = self.slept.lock() {
            slept.push(duration);
        }
    }
}

/// Execute an async operation with retry logic
///
/// Transient errors (see [`CrawlError::is_transient`]) are retried until
/// `config.max_attempts` is reached, after which the last error is wrapped in
/// [`CrawlError::RetryExhausted`]. Permanent errors are returned as-is.
/// Cancellation is checked before every attempt and during every backoff.
///
/// `on_retry` is called with the failed attempt number, the delay about to be
/// slept and the error, before sleeping.
pub async fn with_retry<T, F, Fut, R>(
    config: &RetryConfig,
    sleeper: &dyn Sleeper,
    cancel: &CancellationToken,
    mut on_retry: R,
    mut operation: F,
) -> Result<T, CrawlError>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<T, CrawlError>>,
    R: FnMut(u32, Duration, &CrawlError),
{
    let mut attempts = 0;

    loop {
        attempts += 1;

        if cancel.is_cancelled() {
            return Err(CrawlError::Cancelled);
        }

        match operation().await {
            Ok(result) => {
                if attempts > 1 {
                    tracing::info!(
                        "Request succeeded on attempt {} after {} transient failures",
                        attempts,
                        attempts - 1
                    );
                }
                return Ok(result);
            }
            Err(CrawlError::Cancelled) => return Err(CrawlError::Cancelled),
            Err(error) if !error.is_transient() => return Err(error),
            Err(error) => {
                if attempts >= config.max_attempts {
                    tracing::warn!("Request failed after {} attempts: {}", attempts, error);
                    return Err(CrawlError::RetryExhausted {
                        attempts,
                        last: Box::new(error),
                    });
                }

                let delay = config.backoff(attempts) + config.jitter();
                tracing::debug!(
                    "Transient error on attempt {}: {}, retrying in {:?}",
                    attempts,
                    error,
                    delay
                );
                on_retry(attempts, delay, &error);

                tokio::select! {
                    _ = cancel.cancelled() => return Err(CrawlError::Cancelled),
                    _ = sleeper.sleep(delay) => {}
                }
            }
        }
    }
}
