//! Utility modules supporting the crawler.
//!
//! - [`HttpClient`]: reqwest client with the crate user agent and timeouts
//! - [`RateGate`]: process-wide politeness pacing shared by every session
//! - [`RetryConfig`] / [`with_retry`]: bounded retry with exponential backoff and jitter
//! - [`Sleeper`]: injectable wait used by the retry loop
//!
//! # Retry with Backoff
//!
//! ```rust,no_run
//! use arxiv_harvest::crawler::CrawlError;
//! use arxiv_harvest::utils::{with_retry, RetryConfig, TokioSleeper};
//! use tokio_util::sync::CancellationToken;
//!
//! # async fn fetch_data() -> Result<String, CrawlError> { Ok("data".to_string()) }
//! # #[tokio::main]
//! # async fn main() -> Result<(), CrawlError> {
//! let config = RetryConfig::default().max_attempts(3);
//! let cancel = CancellationToken::new();
//! let result = with_retry(&config, &TokioSleeper, &cancel, |_, _, _| {}, fetch_data).await?;
//! # Ok(())
//! # }
//! ```

mod http;
mod rate_limit;
mod retry;

pub use http::{default_user_agent, HttpClient, DEFAULT_TIMEOUT};
pub use rate_limit::{RateGate, POLITENESS_INTERVAL};
pub use retry::{with_retry, RecordingSleeper, RetryConfig, Sleeper, TokioSleeper};
