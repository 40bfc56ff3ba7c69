//! The category crawler.
//!
//! A crawl is layered bottom-up:
//!
//! - [`QueryClient`]: one request per attempt, bounded retry with backoff,
//!   politeness pacing through a shared [`RateGate`](crate::utils::RateGate)
//! - [`feed`]: Atom response body to [`RawEntry`](crate::models::RawEntry) values
//! - [`extract`]: `RawEntry` to [`EprintRecord`](crate::models::EprintRecord)
//! - [`PaginationDriver`]: one sort-direction pass over the result window
//! - [`CrawlSession`]: probe, plan and run the passes for one category
//!
//! Every page is written to the [`RecordSink`](crate::output::RecordSink)
//! as soon as it is fetched, so an interrupted crawl leaves the last complete
//! page on disk.

mod client;
mod driver;
pub mod events;
pub mod extract;
pub mod feed;
pub mod mock;
mod session;

pub use client::{HttpTransport, QueryClient, RawResponse, Transport, ARXIV_API_URL};
pub use driver::{
    CrawlState, DriverConfig, PaginationDriver, ParsePolicy, PassResult, PassStats,
    EMPTY_PAGE_LIMIT,
};
pub use events::{CrawlEvent, EventSink, RecordingEvents, TracingEvents};
pub use feed::Feed;
pub use session::{
    output_file_name, plan, CrawlSession, PassPlan, SessionReport, Strategy, API_RESULT_CEILING,
    DUAL_WINDOW_CEILING,
};

/// Errors that can occur while crawling
#[derive(Debug, thiserror::Error)]
pub enum CrawlError {
    /// Connection-level failure
    #[error("Network error: {0}")]
    Network(String),

    /// A single request exceeded the per-call timeout
    #[error("Request timed out")]
    Timeout,

    /// The API answered with a non-success status
    #[error("API returned HTTP {status}")]
    Http { status: u16 },

    /// The response body is not a well-formed feed
    #[error("Decode error: {0}")]
    Decode(String),

    /// One entry's identifier or fields do not have the expected structure
    #[error("Parse error for '{id_url}': {reason}")]
    Parse { id_url: String, reason: String },

    /// A transient failure persisted past the retry bound
    #[error("Giving up after {attempts} attempts: {last}")]
    RetryExhausted { attempts: u32, last: Box<CrawlError> },

    /// Too many consecutive empty pages before the target was reached
    #[error("Result stream exhausted after {retrieved} of {target} records")]
    Exhausted { retrieved: usize, target: usize },

    /// The category is larger than two opposite-sorted windows can cover
    #[error("{total} results exceed the {ceiling} reachable with two sorted windows")]
    CapacityExceeded { total: u64, ceiling: u64 },

    /// The operator interrupted the crawl
    #[error("Crawl cancelled")]
    Cancelled,

    /// IO error (file system)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// CSV encoding error
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// The categories list could not be used
    #[error("Invalid categories file: {0}")]
    InvalidCategories(String),
}

impl CrawlError {
    /// Whether retrying the same request may succeed
    pub fn is_transient(&self) -> bool {
        match self {
            CrawlError::Network(_) | CrawlError::Timeout | CrawlError::Decode(_) => true,
            CrawlError::Http { status } => *status == 429 || (500..600).contains(status),
            _ => false,
        }
    }
}

impl From<reqwest::Error> for CrawlError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            CrawlError::Timeout
        } else if let Some(status) = err.status() {
            CrawlError::Http {
                status: status.as_u16(),
            }
        } else {
            CrawlError::Network(err.to_string())
        }
    }
}

impl From<quick_xml::Error> for CrawlError {
    fn from(err: quick_xml::Error) -> Self {
        CrawlError::Decode(format!("XML: {}", err))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_classification() {
        assert!(CrawlError::Network("connection reset".into()).is_transient());
        assert!(CrawlError::Timeout.is_transient());
        assert!(CrawlError::Decode("truncated".into()).is_transient());
        assert!(CrawlError::Http { status: 503 }.is_transient());
        assert!(CrawlError::Http { status: 429 }.is_transient());

        assert!(!CrawlError::Http { status: 400 }.is_transient());
        assert!(!CrawlError::Cancelled.is_transient());
        assert!(!CrawlError::Parse {
            id_url: "x".into(),
            reason: "y".into()
        }
        .is_transient());
        assert!(!CrawlError::CapacityExceeded {
            total: 1,
            ceiling: 0
        }
        .is_transient());
    }

    #[test]
    fn test_exhausted_message_is_distinct() {
        let err = CrawlError::Exhausted {
            retrieved: 3000,
            target: 5000,
        };
        assert_eq!(
            err.to_string(),
            "Result stream exhausted after 3000 of 5000 records"
        );
    }
}
