//! # arxiv-harvest
//!
//! Harvests e-print metadata from the arXiv query API, one category at a
//! time, into CSV datasets for later merge and analysis.
//!
//! ## Architecture
//!
//! The library is organized into several modules:
//!
//! - [`models`]: Search parameters, keyword filters and harvested records
//! - [`crawler`]: Query client, feed decoding, pagination and crawl sessions
//! - [`harvest`]: Runs the sessions of a whole category list
//! - [`output`]: CSV persistence of harvested records
//! - [`pipeline`]: Interfaces of the text extraction and scoring stages
//! - [`utils`]: HTTP client, retry and rate limiting
//! - [`config`]: Configuration management
//! - [`ui`]: Terminal progress

pub mod config;
pub mod crawler;
pub mod harvest;
pub mod models;
pub mod output;
pub mod pipeline;
pub mod ui;
pub mod utils;

// Re-export commonly used types
pub use crawler::{CrawlError, CrawlSession, QueryClient};
pub use models::{EprintRecord, KeywordFilter};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
