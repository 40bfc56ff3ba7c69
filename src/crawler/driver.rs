//! One sort-direction pass over a query's result window.

use serde::{Deserialize, Serialize};
use std::sync::Arc;

use super::events::{CrawlEvent, EventSink};
use super::extract::extract;
use super::{CrawlError, QueryClient};
use crate::models::{EprintRecord, SearchParameters, SortOrder, DEFAULT_PAGE_SIZE};
use crate::output::RecordSink;

/// Consecutive empty pages tolerated before a pass is declared exhausted
pub const EMPTY_PAGE_LIMIT: u32 = 20;

/// What to do with an entry whose identifier cannot be parsed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParsePolicy {
    /// Fail the whole pass on the first bad entry
    #[default]
    Abort,
    /// Drop the entry, count it and continue
    Skip,
}

impl std::str::FromStr for ParsePolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "abort" => Ok(ParsePolicy::Abort),
            "skip" => Ok(ParsePolicy::Skip),
            other => Err(format!("unknown parse policy '{}'", other)),
        }
    }
}

/// Pagination settings
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DriverConfig {
    /// Records requested per page
    pub page_size: usize,
    /// Consecutive empty pages before giving up
    pub empty_page_limit: u32,
    /// Handling of unparseable entries
    pub parse_policy: ParsePolicy,
}

impl Default for DriverConfig {
    fn default() -> Self {
        Self {
            page_size: DEFAULT_PAGE_SIZE,
            empty_page_limit: EMPTY_PAGE_LIMIT,
            parse_policy: ParsePolicy::Abort,
        }
    }
}

/// Mutable state of one pass
#[derive(Debug, Clone)]
pub struct CrawlState {
    pub category: String,
    pub keyword_filter: Option<String>,
    /// Entries consumed so far; the next page starts here
    pub offset: usize,
    pub accumulated: Vec<EprintRecord>,
    pub consecutive_empty_pages: u32,
    pub sort_order: SortOrder,
}

impl CrawlState {
    fn new(
        category: &str,
        keyword_filter: Option<&str>,
        sort_order: SortOrder,
        empty_page_limit: u32,
    ) -> Self {
        Self {
            category: category.to_string(),
            keyword_filter: keyword_filter.map(str::to_string),
            offset: 0,
            accumulated: Vec::new(),
            consecutive_empty_pages: empty_page_limit,
            sort_order,
        }
    }

    fn label(&self) -> String {
        match &self.keyword_filter {
            Some(filter) => format!("{} [{}]", self.category, filter),
            None => self.category.clone(),
        }
    }
}

/// Counters of a finished pass
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PassStats {
    pub sort_order: SortOrder,
    pub target: usize,
    pub retrieved: usize,
    pub pages: usize,
    pub skipped: usize,
}

/// Records and counters of a finished pass
#[derive(Debug, Clone)]
pub struct PassResult {
    pub records: Vec<EprintRecord>,
    pub stats: PassStats,
}

/// Pages through one window until the target is met or the stream runs dry
#[derive(Debug)]
pub struct PaginationDriver<'a> {
    config: DriverConfig,
    sink: &'a dyn RecordSink,
    events: Arc<dyn EventSink>,
    category: String,
    keyword_filter: Option<String>,
}

impl<'a> PaginationDriver<'a> {
    /// Create a driver writing to `sink`
    pub fn new(
        config: DriverConfig,
        sink: &'a dyn RecordSink,
        events: Arc<dyn EventSink>,
        category: impl Into<String>,
        keyword_filter: Option<String>,
    ) -> Self {
        Self {
            config,
            sink,
            events,
            category: category.into(),
            keyword_filter,
        }
    }

    /// Run one pass.
    ///
    /// Pages start at offset 0 and advance by the number of entries actually
    /// received. After every page the sink is rewritten with `earlier`
    /// followed by everything accumulated in this pass.
    ///
    /// The pass ends once the offset reaches `target`. Entries dropped under
    /// [`ParsePolicy::Skip`] still advance the offset, so a successful pass
    /// can report `PassStats::retrieved` below `target`.
    pub async fn run(
        &self,
        client: &QueryClient,
        base: &SearchParameters,
        target: usize,
        earlier: &[EprintRecord],
    ) -> Result<PassResult, CrawlError> {
        let mut state = CrawlState::new(
            &self.category,
            self.keyword_filter.as_deref(),
            base.sort_order,
            self.config.empty_page_limit,
        );
        let session = state.label();
        let mut pages = 0;
        let mut skipped = 0;

        tracing::info!(
            session = %session,
            order = %state.sort_order,
            target,
            "starting pass"
        );

        while state.offset < target {
            let params = base
                .with_start(state.offset)
                .with_max_results(self.config.page_size);
            let feed = client.fetch_feed(&params).await?;
            let received = feed.entries.len();

            for entry in &feed.entries {
                match extract(entry) {
                    Ok(record) => state.accumulated.push(record),
                    Err(CrawlError::Parse { id_url, reason })
                        if self.config.parse_policy == ParsePolicy::Skip =>
                    {
                        skipped += 1;
                        self.events.emit(&CrawlEvent::EntrySkipped {
                            session: session.clone(),
                            id_url,
                            reason,
                        });
                    }
                    Err(e) => return Err(e),
                }
            }

            state.offset += received;
            if received == 0 {
                state.consecutive_empty_pages = state.consecutive_empty_pages.saturating_sub(1);
            } else {
                state.consecutive_empty_pages = self.config.empty_page_limit;
            }

            if client.is_cancelled() {
                return Err(CrawlError::Cancelled);
            }
            self.sink.write(&[earlier, &state.accumulated])?;
            pages += 1;

            self.events.emit(&CrawlEvent::PageFetched {
                session: session.clone(),
                order: state.sort_order,
                offset: params.start,
                received,
                accumulated: state.accumulated.len(),
                target,
            });

            if state.consecutive_empty_pages == 0 && state.offset < target {
                self.events.emit(&CrawlEvent::PassExhausted {
                    session: session.clone(),
                    order: state.sort_order,
                    retrieved: state.accumulated.len(),
                    target,
                });
                return Err(CrawlError::Exhausted {
                    retrieved: state.accumulated.len(),
                    target,
                });
            }
        }

        self.events.emit(&CrawlEvent::PassCompleted {
            session,
            order: state.sort_order,
            retrieved: state.accumulated.len(),
            target,
            skipped,
        });

        Ok(PassResult {
            stats: PassStats {
                sort_order: state.sort_order,
                target,
                retrieved: state.accumulated.len(),
                pages,
                skipped,
            },
            records: state.accumulated,
        })
    }
}
