//! Crawl of one category, optionally narrowed by a keyword filter.

use serde::Serialize;
use std::sync::Arc;

use super::driver::{DriverConfig, PaginationDriver, PassStats};
use super::events::{CrawlEvent, EventSink, TracingEvents};
use super::{CrawlError, QueryClient};
use crate::models::{category_query, EprintRecord, KeywordFilter, SearchParameters, SortOrder};
use crate::output::RecordSink;

/// Deepest offset the query API serves for one sort direction
pub const API_RESULT_CEILING: usize = 50_000;

/// Largest result set reachable by crawling both ends of the window
pub const DUAL_WINDOW_CEILING: u64 = 2 * API_RESULT_CEILING as u64;

/// One planned pass
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PassPlan {
    pub sort_order: SortOrder,
    pub target: usize,
}

/// How a result set is covered
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum Strategy {
    /// One ascending pass over the whole set
    Single { target: usize },
    /// Oldest records ascending, the remainder descending from the newest end
    Dual {
        ascending_target: usize,
        descending_target: usize,
    },
}

impl Strategy {
    /// Passes in execution order
    pub fn passes(&self) -> Vec<PassPlan> {
        match *self {
            Strategy::Single { target } => vec![PassPlan {
                sort_order: SortOrder::Ascending,
                target,
            }],
            Strategy::Dual {
                ascending_target,
                descending_target,
            } => vec![
                PassPlan {
                    sort_order: SortOrder::Ascending,
                    target: ascending_target,
                },
                PassPlan {
                    sort_order: SortOrder::Descending,
                    target: descending_target,
                },
            ],
        }
    }

    /// Records the plan expects to retrieve
    pub fn total(&self) -> usize {
        self.passes().iter().map(|p| p.target).sum()
    }
}

impl std::fmt::Display for Strategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Strategy::Single { target } => write!(f, "single ascending pass of {}", target),
            Strategy::Dual {
                ascending_target,
                descending_target,
            } => write!(
                f,
                "ascending pass of {} then descending pass of {}",
                ascending_target, descending_target
            ),
        }
    }
}

/// Choose the passes that cover `total` results
pub fn plan(total: u64) -> Result<Strategy, CrawlError> {
    if total > DUAL_WINDOW_CEILING {
        return Err(CrawlError::CapacityExceeded {
            total,
            ceiling: DUAL_WINDOW_CEILING,
        });
    }

    // Bounded by DUAL_WINDOW_CEILING, fits in usize
    let total = total as usize;
    if total <= API_RESULT_CEILING {
        Ok(Strategy::Single { target: total })
    } else {
        Ok(Strategy::Dual {
            ascending_target: API_RESULT_CEILING,
            descending_target: total - API_RESULT_CEILING,
        })
    }
}

/// Artifact file name, `{category}.csv` or `{category}_{label}.csv`
pub fn output_file_name(category: &str, filter: Option<&KeywordFilter>) -> String {
    match filter {
        Some(filter) => format!("{}_{}.csv", category, filter.label),
        None => format!("{}.csv", category),
    }
}

/// Outcome of a completed session
#[derive(Debug, Clone)]
pub struct SessionReport {
    pub category: String,
    pub filter_label: Option<String>,
    /// Count reported by the probe
    pub total: u64,
    pub strategy: Strategy,
    pub passes: Vec<PassStats>,
    /// All passes concatenated, in the order they were written
    pub records: Vec<EprintRecord>,
}

/// Probe, plan and run the passes for one category
#[derive(Debug)]
pub struct CrawlSession {
    category: String,
    filter: Option<KeywordFilter>,
    client: QueryClient,
    sink: Arc<dyn RecordSink>,
    driver_config: DriverConfig,
    events: Arc<dyn EventSink>,
}

impl CrawlSession {
    /// Create a session writing to `sink`
    pub fn new(
        category: impl Into<String>,
        filter: Option<KeywordFilter>,
        client: QueryClient,
        sink: Arc<dyn RecordSink>,
    ) -> Self {
        Self {
            category: category.into(),
            filter,
            client,
            sink,
            driver_config: DriverConfig::default(),
            events: Arc::new(TracingEvents),
        }
    }

    pub fn with_driver_config(mut self, config: DriverConfig) -> Self {
        self.driver_config = config;
        self
    }

    pub fn with_events(mut self, events: Arc<dyn EventSink>) -> Self {
        self.events = events;
        self
    }

    /// Name used in logs and events
    pub fn label(&self) -> String {
        match &self.filter {
            Some(filter) => format!("{} [{}]", self.category, filter.label),
            None => self.category.clone(),
        }
    }

    /// The `search_query` expression of this session
    pub fn search_query(&self) -> String {
        category_query(&self.category, self.filter.as_ref())
    }

    /// Ask the API how many results the query has
    pub async fn probe(&self) -> Result<u64, CrawlError> {
        let params = SearchParameters::new(self.search_query())
            .with_start(1)
            .with_max_results(0);
        let feed = self.client.fetch_feed(&params).await?;
        let total = feed.total_results.ok_or_else(|| {
            CrawlError::Decode("response carries no opensearch:totalResults".to_string())
        })?;

        self.events.emit(&CrawlEvent::ProbeCompleted {
            session: self.label(),
            total,
        });
        Ok(total)
    }

    /// Probe and plan without fetching any page
    pub async fn plan(&self) -> Result<(u64, Strategy), CrawlError> {
        let total = self.probe().await?;
        Ok((total, plan(total)?))
    }

    /// Run the whole session
    pub async fn run(&self) -> Result<SessionReport, CrawlError> {
        let (total, strategy) = self.plan().await?;
        tracing::info!(session = %self.label(), total, strategy = %strategy, "crawl planned");

        let driver = PaginationDriver::new(
            self.driver_config,
            self.sink.as_ref(),
            self.events.clone(),
            self.category.clone(),
            self.filter.as_ref().map(|f| f.label.clone()),
        );
        let base = SearchParameters::new(self.search_query())
            .with_max_results(self.driver_config.page_size);

        let mut records: Vec<EprintRecord> = Vec::new();
        let mut passes = Vec::new();
        for pass in strategy.passes() {
            let result = driver
                .run(
                    &self.client,
                    &base.with_order(pass.sort_order),
                    pass.target,
                    &records,
                )
                .await?;
            records.extend(result.records);
            passes.push(result.stats);
        }

        if records.is_empty() {
            // Nothing was paged; still leave an artifact behind
            self.sink.write(&[])?;
        }

        Ok(SessionReport {
            category: self.category.clone(),
            filter_label: self.filter.as_ref().map(|f| f.label.clone()),
            total,
            strategy,
            passes,
            records,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crawler::events::RecordingEvents;
    use crate::crawler::mock::{MockReply, MockTransport};
    use crate::output::MemorySink;
    use crate::utils::{RateGate, RecordingSleeper, RetryConfig};

    fn client(transport: Arc<MockTransport>) -> QueryClient {
        QueryClient::new(transport)
            .with_gate(RateGate::unlimited())
            .with_retry(RetryConfig::default().max_attempts(2).without_jitter())
            .with_sleeper(Arc::new(RecordingSleeper::new()))
    }

    #[test]
    fn test_plan_boundaries() {
        assert_eq!(plan(0).unwrap(), Strategy::Single { target: 0 });
        assert_eq!(plan(49_999).unwrap(), Strategy::Single { target: 49_999 });
        assert_eq!(plan(50_000).unwrap(), Strategy::Single { target: 50_000 });
        assert_eq!(
            plan(50_001).unwrap(),
            Strategy::Dual {
                ascending_target: 50_000,
                descending_target: 1
            }
        );
        assert_eq!(
            plan(100_000).unwrap(),
            Strategy::Dual {
                ascending_target: 50_000,
                descending_target: 50_000
            }
        );
        assert!(matches!(
            plan(100_001),
            Err(CrawlError::CapacityExceeded {
                total: 100_001,
                ceiling: 100_000
            })
        ));
    }

    #[test]
    fn test_strategy_passes() {
        let strategy = plan(70_000).unwrap();
        let passes = strategy.passes();
        assert_eq!(passes.len(), 2);
        assert_eq!(passes[0].sort_order, SortOrder::Ascending);
        assert_eq!(passes[1].sort_order, SortOrder::Descending);
        assert_eq!(passes[1].target, 20_000);
        assert_eq!(strategy.total(), 70_000);
    }

    #[test]
    fn test_output_file_name() {
        assert_eq!(output_file_name("cs.CR", None), "cs.CR.csv");
        assert_eq!(
            output_file_name("cs.CR", Some(&KeywordFilter::cyber())),
            "cs.CR_cyber.csv"
        );
    }

    #[tokio::test]
    async fn test_probe_request_shape() {
        let transport = Arc::new(MockTransport::new(0).reported_total(1234));
        let session = CrawlSession::new(
            "cs.CR",
            Some(KeywordFilter::cyber()),
            client(transport.clone()),
            Arc::new(MemorySink::new()),
        );

        assert_eq!(session.probe().await.unwrap(), 1234);

        let request = &transport.requests()[0];
        assert_eq!(request.start, 1);
        assert_eq!(request.max_results, 0);
        assert!(request.search_query.starts_with("cat:cs.CR AND (ti:secur* OR abs:secur*"));
    }

    #[tokio::test]
    async fn test_probe_malformed_body_exhausts_retries() {
        // An HTML body never decodes; retries run out
        let transport = Arc::new(MockTransport::new(0).fail_from(1, MockReply::Malformed));
        let session = CrawlSession::new(
            "cs.CR",
            None,
            client(transport.clone()),
            Arc::new(MemorySink::new()),
        );

        assert!(matches!(
            session.probe().await,
            Err(CrawlError::RetryExhausted { attempts: 2, .. })
        ));
    }

    #[tokio::test]
    async fn test_probe_feed_without_total_is_decode_error() {
        let transport = Arc::new(MockTransport::new(10).reply(1, MockReply::NoTotal));
        let session = CrawlSession::new(
            "cs.CR",
            None,
            client(transport.clone()),
            Arc::new(MemorySink::new()),
        );

        assert!(matches!(session.probe().await, Err(CrawlError::Decode(_))));
        assert_eq!(transport.request_count(), 1);
    }

    #[tokio::test]
    async fn test_capacity_exceeded_sends_no_page_request() {
        let transport = Arc::new(MockTransport::new(0).reported_total(100_001));
        let sink = Arc::new(MemorySink::new());
        let session = CrawlSession::new("math.CO", None, client(transport.clone()), sink.clone());

        let result = session.run().await;

        assert!(matches!(result, Err(CrawlError::CapacityExceeded { .. })));
        assert_eq!(transport.request_count(), 1);
        assert_eq!(sink.writes(), 0);
    }

    #[tokio::test]
    async fn test_zero_total_writes_empty_artifact() {
        let transport = Arc::new(MockTransport::new(0));
        let sink = Arc::new(MemorySink::new());
        let session = CrawlSession::new("q-fin.XX", None, client(transport.clone()), sink.clone());

        let report = session.run().await.unwrap();

        assert_eq!(report.total, 0);
        assert!(report.records.is_empty());
        assert_eq!(transport.request_count(), 1);
        assert_eq!(sink.writes(), 1);
        assert!(sink.is_empty());
    }

    #[tokio::test]
    async fn test_single_pass_session() {
        let transport = Arc::new(MockTransport::new(2_500));
        let sink = Arc::new(MemorySink::new());
        let events = Arc::new(RecordingEvents::new());
        let session = CrawlSession::new("cs.CR", None, client(transport.clone()), sink.clone())
            .with_events(events.clone());

        let report = session.run().await.unwrap();

        assert_eq!(report.strategy, Strategy::Single { target: 2_500 });
        assert_eq!(report.records.len(), 2_500);
        assert_eq!(report.passes.len(), 1);
        assert_eq!(report.passes[0].pages, 3);
        assert_eq!(sink.len(), 2_500);
        // probe + three pages
        assert_eq!(transport.request_count(), 4);
        assert!(matches!(
            events.events().first(),
            Some(CrawlEvent::ProbeCompleted { total: 2_500, .. })
        ));
    }
}
