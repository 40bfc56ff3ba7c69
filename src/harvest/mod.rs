//! Harvest of a whole list of categories.
//!
//! Every category gets one unfiltered session and, unless disabled, one
//! keyword-filtered session. Artifacts land in two dated folders under the
//! output root. All sessions share one [`QueryClient`], so pacing holds even
//! when several sessions are in flight.

use chrono::NaiveDate;
use futures_util::stream::{self, StreamExt};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::crawler::{
    output_file_name, CrawlError, CrawlSession, DriverConfig, EventSink, QueryClient,
    TracingEvents,
};
use crate::models::KeywordFilter;
use crate::output::CsvSink;

/// Column of the categories file holding category codes
pub const CATEGORY_COLUMN: &str = "CRTC";

/// Read category codes from a `;`-separated file with a `CRTC` column
pub fn load_categories(path: &Path) -> Result<Vec<String>, CrawlError> {
    let mut reader = csv::ReaderBuilder::new()
        .delimiter(b';')
        .flexible(true)
        .trim(csv::Trim::All)
        .from_path(path)
        .map_err(|e| {
            CrawlError::InvalidCategories(format!("cannot read {}: {}", path.display(), e))
        })?;

    let column = reader
        .headers()?
        .iter()
        .position(|h| h.trim_start_matches('\u{feff}') == CATEGORY_COLUMN)
        .ok_or_else(|| {
            CrawlError::InvalidCategories(format!(
                "{} has no {} column",
                path.display(),
                CATEGORY_COLUMN
            ))
        })?;

    let mut categories = Vec::new();
    for row in reader.records() {
        let row = row?;
        if let Some(value) = row.get(column).filter(|v| !v.is_empty()) {
            categories.push(value.to_string());
        }
    }

    if categories.is_empty() {
        return Err(CrawlError::InvalidCategories(format!(
            "{} lists no categories",
            path.display()
        )));
    }
    Ok(categories)
}

/// Output folders of one harvest run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HarvestLayout {
    pub plain_dir: PathBuf,
    pub filtered_dir: PathBuf,
}

impl HarvestLayout {
    /// `query_e-prints_{date}` and `{label}_e_prints_{date}` under `root`
    pub fn dated(root: &Path, filter: &KeywordFilter, date: NaiveDate) -> Self {
        let stamp = date.format("%Y_%m_%d");
        Self {
            plain_dir: root.join(format!("query_e-prints_{}", stamp)),
            filtered_dir: root.join(format!("{}_e_prints_{}", filter.label, stamp)),
        }
    }

    /// Artifact path for a session
    pub fn artifact(&self, category: &str, filter: Option<&KeywordFilter>) -> PathBuf {
        let dir = match filter {
            Some(_) => &self.filtered_dir,
            None => &self.plain_dir,
        };
        dir.join(output_file_name(category, filter))
    }
}

/// How one session ended
#[derive(Debug)]
pub enum SessionStatus {
    Completed { total: u64, retrieved: usize },
    Failed(CrawlError),
}

/// One session of a harvest
#[derive(Debug)]
pub struct SessionOutcome {
    pub category: String,
    pub filter_label: Option<String>,
    pub path: PathBuf,
    pub status: SessionStatus,
}

/// Result of a harvest run
#[derive(Debug, Default)]
pub struct HarvestSummary {
    pub outcomes: Vec<SessionOutcome>,
    /// The run was interrupted; sessions not listed never ran
    pub cancelled: bool,
}

impl HarvestSummary {
    pub fn completed(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|o| matches!(o.status, SessionStatus::Completed { .. }))
            .count()
    }

    pub fn failed(&self) -> usize {
        self.outcomes.len() - self.completed()
    }

    pub fn records(&self) -> usize {
        self.outcomes
            .iter()
            .map(|o| match o.status {
                SessionStatus::Completed { retrieved, .. } => retrieved,
                SessionStatus::Failed(_) => 0,
            })
            .sum()
    }
}

/// Runs the sessions of a category list
#[derive(Debug, Clone)]
pub struct Harvest {
    client: QueryClient,
    layout: HarvestLayout,
    filter: Option<KeywordFilter>,
    driver_config: DriverConfig,
    concurrency: usize,
    events: Arc<dyn EventSink>,
}

impl Harvest {
    /// Create a harvest writing into `layout`; `filter` of `None` skips the
    /// filtered sessions
    pub fn new(client: QueryClient, layout: HarvestLayout, filter: Option<KeywordFilter>) -> Self {
        Self {
            client,
            layout,
            filter,
            driver_config: DriverConfig::default(),
            concurrency: 1,
            events: Arc::new(TracingEvents),
        }
    }

    pub fn with_driver_config(mut self, config: DriverConfig) -> Self {
        self.driver_config = config;
        self
    }

    /// Sessions in flight at once (at least one)
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    pub fn with_events(mut self, events: Arc<dyn EventSink>) -> Self {
        self.events = events;
        self
    }

    /// Crawl every category, continuing past failed sessions
    pub async fn run(&self, categories: &[String]) -> Result<HarvestSummary, CrawlError> {
        std::fs::create_dir_all(&self.layout.plain_dir)?;
        if self.filter.is_some() {
            std::fs::create_dir_all(&self.layout.filtered_dir)?;
        }

        let jobs: Vec<(String, Option<KeywordFilter>)> = categories
            .iter()
            .flat_map(|category| {
                let filtered = self.filter.clone().map(|f| (category.clone(), Some(f)));
                std::iter::once((category.clone(), None)).chain(filtered)
            })
            .collect();

        tracing::info!(
            categories = categories.len(),
            sessions = jobs.len(),
            concurrency = self.concurrency,
            "starting harvest"
        );

        let mut pending = stream::iter(jobs)
            .map(|(category, filter)| self.run_session(category, filter))
            .buffer_unordered(self.concurrency);

        let mut summary = HarvestSummary::default();
        while let Some(outcome) = pending.next().await {
            let cancelled = matches!(outcome.status, SessionStatus::Failed(CrawlError::Cancelled));
            summary.outcomes.push(outcome);
            if cancelled {
                tracing::warn!("harvest cancelled");
                summary.cancelled = true;
                break;
            }
        }

        tracing::info!(
            completed = summary.completed(),
            failed = summary.failed(),
            records = summary.records(),
            "harvest finished"
        );
        Ok(summary)
    }

    async fn run_session(&self, category: String, filter: Option<KeywordFilter>) -> SessionOutcome {
        let path = self.layout.artifact(&category, filter.as_ref());
        let filter_label = filter.as_ref().map(|f| f.label.clone());
        let session = CrawlSession::new(
            category.clone(),
            filter,
            self.client.clone(),
            Arc::new(CsvSink::new(&path)),
        )
        .with_driver_config(self.driver_config)
        .with_events(self.events.clone());

        let status = match session.run().await {
            Ok(report) => {
                tracing::info!(
                    session = %session.label(),
                    retrieved = report.records.len(),
                    path = %path.display(),
                    "session completed"
                );
                SessionStatus::Completed {
                    total: report.total,
                    retrieved: report.records.len(),
                }
            }
            Err(e) => {
                if !matches!(e, CrawlError::Cancelled) {
                    tracing::error!(session = %session.label(), error = %e, "session failed");
                }
                SessionStatus::Failed(e)
            }
        };

        SessionOutcome {
            category,
            filter_label,
            path,
            status,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crawler::mock::MockTransport;
    use crate::utils::{RateGate, RecordingSleeper, RetryConfig};
    use tempfile::tempdir;

    fn client(transport: Arc<MockTransport>) -> QueryClient {
        QueryClient::new(transport)
            .with_gate(RateGate::unlimited())
            .with_retry(RetryConfig::default().max_attempts(2).without_jitter())
            .with_sleeper(Arc::new(RecordingSleeper::new()))
    }

    #[test]
    fn test_load_categories() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("crtc_info.csv");
        std::fs::write(
            &path,
            "CRTC;Name;Group\ncs.CR;Cryptography and Security;cs\n math.CO ;Combinatorics;math\n;;\n",
        )
        .unwrap();

        assert_eq!(load_categories(&path).unwrap(), vec!["cs.CR", "math.CO"]);
    }

    #[test]
    fn test_load_categories_requires_column() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("bad.csv");
        std::fs::write(&path, "code;name\ncs.CR;Security\n").unwrap();

        assert!(matches!(
            load_categories(&path),
            Err(CrawlError::InvalidCategories(_))
        ));
        assert!(matches!(
            load_categories(&dir.path().join("missing.csv")),
            Err(CrawlError::InvalidCategories(_))
        ));
    }

    #[test]
    fn test_dated_layout() {
        let date = NaiveDate::from_ymd_opt(2021, 11, 11).unwrap();
        let layout = HarvestLayout::dated(Path::new("data"), &KeywordFilter::cyber(), date);

        assert_eq!(layout.plain_dir, Path::new("data/query_e-prints_2021_11_11"));
        assert_eq!(layout.filtered_dir, Path::new("data/cyber_e_prints_2021_11_11"));
        assert_eq!(
            layout.artifact("cs.CR", Some(&KeywordFilter::cyber())),
            Path::new("data/cyber_e_prints_2021_11_11/cs.CR_cyber.csv")
        );
        assert_eq!(
            layout.artifact("cs.CR", None),
            Path::new("data/query_e-prints_2021_11_11/cs.CR.csv")
        );
    }

    #[tokio::test]
    async fn test_harvest_runs_plain_and_filtered_sessions() {
        let dir = tempdir().unwrap();
        let date = NaiveDate::from_ymd_opt(2021, 11, 11).unwrap();
        let layout = HarvestLayout::dated(dir.path(), &KeywordFilter::cyber(), date);
        let transport = Arc::new(MockTransport::new(12));
        let harvest = Harvest::new(
            client(transport.clone()),
            layout.clone(),
            Some(KeywordFilter::cyber()),
        );

        let summary = harvest
            .run(&["cs.CR".to_string(), "cs.LG".to_string()])
            .await
            .unwrap();

        assert_eq!(summary.outcomes.len(), 4);
        assert_eq!(summary.completed(), 4);
        assert_eq!(summary.records(), 48);
        assert!(!summary.cancelled);
        for (category, filter) in [
            ("cs.CR", None),
            ("cs.CR", Some(KeywordFilter::cyber())),
            ("cs.LG", None),
        ] {
            let path = layout.artifact(category, filter.as_ref());
            let rows = std::fs::read_to_string(&path).unwrap().lines().count();
            assert_eq!(rows, 13, "{}", path.display());
        }
    }

    #[tokio::test]
    async fn test_harvest_continues_after_failure() {
        let dir = tempdir().unwrap();
        let date = NaiveDate::from_ymd_opt(2021, 11, 11).unwrap();
        let layout = HarvestLayout::dated(dir.path(), &KeywordFilter::cyber(), date);
        // Too many results for every session
        let transport = Arc::new(MockTransport::new(0).reported_total(200_000));
        let harvest = Harvest::new(client(transport.clone()), layout, None).with_concurrency(2);

        let summary = harvest
            .run(&["cs.CR".to_string(), "cs.LG".to_string()])
            .await
            .unwrap();

        assert_eq!(summary.outcomes.len(), 2);
        assert_eq!(summary.failed(), 2);
        assert!(summary
            .outcomes
            .iter()
            .all(|o| matches!(o.status, SessionStatus::Failed(CrawlError::CapacityExceeded { .. }))));
    }

    #[tokio::test]
    async fn test_harvest_stops_when_cancelled() {
        let dir = tempdir().unwrap();
        let date = NaiveDate::from_ymd_opt(2021, 11, 11).unwrap();
        let layout = HarvestLayout::dated(dir.path(), &KeywordFilter::cyber(), date);
        let cancel = tokio_util::sync::CancellationToken::new();
        cancel.cancel();
        let transport = Arc::new(MockTransport::new(5));
        let harvest = Harvest::new(
            client(transport.clone()).with_cancellation(cancel),
            layout,
            Some(KeywordFilter::cyber()),
        );

        let summary = harvest
            .run(&["cs.CR".to_string(), "cs.LG".to_string()])
            .await
            .unwrap();

        assert!(summary.cancelled);
        assert_eq!(summary.outcomes.len(), 1);
        assert_eq!(transport.request_count(), 0);
    }
}
