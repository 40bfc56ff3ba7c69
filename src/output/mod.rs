//! Persistence of harvested records.
//!
//! The artifact is a CSV file with a leading unnamed row-index column followed
//! by `id, published, updated, version, primary_category, all_categories,
//! arxiv_path, http_link`. Downstream merge and analysis stages read it by
//! column name, so the header and value formats are fixed.

use chrono::SecondsFormat;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use crate::crawler::CrawlError;
use crate::models::EprintRecord;

/// Header row of the artifact
pub const HEADER: [&str; 9] = [
    "",
    "id",
    "published",
    "updated",
    "version",
    "primary_category",
    "all_categories",
    "arxiv_path",
    "http_link",
];

/// Destination for the records of a session.
///
/// Every call replaces the previous content with the concatenation of
/// `batches`; nothing is appended.
pub trait RecordSink: Send + Sync + std::fmt::Debug {
    fn write(&self, batches: &[&[EprintRecord]]) -> Result<(), CrawlError>;
}

/// Writes the artifact as CSV, replacing the file atomically
#[derive(Debug, Clone)]
pub struct CsvSink {
    path: PathBuf,
}

impl CsvSink {
    /// Create a sink for `path`; parent directories are created on first write
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// File this sink writes
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl RecordSink for CsvSink {
    fn write(&self, batches: &[&[EprintRecord]]) -> Result<(), CrawlError> {
        let dir = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };
        std::fs::create_dir_all(&dir)?;

        let mut staging = tempfile::NamedTempFile::new_in(&dir)?;
        {
            let mut writer = csv::Writer::from_writer(staging.as_file_mut());
            writer.write_record(HEADER)?;
            for (index, record) in batches.iter().flat_map(|batch| batch.iter()).enumerate() {
                writer.write_record(row(index, record))?;
            }
            writer.flush()?;
        }
        staging.as_file().sync_all()?;
        staging
            .persist(&self.path)
            .map_err(|e| CrawlError::Io(e.error))?;

        tracing::debug!(path = %self.path.display(), "artifact written");
        Ok(())
    }
}

/// CSV row for one record
pub fn row(index: usize, record: &EprintRecord) -> [String; 9] {
    [
        index.to_string(),
        record.id.clone(),
        record.published.to_rfc3339_opts(SecondsFormat::Secs, true),
        record.updated.to_rfc3339_opts(SecondsFormat::Secs, true),
        record.version.clone(),
        record.primary_category.clone(),
        format_categories(&record.all_categories),
        record.storage_path.clone(),
        record.source_link.clone(),
    ]
}

/// Render categories as a list literal, e.g. `['cs.CR', 'cs.LG']`
pub fn format_categories(categories: &[String]) -> String {
    let quoted = categories
        .iter()
        .map(|c| format!("'{}'", c.replace('\\', "\\\\").replace('\'', "\\'")))
        .collect::<Vec<_>>()
        .join(", ");
    format!("[{}]", quoted)
}

/// Keeps the last written content in memory
#[derive(Debug, Default)]
pub struct MemorySink {
    state: Mutex<MemoryState>,
}

#[derive(Debug, Default)]
struct MemoryState {
    last: Vec<EprintRecord>,
    writes: usize,
}

impl MemorySink {
    /// Create an empty sink
    pub fn new() -> Self {
        Self::default()
    }

    /// Content of the last write
    pub fn records(&self) -> Vec<EprintRecord> {
        self.state
            .lock()
            .map(|s| s.last.clone())
            .unwrap_or_default()
    }

    /// Number of records in the last write
    pub fn len(&self) -> usize {
        self.state.lock().map(|s| s.last.len()).unwrap_or_default()
    }

    /// Whether the last write was empty (or nothing was written)
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of writes so far
    pub fn writes(&self) -> usize {
        self.state.lock().map(|s| s.writes).unwrap_or_default()
    }
}

impl RecordSink for MemorySink {
    fn write(&self, batches: &[&[EprintRecord]]) -> Result<(), CrawlError> {
        let mut state = self
            .state
            .lock()
            .map_err(|_| CrawlError::Io(std::io::Error::other("memory sink poisoned")))?;
        state.last = batches.iter().flat_map(|b| b.iter().cloned()).collect();
        state.writes += 1;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use tempfile::tempdir;

    fn record(id: &str) -> EprintRecord {
        let published = Utc.with_ymd_and_hms(2021, 1, 1, 9, 30, 0).unwrap();
        EprintRecord {
            id: id.to_string(),
            version: "1".to_string(),
            published,
            updated: published,
            primary_category: "cs.CR".to_string(),
            all_categories: vec!["cs.CR".to_string(), "cs.LG".to_string()],
            storage_path: format!("arxiv/pdf/{}/{}v1.pdf", &id[..4], id),
            source_link: format!("http://export.arxiv.org/pdf/{}v1.pdf", id),
        }
    }

    #[test]
    fn test_format_categories() {
        assert_eq!(
            format_categories(&["cs.CR".to_string(), "cs.LG".to_string()]),
            "['cs.CR', 'cs.LG']"
        );
        assert_eq!(format_categories(&[]), "[]");
    }

    #[test]
    fn test_csv_layout() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join("cs.CR.csv");
        let sink = CsvSink::new(&path);

        sink.write(&[&[record("2101.00001")], &[record("2101.00002")]])
            .unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(
            lines[0],
            ",id,published,updated,version,primary_category,all_categories,arxiv_path,http_link"
        );
        assert_eq!(
            lines[1],
            "0,2101.00001,2021-01-01T09:30:00Z,2021-01-01T09:30:00Z,1,cs.CR,\"['cs.CR', 'cs.LG']\",arxiv/pdf/2101/2101.00001v1.pdf,http://export.arxiv.org/pdf/2101.00001v1.pdf"
        );
        assert!(lines[2].starts_with("1,2101.00002,"));
        assert_eq!(lines.len(), 3);
    }

    #[test]
    fn test_csv_write_overwrites() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("cs.CR.csv");
        let sink = CsvSink::new(&path);

        sink.write(&[&[record("2101.00001"), record("2101.00002")]])
            .unwrap();
        sink.write(&[&[record("2101.00003")]]).unwrap();

        let mut reader = csv::Reader::from_path(&path).unwrap();
        let ids: Vec<String> = reader
            .records()
            .map(|r| r.unwrap()[1].to_string())
            .collect();
        assert_eq!(ids, vec!["2101.00003"]);
    }

    #[test]
    fn test_empty_write_leaves_header_only() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("empty.csv");
        CsvSink::new(&path).write(&[]).unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        assert_eq!(content.lines().count(), 1);
    }

    #[test]
    fn test_memory_sink() {
        let sink = MemorySink::new();
        sink.write(&[&[record("2101.00001")], &[record("2101.00002")]])
            .unwrap();
        sink.write(&[&[record("2101.00003")]]).unwrap();

        assert_eq!(sink.writes(), 2);
        assert_eq!(sink.len(), 1);
        assert_eq!(sink.records()[0].id, "2101.00003");
    }
}
