//! Interfaces of the stages that consume harvested records.
//!
//! Text extraction and opinion scoring live outside the crawler; the crawler
//! never initializes them. [`score_record`] glues the two together for one
//! record and folds every failure into [`OPINION_FAILURE`].

mod pdf;

pub use pdf::PdfTextExtractor;

use std::path::PathBuf;
use thiserror::Error;

use crate::models::EprintRecord;

/// Score recorded for e-prints whose text could not be obtained
pub const OPINION_FAILURE: f64 = -5.0;

/// Errors that can occur during text extraction
#[derive(Debug, Error)]
pub enum ExtractionError {
    #[error("File not found: {}", .0.display())]
    NotFound(PathBuf),

    #[error("Failed to extract text from PDF: {0}")]
    Failed(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Turns a mirror-relative storage path into plain text
pub trait TextExtractor: Send + Sync {
    fn extract(&self, storage_path: &str) -> Result<String, ExtractionError>;
}

/// Scores a text; returns [`OPINION_FAILURE`] when it cannot
pub trait OpinionScorer: Send + Sync {
    fn score(&self, text: &str) -> f64;
}

/// Opinion score of one record's full text
pub fn score_record(
    extractor: &dyn TextExtractor,
    scorer: &dyn OpinionScorer,
    record: &EprintRecord,
) -> f64 {
    match extractor.extract(&record.storage_path) {
        Ok(text) => scorer.score(&text),
        Err(e) => {
            tracing::warn!(id = %record.versioned_id(), error = %e, "no text for e-print");
            OPINION_FAILURE
        }
    }
}
