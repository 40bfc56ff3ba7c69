//! E-print records as decoded from the feed and as written to the dataset.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One `<entry>` of a feed page, exactly as it appeared in the document.
///
/// Nothing here is validated; [`crate::crawler::extract`] turns it into an
/// [`EprintRecord`] or rejects it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawEntry {
    /// Identifier URL, e.g. `http://arxiv.org/abs/2101.00001v1`
    pub id_url: String,

    /// First-version submission timestamp
    pub published: String,

    /// Latest-version timestamp
    pub updated: String,

    /// Term of `arxiv:primary_category`
    pub primary_category: String,

    /// Terms of every `category` element, in document order
    pub categories: Vec<String>,

    /// Abstract page link
    pub link: String,
}

/// A harvested e-print.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EprintRecord {
    /// Paper identifier without version, e.g. `2101.00001`
    pub id: String,

    /// Version number as it appears after the `v`
    pub version: String,

    /// First-version submission time
    pub published: DateTime<Utc>,

    /// Latest-version time
    pub updated: DateTime<Utc>,

    /// Primary subject category
    pub primary_category: String,

    /// Every category the e-print is filed under
    pub all_categories: Vec<String>,

    /// Relative path of the PDF in the bulk mirror
    pub storage_path: String,

    /// Direct PDF link on the export mirror
    pub source_link: String,
}

impl EprintRecord {
    /// Identifier with version suffix, e.g. `2101.00001v1`
    pub fn versioned_id(&self) -> String {
        format!("{}v{}", self.id, self.version)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_versioned_id() {
        let when = Utc.with_ymd_and_hms(2021, 1, 1, 0, 0, 0).unwrap();
        let record = EprintRecord {
            id: "2101.00001".to_string(),
            version: "3".to_string(),
            published: when,
            updated: when,
            primary_category: "cs.CR".to_string(),
            all_categories: vec!["cs.CR".to_string()],
            storage_path: "cs/pdf/2101/2101.00001v3.pdf".to_string(),
            source_link: "http://export.arxiv.org/pdf/2101.00001v3.pdf".to_string(),
        };

        assert_eq!(record.versioned_id(), "2101.00001v3");
    }
}
