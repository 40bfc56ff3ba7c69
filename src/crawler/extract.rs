//! Turns decoded feed entries into [`EprintRecord`] values.
//!
//! The storage path and direct link derivations must stay byte-for-byte
//! stable: downstream stages resolve PDFs in the bulk mirror with them.

use chrono::{DateTime, Utc};
use regex::Regex;
use std::sync::OnceLock;
use url::Url;

use super::CrawlError;
use crate::models::{EprintRecord, RawEntry};

/// Category segment used by identifiers of the flat, pre-category layout
pub const LEGACY_SEGMENT: &str = "abs";

/// Mirror folder for identifiers using [`LEGACY_SEGMENT`]
const LEGACY_ROOT: &str = "arxiv";

/// Host prefix of the export mirror
const EXPORT_PREFIX: &str = "export.";

fn id_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    // scheme://host/.../{category segment}/{paper id}v{version}
    PATTERN.get_or_init(|| {
        Regex::new(r"^[A-Za-z][A-Za-z0-9+.-]*://[^/]+/(?:.*/)?([^/]+)/([^/]+)v(\d+)$")
            .expect("identifier pattern is valid")
    })
}

/// Parts of an identifier URL
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identifier<'a> {
    pub segment: &'a str,
    pub paper_id: &'a str,
    pub version: &'a str,
}

/// Split an identifier URL into category segment, paper id and version
pub fn parse_identifier(id_url: &str) -> Option<Identifier<'_>> {
    let caps = id_pattern().captures(id_url)?;
    Some(Identifier {
        segment: caps.get(1)?.as_str(),
        paper_id: caps.get(2)?.as_str(),
        version: caps.get(3)?.as_str(),
    })
}

/// Relative path of an e-print's PDF in the bulk mirror
///
/// ```
/// use arxiv_harvest::crawler::extract::storage_path;
///
/// assert_eq!(storage_path("2101.00001", "cs", "1"), "cs/pdf/2101/2101.00001v1.pdf");
/// assert_eq!(storage_path("0701.0001", "abs", "2"), "arxiv/pdf/0701/0701.0001v2.pdf");
/// ```
pub fn storage_path(paper_id: &str, segment: &str, version: &str) -> String {
    let prefix: String = paper_id.chars().take(4).collect();
    let root = if segment == LEGACY_SEGMENT {
        LEGACY_ROOT
    } else {
        segment
    };
    format!("{}/pdf/{}/{}v{}.pdf", root, prefix, paper_id, version)
}

/// Direct PDF link on the export mirror for an abstract-page link
///
/// `http://arxiv.org/abs/2101.00001v1` becomes
/// `http://export.arxiv.org/pdf/2101.00001v1.pdf`.
pub fn source_link(abstract_link: &str) -> Result<String, url::ParseError> {
    let mut url = Url::parse(abstract_link)?;
    let host = url
        .host_str()
        .ok_or(url::ParseError::EmptyHost)?
        .to_string();

    if !host.starts_with(EXPORT_PREFIX) {
        url.set_host(Some(&format!("{}{}", EXPORT_PREFIX, host)))?;
    }

    let segments: Vec<String> = url
        .path_segments()
        .map(|segments| {
            segments
                .map(|s| {
                    if s == "abs" {
                        "pdf".to_string()
                    } else {
                        s.to_string()
                    }
                })
                .collect()
        })
        .unwrap_or_default();
    url.set_path(&format!("/{}.pdf", segments.join("/")));

    Ok(url.to_string())
}

/// Validate an entry and build its record
pub fn extract(entry: &RawEntry) -> Result<EprintRecord, CrawlError> {
    let id_url = entry.id_url.trim();
    let parts = parse_identifier(id_url).ok_or_else(|| {
        parse_error(
            entry,
            "identifier does not look like scheme://host/.../{category}/{id}v{version}",
        )
    })?;

    if entry.primary_category.is_empty() {
        return Err(parse_error(entry, "missing primary category"));
    }

    let published = timestamp(entry, &entry.published, "published")?;
    let updated = timestamp(entry, &entry.updated, "updated")?;
    let link = source_link(entry.link.trim())
        .map_err(|e| parse_error(entry, &format!("unusable abstract link '{}': {}", entry.link, e)))?;

    Ok(EprintRecord {
        id: parts.paper_id.to_string(),
        version: parts.version.to_string(),
        published,
        updated,
        primary_category: entry.primary_category.clone(),
        all_categories: entry.categories.clone(),
        storage_path: storage_path(parts.paper_id, parts.segment, parts.version),
        source_link: link,
    })
}

fn timestamp(entry: &RawEntry, value: &str, field: &str) -> Result<DateTime<Utc>, CrawlError> {
    DateTime::parse_from_rfc3339(value.trim())
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| parse_error(entry, &format!("bad {} timestamp '{}': {}", field, value, e)))
}

fn parse_error(entry: &RawEntry, reason: &str) -> CrawlError {
    CrawlError::Parse {
        id_url: entry.id_url.clone(),
        reason: reason.to_string(),
    }
}
