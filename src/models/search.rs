//! Search request models for the arXiv query API.

use serde::{Deserialize, Serialize};

/// Number of records requested per page.
pub const DEFAULT_PAGE_SIZE: usize = 1000;

/// Sort order for search results
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    Ascending,
    Descending,
}

impl SortOrder {
    /// Value sent as the `sortOrder` query parameter
    pub fn as_str(&self) -> &'static str {
        match self {
            SortOrder::Ascending => "ascending",
            SortOrder::Descending => "descending",
        }
    }

    /// The opposite direction
    pub fn reversed(&self) -> Self {
        match self {
            SortOrder::Ascending => SortOrder::Descending,
            SortOrder::Descending => SortOrder::Ascending,
        }
    }
}

impl std::fmt::Display for SortOrder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Sort field for search results
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SortBy {
    SubmittedDate,
}

impl SortBy {
    /// Value sent as the `sortBy` query parameter
    pub fn as_str(&self) -> &'static str {
        match self {
            SortBy::SubmittedDate => "submittedDate",
        }
    }
}

/// Parameters of one request against the query API.
///
/// Values are never mutated after construction: every page or retry derives
/// its own copy through the `with_*` methods.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchParameters {
    /// Full `search_query` expression, e.g. `cat:cs.CR`
    pub search_query: String,

    /// Offset of the first result
    pub start: usize,

    /// Page size; zero only for count probes
    pub max_results: usize,

    /// Sort field
    pub sort_by: SortBy,

    /// Sort direction
    pub sort_order: SortOrder,
}

impl SearchParameters {
    /// Create parameters for a query, ascending by submission date
    pub fn new(search_query: impl Into<String>) -> Self {
        Self {
            search_query: search_query.into(),
            start: 0,
            max_results: DEFAULT_PAGE_SIZE,
            sort_by: SortBy::SubmittedDate,
            sort_order: SortOrder::Ascending,
        }
    }

    /// Copy with a different offset
    pub fn with_start(&self, start: usize) -> Self {
        Self {
            start,
            ..self.clone()
        }
    }

    /// Copy with a different page size
    pub fn with_max_results(&self, max_results: usize) -> Self {
        Self {
            max_results,
            ..self.clone()
        }
    }

    /// Copy with a different sort direction
    pub fn with_order(&self, sort_order: SortOrder) -> Self {
        Self {
            sort_order,
            ..self.clone()
        }
    }

    /// Query string pairs in the order the API documents them
    pub fn query_pairs(&self) -> [(&'static str, String); 5] {
        [
            ("search_query", self.search_query.clone()),
            ("start", self.start.to_string()),
            ("max_results", self.max_results.to_string()),
            ("sortBy", self.sort_by.as_str().to_string()),
            ("sortOrder", self.sort_order.as_str().to_string()),
        ]
    }
}

/// A title/abstract keyword filter ANDed onto a category query.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeywordFilter {
    /// Short name used in output file and folder names
    pub label: String,

    /// Terms matched against title and abstract; `*` wildcards allowed
    pub keywords: Vec<String>,
}

impl KeywordFilter {
    /// Create a new filter
    pub fn new(label: impl Into<String>, keywords: Vec<String>) -> Self {
        Self {
            label: label.into(),
            keywords,
        }
    }

    /// The security-considerations filter used for the default harvest
    pub fn cyber() -> Self {
        Self::new(
            "cyber",
            [
                "secur*",
                "safe*",
                "reliability",
                "dependability",
                "confidentiality",
                "integrity",
                "availability",
                "defen*",
                "priva*",
            ]
            .iter()
            .map(|k| k.to_string())
            .collect(),
        )
    }

    /// Render as a parenthesized OR block, `(ti:k OR abs:k OR ...)`
    pub fn to_query(&self) -> String {
        let clauses = self
            .keywords
            .iter()
            .map(|k| format!("ti:{} OR abs:{}", k, k))
            .collect::<Vec<_>>()
            .join(" OR ");
        format!("({})", clauses)
    }
}

impl Default for KeywordFilter {
    fn default() -> Self {
        Self::cyber()
    }
}

/// Build the `search_query` expression for a category, optionally filtered
pub fn category_query(category: &str, filter: Option<&KeywordFilter>) -> String {
    match filter {
        Some(filter) if !filter.keywords.is_empty() => {
            format!("cat:{} AND {}", category, filter.to_query())
        }
        _ => format!("cat:{}", category),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_with_start_leaves_original_untouched() {
        let base = SearchParameters::new("cat:cs.CR");
        let next = base.with_start(2000);

        assert_eq!(base.start, 0);
        assert_eq!(next.start, 2000);
        assert_eq!(next.search_query, base.search_query);
        assert_eq!(next.max_results, DEFAULT_PAGE_SIZE);
    }

    #[test]
    fn test_with_order() {
        let base = SearchParameters::new("cat:cs.CR");
        let reversed = base.with_order(base.sort_order.reversed());

        assert_eq!(base.sort_order, SortOrder::Ascending);
        assert_eq!(reversed.sort_order, SortOrder::Descending);
    }

    #[test]
    fn test_query_pairs() {
        let params = SearchParameters::new("cat:math.GT")
            .with_start(3000)
            .with_order(SortOrder::Descending);
        let pairs = params.query_pairs();

        assert_eq!(pairs[0], ("search_query", "cat:math.GT".to_string()));
        assert_eq!(pairs[1], ("start", "3000".to_string()));
        assert_eq!(pairs[2], ("max_results", "1000".to_string()));
        assert_eq!(pairs[3], ("sortBy", "submittedDate".to_string()));
        assert_eq!(pairs[4], ("sortOrder", "descending".to_string()));
    }

    #[test]
    fn test_category_query_plain() {
        assert_eq!(category_query("cs.CR", None), "cat:cs.CR");
    }

    #[test]
    fn test_category_query_filtered() {
        let filter = KeywordFilter::new("sec", vec!["secur*".into(), "priva*".into()]);
        assert_eq!(
            category_query("cs.CR", Some(&filter)),
            "cat:cs.CR AND (ti:secur* OR abs:secur* OR ti:priva* OR abs:priva*)"
        );
    }

    #[test]
    fn test_empty_filter_falls_back_to_plain_query() {
        let filter = KeywordFilter::new("none", Vec::new());
        assert_eq!(category_query("cs.CR", Some(&filter)), "cat:cs.CR");
    }

    #[test]
    fn test_cyber_filter() {
        let filter = KeywordFilter::cyber();
        assert_eq!(filter.label, "cyber");
        assert_eq!(filter.keywords.len(), 9);
        assert!(filter.to_query().starts_with("(ti:secur* OR abs:secur*"));
        assert!(filter.to_query().ends_with("ti:priva* OR abs:priva*)"));
    }
}
