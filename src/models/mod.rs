//! Core data models for search requests and harvested records.

mod record;
mod search;

pub use record::{EprintRecord, RawEntry};
pub use search::{
    category_query, KeywordFilter, SearchParameters, SortBy, SortOrder, DEFAULT_PAGE_SIZE,
};
