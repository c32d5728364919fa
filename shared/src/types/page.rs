//! Filtering, pagination and HTTP envelope types

use crate::types::record::{DisplayRecord, QueryRecord};
use serde::{Deserialize, Serialize};

pub const DEFAULT_PER_PAGE: u32 = 20;
pub const MAX_PER_PAGE: u32 = 100;

/// Named filter selectable from the viewer
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FilterKind {
    #[default]
    All,
    Slow,
    Failed,
}

impl FilterKind {
    /// Lenient parse used by the gateway: anything unknown means no filter.
    pub fn parse_lenient(s: &str) -> Self {
        s.parse().unwrap_or_default()
    }

    /// Wire form; `All` is sent as an empty string.
    pub fn as_query_value(&self) -> &'static str {
        match self {
            FilterKind::All => "",
            FilterKind::Slow => "slow",
            FilterKind::Failed => "failed",
        }
    }
}

impl std::str::FromStr for FilterKind {
    type Err = crate::SharedError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "" | "all" => Ok(FilterKind::All),
            "slow" => Ok(FilterKind::Slow),
            "failed" => Ok(FilterKind::Failed),
            other => Err(crate::SharedError::InvalidFilter(other.to_string())),
        }
    }
}

impl std::fmt::Display for FilterKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FilterKind::All => write!(f, "all"),
            FilterKind::Slow => write!(f, "slow"),
            FilterKind::Failed => write!(f, "failed"),
        }
    }
}

/// Record filter; all present conditions must hold.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FilterCriteria {
    pub search: Option<String>,
    pub slow: bool,
    pub failed: bool,
}

impl FilterCriteria {
    /// Translate a viewer filter plus free-text search into criteria.
    pub fn from_request(filter: FilterKind, search: &str) -> Self {
        let search = search.trim();
        Self {
            search: (!search.is_empty()).then(|| search.to_string()),
            slow: filter == FilterKind::Slow,
            failed: filter == FilterKind::Failed,
        }
    }

    pub fn search(term: impl Into<String>) -> Self {
        Self {
            search: Some(term.into()),
            ..Self::default()
        }
    }

    /// True when matching needs the decoded record rather than the raw content.
    pub fn needs_post_filter(&self) -> bool {
        self.slow || self.failed
    }

    /// Case-insensitive substring match over an already-lowercased haystack.
    pub fn matches_search_text(&self, lowercase_haystack: &str) -> bool {
        match &self.search {
            Some(term) => lowercase_haystack.contains(&term.to_lowercase()),
            None => true,
        }
    }

    /// The `slow` / `failed` conditions.
    pub fn matches_post_filter(&self, record: &QueryRecord) -> bool {
        if self.slow && !record.is_slow() {
            return false;
        }
        if self.failed && !record.error {
            return false;
        }
        true
    }

    pub fn matches(&self, record: &QueryRecord) -> bool {
        self.matches_post_filter(record) && self.matches_search_text(&record.search_text())
    }
}

/// Clamped page coordinates
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageBounds {
    pub page: u32,
    pub per_page: u32,
}

impl PageBounds {
    /// Clamp `page >= 1` and `per_page` into `[1, MAX_PER_PAGE]`.
    pub fn clamp(page: i64, per_page: i64) -> Self {
        Self {
            page: page.clamp(1, u32::MAX as i64) as u32,
            per_page: per_page.clamp(1, MAX_PER_PAGE as i64) as u32,
        }
    }

    pub fn offset(&self) -> usize {
        (self.page as usize - 1) * self.per_page as usize
    }
}

/// One page of results plus pagination math
#[derive(Debug, Clone, PartialEq)]
pub struct Page<T> {
    pub records: Vec<T>,
    pub page: u32,
    pub per_page: u32,
    pub total: u64,
    pub total_pages: u64,
    pub has_more: bool,
}

impl<T> Page<T> {
    pub fn new(records: Vec<T>, bounds: PageBounds, total: u64) -> Self {
        let total_pages = total.div_ceil(bounds.per_page as u64);
        Self {
            records,
            page: bounds.page,
            per_page: bounds.per_page,
            total,
            total_pages,
            has_more: (bounds.page as u64) < total_pages,
        }
    }
}

/// `GET /queries` response body
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryPageResponse {
    pub queries: Vec<DisplayRecord>,
    pub page: u32,
    pub per_page: u32,
    pub total: u64,
    pub total_pages: u64,
    pub has_more: bool,
    #[serde(default)]
    pub filter: String,
    #[serde(default)]
    pub search: String,
}

impl QueryPageResponse {
    pub fn from_page(page: Page<DisplayRecord>, filter: &str, search: &str) -> Self {
        Self {
            queries: page.records,
            page: page.page,
            per_page: page.per_page,
            total: page.total,
            total_pages: page.total_pages,
            has_more: page.has_more,
            filter: filter.to_string(),
            search: search.to_string(),
        }
    }
}

/// `POST /queries/clear` success body
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClearResponse {
    pub success: bool,
    pub message: String,
    pub cleared: u64,
}

/// Error body shared by both endpoints
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub success: bool,
    pub error: String,
}

impl ErrorResponse {
    pub fn new(error: impl Into<String>) -> Self {
        Self {
            success: false,
            error: error.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pagination_math() {
        let bounds = PageBounds::clamp(1, 20);
        let first: Page<()> = Page::new(vec![], bounds, 45);
        assert_eq!(first.total_pages, 3);
        assert!(first.has_more);

        let second: Page<()> = Page::new(vec![], PageBounds::clamp(2, 20), 45);
        assert!(second.has_more);

        let third: Page<()> = Page::new(vec![], PageBounds::clamp(3, 20), 45);
        assert!(!third.has_more);
    }

    #[test]
    fn test_empty_total() {
        let page: Page<()> = Page::new(vec![], PageBounds::clamp(1, 20), 0);
        assert_eq!(page.total_pages, 0);
        assert!(!page.has_more);
    }

    #[test]
    fn test_clamp_bounds() {
        assert_eq!(PageBounds::clamp(0, 0), PageBounds { page: 1, per_page: 1 });
        assert_eq!(PageBounds::clamp(-4, 500), PageBounds { page: 1, per_page: 100 });
        assert_eq!(PageBounds::clamp(3, 20).offset(), 40);
    }

    #[test]
    fn test_filter_translation() {
        let criteria = FilterCriteria::from_request(FilterKind::Slow, "  users ");
        assert_eq!(criteria.search.as_deref(), Some("users"));
        assert!(criteria.slow);
        assert!(!criteria.failed);
        assert!(criteria.needs_post_filter());

        let none = FilterCriteria::from_request(FilterKind::All, "   ");
        assert_eq!(none, FilterCriteria::default());
    }

    #[test]
    fn test_filter_kind_parse() {
        assert_eq!(FilterKind::parse_lenient("slow"), FilterKind::Slow);
        assert_eq!(FilterKind::parse_lenient("FAILED"), FilterKind::Failed);
        assert_eq!(FilterKind::parse_lenient(""), FilterKind::All);
        assert_eq!(FilterKind::parse_lenient("bogus"), FilterKind::All);
        assert!("bogus".parse::<FilterKind>().is_err());
    }

    #[test]
    fn test_search_is_case_insensitive() {
        let criteria = FilterCriteria::search("USERS");
        assert!(criteria.matches_search_text("select * from users"));
        assert!(!criteria.matches_search_text("select * from orders"));
    }
}
