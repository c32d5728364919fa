//! Query gateway: request parameters in, response envelopes out
//!
//! Transport-agnostic. The HTTP layer parses the query string into a
//! [`PageQuery`] and serializes whatever comes back.

use crate::storage::{QueryStore, StorageBackend, StorageError};
use lens_shared::types::page::{
    ClearResponse, FilterCriteria, FilterKind, QueryPageResponse, DEFAULT_PER_PAGE,
};
use std::sync::Arc;
use tracing::{error, info};

#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    #[error("Database unavailable or logs table missing.")]
    Unavailable(#[source] StorageError),

    #[error("Failed to clear queries: {0}")]
    ClearFailed(#[source] StorageError),
}

/// Raw page request, before clamping and filter translation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageQuery {
    pub page: i64,
    pub per_page: i64,
    pub filter: String,
    pub search: String,
}

impl Default for PageQuery {
    fn default() -> Self {
        Self {
            page: 1,
            per_page: DEFAULT_PER_PAGE as i64,
            filter: String::new(),
            search: String::new(),
        }
    }
}

#[derive(Clone)]
pub struct QueryGateway {
    store: Arc<StorageBackend>,
}

impl QueryGateway {
    pub fn new(store: Arc<StorageBackend>) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &Arc<StorageBackend> {
        &self.store
    }

    pub fn get_page(&self, query: &PageQuery) -> Result<QueryPageResponse, GatewayError> {
        let filter = FilterKind::parse_lenient(&query.filter);
        let search = query.search.trim();
        let criteria = FilterCriteria::from_request(filter, search);

        let page = self
            .store
            .get_page(query.page, query.per_page, &criteria)
            .map_err(|e| {
                error!("Failed to load queries: {}", e);
                GatewayError::Unavailable(e)
            })?;

        Ok(QueryPageResponse::from_page(
            page,
            filter.as_query_value(),
            search,
        ))
    }

    pub fn clear(&self) -> Result<ClearResponse, GatewayError> {
        let cleared = self.store.clear().map_err(|e| {
            error!("Failed to clear queries: {}", e);
            GatewayError::ClearFailed(e)
        })?;
        info!("Cleared {} captured queries", cleared);

        Ok(ClearResponse {
            success: true,
            message: "All queries cleared".to_string(),
            cleared,
        })
    }

    /// Readiness of the underlying store.
    pub fn ready(&self) -> bool {
        self.store.health().is_ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{sample_record, FileStore};

    fn gateway(dir: &tempfile::TempDir) -> QueryGateway {
        let store = FileStore::open(dir.path().join("q.log"), 100).unwrap();
        QueryGateway::new(Arc::new(StorageBackend::File(store)))
    }

    #[test]
    fn test_unknown_filter_means_all() {
        let dir = tempfile::tempdir().unwrap();
        let gw = gateway(&dir);
        gw.store().append(&sample_record("SELECT 1", 0.01, false)).unwrap();
        gw.store().append(&sample_record("SELECT 2", 0.5, true)).unwrap();

        let resp = gw
            .get_page(&PageQuery {
                filter: "bogus".to_string(),
                ..PageQuery::default()
            })
            .unwrap();
        assert_eq!(resp.total, 2);
        assert_eq!(resp.filter, "");
    }

    #[test]
    fn test_search_is_trimmed_and_echoed() {
        let dir = tempfile::tempdir().unwrap();
        let gw = gateway(&dir);
        gw.store().append(&sample_record("SELECT * FROM users", 0.01, false)).unwrap();
        gw.store().append(&sample_record("SELECT * FROM orders", 0.01, false)).unwrap();

        let resp = gw
            .get_page(&PageQuery {
                search: "  users  ".to_string(),
                filter: "slow".to_string(),
                ..PageQuery::default()
            })
            .unwrap();
        assert_eq!(resp.search, "users");
        assert_eq!(resp.filter, "slow");
        assert_eq!(resp.total, 0);
    }

    #[test]
    fn test_clear_reports_count() {
        let dir = tempfile::tempdir().unwrap();
        let gw = gateway(&dir);
        gw.store().append(&sample_record("SELECT 1", 0.01, false)).unwrap();

        let resp = gw.clear().unwrap();
        assert!(resp.success);
        assert_eq!(resp.cleared, 1);
        assert_eq!(gw.get_page(&PageQuery::default()).unwrap().total, 0);
    }

    #[test]
    fn test_unavailable_message() {
        let err = GatewayError::Unavailable(StorageError::Poisoned);
        assert_eq!(err.to_string(), "Database unavailable or logs table missing.");
        let err = GatewayError::ClearFailed(StorageError::Unavailable("gone".into()));
        assert_eq!(
            err.to_string(),
            "Failed to clear queries: storage unavailable: gone"
        );
    }
}
