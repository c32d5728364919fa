//! Storage backends
//!
//! Both backends implement [`QueryStore`]. Callers hold a [`StorageBackend`],
//! chosen once from configuration.

pub mod file;
pub mod sqlite;

use crate::config::{BackendConfig, StorageConfig};
use crate::display;
use lens_shared::types::page::{FilterCriteria, Page, PageBounds};
use lens_shared::types::record::{DisplayRecord, QueryRecord, RecordId};

pub use file::FileStore;
pub use sqlite::SqliteStore;

/// Default retention cap
pub const DEFAULT_MAX_RECORDS: usize = 200;

/// Value of the `type` column for captured queries.
pub const RECORD_TYPE: &str = "query";

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("storage unavailable: {0}")]
    Unavailable(String),

    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("record encoding error: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("store lock poisoned")]
    Poisoned,
}

/// Contract shared by every storage backend.
///
/// `append` serializes id assignment and eviction per physical store. Reads
/// may run concurrently with each other and with writes.
pub trait QueryStore: Send + Sync {
    /// Name of the persisted location (table or log file). Queries that
    /// mention it are never captured.
    fn location_name(&self) -> &str;

    /// Persist one record and return its new id. Runs eviction afterwards;
    /// an eviction failure is logged and does not fail the append.
    fn append(&self, record: &QueryRecord) -> Result<RecordId, StorageError>;

    /// Matching records, newest first. `slow`/`failed` are applied to every
    /// fetched row before `offset`/`limit` slicing.
    fn query(
        &self,
        limit: Option<usize>,
        offset: usize,
        filters: &FilterCriteria,
    ) -> Result<Vec<DisplayRecord>, StorageError>;

    /// Number of records matching `filters`. Scans every row when
    /// `slow`/`failed` is set.
    fn count(&self, filters: &FilterCriteria) -> Result<u64, StorageError>;

    /// Delete the oldest records beyond the retention cap. Returns how many
    /// were removed.
    fn evict(&self) -> Result<u64, StorageError>;

    /// Delete everything. Returns the prior count.
    fn clear(&self) -> Result<u64, StorageError>;

    /// Cheap readiness check.
    fn health(&self) -> Result<(), StorageError>;

    fn get_page(
        &self,
        page: i64,
        per_page: i64,
        filters: &FilterCriteria,
    ) -> Result<Page<DisplayRecord>, StorageError> {
        let bounds = PageBounds::clamp(page, per_page);
        let records = self.query(Some(bounds.per_page as usize), bounds.offset(), filters)?;
        let total = self.count(filters)?;
        Ok(Page::new(records, bounds, total))
    }
}

/// The configured backend.
#[derive(Debug)]
pub enum StorageBackend {
    Sqlite(SqliteStore),
    File(FileStore),
}

impl StorageBackend {
    pub fn open(config: &StorageConfig) -> Result<Self, StorageError> {
        match &config.backend {
            BackendConfig::Database {
                path,
                table,
                auto_migrate,
            } => Ok(StorageBackend::Sqlite(SqliteStore::open(
                path,
                table,
                config.max_records,
                *auto_migrate,
            )?)),
            BackendConfig::File { path } => Ok(StorageBackend::File(FileStore::open(
                path,
                config.max_records,
            )?)),
        }
    }

    fn inner(&self) -> &dyn QueryStore {
        match self {
            StorageBackend::Sqlite(store) => store,
            StorageBackend::File(store) => store,
        }
    }
}

impl QueryStore for StorageBackend {
    fn location_name(&self) -> &str {
        self.inner().location_name()
    }

    fn append(&self, record: &QueryRecord) -> Result<RecordId, StorageError> {
        let result = self.inner().append(record);
        let status = if result.is_ok() { "ok" } else { "error" };
        crate::metrics::APPEND_TOTAL.with_label_values(&[status]).inc();
        result
    }

    fn query(
        &self,
        limit: Option<usize>,
        offset: usize,
        filters: &FilterCriteria,
    ) -> Result<Vec<DisplayRecord>, StorageError> {
        self.inner().query(limit, offset, filters)
    }

    fn count(&self, filters: &FilterCriteria) -> Result<u64, StorageError> {
        self.inner().count(filters)
    }

    fn evict(&self) -> Result<u64, StorageError> {
        self.inner().evict()
    }

    fn clear(&self) -> Result<u64, StorageError> {
        self.inner().clear()
    }

    fn health(&self) -> Result<(), StorageError> {
        self.inner().health()
    }
}

/// Post-filter then slice, shared by both backends. `rows` is newest first.
pub(crate) fn filter_and_slice<I>(
    rows: I,
    limit: Option<usize>,
    offset: usize,
    filters: &FilterCriteria,
) -> Vec<DisplayRecord>
where
    I: IntoIterator<Item = lens_shared::types::record::StoredRecord>,
{
    rows.into_iter()
        .filter(|row| filters.matches_post_filter(&row.record))
        .skip(offset)
        .take(limit.unwrap_or(usize::MAX))
        .map(display::project)
        .collect()
}

/// Record an eviction outcome in logs and metrics.
pub(crate) fn note_eviction(location: &str, result: Result<u64, StorageError>) {
    match result {
        Ok(0) => {}
        Ok(removed) => {
            crate::metrics::EVICTED_TOTAL.inc_by(removed as f64);
            tracing::debug!("Evicted {} old records from {}", removed, location);
        }
        Err(e) => {
            crate::metrics::EVICTION_FAILURES.inc();
            tracing::warn!(
                "Eviction failed for {} (retention cap temporarily exceeded): {}",
                location,
                e
            );
        }
    }
}

#[cfg(test)]
pub(crate) fn sample_record(sql: &str, duration: f64, error: bool) -> QueryRecord {
    use lens_shared::types::record::{ConnectionInfo, Parameters};

    let finished_at = chrono::Utc::now();
    QueryRecord {
        batch_id: uuid::Uuid::new_v4(),
        sql: sql.to_string(),
        parameters: Parameters::default(),
        started_at: finished_at - chrono::Duration::milliseconds((duration * 1000.0) as i64),
        finished_at,
        duration_seconds: duration,
        backtrace: vec![],
        connection: ConnectionInfo {
            driver: Some("sqlite".to_string()),
            database: Some("app".to_string()),
        },
        hostname: Some("test-host".to_string()),
        request: Some("GET /test".to_string()),
        error,
        error_message: error.then(|| "constraint failed".to_string()),
    }
}
