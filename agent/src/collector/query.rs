//! Query capture for one unit of work
//!
//! A [`CaptureAgent`] times statements between `start` and `finish`, buffers
//! the finished records and hands them to the store at `flush`. Persisting
//! may itself run queries through an instrumented connection, so flushing is
//! guarded by [`FlushStatus`] and no lock is held while the store runs.

use crate::collector::context::{self, RequestContext};
use crate::collector::stack;
use crate::config::CaptureConfig;
use chrono::{DateTime, Utc};
use lens_server::metrics::{CAPTURED_TOTAL, CAPTURE_FAILURES};
use lens_server::storage::{QueryStore, StorageError};
use lens_shared::types::record::{BacktraceFrame, ConnectionInfo, Parameters, QueryRecord};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Instant;
use tracing::{debug, warn};
use uuid::Uuid;

#[derive(Debug, thiserror::Error)]
pub enum CaptureError {
    #[error("unknown or already finished query handle {0}")]
    UnknownHandle(u64),

    #[error("failed to persist captured query: {0}")]
    Persist(#[from] StorageError),
}

/// Flush progress of an agent
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum FlushStatus {
    #[default]
    Idle,
    Committing,
    Done,
}

/// A statement about to be executed.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QueryTarget {
    pub sql: String,
    pub parameters: Parameters,
    pub connection: ConnectionInfo,
}

impl QueryTarget {
    pub fn new(sql: impl Into<String>) -> Self {
        Self {
            sql: sql.into(),
            ..Self::default()
        }
    }

    pub fn with_parameters(mut self, parameters: Parameters) -> Self {
        self.parameters = parameters;
        self
    }

    pub fn on_connection(mut self, connection: ConnectionInfo) -> Self {
        self.connection = connection;
        self
    }
}

/// Ticket returned by [`CaptureAgent::start`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct QueryHandle(u64);

#[derive(Debug)]
struct InFlight {
    target: QueryTarget,
    backtrace: Vec<BacktraceFrame>,
    started_at: DateTime<Utc>,
    started: Instant,
}

#[derive(Debug, Default)]
struct AgentState {
    status: FlushStatus,
    next_handle: u64,
    in_flight: HashMap<u64, InFlight>,
    buffer: Vec<QueryRecord>,
}

/// Creates one [`CaptureAgent`] per unit of work.
#[derive(Clone)]
pub struct CaptureAgentFactory {
    store: Arc<dyn QueryStore>,
    config: Arc<CaptureConfig>,
    hostname: Option<String>,
    base_dir: Option<PathBuf>,
}

impl CaptureAgentFactory {
    pub fn new(store: Arc<dyn QueryStore>, config: CaptureConfig) -> Self {
        Self {
            store,
            config: Arc::new(config),
            hostname: context::hostname(),
            base_dir: std::env::current_dir().ok(),
        }
    }

    /// Start a unit of work with a fresh batch id.
    pub fn begin(&self, request: RequestContext) -> CaptureAgent {
        CaptureAgent {
            batch_id: Uuid::new_v4(),
            store: self.store.clone(),
            config: self.config.clone(),
            hostname: self.hostname.clone(),
            request: request.describe(),
            base_dir: self.base_dir.clone(),
            state: Mutex::new(AgentState::default()),
        }
    }
}

/// Captures the queries of a single unit of work.
pub struct CaptureAgent {
    batch_id: Uuid,
    store: Arc<dyn QueryStore>,
    config: Arc<CaptureConfig>,
    hostname: Option<String>,
    request: Option<String>,
    base_dir: Option<PathBuf>,
    state: Mutex<AgentState>,
}

impl CaptureAgent {
    pub fn batch_id(&self) -> Uuid {
        self.batch_id
    }

    pub fn status(&self) -> FlushStatus {
        self.lock().status
    }

    /// Records waiting for `flush`.
    pub fn buffered(&self) -> usize {
        self.lock().buffer.len()
    }

    fn lock(&self) -> MutexGuard<'_, AgentState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn is_self_referencing(&self, sql: &str) -> bool {
        let location = self.store.location_name().to_lowercase();
        !location.is_empty() && sql.to_lowercase().contains(&location)
    }

    /// Begin timing `target`. Returns None when the query is not captured.
    pub fn start(&self, target: QueryTarget) -> Option<QueryHandle> {
        if !self.config.enabled {
            return None;
        }
        if self.lock().status == FlushStatus::Committing {
            return None;
        }
        if self.is_self_referencing(&target.sql) {
            debug!("Not capturing query against {}", self.store.location_name());
            return None;
        }

        let raw = stack::capture_raw(self.config.prefer_declaration_site);
        let backtrace = stack::filter_frames(
            raw,
            &self.config.ignored_prefixes,
            self.config.prefer_declaration_site,
            self.base_dir.as_deref(),
        );

        let mut state = self.lock();
        let id = state.next_handle;
        state.next_handle += 1;
        state.in_flight.insert(
            id,
            InFlight {
                target,
                backtrace,
                started_at: Utc::now(),
                started: Instant::now(),
            },
        );
        Some(QueryHandle(id))
    }

    /// Complete timing and buffer the record.
    pub fn finish(&self, handle: QueryHandle) -> Result<(), CaptureError> {
        self.complete(handle, None)
    }

    /// Like [`finish`](Self::finish), marking the statement as failed.
    pub fn fail(&self, handle: QueryHandle, message: impl Into<String>) -> Result<(), CaptureError> {
        self.complete(handle, Some(message.into()))
    }

    fn complete(&self, handle: QueryHandle, failure: Option<String>) -> Result<(), CaptureError> {
        let elapsed_at = Instant::now();
        let mut state = self.lock();
        let in_flight = state
            .in_flight
            .remove(&handle.0)
            .ok_or(CaptureError::UnknownHandle(handle.0))?;

        let duration = elapsed_at.saturating_duration_since(in_flight.started);
        let finished_at = in_flight.started_at
            + chrono::Duration::from_std(duration).unwrap_or_else(|_| chrono::Duration::zero());

        state.buffer.push(QueryRecord {
            batch_id: self.batch_id,
            sql: in_flight.target.sql,
            parameters: in_flight.target.parameters,
            started_at: in_flight.started_at,
            finished_at,
            duration_seconds: duration.as_secs_f64(),
            backtrace: in_flight.backtrace,
            connection: in_flight.target.connection,
            hostname: self.hostname.clone(),
            request: self.request.clone(),
            error: failure.is_some(),
            error_message: failure,
        });
        CAPTURED_TOTAL.inc();
        Ok(())
    }

    /// Persist every buffered record and empty the buffer. Returns how many
    /// were stored; a nested call during commit returns 0.
    pub fn flush(&self) -> usize {
        let records = {
            let mut state = self.lock();
            if state.status == FlushStatus::Committing {
                return 0;
            }
            state.status = FlushStatus::Committing;
            if !state.in_flight.is_empty() {
                debug!(
                    "Discarding {} unfinished queries at flush",
                    state.in_flight.len()
                );
                state.in_flight.clear();
            }
            std::mem::take(&mut state.buffer)
        };

        let mut committed = 0;
        for record in &records {
            match self.store.append(record) {
                Ok(_) => committed += 1,
                Err(e) => {
                    CAPTURE_FAILURES.inc();
                    warn!("{}", CaptureError::Persist(e));
                }
            }
        }

        self.lock().status = FlushStatus::Done;
        if !records.is_empty() {
            debug!(
                "Flushed {}/{} queries for batch {}",
                committed,
                records.len(),
                self.batch_id
            );
        }
        committed
    }

    /// End the unit of work, persisting whatever is buffered.
    pub fn end_unit(self) -> usize {
        self.flush()
    }
}

impl Drop for CaptureAgent {
    fn drop(&mut self) {
        if self.lock().buffer.is_empty() {
            return;
        }
        let committed = self.flush();
        debug!("Flushed {} queries on drop of batch {}", committed, self.batch_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lens_server::storage::FileStore;
    use lens_shared::types::page::FilterCriteria;
    use serde_json::json;

    fn factory(dir: &tempfile::TempDir, config: CaptureConfig) -> (CaptureAgentFactory, Arc<FileStore>) {
        let store = Arc::new(FileStore::open(dir.path().join("query_logs.log"), 100).unwrap());
        (CaptureAgentFactory::new(store.clone(), config), store)
    }

    #[test]
    fn test_finish_buffers_and_flush_persists() {
        let dir = tempfile::tempdir().unwrap();
        let (factory, store) = factory(&dir, CaptureConfig::default());
        let agent = factory.begin(RequestContext::new("GET", "/users"));

        let target = QueryTarget::new("SELECT * FROM users WHERE id = ?")
            .with_parameters(Parameters::Positional(vec![json!(5)]));
        let handle = agent.start(target).unwrap();
        agent.finish(handle).unwrap();
        assert_eq!(agent.buffered(), 1);

        assert_eq!(agent.flush(), 1);
        assert_eq!(agent.buffered(), 0);
        assert_eq!(agent.status(), FlushStatus::Done);

        let stored = store.query(None, 0, &FilterCriteria::default()).unwrap();
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].batch_id, agent.batch_id());
        assert_eq!(stored[0].content.request.as_deref(), Some("GET /users"));
        assert!(stored[0].content.duration_seconds >= 0.0);
        assert!(stored[0].content.finished_at >= stored[0].content.started_at);
    }

    #[test]
    fn test_fail_marks_error() {
        let dir = tempfile::tempdir().unwrap();
        let (factory, store) = factory(&dir, CaptureConfig::default());
        let agent = factory.begin(RequestContext::default());

        let handle = agent.start(QueryTarget::new("INSERT INTO t VALUES (1)")).unwrap();
        agent.fail(handle, "UNIQUE constraint failed").unwrap();
        assert!(matches!(agent.finish(handle), Err(CaptureError::UnknownHandle(_))));
        agent.end_unit();

        let stored = store.query(None, 0, &FilterCriteria::default()).unwrap();
        assert!(stored[0].error);
        assert_eq!(
            stored[0].content.error_message.as_deref(),
            Some("UNIQUE constraint failed")
        );
    }

    #[test]
    fn test_self_exclusion_is_case_insensitive() {
        let dir = tempfile::tempdir().unwrap();
        let (factory, _) = factory(&dir, CaptureConfig::default());
        let agent = factory.begin(RequestContext::default());
        assert!(agent.start(QueryTarget::new("-- read QUERY_LOGS.LOG")).is_none());
        assert!(agent.start(QueryTarget::new("SELECT 1")).is_some());
    }

    #[test]
    fn test_disabled_captures_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let (factory, _) = factory(&dir, CaptureConfig::disabled());
        let agent = factory.begin(RequestContext::default());
        assert!(agent.start(QueryTarget::new("SELECT 1")).is_none());
    }

    #[test]
    fn test_unfinished_handles_are_discarded() {
        let dir = tempfile::tempdir().unwrap();
        let (factory, store) = factory(&dir, CaptureConfig::default());
        let agent = factory.begin(RequestContext::default());
        let open = agent.start(QueryTarget::new("SELECT 1")).unwrap();
        let done = agent.start(QueryTarget::new("SELECT 2")).unwrap();
        agent.finish(done).unwrap();

        assert_eq!(agent.flush(), 1);
        assert!(agent.finish(open).is_err());
        assert_eq!(store.count(&FilterCriteria::default()).unwrap(), 1);
    }

    #[test]
    fn test_drop_flushes_buffer() {
        let dir = tempfile::tempdir().unwrap();
        let (factory, store) = factory(&dir, CaptureConfig::default());
        {
            let agent = factory.begin(RequestContext::default());
            let handle = agent.start(QueryTarget::new("SELECT 1")).unwrap();
            agent.finish(handle).unwrap();
        }
        assert_eq!(store.count(&FilterCriteria::default()).unwrap(), 1);
    }

    #[test]
    fn test_each_unit_gets_a_batch() {
        let dir = tempfile::tempdir().unwrap();
        let (factory, _) = factory(&dir, CaptureConfig::default());
        let a = factory.begin(RequestContext::default());
        let b = factory.begin(RequestContext::default());
        assert_ne!(a.batch_id(), b.batch_id());
    }
}
