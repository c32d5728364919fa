//! SQLite storage backend
//!
//! One append-only table: `id` (autoincrement primary key), `batch_id`,
//! `type`, `content` (record JSON) and `created_at` (UTC). Writes go through a
//! single mutex-guarded connection; reads open their own connection so they
//! do not queue behind the writer.

use super::{filter_and_slice, note_eviction, QueryStore, StorageError, RECORD_TYPE};
use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
use lens_shared::types::page::FilterCriteria;
use lens_shared::types::record::{DisplayRecord, QueryRecord, RecordId, StoredRecord};
use lens_shared::utils::time::STORAGE_TIMESTAMP_FORMAT;
use rusqlite::types::Value;
use rusqlite::functions::FunctionFlags;
use rusqlite::{params, params_from_iter, Connection, TransactionBehavior};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::Duration;
use tracing::{debug, info, warn};

pub const DEFAULT_TABLE: &str = "lens_logs";

/// `lens_icontains(haystack, needle)`: Unicode case-insensitive substring
/// test. `needle` must already be lowercase.
const SEARCH_FN: &str = "lens_icontains";

const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug)]
pub struct SqliteStore {
    path: PathBuf,
    table: String,
    max_records: usize,
    writer: Mutex<Connection>,
}

impl SqliteStore {
    pub fn open(
        path: impl AsRef<Path>,
        table: &str,
        max_records: usize,
        auto_migrate: bool,
    ) -> Result<Self, StorageError> {
        if !is_valid_identifier(table) {
            return Err(StorageError::Unavailable(format!(
                "invalid table name: {:?}",
                table
            )));
        }

        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }

        let conn = open_connection(&path)?;
        conn.execute_batch("PRAGMA journal_mode = WAL; PRAGMA synchronous = NORMAL;")?;

        if auto_migrate {
            conn.execute_batch(&schema_sql(table))?;
            debug!("Ensured schema for table {}", table);
        } else if !table_exists(&conn, table)? {
            return Err(StorageError::Unavailable(format!(
                "logs table missing: {}",
                table
            )));
        }

        info!(
            "SQLite store opened: {} (table {}, max {} records)",
            path.display(),
            table,
            max_records
        );

        Ok(Self {
            path,
            table: table.to_string(),
            max_records,
            writer: Mutex::new(conn),
        })
    }

    fn reader(&self) -> Result<Connection, StorageError> {
        open_connection(&self.path)
    }

    /// Rows matching the search term, newest first. `window` is a native
    /// `(limit, offset)` applied by SQLite.
    fn select_rows(
        &self,
        conn: &Connection,
        search: Option<&str>,
        window: Option<(usize, usize)>,
    ) -> Result<Vec<StoredRecord>, StorageError> {
        let mut sql = format!(
            "SELECT id, content, created_at FROM {} WHERE type = ?1",
            self.table
        );
        let mut values = vec![Value::Text(RECORD_TYPE.to_string())];
        if let Some(term) = search {
            sql.push_str(&format!(" AND {}(content, ?2)", SEARCH_FN));
            values.push(Value::Text(term.to_lowercase()));
        }
        sql.push_str(" ORDER BY id DESC");
        if let Some((limit, offset)) = window {
            sql.push_str(&format!(" LIMIT {} OFFSET {}", limit, offset));
        }

        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map(params_from_iter(values.iter()), |row| {
            Ok((
                row.get::<_, i64>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, Option<String>>(2)?,
            ))
        })?;

        let mut out = Vec::new();
        for row in rows {
            let (id, content, created_at) = row?;
            match serde_json::from_str::<QueryRecord>(&content) {
                Ok(record) => {
                    let created_at = parse_created_at(created_at.as_deref())
                        .unwrap_or(record.finished_at);
                    out.push(StoredRecord {
                        id: id as RecordId,
                        created_at,
                        record,
                    });
                }
                Err(e) => warn!("Skipping undecodable row {} in {}: {}", id, self.table, e),
            }
        }
        Ok(out)
    }

    fn evict_locked(&self, conn: &mut Connection) -> Result<u64, StorageError> {
        if self.max_records == 0 {
            return Ok(0);
        }

        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let count: i64 = tx.query_row(
            &format!("SELECT COUNT(*) FROM {} WHERE type = ?1", self.table),
            [RECORD_TYPE],
            |row| row.get(0),
        )?;
        let excess = count - self.max_records as i64;
        if excess <= 0 {
            tx.commit()?;
            return Ok(0);
        }

        let removed = tx.execute(
            &format!(
                "DELETE FROM {t} WHERE id IN \
                 (SELECT id FROM {t} WHERE type = ?1 ORDER BY id ASC LIMIT ?2)",
                t = self.table
            ),
            params![RECORD_TYPE, excess],
        )?;
        tx.commit()?;
        Ok(removed as u64)
    }
}

impl QueryStore for SqliteStore {
    fn location_name(&self) -> &str {
        &self.table
    }

    fn append(&self, record: &QueryRecord) -> Result<RecordId, StorageError> {
        let content = serde_json::to_string(record)?;
        let created_at = Utc::now().format(STORAGE_TIMESTAMP_FORMAT).to_string();

        let mut conn = self.writer.lock().map_err(|_| StorageError::Poisoned)?;
        conn.execute(
            &format!(
                "INSERT INTO {} (batch_id, type, content, created_at) VALUES (?1, ?2, ?3, ?4)",
                self.table
            ),
            params![record.batch_id.to_string(), RECORD_TYPE, content, created_at],
        )?;
        let id = conn.last_insert_rowid() as RecordId;

        note_eviction(&self.table, self.evict_locked(&mut conn));
        Ok(id)
    }

    fn query(
        &self,
        limit: Option<usize>,
        offset: usize,
        filters: &FilterCriteria,
    ) -> Result<Vec<DisplayRecord>, StorageError> {
        let conn = self.reader()?;
        let search = filters.search.as_deref();

        if filters.needs_post_filter() {
            let rows = self.select_rows(&conn, search, None)?;
            return Ok(filter_and_slice(rows, limit, offset, filters));
        }

        match limit {
            Some(limit) => {
                let rows = self.select_rows(&conn, search, Some((limit, offset)))?;
                Ok(filter_and_slice(rows, None, 0, filters))
            }
            None => {
                let rows = self.select_rows(&conn, search, None)?;
                Ok(filter_and_slice(rows, None, offset, filters))
            }
        }
    }

    fn count(&self, filters: &FilterCriteria) -> Result<u64, StorageError> {
        let conn = self.reader()?;

        if filters.needs_post_filter() {
            // Duration and error live inside the JSON content, so this is a
            // full scan of the search-matching rows.
            let rows = self.select_rows(&conn, filters.search.as_deref(), None)?;
            return Ok(rows
                .iter()
                .filter(|row| filters.matches_post_filter(&row.record))
                .count() as u64);
        }

        let count: i64 = match &filters.search {
            Some(term) => conn.query_row(
                &format!(
                    "SELECT COUNT(*) FROM {} WHERE type = ?1 AND {}(content, ?2)",
                    self.table, SEARCH_FN
                ),
                params![RECORD_TYPE, term.to_lowercase()],
                |row| row.get(0),
            )?,
            None => conn.query_row(
                &format!("SELECT COUNT(*) FROM {} WHERE type = ?1", self.table),
                [RECORD_TYPE],
                |row| row.get(0),
            )?,
        };
        Ok(count as u64)
    }

    fn evict(&self) -> Result<u64, StorageError> {
        let mut conn = self.writer.lock().map_err(|_| StorageError::Poisoned)?;
        self.evict_locked(&mut conn)
    }

    fn clear(&self) -> Result<u64, StorageError> {
        let conn = self.writer.lock().map_err(|_| StorageError::Poisoned)?;
        let removed = conn.execute(
            &format!("DELETE FROM {} WHERE type = ?1", self.table),
            [RECORD_TYPE],
        )?;
        Ok(removed as u64)
    }

    fn health(&self) -> Result<(), StorageError> {
        let conn = self.reader()?;
        if !table_exists(&conn, &self.table)? {
            return Err(StorageError::Unavailable(format!(
                "logs table missing: {}",
                self.table
            )));
        }
        Ok(())
    }
}

/// DDL for the log table.
pub fn schema_sql(table: &str) -> String {
    format!(
        "CREATE TABLE IF NOT EXISTS {t} (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            batch_id TEXT NOT NULL,
            type TEXT NOT NULL,
            content TEXT NOT NULL,
            created_at TEXT
        );
        CREATE INDEX IF NOT EXISTS {t}_type_idx ON {t} (type);",
        t = table
    )
}

fn open_connection(path: &Path) -> Result<Connection, StorageError> {
    let conn = Connection::open(path)?;
    conn.busy_timeout(BUSY_TIMEOUT)?;
    // Same lowercasing as the file backend; SQLite's LIKE only folds ASCII.
    conn.create_scalar_function(
        SEARCH_FN,
        2,
        FunctionFlags::SQLITE_UTF8 | FunctionFlags::SQLITE_DETERMINISTIC,
        |ctx| {
            let haystack = ctx.get::<String>(0)?;
            let needle = ctx.get::<String>(1)?;
            Ok(haystack.to_lowercase().contains(&needle))
        },
    )?;
    Ok(conn)
}

fn table_exists(conn: &Connection, table: &str) -> Result<bool, StorageError> {
    let found: i64 = conn.query_row(
        "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = ?1",
        [table],
        |row| row.get(0),
    )?;
    Ok(found > 0)
}

/// Table names are interpolated into SQL, so only plain identifiers pass.
fn is_valid_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

fn parse_created_at(raw: Option<&str>) -> Option<DateTime<Utc>> {
    let naive = NaiveDateTime::parse_from_str(raw?, STORAGE_TIMESTAMP_FORMAT).ok()?;
    Some(Utc.from_utc_datetime(&naive))
}
