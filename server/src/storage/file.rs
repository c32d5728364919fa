//! Flat append-log storage backend
//!
//! One JSON record per line. Writers hold an exclusive OS lock (fs2) on the
//! log for the whole read-assign-append-evict sequence; readers take a shared
//! lock. Eviction rewrites the file in place under the same lock.

use super::{filter_and_slice, note_eviction, QueryStore, StorageError};
use chrono::Utc;
use fs2::FileExt;
use lens_shared::types::page::FilterCriteria;
use lens_shared::types::record::{DisplayRecord, QueryRecord, RecordId, StoredRecord};
use std::fs::{self, File, OpenOptions};
use std::io::{self, BufRead, BufReader, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::{info, warn};

pub const DEFAULT_LOG_FILE: &str = "data/query_logs.log";

#[derive(Debug)]
pub struct FileStore {
    path: PathBuf,
    /// Highest id ever assigned, written before each record line and kept
    /// across `clear()`, so ids are never handed out twice.
    seq_path: PathBuf,
    name: String,
    max_records: usize,
    write_guard: Mutex<()>,
}

impl FileStore {
    pub fn open(path: impl AsRef<Path>, max_records: usize) -> Result<Self, StorageError> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        OpenOptions::new().create(true).append(true).open(&path)?;

        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .ok_or_else(|| {
                StorageError::Unavailable(format!("invalid log file path: {}", path.display()))
            })?;
        let mut seq_path = path.clone().into_os_string();
        seq_path.push(".seq");

        info!(
            "File store opened: {} (max {} records)",
            path.display(),
            max_records
        );

        Ok(Self {
            path,
            seq_path: PathBuf::from(seq_path),
            name,
            max_records,
            write_guard: Mutex::new(()),
        })
    }

    /// Run `f` with the log opened read-write and exclusively locked.
    fn with_exclusive<T>(
        &self,
        f: impl FnOnce(&mut File) -> Result<T, StorageError>,
    ) -> Result<T, StorageError> {
        let _guard = self.write_guard.lock().map_err(|_| StorageError::Poisoned)?;
        let mut file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .open(&self.path)?;
        FileExt::lock_exclusive(&file)?;

        let result = f(&mut file);
        if let Err(e) = FileExt::unlock(&file) {
            warn!("Failed to unlock {}: {}", self.path.display(), e);
        }
        result
    }

    /// All records in file order (oldest first), under a shared lock.
    fn load_shared(&self) -> Result<Vec<StoredRecord>, StorageError> {
        let file = match File::open(&self.path) {
            Ok(file) => file,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };
        FileExt::lock_shared(&file)?;
        let result = self.read_records(&file);
        if let Err(e) = FileExt::unlock(&file) {
            warn!("Failed to unlock {}: {}", self.path.display(), e);
        }
        result
    }

    fn read_records(&self, mut file: &File) -> Result<Vec<StoredRecord>, StorageError> {
        file.seek(SeekFrom::Start(0))?;
        let mut records = Vec::new();
        for (index, line) in BufReader::new(file).lines().enumerate() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<StoredRecord>(&line) {
                Ok(record) => records.push(record),
                Err(e) => warn!(
                    "Skipping undecodable line {} in {}: {}",
                    index + 1,
                    self.name,
                    e
                ),
            }
        }
        Ok(records)
    }

    fn read_seq(&self) -> RecordId {
        fs::read_to_string(&self.seq_path)
            .ok()
            .and_then(|s| s.trim().parse().ok())
            .unwrap_or(0)
    }

    fn write_seq(&self, id: RecordId) -> Result<(), StorageError> {
        fs::write(&self.seq_path, id.to_string())?;
        Ok(())
    }

    /// Position at the end of the log, terminating a torn last line so the
    /// next record starts on a line of its own.
    fn seek_to_fresh_line(&self, file: &mut File) -> Result<(), StorageError> {
        let len = file.seek(SeekFrom::End(0))?;
        if len == 0 {
            return Ok(());
        }
        file.seek(SeekFrom::Start(len - 1))?;
        let mut last = [0u8; 1];
        file.read_exact(&mut last)?;
        if last[0] != b'\n' {
            warn!("Terminating torn last line in {}", self.name);
            file.write_all(b"\n")?;
        }
        Ok(())
    }

    /// Keep only the newest `max_records`, rewriting the log in place.
    fn rewrite_if_over(
        &self,
        file: &mut File,
        records: &[StoredRecord],
    ) -> Result<u64, StorageError> {
        if self.max_records == 0 || records.len() <= self.max_records {
            return Ok(0);
        }

        let excess = records.len() - self.max_records;
        let mut buf = String::new();
        for record in &records[excess..] {
            buf.push_str(&serde_json::to_string(record)?);
            buf.push('\n');
        }

        file.set_len(0)?;
        file.seek(SeekFrom::Start(0))?;
        file.write_all(buf.as_bytes())?;
        file.sync_data()?;
        Ok(excess as u64)
    }
}

impl QueryStore for FileStore {
    fn location_name(&self) -> &str {
        &self.name
    }

    fn append(&self, record: &QueryRecord) -> Result<RecordId, StorageError> {
        self.with_exclusive(|file| {
            let mut records = self.read_records(file)?;
            let last = records.iter().map(|r| r.id).max().unwrap_or(0);
            let stored = StoredRecord {
                id: last.max(self.read_seq()) + 1,
                created_at: Utc::now(),
                record: record.clone(),
            };

            let mut line = serde_json::to_string(&stored)?;
            line.push('\n');
            self.write_seq(stored.id)?;
            self.seek_to_fresh_line(file)?;
            file.write_all(line.as_bytes())?;

            let id = stored.id;
            records.push(stored);
            note_eviction(&self.name, self.rewrite_if_over(file, &records));
            Ok(id)
        })
    }

    fn query(
        &self,
        limit: Option<usize>,
        offset: usize,
        filters: &FilterCriteria,
    ) -> Result<Vec<DisplayRecord>, StorageError> {
        let records = self.load_shared()?;
        let matching = records
            .into_iter()
            .rev()
            .filter(|r| filters.matches_search_text(&r.record.search_text()));
        Ok(filter_and_slice(matching, limit, offset, filters))
    }

    fn count(&self, filters: &FilterCriteria) -> Result<u64, StorageError> {
        let records = self.load_shared()?;
        Ok(records.iter().filter(|r| filters.matches(&r.record)).count() as u64)
    }

    fn evict(&self) -> Result<u64, StorageError> {
        self.with_exclusive(|file| {
            let records = self.read_records(file)?;
            self.rewrite_if_over(file, &records)
        })
    }

    fn clear(&self) -> Result<u64, StorageError> {
        self.with_exclusive(|file| {
            let records = self.read_records(file)?;
            let high = records
                .iter()
                .map(|r| r.id)
                .max()
                .unwrap_or(0)
                .max(self.read_seq());
            self.write_seq(high)?;

            file.set_len(0)?;
            file.sync_data()?;
            Ok(records.len() as u64)
        })
    }

    fn health(&self) -> Result<(), StorageError> {
        File::open(&self.path).map(|_| ()).map_err(|e| {
            StorageError::Unavailable(format!("log file {}: {}", self.path.display(), e))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::sample_record;
    use std::sync::Arc;

    fn open_store(dir: &tempfile::TempDir, max: usize) -> FileStore {
        FileStore::open(dir.path().join("query_logs.log"), max).unwrap()
    }

    #[test]
    fn test_retains_newest_records() {
        let dir = tempfile::tempdir().unwrap();
        let store = open_store(&dir, 10);

        for i in 0..15 {
            store.append(&sample_record(&format!("Q{}", i), 0.2, false)).unwrap();
        }

        let ids: Vec<_> = store
            .query(None, 0, &FilterCriteria::default())
            .unwrap()
            .into_iter()
            .map(|r| r.id)
            .collect();
        assert_eq!(ids, (6..=15).rev().collect::<Vec<_>>());

        let lines = fs::read_to_string(dir.path().join("query_logs.log")).unwrap();
        assert_eq!(lines.lines().count(), 10);
    }

    #[test]
    fn test_pagination_is_newest_first() {
        let dir = tempfile::tempdir().unwrap();
        let store = open_store(&dir, 100);
        for i in 0..5 {
            store.append(&sample_record(&format!("Q{}", i), 0.2, false)).unwrap();
        }

        let page = store.query(Some(2), 1, &FilterCriteria::default()).unwrap();
        assert_eq!(page.len(), 2);
        assert_eq!(page[0].content.sql, "Q3");
        assert_eq!(page[1].content.sql, "Q2");
    }

    #[test]
    fn test_clear_keeps_id_sequence() {
        let dir = tempfile::tempdir().unwrap();
        let store = open_store(&dir, 100);
        store.append(&sample_record("A", 0.01, false)).unwrap();
        store.append(&sample_record("B", 0.01, false)).unwrap();

        assert_eq!(store.clear().unwrap(), 2);
        assert_eq!(store.count(&FilterCriteria::default()).unwrap(), 0);
        assert_eq!(store.append(&sample_record("C", 0.01, false)).unwrap(), 3);
    }

    #[test]
    fn test_skips_corrupt_lines() {
        let dir = tempfile::tempdir().unwrap();
        let store = open_store(&dir, 100);
        store.append(&sample_record("A", 0.01, false)).unwrap();

        let mut file = OpenOptions::new()
            .append(true)
            .open(dir.path().join("query_logs.log"))
            .unwrap();
        writeln!(file, "{{not json").unwrap();

        let id = store.append(&sample_record("B", 0.01, false)).unwrap();
        assert_eq!(id, 2);
        assert_eq!(store.count(&FilterCriteria::default()).unwrap(), 2);
    }

    #[test]
    fn test_torn_last_line_does_not_swallow_next_record() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("query_logs.log");
        let store = open_store(&dir, 100);
        assert_eq!(store.append(&sample_record("A", 0.01, false)).unwrap(), 1);
        assert_eq!(store.append(&sample_record("B", 0.01, false)).unwrap(), 2);

        let len = fs::metadata(&path).unwrap().len();
        OpenOptions::new()
            .write(true)
            .open(&path)
            .unwrap()
            .set_len(len - 5)
            .unwrap();

        let c = store.append(&sample_record("C", 0.01, false)).unwrap();
        assert_eq!(c, 3);

        let shown: Vec<_> = store
            .query(None, 0, &FilterCriteria::default())
            .unwrap()
            .into_iter()
            .map(|r| (r.id, r.content.sql))
            .collect();
        assert_eq!(shown, vec![(3, "C".to_string()), (1, "A".to_string())]);

        assert_eq!(store.append(&sample_record("D", 0.01, false)).unwrap(), 4);
    }

    #[test]
    fn test_ids_never_repeat_after_lost_lines() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("query_logs.log");
        let store = open_store(&dir, 100);
        store.append(&sample_record("A", 0.01, false)).unwrap();
        store.append(&sample_record("B", 0.01, false)).unwrap();

        fs::write(&path, "").unwrap();
        assert_eq!(store.append(&sample_record("C", 0.01, false)).unwrap(), 3);
    }

    #[test]
    fn test_concurrent_appends_get_unique_ids() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(open_store(&dir, 25));

        let handles: Vec<_> = (0..4)
            .map(|t| {
                let store = store.clone();
                std::thread::spawn(move || {
                    (0..10)
                        .map(|i| {
                            store
                                .append(&sample_record(&format!("T{} Q{}", t, i), 0.01, false))
                                .unwrap()
                        })
                        .collect::<Vec<_>>()
                })
            })
            .collect();

        let mut ids: Vec<_> = handles
            .into_iter()
            .flat_map(|h| h.join().unwrap())
            .collect();
        ids.sort_unstable();
        ids.dedup();
        assert_eq!(ids.len(), 40);

        let kept: Vec<_> = store
            .query(None, 0, &FilterCriteria::default())
            .unwrap()
            .into_iter()
            .map(|r| r.id)
            .collect();
        assert_eq!(kept, (16..=40).rev().collect::<Vec<_>>());
    }
}
