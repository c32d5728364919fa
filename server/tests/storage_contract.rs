//! Behaviour every storage backend must share.

use chrono::Utc;
use lens_server::storage::{FileStore, QueryStore, SqliteStore, StorageBackend};
use lens_shared::types::page::FilterCriteria;
use lens_shared::types::record::{ConnectionInfo, Parameters, QueryRecord};
use serde_json::json;
use std::sync::Arc;
use uuid::Uuid;

fn record(sql: &str, duration: f64, error: bool) -> QueryRecord {
    let now = Utc::now();
    QueryRecord {
        batch_id: Uuid::new_v4(),
        sql: sql.to_string(),
        parameters: Parameters::Positional(vec![json!(1)]),
        started_at: now,
        finished_at: now,
        duration_seconds: duration,
        backtrace: vec![],
        connection: ConnectionInfo::default(),
        hostname: Some("web-1".to_string()),
        request: None,
        error,
        error_message: None,
    }
}

fn backends(dir: &tempfile::TempDir, max: usize) -> Vec<StorageBackend> {
    vec![
        StorageBackend::Sqlite(
            SqliteStore::open(dir.path().join("lens.db"), "lens_logs", max, true).unwrap(),
        ),
        StorageBackend::File(FileStore::open(dir.path().join("query_logs.log"), max).unwrap()),
    ]
}

#[test]
fn cap_keeps_last_ten_of_fifteen() {
    let dir = tempfile::tempdir().unwrap();
    for store in backends(&dir, 10) {
        let ids: Vec<_> = (0..15)
            .map(|i| store.append(&record(&format!("SELECT {}", i), 0.01, false)).unwrap())
            .collect();

        let kept: Vec<_> = store
            .query(None, 0, &FilterCriteria::default())
            .unwrap()
            .into_iter()
            .map(|r| r.id)
            .collect();
        let expected: Vec<_> = ids[5..].iter().rev().copied().collect();
        assert_eq!(kept, expected, "backend {}", store.location_name());
    }
}

#[test]
fn forty_five_records_paginate_in_three_pages() {
    let dir = tempfile::tempdir().unwrap();
    for store in backends(&dir, 200) {
        for i in 0..45 {
            store.append(&record(&format!("SELECT {}", i), 0.01, false)).unwrap();
        }

        let filters = FilterCriteria::default();
        let first = store.get_page(1, 20, &filters).unwrap();
        assert_eq!(first.total, 45);
        assert_eq!(first.total_pages, 3);
        assert!(first.has_more);
        assert_eq!(first.records.len(), 20);
        assert_eq!(first.records[0].content.sql, "SELECT 44");

        assert!(store.get_page(2, 20, &filters).unwrap().has_more);

        let last = store.get_page(3, 20, &filters).unwrap();
        assert!(!last.has_more);
        assert_eq!(last.records.len(), 5);
        assert_eq!(last.records[4].content.sql, "SELECT 0");
    }
}

#[test]
fn slow_and_failed_compose() {
    let dir = tempfile::tempdir().unwrap();
    for store in backends(&dir, 200) {
        store.append(&record("fast ok", 0.05, false)).unwrap();
        store.append(&record("boundary", 0.1, false)).unwrap();
        store.append(&record("slow ok", 0.5, false)).unwrap();
        store.append(&record("fast fail", 0.01, true)).unwrap();
        store.append(&record("slow fail", 0.2, true)).unwrap();

        let slow = FilterCriteria {
            slow: true,
            ..FilterCriteria::default()
        };
        let sqls: Vec<_> = store
            .query(None, 0, &slow)
            .unwrap()
            .into_iter()
            .map(|r| r.content.sql)
            .collect();
        assert_eq!(sqls, vec!["slow fail", "slow ok"]);
        assert_eq!(store.count(&slow).unwrap(), 2);

        let failed = FilterCriteria {
            failed: true,
            ..FilterCriteria::default()
        };
        assert_eq!(store.count(&failed).unwrap(), 2);

        let both = FilterCriteria {
            slow: true,
            failed: true,
            ..FilterCriteria::default()
        };
        let page = store.get_page(1, 20, &both).unwrap();
        assert_eq!(page.total, 1);
        assert_eq!(page.records[0].content.sql, "slow fail");
    }
}

#[test]
fn search_is_case_insensitive_substring() {
    let dir = tempfile::tempdir().unwrap();
    for store in backends(&dir, 200) {
        store.append(&record("SELECT * FROM Users", 0.01, false)).unwrap();
        store.append(&record("SELECT * FROM orders", 0.01, false)).unwrap();

        let found = store.query(None, 0, &FilterCriteria::search("users")).unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(store.count(&FilterCriteria::search("USERS")).unwrap(), 1);
        assert_eq!(store.count(&FilterCriteria::search("web-1")).unwrap(), 2);

        store.append(&record("SELECT * FROM Übersicht", 0.01, false)).unwrap();
        let found = store.query(None, 0, &FilterCriteria::search("übersicht")).unwrap();
        assert_eq!(found.len(), 1, "backend {}", store.location_name());
        assert_eq!(found[0].content.sql, "SELECT * FROM Übersicht");
        assert_eq!(store.count(&FilterCriteria::search("ÜBERSICHT")).unwrap(), 1);
    }
}

#[test]
fn clear_returns_prior_count_and_keeps_ids_growing() {
    let dir = tempfile::tempdir().unwrap();
    for store in backends(&dir, 200) {
        let mut last = 0;
        for i in 0..3 {
            last = store.append(&record(&format!("SELECT {}", i), 0.01, false)).unwrap();
        }

        assert_eq!(store.clear().unwrap(), 3);
        assert_eq!(store.get_page(1, 20, &FilterCriteria::default()).unwrap().total, 0);

        let next = store.append(&record("after", 0.01, false)).unwrap();
        assert!(next > last);
    }
}

#[test]
fn display_projection_interpolates() {
    let dir = tempfile::tempdir().unwrap();
    for store in backends(&dir, 200) {
        let mut rec = record("SELECT * FROM users WHERE id = ?", 0.01, false);
        rec.parameters = Parameters::Positional(vec![json!(123)]);
        store.append(&rec).unwrap();

        let shown = store.query(Some(1), 0, &FilterCriteria::default()).unwrap();
        assert_eq!(shown[0].display_sql, "SELECT * FROM users WHERE id = 123");
        assert_eq!(shown[0].content.sql, rec.sql);
    }
}

#[test]
fn concurrent_appends_get_unique_ids_and_respect_cap() {
    let dir = tempfile::tempdir().unwrap();
    for store in backends(&dir, 25) {
        let store = Arc::new(store);
        let handles: Vec<_> = (0..4)
            .map(|t| {
                let store = store.clone();
                std::thread::spawn(move || {
                    (0..10)
                        .map(|i| {
                            store
                                .append(&record(&format!("T{} Q{}", t, i), 0.01, false))
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
        assert_eq!(ids.len(), 40, "backend {}", store.location_name());

        let kept: Vec<_> = store
            .query(None, 0, &FilterCriteria::default())
            .unwrap()
            .into_iter()
            .map(|r| r.id)
            .collect();
        let expected: Vec<_> = ids[15..].iter().rev().copied().collect();
        assert_eq!(kept, expected, "backend {}", store.location_name());
    }
}
