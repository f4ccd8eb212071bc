// SPDX-License-Identifier: Apache-2.0

use crate::error::StoreError;
use crate::schema;
use rusqlite::Connection;
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

/// Handle to the storefront database. Cheap to share behind an `Arc`;
/// the inner mutex serializes statements, which is all the write volume
/// a single shop needs.
pub struct Store {
    conn: Mutex<Connection>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreInspection {
    pub schema_version: i64,
    pub row_counts: BTreeMap<String, u64>,
}

impl Store {
    pub fn open(path: &Path, now_ms: u64) -> Result<Self, StoreError> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                std::fs::create_dir_all(parent)
                    .map_err(|e| StoreError::new(crate::StoreErrorCode::Io, e.to_string()))?;
            }
        }
        let mut conn = Connection::open(path).map_err(StoreError::from_sqlite)?;
        schema::apply_pragmas(&conn)?;
        schema::migrate(&mut conn, now_ms)?;
        tracing::debug!(path = %path.display(), "store opened");
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    pub fn open_in_memory(now_ms: u64) -> Result<Self, StoreError> {
        let mut conn = Connection::open_in_memory().map_err(StoreError::from_sqlite)?;
        schema::apply_pragmas(&conn)?;
        schema::migrate(&mut conn, now_ms)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    pub(crate) fn conn(&self) -> Result<MutexGuard<'_, Connection>, StoreError> {
        self.conn
            .lock()
            .map_err(|_| StoreError::internal("store connection mutex poisoned"))
    }

    pub fn meta_value(&self, key: &str) -> Result<Option<String>, StoreError> {
        use rusqlite::OptionalExtension;
        let conn = self.conn()?;
        conn.query_row(
            "SELECT v FROM meta WHERE k = ?1",
            rusqlite::params![key],
            |r| r.get(0),
        )
        .optional()
        .map_err(StoreError::from_sqlite)
    }

    pub fn inspect(&self) -> Result<StoreInspection, StoreError> {
        let conn = self.conn()?;
        let schema_version: i64 = conn
            .query_row("PRAGMA user_version", [], |r| r.get(0))
            .map_err(StoreError::from_sqlite)?;
        let mut row_counts = BTreeMap::new();
        for table in [
            "products",
            "orders",
            "order_lines",
            "newsletter_subscribers",
            "contact_messages",
            "webhook_events",
            "close_runs",
            "close_discrepancies",
            "ads_drafts",
        ] {
            let count: i64 = conn
                .query_row(&format!("SELECT COUNT(*) FROM {table}"), [], |r| r.get(0))
                .map_err(StoreError::from_sqlite)?;
            row_counts.insert(table.to_string(), count.max(0) as u64);
        }
        Ok(StoreInspection {
            schema_version,
            row_counts,
        })
    }

    /// Cheap liveness probe for readiness checks.
    pub fn ping(&self) -> Result<(), StoreError> {
        let conn = self.conn()?;
        conn.query_row("SELECT 1", [], |r| r.get::<_, i64>(0))
            .map(|_| ())
            .map_err(StoreError::from_sqlite)
    }
}

pub(crate) fn ms_from_db(value: i64, column: &'static str) -> Result<u64, StoreError> {
    u64::try_from(value)
        .map_err(|_| StoreError::corrupt(format!("negative timestamp in {column}")))
}

pub(crate) fn optional_ms_from_db(
    value: Option<i64>,
    column: &'static str,
) -> Result<Option<u64>, StoreError> {
    value.map(|v| ms_from_db(v, column)).transpose()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_store_reports_schema_and_empty_tables() {
        let store = Store::open_in_memory(1_700_000_000_000).unwrap();
        let inspection = store.inspect().unwrap();
        assert_eq!(inspection.schema_version, schema::SCHEMA_VERSION);
        assert!(inspection.row_counts.values().all(|&c| c == 0));
        assert_eq!(inspection.row_counts.len(), 9);
    }

    #[test]
    fn open_creates_parent_directories() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("shop.db");
        let store = Store::open(&path, 1_700_000_000_000).unwrap();
        store.ping().unwrap();
        assert!(path.exists());
    }

    #[test]
    fn reopen_keeps_schema_version() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("shop.db");
        drop(Store::open(&path, 1).unwrap());
        let store = Store::open(&path, 2).unwrap();
        assert_eq!(
            store.inspect().unwrap().schema_version,
            schema::SCHEMA_VERSION
        );
        assert_eq!(store.meta_value("created_at_ms").unwrap(), Some("1".to_string()));
    }

    #[test]
    fn meta_value_misses_cleanly() {
        let store = Store::open_in_memory(1).unwrap();
        assert_eq!(store.meta_value("nope").unwrap(), None);
    }
}
