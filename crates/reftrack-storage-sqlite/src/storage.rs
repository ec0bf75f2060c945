use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use anyhow::{Context, Result};
use reftrack_core::{AttemptRecord, ResultCode};
use reftrack_storage::{AttemptStore, ATTEMPT_SLOT};
use rusqlite::{params, Connection, OptionalExtension};

/// Durable attempt store backed by a single row in SQLite.
pub struct SqliteAttemptStore {
    conn: Mutex<Connection>,
}

impl SqliteAttemptStore {
    pub fn open(db_path: &Path) -> Result<Self> {
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent).ok();
        }
        let conn = Connection::open(db_path).with_context(|| format!("open sqlite db {}", db_path.display()))?;
        Self::init(conn)
    }

    pub fn open_in_memory() -> Result<Self> {
        Self::init(Connection::open_in_memory().context("open in-memory sqlite db")?)
    }

    fn init(conn: Connection) -> Result<Self> {
        conn.execute_batch("PRAGMA synchronous=FULL;")?;
        let init_sql = include_str!("../migrations/0001_init.sql");
        conn.execute_batch(init_sql).context("apply attempt store schema")?;
        Ok(Self { conn: Mutex::new(conn) })
    }

    fn conn(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl AttemptStore for SqliteAttemptStore {
    fn save(&self, record: &AttemptRecord) -> Result<()> {
        let conn = self.conn();
        conn.execute(
            "INSERT INTO attempt_slot(slot, referrer, attempt_count, last_failure_reason, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5)
             ON CONFLICT(slot) DO UPDATE SET
               referrer=excluded.referrer,
               attempt_count=excluded.attempt_count,
               last_failure_reason=excluded.last_failure_reason,
               updated_at=excluded.updated_at",
            params![
                ATTEMPT_SLOT,
                record.referrer,
                record.attempt_count as i64,
                record.last_failure_reason.code(),
                now_unix()
            ],
        )
        .context("save attempt record")?;
        Ok(())
    }

    fn load(&self) -> Result<Option<AttemptRecord>> {
        let conn = self.conn();
        let row: Option<(String, i64, i64)> = conn
            .query_row(
                "SELECT referrer, attempt_count, last_failure_reason FROM attempt_slot WHERE slot=?1",
                params![ATTEMPT_SLOT],
                |r| Ok((r.get(0)?, r.get(1)?, r.get(2)?)),
            )
            .optional()
            .context("load attempt record")?;

        let Some((referrer, attempt_count, reason)) = row else {
            return Ok(None);
        };
        let last_failure_reason = match ResultCode::from_code(reason) {
            Ok(rc) => rc,
            Err(e) => {
                // Unreadable slot cannot be resumed; treat it as absent.
                tracing::warn!("discarding stored attempt record: {e}");
                return Ok(None);
            }
        };
        Ok(Some(AttemptRecord {
            referrer,
            attempt_count: u32::try_from(attempt_count).unwrap_or(0),
            last_failure_reason,
        }))
    }

    fn clear(&self) -> Result<()> {
        let conn = self.conn();
        conn.execute("DELETE FROM attempt_slot WHERE slot=?1", params![ATTEMPT_SLOT])
            .context("clear attempt record")?;
        Ok(())
    }
}

pub fn now_unix() -> i64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    let dur = SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default();
    dur.as_secs() as i64
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn record(attempt: u32, reason: ResultCode) -> AttemptRecord {
        AttemptRecord {
            referrer: "utm_source=xing&xing_conversion_id=abc".into(),
            attempt_count: attempt,
            last_failure_reason: reason,
        }
    }

    #[test]
    fn sqlite_open_and_migrate() {
        let dir = tempdir().unwrap();
        let db_path = dir.path().join("nested").join("reftrack.db");
        let _ = SqliteAttemptStore::open(&db_path).unwrap();
        assert!(db_path.exists());
    }

    #[test]
    fn contract_suite_in_memory() {
        let store = SqliteAttemptStore::open_in_memory().unwrap();
        reftrack_storage::contract::run_store_contract_suite(&store).unwrap();
    }

    #[test]
    fn record_survives_reopen() {
        let dir = tempdir().unwrap();
        let db_path = dir.path().join("reftrack.db");
        {
            let store = SqliteAttemptStore::open(&db_path).unwrap();
            store.save(&record(3, ResultCode::FailedConnectivity)).unwrap();
        }
        let store = SqliteAttemptStore::open(&db_path).unwrap();
        assert_eq!(store.load().unwrap(), Some(record(3, ResultCode::FailedConnectivity)));
    }

    #[test]
    fn slot_holds_a_single_row() {
        let store = SqliteAttemptStore::open_in_memory().unwrap();
        store.save(&record(1, ResultCode::FailedServerResponse)).unwrap();
        store.save(&record(2, ResultCode::FailedServerResponse)).unwrap();
        let count: i64 = store
            .conn()
            .query_row("SELECT COUNT(1) FROM attempt_slot", [], |r| r.get(0))
            .unwrap();
        assert_eq!(count, 1);
    }

    #[test]
    fn unknown_reason_code_reads_as_empty() {
        let store = SqliteAttemptStore::open_in_memory().unwrap();
        store
            .conn()
            .execute(
                "INSERT INTO attempt_slot(slot, referrer, attempt_count, last_failure_reason, updated_at)
                 VALUES (?1, 'r', 1, 99, 0)",
                params![ATTEMPT_SLOT],
            )
            .unwrap();
        assert!(store.load().unwrap().is_none());
    }
}
