//! Embedded SQLite store for projects, notes, tasks, and the audit trail.
//!
//! The `Store` owns the single writable connection. Every mutating
//! operation runs inside one `BEGIN IMMEDIATE` transaction together with
//! its search-index sync and audit append, so all three effects commit
//! atomically or none do. Callers construct a `Store` explicitly and pass
//! it by reference; there is no process-wide singleton.

mod audit;
mod hierarchy;
mod migrations;
mod notes;
mod projects;
mod row;
mod search;
mod tasks;
mod users;
pub mod types;
pub mod validation;

use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use chrono::Utc;
use rusqlite::Connection;
use tracing::{debug, info, warn};

use crate::error::{Result, StoreError};

/// Maximum attempts to acquire the write lock before surfacing `Busy`.
const MAX_WRITE_ATTEMPTS: u32 = 5;

/// Initial backoff between write-lock attempts; doubles per retry.
const INITIAL_BACKOFF: Duration = Duration::from_millis(10);

/// Handle to the on-disk (or in-memory) store.
///
/// `Store` is `Send + Sync`; operations serialize on an internal mutex.
/// With WAL journaling, readers outside this process observe the last
/// committed snapshot while a write transaction is in flight.
pub struct Store {
    conn: Mutex<Connection>,
}

impl Store {
    /// Open a store at the given path, creating the file if absent and
    /// applying any pending schema migrations.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let mut conn = Connection::open(path.as_ref())?;
        conn.execute_batch(
            "PRAGMA journal_mode = WAL;
             PRAGMA synchronous = NORMAL;
             PRAGMA foreign_keys = ON;
             PRAGMA busy_timeout = 0;",
        )?;
        migrations::apply_pending_migrations(&mut conn)?;
        info!(path = %path.as_ref().display(), "store opened");
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Open a transient in-memory store. Used mainly by tests.
    pub fn in_memory() -> Result<Self> {
        let mut conn = Connection::open_in_memory()?;
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        migrations::apply_pending_migrations(&mut conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Close the store, truncating the write-ahead log.
    pub fn close(self) -> Result<()> {
        let conn = self
            .conn
            .into_inner()
            .map_err(|_| StoreError::Storage("SQLite connection poisoned".to_string()))?;
        let _ = conn.execute_batch("PRAGMA wal_checkpoint(TRUNCATE);");
        debug!("store closed");
        Ok(())
    }

    /// Externally triggered maintenance hook: checkpoint the WAL into the
    /// main database file. Not part of any hot path.
    pub fn checkpoint(&self) -> Result<()> {
        let conn = self.lock_conn()?;
        conn.execute_batch("PRAGMA wal_checkpoint(TRUNCATE);")?;
        debug!("wal checkpoint complete");
        Ok(())
    }

    /// Lock the connection, returning an error if the mutex is poisoned.
    fn lock_conn(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| StoreError::Storage("SQLite connection poisoned".to_string()))
    }

    /// Run `f` against the last committed state.
    pub(crate) fn read<T>(&self, f: impl FnOnce(&Connection) -> Result<T>) -> Result<T> {
        let conn = self.lock_conn()?;
        f(&conn)
    }

    /// Execute `f` inside one `BEGIN IMMEDIATE` transaction.
    ///
    /// Commits on `Ok`, rolls back on `Err` with no partial effect. A busy
    /// write lock retries with exponential backoff up to
    /// `MAX_WRITE_ATTEMPTS`, then surfaces `StoreError::Busy` rather than
    /// hanging or dropping the write silently.
    pub(crate) fn write_tx<T>(&self, f: impl FnOnce(&Connection) -> Result<T>) -> Result<T> {
        let conn = self.lock_conn()?;

        let mut backoff = INITIAL_BACKOFF;
        let mut attempt = 1;
        loop {
            match conn.execute_batch("BEGIN IMMEDIATE") {
                Ok(()) => break,
                Err(e) if is_busy(&e) => {
                    if attempt >= MAX_WRITE_ATTEMPTS {
                        warn!(attempts = attempt, "write lock retry budget exhausted");
                        return Err(StoreError::Busy);
                    }
                    std::thread::sleep(backoff);
                    backoff *= 2;
                    attempt += 1;
                }
                Err(e) => return Err(e.into()),
            }
        }

        match f(&conn) {
            Ok(value) => match conn.execute_batch("COMMIT") {
                Ok(()) => Ok(value),
                Err(e) => {
                    let _ = conn.execute_batch("ROLLBACK");
                    if is_busy(&e) {
                        Err(StoreError::Busy)
                    } else {
                        Err(e.into())
                    }
                }
            },
            Err(e) => {
                let _ = conn.execute_batch("ROLLBACK");
                Err(e)
            }
        }
    }
}

/// Current timestamp in the canonical column format.
pub(crate) fn now_rfc3339() -> String {
    Utc::now().to_rfc3339()
}

fn is_busy(err: &rusqlite::Error) -> bool {
    matches!(
        err,
        rusqlite::Error::SqliteFailure(e, _)
            if e.code == rusqlite::ErrorCode::DatabaseBusy
                || e.code == rusqlite::ErrorCode::DatabaseLocked
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn in_memory_opens_with_schema() {
        let store = Store::in_memory().unwrap();
        store
            .read(|conn| {
                let fk: i32 = conn.query_row("PRAGMA foreign_keys", [], |row| row.get(0))?;
                assert_eq!(fk, 1);
                Ok(())
            })
            .unwrap();
    }

    #[test]
    fn open_creates_file_and_reopen_is_idempotent() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("quill.db");

        let store = Store::open(&path).unwrap();
        assert!(path.exists());
        store.close().unwrap();

        let store = Store::open(&path).unwrap();
        store.close().unwrap();
    }

    #[test]
    fn write_tx_rolls_back_on_error() {
        let store = Store::in_memory().unwrap();

        let result: Result<()> = store.write_tx(|conn| {
            conn.execute(
                "INSERT INTO users (id, username, password_hash, created_at, updated_at)
                 VALUES ('u1', 'ghost', 'x', '2026-01-01T00:00:00Z', '2026-01-01T00:00:00Z')",
                [],
            )?;
            Err(StoreError::InvalidInput("abort".to_string()))
        });
        assert!(result.is_err());

        store
            .read(|conn| {
                let count: i64 =
                    conn.query_row("SELECT COUNT(*) FROM users", [], |row| row.get(0))?;
                assert_eq!(count, 0);
                Ok(())
            })
            .unwrap();
    }

    #[test]
    fn checkpoint_succeeds_on_file_store() {
        let dir = tempdir().unwrap();
        let store = Store::open(dir.path().join("quill.db")).unwrap();
        store.checkpoint().unwrap();
    }
}
