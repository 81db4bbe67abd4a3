//! Ordered, forward-only schema migrations.
//!
//! Each migration runs exactly once, tracked in the `schema_migrations`
//! ledger table, and inside its own transaction so a crash mid-apply
//! leaves no partial schema behind. There is no down path.

use chrono::Utc;
use rusqlite::Connection;
use tracing::info;

use crate::error::{Result, StoreError};

/// Individual migration with version metadata.
#[derive(Debug, Clone)]
pub struct Migration {
    pub version: u32,
    pub description: &'static str,
    pub up: &'static str,
}

impl Migration {
    pub const fn new(version: u32, description: &'static str, up: &'static str) -> Self {
        Self {
            version,
            description,
            up,
        }
    }

    /// Checks whether this migration has been applied.
    fn is_applied(&self, conn: &Connection) -> Result<bool> {
        let exists: bool = conn.query_row(
            "SELECT EXISTS(SELECT 1 FROM schema_migrations WHERE version = ?1)",
            [self.version],
            |row| row.get(0),
        )?;
        Ok(exists)
    }

    /// Applies this migration and records it, in one transaction.
    fn apply(&self, conn: &mut Connection) -> Result<()> {
        let tx = conn.transaction()?;
        tx.execute_batch(self.up).map_err(|e| {
            StoreError::Storage(format!(
                "Migration {} ({}) failed: {}",
                self.version, self.description, e
            ))
        })?;
        tx.execute(
            "INSERT INTO schema_migrations (version, applied_at, description) VALUES (?1, ?2, ?3)",
            rusqlite::params![self.version, Utc::now().to_rfc3339(), self.description],
        )?;
        tx.commit()?;
        Ok(())
    }
}

/// Registry of all migrations in version order.
pub const MIGRATIONS: &[Migration] = &[
    Migration::new(
        1,
        "Initial schema: users, projects, notes, tasks, task_notes, audit_log, note_search",
        include_str!("migrations/001_initial_schema.sql"),
    ),
    Migration::new(
        2,
        "Lookup indexes for list filters and audit queries",
        include_str!("migrations/002_lookup_indexes.sql"),
    ),
];

/// Applies all pending migrations in version order.
///
/// A failing migration aborts with a descriptive error; already-applied
/// versions are skipped.
pub fn apply_pending_migrations(conn: &mut Connection) -> Result<()> {
    ensure_migration_table_exists(conn)?;

    for migration in MIGRATIONS {
        if !migration.is_applied(conn)? {
            migration.apply(conn)?;
            info!(
                version = migration.version,
                description = migration.description,
                "applied migration"
            );
        }
    }

    Ok(())
}

fn ensure_migration_table_exists(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS schema_migrations (
            version INTEGER PRIMARY KEY,
            applied_at TEXT NOT NULL,
            description TEXT
        );
        "#,
    )?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn migrations_are_ordered_and_unique() {
        let mut last = 0;
        for migration in MIGRATIONS {
            assert!(migration.version > last, "versions must strictly increase");
            last = migration.version;
        }
    }

    #[test]
    fn apply_is_idempotent() {
        let mut conn = Connection::open_in_memory().unwrap();
        apply_pending_migrations(&mut conn).unwrap();
        apply_pending_migrations(&mut conn).unwrap();

        let applied: u32 = conn
            .query_row("SELECT COUNT(*) FROM schema_migrations", [], |row| {
                row.get(0)
            })
            .unwrap();
        assert_eq!(applied as usize, MIGRATIONS.len());
    }

    #[test]
    fn schema_tables_exist_after_apply() {
        let mut conn = Connection::open_in_memory().unwrap();
        apply_pending_migrations(&mut conn).unwrap();

        let tables: Vec<String> = conn
            .prepare("SELECT name FROM sqlite_master WHERE type = 'table' ORDER BY name")
            .unwrap()
            .query_map([], |row| row.get(0))
            .unwrap()
            .filter_map(|r| r.ok())
            .collect();

        for table in ["users", "projects", "notes", "tasks", "task_notes", "audit_log"] {
            assert!(tables.contains(&table.to_string()), "missing {}", table);
        }
    }

    #[test]
    fn failing_migration_reports_version() {
        let mut conn = Connection::open_in_memory().unwrap();
        ensure_migration_table_exists(&conn).unwrap();

        let broken = Migration::new(99, "broken", "CREATE TABLE; -- syntax error");
        let err = broken.apply(&mut conn).unwrap_err();
        assert!(err.to_string().contains("Migration 99"));
    }
}
