//! Error types for Quill core operations.
//!
//! This module defines the error hierarchy for all store operations.
//! Errors are descriptive at the core level; calling layers (HTTP, CLI)
//! map these to status codes or user-facing messages.

use thiserror::Error;

/// Result type alias for Quill store operations.
pub type Result<T> = std::result::Result<T, StoreError>;

/// Core error type for store operations.
///
/// Every failed operation distinguishes "nothing happened, safe to retry"
/// (all variants except `Storage`) from "state may be inconsistent, stop
/// and investigate" (`Storage` only).
#[derive(Debug, Error)]
pub enum StoreError {
    /// Referenced record does not exist
    #[error("Not found: {0}")]
    NotFound(String),

    /// Uniqueness or referential constraint violation
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Field constraint violation, rejected before any transaction
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Cyclic or cross-project parent-task link
    #[error("Invalid hierarchy: {0}")]
    InvalidHierarchy(String),

    /// Write lock contention exceeded the retry budget
    #[error("Store busy: write lock could not be acquired")]
    Busy,

    /// Underlying I/O or corruption error, surfaced as-is
    #[error("Storage error: {0}")]
    Storage(String),
}

impl From<rusqlite::Error> for StoreError {
    fn from(err: rusqlite::Error) -> Self {
        match &err {
            rusqlite::Error::SqliteFailure(code, message) => match code.code {
                rusqlite::ErrorCode::ConstraintViolation => StoreError::Conflict(
                    message
                        .clone()
                        .unwrap_or_else(|| "constraint violation".to_string()),
                ),
                rusqlite::ErrorCode::DatabaseBusy | rusqlite::ErrorCode::DatabaseLocked => {
                    StoreError::Busy
                }
                _ => StoreError::Storage(err.to_string()),
            },
            _ => StoreError::Storage(err.to_string()),
        }
    }
}

impl From<std::io::Error> for StoreError {
    fn from(err: std::io::Error) -> Self {
        StoreError::Storage(err.to_string())
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(err: serde_json::Error) -> Self {
        StoreError::Storage(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn constraint_violation_maps_to_conflict() {
        let conn = rusqlite::Connection::open_in_memory().unwrap();
        conn.execute_batch("CREATE TABLE t (name TEXT UNIQUE); INSERT INTO t VALUES ('a');")
            .unwrap();
        let err = conn
            .execute("INSERT INTO t VALUES ('a')", [])
            .map_err(StoreError::from)
            .unwrap_err();
        assert!(matches!(err, StoreError::Conflict(_)));
    }

    #[test]
    fn io_error_maps_to_storage() {
        let io = std::io::Error::new(std::io::ErrorKind::Other, "disk gone");
        let err = StoreError::from(io);
        assert!(matches!(err, StoreError::Storage(_)));
    }
}
