//! Error types for the aggregate store

use rusqlite::ErrorCode;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum StoreError {
    /// Malformed delta or submission, rejected before any storage interaction
    #[error("Invalid delta: {0}")]
    InvalidDelta(String),

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Schema error: {0}")]
    Schema(String),

    /// Submission workflow refused the requested transition
    #[error("Submission error: {0}")]
    Submission(String),

    #[error("Connection lock poisoned")]
    LockPoisoned,
}

impl StoreError {
    /// True when the storage layer gave up waiting on a lock held by another
    /// writer. The batch was rolled back and may be retried as-is.
    pub fn is_transient(&self) -> bool {
        match self {
            StoreError::Database(rusqlite::Error::SqliteFailure(err, _)) => matches!(
                err.code,
                ErrorCode::DatabaseBusy | ErrorCode::DatabaseLocked
            ),
            _ => false,
        }
    }
}

pub type StoreResult<T> = Result<T, StoreError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_busy_is_transient() {
        let busy = rusqlite::Error::SqliteFailure(
            rusqlite::ffi::Error::new(rusqlite::ffi::SQLITE_BUSY),
            None,
        );
        assert!(StoreError::from(busy).is_transient());

        let constraint = rusqlite::Error::SqliteFailure(
            rusqlite::ffi::Error::new(rusqlite::ffi::SQLITE_CONSTRAINT),
            None,
        );
        assert!(!StoreError::from(constraint).is_transient());
        assert!(!StoreError::InvalidDelta("empty roster".into()).is_transient());
    }
}
