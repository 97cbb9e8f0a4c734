//! Storage-specific error types for SQLite operations.
//!
//! This module wraps `rusqlite`/`r2d2` errors and converts them to the
//! database-agnostic [`vnquote_core::CoreError`] taxonomy used by every
//! other crate.

use thiserror::Error;
use vnquote_core::CoreError;

/// Storage-specific errors that wrap rusqlite and r2d2 types.
///
/// Internal to the storage layer; converted to `CoreError` before being
/// returned to callers.
#[derive(Error, Debug)]
pub enum StorageError {
    #[error("connection pool error: {0}")]
    PoolError(#[from] r2d2::Error),

    #[error("query execution failed: {0}")]
    QueryFailed(#[from] rusqlite::Error),

    #[error("migration failed: {0}")]
    MigrationFailed(String),

    #[error("serialization error: {0}")]
    SerializationError(String),

    #[error("writer actor unavailable")]
    WriterUnavailable,
}

impl From<StorageError> for CoreError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::QueryFailed(rusqlite::Error::QueryReturnedNoRows) => {
                CoreError::NotFound("record not found".to_string())
            }
            StorageError::PoolError(e) => CoreError::ServiceUnavailable(format!("db pool: {e}")),
            StorageError::QueryFailed(e) => CoreError::Internal(format!("db query: {e}")),
            StorageError::MigrationFailed(e) => CoreError::ServiceUnavailable(format!("db migration: {e}")),
            StorageError::SerializationError(e) => CoreError::Internal(format!("db row decode: {e}")),
            StorageError::WriterUnavailable => CoreError::ServiceUnavailable("db writer actor stopped".to_string()),
        }
    }
}

/// Extension trait for converting rusqlite/r2d2 results straight to
/// `CoreResult`, mirroring the teacher's `IntoCore`.
pub trait IntoCore<T> {
    fn into_core(self) -> vnquote_core::CoreResult<T>;
}

impl<T> IntoCore<T> for std::result::Result<T, rusqlite::Error> {
    fn into_core(self) -> vnquote_core::CoreResult<T> {
        self.map_err(|e| StorageError::from(e).into())
    }
}

impl<T> IntoCore<T> for std::result::Result<T, r2d2::Error> {
    fn into_core(self) -> vnquote_core::CoreResult<T> {
        self.map_err(|e| StorageError::from(e).into())
    }
}
