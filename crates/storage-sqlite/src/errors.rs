//! Storage-specific error types for SQLite operations.
//!
//! Wraps `rusqlite` failures and converts them into the engine-agnostic
//! [`StoreError`] the market data cache understands.

use marketgate_market_data::StoreError;
use thiserror::Error;

/// Errors raised by the SQLite blob store.
#[derive(Error, Debug)]
pub enum StorageError {
    #[error("Database connection failed: {0}")]
    ConnectionFailed(String),

    #[error("Query execution failed: {0}")]
    QueryFailed(#[from] rusqlite::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<StorageError> for StoreError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::ConnectionFailed(e) => StoreError::Backend(e),
            StorageError::QueryFailed(e) => StoreError::Backend(e.to_string()),
            StorageError::Io(e) => StoreError::Io(e.to_string()),
        }
    }
}

/// Shorthand for results of storage operations.
pub type Result<T> = std::result::Result<T, StorageError>;
