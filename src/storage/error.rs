//! Storage error type wrapping the redb and codec surfaces.

use thiserror::Error;

/// Errors produced by the persistence layer.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The database could not be opened or created.
    #[error("failed to open store: {0}")]
    Open(String),

    /// A transaction could not be started or committed.
    #[error("transaction failed: {0}")]
    Transaction(String),

    /// A table could not be opened or dropped.
    #[error("table access failed: {0}")]
    Table(String),

    /// A read or write inside a transaction failed.
    #[error("storage operation failed: {0}")]
    Storage(String),

    /// A record failed to serialize or deserialize.
    #[error("serialization failed: {0}")]
    Codec(String),
}

impl From<redb::DatabaseError> for StoreError {
    fn from(e: redb::DatabaseError) -> Self {
        StoreError::Open(e.to_string())
    }
}

impl From<redb::TransactionError> for StoreError {
    fn from(e: redb::TransactionError) -> Self {
        StoreError::Transaction(e.to_string())
    }
}

impl From<redb::CommitError> for StoreError {
    fn from(e: redb::CommitError) -> Self {
        StoreError::Transaction(e.to_string())
    }
}

impl From<redb::TableError> for StoreError {
    fn from(e: redb::TableError) -> Self {
        StoreError::Table(e.to_string())
    }
}

impl From<redb::StorageError> for StoreError {
    fn from(e: redb::StorageError) -> Self {
        StoreError::Storage(e.to_string())
    }
}

impl From<bincode::Error> for StoreError {
    fn from(e: bincode::Error) -> Self {
        StoreError::Codec(e.to_string())
    }
}
