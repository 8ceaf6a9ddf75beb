//! Crate-surface error type.
//!
//! Storage-layer failures are wrapped via `#[from]`; everything else maps
//! one-to-one onto a caller-visible failure mode. No operation retries
//! internally; the caller decides whether to resubmit.

use thiserror::Error;
use uuid::Uuid;

use crate::storage::StoreError;

/// Errors surfaced by the index, the migration controller, and the dispatch
/// boundary.
#[derive(Debug, Error)]
pub enum IndexError {
    /// A graph insert was attempted with an id that is already present.
    #[error("duplicate id: {0}")]
    DuplicateId(Uuid),

    /// A vector's length does not match the dimensionality fixed by the
    /// first inserted vector.
    #[error("dimension mismatch: index holds {expected}-dimensional vectors, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    /// The embedder capability failed. Nothing has been persisted.
    #[error("embedding failed: {0}")]
    Embedder(String),

    /// A second migration was started while one is running.
    #[error("a migration is already running")]
    AlreadyRunning,

    /// The dispatch boundary received a request of an unrecognized type.
    #[error("unknown request type: {0}")]
    UnknownRequest(String),

    /// A known request carried a payload that failed to deserialize.
    #[error("invalid request payload: {0}")]
    BadRequest(String),

    /// Unexpected internal failure (e.g. response encoding).
    #[error("internal error: {0}")]
    Internal(String),

    /// A store transaction failed. The in-memory graph may be ahead of disk.
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, IndexError>;
