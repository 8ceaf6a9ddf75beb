//! Persistence layer: three logical stores on one transactional substrate.
//!
//! Documents, graph nodes, and index meta live in named tables of a single
//! redb database. Each store is written in its own transaction; the node
//! store uses chunked granular writes driven by the touched set an
//! insertion reports.

/// Store errors.
pub mod error;
/// The redb-backed store.
pub mod store;

pub use error::StoreError;
pub use store::IndexStore;
