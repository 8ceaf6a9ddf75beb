//! # corpusdb
//!
//! Persistent semantic document index: HNSW approximate nearest neighbor
//! search over embedded documents, with incremental graph persistence and
//! a live re-embedding migration protocol.
//!
//! The in-memory hierarchical graph is rebuilt from a transactional
//! key-value store at startup; each insertion persists only the graph
//! nodes it touched. Embedding is delegated to a pluggable capability
//! (local deterministic or remote HTTP), and callers reach the index
//! through a single-consumer message dispatch.

/// Global tuning constants.
pub mod config;
/// The single-consumer request/reply boundary.
pub mod dispatch;
/// Document and metadata types.
pub mod document;
/// Embedder capability and its reference implementations.
pub mod embed;
/// Crate-surface error type.
pub mod error;
/// HNSW graph: structure, insertion, search, similarity.
pub mod hnsw;
/// The indexer façade.
pub mod index;
/// Re-embedding migration controller.
pub mod migrate;
/// Durable stores on the transactional substrate.
pub mod storage;

pub use document::{Document, MetadataValue};
pub use embed::{Embedder, EmbedderConfig, LocalEmbedder, OpenAiEmbedder};
pub use error::{IndexError, Result};
pub use index::{NewDocument, SearchResult, SemanticIndex};
pub use migrate::{MigrationController, MigrationStatus};
pub use storage::IndexStore;
