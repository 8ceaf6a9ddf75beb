//! Global configuration constants for corpusdb.
//!
//! Tuning parameters for the HNSW graph, the persistence layer, and the
//! migration controller. These are compile-time defaults; the embedder is
//! configured at runtime through the dispatch boundary.

/// Default number of bidirectional links per HNSW node per layer.
///
/// Higher values improve recall but increase memory and build time.
/// Typical range: 8–64. Default: 16.
pub const HNSW_DEFAULT_M: usize = 16;

/// Default ef parameter during HNSW index construction.
///
/// Controls the size of the dynamic candidate list during insertion.
/// Higher values produce a better graph but slow down build time.
pub const HNSW_DEFAULT_EF_CONSTRUCTION: usize = 200;

/// Default ef parameter during HNSW search.
///
/// Controls the size of the dynamic candidate list during query.
/// Higher values improve recall at the cost of latency.
pub const HNSW_DEFAULT_EF_SEARCH: usize = 200;

/// Maximum layer a node may be assigned. Caps pathological level towers.
pub const HNSW_MAX_LEVEL: usize = 16;

/// Denominator guard for cosine similarity. Zero vectors score 0 rather
/// than dividing by zero.
pub const SIMILARITY_EPSILON: f32 = 1e-6;

/// Maximum number of graph nodes written per storage transaction.
///
/// Touched-node writes are chunked at this size to bound the memory held
/// by a single transaction.
pub const NODE_WRITE_CHUNK: usize = 500;

/// Default number of documents re-embedded per migration batch.
pub const MIGRATION_BATCH_SIZE: usize = 50;

/// Default number of results returned by a search request.
pub const DEFAULT_SEARCH_K: usize = 5;

/// Persistent layout version. Missing stores are created additively at open.
pub const SCHEMA_VERSION: u32 = 3;

/// Default base URL for the remote embedder.
pub const DEFAULT_OPENAI_ENDPOINT: &str = "https://api.openai.com/v1";

/// Default model identifier for the remote embedder.
pub const DEFAULT_OPENAI_MODEL: &str = "text-embedding-3-small";

/// Default model identifier for the local embedder.
pub const DEFAULT_LOCAL_MODEL: &str = "all-MiniLM-L6-v2";

/// Embedding dimension produced by the local embedder.
pub const LOCAL_EMBEDDING_DIMENSION: usize = 384;
