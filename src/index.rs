//! Indexer façade: orchestrates embedder → graph → stores.
//!
//! `SemanticIndex` owns the durable store, the in-memory graph behind a
//! write lock, and the current embedder capability. Embedding always
//! happens before any mutation, so an embedder failure persists nothing.
//! Graph mutation precedes the store writes; the store transactions are
//! independent, and the tolerated crash states (orphan documents, ghost
//! nodes) are healed by migration or clear.

use crate::document::{Document, MetadataValue};
use crate::embed::Embedder;
use crate::error::{IndexError, Result};
use crate::hnsw::similarity::cosine_similarity;
use crate::hnsw::{HnswGraph, HnswNode, HnswParams};
use crate::storage::IndexStore;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use uuid::Uuid;

/// Input for a document that has not been embedded yet.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewDocument {
    /// Source text.
    pub text: String,
    /// Arbitrary metadata, opaque to the core.
    #[serde(default)]
    pub metadata: HashMap<String, MetadataValue>,
}

/// A search hit: the document plus its cosine similarity to the query.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchResult {
    pub document: Document,
    pub score: f32,
}

/// The indexer façade. All mutations go through `&self`; exclusive access
/// is provided structurally by the serial dispatch queue, and the graph
/// lock keeps concurrent readers from observing a half-inserted node.
pub struct SemanticIndex {
    store: IndexStore,
    graph: RwLock<HnswGraph>,
    embedder: RwLock<Arc<dyn Embedder>>,
    loaded: AtomicBool,
}

impl SemanticIndex {
    /// Create an index over an already-open store.
    pub fn new(store: IndexStore, embedder: Arc<dyn Embedder>) -> Self {
        Self {
            store,
            graph: RwLock::new(HnswGraph::new(HnswParams::default())),
            embedder: RwLock::new(embedder),
            loaded: AtomicBool::new(false),
        }
    }

    /// Open or create a persistent index at the given path.
    pub fn open(path: impl AsRef<Path>, embedder: Arc<dyn Embedder>) -> Result<Self> {
        Ok(Self::new(IndexStore::open(path)?, embedder))
    }

    /// Create a non-persistent index for tests.
    pub fn in_memory(embedder: Arc<dyn Embedder>) -> Result<Self> {
        Ok(Self::new(IndexStore::in_memory()?, embedder))
    }

    /// Load persisted state into memory. Idempotent; must precede other
    /// operations. A missing meta record means a fresh, empty index.
    pub fn init(&self) -> Result<()> {
        if self.loaded.load(Ordering::Acquire) {
            return Ok(());
        }
        match self.store.read_meta()? {
            Some(meta) => {
                let nodes = self.store.load_nodes()?;
                let count = nodes.len();
                *self.graph.write() = HnswGraph::restore(meta, nodes);
                tracing::info!(nodes = count, "loaded persisted index");
            }
            None => {
                tracing::info!("no persisted meta; starting empty");
            }
        }
        self.loaded.store(true, Ordering::Release);
        Ok(())
    }

    /// Current embedder capability.
    pub fn embedder(&self) -> Arc<dyn Embedder> {
        self.embedder.read().clone()
    }

    /// Rebind the embedder capability (the `CONFIGURE` operation).
    pub fn set_embedder(&self, embedder: Arc<dyn Embedder>) {
        tracing::info!(model = embedder.model_id(), "rebinding embedder");
        *self.embedder.write() = embedder;
    }

    /// Embed and index a single document.
    pub async fn add_document(
        &self,
        text: String,
        metadata: HashMap<String, MetadataValue>,
    ) -> Result<Document> {
        let mut docs = self.add_documents(vec![NewDocument { text, metadata }]).await?;
        docs.pop()
            .ok_or_else(|| IndexError::Internal("batch of one produced no document".into()))
    }

    /// Embed and index a batch with a single embedder call and one combined
    /// touched-set write.
    pub async fn add_documents(&self, items: Vec<NewDocument>) -> Result<Vec<Document>> {
        if items.is_empty() {
            return Ok(Vec::new());
        }
        let texts: Vec<String> = items.iter().map(|i| i.text.clone()).collect();
        let vectors = self.embedder().embed_batch(&texts).await?;
        if vectors.len() != items.len() {
            return Err(IndexError::Embedder(format!(
                "embedder returned {} vectors for {} texts",
                vectors.len(),
                items.len()
            )));
        }

        let docs: Vec<Document> = items
            .into_iter()
            .zip(vectors)
            .map(|(item, vector)| Document::new(item.text, item.metadata, vector))
            .collect();
        self.index_documents(&docs)?;
        Ok(docs)
    }

    /// Index already-embedded documents, preserving their ids and
    /// timestamps. Used by migration and by batch adds after embedding.
    pub fn index_documents(&self, docs: &[Document]) -> Result<()> {
        if docs.is_empty() {
            return Ok(());
        }
        let (touched_nodes, meta) = {
            let mut graph = self.graph.write();
            let mut touched: HashSet<Uuid> = HashSet::new();
            for doc in docs {
                touched.extend(graph.insert(doc.id, doc.embedding.clone())?);
            }
            let nodes: Vec<HnswNode> = touched
                .iter()
                .filter_map(|id| graph.nodes.get(id).cloned())
                .collect();
            (nodes, graph.meta())
        };

        self.store.put_documents(docs)?;
        self.store.put_nodes(&touched_nodes)?;
        self.store.write_meta(&meta)?;
        tracing::debug!(
            documents = docs.len(),
            touched = touched_nodes.len(),
            "indexed batch"
        );
        Ok(())
    }

    /// Search for the `k` most similar documents to `query`.
    ///
    /// With `use_brute_force` the document store is scanned linearly and
    /// ranked by exact cosine similarity; otherwise the graph is searched.
    /// Results are ordered by descending score; ids that cannot be resolved
    /// to a document are dropped with a warning.
    pub async fn search(
        &self,
        query: &str,
        k: usize,
        use_brute_force: bool,
    ) -> Result<Vec<SearchResult>> {
        let vector = self.embedder().embed(query).await?;
        if use_brute_force {
            self.brute_force_search(&vector, k)
        } else {
            self.graph_search(&vector, k)
        }
    }

    fn graph_search(&self, vector: &[f32], k: usize) -> Result<Vec<SearchResult>> {
        let hits = self.graph.read().knn_search(vector, k);
        let ids: Vec<Uuid> = hits.iter().map(|(id, _)| *id).collect();
        let docs = self.store.get_documents(&ids)?;

        let mut out = Vec::with_capacity(hits.len());
        for ((id, score), doc) in hits.into_iter().zip(docs) {
            match doc {
                Some(document) => out.push(SearchResult { document, score }),
                None => {
                    tracing::warn!(id = %id, "dropping ghost node from search results");
                }
            }
        }
        Ok(out)
    }

    fn brute_force_search(&self, vector: &[f32], k: usize) -> Result<Vec<SearchResult>> {
        let mut scored: Vec<SearchResult> = self
            .store
            .all_documents()?
            .into_iter()
            .map(|document| {
                let score = cosine_similarity(vector, &document.embedding);
                SearchResult { document, score }
            })
            .collect();
        scored.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        scored.truncate(k);
        Ok(scored)
    }

    /// All stored documents, in creation order.
    pub fn get_all_documents(&self) -> Result<Vec<Document>> {
        Ok(self.store.all_documents()?)
    }

    /// Number of stored documents.
    pub fn document_count(&self) -> Result<u64> {
        Ok(self.store.document_count()?)
    }

    /// Number of persisted graph nodes.
    pub fn node_count(&self) -> Result<u64> {
        Ok(self.store.node_count()?)
    }

    /// Empty everything: documents, nodes, meta, and the in-memory graph.
    pub fn clear(&self) -> Result<()> {
        self.store.clear()?;
        self.graph.write().reset();
        tracing::info!("index cleared");
        Ok(())
    }

    /// Drop the graph and meta while preserving documents. The migration
    /// primitive.
    pub fn reset_index(&self) -> Result<()> {
        self.store.clear_index()?;
        self.graph.write().reset();
        tracing::info!("graph reset; documents retained");
        Ok(())
    }
}
