//! Redb-backed store for documents, graph nodes, and index meta.
//!
//! Layout (schema version 3):
//! - `documents`: uuid key, bincode [`Document`] value.
//! - `documents_by_created_at`: ordering index; key is creation micros (BE)
//!   followed by the uuid bytes, value empty. Supports ordered scans.
//! - `hnsw_nodes`: uuid key, bincode [`HnswNode`] value.
//! - `meta`: the `"hnsw-meta"` key plus a schema-version record.
//!
//! Missing tables are created additively at open. Node writes are chunked
//! at [`config::NODE_WRITE_CHUNK`] keys per transaction. The stores are
//! independent transactions; a crash between them can leave orphan
//! documents or ghost nodes, both tolerated at read time.

use crate::config;
use crate::document::Document;
use crate::hnsw::{HnswNode, IndexMeta};
use crate::storage::StoreError;
use redb::{Database, ReadableTable, ReadableTableMetadata, TableDefinition};
use std::path::Path;
use uuid::Uuid;

const DOCUMENTS: TableDefinition<'static, &[u8], &[u8]> = TableDefinition::new("documents");
const DOCUMENTS_BY_CREATED_AT: TableDefinition<'static, &[u8], &[u8]> =
    TableDefinition::new("documents_by_created_at");
const NODES: TableDefinition<'static, &[u8], &[u8]> = TableDefinition::new("hnsw_nodes");
const META: TableDefinition<'static, &str, &[u8]> = TableDefinition::new("meta");

/// Well-known key holding the serialized [`IndexMeta`].
const META_KEY: &str = "hnsw-meta";
/// Key recording the persistent layout version.
const SCHEMA_VERSION_KEY: &str = "schema-version";

/// Ordering-index key: creation micros big-endian, then the uuid bytes so
/// same-instant documents stay distinct.
fn created_at_key(doc: &Document) -> [u8; 24] {
    let mut key = [0u8; 24];
    let micros = doc.created_at.timestamp_micros().max(0) as u64;
    key[..8].copy_from_slice(&micros.to_be_bytes());
    key[8..].copy_from_slice(doc.id.as_bytes());
    key
}

/// Durable store for the index. One redb database, three logical stores.
pub struct IndexStore {
    db: Database,
}

impl IndexStore {
    /// Open or create the store at the given path.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let db = Database::create(path.as_ref())?;
        let store = Self { db };
        store.ensure_schema()?;
        Ok(store)
    }

    /// Create a non-persistent store for tests.
    pub fn in_memory() -> Result<Self, StoreError> {
        let db = Database::builder()
            .create_with_backend(redb::backends::InMemoryBackend::new())?;
        let store = Self { db };
        store.ensure_schema()?;
        Ok(store)
    }

    /// Additively create any missing table and record the schema version.
    fn ensure_schema(&self) -> Result<(), StoreError> {
        let txn = self.db.begin_write()?;
        {
            txn.open_table(DOCUMENTS)?;
            txn.open_table(DOCUMENTS_BY_CREATED_AT)?;
            txn.open_table(NODES)?;
            let mut meta = txn.open_table(META)?;
            if meta.get(SCHEMA_VERSION_KEY)?.is_none() {
                meta.insert(SCHEMA_VERSION_KEY, config::SCHEMA_VERSION.to_be_bytes().as_slice())?;
            }
        }
        txn.commit()?;
        Ok(())
    }

    // ── Documents ──────────────────────────────────────────────────────

    /// Write a batch of documents in one transaction, maintaining the
    /// creation-time ordering index. Existing ids are overwritten.
    pub fn put_documents(&self, docs: &[Document]) -> Result<(), StoreError> {
        if docs.is_empty() {
            return Ok(());
        }
        let txn = self.db.begin_write()?;
        {
            let mut table = txn.open_table(DOCUMENTS)?;
            let mut by_time = txn.open_table(DOCUMENTS_BY_CREATED_AT)?;
            for doc in docs {
                let value = bincode::serialize(doc)?;
                table.insert(doc.id.as_bytes().as_slice(), value.as_slice())?;
                by_time.insert(created_at_key(doc).as_slice(), b"".as_slice())?;
            }
        }
        txn.commit()?;
        Ok(())
    }

    /// Fetch a single document by id.
    pub fn get_document(&self, id: &Uuid) -> Result<Option<Document>, StoreError> {
        let txn = self.db.begin_read()?;
        let table = txn.open_table(DOCUMENTS)?;
        match table.get(id.as_bytes().as_slice())? {
            Some(guard) => Ok(Some(bincode::deserialize(guard.value())?)),
            None => Ok(None),
        }
    }

    /// Fetch several documents in one read transaction; `None` per missing id.
    pub fn get_documents(&self, ids: &[Uuid]) -> Result<Vec<Option<Document>>, StoreError> {
        let txn = self.db.begin_read()?;
        let table = txn.open_table(DOCUMENTS)?;
        let mut out = Vec::with_capacity(ids.len());
        for id in ids {
            match table.get(id.as_bytes().as_slice())? {
                Some(guard) => out.push(Some(bincode::deserialize(guard.value())?)),
                None => out.push(None),
            }
        }
        Ok(out)
    }

    /// All documents in creation order. Index entries whose document is
    /// gone are skipped with a warning.
    pub fn all_documents(&self) -> Result<Vec<Document>, StoreError> {
        let txn = self.db.begin_read()?;
        let table = txn.open_table(DOCUMENTS)?;
        let by_time = txn.open_table(DOCUMENTS_BY_CREATED_AT)?;

        let mut out = Vec::new();
        for entry in by_time.iter()? {
            let (key, _) = entry?;
            let key = key.value();
            if key.len() != 24 {
                tracing::warn!(len = key.len(), "malformed ordering-index key; skipping");
                continue;
            }
            let id = Uuid::from_slice(&key[8..]).map_err(|e| StoreError::Codec(e.to_string()))?;
            match table.get(id.as_bytes().as_slice())? {
                Some(guard) => out.push(bincode::deserialize(guard.value())?),
                None => {
                    tracing::warn!(id = %id, "ordering index points at a missing document");
                }
            }
        }
        Ok(out)
    }

    /// Number of stored documents.
    pub fn document_count(&self) -> Result<u64, StoreError> {
        let txn = self.db.begin_read()?;
        let table = txn.open_table(DOCUMENTS)?;
        Ok(table.len()?)
    }

    // ── Nodes ──────────────────────────────────────────────────────────

    /// Write only the given (touched) nodes, chunked at
    /// [`config::NODE_WRITE_CHUNK`] keys per transaction to bound memory.
    pub fn put_nodes(&self, nodes: &[HnswNode]) -> Result<(), StoreError> {
        for chunk in nodes.chunks(config::NODE_WRITE_CHUNK) {
            let txn = self.db.begin_write()?;
            {
                let mut table = txn.open_table(NODES)?;
                for node in chunk {
                    let value = bincode::serialize(node)?;
                    table.insert(node.id.as_bytes().as_slice(), value.as_slice())?;
                }
            }
            txn.commit()?;
        }
        Ok(())
    }

    /// Stream every stored node into memory. Unreadable records are skipped
    /// with a warning rather than failing the load.
    pub fn load_nodes(&self) -> Result<Vec<HnswNode>, StoreError> {
        let txn = self.db.begin_read()?;
        let table = txn.open_table(NODES)?;
        let mut out = Vec::new();
        for entry in table.iter()? {
            let (key, value) = entry?;
            match bincode::deserialize::<HnswNode>(value.value()) {
                Ok(node) => out.push(node),
                Err(e) => {
                    tracing::warn!(
                        key = ?key.value(),
                        error = %e,
                        "skipping unreadable node record"
                    );
                }
            }
        }
        Ok(out)
    }

    /// Number of stored nodes.
    pub fn node_count(&self) -> Result<u64, StoreError> {
        let txn = self.db.begin_read()?;
        let table = txn.open_table(NODES)?;
        Ok(table.len()?)
    }

    // ── Meta ───────────────────────────────────────────────────────────

    /// Read the persisted index meta, or `None` for a fresh store.
    pub fn read_meta(&self) -> Result<Option<IndexMeta>, StoreError> {
        let txn = self.db.begin_read()?;
        let table = txn.open_table(META)?;
        match table.get(META_KEY)? {
            Some(guard) => Ok(Some(bincode::deserialize(guard.value())?)),
            None => Ok(None),
        }
    }

    /// Rewrite the index meta in its own transaction.
    pub fn write_meta(&self, meta: &IndexMeta) -> Result<(), StoreError> {
        let value = bincode::serialize(meta)?;
        let txn = self.db.begin_write()?;
        {
            let mut table = txn.open_table(META)?;
            table.insert(META_KEY, value.as_slice())?;
        }
        txn.commit()?;
        Ok(())
    }

    // ── Clear protocols ────────────────────────────────────────────────

    /// Wipe all three stores.
    pub fn clear(&self) -> Result<(), StoreError> {
        let txn = self.db.begin_write()?;
        txn.delete_table(DOCUMENTS)?;
        txn.delete_table(DOCUMENTS_BY_CREATED_AT)?;
        txn.delete_table(NODES)?;
        txn.delete_table(META)?;
        {
            txn.open_table(DOCUMENTS)?;
            txn.open_table(DOCUMENTS_BY_CREATED_AT)?;
            txn.open_table(NODES)?;
            let mut meta = txn.open_table(META)?;
            meta.insert(SCHEMA_VERSION_KEY, config::SCHEMA_VERSION.to_be_bytes().as_slice())?;
        }
        txn.commit()?;
        tracing::info!("cleared all stores");
        Ok(())
    }

    /// Wipe nodes and meta only, preserving documents. The primitive
    /// migration builds on.
    pub fn clear_index(&self) -> Result<(), StoreError> {
        let txn = self.db.begin_write()?;
        txn.delete_table(NODES)?;
        txn.delete_table(META)?;
        {
            txn.open_table(NODES)?;
            let mut meta = txn.open_table(META)?;
            meta.insert(SCHEMA_VERSION_KEY, config::SCHEMA_VERSION.to_be_bytes().as_slice())?;
        }
        txn.commit()?;
        tracing::info!("cleared node and meta stores; documents retained");
        Ok(())
    }
}
