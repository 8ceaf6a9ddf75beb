//! Core document types for corpusdb.
//!
//! A `Document` is a stored record with text content, a unique UUID,
//! arbitrary key-value metadata, the embedding vector it was indexed under,
//! and its creation timestamp. The embedding is stored redundantly with the
//! graph node so a migration can re-embed documents without re-tokenizing.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

/// A typed metadata value attached to a document.
///
/// Opaque to the index core. Uses the default externally-tagged serde
/// representation so values survive the bincode store codec.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum MetadataValue {
    /// Boolean value (`true` / `false`).
    Boolean(bool),
    /// 64-bit signed integer.
    Integer(i64),
    /// 64-bit floating-point number.
    Float(f64),
    /// UTF-8 string.
    String(String),
}

/// A stored document with text content, unique ID, metadata, and embedding.
///
/// Documents are the primary unit of storage. `id` and `created_at` are
/// assigned once at insertion and never change; `embedding` is rewritten
/// only by a migration, atomically at the batch boundary.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Document {
    /// Unique identifier (UUID v4). Equal to the owning graph node's id.
    pub id: Uuid,
    /// Original source text.
    pub text: String,
    /// Arbitrary key-value metadata, opaque to the core.
    pub metadata: HashMap<String, MetadataValue>,
    /// The vector this document is indexed under.
    pub embedding: Vec<f32>,
    /// Wall-clock timestamp of first insertion. Preserved across migrations.
    pub created_at: DateTime<Utc>,
}

impl Document {
    /// Creates a new document with a fresh UUID and the current timestamp.
    pub fn new(
        text: String,
        metadata: HashMap<String, MetadataValue>,
        embedding: Vec<f32>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            text,
            metadata,
            embedding,
            created_at: Utc::now(),
        }
    }

    /// Returns a copy of this document carrying a replacement embedding.
    /// Id, text, metadata, and timestamp are preserved. Used by migration.
    pub fn with_embedding(&self, embedding: Vec<f32>) -> Self {
        Self {
            id: self.id,
            text: self.text.clone(),
            metadata: self.metadata.clone(),
            embedding,
            created_at: self.created_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_assigns_distinct_ids() {
        let a = Document::new("same text".into(), HashMap::new(), vec![1.0]);
        let b = Document::new("same text".into(), HashMap::new(), vec![1.0]);
        assert_ne!(a.id, b.id);
    }

    #[test]
    fn test_with_embedding_preserves_identity() {
        let mut metadata = HashMap::new();
        metadata.insert("source".to_string(), MetadataValue::String("web".into()));
        let doc = Document::new("hello".into(), metadata, vec![1.0, 0.0]);

        let updated = doc.with_embedding(vec![0.0, 1.0, 0.5]);
        assert_eq!(updated.id, doc.id);
        assert_eq!(updated.text, doc.text);
        assert_eq!(updated.metadata, doc.metadata);
        assert_eq!(updated.created_at, doc.created_at);
        assert_eq!(updated.embedding, vec![0.0, 1.0, 0.5]);
    }

    #[test]
    fn test_bincode_roundtrip() {
        let mut metadata = HashMap::new();
        metadata.insert("flag".to_string(), MetadataValue::Boolean(true));
        metadata.insert("rank".to_string(), MetadataValue::Integer(7));
        let doc = Document::new("round trip".into(), metadata, vec![0.25, -0.5]);

        let bytes = bincode::serialize(&doc).unwrap();
        let back: Document = bincode::deserialize(&bytes).unwrap();
        assert_eq!(back.id, doc.id);
        assert_eq!(back.text, doc.text);
        assert_eq!(back.metadata, doc.metadata);
        assert_eq!(back.embedding, doc.embedding);
        assert_eq!(back.created_at, doc.created_at);
    }
}
