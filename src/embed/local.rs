//! Deterministic local embedder.
//!
//! Feature-hashed bag-of-tokens embedding: each lowercased alphanumeric
//! token is hashed (keyed by the model name) into one of the output
//! dimensions with a hash-derived sign, and the result is L2-normalized.
//! Texts sharing tokens score high under cosine similarity, identical
//! texts embed identically across processes, and no model weights are
//! needed. Stands in for a real local model runner and doubles as the
//! deterministic embedder the test suite relies on.

use crate::config;
use crate::embed::Embedder;
use crate::error::Result;
use async_trait::async_trait;
use std::hash::{Hash, Hasher};

/// Deterministic feature-hashing embedder.
pub struct LocalEmbedder {
    model_name: String,
    dimension: usize,
}

impl LocalEmbedder {
    /// Create an embedder with the default dimension.
    pub fn new(model_name: &str) -> Self {
        Self::with_dimension(model_name, config::LOCAL_EMBEDDING_DIMENSION)
    }

    /// Create an embedder with an explicit output dimension.
    pub fn with_dimension(model_name: &str, dimension: usize) -> Self {
        Self {
            model_name: model_name.to_string(),
            dimension,
        }
    }

    /// Output dimension of every produced vector.
    pub fn dimension(&self) -> usize {
        self.dimension
    }

    fn token_hash(&self, token: &str) -> u64 {
        // DefaultHasher with fixed keys: stable across processes and runs.
        let mut hasher = std::collections::hash_map::DefaultHasher::new();
        self.model_name.hash(&mut hasher);
        token.hash(&mut hasher);
        hasher.finish()
    }

    fn embed_text(&self, text: &str) -> Vec<f32> {
        let mut v = vec![0.0f32; self.dimension];
        let lowered = text.to_lowercase();
        for token in lowered
            .split(|c: char| !c.is_alphanumeric())
            .filter(|t| !t.is_empty())
        {
            let h = self.token_hash(token);
            let bucket = (h % self.dimension as u64) as usize;
            let sign = if h & (1 << 63) == 0 { 1.0 } else { -1.0 };
            v[bucket] += sign;
        }
        let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > 0.0 {
            for x in &mut v {
                *x /= norm;
            }
        }
        v
    }
}

#[async_trait]
impl Embedder for LocalEmbedder {
    fn model_id(&self) -> &str {
        &self.model_name
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        Ok(self.embed_text(text))
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        Ok(texts.iter().map(|t| self.embed_text(t)).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hnsw::cosine_similarity;

    fn embedder() -> LocalEmbedder {
        LocalEmbedder::new("test-model")
    }

    #[tokio::test]
    async fn test_deterministic() {
        let e = embedder();
        let a = e.embed("the quick brown fox").await.unwrap();
        let b = e.embed("the quick brown fox").await.unwrap();
        assert_eq!(a, b);
    }

    #[tokio::test]
    async fn test_output_dimension() {
        let e = LocalEmbedder::with_dimension("m", 64);
        let v = e.embed("hello").await.unwrap();
        assert_eq!(v.len(), 64);
    }

    #[tokio::test]
    async fn test_unit_norm() {
        let e = embedder();
        let v = e.embed("normalize me please").await.unwrap();
        let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-4, "expected unit norm, got {norm}");
    }

    #[tokio::test]
    async fn test_empty_text_is_zero_vector() {
        let e = embedder();
        let v = e.embed("").await.unwrap();
        assert!(v.iter().all(|&x| x == 0.0));
    }

    #[tokio::test]
    async fn test_shared_tokens_score_higher() {
        let e = embedder();
        let query = e.embed("where is paris").await.unwrap();
        let on_topic = e.embed("the capital of france is paris").await.unwrap();
        let off_topic = e.embed("photosynthesis converts sunlight").await.unwrap();
        let s1 = cosine_similarity(&query, &on_topic);
        let s2 = cosine_similarity(&query, &off_topic);
        assert!(s1 > s2, "on-topic {s1} should beat off-topic {s2}");
    }

    #[tokio::test]
    async fn test_batch_preserves_order() {
        let e = embedder();
        let texts = vec!["first".to_string(), "second".to_string()];
        let batch = e.embed_batch(&texts).await.unwrap();
        assert_eq!(batch.len(), 2);
        assert_eq!(batch[0], e.embed("first").await.unwrap());
        assert_eq!(batch[1], e.embed("second").await.unwrap());
    }

    #[tokio::test]
    async fn test_model_name_changes_embedding() {
        let a = LocalEmbedder::new("model-a").embed("same text").await.unwrap();
        let b = LocalEmbedder::new("model-b").embed("same text").await.unwrap();
        assert_ne!(a, b);
    }
}
