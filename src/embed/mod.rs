//! Embedder capability: the collaborator that maps text to vectors.
//!
//! The index core never embeds anything itself; it calls whatever
//! [`Embedder`] it was handed. Two reference collaborators ship with the
//! crate: a deterministic local embedder and a remote HTTP embedder
//! following the OpenAI embeddings wire shape. `CONFIGURE` requests select
//! between them via [`EmbedderConfig`].

use crate::config;
use crate::error::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Local deterministic embedder.
pub mod local;
/// Remote HTTP embedder (OpenAI embeddings wire shape).
pub mod openai;

pub use local::LocalEmbedder;
pub use openai::OpenAiEmbedder;

/// Capability producing a fixed-size vector from text.
///
/// `embed_batch` must return vectors in input order. Failures surface as
/// [`crate::IndexError::Embedder`]; the index persists nothing on failure.
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Identifier of the underlying model.
    fn model_id(&self) -> &str;

    /// Embed a single text.
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;

    /// Embed a batch of texts, returning vectors in input order.
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;
}

/// Which embedder family a [`EmbedderConfig`] selects.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EmbedderKind {
    /// The local deterministic embedder.
    #[default]
    Local,
    /// The remote HTTP embedder.
    OpenAi,
}

/// Options for the local embedder.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LocalOptions {
    /// Model identifier for the local embedder.
    #[serde(default = "default_local_model")]
    pub model_name: String,
}

impl Default for LocalOptions {
    fn default() -> Self {
        Self {
            model_name: default_local_model(),
        }
    }
}

/// Options for the remote embedder.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OpenAiOptions {
    /// Bearer credential.
    #[serde(default)]
    pub api_key: String,
    /// Base URL of the embeddings endpoint.
    #[serde(default = "default_openai_endpoint")]
    pub endpoint: String,
    /// Model identifier.
    #[serde(default = "default_openai_model")]
    pub model_name: String,
}

impl Default for OpenAiOptions {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            endpoint: default_openai_endpoint(),
            model_name: default_openai_model(),
        }
    }
}

fn default_local_model() -> String {
    config::DEFAULT_LOCAL_MODEL.to_string()
}

fn default_openai_endpoint() -> String {
    config::DEFAULT_OPENAI_ENDPOINT.to_string()
}

fn default_openai_model() -> String {
    config::DEFAULT_OPENAI_MODEL.to_string()
}

/// The `CONFIGURE` payload: selects and parameterizes the embedder family.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EmbedderConfig {
    /// Embedder family.
    #[serde(rename = "type", default)]
    pub kind: EmbedderKind,
    /// Local embedder options.
    #[serde(default)]
    pub local: LocalOptions,
    /// Remote embedder options.
    #[serde(default)]
    pub openai: OpenAiOptions,
}

impl EmbedderConfig {
    /// Build the embedder this configuration selects.
    pub fn build(&self) -> Arc<dyn Embedder> {
        match self.kind {
            EmbedderKind::Local => Arc::new(LocalEmbedder::new(&self.local.model_name)),
            EmbedderKind::OpenAi => Arc::new(OpenAiEmbedder::new(
                &self.openai.endpoint,
                &self.openai.api_key,
                &self.openai.model_name,
            )),
        }
    }
}
