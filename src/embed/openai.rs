//! Remote HTTP embedder.
//!
//! Talks to any endpoint following the OpenAI embeddings wire shape:
//! `POST {endpoint}/embeddings` with `{input: [..], model: ".."}` and a
//! bearer credential, expecting `{data: [{embedding: [..]}, ..]}` with
//! entries in input order.

use crate::embed::Embedder;
use crate::error::{IndexError, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize)]
struct EmbeddingsRequest<'a> {
    input: &'a [String],
    model: &'a str,
}

#[derive(Debug, Deserialize)]
struct EmbeddingsResponse {
    data: Vec<EmbeddingEntry>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingEntry {
    embedding: Vec<f32>,
}

/// Embedder backed by a remote embeddings endpoint.
pub struct OpenAiEmbedder {
    client: reqwest::Client,
    endpoint: String,
    api_key: String,
    model_name: String,
}

impl OpenAiEmbedder {
    /// Create an embedder for the given endpoint, credential, and model.
    pub fn new(endpoint: &str, api_key: &str, model_name: &str) -> Self {
        Self {
            client: reqwest::Client::new(),
            endpoint: endpoint.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
            model_name: model_name.to_string(),
        }
    }

    async fn request(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let url = format!("{}/embeddings", self.endpoint);
        let body = EmbeddingsRequest {
            input: texts,
            model: &self.model_name,
        };

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| IndexError::Embedder(format!("request to {url} failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            return Err(IndexError::Embedder(format!(
                "embeddings endpoint returned {status}: {detail}"
            )));
        }

        let parsed: EmbeddingsResponse = response
            .json()
            .await
            .map_err(|e| IndexError::Embedder(format!("malformed embeddings response: {e}")))?;

        if parsed.data.len() != texts.len() {
            return Err(IndexError::Embedder(format!(
                "embeddings endpoint returned {} vectors for {} inputs",
                parsed.data.len(),
                texts.len()
            )));
        }
        Ok(parsed.data.into_iter().map(|e| e.embedding).collect())
    }
}

#[async_trait]
impl Embedder for OpenAiEmbedder {
    fn model_id(&self) -> &str {
        &self.model_name
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let mut vectors = self.request(std::slice::from_ref(&text.to_string())).await?;
        vectors
            .pop()
            .ok_or_else(|| IndexError::Embedder("empty embeddings response".to_string()))
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        self.request(texts).await
    }
}
