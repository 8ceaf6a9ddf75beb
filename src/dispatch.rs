//! Request dispatch: the single-consumer message boundary.
//!
//! Callers address the indexer through JSON envelopes `{type, payload}`
//! answered with `{result}` or `{error}`. Requests flow over an mpsc
//! channel and are processed serially by [`IndexWorker`], so exclusive
//! access to the index is structural rather than lock-based. `CONFIGURE`
//! rebinds the embedder capability and is the only operation that replaces
//! a live collaborator.

use crate::config;
use crate::embed::EmbedderConfig;
use crate::error::{IndexError, Result};
use crate::index::{NewDocument, SemanticIndex};
use crate::migrate::MigrationController;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};

/// Every request type the worker understands.
pub const REQUEST_KINDS: [&str; 9] = [
    "ADD_DOC",
    "BATCH_ADD",
    "SEARCH",
    "GET_ALL",
    "CLEAR",
    "CONFIGURE",
    "MIGRATE_START",
    "MIGRATE_STATUS",
    "MIGRATE_STOP",
];

/// Payload of a `BATCH_ADD` request.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchAddPayload {
    pub documents: Vec<NewDocument>,
}

/// Payload of a `SEARCH` request.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchPayload {
    pub query: String,
    #[serde(default = "default_k")]
    pub k: usize,
    #[serde(default)]
    pub use_brute_force: bool,
}

fn default_k() -> usize {
    config::DEFAULT_SEARCH_K
}

/// A parsed request. On the wire each variant is `{type, payload}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload")]
pub enum Request {
    #[serde(rename = "ADD_DOC")]
    AddDoc(NewDocument),
    #[serde(rename = "BATCH_ADD")]
    BatchAdd(BatchAddPayload),
    #[serde(rename = "SEARCH")]
    Search(SearchPayload),
    #[serde(rename = "GET_ALL")]
    GetAll,
    #[serde(rename = "CLEAR")]
    Clear,
    #[serde(rename = "CONFIGURE")]
    Configure(EmbedderConfig),
    #[serde(rename = "MIGRATE_START")]
    MigrateStart,
    #[serde(rename = "MIGRATE_STATUS")]
    MigrateStatus,
    #[serde(rename = "MIGRATE_STOP")]
    MigrateStop,
}

/// Parse a wire envelope into a [`Request`].
///
/// An unrecognized `type` yields [`IndexError::UnknownRequest`]; a known
/// type with a malformed payload yields [`IndexError::BadRequest`].
pub fn parse_request(value: Value) -> Result<Request> {
    let kind = value
        .get("type")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();
    if !REQUEST_KINDS.contains(&kind.as_str()) {
        return Err(IndexError::UnknownRequest(kind));
    }
    serde_json::from_value(value).map_err(|e| IndexError::BadRequest(e.to_string()))
}

/// Build a success reply.
pub fn result_reply(result: Value) -> Value {
    json!({ "result": result })
}

/// Build an error reply.
pub fn error_reply(message: impl Into<String>) -> Value {
    json!({ "error": message.into() })
}

fn encode<T: Serialize>(value: &T) -> Result<Value> {
    serde_json::to_value(value).map_err(|e| IndexError::Internal(e.to_string()))
}

/// A queued request with its reply handle.
struct Envelope {
    request: Value,
    reply: oneshot::Sender<Value>,
}

/// Caller-side handle to a running [`IndexWorker`].
#[derive(Clone)]
pub struct IndexHandle {
    tx: mpsc::Sender<Envelope>,
}

impl IndexHandle {
    /// Send a raw wire envelope and await the reply.
    pub async fn request_value(&self, request: Value) -> Value {
        let (tx, rx) = oneshot::channel();
        let envelope = Envelope { request, reply: tx };
        if self.tx.send(envelope).await.is_err() {
            return error_reply("index worker is gone");
        }
        rx.await
            .unwrap_or_else(|_| error_reply("index worker dropped the request"))
    }

    /// Send a typed request and await the reply.
    pub async fn request(&self, request: Request) -> Value {
        match serde_json::to_value(&request) {
            Ok(value) => self.request_value(value).await,
            Err(e) => error_reply(format!("failed to encode request: {e}")),
        }
    }
}

/// The single consumer of the request queue.
pub struct IndexWorker {
    index: Arc<SemanticIndex>,
    migration: MigrationController,
    rx: mpsc::Receiver<Envelope>,
}

impl IndexWorker {
    /// Build a worker and its caller handle over the given index.
    pub fn new(index: Arc<SemanticIndex>) -> (Self, IndexHandle) {
        let migration = MigrationController::new(Arc::clone(&index));
        let (tx, rx) = mpsc::channel(64);
        (
            Self {
                index,
                migration,
                rx,
            },
            IndexHandle { tx },
        )
    }

    /// Spawn the worker onto the current runtime and return its handle.
    pub fn spawn(index: Arc<SemanticIndex>) -> IndexHandle {
        let (worker, handle) = Self::new(index);
        tokio::spawn(worker.run());
        handle
    }

    /// Process requests serially until every handle is dropped.
    pub async fn run(mut self) {
        if let Err(e) = self.index.init() {
            tracing::error!(error = %e, "failed to load persisted index");
        }
        while let Some(envelope) = self.rx.recv().await {
            let reply = self.handle(envelope.request).await;
            // A caller that gave up on its reply is not an error.
            let _ = envelope.reply.send(reply);
        }
    }

    /// Parse and execute one wire envelope.
    pub async fn handle(&self, request: Value) -> Value {
        match parse_request(request) {
            Err(e) => error_reply(e.to_string()),
            Ok(request) => match self.dispatch(request).await {
                Ok(result) => result_reply(result),
                Err(e) => error_reply(e.to_string()),
            },
        }
    }

    async fn dispatch(&self, request: Request) -> Result<Value> {
        match request {
            Request::AddDoc(doc) => {
                encode(&self.index.add_document(doc.text, doc.metadata).await?)
            }
            Request::BatchAdd(batch) => {
                encode(&self.index.add_documents(batch.documents).await?)
            }
            Request::Search(p) => {
                encode(&self.index.search(&p.query, p.k, p.use_brute_force).await?)
            }
            Request::GetAll => encode(&self.index.get_all_documents()?),
            Request::Clear => {
                self.index.clear()?;
                Ok(Value::Null)
            }
            Request::Configure(config) => {
                self.index.set_embedder(config.build());
                Ok(Value::Null)
            }
            Request::MigrateStart => {
                self.migration.start(self.index.embedder())?;
                Ok(Value::Null)
            }
            Request::MigrateStatus => encode(&self.migration.status()),
            Request::MigrateStop => {
                self.migration.stop().await;
                Ok(Value::Null)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embed::LocalEmbedder;

    fn handle() -> IndexHandle {
        let index = Arc::new(
            SemanticIndex::in_memory(Arc::new(LocalEmbedder::new("dispatch-model"))).unwrap(),
        );
        IndexWorker::spawn(index)
    }

    #[tokio::test]
    async fn test_unknown_request_type() {
        let handle = handle();
        let reply = handle
            .request_value(json!({ "type": "FROBNICATE", "payload": {} }))
            .await;
        let error = reply["error"].as_str().unwrap();
        assert!(error.contains("unknown request type"), "got: {error}");
        assert!(error.contains("FROBNICATE"));
    }

    #[tokio::test]
    async fn test_missing_type_is_unknown() {
        let handle = handle();
        let reply = handle.request_value(json!({ "payload": {} })).await;
        assert!(reply["error"].as_str().unwrap().contains("unknown request type"));
    }

    #[tokio::test]
    async fn test_malformed_payload_is_bad_request() {
        let handle = handle();
        let reply = handle
            .request_value(json!({ "type": "SEARCH", "payload": { "k": "five" } }))
            .await;
        assert!(reply["error"].as_str().unwrap().contains("invalid request payload"));
    }

    #[tokio::test]
    async fn test_add_then_search() {
        let handle = handle();
        let added = handle
            .request_value(json!({
                "type": "ADD_DOC",
                "payload": { "text": "the capital of france is paris" }
            }))
            .await;
        let id = added["result"]["id"].as_str().unwrap().to_string();

        let reply = handle
            .request_value(json!({
                "type": "SEARCH",
                "payload": { "query": "the capital of france is paris", "k": 1 }
            }))
            .await;
        let results = reply["result"].as_array().unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0]["document"]["id"].as_str().unwrap(), id);
        assert!(results[0]["score"].as_f64().unwrap() > 0.99);
    }

    #[tokio::test]
    async fn test_search_defaults() {
        let payload: SearchPayload =
            serde_json::from_value(json!({ "query": "q" })).unwrap();
        assert_eq!(payload.k, config::DEFAULT_SEARCH_K);
        assert!(!payload.use_brute_force);
    }

    #[tokio::test]
    async fn test_batch_add_and_get_all() {
        let handle = handle();
        let reply = handle
            .request_value(json!({
                "type": "BATCH_ADD",
                "payload": { "documents": [
                    { "text": "first" },
                    { "text": "second", "metadata": { "rank": { "Integer": 1 } } }
                ]}
            }))
            .await;
        assert_eq!(reply["result"].as_array().unwrap().len(), 2);

        let all = handle.request(Request::GetAll).await;
        assert_eq!(all["result"].as_array().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_clear_via_dispatch() {
        let handle = handle();
        handle
            .request_value(json!({ "type": "ADD_DOC", "payload": { "text": "gone soon" } }))
            .await;
        let cleared = handle.request(Request::Clear).await;
        assert!(cleared["error"].is_null());

        let all = handle.request(Request::GetAll).await;
        assert!(all["result"].as_array().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_migrate_status_shape() {
        let handle = handle();
        let reply = handle.request(Request::MigrateStatus).await;
        let status = &reply["result"];
        assert_eq!(status["total"], 0);
        assert_eq!(status["processed"], 0);
        assert_eq!(status["isComplete"], false);
    }

    #[tokio::test]
    async fn test_configure_rebinds_embedder() {
        let handle = handle();
        let reply = handle
            .request_value(json!({
                "type": "CONFIGURE",
                "payload": { "type": "local", "local": { "modelName": "replacement" } }
            }))
            .await;
        assert!(reply["error"].is_null());

        // The replacement embedder hashes differently, so a self-search
        // still works end to end after the swap.
        handle
            .request_value(json!({ "type": "ADD_DOC", "payload": { "text": "post swap" } }))
            .await;
        let results = handle
            .request_value(json!({ "type": "SEARCH", "payload": { "query": "post swap", "k": 1 } }))
            .await;
        assert_eq!(results["result"].as_array().unwrap().len(), 1);
    }
}
