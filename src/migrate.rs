//! Re-embedding migration controller.
//!
//! Replaces every stored embedding with output from a new embedder and
//! rebuilds the graph, in batches, cancellable at batch boundaries. The
//! graph is reset up front, so a stopped or failed run leaves a partially
//! built graph; the next run re-embeds every document from scratch.
//! `last_processed_id` is informational only.

use crate::config;
use crate::document::Document;
use crate::embed::Embedder;
use crate::error::{IndexError, Result};
use crate::index::SemanticIndex;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::task::JoinHandle;
use uuid::Uuid;

/// Progress snapshot returned by `status`. Polled independently of the
/// running migration task.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MigrationStatus {
    /// Documents enumerated at the start of the run.
    pub total: usize,
    /// Documents re-embedded and re-indexed so far.
    pub processed: usize,
    /// Final id of the most recently completed batch.
    pub last_processed_id: Option<Uuid>,
    /// `true` once every batch has committed.
    pub is_complete: bool,
    /// Error that ended the run, if any.
    pub error: Option<String>,
}

/// State shared between the controller and the running batch task.
struct MigrationState {
    running: AtomicBool,
    stop_requested: AtomicBool,
    status: RwLock<MigrationStatus>,
}

/// Drives a batched re-embed of the whole corpus. At most one run at a
/// time; a second `start` fails with [`IndexError::AlreadyRunning`].
pub struct MigrationController {
    index: Arc<SemanticIndex>,
    batch_size: usize,
    state: Arc<MigrationState>,
    handle: RwLock<Option<JoinHandle<()>>>,
}

impl MigrationController {
    /// Create a controller with the default batch size.
    pub fn new(index: Arc<SemanticIndex>) -> Self {
        Self::with_batch_size(index, config::MIGRATION_BATCH_SIZE)
    }

    /// Create a controller with an explicit batch size.
    pub fn with_batch_size(index: Arc<SemanticIndex>, batch_size: usize) -> Self {
        Self {
            index,
            batch_size: batch_size.max(1),
            state: Arc::new(MigrationState {
                running: AtomicBool::new(false),
                stop_requested: AtomicBool::new(false),
                status: RwLock::new(MigrationStatus::default()),
            }),
            handle: RwLock::new(None),
        }
    }

    /// Whether a migration is currently running.
    pub fn is_running(&self) -> bool {
        self.state.running.load(Ordering::Acquire)
    }

    /// Current progress snapshot.
    pub fn status(&self) -> MigrationStatus {
        self.state.status.read().clone()
    }

    /// Begin a migration to `target`. Snapshots the corpus and resets the
    /// graph synchronously, then processes batches on a background task.
    pub fn start(&self, target: Arc<dyn Embedder>) -> Result<()> {
        if self.state.running.swap(true, Ordering::AcqRel) {
            return Err(IndexError::AlreadyRunning);
        }
        self.state.stop_requested.store(false, Ordering::Release);

        let docs = match self.index.get_all_documents() {
            Ok(docs) => docs,
            Err(e) => {
                self.state.running.store(false, Ordering::Release);
                return Err(e);
            }
        };
        *self.state.status.write() = MigrationStatus {
            total: docs.len(),
            ..MigrationStatus::default()
        };

        // The graph drops before the first batch; documents survive.
        if let Err(e) = self.index.reset_index() {
            self.state.status.write().error = Some(e.to_string());
            self.state.running.store(false, Ordering::Release);
            return Err(e);
        }

        tracing::info!(
            total = docs.len(),
            model = target.model_id(),
            "migration started"
        );
        let state = Arc::clone(&self.state);
        let index = Arc::clone(&self.index);
        let batch_size = self.batch_size;
        let handle = tokio::spawn(async move {
            run_batches(state, index, docs, target, batch_size).await;
        });
        *self.handle.write() = Some(handle);
        Ok(())
    }

    /// Signal the running migration to stop at the next batch boundary.
    /// An in-flight batch is never aborted; it finishes or fails first.
    pub fn request_stop(&self) {
        self.state.stop_requested.store(true, Ordering::Release);
    }

    /// Signal a stop and wait for the background task to exit.
    pub async fn stop(&self) {
        self.request_stop();
        let handle = self.handle.write().take();
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                tracing::warn!(error = %e, "migration task ended abnormally");
            }
        }
    }
}

async fn run_batches(
    state: Arc<MigrationState>,
    index: Arc<SemanticIndex>,
    docs: Vec<Document>,
    target: Arc<dyn Embedder>,
    batch_size: usize,
) {
    let mut stopped = false;

    for batch in docs.chunks(batch_size) {
        if state.stop_requested.load(Ordering::Acquire) {
            tracing::info!(
                processed = state.status.read().processed,
                "migration stopped at batch boundary"
            );
            stopped = true;
            break;
        }

        let texts: Vec<String> = batch.iter().map(|d| d.text.clone()).collect();
        let vectors = match target.embed_batch(&texts).await {
            Ok(vectors) => vectors,
            Err(e) => {
                tracing::warn!(error = %e, "migration batch failed to embed");
                state.status.write().error = Some(e.to_string());
                break;
            }
        };
        if vectors.len() != batch.len() {
            let message = format!(
                "embedder returned {} vectors for {} texts",
                vectors.len(),
                batch.len()
            );
            tracing::warn!("{message}");
            state.status.write().error = Some(message);
            break;
        }

        let updated: Vec<Document> = batch
            .iter()
            .zip(vectors)
            .map(|(doc, vector)| doc.with_embedding(vector))
            .collect();
        if let Err(e) = index.index_documents(&updated) {
            tracing::warn!(error = %e, "migration batch failed to index");
            state.status.write().error = Some(e.to_string());
            break;
        }

        {
            let mut status = state.status.write();
            status.processed += updated.len();
            status.last_processed_id = updated.last().map(|d| d.id);
        }
        tokio::task::yield_now().await;
    }

    {
        let mut status = state.status.write();
        if !stopped && status.error.is_none() && status.processed == status.total {
            status.is_complete = true;
            tracing::info!(total = status.total, "migration complete");
        }
    }
    state.running.store(false, Ordering::Release);
}
