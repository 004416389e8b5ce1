//! A project's loaded index: chunk store + lexical index + embedder.
//!
//! `ProjectIndex` is the unit of ownership for everything a loaded project
//! needs at query time. It owns the tantivy handle (whose writer must be
//! released before another index can open the same directory) and the
//! in-memory [`VectorStore`]; retrievers are cheap views reconstructed from
//! an `Arc<ProjectIndex>` on demand, so the cache never stores retriever
//! state and eviction cannot invalidate an in-flight query.
//!
//! [`ProjectIndex::embed_and_index`] implements the embedding stage of the
//! ingestion pipeline: batches of [`EMBED_BATCH_SIZE`] texts, at most
//! [`EMBED_CONCURRENCY`] batches in flight, per-batch retry with capped
//! exponential backoff, cancel-aware at every wait point.

use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::embedding::Embedder;
use crate::error::{EngineError, Result};
use crate::lexical::LexicalIndex;
use crate::models::{Chunk, DocumentSummary};
use crate::store::VectorStore;

/// Texts per embedding API call.
pub const EMBED_BATCH_SIZE: usize = 200;
/// Embedding batches in flight per run.
pub const EMBED_CONCURRENCY: usize = 6;
/// Attempts per batch before the run fails.
const EMBED_MAX_ATTEMPTS: u32 = 5;
/// Backoff cap between attempts (3s, 6s, 12s, 20s).
const EMBED_BACKOFF_CAP: Duration = Duration::from_secs(20);

/// Progress callback: `(chunks_total_for_this_call, chunks_done_cumulative)`.
pub type ProgressFn = Arc<dyn Fn(usize, usize) + Send + Sync>;

pub struct ProjectIndex {
    store: Mutex<VectorStore>,
    lexical: LexicalIndex,
    embedder: Arc<dyn Embedder>,
}

impl ProjectIndex {
    /// Fresh index over an already-open lexical handle.
    pub fn new(lexical: LexicalIndex, embedder: Arc<dyn Embedder>) -> Self {
        Self {
            store: Mutex::new(VectorStore::default()),
            lexical,
            embedder,
        }
    }

    /// Open the lexical index at `bm25_dir` (create if missing) with an
    /// empty store.
    pub fn open(bm25_dir: &Path, embedder: Arc<dyn Embedder>) -> Result<Self> {
        Ok(Self::new(LexicalIndex::open(bm25_dir)?, embedder))
    }

    /// Replace the in-memory store with one loaded from disk.
    pub fn set_store(&self, store: VectorStore) {
        *self.store.lock().unwrap() = store;
    }

    pub fn embedder(&self) -> &Arc<dyn Embedder> {
        &self.embedder
    }

    pub fn lexical(&self) -> &LexicalIndex {
        &self.lexical
    }

    /// Run `f` with a shared view of the store. Keeps the lock scope visible
    /// at the call site; callers must not block inside `f`.
    pub fn with_store<R>(&self, f: impl FnOnce(&VectorStore) -> R) -> R {
        let store = self.store.lock().unwrap();
        f(&store)
    }

    pub fn chunk_count(&self) -> usize {
        self.store.lock().unwrap().chunks.len()
    }

    pub fn doc_summaries(&self) -> Vec<DocumentSummary> {
        self.store.lock().unwrap().doc_summaries.clone()
    }

    /// Append a document summary. Safe to call concurrently with embedding.
    pub fn add_doc_summary(&self, summary: DocumentSummary) {
        self.store.lock().unwrap().doc_summaries.push(summary);
    }

    /// Persist the store (bincode + JSON) at `vectors_json_path`.
    pub fn save_vectors(&self, vectors_json_path: &Path) -> Result<()> {
        let store = self.store.lock().unwrap();
        store.save(vectors_json_path)
    }

    /// Release the lexical directory lock. Idempotent; must run before a
    /// fresh index is built at the same path.
    pub fn close(&self) {
        self.lexical.close();
    }

    /// Embed `chunks` and add them to both the vector store and the lexical
    /// index.
    ///
    /// Multiple calls may run concurrently on the same index (one per file
    /// during ingestion); they share the store mutex for writes. Progress
    /// counters observed through `progress` are monotonically non-decreasing.
    /// The first cancellation observation or batch failure becomes the
    /// returned error; remaining batches are abandoned at their next
    /// cancellation check.
    pub async fn embed_and_index(
        self: &Arc<Self>,
        chunks: Vec<Chunk>,
        cancel: &CancellationToken,
        progress: Option<ProgressFn>,
        progress_offset: usize,
    ) -> Result<()> {
        if chunks.is_empty() {
            return Ok(());
        }

        let total = chunks.len();
        let batches: Vec<Vec<Chunk>> = chunks
            .chunks(EMBED_BATCH_SIZE)
            .map(|batch| batch.to_vec())
            .collect();

        let semaphore = Arc::new(Semaphore::new(EMBED_CONCURRENCY));
        let done = Arc::new(AtomicUsize::new(0));
        let first_err: Arc<Mutex<Option<EngineError>>> = Arc::new(Mutex::new(None));
        let mut tasks: JoinSet<()> = JoinSet::new();

        for batch in batches {
            // Observe cancellation while waiting for a concurrency slot.
            let permit = tokio::select! {
                _ = cancel.cancelled() => {
                    record_first(&first_err, EngineError::Cancelled);
                    break;
                }
                permit = semaphore.clone().acquire_owned() => {
                    permit.expect("semaphore never closed")
                }
            };

            let index = Arc::clone(self);
            let cancel = cancel.clone();
            let done = Arc::clone(&done);
            let first_err = Arc::clone(&first_err);
            let progress = progress.clone();

            tasks.spawn(async move {
                let _permit = permit;

                if cancel.is_cancelled() {
                    record_first(&first_err, EngineError::Cancelled);
                    return;
                }

                let texts: Vec<String> = batch.iter().map(|c| c.text.clone()).collect();
                let embeddings = match embed_with_retry(&index.embedder, &texts, &cancel).await {
                    Ok(embeddings) => embeddings,
                    Err(e) => {
                        record_first(&first_err, e);
                        return;
                    }
                };

                let batch_len = batch.len();
                {
                    let mut store = index.store.lock().unwrap();
                    for (mut chunk, embedding) in batch.into_iter().zip(embeddings) {
                        chunk.embedding = embedding;
                        if let Err(e) = index.lexical.index_chunk(
                            &chunk.id,
                            &chunk.text,
                            &chunk.document,
                            chunk.page_number,
                        ) {
                            // Dense retrieval still covers this chunk.
                            warn!(chunk = %chunk.id, error = %e, "failed to index chunk lexically");
                        }
                        store.chunks.push(chunk);
                    }
                }
                if let Err(e) = index.lexical.commit() {
                    warn!(error = %e, "lexical commit failed");
                }

                let cumulative = done.fetch_add(batch_len, Ordering::SeqCst) + batch_len;
                if let Some(progress) = &progress {
                    progress(total, progress_offset + cumulative);
                }
                info!(done = cumulative, total, "embedded chunks");
            });
        }

        while let Some(result) = tasks.join_next().await {
            if let Err(e) = result {
                record_first(&first_err, EngineError::Embedding(format!("embed task: {e}")));
            }
        }

        let result = first_err.lock().unwrap().take();
        match result {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

fn record_first(slot: &Mutex<Option<EngineError>>, err: EngineError) {
    let mut guard = slot.lock().unwrap();
    if guard.is_none() {
        *guard = Some(err);
    }
}

/// Call the embedder with up to [`EMBED_MAX_ATTEMPTS`] attempts.
///
/// Backoff doubles from 3s and caps at 20s. Permanent provider errors are
/// not retried. Each wait aborts immediately on cancellation.
async fn embed_with_retry(
    embedder: &Arc<dyn Embedder>,
    texts: &[String],
    cancel: &CancellationToken,
) -> Result<Vec<Vec<f32>>> {
    let mut last_err = None;

    for attempt in 0..EMBED_MAX_ATTEMPTS {
        if cancel.is_cancelled() {
            return Err(EngineError::Cancelled);
        }

        match embedder.embed(texts).await {
            Ok(embeddings) => return Ok(embeddings),
            Err(e) if e.is_permanent() => return Err(e),
            Err(e) => {
                if attempt + 1 < EMBED_MAX_ATTEMPTS {
                    let wait = Duration::from_secs(3u64 << attempt).min(EMBED_BACKOFF_CAP);
                    warn!(attempt = attempt + 1, wait_secs = wait.as_secs(), error = %e,
                        "embedding batch retry");
                    tokio::select! {
                        _ = tokio::time::sleep(wait) => {}
                        _ = cancel.cancelled() => return Err(EngineError::Cancelled),
                    }
                }
                last_err = Some(e);
            }
        }
    }

    Err(EngineError::Embedding(format!(
        "embedding failed after {EMBED_MAX_ATTEMPTS} attempts: {}",
        last_err.map(|e| e.to_string()).unwrap_or_default()
    )))
}
