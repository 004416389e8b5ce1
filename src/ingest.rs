//! Streamed ingestion pipeline.
//!
//! Each file flows extract → (summary ∥ chunk) → embed with no barrier
//! between stages: as soon as a file is extracted its chunks enter the
//! embedding pool while other files are still being extracted.
//!
//! ```text
//!  files ──▶ extraction tasks (≤4) ──channel──▶ consumer
//!                                                 ├─▶ summary task per file (ignored on failure)
//!                                                 ├─▶ chunker (synchronous)
//!                                                 └─▶ embedding task per file (≤6 batches in flight)
//! ```
//!
//! One run per process at a time; a second start reports busy. A single
//! cancellation token covers the whole run: extraction slot waits, channel
//! reads, embedding slot waits, and retry backoffs all observe it.
//!
//! Partial failure: a file that fails extraction is recorded in the status
//! and the run continues; only zero successful files makes the run fail.
//! Summary failures never fail a run. The first embedding failure does.

use std::sync::Arc;

use tokio::sync::{mpsc, Semaphore};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::chunker;
use crate::error::{EngineError, Result};
use crate::extract;
use crate::index::{ProgressFn, ProjectIndex};
use crate::llm;
use crate::models::{FileResult, FileStatus, PageRecord, ProjectStatus};
use crate::state::ServerState;

/// Concurrent file extractions per run.
pub const EXTRACT_CONCURRENCY: usize = 4;

struct ExtractOutcome {
    file: String,
    result: Result<Vec<PageRecord>>,
}

/// List a project's ingestable uploads (`.pdf` / `.docx`).
pub fn ingestable_files(state: &ServerState, project_id: &str) -> Vec<String> {
    let uploads_dir = state.projects.uploads_dir(project_id);
    let Ok(entries) = std::fs::read_dir(uploads_dir) else {
        return Vec::new();
    };

    let mut files: Vec<String> = entries
        .flatten()
        .filter(|e| e.path().is_file())
        .filter_map(|e| {
            let name = e.file_name().to_string_lossy().into_owned();
            let lower = name.to_lowercase();
            (lower.ends_with(".pdf") || lower.ends_with(".docx")).then_some(name)
        })
        .collect();
    files.sort();
    files
}

/// Validate, mark the project `processing`, and spawn the background run.
///
/// Fails with [`EngineError::Busy`] while any ingestion is in flight, and
/// with an input error when the project has no ingestable files.
pub async fn start_ingestion(state: Arc<ServerState>, project_id: &str) -> Result<()> {
    let mut project = state.projects.get(project_id)?;

    let files = ingestable_files(&state, project_id);
    if files.is_empty() {
        return Err(EngineError::InvalidInput("No files to process".to_string()));
    }

    if !state.ingest_status.try_begin(files.len()) {
        return Err(EngineError::Busy);
    }

    project.status = ProjectStatus::Processing;
    if let Err(e) = state.projects.update(project) {
        state.ingest_status.reset();
        return Err(e);
    }

    let cancel = CancellationToken::new();
    state.set_ingest_cancel(cancel.clone());

    let project_id = project_id.to_string();
    tokio::spawn(async move {
        run_ingestion(Arc::clone(&state), project_id, files, cancel).await;
        state.clear_ingest_cancel();
    });

    Ok(())
}

/// The full pipeline for one project. Always leaves the status tracker in a
/// terminal phase (`done`, `error`, or `cancelled`).
pub async fn run_ingestion(
    state: Arc<ServerState>,
    project_id: String,
    files: Vec<String>,
    cancel: CancellationToken,
) {
    // ===== Setup: discard any loaded index and start from a clean slate.
    state.close_index_for(&project_id);
    let paths = state.project_paths(&project_id);
    let _ = std::fs::remove_dir_all(&paths.bm25_dir);

    let embedder = match state.embedder() {
        Ok(embedder) => embedder,
        Err(e) => {
            state.ingest_status.fail(format!("Failed to create index: {e}"));
            return;
        }
    };
    let index = match ProjectIndex::open(&paths.bm25_dir, embedder) {
        Ok(index) => Arc::new(index),
        Err(e) => {
            state.ingest_status.fail(format!("Failed to create index: {e}"));
            return;
        }
    };

    // ===== Extraction stage: one task per file, bounded by a semaphore.
    let (tx, mut rx) = mpsc::unbounded_channel::<ExtractOutcome>();
    let extract_slots = Arc::new(Semaphore::new(EXTRACT_CONCURRENCY));
    let ocr_config = state.ocr_config();

    for file in &files {
        let tx = tx.clone();
        let slots = Arc::clone(&extract_slots);
        let cancel = cancel.clone();
        let state = Arc::clone(&state);
        let ocr_config = ocr_config.clone();
        let file = file.clone();
        let path = paths.uploads_dir.join(&file);

        tokio::spawn(async move {
            let _permit = tokio::select! {
                _ = cancel.cancelled() => {
                    let _ = tx.send(ExtractOutcome {
                        file,
                        result: Err(EngineError::Cancelled),
                    });
                    return;
                }
                permit = slots.acquire_owned() => permit.expect("semaphore never closed"),
            };

            info!(file = %file, "extracting");
            let started = std::time::Instant::now();
            let result = extract::extract_file(&path, &ocr_config).await;
            match &result {
                Ok(pages) => {
                    info!(file = %file, pages = pages.len(), elapsed = ?started.elapsed(), "extracted")
                }
                Err(e) => {
                    warn!(file = %file, error = %e, elapsed = ?started.elapsed(), "extraction failed")
                }
            }

            let _ = tx.send(ExtractOutcome { file, result });
            state.ingest_status.incr_files_done();
        });
    }
    // The channel closes once every extraction task has dropped its sender.
    drop(tx);

    // ===== Processing stage: single consumer, forking summary and
    // embedding tasks per file.
    let openai_key = state.openai_key();
    let mut any_file_ok = false;
    let mut embed_tasks: JoinSet<Result<()>> = JoinSet::new();
    let mut summary_tasks: JoinSet<()> = JoinSet::new();

    loop {
        let outcome = tokio::select! {
            _ = cancel.cancelled() => break,
            message = rx.recv() => match message {
                Some(outcome) => outcome,
                None => break,
            },
        };

        let pages = match outcome.result {
            Err(e) => {
                state.ingest_status.push_file_result(FileResult {
                    name: outcome.file,
                    status: FileStatus::Failed,
                    error: Some(e.to_string()),
                    chunks: 0,
                });
                continue;
            }
            Ok(pages) => pages,
        };

        any_file_ok = true;
        let file = outcome.file;

        // Summary runs concurrently with embedding; its failure is logged
        // and ignored.
        if !openai_key.is_empty() {
            let index = Arc::clone(&index);
            let api_key = openai_key.clone();
            let document = file.clone();
            let page_texts: Vec<String> = pages.iter().map(|p| p.text.clone()).collect();
            summary_tasks.spawn(async move {
                let total = page_texts.len();
                match llm::summarize_document(&api_key, &document, &page_texts, total).await {
                    Ok(summary) => {
                        info!(document = %document, title = %summary.title,
                            doc_type = %summary.doc_type, "generated document summary");
                        index.add_doc_summary(summary);
                    }
                    Err(e) => {
                        warn!(document = %document, error = %e, "failed to generate summary");
                    }
                }
            });
        }

        let summaries = index.doc_summaries();
        let chunks = chunker::chunk_pages(&pages, &summaries);
        info!(file = %file, pages = pages.len(), chunks = chunks.len(), "chunked");

        state.ingest_status.add_chunks_total(chunks.len());
        state.ingest_status.push_file_result(FileResult {
            name: file.clone(),
            status: FileStatus::Ok,
            error: None,
            chunks: chunks.len(),
        });

        let index_for_embed = Arc::clone(&index);
        let cancel_for_embed = cancel.clone();
        let progress: ProgressFn = {
            let state = Arc::clone(&state);
            let index = Arc::clone(&index);
            Arc::new(move |_total, _done| {
                state.ingest_status.set_chunks_done(index.chunk_count());
            })
        };
        embed_tasks.spawn(async move {
            index_for_embed
                .embed_and_index(chunks, &cancel_for_embed, Some(progress), 0)
                .await
        });
    }

    // ===== Barrier: all embedding, then all summaries.
    let mut first_embed_err: Option<EngineError> = None;
    while let Some(joined) = embed_tasks.join_next().await {
        match joined {
            Ok(Ok(())) => {}
            Ok(Err(EngineError::Cancelled)) => {}
            Ok(Err(e)) => {
                error!(error = %e, "embedding task failed");
                if first_embed_err.is_none() {
                    first_embed_err = Some(e);
                }
            }
            Err(e) => {
                if first_embed_err.is_none() {
                    first_embed_err = Some(EngineError::Embedding(format!("embed task: {e}")));
                }
            }
        }
    }
    while summary_tasks.join_next().await.is_some() {}

    // ===== Termination.
    if cancel.is_cancelled() {
        info!(project = %project_id, "ingestion cancelled");
        state.ingest_status.cancelled();
        index.close();
        return;
    }

    if !any_file_ok {
        error!(project = %project_id, "no text extracted from any uploaded file");
        state.ingest_status.fail(
            "No text could be extracted from any uploaded file. If your PDFs are scanned \
             images, configure an OCR provider (Tesseract or Sarvam).",
        );
        index.close();
        return;
    }

    if let Some(e) = first_embed_err {
        state.ingest_status.fail(format!("Embedding error: {e}"));
        index.close();
        return;
    }

    if let Err(e) = index.lexical().commit() {
        warn!(error = %e, "final lexical commit failed");
    }

    let chunk_count = index.chunk_count();
    info!(project = %project_id, chunks = chunk_count, "all files processed");

    if let Err(e) = index.save_vectors(&paths.vectors_path) {
        warn!(error = %e, "failed to save vectors");
    }

    state.ingest_status.complete(chunk_count);
    state.install_active(&project_id, Arc::clone(&index));

    if let Ok(mut project) = state.projects.get(&project_id) {
        project.status = ProjectStatus::Ready;
        project.chunk_count = chunk_count;
        if let Err(e) = state.projects.update(project) {
            warn!(project = %project_id, error = %e, "failed to persist project record");
        }
    }

    info!(project = %project_id, chunks = chunk_count, "ingestion complete");
}

/// Cancel handling for the HTTP layer: fire the token and revert the
/// project to `upload`. The pipeline itself records phase `cancelled`.
pub fn request_cancel(state: &ServerState, project_id: &str) -> bool {
    let fired = state.cancel_ingest();
    if fired {
        info!(project = %project_id, "ingestion cancel requested");
    }

    if let Ok(mut project) = state.projects.get(project_id) {
        if matches!(
            project.status,
            ProjectStatus::Processing | ProjectStatus::Upload
        ) {
            project.status = ProjectStatus::Upload;
            let _ = state.projects.update(project);
        }
    }
    fired
}
