//! End-to-end pipeline tests over real files and a deterministic embedder.
//!
//! These cover the full ingest → persist → query path: a small PDF with a
//! text layer, cancellation mid-run, and the busy guard against concurrent
//! ingestions. No network access: the embedder is a bag-of-words hash and
//! summaries are disabled by leaving the OpenAI key empty.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use lopdf::content::{Content, Operation};
use lopdf::{dictionary, Document, Object, Stream};

use docpilot::embedding::Embedder;
use docpilot::ingest;
use docpilot::models::{FileStatus, IngestPhase, ProjectStatus};
use docpilot::project::ProjectStore;
use docpilot::retriever::Retriever;
use docpilot::state::{RuntimeSettings, ServerState};

/// Deterministic bag-of-words embedder: each lowercase word increments a
/// hashed slot, so texts sharing vocabulary get high cosine similarity.
struct BowEmbedder {
    /// Artificial per-call delay, used by the cancellation test.
    delay: Duration,
}

fn bow_vector(text: &str) -> Vec<f32> {
    let mut v = vec![0.0f32; 256];
    for word in text.to_lowercase().split_whitespace() {
        let slot = word
            .bytes()
            .fold(0usize, |acc, b| acc.wrapping_mul(31).wrapping_add(b as usize))
            % 256;
        v[slot] += 1.0;
    }
    v
}

#[async_trait]
impl Embedder for BowEmbedder {
    async fn embed(&self, texts: &[String]) -> docpilot::Result<Vec<Vec<f32>>> {
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        Ok(texts.iter().map(|t| bow_vector(t)).collect())
    }

    fn model_name(&self) -> &str {
        "bow-test"
    }
}

fn make_state(root: &Path, embed_delay: Duration) -> Arc<ServerState> {
    let store = ProjectStore::new(root.join("data")).unwrap();
    let mut state = ServerState::new(store, RuntimeSettings::default(), false);
    state.embedder_override = Some(Arc::new(BowEmbedder { delay: embed_delay }));
    Arc::new(state)
}

/// Write a PDF with one `Tj` text run per page.
fn write_pdf(path: &Path, page_texts: &[String]) {
    let mut doc = Document::with_version("1.5");
    let pages_id = doc.new_object_id();

    let font_id = doc.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => "Courier",
    });
    let resources_id = doc.add_object(dictionary! {
        "Font" => dictionary! { "F1" => font_id },
    });

    let mut kids: Vec<Object> = Vec::new();
    for text in page_texts {
        let content = Content {
            operations: vec![
                Operation::new("BT", vec![]),
                Operation::new("Tf", vec!["F1".into(), 12.into()]),
                Operation::new("Td", vec![50.into(), 750.into()]),
                Operation::new("Tj", vec![Object::string_literal(text.as_str())]),
                Operation::new("ET", vec![]),
            ],
        };
        let content_id = doc.add_object(Stream::new(
            dictionary! {},
            content.encode().unwrap(),
        ));
        let page_id = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "Contents" => content_id,
        });
        kids.push(page_id.into());
    }

    let count = kids.len() as i64;
    doc.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => kids,
            "Count" => count,
            "Resources" => resources_id,
            "MediaBox" => vec![0.into(), 0.into(), 595.into(), 842.into()],
        }),
    );
    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    doc.trailer.set("Root", catalog_id);
    doc.save(path).unwrap();
}

/// ~120 words: a distinctive opening sentence plus page-specific filler.
fn page_text(page: usize, opening: &str) -> String {
    let mut words: Vec<String> = opening.split_whitespace().map(str::to_string).collect();
    let mut i = 0;
    while words.len() < 120 {
        words.push(format!("filler{page}x{i}"));
        i += 1;
    }
    words.join(" ")
}

async fn wait_for_phase(state: &ServerState, timeout: Duration) -> IngestPhase {
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        let phase = state.ingest_status.phase();
        if !matches!(phase, IngestPhase::Processing) {
            return phase;
        }
        if tokio::time::Instant::now() > deadline {
            return phase;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
}

// ===== S1: one small PDF with a text layer =====

#[tokio::test]
async fn single_pdf_ingests_and_answers_page_queries() {
    let dir = tempfile::tempdir().unwrap();
    let state = make_state(dir.path(), Duration::ZERO);

    let project = state.projects.create("smoke").unwrap();
    let pages = vec![
        page_text(1, "annual revenue grew twelve percent across all segments"),
        page_text(2, "the board approved the merger agreement in march"),
        page_text(3, "gardening tips for the winter season are listed"),
    ];
    write_pdf(&state.projects.uploads_dir(&project.id).join("report.pdf"), &pages);

    ingest::start_ingestion(Arc::clone(&state), &project.id)
        .await
        .unwrap();
    let phase = wait_for_phase(&state, Duration::from_secs(20)).await;
    assert_eq!(phase, IngestPhase::Done);

    let snap = state.ingest_status.snapshot();
    assert_eq!(snap.files_total, 1);
    assert_eq!(snap.files_done, 1);
    // 120 words per page < 150-word window: one chunk per page.
    assert_eq!(snap.chunks_total, 3);
    assert_eq!(snap.chunks_done, 3);
    assert_eq!(snap.file_results.len(), 1);
    assert_eq!(snap.file_results[0].status, FileStatus::Ok);
    assert_eq!(snap.file_results[0].chunks, 3);

    // Project record updated and the store persisted in both formats.
    let reloaded = state.projects.get(&project.id).unwrap();
    assert_eq!(reloaded.status, ProjectStatus::Ready);
    assert_eq!(reloaded.chunk_count, 3);
    let vectors = state.projects.vectors_path(&project.id);
    assert!(vectors.exists());
    assert!(vectors.with_extension("gob").exists());

    // A query matching page 2's opening sentence ranks page 2 first.
    let index = state.index_for(&project.id).expect("index installed as active");
    let retriever = Retriever::new(index);
    let results = retriever
        .search("the board approved the merger agreement in march", 3)
        .await
        .unwrap();
    assert!(!results.is_empty());
    assert_eq!(results[0].page_number, 2);
    assert_eq!(results[0].document, "report.pdf");

    // Parent-page dedup: every (document, page) pair distinct.
    let mut pages_seen = std::collections::HashSet::new();
    for result in &results {
        assert!(pages_seen.insert((result.document.clone(), result.page_number)));
    }
}

// ===== S3: cancellation mid-ingest =====

#[tokio::test]
async fn cancellation_mid_run_leaves_no_artifacts() {
    let dir = tempfile::tempdir().unwrap();
    // Slow embedder keeps the run alive long enough to cancel it.
    let state = make_state(dir.path(), Duration::from_millis(500));

    let project = state.projects.create("cancelme").unwrap();
    let uploads = state.projects.uploads_dir(&project.id);
    for i in 0..8 {
        let pages = vec![page_text(1, &format!("document number {i} first page content"))];
        write_pdf(&uploads.join(format!("doc{i}.pdf")), &pages);
    }

    ingest::start_ingestion(Arc::clone(&state), &project.id)
        .await
        .unwrap();

    // Let a few extractions land, then cancel.
    let deadline = tokio::time::Instant::now() + Duration::from_secs(10);
    while state.ingest_status.snapshot().files_done < 3
        && tokio::time::Instant::now() < deadline
    {
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert!(ingest::request_cancel(&state, &project.id));

    let phase = wait_for_phase(&state, Duration::from_secs(20)).await;
    assert_eq!(phase, IngestPhase::Cancelled);

    // Nothing persisted, nothing installed, project back to upload.
    let vectors = state.projects.vectors_path(&project.id);
    assert!(!vectors.exists());
    assert!(!vectors.with_extension("gob").exists());
    assert!(state.index_for(&project.id).is_none());
    assert_eq!(
        state.projects.get(&project.id).unwrap().status,
        ProjectStatus::Upload
    );
}

// ===== S6: concurrent ingest rejected =====

#[tokio::test]
async fn second_ingest_while_processing_is_busy() {
    let dir = tempfile::tempdir().unwrap();
    let state = make_state(dir.path(), Duration::from_millis(250));

    let project = state.projects.create("busy").unwrap();
    let pages = vec![page_text(1, "some document content for the busy test")];
    write_pdf(&state.projects.uploads_dir(&project.id).join("a.pdf"), &pages);

    ingest::start_ingestion(Arc::clone(&state), &project.id)
        .await
        .unwrap();

    let err = ingest::start_ingestion(Arc::clone(&state), &project.id)
        .await
        .unwrap_err();
    assert!(matches!(err, docpilot::EngineError::Busy));
    assert_eq!(err.to_string(), "Ingestion already in progress");

    // Let the first run finish cleanly.
    let phase = wait_for_phase(&state, Duration::from_secs(20)).await;
    assert_eq!(phase, IngestPhase::Done);
}

// ===== Partial failure: a broken file does not sink the run =====

#[tokio::test]
async fn broken_file_is_isolated_from_the_run() {
    let dir = tempfile::tempdir().unwrap();
    let state = make_state(dir.path(), Duration::ZERO);

    let project = state.projects.create("mixed").unwrap();
    let uploads = state.projects.uploads_dir(&project.id);
    write_pdf(
        &uploads.join("good.pdf"),
        &[page_text(1, "a perfectly readable first page")],
    );
    std::fs::write(uploads.join("bad.pdf"), b"this is not a pdf").unwrap();

    ingest::start_ingestion(Arc::clone(&state), &project.id)
        .await
        .unwrap();
    let phase = wait_for_phase(&state, Duration::from_secs(20)).await;
    assert_eq!(phase, IngestPhase::Done, "one good file keeps the run alive");

    let snap = state.ingest_status.snapshot();
    assert_eq!(snap.files_total, 2);
    assert_eq!(snap.file_results.len(), 2);
    let by_name: std::collections::HashMap<&str, &docpilot::models::FileResult> = snap
        .file_results
        .iter()
        .map(|r| (r.name.as_str(), r))
        .collect();
    assert_eq!(by_name["good.pdf"].status, FileStatus::Ok);
    assert_eq!(by_name["bad.pdf"].status, FileStatus::Failed);
    assert!(by_name["bad.pdf"].error.is_some());
}

// ===== All files failing marks the run as error =====

#[tokio::test]
async fn all_files_failing_is_an_error_run() {
    let dir = tempfile::tempdir().unwrap();
    let state = make_state(dir.path(), Duration::ZERO);

    let project = state.projects.create("allbad").unwrap();
    let uploads = state.projects.uploads_dir(&project.id);
    std::fs::write(uploads.join("one.pdf"), b"junk").unwrap();
    std::fs::write(uploads.join("two.pdf"), b"more junk").unwrap();

    ingest::start_ingestion(Arc::clone(&state), &project.id)
        .await
        .unwrap();
    let phase = wait_for_phase(&state, Duration::from_secs(20)).await;
    assert_eq!(phase, IngestPhase::Error);

    let snap = state.ingest_status.snapshot();
    let message = snap.error.unwrap_or_default();
    assert!(
        message.contains("No text could be extracted"),
        "error names the no-text condition: {message}"
    );
    assert!(state.index_for(&project.id).is_none());
}

// ===== Reload: a ready project's index loads from disk =====

#[tokio::test]
async fn persisted_index_reloads_for_queries() {
    let dir = tempfile::tempdir().unwrap();
    let state = make_state(dir.path(), Duration::ZERO);

    let project = state.projects.create("reload").unwrap();
    write_pdf(
        &state.projects.uploads_dir(&project.id).join("doc.pdf"),
        &[page_text(1, "quarterly earnings exceeded analyst expectations")],
    );

    ingest::start_ingestion(Arc::clone(&state), &project.id)
        .await
        .unwrap();
    assert_eq!(
        wait_for_phase(&state, Duration::from_secs(20)).await,
        IngestPhase::Done
    );

    // Drop the cached/active index entirely, then load from disk the way
    // activation does.
    state.close_index_for(&project.id);
    assert!(state.index_for(&project.id).is_none());

    let index = state.load_project_index(&project.id).await.unwrap();
    let retriever = Retriever::new(index);
    let results = retriever
        .search("quarterly earnings exceeded analyst expectations", 5)
        .await
        .unwrap();
    assert!(!results.is_empty());
    assert_eq!(results[0].document, "doc.pdf");
    assert_eq!(results[0].page_number, 1);
}
