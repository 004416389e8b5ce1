//! Core data models shared across the pipeline.
//!
//! The data lifecycle is:
//!
//! ```text
//! upload → extract() → PageRecord → chunk() → Chunk
//!                          ↓                     ↓
//!                   summarize()            embed() + index()
//!                          ↓                     ↓
//!                  DocumentSummary        search() → RetrievedChunk
//! ```
//!
//! Everything here is plain serde data; behavior lives in the modules that
//! produce and consume these types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A document workspace with its own uploads, indexes, and conversations.
///
/// Projects own the directory `<data>/<id>/` containing `uploads/`,
/// `bm25.index/`, `vectors.{gob,json}`, and `conversations/`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Project {
    /// UUID v4.
    pub id: String,
    pub name: String,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub file_count: usize,
    #[serde(default)]
    pub chunk_count: usize,
    pub status: ProjectStatus,
}

/// Project lifecycle: created in `Upload`, `Processing` while an ingestion
/// runs, `Ready` once an index was built. Cancellation and file clears
/// revert to `Upload`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProjectStatus {
    Upload,
    Processing,
    Ready,
}

/// A Q&A thread within a project.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Conversation {
    pub id: String,
    pub project_id: String,
    pub name: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

/// A single message in a conversation. Assistant messages carry structured
/// metadata (cited documents, pages, footnotes, confidence, latency,
/// provider/model).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<serde_json::Value>,
    pub timestamp: DateTime<Utc>,
}

/// One page of extracted text. `page_number` is 1-based and source order is
/// preserved within a document.
#[derive(Debug, Clone, PartialEq)]
pub struct PageRecord {
    pub document: String,
    pub page_number: usize,
    pub text: String,
}

/// A small search window carved from a page.
///
/// `text` is the ~150-word window that gets embedded and indexed;
/// `parent_text` is the full page it came from, repeated across sibling
/// chunks so retrieval can deduplicate at page granularity and hand the
/// LLM full-page context. The id has the form `<document>_p<page>_c<index>`
/// and is unique within a project.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Chunk {
    pub id: String,
    pub document: String,
    pub page_number: usize,
    pub text: String,
    pub parent_text: String,
    #[serde(default)]
    pub section: String,
    #[serde(default)]
    pub embedding: Vec<f32>,
}

/// A named section within a document, as estimated by the summarizer.
/// Page ranges are LLM-derived and may overlap or be incomplete.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Section {
    pub name: String,
    pub page_start: usize,
    pub page_end: usize,
}

/// Document-level metadata, generated once per file at ingest time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentSummary {
    pub document: String,
    pub title: String,
    /// Free-form type tag such as `legal_case`, `financial_report`, `other`.
    #[serde(rename = "type")]
    pub doc_type: String,
    pub summary: String,
    #[serde(default)]
    pub sections: Vec<Section>,
    #[serde(default)]
    pub key_entities: Vec<String>,
}

/// A retrieval hit. The fused score is monotonic within one query but not
/// comparable across queries.
#[derive(Debug, Clone, Serialize)]
pub struct RetrievedChunk {
    pub chunk_id: String,
    pub document: String,
    pub page_number: usize,
    pub text: String,
    pub parent_text: String,
    pub section: String,
    pub score: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IngestPhase {
    Idle,
    Processing,
    Done,
    Error,
    Cancelled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileStatus {
    Ok,
    Failed,
}

/// Per-file outcome within an ingestion run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileResult {
    pub name: String,
    pub status: FileStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default)]
    pub chunks: usize,
}

/// Progress record polled during ingestion. `chunks_total` and `chunks_done`
/// are monotonically non-decreasing over a run; readers may observe stale
/// totals but never regressions.
#[derive(Debug, Clone, Serialize)]
pub struct IngestStatus {
    pub phase: IngestPhase,
    pub files_total: usize,
    pub files_done: usize,
    pub chunks_total: usize,
    pub chunks_done: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub file_results: Vec<FileResult>,
}

impl Default for IngestStatus {
    fn default() -> Self {
        Self {
            phase: IngestPhase::Idle,
            files_total: 0,
            files_done: 0,
            chunks_total: 0,
            chunks_done: 0,
            error: None,
            file_results: Vec::new(),
        }
    }
}
