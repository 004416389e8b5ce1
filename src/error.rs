//! Crate-wide error type.
//!
//! One enum covers the whole pipeline so that callers can distinguish the
//! cases that matter operationally: bad input (reported, never fatal),
//! per-file extraction failures (isolated to the file), transient provider
//! errors (retried by the pipeline), permanent provider errors (fail fast),
//! and cancellation (not an error at the API surface; it becomes the
//! `cancelled` ingest phase).

use thiserror::Error;

pub type Result<T> = std::result::Result<T, EngineError>;

#[derive(Error, Debug)]
pub enum EngineError {
    /// Malformed request data: bad project id, unsupported extension,
    /// path traversal in a filename.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("{0} not found")]
    NotFound(String),

    /// A file could not be opened or yielded no extractable text.
    #[error("extraction failed: {0}")]
    Extract(String),

    #[error("ocr failed: {0}")]
    Ocr(String),

    /// Transient embedding failure; the pipeline retries these.
    #[error("embedding error: {0}")]
    Embedding(String),

    /// Permanent provider failure (auth, bad request). Never retried.
    #[error("provider error: {0}")]
    Provider(String),

    #[error("lexical index error: {0}")]
    Lexical(#[from] tantivy::TantivyError),

    #[error("store error: {0}")]
    Store(String),

    /// A second ingestion was requested while one is running.
    #[error("Ingestion already in progress")]
    Busy,

    #[error("operation cancelled")]
    Cancelled,

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),
}

impl EngineError {
    /// True for failures the embedding retry loop should give up on
    /// immediately rather than back off and retry.
    pub fn is_permanent(&self) -> bool {
        matches!(
            self,
            EngineError::Provider(_) | EngineError::Cancelled | EngineError::InvalidInput(_)
        )
    }
}
