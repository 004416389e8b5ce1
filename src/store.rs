//! On-disk persistence for chunks and document summaries.
//!
//! Two formats are written side by side:
//!
//! - `vectors.gob`: bincode, the primary format, several times faster to
//!   load than JSON for large chunk lists;
//! - `vectors.json`: JSON fallback kept for backward compatibility and
//!   debugging.
//!
//! Load order is binary first, then the JSON object form, then the legacy
//! layout (a bare JSON array of chunks, from before document summaries
//! existed). A successful load restores exactly the state of the last
//! successful save.

use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::{EngineError, Result};
use crate::models::{Chunk, DocumentSummary};

/// In-memory chunk + summary collection for one project.
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct VectorStore {
    pub chunks: Vec<Chunk>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub doc_summaries: Vec<DocumentSummary>,
}

/// `vectors.json` → `vectors.gob` sibling path.
fn binary_path(json_path: &Path) -> PathBuf {
    json_path.with_extension("gob")
}

impl VectorStore {
    /// Persist both formats. The binary write is best-effort (a failure is
    /// logged and JSON remains authoritative); the JSON write is required.
    pub fn save(&self, json_path: &Path) -> Result<()> {
        let gob = binary_path(json_path);
        match self.save_binary(&gob) {
            Ok(()) => info!(path = %gob.display(), chunks = self.chunks.len(), "saved binary vectors"),
            Err(e) => warn!(path = %gob.display(), error = %e, "failed to save binary vectors"),
        }

        let file = File::create(json_path)?;
        serde_json::to_writer(BufWriter::new(file), self)?;
        Ok(())
    }

    fn save_binary(&self, path: &Path) -> Result<()> {
        let file = File::create(path)?;
        bincode::serialize_into(BufWriter::new(file), self)
            .map_err(|e| EngineError::Store(format!("encode binary vectors: {e}")))
    }

    /// Load from disk, binary-preferred.
    pub fn load(json_path: &Path) -> Result<Self> {
        let gob = binary_path(json_path);
        if gob.exists() {
            match Self::load_binary(&gob) {
                Ok(store) => {
                    info!(chunks = store.chunks.len(), "loaded vectors from binary");
                    return Ok(store);
                }
                Err(e) => warn!(error = %e, "binary load failed, falling back to JSON"),
            }
        }

        let data = std::fs::read(json_path)?;

        // Current format: an object with chunks and summaries.
        if let Ok(store) = serde_json::from_slice::<VectorStore>(&data) {
            if !store.chunks.is_empty() || !store.doc_summaries.is_empty() {
                info!(chunks = store.chunks.len(), "loaded vectors from JSON");
                return Ok(store);
            }
        }

        // Legacy format: a bare array of chunks.
        let chunks: Vec<Chunk> = serde_json::from_slice(&data)
            .map_err(|e| EngineError::Store(format!("parse vectors file: {e}")))?;
        info!(chunks = chunks.len(), "loaded vectors from legacy JSON");
        Ok(Self {
            chunks,
            doc_summaries: Vec::new(),
        })
    }

    fn load_binary(path: &Path) -> Result<Self> {
        let file = File::open(path)?;
        bincode::deserialize_from(BufReader::new(file))
            .map_err(|e| EngineError::Store(format!("decode binary vectors: {e}")))
    }
}
