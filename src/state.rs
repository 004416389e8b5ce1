//! Shared server state: active project/index slot, index cache, runtime
//! settings, and the ingestion cancel handle.
//!
//! Locking discipline: the active slot and settings live behind `RwLock`s
//! whose guards are never held across I/O: readers copy what they need and
//! release. The index cache has its own mutex; the project store its own
//! reader-writer lock.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, RwLock};

use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::cache::{IndexCache, DEFAULT_CACHE_CAPACITY};
use crate::embedding::{self, Embedder};
use crate::error::{EngineError, Result};
use crate::index::ProjectIndex;
use crate::llm::LlmProvider;
use crate::models::{Project, ProjectStatus};
use crate::ocr::{OcrConfig, OcrProvider};
use crate::project::ProjectStore;
use crate::status::IngestTracker;
use crate::store::VectorStore;

/// Mutable runtime configuration, seeded from the environment and
/// overridden by `settings.json`.
#[derive(Debug, Clone, Default)]
pub struct RuntimeSettings {
    /// API keys by provider name: `openai`, `anthropic`, `huggingface`.
    pub provider_keys: HashMap<String, String>,
    pub default_llm: String,
    pub embed_provider: String,
    pub ocr_provider: OcrProvider,
    pub sarvam_key: String,
}

impl RuntimeSettings {
    pub fn key_for(&self, provider: &str) -> String {
        self.provider_keys.get(provider).cloned().unwrap_or_default()
    }

    /// The API key backing the configured embedding provider.
    pub fn embed_api_key(&self) -> String {
        match self.embed_provider.as_str() {
            "huggingface" => self.key_for("huggingface"),
            _ => self.key_for("openai"),
        }
    }
}

#[derive(Default)]
struct ActiveSlot {
    project_id: Option<String>,
    index: Option<Arc<ProjectIndex>>,
    loading: bool,
}

pub struct ServerState {
    pub projects: ProjectStore,
    pub ingest_status: IngestTracker,
    pub cache: IndexCache,
    pub settings: RwLock<RuntimeSettings>,
    pub tesseract_available: bool,
    /// Fixed embedder used instead of the settings-derived one. Lets
    /// offline runs and tests inject a deterministic backend.
    pub embedder_override: Option<Arc<dyn Embedder>>,

    active: RwLock<ActiveSlot>,
    ingest_cancel: Mutex<Option<CancellationToken>>,
}

impl ServerState {
    pub fn new(
        projects: ProjectStore,
        settings: RuntimeSettings,
        tesseract_available: bool,
    ) -> Self {
        Self {
            projects,
            ingest_status: IngestTracker::new(),
            cache: IndexCache::new(DEFAULT_CACHE_CAPACITY),
            settings: RwLock::new(settings),
            tesseract_available,
            embedder_override: None,
            active: RwLock::new(ActiveSlot::default()),
            ingest_cancel: Mutex::new(None),
        }
    }

    // ==================== Capabilities ====================

    pub fn embedder(&self) -> Result<Arc<dyn Embedder>> {
        if let Some(embedder) = &self.embedder_override {
            return Ok(Arc::clone(embedder));
        }
        let settings = self.settings.read().unwrap();
        embedding::create_embedder(&settings.embed_provider, &settings.embed_api_key(), None)
    }

    pub fn ocr_config(&self) -> OcrConfig {
        let settings = self.settings.read().unwrap();
        OcrConfig {
            provider: settings.ocr_provider,
            sarvam_key: settings.sarvam_key.clone(),
            tesseract_available: self.tesseract_available,
        }
    }

    /// LLM backend for a query: requested provider or the configured
    /// default, with its stored API key.
    pub fn llm_provider(&self, requested_provider: &str, requested_model: &str) -> Result<LlmProvider> {
        let settings = self.settings.read().unwrap();
        let provider = if requested_provider.is_empty() {
            settings.default_llm.clone()
        } else {
            requested_provider.to_string()
        };
        let api_key = settings.key_for(&provider);
        if api_key.is_empty() {
            return Err(EngineError::InvalidInput(format!(
                "no API key configured for provider: {provider}"
            )));
        }
        LlmProvider::new(&provider, &api_key, requested_model)
    }

    pub fn openai_key(&self) -> String {
        self.settings.read().unwrap().key_for("openai")
    }

    // ==================== Active index & cache ====================

    /// Index used to answer queries for `project_id`: the active slot if it
    /// matches, otherwise a direct cache probe (which also covers queries
    /// racing a background activation).
    pub fn index_for(&self, project_id: &str) -> Option<Arc<ProjectIndex>> {
        {
            let active = self.active.read().unwrap();
            if active.project_id.as_deref() == Some(project_id) {
                if let Some(index) = &active.index {
                    return Some(Arc::clone(index));
                }
            }
        }
        self.cache.get(project_id)
    }

    /// Install a freshly built or loaded index as active and cache it.
    pub fn install_active(&self, project_id: &str, index: Arc<ProjectIndex>) {
        {
            let mut active = self.active.write().unwrap();
            active.project_id = Some(project_id.to_string());
            active.index = Some(Arc::clone(&index));
            active.loading = false;
        }
        self.cache.put(project_id, index);
    }

    /// Close and discard the loaded index for `project_id`, both in the
    /// active slot and the cache. Required before deleting the project
    /// directory or rebuilding its index.
    pub fn close_index_for(&self, project_id: &str) {
        let index = {
            let mut active = self.active.write().unwrap();
            if active.project_id.as_deref() == Some(project_id) {
                active.index.take()
            } else {
                None
            }
        };
        if let Some(index) = index {
            index.close();
        }
        if let Some(cached) = self.cache.get(project_id) {
            cached.close();
        }
        self.cache.remove(project_id);
    }

    /// Activation protocol: make `project` the active one. For `ready`
    /// projects the cache is consulted first; on a miss a background loader
    /// opens the on-disk index and installs it.
    pub fn activate_project(self: &Arc<Self>, project: &Project) {
        {
            let mut active = self.active.write().unwrap();
            active.project_id = Some(project.id.clone());
            active.index = None;
            active.loading = false;
        }

        if project.status != ProjectStatus::Ready {
            return;
        }

        if let Some(cached) = self.cache.get(&project.id) {
            info!(project = %project.id, "index cache hit, instant activation");
            let mut active = self.active.write().unwrap();
            active.index = Some(cached);
            return;
        }

        self.active.write().unwrap().loading = true;
        let state = Arc::clone(self);
        let project_id = project.id.clone();
        tokio::spawn(async move {
            match state.load_project_index(&project_id).await {
                Ok(index) => {
                    state.install_active(&project_id, index);
                    info!(project = %project_id, "index loaded and activated");
                }
                Err(e) => {
                    warn!(project = %project_id, error = %e, "could not load project index");
                    state.active.write().unwrap().loading = false;
                }
            }
        });
    }

    /// Open a project's persisted index from disk: lexical handle plus the
    /// vector store (binary-preferred).
    pub async fn load_project_index(&self, project_id: &str) -> Result<Arc<ProjectIndex>> {
        let vectors_path = self.projects.vectors_path(project_id);
        let has_vectors =
            vectors_path.exists() || vectors_path.with_extension("gob").exists();
        if !has_vectors {
            return Err(EngineError::NotFound(format!(
                "vectors for project {project_id}"
            )));
        }

        let bm25_dir = self.projects.bm25_dir(project_id);
        let embedder = self.embedder()?;

        let loaded = tokio::task::spawn_blocking(move || -> Result<(crate::lexical::LexicalIndex, VectorStore)> {
            let lexical = crate::lexical::LexicalIndex::open(&bm25_dir)?;
            let store = VectorStore::load(&vectors_path)?;
            Ok((lexical, store))
        })
        .await
        .map_err(|e| EngineError::Store(format!("index load task: {e}")))??;

        let (lexical, store) = loaded;
        let index = ProjectIndex::new(lexical, embedder);
        index.set_store(store);
        Ok(Arc::new(index))
    }

    /// `(status, ready)` for the index-status endpoint:
    /// `ready` / `loading` / `not_loaded`.
    pub fn index_status(&self) -> (&'static str, bool) {
        let active = self.active.read().unwrap();
        let ready = active.index.is_some();
        let status = if active.loading {
            "loading"
        } else if ready {
            "ready"
        } else {
            "not_loaded"
        };
        (status, ready)
    }

    pub fn active_project_id(&self) -> Option<String> {
        self.active.read().unwrap().project_id.clone()
    }

    // ==================== Ingestion cancel handle ====================

    pub fn set_ingest_cancel(&self, token: CancellationToken) {
        *self.ingest_cancel.lock().unwrap() = Some(token);
    }

    pub fn clear_ingest_cancel(&self) {
        *self.ingest_cancel.lock().unwrap() = None;
    }

    /// Fire the active run's cancellation token, if any. Returns whether a
    /// run was cancelled.
    pub fn cancel_ingest(&self) -> bool {
        let guard = self.ingest_cancel.lock().unwrap();
        match guard.as_ref() {
            Some(token) => {
                token.cancel();
                true
            }
            None => false,
        }
    }

    /// Paths bundle for one project, resolved once per run.
    pub fn project_paths(&self, project_id: &str) -> ProjectPaths {
        ProjectPaths {
            uploads_dir: self.projects.uploads_dir(project_id),
            bm25_dir: self.projects.bm25_dir(project_id),
            vectors_path: self.projects.vectors_path(project_id),
        }
    }
}

pub struct ProjectPaths {
    pub uploads_dir: PathBuf,
    pub bm25_dir: PathBuf,
    pub vectors_path: PathBuf,
}
