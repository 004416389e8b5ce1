//! HTTP API surface.
//!
//! A thin axum layer over the library: handlers validate input, call into
//! the core, and shape JSON. Errors are `{"error": "<message>"}` with
//! 400 (bad input), 404 (not found), 409 (ingestion busy), or 500.
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `GET/POST` | `/api/projects` | List / create projects |
//! | `POST` | `/api/projects/activate` `/delete` `/rename` | Project lifecycle |
//! | `POST` | `/api/upload` | Multipart upload (`files[]` + `project_id`) |
//! | `GET/DELETE` | `/api/files` | List / clear uploads |
//! | `POST` | `/api/files/delete` | Delete one upload |
//! | `POST` | `/api/ingest` | Start ingestion (409 when busy) |
//! | `GET` | `/api/ingest/status` | Progress snapshot |
//! | `POST` | `/api/ingest/cancel` | Cancel the active run |
//! | `POST` | `/api/query` | Answer a question over a project |
//! | `POST` | `/api/batch` | Answer several questions concurrently |
//! | `GET` | `/api/stats` | Corpus statistics |
//! | `GET` | `/api/providers` | Available LLM providers and models |
//! | `GET/POST` | `/api/settings` | Read (masked) / update settings |
//! | `GET` | `/api/index-status` | Index load state for the UI |
//! | `GET/POST` | `/api/conversations` (+`/delete` `/messages` `/rename`) | Conversations |

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use axum::extract::{Multipart, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::json;
use tower_http::cors::{Any, CorsLayer};
use tracing::warn;

use crate::error::EngineError;
use crate::ingest;
use crate::llm::Answer;
use crate::models::{Message, ProjectStatus, Role};
use crate::ocr::OcrProvider;
use crate::project::validate_upload_name;
use crate::retriever::Retriever;
use crate::settings::{mask_key, save_settings, SavedSettings};
use crate::state::ServerState;

/// Retrieved passages handed to the LLM per question.
const QUERY_TOP_K: usize = 20;

pub fn router(state: Arc<ServerState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/api/projects", get(list_projects).post(create_project))
        .route("/api/projects/activate", post(activate_project))
        .route("/api/projects/delete", post(delete_project))
        .route("/api/projects/rename", post(rename_project))
        .route("/api/upload", post(upload_files))
        .route("/api/files", get(list_files).delete(clear_files))
        .route("/api/files/delete", post(delete_file))
        .route("/api/ingest", post(start_ingest))
        .route("/api/ingest/status", get(ingest_status))
        .route("/api/ingest/cancel", post(cancel_ingest))
        .route("/api/query", post(query))
        .route("/api/batch", post(batch_query))
        .route("/api/stats", get(stats))
        .route("/api/providers", get(providers))
        .route("/api/settings", get(get_settings).post(update_settings))
        .route("/api/index-status", get(index_status))
        .route(
            "/api/conversations",
            get(list_conversations).post(create_conversation),
        )
        .route("/api/conversations/delete", post(delete_conversation))
        .route("/api/conversations/messages", post(conversation_messages))
        .route("/api/conversations/rename", post(rename_conversation))
        .layer(cors)
        .with_state(state)
}

// ============ Errors ============

struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    fn bad_request(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            message: message.into(),
        }
    }

    fn internal(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            message: message.into(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(json!({ "error": self.message }))).into_response()
    }
}

impl From<EngineError> for ApiError {
    fn from(e: EngineError) -> Self {
        let status = match &e {
            EngineError::NotFound(_) => StatusCode::NOT_FOUND,
            EngineError::Busy => StatusCode::CONFLICT,
            EngineError::InvalidInput(_) => StatusCode::BAD_REQUEST,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        Self {
            status,
            message: e.to_string(),
        }
    }
}

type ApiResult<T> = std::result::Result<T, ApiError>;

// ============ Request shapes ============

#[derive(Deserialize)]
struct ProjectIdBody {
    project_id: String,
}

#[derive(Deserialize, Default)]
struct ProjectIdQuery {
    #[serde(default)]
    project_id: Option<String>,
}

#[derive(Deserialize)]
struct CreateProjectBody {
    #[serde(default)]
    name: String,
}

#[derive(Deserialize)]
struct RenameProjectBody {
    project_id: String,
    name: String,
}

#[derive(Deserialize)]
struct DeleteFileBody {
    project_id: String,
    name: String,
}

#[derive(Deserialize)]
struct QueryBody {
    question: String,
    #[serde(default)]
    provider: String,
    #[serde(default)]
    model: String,
    project_id: String,
    #[serde(default)]
    conversation_id: String,
}

#[derive(Deserialize)]
struct BatchBody {
    questions: Vec<String>,
    #[serde(default)]
    provider: String,
    #[serde(default)]
    model: String,
    project_id: String,
}

#[derive(Deserialize)]
struct ConversationBody {
    project_id: String,
    #[serde(default)]
    name: String,
}

#[derive(Deserialize)]
struct ConversationIdBody {
    project_id: String,
    conversation_id: String,
}

#[derive(Deserialize)]
struct RenameConversationBody {
    project_id: String,
    conversation_id: String,
    name: String,
}

#[derive(Deserialize)]
struct SettingsBody {
    #[serde(default)]
    openai_key: String,
    #[serde(default)]
    anthropic_key: String,
    #[serde(default)]
    huggingface_key: String,
    #[serde(default)]
    default_llm: String,
    #[serde(default)]
    embed_provider: String,
    #[serde(default)]
    ocr_provider: String,
    #[serde(default)]
    sarvam_key: String,
}

// ============ Projects ============

async fn list_projects(State(state): State<Arc<ServerState>>) -> impl IntoResponse {
    Json(state.projects.list())
}

async fn create_project(
    State(state): State<Arc<ServerState>>,
    Json(body): Json<CreateProjectBody>,
) -> ApiResult<impl IntoResponse> {
    let project = state.projects.create(&body.name)?;
    state.activate_project(&project);
    state.ingest_status.reset();
    Ok(Json(project))
}

async fn activate_project(
    State(state): State<Arc<ServerState>>,
    Json(body): Json<ProjectIdBody>,
) -> ApiResult<impl IntoResponse> {
    let project = state.projects.get(&body.project_id)?;
    state.activate_project(&project);
    state.ingest_status.reset();
    Ok(Json(project))
}

async fn delete_project(
    State(state): State<Arc<ServerState>>,
    Json(body): Json<ProjectIdBody>,
) -> ApiResult<impl IntoResponse> {
    // Stop any run and release the index before the directory goes away.
    if state.active_project_id().as_deref() == Some(body.project_id.as_str()) {
        state.cancel_ingest();
        state.ingest_status.reset();
    }
    state.close_index_for(&body.project_id);
    state.projects.delete(&body.project_id)?;
    Ok(Json(json!({ "status": "deleted" })))
}

async fn rename_project(
    State(state): State<Arc<ServerState>>,
    Json(body): Json<RenameProjectBody>,
) -> ApiResult<impl IntoResponse> {
    if body.name.is_empty() {
        return Err(ApiError::bad_request("project_id and name are required"));
    }
    let mut project = state.projects.get(&body.project_id)?;
    project.name = body.name;
    state.projects.update(project.clone())?;
    Ok(Json(project))
}

// ============ Files ============

async fn upload_files(
    State(state): State<Arc<ServerState>>,
    mut multipart: Multipart,
) -> ApiResult<impl IntoResponse> {
    let mut project_id = String::new();
    let mut pending: Vec<(String, Vec<u8>)> = Vec::new();

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::bad_request(format!("Failed to parse upload: {e}")))?
    {
        match field.name().unwrap_or_default() {
            "project_id" => {
                project_id = field.text().await.unwrap_or_default();
            }
            "files" | "file" => {
                let Some(name) = field.file_name().map(str::to_string) else {
                    continue;
                };
                let data = field
                    .bytes()
                    .await
                    .map_err(|e| ApiError::bad_request(format!("Failed to read upload: {e}")))?;
                pending.push((name, data.to_vec()));
            }
            _ => {}
        }
    }

    if project_id.is_empty() {
        return Err(ApiError::bad_request("project_id is required"));
    }
    let mut project = state.projects.get(&project_id)?;
    if pending.is_empty() {
        return Err(ApiError::bad_request("No files uploaded"));
    }

    let uploads_dir = state.projects.uploads_dir(&project_id);
    std::fs::create_dir_all(&uploads_dir).map_err(EngineError::from)?;

    let mut saved = Vec::new();
    for (name, data) in pending {
        let lower = name.to_lowercase();
        if !(lower.ends_with(".pdf") || lower.ends_with(".docx")) {
            continue;
        }
        if validate_upload_name(&name).is_err() {
            warn!(name = %name, "rejected upload filename");
            continue;
        }
        if std::fs::write(uploads_dir.join(&name), data).is_ok() {
            saved.push(name);
        }
    }

    project.file_count = count_files(&uploads_dir);
    state.projects.update(project)?;

    Ok(Json(json!({ "uploaded": saved, "count": saved.len() })))
}

fn count_files(dir: &std::path::Path) -> usize {
    std::fs::read_dir(dir)
        .map(|entries| entries.flatten().filter(|e| e.path().is_file()).count())
        .unwrap_or(0)
}

async fn list_files(
    State(state): State<Arc<ServerState>>,
    Query(params): Query<ProjectIdQuery>,
) -> ApiResult<impl IntoResponse> {
    let project_id = params
        .project_id
        .ok_or_else(|| ApiError::bad_request("project_id is required"))?;
    state.projects.get(&project_id)?;

    let uploads_dir = state.projects.uploads_dir(&project_id);
    let mut files = Vec::new();
    if let Ok(entries) = std::fs::read_dir(uploads_dir) {
        for entry in entries.flatten() {
            if !entry.path().is_file() {
                continue;
            }
            let size = entry.metadata().map(|m| m.len()).unwrap_or(0);
            files.push(json!({
                "name": entry.file_name().to_string_lossy(),
                "size": size,
            }));
        }
    }
    Ok(Json(files))
}

async fn clear_files(
    State(state): State<Arc<ServerState>>,
    Json(body): Json<ProjectIdBody>,
) -> ApiResult<impl IntoResponse> {
    let mut project = state.projects.get(&body.project_id)?;

    // The index must be closed before its directory is removed.
    state.close_index_for(&body.project_id);

    let paths = state.project_paths(&body.project_id);
    let _ = std::fs::remove_dir_all(&paths.uploads_dir);
    let _ = std::fs::create_dir_all(&paths.uploads_dir);
    let _ = std::fs::remove_dir_all(&paths.bm25_dir);
    let _ = std::fs::remove_file(&paths.vectors_path);
    let _ = std::fs::remove_file(paths.vectors_path.with_extension("gob"));

    project.file_count = 0;
    project.chunk_count = 0;
    project.status = ProjectStatus::Upload;
    state.projects.update(project)?;
    state.ingest_status.reset();

    Ok(Json(json!({ "status": "cleared" })))
}

async fn delete_file(
    State(state): State<Arc<ServerState>>,
    Json(body): Json<DeleteFileBody>,
) -> ApiResult<impl IntoResponse> {
    validate_upload_name(&body.name)?;
    let mut project = state.projects.get(&body.project_id)?;

    let uploads_dir = state.projects.uploads_dir(&body.project_id);
    let target = uploads_dir.join(&body.name);
    if !target.is_file() {
        return Err(EngineError::NotFound(format!("file {}", body.name)).into());
    }
    std::fs::remove_file(&target)
        .map_err(|e| ApiError::internal(format!("failed to delete file: {e}")))?;

    let remaining = count_files(&uploads_dir);
    project.file_count = remaining;
    state.projects.update(project)?;

    Ok(Json(json!({ "status": "deleted", "remaining": remaining })))
}

// ============ Ingestion ============

async fn start_ingest(
    State(state): State<Arc<ServerState>>,
    Json(body): Json<ProjectIdBody>,
) -> ApiResult<impl IntoResponse> {
    ingest::start_ingestion(Arc::clone(&state), &body.project_id).await?;
    Ok(Json(json!({ "status": "started" })))
}

async fn ingest_status(State(state): State<Arc<ServerState>>) -> impl IntoResponse {
    Json(state.ingest_status.snapshot())
}

async fn cancel_ingest(
    State(state): State<Arc<ServerState>>,
    Json(body): Json<ProjectIdBody>,
) -> impl IntoResponse {
    ingest::request_cancel(&state, &body.project_id);
    Json(json!({ "status": "cancelled" }))
}

// ============ Query ============

async fn query(
    State(state): State<Arc<ServerState>>,
    Json(body): Json<QueryBody>,
) -> ApiResult<impl IntoResponse> {
    if body.project_id.is_empty() {
        return Err(ApiError::bad_request("project_id is required"));
    }

    let Some(index) = state.index_for(&body.project_id) else {
        return Err(ApiError::bad_request(
            "No documents indexed. Upload and process documents first.",
        ));
    };
    let retriever = Retriever::new(index);

    let provider = state
        .llm_provider(&body.provider, &body.model)
        .map_err(|e| ApiError::bad_request(format!("Provider error: {e}")))?;

    let started = Instant::now();
    let results = retriever
        .search(&body.question, QUERY_TOP_K)
        .await
        .map_err(|e| ApiError::internal(format!("Retrieval error: {e}")))?;

    let summaries = retriever.doc_summaries();
    let answer = provider
        .answer_question(&body.question, &results, &summaries)
        .await
        .map_err(|e| ApiError::internal(format!("LLM error: {e}")))?;
    let elapsed = started.elapsed().as_secs_f64();

    if !body.conversation_id.is_empty() {
        persist_exchange(&state, &body, &answer, elapsed);
    }

    Ok(Json(json!({ "answer": answer, "time_seconds": elapsed })))
}

/// Write the user/assistant message pair in the background; a persistence
/// failure never fails the query.
fn persist_exchange(state: &Arc<ServerState>, body: &QueryBody, answer: &Answer, elapsed: f64) {
    let state = Arc::clone(state);
    let project_id = body.project_id.clone();
    let conversation_id = body.conversation_id.clone();
    let question = body.question.clone();
    let provider = body.provider.clone();
    let model = body.model.clone();
    let answer = answer.clone();

    tokio::task::spawn_blocking(move || {
        let now = chrono::Utc::now();
        let user = Message {
            role: Role::User,
            content: question,
            metadata: None,
            timestamp: now,
        };
        let assistant = Message {
            role: Role::Assistant,
            content: answer.answer.clone(),
            metadata: Some(json!({
                "thinking": answer.thinking,
                "documents": answer.documents,
                "pages": answer.pages,
                "footnotes": answer.footnotes,
                "confidence": answer.confidence,
                "confidence_reason": answer.confidence_reason,
                "time_seconds": elapsed,
                "provider": provider,
                "model": model,
            })),
            timestamp: chrono::Utc::now(),
        };

        for message in [user, assistant] {
            if let Err(e) = state
                .projects
                .append_message(&project_id, &conversation_id, message)
            {
                warn!(error = %e, "failed to persist conversation message");
                break;
            }
        }
    });
}

async fn batch_query(
    State(state): State<Arc<ServerState>>,
    Json(body): Json<BatchBody>,
) -> ApiResult<impl IntoResponse> {
    if body.project_id.is_empty() {
        return Err(ApiError::bad_request("project_id is required"));
    }

    let Some(index) = state.index_for(&body.project_id) else {
        return Err(ApiError::bad_request(
            "No documents indexed. Upload and process documents first.",
        ));
    };

    let provider = Arc::new(
        state
            .llm_provider(&body.provider, &body.model)
            .map_err(|e| ApiError::bad_request(format!("Provider error: {e}")))?,
    );

    let started = Instant::now();
    let mut tasks = tokio::task::JoinSet::new();
    for (i, question) in body.questions.iter().enumerate() {
        let retriever = Retriever::new(Arc::clone(&index));
        let provider = Arc::clone(&provider);
        let question = question.clone();
        tasks.spawn(async move {
            let results = retriever.search(&question, QUERY_TOP_K).await?;
            let summaries = retriever.doc_summaries();
            let answer = provider
                .answer_question(&question, &results, &summaries)
                .await?;
            Ok::<(usize, Answer), EngineError>((i, answer))
        });
    }

    let mut answers: Vec<Option<Answer>> = vec![None; body.questions.len()];
    while let Some(joined) = tasks.join_next().await {
        match joined {
            Ok(Ok((i, answer))) => answers[i] = Some(answer),
            Ok(Err(e)) => warn!(error = %e, "batch question failed"),
            Err(e) => warn!(error = %e, "batch task failed"),
        }
    }

    Ok(Json(json!({
        "answers": answers,
        "total_time_seconds": started.elapsed().as_secs_f64(),
    })))
}

// ============ Stats & providers ============

async fn stats(
    State(state): State<Arc<ServerState>>,
    Query(params): Query<ProjectIdQuery>,
) -> impl IntoResponse {
    let index = match &params.project_id {
        Some(id) => state.index_for(id),
        None => state
            .active_project_id()
            .and_then(|id| state.index_for(&id)),
    };

    let (documents, chunks) = match index {
        Some(index) => index.with_store(|store| {
            let documents: std::collections::HashSet<&str> =
                store.chunks.iter().map(|c| c.document.as_str()).collect();
            (documents.len(), store.chunks.len())
        }),
        None => (0, 0),
    };

    let settings = state.settings.read().unwrap();
    let available: Vec<&String> = settings
        .provider_keys
        .iter()
        .filter(|(_, key)| !key.is_empty())
        .map(|(name, _)| name)
        .collect();

    Json(json!({
        "documents": documents,
        "chunks": chunks,
        "index_ready": chunks > 0,
        "providers": available,
        "default_llm": settings.default_llm,
    }))
}

async fn providers(State(state): State<Arc<ServerState>>) -> impl IntoResponse {
    let catalog: HashMap<&str, Vec<serde_json::Value>> = HashMap::from([
        (
            "openai",
            vec![
                json!({ "id": "gpt-4o", "name": "GPT-4o" }),
                json!({ "id": "gpt-4o-mini", "name": "GPT-4o Mini" }),
                json!({ "id": "gpt-4.1", "name": "GPT-4.1" }),
                json!({ "id": "gpt-4.1-mini", "name": "GPT-4.1 Mini" }),
            ],
        ),
        (
            "anthropic",
            vec![
                json!({ "id": "claude-3-5-sonnet-20241022", "name": "Claude 3.5 Sonnet" }),
                json!({ "id": "claude-3-5-haiku-20241022", "name": "Claude 3.5 Haiku" }),
                json!({ "id": "claude-3-opus-20240229", "name": "Claude 3 Opus" }),
            ],
        ),
        (
            "huggingface",
            vec![
                json!({ "id": "mistralai/Mistral-7B-Instruct-v0.3", "name": "Mistral 7B Instruct" }),
                json!({ "id": "meta-llama/Meta-Llama-3-8B-Instruct", "name": "Llama 3 8B Instruct" }),
                json!({ "id": "Qwen/Qwen2.5-72B-Instruct", "name": "Qwen 2.5 72B" }),
            ],
        ),
    ]);

    let settings = state.settings.read().unwrap();
    let mut result = serde_json::Map::new();
    for (name, key) in &settings.provider_keys {
        if !key.is_empty() {
            if let Some(models) = catalog.get(name.as_str()) {
                result.insert(name.clone(), json!(models));
            }
        }
    }
    Json(serde_json::Value::Object(result))
}

// ============ Settings ============

async fn get_settings(State(state): State<Arc<ServerState>>) -> impl IntoResponse {
    let settings = state.settings.read().unwrap();
    Json(json!({
        "default_llm": settings.default_llm,
        "embed_provider": settings.embed_provider,
        "openai_key": mask_key(&settings.key_for("openai")),
        "anthropic_key": mask_key(&settings.key_for("anthropic")),
        "huggingface_key": mask_key(&settings.key_for("huggingface")),
        "ocr_provider": settings.ocr_provider.as_str(),
        "sarvam_key": mask_key(&settings.sarvam_key),
        "tesseract_available": state.tesseract_available,
    }))
}

/// Masked values round-tripped from the UI (`abcd...wxyz`) are ignored so a
/// settings save never clobbers a stored key with its mask.
fn is_real_key(value: &str) -> bool {
    !value.is_empty() && !value.contains("...")
}

async fn update_settings(
    State(state): State<Arc<ServerState>>,
    Json(body): Json<SettingsBody>,
) -> ApiResult<impl IntoResponse> {
    let saved = {
        let mut settings = state.settings.write().unwrap();

        if is_real_key(&body.openai_key) {
            settings
                .provider_keys
                .insert("openai".to_string(), body.openai_key.clone());
        }
        if is_real_key(&body.anthropic_key) {
            settings
                .provider_keys
                .insert("anthropic".to_string(), body.anthropic_key.clone());
        }
        if is_real_key(&body.huggingface_key) {
            settings
                .provider_keys
                .insert("huggingface".to_string(), body.huggingface_key.clone());
        }
        if !body.default_llm.is_empty() {
            settings.default_llm = body.default_llm.clone();
        }
        if !body.embed_provider.is_empty() {
            settings.embed_provider = body.embed_provider.clone();
        }
        settings.ocr_provider = OcrProvider::parse(&body.ocr_provider);
        if is_real_key(&body.sarvam_key) {
            settings.sarvam_key = body.sarvam_key.clone();
        }

        SavedSettings {
            openai_key: settings.key_for("openai"),
            anthropic_key: settings.key_for("anthropic"),
            huggingface_key: settings.key_for("huggingface"),
            default_llm: settings.default_llm.clone(),
            embed_provider: settings.embed_provider.clone(),
            ocr_provider: settings.ocr_provider.as_str().to_string(),
            sarvam_key: settings.sarvam_key.clone(),
        }
    };

    if let Err(e) = save_settings(&state.projects.settings_path(), &saved) {
        warn!(error = %e, "failed to persist settings");
    }

    Ok(Json(json!({ "status": "saved" })))
}

// ============ Index status ============

async fn index_status(
    State(state): State<Arc<ServerState>>,
    Query(params): Query<ProjectIdQuery>,
) -> impl IntoResponse {
    let (status, ready) = match &params.project_id {
        Some(id) if state.active_project_id().as_deref() != Some(id.as_str()) => {
            if state.cache.has(id) {
                ("ready", true)
            } else {
                ("not_loaded", false)
            }
        }
        _ => state.index_status(),
    };
    Json(json!({ "status": status, "ready": ready }))
}

// ============ Conversations ============

async fn list_conversations(
    State(state): State<Arc<ServerState>>,
    Query(params): Query<ProjectIdQuery>,
) -> ApiResult<impl IntoResponse> {
    let project_id = params
        .project_id
        .ok_or_else(|| ApiError::bad_request("project_id is required"))?;
    state.projects.get(&project_id)?;
    Ok(Json(state.projects.list_conversations(&project_id)))
}

async fn create_conversation(
    State(state): State<Arc<ServerState>>,
    Json(body): Json<ConversationBody>,
) -> ApiResult<impl IntoResponse> {
    let conversation = state.projects.create_conversation(&body.project_id, &body.name)?;
    Ok(Json(conversation))
}

async fn delete_conversation(
    State(state): State<Arc<ServerState>>,
    Json(body): Json<ConversationIdBody>,
) -> ApiResult<impl IntoResponse> {
    state
        .projects
        .delete_conversation(&body.project_id, &body.conversation_id)?;
    Ok(Json(json!({ "status": "ok" })))
}

async fn conversation_messages(
    State(state): State<Arc<ServerState>>,
    Json(body): Json<ConversationIdBody>,
) -> ApiResult<impl IntoResponse> {
    state
        .projects
        .get_conversation(&body.project_id, &body.conversation_id)?;
    let messages = state
        .projects
        .load_messages(&body.project_id, &body.conversation_id)
        .unwrap_or_default();
    Ok(Json(messages))
}

async fn rename_conversation(
    State(state): State<Arc<ServerState>>,
    Json(body): Json<RenameConversationBody>,
) -> ApiResult<impl IntoResponse> {
    let mut conversation = state
        .projects
        .get_conversation(&body.project_id, &body.conversation_id)?;
    conversation.name = body.name;
    state.projects.update_conversation(&conversation)?;
    Ok(Json(conversation))
}
