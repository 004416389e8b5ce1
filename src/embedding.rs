//! Embedding providers and vector math.
//!
//! The [`Embedder`] capability turns a batch of texts into fixed-dimension
//! dense vectors, one per input in input order, or fails the whole batch.
//! Backends:
//!
//! - **OpenAI**: `POST /v1/embeddings`, default model `text-embedding-3-small`
//! - **HuggingFace**: `POST https://router.huggingface.co/models/<model>`,
//!   default model `BAAI/bge-small-en-v1.5`
//!
//! Batching and retry policy belong to the ingestion pipeline, not the
//! providers: a 4xx response other than 429 is surfaced as a permanent
//! provider error, everything else as a retriable embedding error.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::json;

use crate::error::{EngineError, Result};

const OPENAI_EMBEDDINGS_URL: &str = "https://api.openai.com/v1/embeddings";
const HF_ROUTER_BASE: &str = "https://router.huggingface.co/models";

const DEFAULT_OPENAI_MODEL: &str = "text-embedding-3-small";
const DEFAULT_HF_MODEL: &str = "BAAI/bge-small-en-v1.5";

const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

/// Capability for turning texts into dense vectors.
///
/// Implementations must preserve input order and either return one vector
/// per input or fail the whole batch.
#[async_trait]
pub trait Embedder: Send + Sync {
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;

    /// Model identifier, for logging and stats.
    fn model_name(&self) -> &str;
}

/// Select an embedding backend by provider name.
///
/// `""` and `"openai"` select OpenAI; `"huggingface"` selects the HF router.
pub fn create_embedder(
    provider: &str,
    api_key: &str,
    model: Option<String>,
) -> Result<Arc<dyn Embedder>> {
    match provider.to_lowercase().as_str() {
        "openai" | "" => Ok(Arc::new(OpenAiEmbedder::new(api_key, model)?)),
        "huggingface" => Ok(Arc::new(HuggingFaceEmbedder::new(api_key, model)?)),
        other => Err(EngineError::InvalidInput(format!(
            "unknown embedding provider: {other}"
        ))),
    }
}

// ============ OpenAI ============

pub struct OpenAiEmbedder {
    client: reqwest::Client,
    api_key: String,
    model: String,
}

impl OpenAiEmbedder {
    pub fn new(api_key: &str, model: Option<String>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()?;
        Ok(Self {
            client,
            api_key: api_key.to_string(),
            model: model.unwrap_or_else(|| DEFAULT_OPENAI_MODEL.to_string()),
        })
    }
}

#[async_trait]
impl Embedder for OpenAiEmbedder {
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let body = json!({ "model": self.model, "input": texts });

        let response = self
            .client
            .post(OPENAI_EMBEDDINGS_URL)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            let message = format!("OpenAI embeddings error {status}: {text}");
            if status.is_client_error() && status.as_u16() != 429 {
                return Err(EngineError::Provider(message));
            }
            return Err(EngineError::Embedding(message));
        }

        let payload: serde_json::Value = response.json().await?;
        parse_openai_embeddings(&payload, texts.len())
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}

/// Extract `data[].embedding` in request order, trusting the `index` field
/// over response ordering.
fn parse_openai_embeddings(payload: &serde_json::Value, expected: usize) -> Result<Vec<Vec<f32>>> {
    let data = payload
        .get("data")
        .and_then(|d| d.as_array())
        .ok_or_else(|| {
            EngineError::Embedding("invalid OpenAI response: missing data array".to_string())
        })?;

    let mut indexed: Vec<(usize, Vec<f32>)> = Vec::with_capacity(data.len());
    for (pos, item) in data.iter().enumerate() {
        let vector: Vec<f32> = item
            .get("embedding")
            .and_then(|e| e.as_array())
            .ok_or_else(|| {
                EngineError::Embedding("invalid OpenAI response: missing embedding".to_string())
            })?
            .iter()
            .map(|v| v.as_f64().unwrap_or(0.0) as f32)
            .collect();
        let index = item
            .get("index")
            .and_then(|i| i.as_u64())
            .map(|i| i as usize)
            .unwrap_or(pos);
        indexed.push((index, vector));
    }
    indexed.sort_by_key(|(index, _)| *index);

    let embeddings: Vec<Vec<f32>> = indexed.into_iter().map(|(_, v)| v).collect();
    if embeddings.len() != expected {
        return Err(EngineError::Embedding(format!(
            "OpenAI returned {} embeddings for {} inputs",
            embeddings.len(),
            expected
        )));
    }
    Ok(embeddings)
}

// ============ HuggingFace ============

pub struct HuggingFaceEmbedder {
    client: reqwest::Client,
    api_key: String,
    model: String,
}

impl HuggingFaceEmbedder {
    pub fn new(api_key: &str, model: Option<String>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()?;
        Ok(Self {
            client,
            api_key: api_key.to_string(),
            model: model.unwrap_or_else(|| DEFAULT_HF_MODEL.to_string()),
        })
    }
}

#[async_trait]
impl Embedder for HuggingFaceEmbedder {
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let url = format!("{HF_ROUTER_BASE}/{}", self.model);
        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&json!({ "inputs": texts }))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            let message = format!("HF api error {status}: {text}");
            if status.is_client_error() && status.as_u16() != 429 {
                return Err(EngineError::Provider(message));
            }
            return Err(EngineError::Embedding(message));
        }

        let vectors: Vec<Vec<f64>> = response.json().await?;
        if vectors.len() != texts.len() {
            return Err(EngineError::Embedding(format!(
                "HF returned {} embeddings for {} inputs",
                vectors.len(),
                texts.len()
            )));
        }
        Ok(vectors
            .into_iter()
            .map(|v| v.into_iter().map(|x| x as f32).collect())
            .collect())
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}

// ============ Vector math ============

/// Cosine similarity `dot(a,b) / (‖a‖·‖b‖)` with f64 accumulation.
///
/// Returns `0.0` for mismatched lengths, empty vectors, or zero norms.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f64 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let mut dot = 0.0f64;
    let mut norm_a = 0.0f64;
    let mut norm_b = 0.0f64;
    for (x, y) in a.iter().zip(b.iter()) {
        let (x, y) = (*x as f64, *y as f64);
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a.sqrt() * norm_b.sqrt())
}
