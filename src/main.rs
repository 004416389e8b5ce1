//! Server entry point.
//!
//! Configuration comes from the environment first, overridden by
//! `<data>/settings.json` (API keys stored there are obfuscated, see
//! [`docpilot::crypto`]):
//!
//! | Variable | Default | Purpose |
//! |----------|---------|---------|
//! | `PORT` | `8080` | HTTP listen port |
//! | `DATA_DIR` | `data` | Root of all persisted state |
//! | `OPENAI_API_KEY` / `ANTHROPIC_API_KEY` / `HUGGINGFACE_API_KEY` | unset | Provider keys |
//! | `LLM_PROVIDER` | `openai` | Default answer provider |
//! | `EMBEDDING_PROVIDER` | `openai` | Embedding backend |
//! | `OCR_PROVIDER` | auto | `tesseract`, `sarvam`, or `none` |
//! | `SARVAM_API_KEY` | unset | Sarvam OCR key |
//!
//! Exits non-zero when the data directory cannot be created or the port
//! cannot be bound.

use std::collections::HashMap;
use std::sync::Arc;

use anyhow::Context;
use tracing::info;

use docpilot::ocr::{self, OcrProvider};
use docpilot::project::ProjectStore;
use docpilot::server;
use docpilot::settings::load_settings;
use docpilot::state::{RuntimeSettings, ServerState};

fn env_or_default(name: &str, default: &str) -> String {
    std::env::var(name).unwrap_or_else(|_| default.to_string())
}

/// Environment configuration overridden by `settings.json`.
fn build_settings(store: &ProjectStore, tesseract_available: bool) -> RuntimeSettings {
    let mut provider_keys = HashMap::from([
        ("openai".to_string(), env_or_default("OPENAI_API_KEY", "")),
        (
            "anthropic".to_string(),
            env_or_default("ANTHROPIC_API_KEY", ""),
        ),
        (
            "huggingface".to_string(),
            env_or_default("HUGGINGFACE_API_KEY", ""),
        ),
    ]);
    let mut default_llm = env_or_default("LLM_PROVIDER", "openai");
    let mut embed_provider = env_or_default("EMBEDDING_PROVIDER", "openai");
    let mut ocr_provider = OcrProvider::parse(&env_or_default("OCR_PROVIDER", ""));
    let mut sarvam_key = env_or_default("SARVAM_API_KEY", "");

    if let Some(saved) = load_settings(&store.settings_path()) {
        info!("loading saved settings");
        for (name, value) in [
            ("openai", &saved.openai_key),
            ("anthropic", &saved.anthropic_key),
            ("huggingface", &saved.huggingface_key),
        ] {
            if !value.is_empty() {
                provider_keys.insert(name.to_string(), value.clone());
            }
        }
        if !saved.default_llm.is_empty() {
            default_llm = saved.default_llm;
        }
        if !saved.embed_provider.is_empty() {
            embed_provider = saved.embed_provider;
        }
        if !saved.ocr_provider.is_empty() {
            ocr_provider = OcrProvider::parse(&saved.ocr_provider);
        }
        if !saved.sarvam_key.is_empty() {
            sarvam_key = saved.sarvam_key;
        }
    }

    // Auto-select an OCR backend when none is configured explicitly.
    if ocr_provider == OcrProvider::Auto {
        if !sarvam_key.is_empty() {
            ocr_provider = OcrProvider::Sarvam;
            info!("OCR: auto-selected Sarvam (API key configured)");
        } else if tesseract_available {
            ocr_provider = OcrProvider::Tesseract;
            info!("OCR: auto-selected tesseract");
        } else {
            info!("OCR: no provider available (scanned PDFs will not be processed)");
        }
    }
    if ocr_provider == OcrProvider::Tesseract && tesseract_available && !ocr::detect_pdftoppm() {
        info!("OCR warning: tesseract found but no PDF-to-image converter (install Poppler)");
    }

    RuntimeSettings {
        provider_keys,
        default_llm,
        embed_provider,
        ocr_provider,
        sarvam_key,
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let data_dir = env_or_default("DATA_DIR", "data");
    let store = ProjectStore::new(&data_dir)
        .with_context(|| format!("failed to initialize data directory {data_dir}"))?;

    let tesseract_available = ocr::detect_tesseract();
    let settings = build_settings(&store, tesseract_available);
    let state = Arc::new(ServerState::new(store, settings, tesseract_available));

    let port = env_or_default("PORT", "8080");
    let bind_addr = format!("0.0.0.0:{port}");
    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("failed to bind {bind_addr}"))?;

    info!(addr = %bind_addr, "docpilot server listening");
    axum::serve(listener, server::router(state))
        .await
        .context("server error")?;

    Ok(())
}
