//! Persisted user settings with obfuscated API keys.
//!
//! `<data>/settings.json` overrides environment configuration. Key fields
//! are encrypted on write ([`crate::crypto`]) and transparently accept
//! legacy plaintext on read, so existing files keep working.

use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::crypto;
use crate::error::Result;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SavedSettings {
    #[serde(default)]
    pub openai_key: String,
    #[serde(default)]
    pub anthropic_key: String,
    #[serde(default)]
    pub huggingface_key: String,
    #[serde(default)]
    pub default_llm: String,
    #[serde(default)]
    pub embed_provider: String,
    #[serde(default)]
    pub ocr_provider: String,
    #[serde(default)]
    pub sarvam_key: String,
}

/// Decrypt a stored key, passing legacy plaintext values through unchanged.
fn decrypt_or_passthrough(value: &str) -> String {
    if value.is_empty() {
        return String::new();
    }
    match crypto::decrypt(value) {
        Ok(plain) => plain,
        Err(_) => value.to_string(),
    }
}

/// Encrypt for storage; on failure the plaintext is kept so settings are
/// never lost to a crypto error.
fn encrypt_or_plaintext(value: &str) -> String {
    match crypto::encrypt(value) {
        Ok(encrypted) => encrypted,
        Err(e) => {
            warn!(error = %e, "failed to encrypt settings key, storing plaintext");
            value.to_string()
        }
    }
}

/// Load settings from disk. Returns `None` when the file is missing or
/// unreadable; the caller falls back to environment configuration.
pub fn load_settings(path: &Path) -> Option<SavedSettings> {
    let data = std::fs::read(path).ok()?;
    let mut settings: SavedSettings = match serde_json::from_slice(&data) {
        Ok(s) => s,
        Err(e) => {
            warn!(path = %path.display(), error = %e, "could not parse settings file");
            return None;
        }
    };

    settings.openai_key = decrypt_or_passthrough(&settings.openai_key);
    settings.anthropic_key = decrypt_or_passthrough(&settings.anthropic_key);
    settings.huggingface_key = decrypt_or_passthrough(&settings.huggingface_key);
    settings.sarvam_key = decrypt_or_passthrough(&settings.sarvam_key);

    Some(settings)
}

/// Persist settings with key fields encrypted.
pub fn save_settings(path: &Path, settings: &SavedSettings) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let to_save = SavedSettings {
        openai_key: encrypt_or_plaintext(&settings.openai_key),
        anthropic_key: encrypt_or_plaintext(&settings.anthropic_key),
        huggingface_key: encrypt_or_plaintext(&settings.huggingface_key),
        sarvam_key: encrypt_or_plaintext(&settings.sarvam_key),
        default_llm: settings.default_llm.clone(),
        embed_provider: settings.embed_provider.clone(),
        ocr_provider: settings.ocr_provider.clone(),
    };

    let data = serde_json::to_vec_pretty(&to_save)?;
    std::fs::write(path, data)?;
    Ok(())
}

/// Mask a key for display: `abcd...wxyz`, or `****` for short keys.
pub fn mask_key(key: &str) -> String {
    if key.is_empty() {
        return String::new();
    }
    if key.len() <= 8 {
        return "****".to_string();
    }
    format!("{}...{}", &key[..4], &key[key.len() - 4..])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn save_load_round_trip_decrypts_keys() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");

        let settings = SavedSettings {
            openai_key: "sk-openai-123456789".to_string(),
            anthropic_key: "sk-ant-987654321".to_string(),
            default_llm: "anthropic".to_string(),
            embed_provider: "openai".to_string(),
            ..Default::default()
        };
        save_settings(&path, &settings).unwrap();

        // On disk the keys are not plaintext.
        let raw = std::fs::read_to_string(&path).unwrap();
        assert!(!raw.contains("sk-openai-123456789"));

        let loaded = load_settings(&path).unwrap();
        assert_eq!(loaded.openai_key, "sk-openai-123456789");
        assert_eq!(loaded.anthropic_key, "sk-ant-987654321");
        assert_eq!(loaded.default_llm, "anthropic");
    }

    #[test]
    fn legacy_plaintext_keys_pass_through() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(
            &path,
            r#"{"openai_key": "sk-legacy-plaintext-key", "default_llm": "openai"}"#,
        )
        .unwrap();

        let loaded = load_settings(&path).unwrap();
        assert_eq!(loaded.openai_key, "sk-legacy-plaintext-key");
    }

    #[test]
    fn missing_file_returns_none() {
        let dir = tempfile::tempdir().unwrap();
        assert!(load_settings(&dir.path().join("nope.json")).is_none());
    }

    #[test]
    fn mask_key_shapes() {
        assert_eq!(mask_key(""), "");
        assert_eq!(mask_key("short"), "****");
        assert_eq!(mask_key("sk-abcdefgh-wxyz"), "sk-a...wxyz");
    }
}
