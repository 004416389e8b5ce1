//! At-rest obfuscation for API keys in `settings.json`.
//!
//! Keys are AES-256-GCM encrypted with a key derived deterministically from
//! the machine hostname and working directory via SHA-256. This is
//! **obfuscation, not secrecy**: anyone who can run code on the same machine
//! in the same directory can derive the key. It only prevents casual reading
//! of API keys out of the settings file, without asking the user for a
//! passphrase. The read path tolerates legacy plaintext values (see
//! `settings::decrypt_or_passthrough`).

use aes_gcm::aead::{Aead, AeadCore, KeyInit, OsRng};
use aes_gcm::{Aes256Gcm, Key, Nonce};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use sha2::{Digest, Sha256};

use crate::error::{EngineError, Result};

/// Deterministic 32-byte key from hostname + working directory.
fn derive_key() -> [u8; 32] {
    let hostname = gethostname::gethostname().to_string_lossy().into_owned();
    let cwd = std::env::current_dir()
        .map(|p| p.display().to_string())
        .unwrap_or_default();
    // The "docpilot" prefix is part of the key: changing it (e.g. on a
    // package rename) makes every previously-saved settings.json key
    // undecryptable, falling back to the plaintext passthrough path.
    let seed = format!("docpilot:{hostname}:{cwd}");
    Sha256::digest(seed.as_bytes()).into()
}

/// Encrypt to `base64(nonce || ciphertext)`. Empty input stays empty.
pub fn encrypt(plaintext: &str) -> Result<String> {
    if plaintext.is_empty() {
        return Ok(String::new());
    }

    let key_bytes = derive_key();
    let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(&key_bytes));
    let nonce = Aes256Gcm::generate_nonce(&mut OsRng);

    let ciphertext = cipher
        .encrypt(&nonce, plaintext.as_bytes())
        .map_err(|e| EngineError::Store(format!("encrypt: {e}")))?;

    let mut combined = nonce.to_vec();
    combined.extend_from_slice(&ciphertext);
    Ok(BASE64.encode(combined))
}

/// Decrypt a `base64(nonce || ciphertext)` string. Empty input stays empty.
pub fn decrypt(encoded: &str) -> Result<String> {
    if encoded.is_empty() {
        return Ok(String::new());
    }

    let combined = BASE64
        .decode(encoded)
        .map_err(|e| EngineError::Store(format!("base64 decode: {e}")))?;
    if combined.len() < 12 {
        return Err(EngineError::Store("ciphertext too short".to_string()));
    }

    let key_bytes = derive_key();
    let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(&key_bytes));
    let (nonce, ciphertext) = combined.split_at(12);

    let plaintext = cipher
        .decrypt(Nonce::from_slice(nonce), ciphertext)
        .map_err(|e| EngineError::Store(format!("decrypt: {e}")))?;

    String::from_utf8(plaintext).map_err(|e| EngineError::Store(format!("decrypt utf8: {e}")))
}
