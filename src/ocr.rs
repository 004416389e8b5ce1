//! OCR fallback for scanned PDFs.
//!
//! Two providers, with cross-fallback when the preferred one fails:
//!
//! - **Tesseract**, local: `pdftoppm` (Poppler) or ImageMagick renders each
//!   page to PNG in a temp directory, then one `tesseract` subprocess per
//!   page reads it. Subprocesses across *all* concurrent extractions share a
//!   process-wide semaphore sized to the CPU count, and Tesseract's internal
//!   threading is disabled (`OMP_THREAD_LIMIT=1`).
//! - **Sarvam Document Intelligence**, hosted. Job-based flow: create job →
//!   presigned upload → start → poll → download a ZIP of markdown. All
//!   Sarvam requests in the process are serialized through one mutex, and
//!   circuit-breaker failures are retried twice with 60s/120s waits.

use std::io::{Cursor, Read};
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use std::time::Duration;

use regex::Regex;
use serde_json::json;
use tokio::process::Command;
use tokio::sync::{Mutex, Semaphore};
use tracing::{info, warn};

use crate::error::{EngineError, Result};
use crate::models::PageRecord;

const SARVAM_BASE_URL: &str = "https://api.sarvam.ai/doc-digitization/job/v1";
const SARVAM_POLL_TIMEOUT: Duration = Duration::from_secs(600);
const SARVAM_MAX_RETRIES: u32 = 2;

/// Text shorter than this after OCR counts as an empty page.
const MIN_PAGE_TEXT: usize = 20;

/// Which OCR backend to use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OcrProvider {
    Tesseract,
    Sarvam,
    /// Pick whichever backend is available.
    #[default]
    Auto,
    None,
}

impl OcrProvider {
    pub fn parse(name: &str) -> Self {
        match name.to_lowercase().as_str() {
            "tesseract" => Self::Tesseract,
            "sarvam" => Self::Sarvam,
            "none" => Self::None,
            _ => Self::Auto,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Tesseract => "tesseract",
            Self::Sarvam => "sarvam",
            Self::Auto => "auto",
            Self::None => "none",
        }
    }
}

/// OCR capability snapshot handed to the extractor.
#[derive(Debug, Clone, Default)]
pub struct OcrConfig {
    pub provider: OcrProvider,
    pub sarvam_key: String,
    /// Cached result of [`detect_tesseract`] at startup.
    pub tesseract_available: bool,
}

impl OcrConfig {
    pub fn disabled() -> Self {
        Self {
            provider: OcrProvider::None,
            sarvam_key: String::new(),
            tesseract_available: false,
        }
    }
}

/// Whether an OCR attempt can be made at all under this config.
pub fn can_run_ocr(config: &OcrConfig) -> bool {
    match config.provider {
        OcrProvider::Tesseract | OcrProvider::Sarvam => true,
        OcrProvider::Auto => config.tesseract_available || !config.sarvam_key.is_empty(),
        OcrProvider::None => false,
    }
}

/// Process-wide limit on concurrent tesseract subprocesses.
fn tesseract_slots() -> &'static Semaphore {
    static SLOTS: OnceLock<Semaphore> = OnceLock::new();
    SLOTS.get_or_init(|| {
        let cpus = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(4);
        Semaphore::new(cpus)
    })
}

/// Sarvam's API trips a circuit breaker under parallel load; serialize.
fn sarvam_lock() -> &'static Mutex<()> {
    static LOCK: OnceLock<Mutex<()>> = OnceLock::new();
    LOCK.get_or_init(|| Mutex::new(()))
}

/// Probe for a working `tesseract` binary on PATH.
pub fn detect_tesseract() -> bool {
    let found = std::process::Command::new("tesseract")
        .arg("--version")
        .output()
        .map(|o| o.status.success())
        .unwrap_or(false);
    if found {
        info!("tesseract found on PATH");
    } else {
        info!("tesseract not found (scanned PDFs need an OCR provider)");
    }
    found
}

/// Probe for a PDF-to-image converter (Poppler's pdftoppm, or ImageMagick).
pub fn detect_pdftoppm() -> bool {
    let probe = |cmd: &str, arg: &str| {
        std::process::Command::new(cmd)
            .arg(arg)
            .output()
            .map(|o| o.status.success())
            .unwrap_or(false)
    };
    probe("pdftoppm", "-v") || probe("magick", "-version")
}

/// OCR a PDF with the configured provider, falling back to the other when
/// the first fails and the other is available.
pub async fn run_ocr(config: &OcrConfig, pdf_path: &Path) -> Result<Vec<PageRecord>> {
    let name = pdf_path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();

    match config.provider {
        OcrProvider::Tesseract => match tesseract_ocr(pdf_path, &name).await {
            Err(e) if !config.sarvam_key.is_empty() => {
                warn!(file = %name, error = %e, "tesseract OCR failed, falling back to Sarvam");
                sarvam_ocr(pdf_path, &name, &config.sarvam_key).await
            }
            other => other,
        },
        OcrProvider::Sarvam => match sarvam_ocr(pdf_path, &name, &config.sarvam_key).await {
            Err(e) if config.tesseract_available => {
                warn!(file = %name, error = %e, "Sarvam OCR failed, falling back to tesseract");
                tesseract_ocr(pdf_path, &name).await
            }
            other => other,
        },
        OcrProvider::Auto => {
            if config.tesseract_available {
                tesseract_ocr(pdf_path, &name).await
            } else if !config.sarvam_key.is_empty() {
                sarvam_ocr(pdf_path, &name, &config.sarvam_key).await
            } else {
                Err(EngineError::Ocr(
                    "no OCR provider available (install tesseract or configure a Sarvam key)"
                        .to_string(),
                ))
            }
        }
        OcrProvider::None => Err(EngineError::Ocr("OCR is disabled".to_string())),
    }
}

// ============ Tesseract ============

async fn tesseract_ocr(pdf_path: &Path, file_name: &str) -> Result<Vec<PageRecord>> {
    let tmp = tempfile::tempdir()?;
    let prefix = tmp.path().join("page");

    render_pdf_to_images(pdf_path, &prefix, file_name).await?;
    let images = collect_page_images(tmp.path())?;
    if images.is_empty() {
        return Err(EngineError::Ocr(format!(
            "no page images generated from {file_name}"
        )));
    }

    let mut tasks = tokio::task::JoinSet::new();
    for (i, image) in images.into_iter().enumerate() {
        let page_number = i + 1;
        let document = file_name.to_string();
        tasks.spawn(async move {
            let _slot = tesseract_slots().acquire().await.expect("semaphore open");

            let output = Command::new("tesseract")
                .arg(&image)
                .arg("stdout")
                .args(["-l", "eng", "--psm", "6"])
                .env("OMP_THREAD_LIMIT", "1")
                .output()
                .await;

            match output {
                Ok(out) if out.status.success() => {
                    let text = String::from_utf8_lossy(&out.stdout).trim().to_string();
                    (text.len() > MIN_PAGE_TEXT).then_some(PageRecord {
                        document,
                        page_number,
                        text,
                    })
                }
                Ok(out) => {
                    warn!(
                        page = page_number,
                        stderr = %String::from_utf8_lossy(&out.stderr).trim(),
                        "tesseract failed on page"
                    );
                    None
                }
                Err(e) => {
                    warn!(page = page_number, error = %e, "failed to spawn tesseract");
                    None
                }
            }
        });
    }

    let mut pages = Vec::new();
    while let Some(joined) = tasks.join_next().await {
        if let Ok(Some(page)) = joined {
            pages.push(page);
        }
    }
    pages.sort_by_key(|p| p.page_number);

    if pages.is_empty() {
        return Err(EngineError::Ocr(format!(
            "tesseract extracted no text from {file_name}"
        )));
    }
    info!(file = %file_name, pages = pages.len(), "tesseract OCR complete");
    Ok(pages)
}

/// Render each PDF page to `<prefix>-N.png`, preferring pdftoppm.
async fn render_pdf_to_images(pdf_path: &Path, prefix: &Path, file_name: &str) -> Result<()> {
    let poppler = Command::new("pdftoppm")
        .args(["-png", "-r", "200"])
        .arg(pdf_path)
        .arg(prefix)
        .output()
        .await;
    match poppler {
        Ok(out) if out.status.success() => {
            info!(file = %file_name, "converted pdf to images with pdftoppm");
            return Ok(());
        }
        Ok(out) => warn!(
            file = %file_name,
            stderr = %String::from_utf8_lossy(&out.stderr).trim(),
            "pdftoppm failed, trying ImageMagick"
        ),
        Err(_) => {}
    }

    let magick = Command::new("magick")
        .args(["convert", "-density", "200"])
        .arg(pdf_path)
        .arg(format!("{}-%03d.png", prefix.display()))
        .output()
        .await;
    match magick {
        Ok(out) if out.status.success() => {
            info!(file = %file_name, "converted pdf to images with ImageMagick");
            Ok(())
        }
        _ => Err(EngineError::Ocr(
            "cannot convert PDF to images: install Poppler (pdftoppm) or ImageMagick".to_string(),
        )),
    }
}

/// List generated page images sorted by the page number in the filename.
fn collect_page_images(dir: &Path) -> Result<Vec<PathBuf>> {
    let number_re = Regex::new(r"(\d+)\.png$").expect("valid regex");
    let mut images: Vec<(usize, PathBuf)> = Vec::new();

    for entry in std::fs::read_dir(dir)? {
        let path = entry?.path();
        let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
            continue;
        };
        if let Some(captures) = number_re.captures(name) {
            let number = captures[1].parse::<usize>().unwrap_or(0);
            images.push((number, path));
        }
    }

    images.sort_by_key(|(number, _)| *number);
    Ok(images.into_iter().map(|(_, path)| path).collect())
}

// ============ Sarvam ============

enum SarvamError {
    /// Retriable: Sarvam's circuit breaker rejected the job.
    CircuitBreaker(String),
    Fatal(EngineError),
}

impl From<EngineError> for SarvamError {
    fn from(e: EngineError) -> Self {
        Self::Fatal(e)
    }
}

impl From<reqwest::Error> for SarvamError {
    fn from(e: reqwest::Error) -> Self {
        Self::Fatal(e.into())
    }
}

async fn sarvam_ocr(pdf_path: &Path, file_name: &str, api_key: &str) -> Result<Vec<PageRecord>> {
    if api_key.is_empty() {
        return Err(EngineError::Ocr("Sarvam API key not configured".to_string()));
    }

    let _serialized = sarvam_lock().lock().await;

    for attempt in 0..=SARVAM_MAX_RETRIES {
        if attempt > 0 {
            let wait = Duration::from_secs(60 * u64::from(attempt));
            warn!(
                file = %file_name,
                attempt,
                wait_secs = wait.as_secs(),
                "Sarvam circuit breaker hit, backing off"
            );
            tokio::time::sleep(wait).await;
        }

        match sarvam_ocr_once(pdf_path, file_name, api_key).await {
            Ok(pages) => return Ok(pages),
            Err(SarvamError::CircuitBreaker(msg)) if attempt < SARVAM_MAX_RETRIES => {
                warn!(file = %file_name, error = %msg, "Sarvam job rejected, will retry");
            }
            Err(SarvamError::CircuitBreaker(msg)) => {
                return Err(EngineError::Ocr(format!("sarvam circuit breaker: {msg}")));
            }
            Err(SarvamError::Fatal(e)) => return Err(e),
        }
    }
    unreachable!("retry loop returns on the final attempt");
}

async fn sarvam_ocr_once(
    pdf_path: &Path,
    file_name: &str,
    api_key: &str,
) -> std::result::Result<Vec<PageRecord>, SarvamError> {
    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(120))
        .build()
        .map_err(EngineError::from)?;

    info!(file = %file_name, "Sarvam OCR: creating job");
    let job_id = sarvam_create_job(&client, api_key).await?;

    let upload_url = sarvam_get_transfer_url(
        &client,
        api_key,
        &format!("{SARVAM_BASE_URL}/upload-files"),
        Some(json!({ "job_id": job_id, "files": [file_name] })),
        "upload_urls",
    )
    .await?;

    let bytes = std::fs::read(pdf_path).map_err(EngineError::from)?;
    let response = client
        .put(&upload_url)
        .header("x-ms-blob-type", "BlockBlob")
        .header("Content-Type", "application/pdf")
        .body(bytes)
        .send()
        .await?;
    if !response.status().is_success() {
        return Err(SarvamError::Fatal(EngineError::Ocr(format!(
            "sarvam upload failed ({})",
            response.status()
        ))));
    }

    let start = client
        .post(format!("{SARVAM_BASE_URL}/{job_id}/start"))
        .header("api-subscription-key", api_key)
        .send()
        .await?;
    if !start.status().is_success() {
        return Err(SarvamError::Fatal(EngineError::Ocr(format!(
            "sarvam start failed ({})",
            start.status()
        ))));
    }

    sarvam_poll_until_done(&client, api_key, &job_id).await?;

    let download_url = sarvam_get_transfer_url(
        &client,
        api_key,
        &format!("{SARVAM_BASE_URL}/{job_id}/download-files"),
        None,
        "download_urls",
    )
    .await?;

    let archive = client.get(&download_url).send().await?;
    if !archive.status().is_success() {
        return Err(SarvamError::Fatal(EngineError::Ocr(format!(
            "sarvam download failed ({})",
            archive.status()
        ))));
    }
    let archive_bytes = archive.bytes().await?;

    let pages = parse_sarvam_zip(&archive_bytes, file_name)?;
    info!(file = %file_name, pages = pages.len(), "Sarvam OCR complete");
    Ok(pages)
}

async fn sarvam_create_job(
    client: &reqwest::Client,
    api_key: &str,
) -> std::result::Result<String, SarvamError> {
    let response = client
        .post(SARVAM_BASE_URL)
        .header("api-subscription-key", api_key)
        .json(&json!({
            "job_parameters": { "language": "en-IN", "output_format": "md" }
        }))
        .send()
        .await?;

    if !response.status().is_success() {
        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        return Err(SarvamError::Fatal(EngineError::Ocr(format!(
            "sarvam create job failed ({status}): {body}"
        ))));
    }

    let payload: serde_json::Value = response.json().await?;
    payload
        .get("job_id")
        .and_then(|v| v.as_str())
        .map(String::from)
        .ok_or_else(|| {
            SarvamError::Fatal(EngineError::Ocr("sarvam response missing job_id".to_string()))
        })
}

/// Fetch a presigned transfer URL. The URL map may be flat
/// (`{"f.pdf": "https://…"}`) or nested (`{"f.pdf": {"url": "…"}}`).
async fn sarvam_get_transfer_url(
    client: &reqwest::Client,
    api_key: &str,
    endpoint: &str,
    body: Option<serde_json::Value>,
    url_field: &str,
) -> std::result::Result<String, SarvamError> {
    let mut request = client.post(endpoint).header("api-subscription-key", api_key);
    if let Some(body) = body {
        request = request.json(&body);
    }
    let response = request.send().await?;

    if !response.status().is_success() {
        let status = response.status();
        let text = response.text().await.unwrap_or_default();
        return Err(SarvamError::Fatal(EngineError::Ocr(format!(
            "sarvam {url_field} request failed ({status}): {text}"
        ))));
    }

    let payload: serde_json::Value = response.json().await?;
    let urls = payload.get(url_field).ok_or_else(|| {
        SarvamError::Fatal(EngineError::Ocr(format!(
            "sarvam response missing {url_field}"
        )))
    })?;

    if let Some(map) = urls.as_object() {
        for value in map.values() {
            match value {
                serde_json::Value::String(url) => return Ok(url.clone()),
                serde_json::Value::Object(inner) => {
                    if let Some(url) = inner.get("url").and_then(|v| v.as_str()) {
                        return Ok(url.to_string());
                    }
                    for candidate in inner.values() {
                        if let Some(s) = candidate.as_str() {
                            if s.starts_with("http") {
                                return Ok(s.to_string());
                            }
                        }
                    }
                }
                _ => {}
            }
        }
    }

    Err(SarvamError::Fatal(EngineError::Ocr(format!(
        "could not extract a URL from sarvam {url_field}"
    ))))
}

async fn sarvam_poll_until_done(
    client: &reqwest::Client,
    api_key: &str,
    job_id: &str,
) -> std::result::Result<(), SarvamError> {
    let url = format!("{SARVAM_BASE_URL}/{job_id}/status");
    let deadline = tokio::time::Instant::now() + SARVAM_POLL_TIMEOUT;
    let mut interval = Duration::from_secs(3);

    while tokio::time::Instant::now() < deadline {
        let response = client
            .get(&url)
            .header("api-subscription-key", api_key)
            .send()
            .await?;
        let payload: serde_json::Value = response.json().await?;

        let state = payload
            .get("job_state")
            .and_then(|v| v.as_str())
            .unwrap_or_default();
        match state {
            "Completed" | "PartiallyCompleted" => return Ok(()),
            "Failed" => {
                let mut message = payload
                    .get("error_message")
                    .and_then(|v| v.as_str())
                    .unwrap_or_default()
                    .to_string();
                let mut circuit_breaker = false;
                if let Some(details) = payload.get("job_details").and_then(|v| v.as_array()) {
                    for detail in details {
                        let detail_msg = detail
                            .get("error_message")
                            .and_then(|v| v.as_str())
                            .unwrap_or_default();
                        let detail_code = detail
                            .get("error_code")
                            .and_then(|v| v.as_str())
                            .unwrap_or_default();
                        if !detail_msg.is_empty() {
                            message = detail_msg.to_string();
                        }
                        if detail_msg.contains("CIRCUIT_BREAKER")
                            || detail_code.contains("CIRCUIT_BREAKER")
                        {
                            circuit_breaker = true;
                        }
                    }
                }
                if message.is_empty() {
                    message = "unknown error".to_string();
                }
                return Err(if circuit_breaker {
                    SarvamError::CircuitBreaker(message)
                } else {
                    SarvamError::Fatal(EngineError::Ocr(format!("sarvam job failed: {message}")))
                });
            }
            _ => {}
        }

        tokio::time::sleep(interval).await;
        if interval < Duration::from_secs(10) {
            interval += Duration::from_secs(1);
        }
    }

    Err(SarvamError::Fatal(EngineError::Ocr(
        "timeout waiting for sarvam job completion".to_string(),
    )))
}

/// Extract pages from Sarvam's output ZIP of markdown/text files.
fn parse_sarvam_zip(
    bytes: &[u8],
    file_name: &str,
) -> std::result::Result<Vec<PageRecord>, SarvamError> {
    let mut archive = zip::ZipArchive::new(Cursor::new(bytes))
        .map_err(|e| SarvamError::Fatal(EngineError::Ocr(format!("open sarvam zip: {e}"))))?;

    let mut texts: Vec<(String, String)> = Vec::new();
    for i in 0..archive.len() {
        let mut entry = archive
            .by_index(i)
            .map_err(|e| SarvamError::Fatal(EngineError::Ocr(format!("read sarvam zip: {e}"))))?;
        if entry.is_dir() {
            continue;
        }
        let entry_name = entry.name().to_string();
        let lower = entry_name.to_lowercase();
        if !(lower.ends_with(".md") || lower.ends_with(".txt") || lower.ends_with(".html")) {
            continue;
        }
        let mut content = String::new();
        if entry.read_to_string(&mut content).is_err() {
            continue;
        }
        let trimmed = content.trim().to_string();
        if trimmed.len() > MIN_PAGE_TEXT {
            texts.push((entry_name, trimmed));
        }
    }

    if texts.is_empty() {
        return Err(SarvamError::Fatal(EngineError::Ocr(
            "sarvam output contained no extractable text".to_string(),
        )));
    }

    let pages = if texts.len() > 1 {
        // One output file per page.
        texts
            .into_iter()
            .enumerate()
            .map(|(i, (name, text))| PageRecord {
                document: file_name.to_string(),
                page_number: page_number_from_name(&name).unwrap_or(i + 1),
                text: strip_markdown(&text),
            })
            .collect()
    } else {
        split_merged_markdown(&texts[0].1, file_name)
    };

    if pages.is_empty() {
        return Err(SarvamError::Fatal(EngineError::Ocr(
            "sarvam output contained no extractable text after splitting".to_string(),
        )));
    }
    Ok(pages)
}

/// Split one merged markdown document into pages, trying horizontal rules,
/// form feeds, and `# Page N` headers before falling back to 500-word
/// synthetic pages.
fn split_merged_markdown(text: &str, file_name: &str) -> Vec<PageRecord> {
    let text = strip_markdown(text);

    let hr = Regex::new(r"\n-{3,}\n").expect("valid regex");
    let mut sections: Vec<String> = hr.split(&text).map(str::to_string).collect();

    if sections.len() <= 1 {
        let by_form_feed: Vec<String> = text.split('\u{c}').map(str::to_string).collect();
        if by_form_feed.len() > 1 {
            sections = by_form_feed;
        }
    }

    if sections.len() <= 1 {
        let header = Regex::new(r"(?m)^#{1,2}\s+[Pp]age\s+\d+").expect("valid regex");
        let starts: Vec<usize> = header.find_iter(&text).map(|m| m.start()).collect();
        if starts.len() > 1 {
            sections = starts
                .iter()
                .enumerate()
                .map(|(i, &start)| {
                    let end = starts.get(i + 1).copied().unwrap_or(text.len());
                    text[start..end].to_string()
                })
                .collect();
        }
    }

    if sections.len() <= 1 {
        let words: Vec<&str> = text.split_whitespace().collect();
        sections = words
            .chunks(500)
            .map(|chunk| chunk.join(" "))
            .collect();
    }

    sections
        .into_iter()
        .filter_map(|section| {
            let trimmed = section.trim().to_string();
            (trimmed.len() > MIN_PAGE_TEXT).then_some(trimmed)
        })
        .enumerate()
        .map(|(i, text)| PageRecord {
            document: file_name.to_string(),
            page_number: i + 1,
            text,
        })
        .collect()
}

/// Page number embedded in an output filename like `page_003.md`.
fn page_number_from_name(name: &str) -> Option<usize> {
    let stem = Path::new(name).file_stem()?.to_str()?;
    let digits = Regex::new(r"\d+").expect("valid regex");
    digits.find(stem)?.as_str().parse().ok()
}

/// Remove headers, emphasis markers, and links, keeping the plain text.
fn strip_markdown(text: &str) -> String {
    let headers = Regex::new(r"(?m)^#{1,6}\s+").expect("valid regex");
    let mut out = headers.replace_all(text, "").into_owned();

    out = out.replace("**", "").replace("__", "");
    out = out.replace('*', "").replace('_', " ");

    let links = Regex::new(r"\[([^\]]+)\]\([^)]+\)").expect("valid regex");
    out = links.replace_all(&out, "$1").into_owned();

    let blank_runs = Regex::new(r"\n{3,}").expect("valid regex");
    out = blank_runs.replace_all(&out, "\n\n").into_owned();

    out.trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn can_run_ocr_matrix() {
        let mut config = OcrConfig::disabled();
        assert!(!can_run_ocr(&config));

        config.provider = OcrProvider::Tesseract;
        assert!(can_run_ocr(&config));

        config.provider = OcrProvider::Auto;
        assert!(!can_run_ocr(&config));
        config.tesseract_available = true;
        assert!(can_run_ocr(&config));

        config.tesseract_available = false;
        config.sarvam_key = "key".to_string();
        assert!(can_run_ocr(&config));
    }

    #[test]
    fn provider_parsing() {
        assert_eq!(OcrProvider::parse("tesseract"), OcrProvider::Tesseract);
        assert_eq!(OcrProvider::parse("SARVAM"), OcrProvider::Sarvam);
        assert_eq!(OcrProvider::parse("none"), OcrProvider::None);
        assert_eq!(OcrProvider::parse(""), OcrProvider::Auto);
    }

    #[test]
    fn strip_markdown_removes_formatting() {
        let input = "# Title\n\nSome **bold** and [a link](https://example.com) here.";
        let out = strip_markdown(input);
        assert!(!out.contains('#'));
        assert!(!out.contains("**"));
        assert!(out.contains("a link"));
        assert!(!out.contains("example.com"));
    }

    #[test]
    fn merged_markdown_splits_on_horizontal_rules() {
        let text = format!(
            "{}\n----\n{}\n----\n{}",
            "first page content with enough text",
            "second page content with enough text",
            "third page content with enough text"
        );
        let pages = split_merged_markdown(&text, "scan.pdf");
        assert_eq!(pages.len(), 3);
        assert_eq!(pages[0].page_number, 1);
        assert_eq!(pages[2].page_number, 3);
    }

    #[test]
    fn merged_markdown_falls_back_to_word_chunks() {
        let words = (0..1200).map(|i| format!("w{i}")).collect::<Vec<_>>().join(" ");
        let pages = split_merged_markdown(&words, "scan.pdf");
        assert_eq!(pages.len(), 3, "1200 words → three 500-word pages");
    }

    #[test]
    fn page_number_from_output_names() {
        assert_eq!(page_number_from_name("page_003.md"), Some(3));
        assert_eq!(page_number_from_name("7.md"), Some(7));
        assert_eq!(page_number_from_name("output.md"), None);
    }
}
