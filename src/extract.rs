//! File-to-pages text extraction.
//!
//! Turns an uploaded file into an ordered list of [`PageRecord`]s:
//!
//! - **PDF**: per-page extraction via `lopdf`, run on a blocking thread.
//!   A page whose trimmed text is 20 characters or shorter counts as empty
//!   and becomes an OCR candidate. If every page is empty the whole file is
//!   OCR'd; if only some are, the file is OCR'd once and the missing pages
//!   merged in. A page never appears from both sources; text extraction
//!   wins.
//! - **DOCX**: the format has no physical pages; paragraphs from
//!   `word/document.xml` are grouped into synthetic pages of roughly
//!   [`DOCX_PAGE_CHARS`] characters, breaking between paragraphs, numbered
//!   from 1.

use std::io::Read;
use std::path::{Path, PathBuf};

use quick_xml::events::Event;
use quick_xml::Reader;
use tracing::{info, warn};

use crate::error::{EngineError, Result};
use crate::models::PageRecord;
use crate::ocr::{self, OcrConfig};

/// Pages with at most this much trimmed text are treated as empty
/// (likely scanned).
const MIN_PAGE_TEXT: usize = 20;

/// Target size of a synthetic DOCX page.
const DOCX_PAGE_CHARS: usize = 3000;

/// Extract a file by extension. Only `.pdf` and `.docx` are supported.
pub async fn extract_file(path: &Path, ocr_config: &OcrConfig) -> Result<Vec<PageRecord>> {
    let extension = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_lowercase())
        .unwrap_or_default();

    match extension.as_str() {
        "pdf" => extract_pdf(path, ocr_config).await,
        "docx" => extract_docx(path).await,
        other => Err(EngineError::InvalidInput(format!(
            "unsupported file extension: .{other}"
        ))),
    }
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

// ============ PDF ============

/// Per-page text extraction with OCR fallback for scanned pages.
pub async fn extract_pdf(path: &Path, ocr_config: &OcrConfig) -> Result<Vec<PageRecord>> {
    let name = file_name(path);
    let parse_path = PathBuf::from(path);
    let parse_name = name.clone();

    let parsed = tokio::task::spawn_blocking(move || parse_pdf_pages(&parse_path, &parse_name))
        .await
        .map_err(|e| EngineError::Extract(format!("pdf task failed: {e}")))?;

    let (mut pages, empty_pages, total_pages) = match parsed {
        Ok(result) => result,
        Err(e) => {
            // The parser could not open the file at all; scanned-image PDFs
            // sometimes trip it, so OCR gets a chance before giving up.
            if ocr::can_run_ocr(ocr_config) {
                warn!(file = %name, error = %e, "pdf parse failed, attempting OCR fallback");
                return ocr::run_ocr(ocr_config, path).await;
            }
            return Err(e);
        }
    };

    if pages.is_empty() && total_pages > 0 {
        // Fully scanned: no text anywhere.
        if ocr::can_run_ocr(ocr_config) {
            info!(file = %name, pages = total_pages, "no text extracted, running full OCR");
            return ocr::run_ocr(ocr_config, path).await;
        }
        return Err(EngineError::Extract(format!(
            "no text extracted from {name} (scanned PDF? configure an OCR provider)"
        )));
    }

    if !empty_pages.is_empty() && ocr::can_run_ocr(ocr_config) {
        // Partially scanned: OCR the whole file once and keep only the pages
        // text extraction missed.
        info!(
            file = %name,
            text_pages = pages.len(),
            empty_pages = empty_pages.len(),
            "running OCR for missing pages"
        );
        match ocr::run_ocr(ocr_config, path).await {
            Ok(ocr_pages) => {
                let merged = merge_ocr_pages(&mut pages, ocr_pages);
                if merged > 0 {
                    info!(file = %name, merged, "merged OCR pages");
                }
            }
            Err(e) => {
                warn!(file = %name, error = %e, "OCR fallback failed, keeping text pages");
            }
        }
    } else if !empty_pages.is_empty() {
        warn!(
            file = %name,
            empty_pages = empty_pages.len(),
            "pages with no extractable text skipped (no OCR configured)"
        );
    }

    pages.sort_by_key(|p| p.page_number);
    Ok(pages)
}

/// Merge OCR output into text-extracted pages: a page the OCR returns is
/// included only if text extraction did not already cover it, so a page
/// never appears from both sources and text extraction wins. Returns the
/// number of pages merged in.
fn merge_ocr_pages(pages: &mut Vec<PageRecord>, ocr_pages: Vec<PageRecord>) -> usize {
    let have: std::collections::HashSet<usize> = pages.iter().map(|p| p.page_number).collect();
    let mut merged = 0usize;
    for page in ocr_pages {
        if !have.contains(&page.page_number) {
            pages.push(page);
            merged += 1;
        }
    }
    merged
}

/// Parse all pages of a PDF. Returns `(non-empty pages, empty page numbers,
/// total page count)`.
fn parse_pdf_pages(
    path: &Path,
    name: &str,
) -> Result<(Vec<PageRecord>, Vec<usize>, usize)> {
    let document = lopdf::Document::load(path)
        .map_err(|e| EngineError::Extract(format!("failed to open pdf {name}: {e}")))?;

    let page_numbers: Vec<u32> = document.get_pages().keys().copied().collect();
    let total = page_numbers.len();

    let mut pages = Vec::new();
    let mut empty = Vec::new();
    for page_no in page_numbers {
        let text = document.extract_text(&[page_no]).unwrap_or_default();
        let text = text.trim().to_string();
        if text.len() > MIN_PAGE_TEXT {
            pages.push(PageRecord {
                document: name.to_string(),
                page_number: page_no as usize,
                text,
            });
        } else {
            empty.push(page_no as usize);
        }
    }

    Ok((pages, empty, total))
}

// ============ DOCX ============

/// Extract a DOCX into synthetic ~3,000-character pages.
pub async fn extract_docx(path: &Path) -> Result<Vec<PageRecord>> {
    let name = file_name(path);
    let parse_path = PathBuf::from(path);

    let paragraphs = tokio::task::spawn_blocking(move || read_docx_paragraphs(&parse_path))
        .await
        .map_err(|e| EngineError::Extract(format!("docx task failed: {e}")))??;

    let pages = paginate_paragraphs(&paragraphs, &name);
    if pages.is_empty() {
        return Err(EngineError::Extract(format!(
            "no text extracted from {name}"
        )));
    }
    Ok(pages)
}

/// Pull paragraph texts out of `word/document.xml`.
fn read_docx_paragraphs(path: &Path) -> Result<Vec<String>> {
    let file = std::fs::File::open(path)?;
    let mut archive = zip::ZipArchive::new(file)
        .map_err(|e| EngineError::Extract(format!("failed to read docx: {e}")))?;

    let mut xml = String::new();
    archive
        .by_name("word/document.xml")
        .map_err(|e| EngineError::Extract(format!("docx has no document.xml: {e}")))?
        .read_to_string(&mut xml)?;

    let mut reader = Reader::from_str(&xml);
    let mut buf = Vec::new();
    let mut paragraphs = Vec::new();
    let mut current = String::new();
    let mut in_paragraph = false;

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) => match local_name(e.name().as_ref()) {
                b"p" => {
                    in_paragraph = true;
                    current.clear();
                }
                b"tab" if in_paragraph => current.push(' '),
                b"br" if in_paragraph => current.push('\n'),
                _ => {}
            },
            Ok(Event::Empty(e)) => match local_name(e.name().as_ref()) {
                b"tab" if in_paragraph => current.push(' '),
                b"br" if in_paragraph => current.push('\n'),
                _ => {}
            },
            Ok(Event::Text(e)) if in_paragraph => {
                if let Ok(text) = e.unescape() {
                    current.push_str(&text);
                }
            }
            Ok(Event::End(e)) => {
                if local_name(e.name().as_ref()) == b"p" {
                    in_paragraph = false;
                    let trimmed = current.trim();
                    if !trimmed.is_empty() {
                        paragraphs.push(trimmed.to_string());
                    }
                }
            }
            Ok(Event::Eof) => break,
            Err(e) => {
                return Err(EngineError::Extract(format!("docx xml parse error: {e}")));
            }
            _ => {}
        }
        buf.clear();
    }

    Ok(paragraphs)
}

/// Strip an optional namespace prefix from a qualified XML name.
fn local_name(qname: &[u8]) -> &[u8] {
    match qname.iter().position(|&b| b == b':') {
        Some(i) => &qname[i + 1..],
        None => qname,
    }
}

/// Group paragraphs into synthetic pages of ~[`DOCX_PAGE_CHARS`] characters,
/// always breaking between paragraphs.
fn paginate_paragraphs(paragraphs: &[String], document: &str) -> Vec<PageRecord> {
    let mut pages = Vec::new();
    let mut buffer = String::new();

    let mut flush = |buffer: &mut String, pages: &mut Vec<PageRecord>| {
        if !buffer.trim().is_empty() {
            pages.push(PageRecord {
                document: document.to_string(),
                page_number: pages.len() + 1,
                text: std::mem::take(buffer).trim().to_string(),
            });
        } else {
            buffer.clear();
        }
    };

    for paragraph in paragraphs {
        if !buffer.is_empty() && buffer.len() + 1 + paragraph.len() > DOCX_PAGE_CHARS {
            flush(&mut buffer, &mut pages);
        }
        if !buffer.is_empty() {
            buffer.push('\n');
        }
        buffer.push_str(paragraph);
    }
    flush(&mut buffer, &mut pages);

    pages
}
