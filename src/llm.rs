//! LLM providers: question answering over retrieved context, and the
//! per-document summarizer used at ingest time.
//!
//! Providers are a tagged enum selected by name (`openai`, `anthropic`, or
//! `huggingface`), each with a sensible default model. The answer contract
//! is lenient by design: models are asked for a strict JSON shape, fenced
//! JSON is tolerated, and a response that fails to parse degrades to a
//! plain-text answer instead of an error, so the user never sees an empty
//! reply because a model drifted off-format.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::warn;

use crate::error::{EngineError, Result};
use crate::models::{DocumentSummary, RetrievedChunk, Section};

const OPENAI_CHAT_URL: &str = "https://api.openai.com/v1/chat/completions";
const ANTHROPIC_MESSAGES_URL: &str = "https://api.anthropic.com/v1/messages";
const HF_CHAT_URL: &str = "https://router.huggingface.co/hf-inference/v1/chat/completions";

const DEFAULT_OPENAI_MODEL: &str = "gpt-4o";
const DEFAULT_ANTHROPIC_MODEL: &str = "claude-3-5-sonnet-20241022";
const DEFAULT_HF_MODEL: &str = "mistralai/Mistral-7B-Instruct-v0.3";
const SUMMARY_MODEL: &str = "gpt-4o-mini";

/// Whitespace-token budget for summarizer input.
const SUMMARY_MAX_TOKENS: usize = 4000;
/// Pages sampled per document for the summarizer.
const SUMMARY_SAMPLE_PAGES: usize = 5;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(120);

/// One inline citation in an answer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Footnote {
    pub id: i64,
    pub document: String,
    pub page: i64,
}

/// Structured answer returned to the caller and persisted as assistant
/// message metadata.
#[derive(Debug, Clone, Serialize)]
pub struct Answer {
    pub question: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub thinking: String,
    pub answer: String,
    pub documents: Vec<String>,
    pub pages: Vec<i64>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub footnotes: Vec<Footnote>,
    pub confidence: f64,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub confidence_reason: String,
}

/// An LLM backend, tagged by provider.
pub enum LlmProvider {
    OpenAi { api_key: String, model: String },
    Anthropic { api_key: String, model: String },
    HuggingFace { api_key: String, model: String },
}

impl LlmProvider {
    /// Select a provider by name; `""` defaults to OpenAI. `model` empty
    /// picks the provider default.
    pub fn new(name: &str, api_key: &str, model: &str) -> Result<Self> {
        let api_key = api_key.to_string();
        match name.to_lowercase().as_str() {
            "openai" | "" => Ok(Self::OpenAi {
                api_key,
                model: default_if_empty(model, DEFAULT_OPENAI_MODEL),
            }),
            "anthropic" => Ok(Self::Anthropic {
                api_key,
                model: default_if_empty(model, DEFAULT_ANTHROPIC_MODEL),
            }),
            "huggingface" => Ok(Self::HuggingFace {
                api_key,
                model: default_if_empty(model, DEFAULT_HF_MODEL),
            }),
            other => Err(EngineError::InvalidInput(format!(
                "unknown LLM provider: {other}"
            ))),
        }
    }

    pub fn model(&self) -> &str {
        match self {
            Self::OpenAi { model, .. }
            | Self::Anthropic { model, .. }
            | Self::HuggingFace { model, .. } => model,
        }
    }

    /// Answer a question from retrieved excerpts and document overviews.
    pub async fn answer_question(
        &self,
        question: &str,
        results: &[RetrievedChunk],
        summaries: &[DocumentSummary],
    ) -> Result<Answer> {
        let context = format_context(results, summaries);
        let user_prompt = format!("**Question:** {question}\n\n**Context:**\n\n{context}");

        let raw = match self {
            Self::OpenAi { api_key, model } => {
                openai_chat(api_key, model, SYSTEM_PROMPT, &user_prompt, true).await?
            }
            Self::Anthropic { api_key, model } => {
                anthropic_chat(api_key, model, SYSTEM_PROMPT, &user_prompt).await?
            }
            Self::HuggingFace { api_key, model } => {
                huggingface_chat(api_key, model, SYSTEM_PROMPT, &user_prompt).await?
            }
        };

        Ok(parse_answer(&raw, question))
    }
}

fn default_if_empty(value: &str, default: &str) -> String {
    if value.is_empty() {
        default.to_string()
    } else {
        value.to_string()
    }
}

/// Build the prompt context: every document overview first (so enumeration
/// questions see the whole corpus), then the retrieved excerpts with their
/// parent-page text.
pub fn format_context(results: &[RetrievedChunk], summaries: &[DocumentSummary]) -> String {
    let mut parts: Vec<String> = Vec::new();

    if !summaries.is_empty() {
        let overviews: Vec<String> = summaries
            .iter()
            .map(|s| {
                let mut entry = format!(
                    "Document: {} ({})\nType: {}\nSummary: {}",
                    s.document, s.title, s.doc_type, s.summary
                );
                if !s.sections.is_empty() {
                    let names: Vec<String> = s
                        .sections
                        .iter()
                        .map(|sec| format!("{} (pp.{}-{})", sec.name, sec.page_start, sec.page_end))
                        .collect();
                    entry.push_str("\nSections: ");
                    entry.push_str(&names.join("; "));
                }
                if !s.key_entities.is_empty() {
                    entry.push_str("\nKey Entities: ");
                    entry.push_str(&s.key_entities.join(", "));
                }
                entry
            })
            .collect();
        parts.push(format!(
            "=== DOCUMENT OVERVIEWS ===\n\n{}",
            overviews.join("\n\n")
        ));
    }

    parts.push("\n=== RETRIEVED EXCERPTS ===".to_string());
    for (i, result) in results.iter().enumerate() {
        let text = if result.parent_text.is_empty() {
            &result.text
        } else {
            &result.parent_text
        };
        let mut header = format!(
            "[Source {}] Document: {} | Page: {}",
            i + 1,
            result.document,
            result.page_number
        );
        if !result.section.is_empty() {
            header.push_str(" | Section: ");
            header.push_str(&result.section);
        }
        parts.push(format!("{header}\n{text}"));
    }

    parts.join("\n\n---\n\n")
}

const SYSTEM_PROMPT: &str = r#"You are a precise document analysis assistant. You will be given a question and relevant excerpts from a corpus of legal, financial, and regulatory documents.

Your task:
1. THINK step-by-step through the question before answering
2. Answer the question accurately based ONLY on the provided context
3. Use inline footnote markers like [1], [2] in your answer to cite specific claims
4. Be precise: use exact figures, names, and quotes when possible

Respond in this exact JSON format:
{
  "thinking": "Let me analyze the question step by step...",
  "answer": "The revenue was $50B[1] with growth of 12%[2].",
  "footnotes": [
    {"id": 1, "document": "doc1.pdf", "page": 3},
    {"id": 2, "document": "doc2.pdf", "page": 12}
  ],
  "confidence": 0.95,
  "confidence_reason": "Exact figures found in two source documents"
}

Rules:
- Place [N] markers inline where a specific fact comes from that source
- Each footnote has an id matching the marker, a document name, and a page number
- confidence is 0.0 to 1.0 based on how well the context answers the question
- If the answer cannot be found in the context, set confidence = 0.0
- For questions asking to LIST, COUNT, or NAME items: exhaustively scan EVERY source excerpt provided before answering
- Use exact figures, labels, and terminology from the source documents
- Also include the legacy fields "documents" (array of cited document names) and "pages" (array of corresponding page numbers)"#;

// ============ Provider HTTP calls ============

async fn openai_chat(
    api_key: &str,
    model: &str,
    system: &str,
    user: &str,
    json_mode: bool,
) -> Result<String> {
    let client = reqwest::Client::builder().timeout(REQUEST_TIMEOUT).build()?;

    let mut messages = Vec::new();
    if !system.is_empty() {
        messages.push(json!({ "role": "system", "content": system }));
    }
    messages.push(json!({ "role": "user", "content": user }));

    let mut body = json!({
        "model": model,
        "messages": messages,
        "temperature": 0.1,
    });
    if json_mode {
        body["response_format"] = json!({ "type": "json_object" });
    }

    let response = client
        .post(OPENAI_CHAT_URL)
        .bearer_auth(api_key)
        .json(&body)
        .send()
        .await?;

    let status = response.status();
    if !status.is_success() {
        let text = response.text().await.unwrap_or_default();
        return Err(EngineError::Provider(format!(
            "openai error {status}: {text}"
        )));
    }

    let payload: serde_json::Value = response.json().await?;
    payload
        .pointer("/choices/0/message/content")
        .and_then(|v| v.as_str())
        .map(String::from)
        .ok_or_else(|| EngineError::Provider("openai empty response".to_string()))
}

async fn anthropic_chat(api_key: &str, model: &str, system: &str, user: &str) -> Result<String> {
    let client = reqwest::Client::builder().timeout(REQUEST_TIMEOUT).build()?;

    let response = client
        .post(ANTHROPIC_MESSAGES_URL)
        .header("x-api-key", api_key)
        .header("anthropic-version", "2023-06-01")
        .json(&json!({
            "model": model,
            "max_tokens": 2048,
            "temperature": 0.1,
            "system": system,
            "messages": [ { "role": "user", "content": user } ],
        }))
        .send()
        .await?;

    let status = response.status();
    if !status.is_success() {
        let text = response.text().await.unwrap_or_default();
        return Err(EngineError::Provider(format!(
            "anthropic error {status}: {text}"
        )));
    }

    let payload: serde_json::Value = response.json().await?;
    let blocks = payload
        .get("content")
        .and_then(|v| v.as_array())
        .ok_or_else(|| EngineError::Provider("anthropic empty response".to_string()))?;

    // Some models return several content blocks; concatenate the text ones.
    let mut full = String::new();
    for block in blocks {
        let block_type = block.get("type").and_then(|v| v.as_str()).unwrap_or("text");
        if block_type == "text" {
            if let Some(text) = block.get("text").and_then(|v| v.as_str()) {
                full.push_str(text);
            }
        }
    }
    if full.is_empty() {
        return Err(EngineError::Provider(
            "anthropic: no text content in response".to_string(),
        ));
    }
    Ok(full)
}

async fn huggingface_chat(api_key: &str, model: &str, system: &str, user: &str) -> Result<String> {
    let client = reqwest::Client::builder().timeout(REQUEST_TIMEOUT).build()?;

    let response = client
        .post(HF_CHAT_URL)
        .bearer_auth(api_key)
        .json(&json!({
            "model": model,
            "messages": [
                { "role": "system", "content": system },
                { "role": "user", "content": user },
            ],
            "max_tokens": 2048,
            "temperature": 0.1,
            "stream": false,
        }))
        .send()
        .await?;

    let status = response.status();
    if !status.is_success() {
        let text = response.text().await.unwrap_or_default();
        return Err(EngineError::Provider(format!(
            "huggingface error {status}: {text}"
        )));
    }

    let payload: serde_json::Value = response.json().await?;
    payload
        .pointer("/choices/0/message/content")
        .and_then(|v| v.as_str())
        .map(String::from)
        .ok_or_else(|| EngineError::Provider("huggingface empty response".to_string()))
}

// ============ Response parsing ============

/// Strip a leading/trailing markdown code fence if present.
fn strip_code_fence(raw: &str) -> &str {
    let mut text = raw.trim();
    if let Some(rest) = text.strip_prefix("```json") {
        text = rest;
    } else if let Some(rest) = text.strip_prefix("```") {
        text = rest;
    }
    if let Some(end) = text.find("```") {
        text = &text[..end];
    }
    text.trim()
}

/// Parse an LLM response into an [`Answer`].
///
/// A response that is not valid JSON becomes a plain-text answer with
/// confidence 0.5; valid JSON with an empty `answer` field falls back to the
/// raw text so the user never gets a blank reply.
pub fn parse_answer(raw: &str, question: &str) -> Answer {
    let text = strip_code_fence(raw);

    #[derive(Deserialize, Default)]
    struct Parsed {
        #[serde(default)]
        thinking: String,
        #[serde(default)]
        answer: String,
        #[serde(default)]
        documents: Vec<String>,
        #[serde(default)]
        pages: Vec<i64>,
        #[serde(default)]
        footnotes: Vec<Footnote>,
        #[serde(default)]
        confidence: f64,
        #[serde(default)]
        confidence_reason: String,
    }

    let Ok(parsed) = serde_json::from_str::<Parsed>(text) else {
        return Answer {
            question: question.to_string(),
            thinking: String::new(),
            answer: text.to_string(),
            documents: Vec::new(),
            pages: Vec::new(),
            footnotes: Vec::new(),
            confidence: 0.5,
            confidence_reason: String::new(),
        };
    };

    let answer = if parsed.answer.trim().is_empty() {
        text.to_string()
    } else {
        parsed.answer
    };

    Answer {
        question: question.to_string(),
        thinking: parsed.thinking,
        answer,
        documents: parsed.documents,
        pages: parsed.pages,
        footnotes: parsed.footnotes,
        confidence: parsed.confidence,
        confidence_reason: parsed.confidence_reason,
    }
}

// ============ Document summarizer ============

/// One cheap LLM call per ingested file producing title/type/sections/
/// entities. Failures are for the pipeline to log and ignore; they never
/// fail a run.
pub async fn summarize_document(
    api_key: &str,
    document_name: &str,
    pages: &[String],
    total_pages: usize,
) -> Result<DocumentSummary> {
    if api_key.is_empty() {
        return Err(EngineError::Provider(
            "OpenAI API key required for summary generation".to_string(),
        ));
    }

    let sampled = pages.len().min(SUMMARY_SAMPLE_PAGES);
    let mut sample_text = pages[..sampled].join("\n\n--- PAGE BREAK ---\n\n");

    let words: Vec<&str> = sample_text.split_whitespace().collect();
    if words.len() > SUMMARY_MAX_TOKENS {
        sample_text = words[..SUMMARY_MAX_TOKENS].join(" ");
    }

    let prompt = format!(
        r#"Analyze this document and produce a structured summary as JSON.

Document name: {document_name}
Total pages: {total_pages}

First {sampled} pages of text:
---
{sample_text}
---

Return ONLY valid JSON in this exact format:
{{
  "title": "Full document title or case name",
  "type": "legal_case|financial_report|regulatory_filing|contract|transcript|other",
  "summary": "2-3 sentence summary of the document's content and purpose",
  "sections": [
    {{"name": "Section Name", "page_start": 1, "page_end": 10}}
  ],
  "key_entities": ["entity1", "entity2"]
}}

For sections, estimate page ranges based on the content and total page count ({total_pages} pages).
If you cannot determine sections, return an empty array."#
    );

    let raw = openai_chat(api_key, SUMMARY_MODEL, "", &prompt, true).await?;
    parse_summary(&raw, document_name).map_err(|e| {
        warn!(document = document_name, error = %e, "failed to parse document summary");
        e
    })
}

fn parse_summary(raw: &str, document_name: &str) -> Result<DocumentSummary> {
    #[derive(Deserialize)]
    struct ParsedSection {
        name: String,
        #[serde(default)]
        page_start: usize,
        #[serde(default)]
        page_end: usize,
    }

    #[derive(Deserialize)]
    struct ParsedSummary {
        #[serde(default)]
        title: String,
        #[serde(default, rename = "type")]
        doc_type: String,
        #[serde(default)]
        summary: String,
        #[serde(default)]
        sections: Vec<ParsedSection>,
        #[serde(default)]
        key_entities: Vec<String>,
    }

    let text = strip_code_fence(raw);
    let parsed: ParsedSummary = serde_json::from_str(text)
        .map_err(|e| EngineError::Provider(format!("parse summary: {e}")))?;

    Ok(DocumentSummary {
        document: document_name.to_string(),
        title: parsed.title,
        doc_type: parsed.doc_type,
        summary: parsed.summary,
        sections: parsed
            .sections
            .into_iter()
            .map(|s| Section {
                name: s.name,
                page_start: s.page_start,
                page_end: s.page_end,
            })
            .collect(),
        key_entities: parsed.key_entities,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn result(document: &str, page: usize, parent: &str, section: &str) -> RetrievedChunk {
        RetrievedChunk {
            chunk_id: format!("{document}_p{page}_c0"),
            document: document.to_string(),
            page_number: page,
            text: "window".to_string(),
            parent_text: parent.to_string(),
            section: section.to_string(),
            score: 0.03,
        }
    }

    #[test]
    fn parse_answer_accepts_fenced_json() {
        let raw = "```json\n{\"answer\": \"42[1]\", \"confidence\": 0.9, \
                   \"footnotes\": [{\"id\": 1, \"document\": \"a.pdf\", \"page\": 3}]}\n```";
        let answer = parse_answer(raw, "what?");
        assert_eq!(answer.answer, "42[1]");
        assert_eq!(answer.confidence, 0.9);
        assert_eq!(answer.footnotes.len(), 1);
        assert_eq!(answer.footnotes[0].document, "a.pdf");
        assert_eq!(answer.question, "what?");
    }

    #[test]
    fn parse_answer_degrades_to_raw_text() {
        let answer = parse_answer("The answer is plainly 42.", "what?");
        assert_eq!(answer.answer, "The answer is plainly 42.");
        assert_eq!(answer.confidence, 0.5);
        assert!(answer.footnotes.is_empty());
    }

    #[test]
    fn parse_answer_empty_answer_falls_back_to_raw() {
        let raw = "{\"answer\": \"\", \"thinking\": \"hmm\", \"confidence\": 0.2}";
        let answer = parse_answer(raw, "q");
        assert!(answer.answer.contains("thinking"), "raw JSON shown instead of a blank bubble");
    }

    #[test]
    fn format_context_prefers_parent_text() {
        let results = vec![result("a.pdf", 3, "the full page text", "Findings")];
        let context = format_context(&results, &[]);
        assert!(context.contains("the full page text"));
        assert!(context.contains("[Source 1] Document: a.pdf | Page: 3 | Section: Findings"));
    }

    #[test]
    fn format_context_includes_all_overviews() {
        let summaries = vec![DocumentSummary {
            document: "a.pdf".to_string(),
            title: "Annual Report".to_string(),
            doc_type: "financial_report".to_string(),
            summary: "Numbers.".to_string(),
            sections: vec![Section {
                name: "Revenue".to_string(),
                page_start: 2,
                page_end: 5,
            }],
            key_entities: vec!["Acme Corp".to_string()],
        }];
        let context = format_context(&[], &summaries);
        assert!(context.contains("DOCUMENT OVERVIEWS"));
        assert!(context.contains("Annual Report"));
        assert!(context.contains("Revenue (pp.2-5)"));
        assert!(context.contains("Acme Corp"));
    }

    #[test]
    fn parse_summary_maps_sections() {
        let raw = r#"{"title": "Case X", "type": "legal_case", "summary": "A case.",
            "sections": [{"name": "Judgment", "page_start": 4, "page_end": 9}],
            "key_entities": ["X Ltd"]}"#;
        let summary = parse_summary(raw, "case.pdf").unwrap();
        assert_eq!(summary.document, "case.pdf");
        assert_eq!(summary.doc_type, "legal_case");
        assert_eq!(summary.sections.len(), 1);
        assert_eq!(summary.sections[0].page_start, 4);
    }

    #[test]
    fn parse_summary_rejects_non_json() {
        assert!(parse_summary("not json", "x.pdf").is_err());
    }

    #[test]
    fn unknown_provider_name_rejected() {
        assert!(LlmProvider::new("gemini", "key", "").is_err());
    }

    #[test]
    fn default_models_applied() {
        let provider = LlmProvider::new("anthropic", "key", "").unwrap();
        assert_eq!(provider.model(), DEFAULT_ANTHROPIC_MODEL);
        let provider = LlmProvider::new("openai", "key", "gpt-4o-mini").unwrap();
        assert_eq!(provider.model(), "gpt-4o-mini");
    }
}
