//! # docpilot
//!
//! **A per-project document retrieval and question-answering engine.**
//!
//! Users upload PDF/DOCX files into named projects; the engine extracts
//! text (with OCR fallback for scanned pages), builds a two-level semantic
//! index (document summaries + chunked embeddings + a BM25 lexical index),
//! and answers natural-language questions by retrieving relevant passages
//! and forwarding them to an LLM provider.
//!
//! ## Architecture
//!
//! ```text
//! uploads ─▶ extract (≤4) ─▶ chunk ─▶ embed (≤6 batches) ─▶ VectorStore
//!               │                                         └▶ tantivy BM25
//!               └▶ summarize (per file, best-effort) ─▶ DocumentSummary
//!
//! question ─▶ embed ─▶ cosine ┐
//!                             ├▶ RRF (k=60) ─▶ page dedup ─▶ top-K ─▶ LLM
//!             tantivy BM25  ──┘
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`extract`] | PDF/DOCX to per-page text, OCR candidates flagged |
//! | [`ocr`] | Tesseract / Sarvam OCR fallback for scanned pages |
//! | [`chunker`] | 150-word windows with 30-word overlap, parent-page links |
//! | [`embedding`] | Embedding providers (OpenAI, HuggingFace) + cosine |
//! | [`lexical`] | Tantivy BM25 index, one directory per project |
//! | [`store`] | Chunk + summary persistence (bincode primary, JSON fallback) |
//! | [`index`] | `ProjectIndex`: store + lexical + embedder, batched embedding |
//! | [`retriever`] | Hybrid search with RRF fusion and parent-page dedup |
//! | [`ingest`] | Streamed, cancellable ingestion pipeline |
//! | [`project`] | Projects, conversations, messages on disk |
//! | [`cache`] | LRU cache of loaded indexes |
//! | [`state`] | Shared server state and index activation |
//! | [`llm`] | Answer providers and the document summarizer |
//! | [`settings`] / [`crypto`] | Persisted settings with obfuscated keys |
//! | [`server`] | Axum HTTP surface |

pub mod cache;
pub mod chunker;
pub mod crypto;
pub mod embedding;
pub mod error;
pub mod extract;
pub mod index;
pub mod ingest;
pub mod lexical;
pub mod llm;
pub mod models;
pub mod ocr;
pub mod project;
pub mod retriever;
pub mod server;
pub mod settings;
pub mod state;
pub mod status;
pub mod store;

pub use error::{EngineError, Result};
