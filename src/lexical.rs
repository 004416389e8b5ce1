//! Tantivy-backed lexical (BM25) index.
//!
//! One index per project, persisted as a directory of files at
//! `<project>/bm25.index/`. The schema stores the chunk id and indexes the
//! chunk text with a simple tokenizer + lowercasing + English stemming; the
//! retriever consumes ranks only, so the exact analyzer is not part of the
//! search contract.
//!
//! The writer holds a lock on the index directory. [`LexicalIndex::close`]
//! drops it, which is required before another index can be opened at the
//! same path.

use std::path::Path;
use std::sync::Mutex;

use tantivy::collector::TopDocs;
use tantivy::query::QueryParser;
use tantivy::schema::{
    Field, IndexRecordOption, Schema, TextFieldIndexing, TextOptions, Value, STORED, STRING,
};
use tantivy::tokenizer::{LowerCaser, RemoveLongFilter, SimpleTokenizer, Stemmer, TextAnalyzer};
use tantivy::{doc, Index, IndexReader, IndexWriter, TantivyDocument, Term};

use crate::error::{EngineError, Result};

const WRITER_MEMORY_BUDGET: usize = 50_000_000;
const TOKENIZER_NAME: &str = "en_stem";

mod fields {
    pub const ID: &str = "id";
    pub const TEXT: &str = "text";
    pub const DOC: &str = "doc";
    pub const PAGE: &str = "page";
}

#[derive(Clone, Copy)]
struct SchemaFields {
    id: Field,
    text: Field,
    doc: Field,
    page: Field,
}

/// A project's full-text index. Send + Sync; writes are serialized through
/// an internal mutex.
pub struct LexicalIndex {
    index: Index,
    reader: IndexReader,
    writer: Mutex<Option<IndexWriter>>,
    fields: SchemaFields,
}

fn build_schema() -> (Schema, SchemaFields) {
    let mut builder = Schema::builder();

    let id = builder.add_text_field(fields::ID, STRING | STORED);

    let text_options = TextOptions::default().set_indexing_options(
        TextFieldIndexing::default()
            .set_tokenizer(TOKENIZER_NAME)
            .set_index_option(IndexRecordOption::WithFreqsAndPositions),
    );
    let text = builder.add_text_field(fields::TEXT, text_options);

    let doc = builder.add_text_field(fields::DOC, STRING | STORED);
    let page = builder.add_u64_field(fields::PAGE, STORED);

    let schema = builder.build();
    (schema, SchemaFields { id, text, doc, page })
}

fn register_tokenizers(index: &Index) {
    let en_stem = TextAnalyzer::builder(SimpleTokenizer::default())
        .filter(RemoveLongFilter::limit(40))
        .filter(LowerCaser)
        .filter(Stemmer::new(tantivy::tokenizer::Language::English))
        .build();
    index.tokenizers().register(TOKENIZER_NAME, en_stem);
}

impl LexicalIndex {
    /// Open an existing index at `dir`, or create a fresh one.
    pub fn open(dir: &Path) -> Result<Self> {
        std::fs::create_dir_all(dir)?;
        let (schema, fields) = build_schema();

        let mmap_dir = tantivy::directory::MmapDirectory::open(dir)
            .map_err(|e| EngineError::Store(format!("open index dir: {e}")))?;
        let index = if Index::exists(&mmap_dir)
            .map_err(|e| EngineError::Store(format!("probe index dir: {e}")))?
        {
            Index::open(mmap_dir)?
        } else {
            Index::create(mmap_dir, schema, tantivy::IndexSettings::default())?
        };

        Self::from_index(index, fields)
    }

    /// In-memory index for tests.
    pub fn open_in_ram() -> Result<Self> {
        let (schema, fields) = build_schema();
        let index = Index::create_in_ram(schema);
        Self::from_index(index, fields)
    }

    fn from_index(index: Index, fields: SchemaFields) -> Result<Self> {
        register_tokenizers(&index);
        let writer = index.writer(WRITER_MEMORY_BUDGET)?;
        let reader = index.reader()?;
        Ok(Self {
            index,
            reader,
            writer: Mutex::new(Some(writer)),
            fields,
        })
    }

    /// Upsert one chunk. Any previous document with the same id is deleted
    /// first. Visible to searches only after [`LexicalIndex::commit`].
    pub fn index_chunk(&self, id: &str, text: &str, document: &str, page: usize) -> Result<()> {
        let guard = self.writer.lock().unwrap();
        let writer = guard
            .as_ref()
            .ok_or_else(|| EngineError::Store("lexical index is closed".to_string()))?;

        writer.delete_term(Term::from_field_text(self.fields.id, id));
        writer.add_document(doc!(
            self.fields.id => id,
            self.fields.text => text,
            self.fields.doc => document,
            self.fields.page => page as u64,
        ))?;
        Ok(())
    }

    /// Commit pending writes so they become searchable.
    pub fn commit(&self) -> Result<()> {
        let mut guard = self.writer.lock().unwrap();
        let writer = guard
            .as_mut()
            .ok_or_else(|| EngineError::Store("lexical index is closed".to_string()))?;
        writer.commit()?;
        Ok(())
    }

    /// BM25-ranked search over chunk text. Returns up to `limit`
    /// `(chunk_id, score)` pairs by descending score. Query parsing is
    /// lenient: malformed syntax degrades instead of erroring.
    pub fn search(&self, query: &str, limit: usize) -> Result<Vec<(String, f32)>> {
        self.reader.reload()?;
        let searcher = self.reader.searcher();

        let parser = QueryParser::for_index(&self.index, vec![self.fields.text]);
        let (parsed, _errors) = parser.parse_query_lenient(query);

        let top_docs = searcher.search(&parsed, &TopDocs::with_limit(limit.max(1)))?;

        let mut hits = Vec::with_capacity(top_docs.len());
        for (score, address) in top_docs {
            let retrieved: TantivyDocument = searcher.doc(address)?;
            let id = retrieved
                .get_first(self.fields.id)
                .and_then(|v| v.as_str())
                .unwrap_or_default()
                .to_string();
            hits.push((id, score));
        }
        Ok(hits)
    }

    /// Drop the writer, releasing the directory lock. Required before any
    /// other index may be opened at the same directory. Idempotent.
    pub fn close(&self) {
        let mut guard = self.writer.lock().unwrap();
        *guard = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_index() -> LexicalIndex {
        let idx = LexicalIndex::open_in_ram().unwrap();
        idx.index_chunk("a_p1_c0", "the quarterly revenue grew by twelve percent", "a.pdf", 1)
            .unwrap();
        idx.index_chunk("a_p2_c1", "the board approved the merger agreement", "a.pdf", 2)
            .unwrap();
        idx.index_chunk("b_p1_c2", "gardening tips for the winter season", "b.pdf", 1)
            .unwrap();
        idx.commit().unwrap();
        idx
    }

    #[test]
    fn search_ranks_matching_chunk_first() {
        let idx = sample_index();
        let hits = idx.search("quarterly revenue", 10).unwrap();
        assert!(!hits.is_empty());
        assert_eq!(hits[0].0, "a_p1_c0");
        for pair in hits.windows(2) {
            assert!(pair[0].1 >= pair[1].1, "scores must be descending");
        }
    }

    #[test]
    fn search_respects_limit() {
        let idx = sample_index();
        let hits = idx.search("the", 2).unwrap();
        assert!(hits.len() <= 2);
    }

    #[test]
    fn unmatched_query_returns_nothing() {
        let idx = sample_index();
        let hits = idx.search("zzzzqqqq", 10).unwrap();
        assert!(hits.is_empty());
    }

    #[test]
    fn upsert_replaces_existing_id() {
        let idx = LexicalIndex::open_in_ram().unwrap();
        idx.index_chunk("x_p1_c0", "alpha", "x.pdf", 1).unwrap();
        idx.index_chunk("x_p1_c0", "beta", "x.pdf", 1).unwrap();
        idx.commit().unwrap();

        assert!(idx.search("alpha", 10).unwrap().is_empty());
        let hits = idx.search("beta", 10).unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].0, "x_p1_c0");
    }

    #[test]
    fn writes_after_close_fail() {
        let idx = sample_index();
        idx.close();
        assert!(idx.index_chunk("c_p1_c3", "text", "c.pdf", 1).is_err());
        assert!(idx.commit().is_err());
        // Reads still work on the committed state.
        assert!(!idx.search("revenue", 10).unwrap().is_empty());
    }

    #[test]
    fn close_releases_directory_lock() {
        let dir = tempfile::tempdir().unwrap();
        let first = LexicalIndex::open(dir.path()).unwrap();
        first
            .index_chunk("a_p1_c0", "hello lexical world", "a.pdf", 1)
            .unwrap();
        first.commit().unwrap();
        first.close();

        let second = LexicalIndex::open(dir.path()).unwrap();
        let hits = second.search("lexical", 10).unwrap();
        assert_eq!(hits.len(), 1);
    }
}
