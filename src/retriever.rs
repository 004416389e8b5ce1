//! Hybrid retrieval: dense cosine + BM25, fused with Reciprocal Rank Fusion,
//! deduplicated by parent page.
//!
//! A [`Retriever`] is a cheap, reconstructible view over an
//! `Arc<ProjectIndex>`. It holds its own reference to the index, so a query
//! keeps the index alive even if the cache evicts it mid-flight.
//!
//! The two ranked lists are combined by RRF with `k = 60`: an id at rank `r`
//! (1-based) in a list contributes `1 / (60 + r)`; a missing rank contributes
//! nothing. Ties in the fused ordering break by chunk id so results are
//! reproducible for a fixed index state and query.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use crate::embedding::cosine_similarity;
use crate::error::{EngineError, Result};
use crate::index::ProjectIndex;
use crate::models::{DocumentSummary, RetrievedChunk};

/// RRF constant.
const RRF_K: f64 = 60.0;
/// Candidate multiplier: each ranked list is cut to `3 · top_k` before fusion.
const CANDIDATE_FACTOR: usize = 3;

pub struct Retriever {
    index: Arc<ProjectIndex>,
}

impl Retriever {
    pub fn new(index: Arc<ProjectIndex>) -> Self {
        Self { index }
    }

    pub fn doc_summaries(&self) -> Vec<DocumentSummary> {
        self.index.doc_summaries()
    }

    /// Hybrid search returning up to `top_k` results, at most one per
    /// `(document, page)` pair.
    pub async fn search(&self, query: &str, top_k: usize) -> Result<Vec<RetrievedChunk>> {
        // 1. Embed the query before taking any lock.
        let response = self.index.embedder().embed(&[query.to_string()]).await?;
        let query_embedding = response
            .into_iter()
            .next()
            .ok_or_else(|| EngineError::Embedding("empty query embedding".to_string()))?;

        let candidates = top_k * CANDIDATE_FACTOR;

        // 3. Lexical ranking (independent of the store lock).
        let lexical_hits = self.index.lexical().search(query, candidates)?;
        let mut lexical_ranks: HashMap<String, usize> = HashMap::new();
        for (rank, (id, _score)) in lexical_hits.iter().enumerate() {
            lexical_ranks.insert(id.clone(), rank + 1);
        }

        self.index.with_store(|store| {
            // 2. Dense ranking: cosine against every chunk, ties by id.
            let mut scored: Vec<(usize, f64)> = store
                .chunks
                .iter()
                .enumerate()
                .map(|(i, chunk)| (i, cosine_similarity(&query_embedding, &chunk.embedding)))
                .collect();
            scored.sort_by(|a, b| {
                b.1.partial_cmp(&a.1)
                    .unwrap_or(std::cmp::Ordering::Equal)
                    .then_with(|| store.chunks[a.0].id.cmp(&store.chunks[b.0].id))
            });

            let mut vector_ranks: HashMap<String, usize> = HashMap::new();
            for (rank, (chunk_index, _)) in scored.iter().take(candidates).enumerate() {
                vector_ranks.insert(store.chunks[*chunk_index].id.clone(), rank + 1);
            }

            // 4. Reciprocal Rank Fusion over the union of both lists.
            let mut all_ids: HashSet<&String> = vector_ranks.keys().collect();
            all_ids.extend(lexical_ranks.keys());

            let mut fused: Vec<(&String, f64)> = all_ids
                .into_iter()
                .map(|id| {
                    let mut score = 0.0;
                    if let Some(rank) = vector_ranks.get(id) {
                        score += 1.0 / (RRF_K + *rank as f64);
                    }
                    if let Some(rank) = lexical_ranks.get(id) {
                        score += 1.0 / (RRF_K + *rank as f64);
                    }
                    (id, score)
                })
                .collect();
            fused.sort_by(|a, b| {
                b.1.partial_cmp(&a.1)
                    .unwrap_or(std::cmp::Ordering::Equal)
                    .then_with(|| a.0.cmp(b.0))
            });

            // 5./6. Parent-page dedup, then materialize.
            let chunk_by_id: HashMap<&str, usize> = store
                .chunks
                .iter()
                .enumerate()
                .map(|(i, c)| (c.id.as_str(), i))
                .collect();

            let mut seen_pages: HashSet<(String, usize)> = HashSet::new();
            let mut results = Vec::with_capacity(top_k);
            for (id, score) in fused {
                if results.len() >= top_k {
                    break;
                }
                let Some(&chunk_index) = chunk_by_id.get(id.as_str()) else {
                    continue;
                };
                let chunk = &store.chunks[chunk_index];
                if !seen_pages.insert((chunk.document.clone(), chunk.page_number)) {
                    continue;
                }
                results.push(RetrievedChunk {
                    chunk_id: chunk.id.clone(),
                    document: chunk.document.clone(),
                    page_number: chunk.page_number,
                    text: chunk.text.clone(),
                    parent_text: chunk.parent_text.clone(),
                    section: chunk.section.clone(),
                    score,
                });
            }

            Ok(results)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedding::Embedder;
    use crate::lexical::LexicalIndex;
    use crate::models::Chunk;
    use crate::store::VectorStore;
    use async_trait::async_trait;

    /// Embeds each text as a unit vector keyed on the first word, so tests
    /// control dense similarity exactly: identical first words → cosine 1.
    struct KeywordEmbedder;

    fn keyword_vector(text: &str) -> Vec<f32> {
        let key = text.split_whitespace().next().unwrap_or_default();
        let mut v = vec![0.0f32; 8];
        let slot = key.bytes().map(|b| b as usize).sum::<usize>() % 8;
        v[slot] = 1.0;
        v
    }

    #[async_trait]
    impl Embedder for KeywordEmbedder {
        async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
            Ok(texts.iter().map(|t| keyword_vector(t)).collect())
        }

        fn model_name(&self) -> &str {
            "keyword-test"
        }
    }

    fn chunk(id: &str, document: &str, page: usize, text: &str) -> Chunk {
        Chunk {
            id: id.to_string(),
            document: document.to_string(),
            page_number: page,
            text: text.to_string(),
            parent_text: format!("parent of: {text}"),
            section: String::new(),
            embedding: keyword_vector(text),
        }
    }

    fn build_index(chunks: Vec<Chunk>) -> Arc<ProjectIndex> {
        let lexical = LexicalIndex::open_in_ram().unwrap();
        for c in &chunks {
            lexical
                .index_chunk(&c.id, &c.text, &c.document, c.page_number)
                .unwrap();
        }
        lexical.commit().unwrap();

        let index = ProjectIndex::new(lexical, Arc::new(KeywordEmbedder));
        index.set_store(VectorStore {
            chunks,
            doc_summaries: Vec::new(),
        });
        Arc::new(index)
    }

    #[tokio::test]
    async fn fused_scores_follow_rrf_formula() {
        // One chunk matches both lists at rank 1; verify the exact score.
        let index = build_index(vec![
            chunk("docA_p1_c0", "docA.pdf", 1, "merger agreement details"),
            chunk("docB_p1_c1", "docB.pdf", 1, "gardening in winter"),
        ]);
        let retriever = Retriever::new(index);

        let results = retriever.search("merger agreement details", 2).await.unwrap();
        assert!(!results.is_empty());
        let top = &results[0];
        assert_eq!(top.chunk_id, "docA_p1_c0");
        // Rank 1 in the dense list and rank 1 in the lexical list.
        let expected = 1.0 / 61.0 + 1.0 / 61.0;
        assert!(
            (top.score - expected).abs() < 1e-9,
            "expected {expected}, got {}",
            top.score
        );
    }

    #[tokio::test]
    async fn missing_rank_contributes_zero() {
        // docA shares no words with the query but its embedding matches the
        // query vector exactly, so it ranks only in the dense list; docB
        // matches lexically and sits at dense rank 2.
        let mut doc_a = chunk("docA_p1_c0", "docA.pdf", 1, "omega text one");
        doc_a.embedding = keyword_vector("solar");
        let index = build_index(vec![
            doc_a,
            chunk("docB_p1_c1", "docB.pdf", 1, "beta solar panels report"),
        ]);
        let retriever = Retriever::new(index);

        let results = retriever.search("solar panels", 2).await.unwrap();
        let by_id: HashMap<&str, f64> = results
            .iter()
            .map(|r| (r.chunk_id.as_str(), r.score))
            .collect();

        // docA: dense rank 1 only. docB: lexical rank 1, dense rank 2.
        assert!((by_id["docA_p1_c0"] - 1.0 / 61.0).abs() < 1e-9);
        assert!((by_id["docB_p1_c1"] - (1.0 / 61.0 + 1.0 / 62.0)).abs() < 1e-9);
    }

    #[tokio::test]
    async fn parent_page_dedup_keeps_best_chunk() {
        // Two chunks from the same page of docA plus one from docB; with
        // top_k = 2 the weaker docA sibling must be suppressed.
        let index = build_index(vec![
            chunk("docA_p5_c0", "docA.pdf", 5, "merger agreement details"),
            chunk("docA_p5_c1", "docA.pdf", 5, "merger terms continued"),
            chunk("docB_p7_c2", "docB.pdf", 7, "unrelated gardening notes"),
        ]);
        let retriever = Retriever::new(index);

        let results = retriever.search("merger agreement details", 2).await.unwrap();
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].document, "docA.pdf");
        assert_eq!(results[0].page_number, 5);
        assert_eq!(results[1].document, "docB.pdf");
        assert_eq!(results[1].page_number, 7);

        let pages: HashSet<(String, usize)> = results
            .iter()
            .map(|r| (r.document.clone(), r.page_number))
            .collect();
        assert_eq!(pages.len(), results.len(), "no (document, page) repeats");
    }

    #[tokio::test]
    async fn ties_break_by_chunk_id() {
        // Two chunks with identical embeddings and no lexical match for the
        // query: equal fused scores, so ordering must be lexicographic.
        let index = build_index(vec![
            chunk("zzz_p1_c0", "zzz.pdf", 1, "same words here"),
            chunk("aaa_p1_c0", "aaa.pdf", 1, "same words here"),
        ]);
        let retriever = Retriever::new(index);

        let first = retriever.search("same thing", 2).await.unwrap();
        let second = retriever.search("same thing", 2).await.unwrap();
        let order: Vec<&str> = first.iter().map(|r| r.chunk_id.as_str()).collect();
        assert_eq!(
            order,
            second.iter().map(|r| r.chunk_id.as_str()).collect::<Vec<_>>(),
            "same query must be reproducible"
        );
        assert_eq!(order[0], "aaa_p1_c0");
    }

    #[tokio::test]
    async fn results_carry_parent_text_and_fused_score() {
        let index = build_index(vec![chunk(
            "docA_p1_c0",
            "docA.pdf",
            1,
            "merger agreement details",
        )]);
        let retriever = Retriever::new(index);

        let results = retriever.search("merger agreement details", 5).await.unwrap();
        assert_eq!(results.len(), 1);
        assert!(results[0].parent_text.starts_with("parent of:"));
        assert!(results[0].score > 0.0);
    }
}
