//! Fixed-size overlapping word-window chunker.
//!
//! Each page is split on whitespace into windows of [`CHUNK_SIZE`] words
//! stepping by `CHUNK_SIZE - OVERLAP`, so consecutive chunks share
//! [`OVERLAP`] words of context. Every chunk keeps the full page text as
//! `parent_text` and picks up a section label from the document summaries
//! (first section whose page range covers the page, in document order).

use crate::models::{Chunk, DocumentSummary, PageRecord};

/// Words per search chunk.
pub const CHUNK_SIZE: usize = 150;
/// Words shared between consecutive chunks of a page.
pub const OVERLAP: usize = 30;

/// Split extracted pages into search chunks linked to their parent page.
///
/// Chunk ids are `<document>_p<page>_c<index>` where the index is the
/// chunk's 0-based position in this call's output, which together with the
/// document name makes ids unique within a project. A page with zero words
/// produces zero chunks; a page shorter than [`CHUNK_SIZE`] produces one.
pub fn chunk_pages(pages: &[PageRecord], summaries: &[DocumentSummary]) -> Vec<Chunk> {
    let mut chunks = Vec::new();

    for page in pages {
        let words: Vec<&str> = page.text.split_whitespace().collect();
        let section = section_for(summaries, &page.document, page.page_number);

        let step = CHUNK_SIZE - OVERLAP;
        let mut start = 0;
        while start < words.len() {
            let end = (start + CHUNK_SIZE).min(words.len());
            let text = words[start..end].join(" ");
            let id = format!("{}_p{}_c{}", page.document, page.page_number, chunks.len());

            chunks.push(Chunk {
                id,
                document: page.document.clone(),
                page_number: page.page_number,
                text,
                parent_text: page.text.clone(),
                section: section.clone(),
                embedding: Vec::new(),
            });

            if end == words.len() {
                break;
            }
            start += step;
        }
    }

    chunks
}

/// Look up the section label for a page: the first section of the matching
/// document's summary whose `[page_start, page_end]` range covers the page.
/// Overlapping ranges resolve to the first match in document order; pages
/// with no matching section get an empty label.
pub fn section_for(summaries: &[DocumentSummary], document: &str, page: usize) -> String {
    for summary in summaries {
        if summary.document != document {
            continue;
        }
        for section in &summary.sections {
            if page >= section.page_start && page <= section.page_end {
                return section.name.clone();
            }
        }
    }
    String::new()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Section;

    fn page(document: &str, number: usize, words: usize) -> PageRecord {
        let text = (0..words)
            .map(|i| format!("word{i}"))
            .collect::<Vec<_>>()
            .join(" ");
        PageRecord {
            document: document.to_string(),
            page_number: number,
            text,
        }
    }

    /// Expected chunk count for a page of `w` words.
    fn expected_chunks(w: usize) -> usize {
        if w == 0 {
            0
        } else if w <= CHUNK_SIZE {
            1
        } else {
            (w - OVERLAP).div_ceil(CHUNK_SIZE - OVERLAP)
        }
    }

    #[test]
    fn empty_page_produces_no_chunks() {
        let chunks = chunk_pages(&[page("a.pdf", 1, 0)], &[]);
        assert!(chunks.is_empty());
    }

    #[test]
    fn short_page_produces_one_chunk() {
        let chunks = chunk_pages(&[page("a.pdf", 1, 120)], &[]);
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].id, "a.pdf_p1_c0");
        assert_eq!(chunks[0].page_number, 1);
    }

    #[test]
    fn exact_window_produces_one_chunk() {
        let chunks = chunk_pages(&[page("a.pdf", 1, CHUNK_SIZE)], &[]);
        assert_eq!(chunks.len(), 1);
    }

    #[test]
    fn window_count_matches_formula() {
        for words in [1, 50, 150, 151, 270, 271, 400, 1000] {
            let chunks = chunk_pages(&[page("a.pdf", 1, words)], &[]);
            assert_eq!(
                chunks.len(),
                expected_chunks(words),
                "unexpected chunk count for {words} words"
            );
        }
    }

    #[test]
    fn consecutive_chunks_overlap() {
        let chunks = chunk_pages(&[page("a.pdf", 1, 400)], &[]);
        assert!(chunks.len() >= 2);
        let first: Vec<&str> = chunks[0].text.split_whitespace().collect();
        let second: Vec<&str> = chunks[1].text.split_whitespace().collect();
        // The last OVERLAP words of chunk 0 open chunk 1.
        assert_eq!(&first[first.len() - OVERLAP..], &second[..OVERLAP]);
    }

    #[test]
    fn chunk_text_is_substring_of_parent() {
        let pages = vec![page("a.pdf", 1, 500), page("a.pdf", 2, 80)];
        for chunk in chunk_pages(&pages, &[]) {
            let parent_norm = chunk.parent_text.split_whitespace().collect::<Vec<_>>().join(" ");
            assert!(
                parent_norm.contains(&chunk.text),
                "chunk text not contained in parent for {}",
                chunk.id
            );
        }
    }

    #[test]
    fn ids_are_unique_and_ordered() {
        let pages = vec![page("a.pdf", 1, 400), page("a.pdf", 2, 400)];
        let chunks = chunk_pages(&pages, &[]);
        let mut ids: Vec<&str> = chunks.iter().map(|c| c.id.as_str()).collect();
        let total = ids.len();
        ids.sort();
        ids.dedup();
        assert_eq!(ids.len(), total);

        // Page order then intra-page order is preserved.
        let pages_seen: Vec<usize> = chunks.iter().map(|c| c.page_number).collect();
        let mut sorted = pages_seen.clone();
        sorted.sort();
        assert_eq!(pages_seen, sorted);
    }

    #[test]
    fn section_lookup_first_match_wins() {
        let summaries = vec![DocumentSummary {
            document: "a.pdf".to_string(),
            title: "A".to_string(),
            doc_type: "other".to_string(),
            summary: String::new(),
            sections: vec![
                Section {
                    name: "Intro".to_string(),
                    page_start: 1,
                    page_end: 5,
                },
                Section {
                    name: "Overlapping".to_string(),
                    page_start: 3,
                    page_end: 10,
                },
            ],
            key_entities: vec![],
        }];

        assert_eq!(section_for(&summaries, "a.pdf", 3), "Intro");
        assert_eq!(section_for(&summaries, "a.pdf", 7), "Overlapping");
        assert_eq!(section_for(&summaries, "a.pdf", 20), "");
        assert_eq!(section_for(&summaries, "b.pdf", 3), "");
    }

    #[test]
    fn chunks_carry_section_label() {
        let summaries = vec![DocumentSummary {
            document: "a.pdf".to_string(),
            title: "A".to_string(),
            doc_type: "other".to_string(),
            summary: String::new(),
            sections: vec![Section {
                name: "Findings".to_string(),
                page_start: 2,
                page_end: 2,
            }],
            key_entities: vec![],
        }];
        let pages = vec![page("a.pdf", 1, 10), page("a.pdf", 2, 10)];
        let chunks = chunk_pages(&pages, &summaries);
        assert_eq!(chunks[0].section, "");
        assert_eq!(chunks[1].section, "Findings");
    }
}
