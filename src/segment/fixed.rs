// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Fixed-size sliding-window segmentation
//!
//! Concatenates the document's blocks and cuts overlapping windows of
//! `chunk_size` characters, `chunk_overlap` characters shared between
//! consecutive windows. Offsets are counted in characters, not bytes —
//! gazette text is full of accented characters.

use crate::errors::RagError;
use crate::extract::PageBlock;
use crate::segment::{Chunk, Segmenter};
use async_trait::async_trait;
use tracing::debug;

const BLOCK_JOINER: &str = "\n\n";

pub struct FixedWindowSegmenter {
    chunk_size: usize,
    chunk_overlap: usize,
    min_chunk_chars: usize,
}

impl FixedWindowSegmenter {
    /// `chunk_overlap < chunk_size` is enforced by config validation
    pub fn new(chunk_size: usize, chunk_overlap: usize, min_chunk_chars: usize) -> Self {
        Self {
            chunk_size,
            chunk_overlap,
            min_chunk_chars,
        }
    }
}

#[async_trait]
impl Segmenter for FixedWindowSegmenter {
    async fn segment(&self, doc_id: &str, blocks: &[PageBlock]) -> Result<Vec<Chunk>, RagError> {
        if blocks.is_empty() {
            debug!(document = doc_id, "no blocks to segment");
            return Ok(Vec::new());
        }

        // Concatenate blocks, remembering the character span of each so a
        // window can be attributed to the page(s) it overlaps
        let mut text: Vec<char> = Vec::new();
        let mut spans: Vec<(usize, usize, u32)> = Vec::new();
        for (i, block) in blocks.iter().enumerate() {
            if i > 0 {
                text.extend(BLOCK_JOINER.chars());
            }
            let start = text.len();
            text.extend(block.text.chars());
            spans.push((start, text.len(), block.page));
        }

        let step = self.chunk_size - self.chunk_overlap;
        let mut chunks = Vec::new();
        let mut start = 0usize;
        loop {
            let end = (start + self.chunk_size).min(text.len());
            let window: String = text[start..end].iter().collect();
            // Emitted trimmed; `start_offset` refers to the untrimmed span
            let window = window.trim();

            if !window.is_empty() && window.chars().count() >= self.min_chunk_chars {
                let (page_start, page_end) = pages_for_span(&spans, start, end);
                chunks.push(Chunk {
                    text: window.to_string(),
                    source_document: doc_id.to_string(),
                    page_start,
                    page_end,
                    sequence_index: chunks.len(),
                    start_offset: Some(start),
                });
            }

            if end == text.len() {
                break;
            }
            start += step;
        }

        Ok(chunks)
    }
}

/// Min/max page among blocks overlapping the [start, end) character span
fn pages_for_span(spans: &[(usize, usize, u32)], start: usize, end: usize) -> (u32, u32) {
    let mut pages = spans
        .iter()
        .filter(|(s, e, _)| *s < end && *e > start)
        .map(|(_, _, page)| *page);
    let first = pages.next().unwrap_or(1);
    let last = pages.last().unwrap_or(first);
    (first.min(last), first.max(last))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn blocks_of(texts: &[(&str, u32)]) -> Vec<PageBlock> {
        texts
            .iter()
            .map(|(t, p)| PageBlock {
                text: t.to_string(),
                page: *p,
            })
            .collect()
    }

    fn long_text(prefix: &str, len: usize) -> String {
        let mut s = String::from(prefix);
        let filler = " cláusula contratual de execução de serviços públicos";
        while s.chars().count() < len {
            s.push_str(filler);
        }
        s.chars().take(len).collect()
    }

    #[tokio::test]
    async fn test_every_window_respects_size_cap() {
        let segmenter = FixedWindowSegmenter::new(100, 25, 10);
        let blocks = blocks_of(&[(&long_text("primeiro bloco", 450), 1)]);
        let chunks = segmenter.segment("doc.pdf", &blocks).await.unwrap();
        assert!(!chunks.is_empty());
        for chunk in &chunks {
            assert!(chunk.text.chars().count() <= 100);
        }
    }

    #[tokio::test]
    async fn test_exact_overlap_reproduction() {
        // Trailing `overlap` chars of window i are the leading chars of i+1
        let segmenter = FixedWindowSegmenter::new(100, 25, 10);
        let blocks = blocks_of(&[(&long_text("texto corrido", 500), 1)]);
        let chunks = segmenter.segment("doc.pdf", &blocks).await.unwrap();
        assert!(chunks.len() >= 3);
        for pair in chunks.windows(2) {
            let prev: Vec<char> = pair[0].text.chars().collect();
            if prev.len() < 100 {
                continue; // final short window
            }
            let tail: String = prev[prev.len() - 25..].iter().collect();
            let head: String = pair[1].text.chars().take(25).collect();
            assert_eq!(tail, head);
        }
    }

    #[tokio::test]
    async fn test_start_offsets_step_by_size_minus_overlap() {
        let segmenter = FixedWindowSegmenter::new(100, 25, 10);
        let blocks = blocks_of(&[(&long_text("offsets", 400), 1)]);
        let chunks = segmenter.segment("doc.pdf", &blocks).await.unwrap();
        for (i, chunk) in chunks.iter().enumerate() {
            assert_eq!(chunk.start_offset, Some(i * 75));
            assert_eq!(chunk.sequence_index, i);
        }
    }

    #[tokio::test]
    async fn test_page_attribution_spans_pages() {
        let first = long_text("página um", 90);
        let second = long_text("página dois", 90);
        let segmenter = FixedWindowSegmenter::new(120, 30, 10);
        let blocks = blocks_of(&[(&first, 1), (&second, 2)]);
        let chunks = segmenter.segment("doc.pdf", &blocks).await.unwrap();
        // First window covers the page-1 block and spills into page 2
        assert_eq!(chunks[0].page_start, 1);
        assert_eq!(chunks[0].page_end, 2);
        // Last window lies entirely within page 2
        let last = chunks.last().unwrap();
        assert_eq!(last.page_start, 2);
        assert_eq!(last.page_end, 2);
    }

    #[tokio::test]
    async fn test_windows_are_trimmed_and_non_empty() {
        // First window ends exactly on the "\n\n" block joiner; the joiner
        // whitespace must not leak into the chunk text
        let segmenter = FixedWindowSegmenter::new(100, 25, 10);
        let blocks = blocks_of(&[
            (&long_text("bloco um", 99), 1),
            (&long_text("bloco dois", 200), 2),
        ]);
        let chunks = segmenter.segment("doc.pdf", &blocks).await.unwrap();
        assert!(!chunks.is_empty());
        for chunk in &chunks {
            assert!(!chunk.text.is_empty());
            assert_eq!(chunk.text, chunk.text.trim());
        }
    }

    #[tokio::test]
    async fn test_empty_blocks_yield_zero_chunks() {
        let segmenter = FixedWindowSegmenter::new(100, 25, 10);
        let chunks = segmenter.segment("empty.pdf", &[]).await.unwrap();
        assert!(chunks.is_empty());
    }

    #[tokio::test]
    async fn test_tiny_trailing_window_discarded() {
        // 110 chars with size 100 / overlap 25 leaves a 35-char tail window;
        // with a 50-char floor it must be dropped
        let segmenter = FixedWindowSegmenter::new(100, 25, 50);
        let blocks = blocks_of(&[(&long_text("cauda curta", 110), 1)]);
        let chunks = segmenter.segment("doc.pdf", &blocks).await.unwrap();
        assert_eq!(chunks.len(), 1);
    }
}
