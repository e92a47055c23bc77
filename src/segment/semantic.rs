// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Semantic-boundary segmentation
//!
//! Treats every extracted block as a candidate paragraph, embeds the whole
//! document in one batch, and marks a topic boundary wherever the cosine
//! similarity between adjacent paragraph embeddings falls below the
//! configured threshold. Because a semantic group can be arbitrarily large
//! (a multi-page contract clause), a greedy packer then closes a chunk before
//! it would exceed the hard size cap. A lone paragraph already over the cap
//! becomes its own oversized chunk — it is not split further or truncated.

use crate::embeddings::{cosine_similarity, EmbeddingProvider};
use crate::errors::RagError;
use crate::extract::PageBlock;
use crate::segment::{Chunk, Segmenter};
use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, warn};

const PARAGRAPH_JOINER: &str = "\n\n";

pub struct SemanticSegmenter {
    similarity_threshold: f32,
    max_chunk_chars: usize,
    min_chunk_chars: usize,
    provider: Arc<dyn EmbeddingProvider>,
}

impl SemanticSegmenter {
    pub fn new(
        similarity_threshold: f32,
        max_chunk_chars: usize,
        min_chunk_chars: usize,
        provider: Arc<dyn EmbeddingProvider>,
    ) -> Self {
        Self {
            similarity_threshold,
            max_chunk_chars,
            min_chunk_chars,
            provider,
        }
    }

    /// Close the accumulated paragraphs into a chunk, if they pass the floor
    fn flush(&self, doc_id: &str, group: &mut Vec<PageBlock>, chunks: &mut Vec<Chunk>) {
        if group.is_empty() {
            return;
        }
        let text = group
            .iter()
            .map(|p| p.text.as_str())
            .collect::<Vec<_>>()
            .join(PARAGRAPH_JOINER);
        let page_start = group.iter().map(|p| p.page).min().unwrap_or(1);
        let page_end = group.iter().map(|p| p.page).max().unwrap_or(page_start);
        group.clear();

        let length = text.chars().count();
        if length < self.min_chunk_chars {
            debug!(document = doc_id, length, "discarding tiny chunk");
            return;
        }
        if length > self.max_chunk_chars {
            // Only reachable for a single oversized paragraph
            warn!(
                document = doc_id,
                length,
                cap = self.max_chunk_chars,
                "paragraph exceeds chunk cap, emitting oversized chunk"
            );
        }
        chunks.push(Chunk {
            text,
            source_document: doc_id.to_string(),
            page_start,
            page_end,
            sequence_index: chunks.len(),
            start_offset: None,
        });
    }
}

#[async_trait]
impl Segmenter for SemanticSegmenter {
    async fn segment(&self, doc_id: &str, blocks: &[PageBlock]) -> Result<Vec<Chunk>, RagError> {
        if blocks.is_empty() {
            debug!(document = doc_id, "no paragraphs to segment");
            return Ok(Vec::new());
        }

        // One batched call per document
        let texts: Vec<String> = blocks.iter().map(|b| b.text.clone()).collect();
        let embeddings = self.provider.embed_many(&texts).await?;

        let mut chunks = Vec::new();
        let mut group: Vec<PageBlock> = vec![blocks[0].clone()];
        let mut group_chars = blocks[0].text.chars().count();

        for i in 1..blocks.len() {
            let topic_shift =
                cosine_similarity(&embeddings[i - 1], &embeddings[i]) < self.similarity_threshold;
            let paragraph_chars = blocks[i].text.chars().count();
            let would_overflow = group_chars
                + PARAGRAPH_JOINER.chars().count()
                + paragraph_chars
                > self.max_chunk_chars;

            if topic_shift || would_overflow {
                self.flush(doc_id, &mut group, &mut chunks);
                group_chars = 0;
            }
            group.push(blocks[i].clone());
            group_chars += if group.len() == 1 {
                paragraph_chars
            } else {
                PARAGRAPH_JOINER.chars().count() + paragraph_chars
            };
        }
        self.flush(doc_id, &mut group, &mut chunks);

        debug!(
            document = doc_id,
            paragraphs = blocks.len(),
            chunks = chunks.len(),
            "semantic segmentation complete"
        );
        Ok(chunks)
    }
}
