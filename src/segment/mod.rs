// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Document segmentation
//!
//! Groups extracted page blocks into chunks — the atomic retrievable units.
//! Two interchangeable strategies behind one trait, selected by
//! configuration: fixed-size sliding windows with overlap, or semantic
//! boundary detection via embedding similarity with a hard size cap.

pub mod fixed;
pub mod semantic;

pub use fixed::FixedWindowSegmenter;
pub use semantic::SemanticSegmenter;

use crate::config::{ChunkingConfig, SegmenterStrategy};
use crate::embeddings::EmbeddingProvider;
use crate::errors::RagError;
use crate::extract::PageBlock;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// A bounded unit of extracted document text plus provenance metadata
///
/// Created in bulk during index build, immutable thereafter. `text` never
/// exceeds the configured hard cap except for the documented case of a lone
/// paragraph already larger than the cap.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chunk {
    pub text: String,

    /// Filename or document id this chunk came from
    pub source_document: String,

    /// 1-indexed inclusive page range spanned by the text
    pub page_start: u32,
    pub page_end: u32,

    /// Position among chunks from the same source, for deterministic
    /// ordering and debugging
    pub sequence_index: usize,

    /// Character offset of the window start (fixed-window strategy only)
    #[serde(default)]
    pub start_offset: Option<usize>,
}

impl Chunk {
    /// "3" or "3-5" style page label for citations
    pub fn page_label(&self) -> String {
        if self.page_start == self.page_end {
            self.page_start.to_string()
        } else {
            format!("{}-{}", self.page_start, self.page_end)
        }
    }
}

/// Strategy capability: page blocks in, chunks out
#[async_trait]
pub trait Segmenter: Send + Sync {
    async fn segment(&self, doc_id: &str, blocks: &[PageBlock]) -> Result<Vec<Chunk>, RagError>;
}

/// Build the configured strategy. The provider is only consulted by the
/// semantic strategy, which embeds every paragraph of a document in one batch.
pub fn segmenter_for(
    strategy: SegmenterStrategy,
    chunking: &ChunkingConfig,
    provider: Arc<dyn EmbeddingProvider>,
) -> Arc<dyn Segmenter> {
    match strategy {
        SegmenterStrategy::FixedWindow => Arc::new(FixedWindowSegmenter::new(
            chunking.chunk_size,
            chunking.chunk_overlap,
            chunking.min_chunk_chars,
        )),
        SegmenterStrategy::Semantic => Arc::new(SemanticSegmenter::new(
            chunking.similarity_threshold,
            chunking.max_chunk_chars,
            chunking.min_chunk_chars,
            provider,
        )),
    }
}
