// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
pub mod cli;
pub mod config;
pub mod embeddings;
pub mod errors;
pub mod eval;
pub mod extract;
pub mod generate;
pub mod pipeline;
pub mod rerank;
pub mod segment;
pub mod vector;

// Re-export main types
pub use config::{ChunkingConfig, RagConfig, RerankPolicy, RetrievalConfig, SegmenterStrategy};
pub use embeddings::{EmbeddingProvider, HashEmbeddings, OllamaEmbeddings};
pub use errors::RagError;
pub use generate::{Answer, AnswerGenerator, GenerationModel, OllamaGenerator, PromptTemplate};
pub use pipeline::RagPipeline;
pub use rerank::{CrossEncoderClient, Reranker};
pub use segment::{segmenter_for, Chunk, Segmenter};
pub use vector::VectorIndex;
