// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! RAG pipeline
//!
//! The dependency-injected context object tying the stages together: one
//! embedding provider (index build and query time must share it), one
//! generation model, an optional cross-encoder, and the current index.
//! Constructed once at process start and passed around explicitly — no
//! module-level cached singletons, so several independent pipelines can
//! coexist in one process (and in tests).
//!
//! The index is rebuilt whole-corpus, never mutated in place: a rebuild
//! assembles a new index and atomically swaps the shared pointer, so an
//! in-flight query never observes a half-rebuilt index.

use crate::config::RagConfig;
use crate::embeddings::EmbeddingProvider;
use crate::errors::RagError;
use crate::extract::{collect_pdfs, extract_document};
use crate::generate::{Answer, AnswerGenerator, GenerationModel, PromptTemplate};
use crate::rerank::{apply_rerank, Reranker};
use crate::segment::{segmenter_for, Chunk, Segmenter};
use crate::vector::VectorIndex;
use futures::stream::{self, StreamExt};
use indicatif::{ProgressBar, ProgressStyle};
use std::path::Path;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{info, warn};

pub struct RagPipeline {
    config: RagConfig,
    provider: Arc<dyn EmbeddingProvider>,
    generation: Arc<dyn GenerationModel>,
    reranker: Option<Arc<dyn Reranker>>,
    answerer: AnswerGenerator,
    segmenter: Arc<dyn Segmenter>,
    index: RwLock<Option<Arc<VectorIndex>>>,
}

impl RagPipeline {
    pub fn new(
        config: RagConfig,
        provider: Arc<dyn EmbeddingProvider>,
        generation: Arc<dyn GenerationModel>,
        reranker: Option<Arc<dyn Reranker>>,
    ) -> Self {
        let answerer = AnswerGenerator::new(PromptTemplate::new(&config.prompt));
        let segmenter = segmenter_for(config.segmenter, &config.chunking, provider.clone());
        Self {
            config,
            provider,
            generation,
            reranker,
            answerer,
            segmenter,
            index: RwLock::new(None),
        }
    }

    pub fn config(&self) -> &RagConfig {
        &self.config
    }

    pub fn refusal_phrase(&self) -> &str {
        self.answerer.refusal_phrase()
    }

    /// Probe every configured model endpoint before touching the corpus.
    /// An unreachable host is a fatal configuration error at startup, not a
    /// surprise halfway through an index build.
    pub async fn health_check(&self) -> Result<(), RagError> {
        self.provider.health_check().await?;
        self.generation.health_check().await?;
        Ok(())
    }

    pub async fn has_index(&self) -> bool {
        self.index.read().await.is_some()
    }

    pub async fn index_size(&self) -> Option<usize> {
        self.index.read().await.as_ref().map(|i| i.len())
    }

    /// Build a fresh index from every PDF in `pdf_dir` and swap it in.
    ///
    /// Extraction and segmentation run per document across a bounded worker
    /// pool; embeddings are requested in one batch per document, not one call
    /// per chunk — per-item calls to a remote model host dominate build time.
    /// A corrupt document is skipped with a diagnostic; a corpus yielding
    /// zero chunks is a fatal [`RagError::EmptyCorpus`].
    ///
    /// Returns the number of indexed chunks.
    pub async fn build_index(&self, pdf_dir: &Path) -> Result<usize, RagError> {
        let paths = collect_pdfs(pdf_dir)?;
        if paths.is_empty() {
            warn!(dir = %pdf_dir.display(), "no PDF files found");
            return Err(RagError::EmptyCorpus);
        }
        info!(documents = paths.len(), "starting index build");

        let progress = ProgressBar::new(paths.len() as u64);
        progress.set_style(
            ProgressStyle::with_template("{bar:40} {pos}/{len} {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_bar()),
        );

        let min_block_chars = self.config.chunking.min_block_chars;
        // `buffered` keeps document order, so chunk insertion order (and with
        // it tie-breaking) is deterministic across builds
        let per_document: Vec<Result<(Vec<Chunk>, Vec<Vec<f32>>), RagError>> =
            stream::iter(paths.iter())
                .map(|path| {
                    let segmenter = self.segmenter.clone();
                    let provider = self.provider.clone();
                    async move {
                        let doc_id = path
                            .file_name()
                            .map(|n| n.to_string_lossy().into_owned())
                            .unwrap_or_else(|| path.display().to_string());

                        let blocks = match extract_document(path, min_block_chars) {
                            Ok(blocks) => blocks,
                            Err(e) if e.is_per_document() => {
                                warn!(code = e.error_code(), "skipping document: {}", e);
                                return Ok((Vec::new(), Vec::new()));
                            }
                            Err(e) => return Err(e),
                        };

                        let chunks = segmenter.segment(&doc_id, &blocks).await?;
                        if chunks.is_empty() {
                            warn!(document = %doc_id, "document produced no chunks");
                            return Ok((Vec::new(), Vec::new()));
                        }

                        let texts: Vec<String> =
                            chunks.iter().map(|c| c.text.clone()).collect();
                        let embeddings = provider.embed_many(&texts).await?;
                        Ok((chunks, embeddings))
                    }
                })
                .buffered(self.config.build_concurrency)
                .inspect(|_| progress.inc(1))
                .collect()
                .await;
        progress.finish_and_clear();

        let mut all_chunks = Vec::new();
        let mut all_embeddings = Vec::new();
        for result in per_document {
            let (chunks, embeddings) = result?;
            all_chunks.extend(chunks);
            all_embeddings.extend(embeddings);
        }

        if all_chunks.is_empty() {
            return Err(RagError::EmptyCorpus);
        }

        let index = VectorIndex::build(
            all_chunks,
            all_embeddings,
            self.provider.dimension(),
            self.provider.model_id(),
        )?;
        let size = index.len();
        info!(chunks = size, "index build complete");

        // Build-new-then-swap: readers keep their Arc to the old index
        *self.index.write().await = Some(Arc::new(index));
        Ok(size)
    }

    pub async fn save_index(&self, path: &Path) -> Result<(), RagError> {
        let guard = self.index.read().await;
        let index = guard.as_ref().ok_or(RagError::IndexNotReady)?;
        index.save(path)
    }

    pub async fn load_index(&self, path: &Path) -> Result<usize, RagError> {
        let index = VectorIndex::load(path, self.provider.as_ref())?;
        let size = index.len();
        *self.index.write().await = Some(Arc::new(index));
        Ok(size)
    }

    /// Answer one question: embed, retrieve top-K, re-rank per policy down to
    /// top-N, generate.
    ///
    /// Zero retrieved candidates still invoke the generator with empty
    /// context, so an unanswerable question yields the configured refusal
    /// phrase instead of an ad hoc message. None of the awaited calls mutate
    /// the index, so the caller may abandon the future at any point.
    pub async fn answer(&self, question: &str) -> Result<Answer, RagError> {
        let index = self
            .index
            .read()
            .await
            .clone()
            .ok_or(RagError::IndexNotReady)?;

        let query = self.provider.embed_one(question).await?;
        let candidates = index.search(&query, self.config.retrieval.k)?;

        let kept = apply_rerank(
            &self.config.retrieval.rerank,
            self.reranker.as_deref(),
            question,
            candidates,
            self.config.retrieval.top_n,
        )
        .await?;

        let chunks: Vec<Chunk> = kept.into_iter().map(|c| c.chunk).collect();
        self.answerer
            .answer(self.generation.as_ref(), question, chunks)
            .await
    }
}
