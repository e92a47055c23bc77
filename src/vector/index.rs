// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! In-memory vector index with disk persistence
//!
//! Stores (vector, chunk) pairs in insertion order and answers nearest-
//! neighbor queries by exact cosine similarity — vectors are normalized at
//! build time so the score is a dot product. The corpus is a few thousand
//! chunks, small enough that a flat exact scan is fast and buys two
//! properties an ANN structure would not: scores are exactly reproducible
//! across builds, and ties resolve by insertion order instead of by the
//! iteration order of some internal graph.
//!
//! The persisted blob records the embedding dimension and model id used to
//! build it; loading validates both against the live provider. An index built
//! with model A queried with vectors from model B is a configuration error,
//! not something to paper over at runtime.

use crate::embeddings::{normalize, EmbeddingProvider};
use crate::errors::RagError;
use crate::segment::Chunk;
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::info;

/// One retrieval candidate
#[derive(Debug, Clone, PartialEq)]
pub struct ScoredChunk {
    pub chunk: Chunk,
    pub score: f32,
}

#[derive(Serialize, Deserialize)]
struct IndexRecord {
    vector: Vec<f32>,
    chunk: Chunk,
}

/// On-disk layout, versioned so a format change fails loudly
#[derive(Serialize, Deserialize)]
struct PersistedIndex {
    format_version: u32,
    dimension: usize,
    model_id: String,
    records: Vec<IndexRecord>,
}

const FORMAT_VERSION: u32 = 1;

pub struct VectorIndex {
    dimension: usize,
    model_id: String,
    records: Vec<IndexRecord>,
}

impl VectorIndex {
    /// Build an index from chunks and their embeddings, one per chunk in the
    /// same order.
    ///
    /// # Errors
    ///
    /// - [`RagError::EmptyCorpus`] on zero chunks — a silently empty index
    ///   would make every query return no context
    /// - [`RagError::ChunkCountMismatch`] if counts differ
    /// - [`RagError::DimensionMismatch`] / [`RagError::InvalidVector`] on a
    ///   malformed embedding
    pub fn build(
        chunks: Vec<Chunk>,
        embeddings: Vec<Vec<f32>>,
        dimension: usize,
        model_id: &str,
    ) -> Result<Self, RagError> {
        if chunks.is_empty() {
            return Err(RagError::EmptyCorpus);
        }
        if chunks.len() != embeddings.len() {
            return Err(RagError::ChunkCountMismatch {
                chunks: chunks.len(),
                embeddings: embeddings.len(),
            });
        }

        let mut records = Vec::with_capacity(chunks.len());
        for (chunk, mut vector) in chunks.into_iter().zip(embeddings) {
            if vector.len() != dimension {
                return Err(RagError::DimensionMismatch {
                    expected: dimension,
                    actual: vector.len(),
                });
            }
            if vector.iter().any(|v| !v.is_finite()) {
                return Err(RagError::InvalidVector(format!(
                    "chunk {} of '{}' has a NaN or Infinity embedding",
                    chunk.sequence_index, chunk.source_document
                )));
            }
            normalize(&mut vector);
            records.push(IndexRecord { vector, chunk });
        }

        Ok(Self {
            dimension,
            model_id: model_id.to_string(),
            records,
        })
    }

    /// Top-k chunks by cosine similarity, descending; ties resolve by
    /// insertion order (stable sort over a Vec, never map iteration order).
    pub fn search(&self, query: &[f32], k: usize) -> Result<Vec<ScoredChunk>, RagError> {
        if query.len() != self.dimension {
            return Err(RagError::DimensionMismatch {
                expected: self.dimension,
                actual: query.len(),
            });
        }
        if query.iter().any(|v| !v.is_finite()) {
            return Err(RagError::InvalidVector(
                "query contains NaN or Infinity".into(),
            ));
        }

        let mut query = query.to_vec();
        normalize(&mut query);

        let mut results: Vec<ScoredChunk> = self
            .records
            .iter()
            .map(|record| ScoredChunk {
                score: dot(&query, &record.vector),
                chunk: record.chunk.clone(),
            })
            .collect();

        results.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
        results.truncate(k);
        Ok(results)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }

    pub fn model_id(&self) -> &str {
        &self.model_id
    }

    /// Serialize the index to a single binary file
    pub fn save(&self, path: &Path) -> Result<(), RagError> {
        let persisted = PersistedIndex {
            format_version: FORMAT_VERSION,
            dimension: self.dimension,
            model_id: self.model_id.clone(),
            records: self
                .records
                .iter()
                .map(|r| IndexRecord {
                    vector: r.vector.clone(),
                    chunk: r.chunk.clone(),
                })
                .collect(),
        };
        let bytes = bincode::serialize(&persisted).map_err(|e| RagError::IndexPersistence {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, bytes)?;
        info!(path = %path.display(), vectors = self.records.len(), "index saved");
        Ok(())
    }

    /// Load a persisted index, bound to the embedding provider that will
    /// serve its queries.
    ///
    /// # Errors
    ///
    /// Fatal if the file is unreadable or corrupt, or if the recorded
    /// dimension/model id do not match the provider — a mismatched load
    /// would produce silent garbage rankings.
    pub fn load(path: &Path, provider: &dyn EmbeddingProvider) -> Result<Self, RagError> {
        let bytes = std::fs::read(path).map_err(|e| RagError::IndexPersistence {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
        let persisted: PersistedIndex =
            bincode::deserialize(&bytes).map_err(|e| RagError::IndexPersistence {
                path: path.to_path_buf(),
                reason: format!("malformed index file: {}", e),
            })?;

        if persisted.format_version != FORMAT_VERSION {
            return Err(RagError::IndexPersistence {
                path: path.to_path_buf(),
                reason: format!(
                    "unsupported format version {} (expected {})",
                    persisted.format_version, FORMAT_VERSION
                ),
            });
        }
        if persisted.dimension != provider.dimension() {
            return Err(RagError::DimensionMismatch {
                expected: persisted.dimension,
                actual: provider.dimension(),
            });
        }
        if persisted.model_id != provider.model_id() {
            return Err(RagError::ModelMismatch {
                expected: persisted.model_id,
                actual: provider.model_id().to_string(),
            });
        }

        info!(
            path = %path.display(),
            vectors = persisted.records.len(),
            model = %persisted.model_id,
            "index loaded"
        );
        Ok(Self {
            dimension: persisted.dimension,
            model_id: persisted.model_id,
            records: persisted.records,
        })
    }
}

fn dot(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b.iter()).map(|(x, y)| x * y).sum()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embeddings::HashEmbeddings;

    fn chunk(text: &str, seq: usize) -> Chunk {
        Chunk {
            text: text.to_string(),
            source_document: "doc.pdf".to_string(),
            page_start: 1,
            page_end: 1,
            sequence_index: seq,
            start_offset: None,
        }
    }

    fn small_index() -> VectorIndex {
        VectorIndex::build(
            vec![chunk("norte", 0), chunk("leste", 1)],
            vec![vec![1.0, 0.0], vec![0.0, 1.0]],
            2,
            "test-model",
        )
        .unwrap()
    }

    #[test]
    fn test_build_empty_is_an_error() {
        let result = VectorIndex::build(vec![], vec![], 2, "test-model");
        assert!(matches!(result, Err(RagError::EmptyCorpus)));
    }

    #[test]
    fn test_build_count_mismatch() {
        let result = VectorIndex::build(vec![chunk("a", 0)], vec![], 2, "test-model");
        assert!(matches!(result, Err(RagError::ChunkCountMismatch { .. })));
    }

    #[test]
    fn test_build_dimension_mismatch() {
        let result =
            VectorIndex::build(vec![chunk("a", 0)], vec![vec![1.0, 0.0, 0.0]], 2, "test-model");
        assert!(matches!(result, Err(RagError::DimensionMismatch { .. })));
    }

    #[test]
    fn test_build_rejects_nan() {
        let result =
            VectorIndex::build(vec![chunk("a", 0)], vec![vec![f32::NAN, 0.0]], 2, "test-model");
        assert!(matches!(result, Err(RagError::InvalidVector(_))));
    }

    #[test]
    fn test_search_orders_by_similarity() {
        let index = small_index();
        let results = index.search(&[0.9, 0.1], 2).unwrap();
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].chunk.text, "norte");
        assert!(results[0].score > results[1].score);
    }

    #[test]
    fn test_search_ties_resolve_by_insertion_order() {
        let index = VectorIndex::build(
            vec![chunk("primeiro", 0), chunk("segundo", 1), chunk("terceiro", 2)],
            vec![vec![1.0, 0.0], vec![1.0, 0.0], vec![1.0, 0.0]],
            2,
            "test-model",
        )
        .unwrap();
        let results = index.search(&[1.0, 0.0], 3).unwrap();
        let order: Vec<&str> = results.iter().map(|r| r.chunk.text.as_str()).collect();
        assert_eq!(order, vec!["primeiro", "segundo", "terceiro"]);
    }

    #[test]
    fn test_search_truncates_to_k() {
        let index = small_index();
        assert_eq!(index.search(&[1.0, 0.0], 1).unwrap().len(), 1);
    }

    #[test]
    fn test_search_validates_query() {
        let index = small_index();
        assert!(index.search(&[1.0], 1).is_err());
        assert!(index.search(&[f32::NAN, 0.0], 1).is_err());
    }

    #[test]
    fn test_save_load_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("index.bin");

        let provider = HashEmbeddings::new(2);
        let index = VectorIndex::build(
            vec![chunk("norte", 0)],
            vec![vec![1.0, 0.0]],
            2,
            provider.model_id(),
        )
        .unwrap();
        index.save(&path).unwrap();

        let loaded = VectorIndex::load(&path, &provider).unwrap();
        assert_eq!(loaded.len(), 1);
        let top = &loaded.search(&[1.0, 0.0], 1).unwrap()[0];
        assert_eq!(top.chunk.text, "norte");
        assert!(top.score > 0.95);
    }

    #[test]
    fn test_load_rejects_wrong_dimension() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("index.bin");
        let index = small_index();
        index.save(&path).unwrap();

        // Provider with a different dimension than the index was built with
        let wrong = HashEmbeddings::new(384);
        assert!(matches!(
            VectorIndex::load(&path, &wrong),
            Err(RagError::DimensionMismatch { .. })
        ));
    }

    #[test]
    fn test_load_rejects_wrong_model() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("index.bin");
        let provider = HashEmbeddings::new(2);
        let index = VectorIndex::build(
            vec![chunk("norte", 0)],
            vec![vec![1.0, 0.0]],
            2,
            "some-other-model",
        )
        .unwrap();
        index.save(&path).unwrap();

        assert!(matches!(
            VectorIndex::load(&path, &provider),
            Err(RagError::ModelMismatch { .. })
        ));
    }

    #[test]
    fn test_load_rejects_garbage_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("index.bin");
        std::fs::write(&path, b"\xde\xad\xbe\xef this is not an index").unwrap();
        let provider = HashEmbeddings::new(2);
        assert!(matches!(
            VectorIndex::load(&path, &provider),
            Err(RagError::IndexPersistence { .. })
        ));
    }
}
