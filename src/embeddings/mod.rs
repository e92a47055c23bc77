// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Embedding providers
//!
//! Text → fixed-length vector, used both at index-build time and at query
//! time. An index is bound to the provider that built it: same model, same
//! dimension, or similarity scores are meaningless. Providers return
//! L2-normalized vectors so that cosine similarity reduces to a dot product.

pub mod hash;
pub mod ollama;

pub use hash::HashEmbeddings;
pub use ollama::OllamaEmbeddings;

use crate::errors::RagError;
use async_trait::async_trait;

/// Converts text to fixed-length numeric vectors
///
/// Both methods must be deterministic for a fixed model and input: the
/// segmenter embeds in bulk while retrieval embeds singly, and the two must
/// agree. `health_check` runs at startup so an unreachable endpoint fails
/// fast instead of mid-batch — a half-built index is worse than no index.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    async fn embed_many(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, RagError>;

    async fn embed_one(&self, text: &str) -> Result<Vec<f32>, RagError>;

    fn dimension(&self) -> usize;

    fn model_id(&self) -> &str;

    async fn health_check(&self) -> Result<(), RagError>;
}

/// Normalize a vector to unit length (L2 norm). Zero vectors are left as-is.
pub fn normalize(vector: &mut [f32]) {
    let magnitude: f32 = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
    if magnitude > 0.0 && magnitude.is_finite() {
        for value in vector.iter_mut() {
            *value /= magnitude;
        }
    }
}

/// Cosine similarity between two vectors. Mismatched dimensions score 0.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() {
        return 0.0;
    }
    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let mag_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let mag_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if mag_a == 0.0 || mag_b == 0.0 {
        0.0
    } else {
        dot / (mag_a * mag_b)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_unit_length() {
        let mut v = vec![3.0, 4.0];
        normalize(&mut v);
        assert!((v[0] - 0.6).abs() < 1e-6);
        assert!((v[1] - 0.8).abs() < 1e-6);
        let magnitude: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((magnitude - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_normalize_zero_vector_unchanged() {
        let mut v = vec![0.0, 0.0, 0.0];
        normalize(&mut v);
        assert_eq!(v, vec![0.0, 0.0, 0.0]);
    }

    #[test]
    fn test_cosine_similarity() {
        assert!((cosine_similarity(&[1.0, 0.0], &[1.0, 0.0]) - 1.0).abs() < 1e-6);
        assert!(cosine_similarity(&[1.0, 0.0], &[0.0, 1.0]).abs() < 1e-6);
        // Mismatched dimensions score zero rather than panic
        assert_eq!(cosine_similarity(&[1.0, 0.0], &[1.0]), 0.0);
    }
}
