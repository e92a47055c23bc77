// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Deterministic offline embeddings via feature hashing
//!
//! Bag-of-words vectors: each lowercase token is hashed into a bucket with a
//! hash-derived sign, then the vector is L2-normalized. Texts sharing tokens
//! land near each other, which is enough for pipeline tests and dry runs with
//! no model host. Not a semantic model — retrieval quality numbers measured
//! with this provider are meaningless.

use crate::embeddings::{normalize, EmbeddingProvider};
use crate::errors::RagError;
use async_trait::async_trait;
use sha2::{Digest, Sha256};

/// Offline embedding provider with deterministic, order-independent output
pub struct HashEmbeddings {
    dimension: usize,
    model_id: String,
}

impl HashEmbeddings {
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension,
            model_id: format!("hash-embeddings-{}", dimension),
        }
    }

    fn embed(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0.0f32; self.dimension];
        for token in tokenize(text) {
            let digest = Sha256::digest(token.as_bytes());
            let bucket = u64::from_le_bytes(digest[0..8].try_into().unwrap()) as usize
                % self.dimension;
            let sign = if digest[8] & 1 == 0 { 1.0 } else { -1.0 };
            vector[bucket] += sign;
        }
        normalize(&mut vector);
        vector
    }
}

fn tokenize(text: &str) -> impl Iterator<Item = String> + '_ {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(|t| t.to_lowercase())
}

#[async_trait]
impl EmbeddingProvider for HashEmbeddings {
    async fn embed_many(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, RagError> {
        Ok(texts.iter().map(|t| self.embed(t)).collect())
    }

    async fn embed_one(&self, text: &str) -> Result<Vec<f32>, RagError> {
        Ok(self.embed(text))
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn model_id(&self) -> &str {
        &self.model_id
    }

    async fn health_check(&self) -> Result<(), RagError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embeddings::cosine_similarity;

    #[tokio::test]
    async fn test_deterministic_across_calls() {
        let provider = HashEmbeddings::new(64);
        let a = provider.embed_one("Extrato de contrato nº 54").await.unwrap();
        let b = provider.embed_one("Extrato de contrato nº 54").await.unwrap();
        assert_eq!(a, b);
        assert_eq!(a.len(), 64);
    }

    #[tokio::test]
    async fn test_batch_and_single_agree() {
        // Correctness property: no dependence on batch composition
        let provider = HashEmbeddings::new(64);
        let texts = vec!["primeira cláusula".to_string(), "segunda cláusula".to_string()];
        let batch = provider.embed_many(&texts).await.unwrap();
        let single = provider.embed_one(&texts[1]).await.unwrap();
        assert_eq!(batch[1], single);
    }

    #[tokio::test]
    async fn test_shared_tokens_raise_similarity() {
        let provider = HashEmbeddings::new(128);
        let a = provider.embed_one("O CNPJ da empresa é 12.345.678/0001-99.").await.unwrap();
        let b = provider.embed_one("Qual o CNPJ da empresa?").await.unwrap();
        let c = provider.embed_one("Prazo de vigência de doze meses.").await.unwrap();
        assert!(cosine_similarity(&a, &b) > cosine_similarity(&a, &c));
    }

    #[tokio::test]
    async fn test_output_is_normalized() {
        let provider = HashEmbeddings::new(64);
        let v = provider.embed_one("administração regional do guará").await.unwrap();
        let magnitude: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((magnitude - 1.0).abs() < 1e-5);
    }
}
