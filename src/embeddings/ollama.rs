// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Ollama embedding client
//!
//! Talks to an Ollama host's `/api/embed` endpoint. One batched request per
//! document's paragraph set amortizes the network round-trip, which dominates
//! index-build time on remote hosts.

use crate::embeddings::{normalize, EmbeddingProvider};
use crate::errors::RagError;
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::info;

#[derive(Debug, Serialize)]
struct EmbedRequest<'a> {
    model: &'a str,
    input: &'a [String],
}

#[derive(Debug, Deserialize)]
struct EmbedResponse {
    embeddings: Vec<Vec<f32>>,
}

/// Embedding provider backed by an Ollama host
pub struct OllamaEmbeddings {
    client: Client,
    base_url: String,
    model: String,
    dimension: usize,
    timeout_secs: u64,
}

impl OllamaEmbeddings {
    /// Create a client bound to one host and model
    ///
    /// # Errors
    ///
    /// Returns a configuration error if the URL is invalid or the HTTP
    /// client cannot be built.
    pub fn new(
        base_url: &str,
        model: &str,
        dimension: usize,
        timeout: Duration,
    ) -> Result<Self, RagError> {
        reqwest::Url::parse(base_url)
            .map_err(|e| RagError::Config(format!("invalid embedding URL '{}': {}", base_url, e)))?;
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| RagError::Config(format!("failed to build HTTP client: {}", e)))?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            model: model.to_string(),
            dimension,
            timeout_secs: timeout.as_secs(),
        })
    }

    async fn request(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, RagError> {
        let url = format!("{}/api/embed", self.base_url);
        let response = self
            .client
            .post(&url)
            .json(&EmbedRequest {
                model: &self.model,
                input: texts,
            })
            .send()
            .await
            .map_err(|e| RagError::from_request(&url, self.timeout_secs, e))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(RagError::ModelRequest {
                endpoint: url,
                reason: format!("status {}: {}", status, body),
            });
        }

        let parsed: EmbedResponse = response
            .json()
            .await
            .map_err(|e| RagError::from_request(&url, self.timeout_secs, e))?;

        if parsed.embeddings.len() != texts.len() {
            return Err(RagError::ModelRequest {
                endpoint: url,
                reason: format!(
                    "expected {} embeddings, got {}",
                    texts.len(),
                    parsed.embeddings.len()
                ),
            });
        }

        let mut vectors = parsed.embeddings;
        for vector in &mut vectors {
            if vector.len() != self.dimension {
                return Err(RagError::DimensionMismatch {
                    expected: self.dimension,
                    actual: vector.len(),
                });
            }
            normalize(vector);
        }
        Ok(vectors)
    }
}

#[async_trait]
impl EmbeddingProvider for OllamaEmbeddings {
    async fn embed_many(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, RagError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        self.request(texts).await
    }

    async fn embed_one(&self, text: &str) -> Result<Vec<f32>, RagError> {
        let mut vectors = self.request(std::slice::from_ref(&text.to_string())).await?;
        Ok(vectors.remove(0))
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn model_id(&self) -> &str {
        &self.model
    }

    /// Probe the endpoint with a tiny embedding request. Called at startup so
    /// a bad host or model name is a fatal configuration error, not a failure
    /// halfway through an index build.
    async fn health_check(&self) -> Result<(), RagError> {
        self.embed_one("Teste de embedding inicial.")
            .await
            .map_err(|e| RagError::EndpointUnreachable {
                endpoint: self.base_url.clone(),
                reason: e.to_string(),
            })?;
        info!(model = %self.model, url = %self.base_url, "embedding model reachable");
        Ok(())
    }
}
