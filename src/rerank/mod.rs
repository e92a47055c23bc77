// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Cross-encoder re-ranking
//!
//! The bi-encoder retrieval pass is a recall-oriented coarse filter; a
//! cross-encoder jointly attending over (question, passage) is far more
//! precise at ranking but too expensive to run over the whole corpus. So it
//! runs only over the top-K candidates, keeping the top-N. Whether it runs at
//! all is a configurable policy: always, never, or only when the bi-encoder's
//! top score looks unconfident.

use crate::config::RerankPolicy;
use crate::errors::RagError;
use crate::vector::ScoredChunk;
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

/// Scores (question, passage) pairs with a joint relevance model
#[async_trait]
pub trait Reranker: Send + Sync {
    /// One score per passage, in input order; higher is more relevant
    async fn score(&self, question: &str, passages: &[String]) -> Result<Vec<f32>, RagError>;
}

#[derive(Debug, Serialize)]
struct RerankRequest<'a> {
    model: &'a str,
    query: &'a str,
    documents: &'a [String],
}

#[derive(Debug, Deserialize)]
struct RerankEntry {
    index: usize,
    score: f32,
}

/// HTTP client for a cross-encoder scoring host
///
/// Expects a `/rerank` endpoint returning `[{"index": i, "score": s}, ...]`
/// (the response shape of text-embeddings-inference style rerankers).
pub struct CrossEncoderClient {
    client: Client,
    base_url: String,
    model: String,
    timeout_secs: u64,
}

impl CrossEncoderClient {
    pub fn new(base_url: &str, model: &str, timeout: Duration) -> Result<Self, RagError> {
        reqwest::Url::parse(base_url).map_err(|e| {
            RagError::Config(format!("invalid cross-encoder URL '{}': {}", base_url, e))
        })?;
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| RagError::Config(format!("failed to build HTTP client: {}", e)))?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            model: model.to_string(),
            timeout_secs: timeout.as_secs(),
        })
    }
}

#[async_trait]
impl Reranker for CrossEncoderClient {
    async fn score(&self, question: &str, passages: &[String]) -> Result<Vec<f32>, RagError> {
        if passages.is_empty() {
            return Ok(Vec::new());
        }
        let url = format!("{}/rerank", self.base_url);
        let response = self
            .client
            .post(&url)
            .json(&RerankRequest {
                model: &self.model,
                query: question,
                documents: passages,
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

        let entries: Vec<RerankEntry> = response
            .json()
            .await
            .map_err(|e| RagError::from_request(&url, self.timeout_secs, e))?;

        // Responses arrive sorted by score; restore input order
        let mut scores = vec![f32::MIN; passages.len()];
        for entry in entries {
            if entry.index >= passages.len() {
                return Err(RagError::ModelRequest {
                    endpoint: url,
                    reason: format!("re-ranker returned out-of-range index {}", entry.index),
                });
            }
            scores[entry.index] = entry.score;
        }
        Ok(scores)
    }
}

/// Decide whether this query gets a re-ranking pass
fn should_rerank(policy: &RerankPolicy, candidates: &[ScoredChunk]) -> bool {
    match policy {
        RerankPolicy::Always => true,
        RerankPolicy::Never => false,
        RerankPolicy::BelowConfidence { cutoff } => candidates
            .first()
            .map(|top| top.score < *cutoff)
            .unwrap_or(false),
    }
}

/// Apply the configured re-ranking policy to retrieval candidates and keep
/// the top-N. When re-ranking is skipped, the bi-encoder order is kept and
/// truncated to N — the context budget still applies.
pub async fn apply_rerank(
    policy: &RerankPolicy,
    reranker: Option<&dyn Reranker>,
    question: &str,
    mut candidates: Vec<ScoredChunk>,
    top_n: usize,
) -> Result<Vec<ScoredChunk>, RagError> {
    let reranker = match (should_rerank(policy, &candidates), reranker) {
        (true, Some(r)) => r,
        _ => {
            candidates.truncate(top_n);
            return Ok(candidates);
        }
    };

    let passages: Vec<String> = candidates.iter().map(|c| c.chunk.text.clone()).collect();
    let scores = reranker.score(question, &passages).await?;
    debug!(candidates = candidates.len(), top_n, "re-ranking pass");

    for (candidate, score) in candidates.iter_mut().zip(scores) {
        candidate.score = score;
    }
    candidates
        .sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
    candidates.truncate(top_n);
    Ok(candidates)
}
