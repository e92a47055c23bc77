// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Answer generation
//!
//! Assembles a bounded prompt from the retrieved chunks plus the question,
//! invokes the generation model once, and returns the raw output together
//! with the chunks that were actually included — the citations. Stateless: a
//! pure function of (question, chunks, template). Retries belong to the
//! caller, not this layer.
//!
//! The template and its refusal phrase are configuration, not code, so the
//! pipeline can be pointed at a different document domain without edits. The
//! refusal phrase is an exact string contract the caller and the tests match
//! on.

use crate::config::PromptConfig;
use crate::errors::RagError;
use crate::segment::Chunk;
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::time::Duration;
use tracing::info;

const CONTEXT_JOINER: &str = "\n\n";

/// Prompt template with `{context}`, `{question}` and `{refusal}` slots
#[derive(Debug, Clone)]
pub struct PromptTemplate {
    template: String,
    refusal_phrase: String,
}

impl PromptTemplate {
    pub fn new(config: &PromptConfig) -> Self {
        Self {
            template: config.template.clone(),
            refusal_phrase: config.refusal_phrase.clone(),
        }
    }

    pub fn refusal_phrase(&self) -> &str {
        &self.refusal_phrase
    }

    pub fn render(&self, context: &str, question: &str) -> String {
        self.template
            .replace("{refusal}", &self.refusal_phrase)
            .replace("{context}", context)
            .replace("{question}", question)
    }
}

/// prompt → text, one shot, no conversation state
#[async_trait]
pub trait GenerationModel: Send + Sync {
    async fn generate(&self, prompt: &str) -> Result<String, RagError>;

    async fn health_check(&self) -> Result<(), RagError>;
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    response: String,
}

#[derive(Debug, Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    stream: bool,
    options: serde_json::Value,
}

/// Generation client for an Ollama host
pub struct OllamaGenerator {
    client: Client,
    base_url: String,
    model: String,
    deterministic: bool,
    timeout_secs: u64,
}

impl OllamaGenerator {
    /// `deterministic` pins temperature to 0 for reproducible factual
    /// extraction.
    pub fn new(
        base_url: &str,
        model: &str,
        deterministic: bool,
        timeout: Duration,
    ) -> Result<Self, RagError> {
        reqwest::Url::parse(base_url).map_err(|e| {
            RagError::Config(format!("invalid generation URL '{}': {}", base_url, e))
        })?;
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| RagError::Config(format!("failed to build HTTP client: {}", e)))?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            model: model.to_string(),
            deterministic,
            timeout_secs: timeout.as_secs(),
        })
    }
}

#[async_trait]
impl GenerationModel for OllamaGenerator {
    async fn generate(&self, prompt: &str) -> Result<String, RagError> {
        let url = format!("{}/api/generate", self.base_url);
        let options = if self.deterministic {
            json!({ "temperature": 0.0 })
        } else {
            json!({})
        };
        let response = self
            .client
            .post(&url)
            .json(&GenerateRequest {
                model: &self.model,
                prompt,
                stream: false,
                options,
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

        let parsed: GenerateResponse = response
            .json()
            .await
            .map_err(|e| RagError::from_request(&url, self.timeout_secs, e))?;
        Ok(parsed.response.trim().to_string())
    }

    async fn health_check(&self) -> Result<(), RagError> {
        self.generate("Olá! Teste de LLM. Responda 'ok'.")
            .await
            .map_err(|e| RagError::EndpointUnreachable {
                endpoint: self.base_url.clone(),
                reason: e.to_string(),
            })?;
        info!(model = %self.model, url = %self.base_url, "generation model reachable");
        Ok(())
    }
}

/// Final answer plus the chunks cited in the prompt
#[derive(Debug, Clone)]
pub struct Answer {
    pub text: String,
    pub supporting_chunks: Vec<Chunk>,
}

/// Builds the prompt and invokes the generation model
pub struct AnswerGenerator {
    template: PromptTemplate,
}

impl AnswerGenerator {
    pub fn new(template: PromptTemplate) -> Self {
        Self { template }
    }

    pub fn refusal_phrase(&self) -> &str {
        self.template.refusal_phrase()
    }

    /// Answer `question` from the supplied context chunks.
    ///
    /// Zero chunks still renders the prompt with empty context and invokes
    /// the model, so the refusal phrase comes out of the one code path the
    /// template defines — never an ad hoc message assembled here.
    pub async fn answer(
        &self,
        model: &dyn GenerationModel,
        question: &str,
        chunks: Vec<Chunk>,
    ) -> Result<Answer, RagError> {
        let context = chunks
            .iter()
            .map(|c| c.text.as_str())
            .collect::<Vec<_>>()
            .join(CONTEXT_JOINER);
        let prompt = self.template.render(&context, question);
        let text = model.generate(&prompt).await?;
        Ok(Answer {
            text,
            supporting_chunks: chunks,
        })
    }
}
