// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Pipeline configuration
//!
//! Loaded from a TOML file, with `.env`/environment handled by the CLI layer.
//! The corpus-tuned knobs (`similarity_threshold`, `max_chunk_chars`) have no
//! safe universal default and must be present in the file; retrieval quality
//! is sensitive to both.

use crate::errors::RagError;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Segmentation strategy selector
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SegmenterStrategy {
    /// Overlapping fixed-size character windows
    FixedWindow,
    /// Embedding-similarity topic boundaries with a hard size cap
    Semantic,
}

/// When the cross-encoder re-ranking pass runs
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "mode")]
pub enum RerankPolicy {
    /// Re-rank every query
    Always,
    /// Never re-rank; retriever output is truncated to top-N
    Never,
    /// Re-rank only when the bi-encoder top score falls below `cutoff`
    BelowConfidence { cutoff: f32 },
}

/// Chunking knobs shared by both segmentation strategies
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChunkingConfig {
    /// Fixed-window size in characters
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,

    /// Characters shared between consecutive windows (must be < chunk_size)
    #[serde(default = "default_chunk_overlap")]
    pub chunk_overlap: usize,

    /// Hard cap on emitted chunk text length. Corpus-tuned, required.
    pub max_chunk_chars: usize,

    /// Chunks shorter than this are discarded as noise
    #[serde(default = "default_min_chunk_chars")]
    pub min_chunk_chars: usize,

    /// Extracted blocks shorter than this are layout noise (headers, page numbers)
    #[serde(default = "default_min_block_chars")]
    pub min_block_chars: usize,

    /// Adjacent-paragraph cosine similarity below this marks a topic boundary.
    /// Corpus-tuned, required.
    pub similarity_threshold: f32,
}

fn default_chunk_size() -> usize {
    400
}
fn default_chunk_overlap() -> usize {
    100
}
fn default_min_chunk_chars() -> usize {
    100
}
fn default_min_block_chars() -> usize {
    50
}

/// One model endpoint (embedding, generation or cross-encoder host)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelEndpoint {
    pub url: String,
    pub model: String,
}

/// Retrieval and re-ranking parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievalConfig {
    /// Broad recall pass size
    #[serde(default = "default_k")]
    pub k: usize,

    /// Candidates kept after re-ranking / truncation (context budget)
    #[serde(default = "default_top_n")]
    pub top_n: usize,

    #[serde(default = "default_rerank_policy")]
    pub rerank: RerankPolicy,
}

fn default_k() -> usize {
    20
}
fn default_top_n() -> usize {
    3
}
fn default_rerank_policy() -> RerankPolicy {
    RerankPolicy::Never
}

/// Prompt template and refusal contract
///
/// `{context}` and `{question}` are substituted at answer time. The refusal
/// phrase is an exact string the caller (and tests) can match on.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PromptConfig {
    #[serde(default = "default_prompt_template")]
    pub template: String,

    #[serde(default = "default_refusal_phrase")]
    pub refusal_phrase: String,
}

impl Default for PromptConfig {
    fn default() -> Self {
        Self {
            template: default_prompt_template(),
            refusal_phrase: default_refusal_phrase(),
        }
    }
}

fn default_prompt_template() -> String {
    "Você é um assistente de IA especialista em analisar extratos de contratos \
do Diário Oficial. Sua única tarefa é extrair informações precisas do texto de \
contexto fornecido para responder à pergunta do usuário.

Regras:
1. Use APENAS o texto fornecido na seção 'Contexto'. Não use nenhum conhecimento prévio.
2. Se a pergunta pedir um valor monetário específico, responda APENAS o valor (ex: \"R$ 286.696,80\").
3. Se a pergunta pedir uma informação textual, responda de forma concisa e direta.
4. Se a informação exata não estiver no contexto, responda exatamente: \"{refusal}\"

Contexto:
{context}

Pergunta: {question}

Resposta:"
        .to_string()
}

fn default_refusal_phrase() -> String {
    "Informação não disponível no contexto.".to_string()
}

/// Top-level pipeline configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RagConfig {
    /// Directory of corpus PDFs
    pub pdf_dir: PathBuf,

    /// Persisted index blob
    pub index_path: PathBuf,

    #[serde(default = "default_strategy")]
    pub segmenter: SegmenterStrategy,

    pub chunking: ChunkingConfig,

    /// Embedding model host. Index build and query time must use the same one.
    pub embedding: ModelEndpoint,

    /// Embedding dimension expected from the model above
    pub embedding_dimension: usize,

    /// Generation model host
    pub generation: ModelEndpoint,

    /// Cross-encoder scoring host; required when rerank policy is not `never`
    #[serde(default)]
    pub cross_encoder: Option<ModelEndpoint>,

    /// Single timeout applied to every external model call
    #[serde(default = "default_timeout_secs")]
    pub request_timeout_secs: u64,

    /// Temperature pinned to 0 for reproducible factual extraction
    #[serde(default = "default_deterministic")]
    pub deterministic: bool,

    /// Documents processed concurrently during index build
    #[serde(default = "default_build_concurrency")]
    pub build_concurrency: usize,

    #[serde(default)]
    pub retrieval: RetrievalConfig,

    #[serde(default)]
    pub prompt: PromptConfig,

    /// Suggestions printed at chat startup
    #[serde(default)]
    pub example_questions: Vec<String>,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            k: default_k(),
            top_n: default_top_n(),
            rerank: default_rerank_policy(),
        }
    }
}

fn default_strategy() -> SegmenterStrategy {
    SegmenterStrategy::Semantic
}
fn default_timeout_secs() -> u64 {
    60
}
fn default_deterministic() -> bool {
    true
}
fn default_build_concurrency() -> usize {
    4
}

impl RagConfig {
    /// Load and validate a TOML configuration file
    pub fn from_file(path: &Path) -> Result<Self, RagError> {
        let raw = std::fs::read_to_string(path).map_err(|e| {
            RagError::Config(format!("cannot read config file {}: {}", path.display(), e))
        })?;
        let config: RagConfig = toml::from_str(&raw)
            .map_err(|e| RagError::Config(format!("invalid config file: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// Reject configurations that would produce garbage downstream
    pub fn validate(&self) -> Result<(), RagError> {
        let c = &self.chunking;
        if c.chunk_overlap >= c.chunk_size {
            return Err(RagError::Config(format!(
                "chunk_overlap ({}) must be smaller than chunk_size ({})",
                c.chunk_overlap, c.chunk_size
            )));
        }
        if !(c.similarity_threshold > 0.0 && c.similarity_threshold < 1.0) {
            return Err(RagError::Config(format!(
                "similarity_threshold must be in (0, 1), got {}",
                c.similarity_threshold
            )));
        }
        if c.max_chunk_chars < c.min_chunk_chars {
            return Err(RagError::Config(format!(
                "max_chunk_chars ({}) must be >= min_chunk_chars ({})",
                c.max_chunk_chars, c.min_chunk_chars
            )));
        }
        // The hard cap binds both strategies; fixed windows are cut at
        // chunk_size, so that size may not exceed the cap
        if c.chunk_size > c.max_chunk_chars {
            return Err(RagError::Config(format!(
                "chunk_size ({}) must not exceed max_chunk_chars ({})",
                c.chunk_size, c.max_chunk_chars
            )));
        }
        if self.retrieval.top_n == 0 || self.retrieval.k < self.retrieval.top_n {
            return Err(RagError::Config(format!(
                "retrieval requires 1 <= top_n ({}) <= k ({})",
                self.retrieval.top_n, self.retrieval.k
            )));
        }
        if self.embedding_dimension == 0 {
            return Err(RagError::Config("embedding_dimension must be non-zero".into()));
        }
        if self.build_concurrency == 0 {
            return Err(RagError::Config("build_concurrency must be non-zero".into()));
        }
        if !self.prompt.template.contains("{context}")
            || !self.prompt.template.contains("{question}")
        {
            return Err(RagError::Config(
                "prompt template must contain {context} and {question} slots".into(),
            ));
        }
        if !matches!(self.retrieval.rerank, RerankPolicy::Never) && self.cross_encoder.is_none() {
            return Err(RagError::Config(
                "rerank policy requires a [cross_encoder] endpoint".into(),
            ));
        }
        if let RerankPolicy::BelowConfidence { cutoff } = self.retrieval.rerank {
            if !(0.0..=1.0).contains(&cutoff) {
                return Err(RagError::Config(format!(
                    "rerank cutoff must be in [0, 1], got {}",
                    cutoff
                )));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
pub(crate) fn test_config() -> RagConfig {
    RagConfig {
        pdf_dir: PathBuf::from("data/pdfs"),
        index_path: PathBuf::from("data/index.bin"),
        segmenter: SegmenterStrategy::Semantic,
        chunking: ChunkingConfig {
            chunk_size: 400,
            chunk_overlap: 100,
            max_chunk_chars: 1000,
            min_chunk_chars: 100,
            min_block_chars: 50,
            similarity_threshold: 0.75,
        },
        embedding: ModelEndpoint {
            url: "http://localhost:11434".into(),
            model: "mxbai-embed-large".into(),
        },
        embedding_dimension: 64,
        generation: ModelEndpoint {
            url: "http://localhost:11434".into(),
            model: "deepseek-r1:8b".into(),
        },
        cross_encoder: None,
        request_timeout_secs: 60,
        deterministic: true,
        build_concurrency: 4,
        retrieval: RetrievalConfig::default(),
        prompt: PromptConfig::default(),
        example_questions: vec![],
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_config_passes() {
        assert!(test_config().validate().is_ok());
    }

    #[test]
    fn test_overlap_must_be_smaller_than_size() {
        let mut config = test_config();
        config.chunking.chunk_overlap = 400;
        assert!(matches!(config.validate(), Err(RagError::Config(_))));
    }

    #[test]
    fn test_window_size_bounded_by_chunk_cap() {
        // Otherwise the fixed-window strategy would emit chunks over the cap
        let mut config = test_config();
        config.chunking.chunk_size = 2000;
        config.chunking.chunk_overlap = 100;
        assert!(matches!(config.validate(), Err(RagError::Config(_))));
    }

    #[test]
    fn test_threshold_out_of_range() {
        let mut config = test_config();
        config.chunking.similarity_threshold = 1.5;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_top_n_cannot_exceed_k() {
        let mut config = test_config();
        config.retrieval.k = 2;
        config.retrieval.top_n = 5;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_rerank_requires_cross_encoder() {
        let mut config = test_config();
        config.retrieval.rerank = RerankPolicy::Always;
        config.cross_encoder = None;
        assert!(config.validate().is_err());

        config.cross_encoder = Some(ModelEndpoint {
            url: "http://localhost:8080".into(),
            model: "ms-marco-minilm".into(),
        });
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_template_must_have_slots() {
        let mut config = test_config();
        config.prompt.template = "no slots here".into();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_corpus_tuned_fields_are_required() {
        // max_chunk_chars and similarity_threshold carry no serde default
        let toml_missing = r#"
            pdf_dir = "data/pdfs"
            index_path = "data/index.bin"
            embedding_dimension = 384

            [chunking]
            chunk_size = 400

            [embedding]
            url = "http://localhost:11434"
            model = "mxbai-embed-large"

            [generation]
            url = "http://localhost:11434"
            model = "deepseek-r1:8b"
        "#;
        assert!(toml::from_str::<RagConfig>(toml_missing).is_err());
    }
}
