// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Error taxonomy for the RAG pipeline
//!
//! Three classes of failure with different handling policies:
//! - Configuration errors (unreachable endpoint, dimension mismatch on load,
//!   empty corpus): fatal, reported immediately, never retried here.
//! - Per-document errors (corrupt PDF): recovered locally, the document is
//!   skipped and processing continues.
//! - Per-query errors (generation timeout, model request failure): surfaced
//!   to the caller as structured failures, distinct from "no answer found".

use std::path::PathBuf;
use thiserror::Error;

/// Errors produced by the RAG pipeline
#[derive(Error, Debug)]
pub enum RagError {
    /// Invalid or incomplete configuration
    #[error("Configuration error: {0}")]
    Config(String),

    /// Model endpoint did not respond to the startup health check
    #[error("Endpoint unreachable: {endpoint}: {reason}")]
    EndpointUnreachable { endpoint: String, reason: String },

    /// Embedding dimension does not match what the index expects
    #[error("Embedding dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    /// Persisted index was built with a different embedding model
    #[error("Embedding model mismatch: index built with '{expected}', provider is '{actual}'")]
    ModelMismatch { expected: String, actual: String },

    /// No chunks to index (empty corpus or every document filtered out)
    #[error("Nothing to index: the corpus produced zero chunks")]
    EmptyCorpus,

    /// Chunk and embedding counts differ at build time
    #[error("Chunk/embedding count mismatch: {chunks} chunks, {embeddings} embeddings")]
    ChunkCountMismatch { chunks: usize, embeddings: usize },

    /// Vector contains NaN or Infinity values
    #[error("Invalid vector: {0}")]
    InvalidVector(String),

    /// A single document could not be extracted (recovered by skipping it)
    #[error("Failed to extract '{document}': {reason}")]
    Extraction { document: String, reason: String },

    /// A model call exceeded the configured request timeout
    #[error("Request to {endpoint} timed out after {timeout_secs}s")]
    Timeout { endpoint: String, timeout_secs: u64 },

    /// A model call failed for a non-timeout reason
    #[error("Model request to {endpoint} failed: {reason}")]
    ModelRequest { endpoint: String, reason: String },

    /// Persisted index file could not be written or read back
    #[error("Index persistence error at {path}: {reason}")]
    IndexPersistence { path: PathBuf, reason: String },

    /// No index has been built or loaded yet
    #[error("No index available: build or load an index before querying")]
    IndexNotReady,

    /// Evaluation dataset could not be read
    #[error("Dataset error: {0}")]
    DatasetFormat(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl RagError {
    /// Classify a failed reqwest call against a model endpoint
    pub fn from_request(endpoint: &str, timeout_secs: u64, err: reqwest::Error) -> Self {
        if err.is_timeout() {
            RagError::Timeout {
                endpoint: endpoint.to_string(),
                timeout_secs,
            }
        } else {
            RagError::ModelRequest {
                endpoint: endpoint.to_string(),
                reason: err.to_string(),
            }
        }
    }

    /// Get error code for logging
    pub fn error_code(&self) -> &'static str {
        match self {
            RagError::Config(_) => "CONFIG",
            RagError::EndpointUnreachable { .. } => "ENDPOINT_UNREACHABLE",
            RagError::DimensionMismatch { .. } => "DIMENSION_MISMATCH",
            RagError::ModelMismatch { .. } => "MODEL_MISMATCH",
            RagError::EmptyCorpus => "EMPTY_CORPUS",
            RagError::ChunkCountMismatch { .. } => "CHUNK_COUNT_MISMATCH",
            RagError::InvalidVector(_) => "INVALID_VECTOR",
            RagError::Extraction { .. } => "EXTRACTION",
            RagError::Timeout { .. } => "TIMEOUT",
            RagError::ModelRequest { .. } => "MODEL_REQUEST",
            RagError::IndexPersistence { .. } => "INDEX_PERSISTENCE",
            RagError::IndexNotReady => "INDEX_NOT_READY",
            RagError::DatasetFormat(_) => "DATASET_FORMAT",
            RagError::Io(_) => "IO",
        }
    }

    /// Configuration-class errors indicate a setup problem, not a transient
    /// condition: report and stop, do not retry.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            RagError::Config(_)
                | RagError::EndpointUnreachable { .. }
                | RagError::DimensionMismatch { .. }
                | RagError::ModelMismatch { .. }
                | RagError::EmptyCorpus
                | RagError::IndexPersistence { .. }
        )
    }

    /// Errors recovered by skipping the offending document
    pub fn is_per_document(&self) -> bool {
        matches!(self, RagError::Extraction { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes_unique() {
        let codes = [
            RagError::Config("x".into()).error_code(),
            RagError::EmptyCorpus.error_code(),
            RagError::DimensionMismatch {
                expected: 384,
                actual: 512,
            }
            .error_code(),
            RagError::ModelMismatch {
                expected: "a".into(),
                actual: "b".into(),
            }
            .error_code(),
            RagError::Timeout {
                endpoint: "http://localhost".into(),
                timeout_secs: 30,
            }
            .error_code(),
            RagError::IndexNotReady.error_code(),
        ];
        for (i, a) in codes.iter().enumerate() {
            for (j, b) in codes.iter().enumerate() {
                if i != j {
                    assert_ne!(a, b, "duplicate error code: {}", a);
                }
            }
        }
    }

    #[test]
    fn test_fatal_classification() {
        assert!(RagError::EmptyCorpus.is_fatal());
        assert!(RagError::DimensionMismatch {
            expected: 384,
            actual: 512
        }
        .is_fatal());
        assert!(!RagError::Timeout {
            endpoint: "http://localhost".into(),
            timeout_secs: 30
        }
        .is_fatal());
        assert!(!RagError::Extraction {
            document: "broken.pdf".into(),
            reason: "corrupt xref".into()
        }
        .is_fatal());
    }

    #[test]
    fn test_per_document_classification() {
        assert!(RagError::Extraction {
            document: "broken.pdf".into(),
            reason: "corrupt xref".into()
        }
        .is_per_document());
        assert!(!RagError::EmptyCorpus.is_per_document());
    }
}
