//! Error types for the processor module

use crate::error::Error as CrateError;
use crate::index::DbError;
use thiserror::Error;

/// Error type for processor operations
#[derive(Debug, Error)]
pub enum ProcessError {
    /// Embedding generation error
    #[error("Embedding generation error: {0}")]
    EmbeddingGeneration(String),

    /// LLM error
    #[error("LLM error: {0}")]
    Llm(String),

    /// Document index error
    #[error("Index error: {0}")]
    Index(#[from] DbError),

    /// Other errors
    #[error("{0}")]
    Other(String),
}

impl From<ProcessError> for CrateError {
    fn from(err: ProcessError) -> Self {
        CrateError::Process(err.to_string())
    }
}

impl From<rig::embeddings::EmbeddingError> for ProcessError {
    fn from(err: rig::embeddings::EmbeddingError) -> Self {
        Self::EmbeddingGeneration(err.to_string())
    }
}
