use thiserror::Error;

use crate::core::errors::{ApiError, CollaboratorError, RagError};

#[derive(Debug, Error)]
pub enum InitializationError {
    #[error("Failed to load configuration: {0}")]
    Config(#[source] ApiError),

    #[error("Failed to initialize history store: {0}")]
    History(#[source] ApiError),

    #[error("Failed to open vector index: {0}")]
    Index(#[source] CollaboratorError),

    #[error("Failed to initialize LLM client: {0}")]
    Llm(#[source] CollaboratorError),

    #[error("Failed to initialize web search: {0}")]
    WebSearch(#[source] CollaboratorError),

    #[error("Invalid chunking configuration: {0}")]
    Chunking(#[source] RagError),

    #[error("Failed to compile intent patterns: {0}")]
    Intent(#[from] regex::Error),
}
