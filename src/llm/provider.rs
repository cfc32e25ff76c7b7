use async_trait::async_trait;
use tokio::sync::mpsc;

use super::types::ChatRequest;
use crate::core::errors::CollaboratorError;

/// Finite, ordered token stream. The sender closing the channel marks the
/// end of the answer; an `Err` item aborts it.
pub type TokenStream = mpsc::Receiver<Result<String, CollaboratorError>>;

#[async_trait]
pub trait CompletionService: Send + Sync {
    /// provider name used in logs (e.g. "openai-compat")
    fn name(&self) -> &str;

    /// chat completion (non-streaming)
    async fn complete(&self, request: ChatRequest) -> Result<String, CollaboratorError>;

    /// chat completion (streaming)
    async fn complete_stream(&self, request: ChatRequest) -> Result<TokenStream, CollaboratorError>;
}

#[async_trait]
pub trait Embedder: Send + Sync {
    /// One vector per input text, same order.
    async fn encode(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, CollaboratorError>;
}
