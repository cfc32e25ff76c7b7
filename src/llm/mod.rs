pub mod openai;
pub mod provider;
pub mod types;

pub use openai::OpenAiCompatClient;
pub use provider::{CompletionService, Embedder, TokenStream};
pub use types::{ChatMessage, ChatRequest};
