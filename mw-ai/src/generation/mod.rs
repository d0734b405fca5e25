//! Generation client collaborator
//!
//! Sends one prompt to a text-completion service and returns the raw text.
//! All parsing belongs to the caller.

mod chat;

pub use chat::ChatCompletionClient;

use async_trait::async_trait;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum GenerationError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("Request timed out: {0}")]
    Timeout(String),

    #[error("API error {0}: {1}")]
    Api(u16, String),

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Response contained no completion text")]
    EmptyResponse,

    #[error("No API key configured (set MAGICWORD_API_KEY or generation.api_key)")]
    MissingApiKey,
}

impl GenerationError {
    /// Whether the same request may succeed later
    ///
    /// Configuration problems and 4xx rejections (other than 429) are final.
    pub fn is_transient(&self) -> bool {
        match self {
            GenerationError::Network(_)
            | GenerationError::Timeout(_)
            | GenerationError::Parse(_)
            | GenerationError::EmptyResponse => true,
            GenerationError::Api(status, _) => *status == 429 || *status >= 500,
            GenerationError::MissingApiKey => false,
        }
    }
}

#[async_trait]
pub trait GenerationClient: Send + Sync {
    /// Complete `prompt`, returning the raw response text
    async fn complete(&self, prompt: &str, temperature: f32) -> Result<String, GenerationError>;
}
