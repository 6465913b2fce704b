pub mod adapter;
pub mod gemini;
pub mod prompt;

use async_trait::async_trait;
use thiserror::Error;

pub use adapter::ExplanationAdapter;
pub use gemini::{GeminiClient, GeminiConfig};

#[derive(Debug, Error)]
pub enum ExplanationError {
    #[error("explanation model is not configured: {0}")]
    NotConfigured(String),
    #[error("request to explanation model failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("explanation model returned status {status}: {body}")]
    Status { status: u16, body: String },
    #[error("malformed explanation model response: {0}")]
    Malformed(String),
    #[error("explanation model returned no text")]
    Empty,
}

/// A generative text model that answers a single prompt.
#[async_trait]
pub trait ExplanationModel: Send + Sync {
    fn model_name(&self) -> &str;

    async fn generate(&self, prompt: &str) -> Result<String, ExplanationError>;
}
