//! The reasoning model as an opaque collaborator (§1's Non-goals: "LLM
//! clients"). Errors mirror the Anthropic SDK exception classes
//! `agent.py::process_with_thinking` catches by name.

use async_trait::async_trait;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ReasoningError {
    #[error("api connection error: {0}")]
    Connection(String),
    #[error("api rate limit error: {0}")]
    RateLimit(String),
    #[error("api status error {status_code}: {message}")]
    Status { status_code: u16, message: String },
    #[error("unexpected error: {0}")]
    Unexpected(String),
}

/// The extended-thinking reasoning model. `thinking_budget` is passed
/// through unmodified to whatever opaque endpoint implements this trait.
#[async_trait]
pub trait ReasoningModel: Send + Sync {
    async fn think(&self, prompt: &str, max_tokens: u32, thinking_budget: u32) -> Result<String, ReasoningError>;
}
