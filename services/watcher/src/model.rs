//! The classification LLM as an opaque collaborator (§1's Non-goals: "LLM
//! clients (opaque request/response endpoints)").

use async_trait::async_trait;
use common::retry::Transient;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ModelError {
    #[error("network error calling model: {0}")]
    Network(String),
    #[error("rate limited: {0}")]
    RateLimited(String),
    #[error("model server error: {0}")]
    ServerError(String),
    #[error("model call failed: {0}")]
    NonTransient(String),
}

impl Transient for ModelError {
    fn is_transient(&self) -> bool {
        matches!(self, Self::Network(_) | Self::RateLimited(_) | Self::ServerError(_))
    }
}

/// A classification model: bounded tokens, low temperature, raw text reply
/// (parsed by [`crate::classifier::parse_classification`]).
#[async_trait]
pub trait ClassificationModel: Send + Sync {
    async fn classify_raw(
        &self,
        prompt: &str,
        temperature: f64,
        max_tokens: u32,
    ) -> Result<String, ModelError>;
}

/// The same opaque model abstraction, used by the Responder for its
/// templated replies (§4.4: "same retry discipline").
#[async_trait]
pub trait ResponseModel: Send + Sync {
    async fn respond_raw(
        &self,
        prompt: &str,
        temperature: f64,
        max_tokens: u32,
    ) -> Result<String, ModelError>;
}
