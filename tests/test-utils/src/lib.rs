//! Shared fakes for cross-crate integration tests: scripted LLM-shaped
//! models and tools, built to the same opaque-trait seams each service
//! crate's own unit tests mock individually (`watcher::model`,
//! `orchestrator::model`, `redis_agent::summary`, `executor::tool`).

use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use executor::{Tool, ToolError};
use orchestrator::model::{ReasoningError, ReasoningModel};
use redis_agent::{SummaryModel, SummaryModelError};
use serde_json::Value;
use watcher::model::{ClassificationModel, ModelError, ResponseModel};

/// Always returns the same raw text, regardless of prompt. Used to drive a
/// classifier/responder/reasoning agent through a fixed reply without
/// exercising the retry path.
pub struct ScriptedModel {
    reply: String,
}

impl ScriptedModel {
    pub fn new(reply: impl Into<String>) -> Self {
        Self { reply: reply.into() }
    }
}

#[async_trait]
impl ClassificationModel for ScriptedModel {
    async fn classify_raw(&self, _prompt: &str, _temperature: f64, _max_tokens: u32) -> Result<String, ModelError> {
        Ok(self.reply.clone())
    }
}

#[async_trait]
impl ResponseModel for ScriptedModel {
    async fn respond_raw(&self, _prompt: &str, _temperature: f64, _max_tokens: u32) -> Result<String, ModelError> {
        Ok(self.reply.clone())
    }
}

#[async_trait]
impl ReasoningModel for ScriptedModel {
    async fn think(&self, _prompt: &str, _max_tokens: u32, _thinking_budget: u32) -> Result<String, ReasoningError> {
        Ok(self.reply.clone())
    }
}

#[async_trait]
impl SummaryModel for ScriptedModel {
    async fn summarize(&self, _brief: &str) -> Result<String, SummaryModelError> {
        Ok(self.reply.clone())
    }
}

/// A reasoning model that never resolves within the caller's timeout —
/// used to exercise §4.5/§8's Orchestrator timeout fallback deterministically
/// instead of racing a real clock against a fast-but-not-infinite delay.
pub struct NeverRespondsModel;

#[async_trait]
impl ReasoningModel for NeverRespondsModel {
    async fn think(&self, _prompt: &str, _max_tokens: u32, _thinking_budget: u32) -> Result<String, ReasoningError> {
        std::future::pending::<()>().await;
        unreachable!("pending future never resolves")
    }
}

/// Errors on every call, the shape every service's `main.rs` falls back to
/// when no real endpoint is configured.
pub struct AlwaysErrorsModel;

#[async_trait]
impl ClassificationModel for AlwaysErrorsModel {
    async fn classify_raw(&self, _prompt: &str, _temperature: f64, _max_tokens: u32) -> Result<String, ModelError> {
        Err(ModelError::NonTransient("scripted failure".to_string()))
    }
}

#[async_trait]
impl ResponseModel for AlwaysErrorsModel {
    async fn respond_raw(&self, _prompt: &str, _temperature: f64, _max_tokens: u32) -> Result<String, ModelError> {
        Err(ModelError::NonTransient("scripted failure".to_string()))
    }
}

#[async_trait]
impl ReasoningModel for AlwaysErrorsModel {
    async fn think(&self, _prompt: &str, _max_tokens: u32, _thinking_budget: u32) -> Result<String, ReasoningError> {
        Err(ReasoningError::Connection("scripted failure".to_string()))
    }
}

/// Fails its first `transient_failures` calls with a retryable error, then
/// succeeds with `reply` — drives the classifier/responder retry loop
/// (§4.3) from an integration test without a real flaky endpoint.
pub struct FlakyModel {
    reply: String,
    transient_failures: usize,
    attempts: AtomicUsize,
}

impl FlakyModel {
    pub fn new(reply: impl Into<String>, transient_failures: usize) -> Self {
        Self { reply: reply.into(), transient_failures, attempts: AtomicUsize::new(0) }
    }
}

#[async_trait]
impl ClassificationModel for FlakyModel {
    async fn classify_raw(&self, _prompt: &str, _temperature: f64, _max_tokens: u32) -> Result<String, ModelError> {
        let attempt = self.attempts.fetch_add(1, Ordering::SeqCst);
        if attempt < self.transient_failures {
            Err(ModelError::Network("scripted transient failure".to_string()))
        } else {
            Ok(self.reply.clone())
        }
    }
}

/// Echoes its input params back as the result — the simplest possible
/// `executor::Tool` for exercising a run to completion.
pub struct EchoTool;

#[async_trait]
impl Tool for EchoTool {
    fn name(&self) -> &str {
        "echo"
    }

    async fn execute(&self, params: &Value) -> Result<Value, ToolError> {
        Ok(params.clone())
    }
}

/// Sleeps past any reasonable test timeout before returning — exercises
/// the Executor's per-tool wall-clock timeout.
pub struct SlowTool {
    pub delay: Duration,
}

#[async_trait]
impl Tool for SlowTool {
    fn name(&self) -> &str {
        "slow"
    }

    async fn execute(&self, _params: &Value) -> Result<Value, ToolError> {
        tokio::time::sleep(self.delay).await;
        Ok(Value::Null)
    }
}

/// Always fails with a fixed message — exercises the Executor's generic
/// tool-error path (`ToolError::Other`).
pub struct FailingTool;

#[async_trait]
impl Tool for FailingTool {
    fn name(&self) -> &str {
        "failing"
    }

    async fn execute(&self, _params: &Value) -> Result<Value, ToolError> {
        Err(ToolError::Other { class_name: "ValueError".to_string(), message: "scripted failure".to_string() })
    }
}