//! The opaque `Tool` contract and its registry (§1's Non-goal: "Individual
//! domain tools... opaque callables" — only the loader/dispatch contract is
//! in scope, grounded on the exception hierarchy
//! `original_source/services/executor/loader.py` defines and
//! `runner.py::execute_experiment` consults).

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::RwLock;
use rustc_hash::FxHashMap;
use serde_json::Value;
use thiserror::Error;

/// The four failure shapes §4.9 distinguishes on a `RunRecord`.
#[derive(Debug, Error, Clone)]
pub enum ToolError {
    #[error("tool not found: {0}")]
    NotFound(String),

    #[error("tool timed out after {timeout_seconds}s")]
    Timeout { timeout_seconds: u64 },

    #[error("retries exhausted after {attempts} attempts: {last_error}")]
    RetryExhausted {
        attempts: u32,
        last_error: String,
        last_error_type: String,
    },

    #[error("{class_name}: {message}")]
    Other { class_name: String, message: String },
}

impl ToolError {
    /// The `error_type` string a `RunRecord` stores for this failure,
    /// matching `type(error).__name__` in `runner.py::_handle_failure`. For
    /// `Other` this is the tool's own captured `class_name`, not a fixed
    /// label — a `ValueError`-equivalent must record `"ValueError"`.
    pub fn error_type(&self) -> String {
        match self {
            Self::NotFound(_) => "ToolNotFoundError".to_string(),
            Self::Timeout { .. } => "ToolTimeoutError".to_string(),
            Self::RetryExhausted { .. } => "ToolRetryExhaustedError".to_string(),
            Self::Other { class_name, .. } => class_name.clone(),
        }
    }
}

impl From<ToolError> for common::FabricError {
    fn from(err: ToolError) -> Self {
        match err {
            ToolError::NotFound(name) => common::FabricError::ToolNotFound(name),
            ToolError::Timeout { timeout_seconds } => common::FabricError::ToolTimeout {
                tool: String::new(),
                timeout_seconds,
            },
            ToolError::RetryExhausted { last_error, last_error_type, .. } => common::FabricError::ToolError {
                tool: String::new(),
                class_name: last_error_type,
                message: last_error,
            },
            ToolError::Other { class_name, message } => common::FabricError::ToolError { tool: String::new(), class_name, message },
        }
    }
}

/// One domain tool, invoked by name with JSON parameters and returning a
/// JSON result. The tool's own body is an external collaborator; only this
/// seam is in scope.
#[async_trait]
pub trait Tool: Send + Sync {
    fn name(&self) -> &str;
    async fn execute(&self, params: &Value) -> Result<Value, ToolError>;
}

/// Name -> tool lookup plus the timeout-wrapped call Executor actually
/// makes (`runner.py::execute_experiment`'s `load_tool` + `trace_call`).
#[derive(Clone, Default)]
pub struct ToolRegistry {
    tools: Arc<RwLock<FxHashMap<String, Arc<dyn Tool>>>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, tool: Arc<dyn Tool>) {
        self.tools.write().insert(tool.name().to_string(), tool);
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools.read().get(name).cloned()
    }

    /// Resolve `name` and run it under `timeout`, collapsing "not
    /// registered" and "ran too long" into the same error taxonomy the
    /// tool's own execution errors use.
    pub async fn execute(&self, name: &str, params: &Value, timeout: Duration) -> Result<Value, ToolError> {
        let tool = self.get(name).ok_or_else(|| ToolError::NotFound(name.to_string()))?;
        match tokio::time::timeout(timeout, tool.execute(params)).await {
            Ok(result) => result,
            Err(_) => Err(ToolError::Timeout { timeout_seconds: timeout.as_secs() }),
        }
    }
}
