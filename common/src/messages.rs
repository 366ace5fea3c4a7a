//! Payload structs for the channel schemas in §6.
//!
//! These are always wrapped in [`crate::envelope::Envelope`]; the header
//! (`type`/`source`/`timestamp`) is never duplicated inside a payload
//! struct — it is flattened in by the envelope.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::priority::Priority;

/// Raw chat envelope delivered on `chat.raw` by the gateway.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawChatMessage {
    pub username: String,
    pub channel_id: String,
    pub channel_name: String,
    pub content: String,
    #[serde(default)]
    pub mentions_bot: bool,
}

/// Escalation raised by the Classifier on `to_orchestrator`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Escalation {
    pub reason: String,
    pub priority: Priority,
    pub original_message: RawChatMessage,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub suggested_response: Option<String>,
}

/// Periodic status digest published to `to_orchestrator` on a timer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PeriodicSummary {
    pub active_experiments: u64,
    pub total_experiments: u64,
    pub headline: String,
}

/// Orchestrator's reply to chat, published on `from_orchestrator`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrchestratorResponse {
    pub channel_id: String,
    pub content: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reply_to: Option<String>,
    pub priority: Priority,
}

/// Watcher's own direct reply to chat (distinct `type` from
/// `orchestrator_response`, same destination channel).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WatcherResponse {
    pub channel_id: String,
    pub content: String,
}

/// Submitted on `to_fullsend` by `dispatch_to_fullsend`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExperimentRequest {
    pub idea: String,
    pub context: String,
    pub priority: Priority,
    pub requested_at: chrono::DateTime<chrono::Utc>,
    pub orchestrator_reasoning: String,
}

/// Submitted on `builder_tasks` by `dispatch_to_builder`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolPrd {
    pub prd: Value,
    pub requested_by: String,
    pub priority: Priority,
    pub requested_at: chrono::DateTime<chrono::Utc>,
    pub orchestrator_reasoning: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notify_channel: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notify_message: Option<String>,
}

/// Builder completion notices published on `builder_results`, referenced
/// only at the interface boundary (the Builder itself is out of scope).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolBuilt {
    pub tool_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notify_channel: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notify_message: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolBuildFailed {
    pub tool_name: String,
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notify_channel: Option<String>,
}

/// A metric event on the `metrics` channel. `experiment_id` is the only
/// field the Monitor requires; every other field is dynamic — numeric
/// fields other than `event`/`timestamp`/`message` are aggregated, and
/// `event` drives the per-event counter and the `error` alert path.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricEvent {
    pub experiment_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub event: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    /// Every field besides `experiment_id`/`event`/`message`/`timestamp`
    /// (the header's own `timestamp` satisfies the schema's `timestamp`
    /// field, so none is duplicated here).
    #[serde(flatten)]
    pub fields: Map<String, Value>,
}

impl MetricEvent {
    /// Numeric fields eligible for aggregation, skipping the reserved names.
    pub fn numeric_fields(&self) -> impl Iterator<Item = (&str, f64)> {
        self.fields.iter().filter_map(|(k, v)| v.as_f64().map(|n| (k.as_str(), n)))
    }
}

/// Published by the Executor on `experiment_results` when a run finishes
/// successfully (`runner.py::execute_experiment`'s
/// `{"type": "experiment_completed", ...}` notification).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExperimentCompleted {
    pub experiment_id: String,
    pub run_id: String,
    pub status: String,
    pub duration: f64,
}

/// Published by the Executor on `experiment_results` when a run fails
/// (`runner.py::_handle_failure`'s `{"type": "experiment_failed", ...}`
/// notification).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExperimentFailed {
    pub experiment_id: String,
    pub run_id: String,
    pub error: String,
    pub error_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_seconds: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retry_attempts: Option<u32>,
}

/// An alert published by the Alert Gate on `to_orchestrator`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Alert {
    pub experiment_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub criterion: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_value: Option<f64>,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub severity: Option<String>,
}
