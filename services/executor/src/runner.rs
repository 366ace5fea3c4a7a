//! Experiment execution: loads the tool a run needs, executes it under a
//! wall-clock timeout, persists the run record, and drives the §4.9 state
//! machine. Grounded field-for-field on
//! `original_source/services/executor/runner.py::execute_experiment`/
//! `_handle_failure`.

use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use common::ids::{ExperimentId, RunId};
use common::messages::{ExperimentCompleted, ExperimentFailed, MetricEvent};
use common::{Channels, Envelope};
use serde_json::{Map, Value};
use store::KvStore;
use tracing::{error, info, warn};

use crate::lifecycle::{self, ExperimentState};
use crate::tool::{ToolError, ToolRegistry};

pub struct Runner {
    bus: Arc<dyn bus::BusClient>,
    store: Arc<dyn KvStore>,
    channels: Channels,
    tools: ToolRegistry,
    tool_execution_timeout: Duration,
}

/// What to run: resolved either from an `execution` JSON blob or from
/// bare `tool`/`params` hash fields (`runner.py` accepts both shapes).
struct ExecutionPlan {
    tool_name: String,
    params: Value,
}

fn parse_execution_plan(fields: &std::collections::HashMap<String, String>) -> Option<ExecutionPlan> {
    if let Some(raw) = fields.get("execution") {
        let parsed: Value = serde_json::from_str(raw).ok()?;
        let tool_name = parsed.get("tool")?.as_str()?.to_string();
        let params = parsed.get("params").cloned().unwrap_or_else(|| Value::Object(Map::new()));
        return Some(ExecutionPlan { tool_name, params });
    }

    let tool_name = fields.get("tool")?.clone();
    let params = fields
        .get("params")
        .and_then(|raw| serde_json::from_str(raw).ok())
        .unwrap_or_else(|| Value::Object(Map::new()));
    Some(ExecutionPlan { tool_name, params })
}

/// Summarize a tool's raw JSON result for storage
/// (`runner.py::summarize_result`): objects pass through, arrays become an
/// item count, anything else is truncated to 500 characters.
fn summarize_result(result: &Value) -> Value {
    match result {
        Value::Object(_) => result.clone(),
        Value::Array(items) => serde_json::json!({ "items": items.len(), "type": "list" }),
        other => {
            let rendered = other.to_string();
            let truncated: String = rendered.chars().take(500).collect();
            serde_json::json!({ "value": truncated })
        }
    }
}

impl Runner {
    pub fn new(bus: Arc<dyn bus::BusClient>, store: Arc<dyn KvStore>, channels: Channels, tools: ToolRegistry, tool_execution_timeout: Duration) -> Self {
        Self { bus, store, channels, tools, tool_execution_timeout }
    }

    async fn publish<T: serde::Serialize>(&self, channel: &str, message_type: &str, payload: T) {
        let envelope = Envelope::new(message_type, "executor", payload);
        match common::envelope::encode(&envelope) {
            Ok(wire) => {
                if let Err(err) = self.bus.publish(channel, &wire).await {
                    warn!(error = %err, channel, "failed to publish executor envelope");
                }
            }
            Err(err) => warn!(error = %err, "failed to encode executor envelope"),
        }
    }

    /// Emit a run metric (e.g. `duration_seconds`) on the `metrics`
    /// channel, letting the Monitor aggregate it the same as any
    /// tool-published metric (§9's "metric emission" supplement).
    async fn emit_metric(&self, experiment_id: &str, event: &str, fields: Map<String, Value>) {
        let metric = MetricEvent { experiment_id: experiment_id.to_string(), event: Some(event.to_string()), message: None, fields };
        self.publish(&self.channels.metrics(), "metric_event", metric).await;
    }

    async fn set_state_if_legal(&self, experiment_id: &str, current: ExperimentState, next: ExperimentState) -> bool {
        if !lifecycle::is_legal_transition(current, next) {
            warn!(experiment_id, from = current.as_str(), to = next.as_str(), "rejected illegal experiment state transition");
            return false;
        }
        let key = ExperimentId::from(experiment_id).store_key();
        if let Err(err) = self.store.hash_set(&key, "state", next.as_str()).await {
            error!(experiment_id, error = %err, "failed to persist experiment state transition");
            return false;
        }
        true
    }

    /// Run one experiment if it is currently `Active`; no-op (with a log)
    /// for any other state, including `Archived`.
    pub async fn execute_experiment(&self, experiment_id: &str) {
        let exp_key = ExperimentId::from(experiment_id).store_key();
        let fields = match self.store.hash_get_all(&exp_key).await {
            Ok(fields) => fields,
            Err(err) => {
                error!(experiment_id, error = %err, "failed to load experiment before run");
                return;
            }
        };

        let current_state = ExperimentState::parse(fields.get("state").map(String::as_str).unwrap_or(""));
        if !lifecycle::can_start_run(current_state) {
            info!(experiment_id, state = current_state.as_str(), "skipping run: experiment is not active");
            return;
        }

        let run_id = RunId::new(&ExperimentId::from(experiment_id), Utc::now().timestamp());
        info!(experiment_id, run_id = %run_id, event = "executor.run_started", "starting experiment run");

        if !self.set_state_if_legal(experiment_id, current_state, ExperimentState::Running).await {
            return;
        }

        let Some(plan) = parse_execution_plan(&fields) else {
            self.fail_run(experiment_id, &run_id, ToolError::Other { class_name: "ConfigError".to_string(), message: "experiment has no execution.tool configured".to_string() }).await;
            return;
        };

        info!(experiment_id, run_id = %run_id, tool = %plan.tool_name, "loading tool");
        let started_at = Instant::now();
        let outcome = common::telemetry::traced("tool.execute", &plan.tool_name, self.tools.execute(&plan.tool_name, &plan.params, self.tool_execution_timeout)).await;
        let duration = started_at.elapsed();

        match outcome {
            Ok(result) => self.complete_run(experiment_id, &run_id, &result, duration).await,
            Err(err) => self.fail_run(experiment_id, &run_id, err).await,
        }
    }

    async fn complete_run(&self, experiment_id: &str, run_id: &RunId, result: &Value, duration: Duration) {
        let duration_seconds = duration.as_secs_f64();
        let summary = summarize_result(result);
        let timestamp = Utc::now().to_rfc3339();

        if let Err(err) = self
            .store
            .hash_set_many(
                &run_id.store_key(),
                &[
                    ("status", "completed"),
                    ("duration_seconds", duration_seconds.to_string().as_str()),
                    ("result_summary", summary.to_string().as_str()),
                    ("timestamp", timestamp.as_str()),
                ],
            )
            .await
        {
            error!(experiment_id, run_id = %run_id, error = %err, "failed to persist completed run record");
        }

        self.set_state_if_legal(experiment_id, ExperimentState::Running, ExperimentState::Run).await;

        let mut metric_fields = Map::new();
        metric_fields.insert("duration_seconds".to_string(), Value::from(duration_seconds));
        self.emit_metric(experiment_id, "run_completed", metric_fields).await;

        self.publish(
            &self.channels.experiment_results(),
            "experiment_completed",
            ExperimentCompleted { experiment_id: experiment_id.to_string(), run_id: run_id.to_string(), status: "success".to_string(), duration: duration_seconds },
        )
        .await;

        info!(experiment_id, run_id = %run_id, event = "executor.run_completed", duration_seconds, "experiment run completed");
    }

    async fn fail_run(&self, experiment_id: &str, run_id: &RunId, err: ToolError) {
        let timestamp = Utc::now().to_rfc3339();
        let error_message = err.to_string();
        let error_type = err.error_type();

        let mut fields: Vec<(String, String)> = vec![
            ("status".to_string(), "failed".to_string()),
            ("error".to_string(), error_message.clone()),
            ("error_type".to_string(), error_type.clone()),
            ("timestamp".to_string(), timestamp),
        ];

        let mut timeout_seconds = None;
        let mut retry_attempts = None;
        match &err {
            ToolError::Timeout { timeout_seconds: seconds } => {
                timeout_seconds = Some(*seconds);
                fields.push(("timeout_seconds".to_string(), seconds.to_string()));
            }
            ToolError::RetryExhausted { attempts, last_error, last_error_type } => {
                retry_attempts = Some(*attempts);
                fields.push(("retry_attempts".to_string(), attempts.to_string()));
                fields.push(("last_transient_error".to_string(), last_error.clone()));
                fields.push(("last_transient_error_type".to_string(), last_error_type.clone()));
            }
            ToolError::NotFound(_) | ToolError::Other { .. } => {}
        }

        let borrowed: Vec<(&str, &str)> = fields.iter().map(|(k, v)| (k.as_str(), v.as_str())).collect();
        if let Err(store_err) = self.store.hash_set_many(&run_id.store_key(), &borrowed).await {
            error!(experiment_id, run_id = %run_id, error = %store_err, "failed to persist failed run record");
        }

        self.set_state_if_legal(experiment_id, ExperimentState::Running, ExperimentState::Failed).await;

        self.publish(
            &self.channels.experiment_results(),
            "experiment_failed",
            ExperimentFailed {
                experiment_id: experiment_id.to_string(),
                run_id: run_id.to_string(),
                error: error_message.clone(),
                error_type: error_type.clone(),
                timeout_seconds,
                retry_attempts,
            },
        )
        .await;

        warn!(experiment_id, run_id = %run_id, event = "executor.run_failed", error_type, error = %error_message.chars().take(160).collect::<String>(), "experiment run failed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use serde_json::json;
    use store::InMemoryStore;

    struct Doubler;

    #[async_trait]
    impl crate::tool::Tool for Doubler {
        fn name(&self) -> &str {
            "doubler"
        }

        async fn execute(&self, params: &Value) -> Result<Value, ToolError> {
            let n = params.get("n").and_then(Value::as_f64).unwrap_or(0.0);
            Ok(json!({ "doubled": n * 2.0 }))
        }
    }

    struct AlwaysFails;

    #[async_trait]
    impl crate::tool::Tool for AlwaysFails {
        fn name(&self) -> &str {
            "always_fails"
        }

        async fn execute(&self, _params: &Value) -> Result<Value, ToolError> {
            Err(ToolError::Other { class_name: "ValueError".to_string(), message: "boom".to_string() })
        }
    }

    fn runner_with(tools: ToolRegistry) -> (Runner, Arc<bus::LocalBus>, Arc<InMemoryStore>) {
        let bus = Arc::new(bus::LocalBus::new());
        let store = Arc::new(InMemoryStore::new());
        let runner = Runner::new(bus.clone(), store.clone(), Channels::default(), tools, Duration::from_secs(5));
        (runner, bus, store)
    }

    #[tokio::test]
    async fn a_successful_run_transitions_active_to_run_and_saves_the_record() {
        let tools = ToolRegistry::new();
        tools.register(Arc::new(Doubler));
        let (runner, _bus, store) = runner_with(tools);

        store.hash_set("experiments:e1", "state", "active").await.unwrap();
        store.hash_set("experiments:e1", "execution", r#"{"tool":"doubler","params":{"n":21}}"#).await.unwrap();

        runner.execute_experiment("e1").await;

        let state = store.hash_get("experiments:e1", "state").await.unwrap();
        assert_eq!(state.as_deref(), Some("run"));

        let run_keys = store.scan_keys("experiment_runs:e1:*").await.unwrap();
        assert_eq!(run_keys.len(), 1);
        let run_fields = store.hash_get_all(&run_keys[0]).await.unwrap();
        assert_eq!(run_fields.get("status").map(String::as_str), Some("completed"));
        assert!(run_fields.get("result_summary").unwrap().contains("42"));
    }

    #[tokio::test]
    async fn a_missing_tool_fails_the_run_with_tool_not_found_error_type() {
        let (runner, _bus, store) = runner_with(ToolRegistry::new());
        store.hash_set("experiments:e2", "state", "active").await.unwrap();
        store.hash_set("experiments:e2", "execution", r#"{"tool":"nonexistent","params":{}}"#).await.unwrap();

        runner.execute_experiment("e2").await;

        assert_eq!(store.hash_get("experiments:e2", "state").await.unwrap().as_deref(), Some("failed"));
        let run_keys = store.scan_keys("experiment_runs:e2:*").await.unwrap();
        let run_fields = store.hash_get_all(&run_keys[0]).await.unwrap();
        assert_eq!(run_fields.get("error_type").map(String::as_str), Some("ToolNotFoundError"));
    }

    #[tokio::test]
    async fn a_tool_error_fails_the_run_with_its_class_name() {
        let tools = ToolRegistry::new();
        tools.register(Arc::new(AlwaysFails));
        let (runner, _bus, store) = runner_with(tools);
        store.hash_set("experiments:e3", "state", "active").await.unwrap();
        store.hash_set("experiments:e3", "execution", r#"{"tool":"always_fails","params":{}}"#).await.unwrap();

        runner.execute_experiment("e3").await;

        let run_keys = store.scan_keys("experiment_runs:e3:*").await.unwrap();
        let run_fields = store.hash_get_all(&run_keys[0]).await.unwrap();
        assert_eq!(run_fields.get("error_type").map(String::as_str), Some("ValueError"));
        assert_eq!(run_fields.get("error").map(String::as_str), Some("ValueError: boom"));
    }

    #[tokio::test]
    async fn an_archived_experiment_is_never_started() {
        let (runner, _bus, store) = runner_with(ToolRegistry::new());
        store.hash_set("experiments:e4", "state", "archived").await.unwrap();

        runner.execute_experiment("e4").await;

        assert_eq!(store.hash_get("experiments:e4", "state").await.unwrap().as_deref(), Some("archived"));
        assert!(store.scan_keys("experiment_runs:e4:*").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn an_already_running_experiment_is_not_started_again() {
        let (runner, _bus, store) = runner_with(ToolRegistry::new());
        store.hash_set("experiments:e5", "state", "running").await.unwrap();

        runner.execute_experiment("e5").await;

        assert!(store.scan_keys("experiment_runs:e5:*").await.unwrap().is_empty());
    }

    #[test]
    fn summarize_result_matches_the_three_reference_shapes() {
        assert_eq!(summarize_result(&json!({"a": 1})), json!({"a": 1}));
        assert_eq!(summarize_result(&json!([1, 2, 3])), json!({"items": 3, "type": "list"}));
        assert_eq!(summarize_result(&json!(42)), json!({"value": "42"}));
    }
}
