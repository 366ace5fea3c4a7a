//! Routes a parsed [`Decision`] to its side effect: publish to another
//! service's inbound channel, mutate an experiment/document in the store,
//! or run Roundtable as a subprocess (grounded on `dispatcher.py::Dispatcher`/
//! `execute_decision`).

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use common::config::OrchestratorSettings;
use common::messages::{ExperimentRequest, OrchestratorResponse, ToolPrd};
use common::{Channels, Envelope};
use serde_json::{Map, Value};
use store::KvStore;
use tracing::{info, warn};

use crate::context;
use crate::decision::{Decision, DecisionAction};
use crate::supervisor::{Supervisor, SupervisorOutcome};

const SERVICE_NAME: &str = "orchestrator";

/// Default acknowledgment used when `respond_to_discord`'s payload carries
/// no content of its own (`dispatcher.py::respond_to_discord`'s fallback string).
const DEFAULT_ACK: &str = "Got it — I will draft a plan and share next steps shortly.";

pub struct Dispatcher {
    bus: Arc<dyn bus::BusClient>,
    store: Arc<dyn KvStore>,
    channels: Channels,
    settings: OrchestratorSettings,
}

impl Dispatcher {
    pub fn new(
        bus: Arc<dyn bus::BusClient>,
        store: Arc<dyn KvStore>,
        channels: Channels,
        settings: OrchestratorSettings,
    ) -> Self {
        Self { bus, store, channels, settings }
    }

    async fn publish<T: serde::Serialize>(
        &self,
        channel: &str,
        message_type: &str,
        payload: T,
    ) -> Result<(), common::FabricError> {
        let envelope = Envelope::new(message_type, SERVICE_NAME, payload);
        let wire = common::envelope::encode(&envelope)?;
        self.bus.publish(channel, &wire).await.map(|_| ()).map_err(common::FabricError::from)
    }

    /// Publish an experiment request to FULLSEND.
    pub async fn dispatch_to_fullsend(&self, decision: &Decision) -> Result<(), common::FabricError> {
        let idea = Value::Object(decision.payload.clone());
        let request = ExperimentRequest {
            idea: idea.to_string(),
            context: decision.context_for_fullsend.clone().unwrap_or_default(),
            priority: decision.priority,
            requested_at: Utc::now(),
            orchestrator_reasoning: decision.reasoning.clone(),
        };
        self.publish(&self.channels.to_fullsend(), "experiment_request", request).await?;
        info!(
            priority = %decision.priority,
            idea_preview = %idea.to_string().chars().take(120).collect::<String>(),
            "dispatched experiment request to fullsend"
        );
        Ok(())
    }

    /// Publish a tool PRD to the Builder, un-nesting `{"prd": ..., "notify_channel": ...}`
    /// payloads so a PRD already shaped that way isn't double-wrapped.
    pub async fn dispatch_to_builder(&self, decision: &Decision) -> Result<(), common::FabricError> {
        let (actual_prd, notify_channel, notify_message) = match decision.payload.get("prd") {
            Some(prd) => (
                prd.clone(),
                decision.payload.get("notify_channel").and_then(Value::as_str).map(str::to_string),
                decision.payload.get("notify_message").and_then(Value::as_str).map(str::to_string),
            ),
            None => (Value::Object(decision.payload.clone()), None, None),
        };

        let tool_name = actual_prd.get("name").and_then(Value::as_str).unwrap_or("unknown").to_string();
        let prd = ToolPrd {
            prd: actual_prd,
            requested_by: SERVICE_NAME.to_string(),
            priority: decision.priority,
            requested_at: Utc::now(),
            orchestrator_reasoning: decision.reasoning.clone(),
            notify_channel,
            notify_message,
        };
        self.publish(&self.channels.builder_tasks(), "tool_prd", prd).await?;
        info!(priority = %decision.priority, tool_name, "dispatched tool prd to builder");
        Ok(())
    }

    /// Reply to chat. `original_msg` is the raw JSON of the message that
    /// triggered this decision — an escalation's envelope or a builder
    /// completion notice — and is consulted through five fallbacks before
    /// giving up on a destination channel.
    pub async fn respond_to_discord(&self, decision: &Decision, original_msg: &Value) -> Result<(), common::FabricError> {
        let resolved_original = original_msg.get("original_message").unwrap_or(original_msg);

        let channel_id = resolved_original
            .get("channel_id")
            .and_then(Value::as_str)
            .or_else(|| original_msg.get("channel_id").and_then(Value::as_str))
            .or_else(|| original_msg.get("notify_channel").and_then(Value::as_str))
            .or_else(|| decision.payload.get("channel_id").and_then(Value::as_str))
            .or_else(|| decision.payload.get("notify_channel").and_then(Value::as_str));

        let Some(channel_id) = channel_id else {
            warn!("no channel_id found for discord response, skipping");
            return Ok(());
        };

        let reply_to = resolved_original
            .get("message_id")
            .and_then(Value::as_str)
            .or_else(|| original_msg.get("message_id").and_then(Value::as_str))
            .map(str::to_string);

        let content = decision
            .payload
            .get("content")
            .and_then(Value::as_str)
            .or_else(|| decision.payload.get("message").and_then(Value::as_str))
            .or_else(|| original_msg.get("notify_message").and_then(Value::as_str))
            .unwrap_or(DEFAULT_ACK)
            .to_string();

        let response = OrchestratorResponse {
            channel_id: channel_id.to_string(),
            content: content.clone(),
            reply_to,
            priority: decision.priority,
        };
        self.publish(&self.channels.from_orchestrator(), "orchestrator_response", response).await?;
        info!(channel_id, content_length = content.len(), "sent response to discord");
        Ok(())
    }

    /// Archive a failing experiment with a single atomic hash write.
    pub async fn kill_experiment(&self, decision: &Decision) -> Result<(), common::FabricError> {
        let Some(experiment_id) = decision.experiment_id.as_deref() else {
            warn!("kill_experiment called without experiment_id");
            return Ok(());
        };

        let reason = decision.payload.get("reason").and_then(Value::as_str).map(str::to_string).unwrap_or_else(|| decision.reasoning.clone());
        let archived_at = Utc::now().to_rfc3339();
        let key = format!("experiments:{experiment_id}");
        self.store
            .hash_set_many(
                &key,
                &[
                    ("state", "archived"),
                    ("archived_at", archived_at.as_str()),
                    ("archived_reason", reason.as_str()),
                    ("archived_by", SERVICE_NAME),
                ],
            )
            .await
            .map_err(common::FabricError::from)?;

        info!(experiment_id, reason = %reason.chars().take(160).collect::<String>(), "killed experiment");
        Ok(())
    }

    /// Run Roundtable as a subprocess: a prompt/context/learnings envelope in
    /// on stdin, `{transcript, summary}` (or an `error` field) out on stdout.
    pub async fn initiate_roundtable(&self, decision: &Decision) -> Value {
        let prompt = decision
            .payload
            .get("prompt")
            .or_else(|| decision.payload.get("topic"))
            .and_then(Value::as_str)
            .unwrap_or_default();
        let context = decision.payload.get("context").and_then(Value::as_str).unwrap_or_default();
        let learnings = decision.payload.get("learnings").and_then(Value::as_str).unwrap_or_default();

        if prompt.is_empty() {
            warn!("initiate_roundtable called without prompt");
            return serde_json::json!({ "error": "No prompt provided", "transcript": [], "summary": "" });
        }

        let input = serde_json::json!({ "prompt": prompt, "context": context, "learnings": learnings });
        info!(prompt_chars = prompt.len(), context_chars = context.len(), "initiating roundtable");

        let outcome = Supervisor::run(
            "uv",
            &["run", "python", "-m", "services.roundtable"],
            &input,
            Duration::from_secs(self.settings.roundtable_timeout_seconds),
        )
        .await;

        match &outcome {
            SupervisorOutcome::Ok { output } => {
                let summary_len = output.get("summary").and_then(Value::as_str).map(str::len).unwrap_or(0);
                info!(summary_chars = summary_len, "roundtable completed");
            }
            SupervisorOutcome::Err { error } => {
                warn!(error = %error, "roundtable failed or timed out");
            }
        }
        outcome.into_value()
    }

    /// Overwrite the worklist document.
    pub async fn do_update_worklist(&self, decision: &Decision) -> Result<(), common::FabricError> {
        let content = decision
            .payload
            .get("content")
            .or_else(|| decision.payload.get("worklist"))
            .and_then(Value::as_str)
            .map(str::to_string)
            .unwrap_or_else(|| Value::Object(decision.payload.clone()).to_string());

        context::update_worklist(self.store.as_ref(), &content).await.map_err(common::FabricError::from)?;
        info!(content_length = content.len(), "updated worklist");
        Ok(())
    }

    /// Append a new strategic learning.
    pub async fn do_record_learning(&self, decision: &Decision) -> Result<(), common::FabricError> {
        let learning = decision
            .payload
            .get("learning")
            .or_else(|| decision.payload.get("insight"))
            .or_else(|| decision.payload.get("content"))
            .and_then(Value::as_str)
            .map(str::to_string)
            .unwrap_or_else(|| Value::Object(decision.payload.clone()).to_string());

        context::append_learning(self.store.as_ref(), &learning).await.map_err(common::FabricError::from)?;
        info!(learning_preview = %learning.chars().take(100).collect::<String>(), "recorded learning");
        Ok(())
    }

    /// Route a decision to its side effect, returning Roundtable's result
    /// for `initiate_roundtable` and nothing for every other action.
    pub async fn execute(&self, decision: &Decision, original_msg: &Value) -> Result<Option<Value>, common::FabricError> {
        info!(
            action = ?decision.action,
            priority = %decision.priority,
            reasoning_preview = %decision.reasoning.chars().take(100).collect::<String>(),
            "executing decision"
        );

        match decision.action {
            DecisionAction::DispatchToFullsend => {
                self.dispatch_to_fullsend(decision).await?;
                Ok(None)
            }
            DecisionAction::DispatchToBuilder => {
                self.dispatch_to_builder(decision).await?;
                Ok(None)
            }
            DecisionAction::RespondToDiscord => {
                self.respond_to_discord(decision, original_msg).await?;
                Ok(None)
            }
            DecisionAction::UpdateWorklist => {
                self.do_update_worklist(decision).await?;
                Ok(None)
            }
            DecisionAction::RecordLearning => {
                self.do_record_learning(decision).await?;
                Ok(None)
            }
            DecisionAction::KillExperiment => {
                self.kill_experiment(decision).await?;
                Ok(None)
            }
            DecisionAction::InitiateRoundtable => Ok(Some(self.initiate_roundtable(decision).await)),
            DecisionAction::NoAction => {
                info!(reasoning = %decision.reasoning, "no action taken");
                Ok(None)
            }
        }
    }
}
