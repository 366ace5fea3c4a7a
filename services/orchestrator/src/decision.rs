//! Strict parsing of the reasoning model's decision
//! (grounded on `agent.py::parse_decision`/`_extract_json_from_text`).

use common::Priority;
use serde_json::{Map, Value};
use tracing::warn;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecisionAction {
    DispatchToFullsend,
    DispatchToBuilder,
    RespondToDiscord,
    UpdateWorklist,
    RecordLearning,
    KillExperiment,
    InitiateRoundtable,
    NoAction,
}

impl DecisionAction {
    fn parse(raw: &str) -> Option<Self> {
        match raw {
            "dispatch_to_fullsend" => Some(Self::DispatchToFullsend),
            "dispatch_to_builder" => Some(Self::DispatchToBuilder),
            "respond_to_discord" => Some(Self::RespondToDiscord),
            "update_worklist" => Some(Self::UpdateWorklist),
            "record_learning" => Some(Self::RecordLearning),
            "kill_experiment" => Some(Self::KillExperiment),
            "initiate_roundtable" => Some(Self::InitiateRoundtable),
            "no_action" => Some(Self::NoAction),
            _ => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Decision {
    pub action: DecisionAction,
    pub reasoning: String,
    pub payload: Map<String, Value>,
    pub priority: Priority,
    pub experiment_id: Option<String>,
    pub context_for_fullsend: Option<String>,
}

impl Decision {
    fn no_action(reasoning: impl Into<String>, priority: Priority) -> Self {
        Self {
            action: DecisionAction::NoAction,
            reasoning: reasoning.into(),
            payload: Map::new(),
            priority,
            experiment_id: None,
            context_for_fullsend: None,
        }
    }

    /// §4.5's timeout fallback: acknowledge the user rather than go silent.
    pub fn timeout_fallback(thinking_timeout_seconds: u64) -> Self {
        let mut payload = Map::new();
        payload.insert(
            "content".to_string(),
            Value::String("I'm still thinking about this. Will update soon.".to_string()),
        );
        Self {
            action: DecisionAction::RespondToDiscord,
            reasoning: format!(
                "Thinking timed out after {thinking_timeout_seconds}s. Sending acknowledgment to user."
            ),
            payload,
            priority: Priority::Medium,
            experiment_id: None,
            context_for_fullsend: None,
        }
    }

    /// §4.5's API-error fallback: connection errors, rate limits, and non-2xx
    /// statuses all collapse to a `no_action` with the error recorded for
    /// the next cycle to retry.
    pub fn api_error_fallback(error_type: &str, error_message: &str) -> Self {
        let mut payload = Map::new();
        payload.insert("error_type".to_string(), Value::String(error_type.to_string()));
        payload.insert(
            "error_message".to_string(),
            Value::String(error_message.chars().take(500).collect()),
        );
        Self {
            action: DecisionAction::NoAction,
            reasoning: format!(
                "API error ({error_type}): {}. Will retry on next message cycle.",
                error_message.chars().take(200).collect::<String>()
            ),
            payload,
            priority: Priority::Low,
            experiment_id: None,
            context_for_fullsend: None,
        }
    }
}

/// Extract the first JSON object from `text`: a `` ```json `` fenced block
/// if present, otherwise the first balanced `{...}` span.
fn extract_json(text: &str) -> Option<&str> {
    if let Some(fence_start) = text.find("```json") {
        let after = fence_start + "```json".len();
        if let Some(fence_end) = text[after..].find("```") {
            return Some(text[after..after + fence_end].trim());
        }
    }

    let start = text.find('{')?;
    let mut depth = 0i32;
    for (offset, ch) in text[start..].char_indices() {
        match ch {
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(&text[start..start + offset + 1]);
                }
            }
            _ => {}
        }
    }
    None
}

/// Parse the model's raw text reply into a `Decision`, following
/// `agent.py::parse_decision`'s strict validation: unknown action defaults
/// to `no_action`, unknown priority defaults to `medium`, a non-object
/// `payload` is wrapped as `{"value": payload}`, and `kill_experiment`
/// without an `experiment_id` is logged but not rejected.
pub fn parse_decision(text: &str) -> Decision {
    if text.trim().is_empty() {
        return Decision::no_action("No text content in model response", Priority::Low);
    }

    let Some(json_str) = extract_json(text) else {
        warn!("no JSON object found in orchestrator response");
        let mut payload = Map::new();
        payload.insert("raw_response".to_string(), Value::String(text.chars().take(500).collect()));
        return Decision { payload, ..Decision::no_action("No JSON found in response", Priority::Low) };
    };

    let data: Value = match serde_json::from_str(json_str) {
        Ok(value) => value,
        Err(err) => {
            warn!(error = %err, "JSON parse error in orchestrator response");
            let mut payload = Map::new();
            payload.insert("raw_response".to_string(), Value::String(text.chars().take(500).collect()));
            return Decision { payload, ..Decision::no_action(format!("JSON parse error: {err}"), Priority::Low) };
        }
    };

    let Value::Object(data) = data else {
        return Decision::no_action("Expected JSON object", Priority::Low);
    };

    let action_raw = data.get("action").and_then(Value::as_str).unwrap_or("no_action");
    let action = DecisionAction::parse(action_raw.trim().to_ascii_lowercase().as_str()).unwrap_or_else(|| {
        warn!(action = %action_raw, "invalid decision action, defaulting to no_action");
        DecisionAction::NoAction
    });

    let priority_raw = data.get("priority").and_then(Value::as_str).unwrap_or("medium");
    let (priority, coerced) = Priority::parse_or_medium(priority_raw);
    if coerced {
        warn!(priority = %priority_raw, "invalid decision priority, defaulting to medium");
    }

    let reasoning = data.get("reasoning").and_then(Value::as_str).unwrap_or("").to_string();
    if reasoning.is_empty() {
        warn!("decision missing reasoning field");
    }

    let payload = match data.get("payload") {
        Some(Value::Object(map)) => map.clone(),
        Some(other) => {
            warn!("payload is not an object, wrapping");
            let mut wrapped = Map::new();
            wrapped.insert("value".to_string(), other.clone());
            wrapped
        }
        None => Map::new(),
    };

    let mut experiment_id = None;
    let mut context_for_fullsend = None;

    if action == DecisionAction::KillExperiment {
        experiment_id = data
            .get("experiment_id")
            .and_then(Value::as_str)
            .or_else(|| payload.get("experiment_id").and_then(Value::as_str))
            .map(str::to_string);
        if experiment_id.is_none() {
            warn!("kill_experiment action missing experiment_id");
        }
    }

    if action == DecisionAction::DispatchToFullsend {
        context_for_fullsend = data
            .get("context_for_fullsend")
            .and_then(Value::as_str)
            .or_else(|| payload.get("context").and_then(Value::as_str))
            .map(str::to_string);
    }

    Decision { action, reasoning, payload, priority, experiment_id, context_for_fullsend }
}
