//! Strategic context assembled for every Orchestrator decision
//! (grounded on `agent.py::build_prompt`/`_format_experiments_summary`/
//! `_format_metrics_summary`).

use chrono::Utc;
use serde_json::Value;
use store::{KvStore, StoreError};

/// Store keys for the two free-text documents the Dispatcher mutates.
/// Not named explicitly in §3's entity table (only `learnings:tactical:index`
/// is); chosen to match that table's `{entity}:{qualifier}` convention.
pub const PRODUCT_BRIEF_KEY: &str = "product:brief";
pub const WORKLIST_KEY: &str = "worklist:content";
pub const LEARNINGS_INDEX_KEY: &str = "learnings:tactical:index";

/// One line of §4.5's "Active Experiments" prompt section.
#[derive(Debug, Clone)]
pub struct ExperimentSummary {
    pub id: String,
    pub state: String,
    pub name: String,
}

/// Everything the Orchestrator reasons over besides the triggering message:
/// the product brief, worklist, accumulated learnings, active experiments,
/// registered tools, and a recent-metrics snapshot.
#[derive(Debug, Clone, Default)]
pub struct Context {
    pub product: Option<String>,
    pub worklist: Option<String>,
    pub learnings: Option<String>,
    pub active_experiments: Vec<ExperimentSummary>,
    pub available_tools: Vec<String>,
    pub recent_metrics: serde_json::Map<String, Value>,
}

fn format_experiments_summary(experiments: &[ExperimentSummary]) -> String {
    if experiments.is_empty() {
        return "(No active experiments)".to_string();
    }
    experiments
        .iter()
        .map(|exp| format!("- {}: {} (state: {})", exp.id, exp.name, exp.state))
        .collect::<Vec<_>>()
        .join("\n")
}

fn format_metrics_summary(metrics: &serde_json::Map<String, Value>) -> String {
    if metrics.is_empty() {
        return "(No recent metrics)".to_string();
    }
    metrics
        .iter()
        .map(|(key, value)| match value {
            Value::Object(nested) => {
                let inner = nested
                    .iter()
                    .map(|(k, v)| format!("{k}={v}"))
                    .collect::<Vec<_>>()
                    .join(", ");
                format!("- {key}: {inner}")
            }
            other => format!("- {key}: {other}"),
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Build the full reasoning prompt: the incoming message (as its raw JSON
/// envelope) followed by the formatted context sections and the decision
/// schema the model must reply with.
pub fn build_prompt(message_type: &str, source: &str, priority: &str, message_json: &Value, context: &Context) -> String {
    let experiments_summary = format_experiments_summary(&context.active_experiments);
    let tools_list = if context.available_tools.is_empty() {
        "(No tools registered)".to_string()
    } else {
        context.available_tools.join(", ")
    };
    let metrics_summary = format_metrics_summary(&context.recent_metrics);
    let message_pretty = serde_json::to_string_pretty(message_json).unwrap_or_default();

    format!(
        "## Incoming Message\nType: {message_type}\nSource: {source}\nPriority: {priority}\n\n\
Content:\n{message_pretty}\n\n## Current Context\n\n### Product\n{}\n\n### Worklist\n{}\n\n\
### Strategic Learnings\n{}\n\n### Active Experiments\n{experiments_summary}\n\n\
### Available Tools\n{tools_list}\n\n### Recent Metrics\n{metrics_summary}\n\n## Your Task\n\
Analyze this message and decide what action to take. Use your extended thinking to reason \
through the decision carefully.\n\nOutput your decision as a JSON object with the following \
structure:\n```json\n{{\n  \"action\": \"<action_type>\",\n  \"reasoning\": \"<brief explanation>\",\n  \
\"payload\": {{ ... }},\n  \"priority\": \"<low|medium|high|urgent>\"\n}}\n```\n\nValid actions: \
dispatch_to_builder, dispatch_to_fullsend, initiate_roundtable, kill_experiment, no_action, \
record_learning, respond_to_discord, update_worklist\n",
        context.product.as_deref().unwrap_or("(No product context available)"),
        context.worklist.as_deref().unwrap_or("(No worklist available)"),
        context.learnings.as_deref().unwrap_or("(No learnings recorded yet)"),
    )
}

/// Assemble a fresh `Context` from the store: the product brief and
/// worklist documents, the last 5 learnings (newest first, read back
/// through `learnings:tactical:index`), every experiment's id/state/
/// hypothesis, and every tool registered as `active`.
pub async fn load(store: &dyn KvStore) -> Context {
    let product = store.get(PRODUCT_BRIEF_KEY).await.ok().flatten();
    let worklist = store.get(WORKLIST_KEY).await.ok().flatten();
    let learnings = load_recent_learnings(store).await;

    let mut active_experiments = Vec::new();
    if let Ok(keys) = store.scan_keys("experiments:*").await {
        for key in keys {
            if let Ok(fields) = store.hash_get_all(&key).await {
                let id = key.strip_prefix("experiments:").unwrap_or(&key).to_string();
                let state = fields.get("state").cloned().unwrap_or_else(|| "unknown".to_string());
                let name = fields.get("hypothesis").cloned().unwrap_or_else(|| "unnamed".to_string());
                active_experiments.push(ExperimentSummary { id, state, name });
            }
        }
    }

    let mut available_tools = Vec::new();
    if let Ok(keys) = store.scan_keys("tools:*").await {
        for key in keys {
            if store.hash_get(&key, "state").await.ok().flatten().as_deref() == Some("active") {
                available_tools.push(key.strip_prefix("tools:").unwrap_or(&key).to_string());
            }
        }
    }

    Context { product, worklist, learnings, active_experiments, available_tools, recent_metrics: serde_json::Map::new() }
}

/// Overwrite the worklist document (`dispatcher.py::do_update_worklist`).
pub async fn update_worklist(store: &dyn KvStore, content: &str) -> Result<(), StoreError> {
    store.set(WORKLIST_KEY, content).await
}

/// Append a learning under an RFC3339 header, indexed in score order so
/// `load_recent_learnings` can read the last 5 back out
/// (`dispatcher.py::do_record_learning`).
pub async fn append_learning(store: &dyn KvStore, learning: &str) -> Result<(), StoreError> {
    let stamped_at = Utc::now();
    let entry_key = format!("learnings:entry:{}", stamped_at.timestamp_millis());
    let entry_text = format!("[{}] {learning}", stamped_at.to_rfc3339());
    store.set(&entry_key, &entry_text).await?;
    store.sorted_set_add(LEARNINGS_INDEX_KEY, &entry_key, stamped_at.timestamp() as f64).await
}

async fn load_recent_learnings(store: &dyn KvStore) -> Option<String> {
    let entry_keys = store.sorted_set_range(LEARNINGS_INDEX_KEY, -5, -1).await.ok()?;
    if entry_keys.is_empty() {
        return None;
    }
    let mut entries = Vec::new();
    for key in entry_keys.iter().rev() {
        if let Ok(Some(text)) = store.get(key).await {
            entries.push(text);
        }
    }
    Some(entries.join("\n\n"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn empty_context_uses_placeholders() {
        let context = Context::default();
        let prompt = build_prompt("escalation", "watcher", "medium", &json!({"reason": "x"}), &context);
        assert!(prompt.contains("(No active experiments)"));
        assert!(prompt.contains("(No tools registered)"));
        assert!(prompt.contains("(No recent metrics)"));
    }

    #[test]
    fn formats_active_experiments() {
        let context = Context {
            active_experiments: vec![ExperimentSummary { id: "e1".into(), state: "running".into(), name: "pricing test".into() }],
            ..Context::default()
        };
        let prompt = build_prompt("escalation", "watcher", "medium", &json!({}), &context);
        assert!(prompt.contains("- e1: pricing test (state: running)"));
    }

    #[tokio::test]
    async fn load_assembles_experiments_and_tools_from_the_store() {
        use store::InMemoryStore;

        let store = InMemoryStore::new();
        store.set(PRODUCT_BRIEF_KEY, "sell widgets").await.unwrap();
        store.hash_set("experiments:e1", "state", "running").await.unwrap();
        store.hash_set("experiments:e1", "hypothesis", "pricing test").await.unwrap();
        store.hash_set("tools:mailer", "state", "active").await.unwrap();
        store.hash_set("tools:retired", "state", "inactive").await.unwrap();

        let context = load(&store).await;
        assert_eq!(context.product.as_deref(), Some("sell widgets"));
        assert_eq!(context.active_experiments.len(), 1);
        assert_eq!(context.active_experiments[0].id, "e1");
        assert_eq!(context.available_tools, vec!["mailer".to_string()]);
    }

    #[tokio::test]
    async fn update_worklist_overwrites_the_document() {
        use store::InMemoryStore;

        let store = InMemoryStore::new();
        update_worklist(&store, "ship v1").await.unwrap();
        update_worklist(&store, "ship v2").await.unwrap();
        assert_eq!(store.get(WORKLIST_KEY).await.unwrap().as_deref(), Some("ship v2"));
    }

    #[tokio::test]
    async fn append_learning_is_readable_back_through_load() {
        use store::InMemoryStore;

        let store = InMemoryStore::new();
        append_learning(&store, "pricing tests convert better above $20").await.unwrap();
        let context = load(&store).await;
        assert!(context.learnings.unwrap().contains("pricing tests convert better above $20"));
    }
}
