//! Exercises the full "scenario 5" path from §8's testable properties:
//! a chat escalation reaches the Orchestrator, the reasoning model asks to
//! kill an experiment, and the Dispatcher archives it in the store.

use std::sync::Arc;

use common::config::{CommonSettings, OrchestratorSettings, WatcherSettings};
use common::messages::RawChatMessage;
use common::{Channels, Envelope};
use orchestrator::{context, Dispatcher, OrchestratorAgent};
use store::{InMemoryStore, KvStore};
use test_utils::{AlwaysErrorsModel, ScriptedModel};
use watcher::classification::ClassificationAction;
use watcher::Classifier;

fn watcher_settings() -> WatcherSettings {
    WatcherSettings {
        common: CommonSettings { bus_url: String::new(), redis_url: String::new(), channel_prefix: String::new() },
        classification_temperature: 0.1,
        classification_max_tokens: 500,
        response_temperature: 0.3,
        response_max_tokens: 200,
        model_retry_attempts: 1,
        model_retry_base_delay_seconds: 0.001,
        model_retry_max_delay_seconds: 0.002,
    }
}

fn orchestrator_settings() -> OrchestratorSettings {
    OrchestratorSettings {
        common: CommonSettings { bus_url: String::new(), redis_url: String::new(), channel_prefix: String::new() },
        thinking_timeout_seconds: 5,
        roundtable_timeout_seconds: 5,
        roundtable_max_rounds: 1,
        builder_timeout_seconds: 5,
        orchestrator_max_tokens: 1000,
        orchestrator_thinking_budget: 1000,
    }
}

#[tokio::test]
async fn a_hard_to_classify_message_escalates_and_the_orchestrator_kills_the_experiment() {
    let store: Arc<dyn KvStore> = Arc::new(InMemoryStore::new());
    store.hash_set("experiments:e9", "state", "running").await.unwrap();

    // The classification model always errors, so the Classifier falls back
    // to its fail-safe escalate/medium (§4.3).
    let classifier = Classifier::new(Arc::new(AlwaysErrorsModel), watcher_settings());
    let message = RawChatMessage {
        username: "alice".to_string(),
        channel_id: "c1".to_string(),
        channel_name: "growth".to_string(),
        content: "experiment e9 has been stagnant for two weeks, can we kill it?".to_string(),
        mentions_bot: true,
    };
    let classification = classifier.classify(&message).await;
    assert_eq!(classification.action, ClassificationAction::Escalate);
    assert_eq!(classification.reason, "classification failure");

    let escalation = Envelope::new(
        "escalation",
        "watcher",
        common::messages::Escalation {
            reason: classification.reason.clone(),
            priority: classification.priority,
            original_message: message,
            suggested_response: None,
        },
    );
    let wire = common::envelope::encode(&escalation).unwrap();
    let incoming: serde_json::Value = serde_json::from_str(&wire).unwrap();

    // The reasoning model replies with a kill_experiment decision.
    let reasoning_reply = r#"{"action":"kill_experiment","reasoning":"stagnant",
        "priority":"high","experiment_id":"e9"}"#;
    let agent = OrchestratorAgent::new(Arc::new(ScriptedModel::new(reasoning_reply)), orchestrator_settings());
    let context = context::load(store.as_ref()).await;
    let decision = agent
        .process_with_thinking("escalation", "watcher", "high", &incoming, &context)
        .await;
    assert_eq!(decision.experiment_id.as_deref(), Some("e9"));

    let bus: Arc<dyn bus::BusClient> = Arc::new(bus::LocalBus::new());
    let dispatcher = Dispatcher::new(bus, store.clone(), Channels::default(), orchestrator_settings());
    dispatcher.execute(&decision, &incoming).await.unwrap();

    let fields = store.hash_get_all("experiments:e9").await.unwrap();
    assert_eq!(fields.get("state").map(String::as_str), Some("archived"));
    assert_eq!(fields.get("archived_by").map(String::as_str), Some("orchestrator"));
    assert_eq!(fields.get("archived_reason").map(String::as_str), Some("stagnant"));
}
