//! §8 testable property 8: if the reasoning call exceeds
//! `thinking_timeout_seconds`, the Orchestrator returns a fallback Decision
//! with `action == respond_to_discord` and `priority == medium` in bounded
//! time.

use std::sync::Arc;
use std::time::{Duration, Instant};

use common::config::{CommonSettings, OrchestratorSettings};
use common::Priority;
use orchestrator::decision::DecisionAction;
use orchestrator::{context, OrchestratorAgent};
use serde_json::json;
use store::InMemoryStore;
use test_utils::NeverRespondsModel;

#[tokio::test]
async fn a_model_call_that_never_resolves_yields_the_timeout_fallback_within_bounds() {
    let settings = OrchestratorSettings {
        common: CommonSettings { bus_url: String::new(), redis_url: String::new(), channel_prefix: String::new() },
        thinking_timeout_seconds: 1,
        roundtable_timeout_seconds: 5,
        roundtable_max_rounds: 1,
        builder_timeout_seconds: 5,
        orchestrator_max_tokens: 1000,
        orchestrator_thinking_budget: 1000,
    };

    let agent = OrchestratorAgent::new(Arc::new(NeverRespondsModel), settings.clone());
    let store = InMemoryStore::new();
    let context = context::load(&store).await;

    let started = Instant::now();
    let decision = agent
        .process_with_thinking("escalation", "watcher", "high", &json!({"content": "hello"}), &context)
        .await;
    let elapsed = started.elapsed();

    assert_eq!(decision.action, DecisionAction::RespondToDiscord);
    assert_eq!(decision.priority, Priority::Medium);
    assert!(
        elapsed < Duration::from_secs(settings.thinking_timeout_seconds) + Duration::from_millis(500),
        "timeout fallback took {elapsed:?}, expected close to {}s",
        settings.thinking_timeout_seconds
    );
}
