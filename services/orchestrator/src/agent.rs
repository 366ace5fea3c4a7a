//! The Orchestrator's extended-thinking decision loop
//! (grounded on `agent.py::OrchestratorAgent`/`process_with_thinking`).

use std::sync::Arc;
use std::time::Duration;

use common::config::OrchestratorSettings;
use serde_json::Value;
use tracing::{error, info};

use crate::context::{build_prompt, Context};
use crate::decision::{parse_decision, Decision};
use crate::model::{ReasoningError, ReasoningModel};

pub struct OrchestratorAgent {
    model: Arc<dyn ReasoningModel>,
    settings: OrchestratorSettings,
}

impl OrchestratorAgent {
    pub fn new(model: Arc<dyn ReasoningModel>, settings: OrchestratorSettings) -> Self {
        Self { model, settings }
    }

    /// Build the prompt, call the model under `thinking_timeout_seconds`,
    /// and return a validated `Decision` — or one of §4.5's typed fallbacks
    /// if thinking times out or the model call fails.
    pub async fn process_with_thinking(
        &self,
        message_type: &str,
        source: &str,
        priority: &str,
        message_json: &Value,
        context: &Context,
    ) -> Decision {
        let prompt = build_prompt(message_type, source, priority, message_json, context);
        info!(message_type, source, "processing message with extended thinking");

        let call = common::telemetry::traced("orchestrator.think", "reasoning_model", async {
            self.model
                .think(&prompt, self.settings.orchestrator_max_tokens, self.settings.orchestrator_thinking_budget)
                .await
        });

        match tokio::time::timeout(Duration::from_secs(self.settings.thinking_timeout_seconds), call).await {
            Ok(Ok(text)) => {
                let decision = parse_decision(&text);
                info!(action = ?decision.action, priority = %decision.priority, "decision made");
                decision
            }
            Ok(Err(ReasoningError::Connection(msg))) => {
                error!(error = %msg, "api connection error");
                Decision::api_error_fallback("connection_error", &msg)
            }
            Ok(Err(ReasoningError::RateLimit(msg))) => {
                error!(error = %msg, "api rate limit error");
                Decision::api_error_fallback("rate_limit", &msg)
            }
            Ok(Err(ReasoningError::Status { status_code, message })) => {
                error!(status_code, error = %message, "api status error");
                Decision::api_error_fallback(&format!("api_error_{status_code}"), &message)
            }
            Ok(Err(ReasoningError::Unexpected(msg))) => {
                error!(error = %msg, "unexpected error during thinking");
                Decision::api_error_fallback("unexpected_error", &msg)
            }
            Err(_elapsed) => {
                error!(timeout_seconds = self.settings.thinking_timeout_seconds, "orchestrator thinking timed out");
                Decision::timeout_fallback(self.settings.thinking_timeout_seconds)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decision::DecisionAction;
    use async_trait::async_trait;
    use common::config::CommonSettings;
    use serde_json::json;

    struct StubModel {
        reply: Result<String, &'static str>,
        delay: Duration,
    }

    #[async_trait]
    impl ReasoningModel for StubModel {
        async fn think(&self, _prompt: &str, _max_tokens: u32, _budget: u32) -> Result<String, ReasoningError> {
            tokio::time::sleep(self.delay).await;
            match &self.reply {
                Ok(text) => Ok(text.clone()),
                Err(_) => Err(ReasoningError::Connection("refused".to_string())),
            }
        }
    }

    fn settings(timeout_seconds: u64) -> OrchestratorSettings {
        OrchestratorSettings {
            common: CommonSettings { bus_url: String::new(), redis_url: String::new(), channel_prefix: String::new() },
            thinking_timeout_seconds: timeout_seconds,
            roundtable_timeout_seconds: 120,
            roundtable_max_rounds: 3,
            builder_timeout_seconds: 900,
            orchestrator_max_tokens: 16_000,
            orchestrator_thinking_budget: 10_000,
        }
    }

    #[tokio::test]
    async fn returns_parsed_decision_on_success() {
        let model = Arc::new(StubModel {
            reply: Ok(r#"{"action":"no_action","reasoning":"nothing pending"}"#.to_string()),
            delay: Duration::from_millis(1),
        });
        let agent = OrchestratorAgent::new(model, settings(5));
        let decision = agent
            .process_with_thinking("escalation", "watcher", "medium", &json!({}), &Context::default())
            .await;
        assert_eq!(decision.action, DecisionAction::NoAction);
    }

    #[tokio::test]
    async fn falls_back_to_timeout_decision() {
        let model = Arc::new(StubModel { reply: Ok("irrelevant".to_string()), delay: Duration::from_millis(50) });
        let agent = OrchestratorAgent::new(model, settings(0));
        let decision = agent
            .process_with_thinking("escalation", "watcher", "medium", &json!({}), &Context::default())
            .await;
        assert_eq!(decision.action, DecisionAction::RespondToDiscord);
    }

    #[tokio::test]
    async fn falls_back_to_connection_error_decision() {
        let model = Arc::new(StubModel { reply: Err("refused"), delay: Duration::from_millis(1) });
        let agent = OrchestratorAgent::new(model, settings(5));
        let decision = agent
            .process_with_thinking("escalation", "watcher", "medium", &json!({}), &Context::default())
            .await;
        assert_eq!(decision.action, DecisionAction::NoAction);
        assert_eq!(decision.priority, common::Priority::Low);
    }
}
