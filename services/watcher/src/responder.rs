//! Generates a direct reply for messages the Classifier routed to `answer`,
//! reading read-only status data from the store (grounded on
//! `responder.py::generate_response`/`get_system_status`).

use std::sync::Arc;
use std::time::Duration;

use common::config::WatcherSettings;
use common::messages::RawChatMessage;
use common::retry::retry_with_backoff;
use store::KvStore;

use crate::classification::Classification;
use crate::model::ResponseModel;

const PROMPT_TEMPLATE: &str = "A user asked: \"{query}\"\n\nCurrent system status: \
{status}. {active}/{total} experiments are active.\n\nRecent activity:\n{recent_activity}\n\n\
Write a short, direct reply.";

/// System status read out of the store for the responder's prompt; also
/// useful on its own for a "what's the status" style answer.
#[derive(Debug, Clone)]
pub struct SystemStatus {
    pub status: String,
    pub active_experiments: u64,
    pub total_experiments: u64,
    pub recent_runs: Vec<String>,
}

async fn read_system_status(store: &dyn KvStore) -> SystemStatus {
    let status = store
        .get("fullsend:status")
        .await
        .ok()
        .flatten()
        .unwrap_or_else(|| "unknown".to_string());

    let mut active = 0u64;
    let mut total = 0u64;
    if let Ok(keys) = store.scan_keys("experiments:*").await {
        for key in keys {
            if let Ok(Some(state)) = store.hash_get(&key, "state").await {
                total += 1;
                if state == "running" {
                    active += 1;
                }
            }
        }
    }

    let recent_runs = store
        .list_range("fullsend:recent_runs", 0, 4)
        .await
        .unwrap_or_default();

    SystemStatus { status, active_experiments: active, total_experiments: total, recent_runs }
}

/// Summarize up to the 3 most recent activity entries for the prompt.
fn format_recent_activity(recent_runs: &[String]) -> String {
    if recent_runs.is_empty() {
        return "No recent activity".to_string();
    }
    let lines: Vec<String> = recent_runs
        .iter()
        .take(3)
        .map(|entry| {
            let summary = serde_json::from_str::<serde_json::Value>(entry)
                .ok()
                .and_then(|v| {
                    v.get("summary")
                        .or_else(|| v.get("type"))
                        .and_then(|s| s.as_str())
                        .map(str::to_string)
                })
                .unwrap_or_else(|| entry.clone());
            format!("- {summary}")
        })
        .collect();
    lines.join("\n")
}

pub struct Responder {
    model: Arc<dyn ResponseModel>,
    settings: WatcherSettings,
}

impl Responder {
    pub fn new(model: Arc<dyn ResponseModel>, settings: WatcherSettings) -> Self {
        Self { model, settings }
    }

    /// Produce the text to send back to chat. If the Classifier already
    /// supplied a `suggested_response`, that is used verbatim; otherwise a
    /// fresh reply is generated against current store state.
    pub async fn respond(
        &self,
        message: &RawChatMessage,
        classification: &Classification,
        store: &dyn KvStore,
    ) -> anyhow::Result<String> {
        if let Some(suggested) = &classification.suggested_response {
            return Ok(suggested.clone());
        }

        let status = read_system_status(store).await;
        let prompt = PROMPT_TEMPLATE
            .replace("{query}", &message.content)
            .replace("{status}", &status.status)
            .replace("{active}", &status.active_experiments.to_string())
            .replace("{total}", &status.total_experiments.to_string())
            .replace("{recent_activity}", &format_recent_activity(&status.recent_runs));

        let result = retry_with_backoff(
            self.settings.model_retry_attempts,
            Duration::from_secs_f64(self.settings.model_retry_base_delay_seconds),
            Duration::from_secs_f64(self.settings.model_retry_max_delay_seconds),
            |_attempt| {
                let model = Arc::clone(&self.model);
                let prompt = prompt.clone();
                let temperature = self.settings.response_temperature;
                let max_tokens = self.settings.response_max_tokens;
                async move {
                    common::telemetry::traced("respond", "response_model", async {
                        model.respond_raw(&prompt, temperature, max_tokens).await
                    })
                    .await
                }
            },
        )
        .await;

        Ok(result?.trim().to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classification::ClassificationAction;
    use crate::model::ModelError;
    use async_trait::async_trait;
    use common::config::CommonSettings;
    use common::Priority;
    use store::InMemoryStore;

    struct EchoModel;
    #[async_trait]
    impl ResponseModel for EchoModel {
        async fn respond_raw(&self, _prompt: &str, _t: f64, _m: u32) -> Result<String, ModelError> {
            Ok("  generated reply  ".to_string())
        }
    }

    fn settings() -> WatcherSettings {
        WatcherSettings {
            common: CommonSettings { bus_url: String::new(), redis_url: String::new(), channel_prefix: String::new() },
            classification_temperature: 0.1,
            classification_max_tokens: 500,
            response_temperature: 0.3,
            response_max_tokens: 200,
            model_retry_attempts: 3,
            model_retry_base_delay_seconds: 0.001,
            model_retry_max_delay_seconds: 0.002,
        }
    }

    fn message() -> RawChatMessage {
        RawChatMessage {
            username: "alice".into(),
            channel_id: "c1".into(),
            channel_name: "general".into(),
            content: "what's the status?".into(),
            mentions_bot: true,
        }
    }

    #[tokio::test]
    async fn uses_suggested_response_verbatim_when_present() {
        let responder = Responder::new(Arc::new(EchoModel), settings());
        let store = InMemoryStore::new();
        let classification = Classification {
            action: ClassificationAction::Answer,
            reason: "faq".into(),
            priority: Priority::Low,
            suggested_response: Some("we're running fine".into()),
        };
        let reply = responder.respond(&message(), &classification, &store).await.unwrap();
        assert_eq!(reply, "we're running fine");
    }

    #[tokio::test]
    async fn falls_back_to_model_call_and_trims_whitespace() {
        let responder = Responder::new(Arc::new(EchoModel), settings());
        let store = InMemoryStore::new();
        let classification = Classification {
            action: ClassificationAction::Answer,
            reason: "needs generation".into(),
            priority: Priority::Low,
            suggested_response: None,
        };
        let reply = responder.respond(&message(), &classification, &store).await.unwrap();
        assert_eq!(reply, "generated reply");
    }
}
