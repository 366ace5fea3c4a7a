//! Classifies an incoming chat message as `ignore`/`answer`/`escalate`
//! (grounded on `classifier.py::classify`).

use std::sync::Arc;
use std::time::Duration;

use common::config::WatcherSettings;
use common::messages::RawChatMessage;
use common::retry::retry_with_backoff;

use crate::classification::{parse_classification, Classification};
use crate::model::ClassificationModel;

const PROMPT_TEMPLATE: &str = "You are triaging a chat message for a GTM experimentation \
bot. Reply with a single JSON object: {{\"action\": \"ignore\"|\"answer\"|\"escalate\", \
\"reason\": string, \"priority\": \"low\"|\"medium\"|\"high\"|\"urgent\", \
\"suggested_response\": string|null}}.\n\nMessage from {username} in #{channel_name}: \
{content}";

pub struct Classifier {
    model: Arc<dyn ClassificationModel>,
    settings: WatcherSettings,
}

impl Classifier {
    pub fn new(model: Arc<dyn ClassificationModel>, settings: WatcherSettings) -> Self {
        Self { model, settings }
    }

    /// Classify `message`, retrying transient model failures up to
    /// `model_retry_attempts` times before falling back to the escalate/
    /// medium fail-safe.
    pub async fn classify(&self, message: &RawChatMessage) -> Classification {
        let prompt = PROMPT_TEMPLATE
            .replace("{username}", &message.username)
            .replace("{channel_name}", &message.channel_name)
            .replace("{content}", &message.content);

        let result = retry_with_backoff(
            self.settings.model_retry_attempts,
            Duration::from_secs_f64(self.settings.model_retry_base_delay_seconds),
            Duration::from_secs_f64(self.settings.model_retry_max_delay_seconds),
            |_attempt| {
                let model = Arc::clone(&self.model);
                let prompt = prompt.clone();
                let temperature = self.settings.classification_temperature;
                let max_tokens = self.settings.classification_max_tokens;
                async move {
                    common::telemetry::traced("classify", "classification_model", async {
                        model.classify_raw(&prompt, temperature, max_tokens).await
                    })
                    .await
                }
            },
        )
        .await;

        match result {
            Ok(raw_text) => parse_classification(&raw_text),
            Err(err) => {
                tracing::warn!(error = %err, "classification model call failed, escalating for safety");
                Classification {
                    action: crate::classification::ClassificationAction::Escalate,
                    reason: "classification failure".to_string(),
                    priority: common::Priority::Medium,
                    suggested_response: None,
                }
            }
        }
    }
}
