//! Strict parsing of a classification model's raw reply (grounded on
//! `classifier.py::parse_classification`).

use common::Priority;
use serde::Deserialize;
use tracing::warn;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClassificationAction {
    Ignore,
    Answer,
    Escalate,
}

impl ClassificationAction {
    fn parse(raw: &str) -> Option<Self> {
        match raw {
            "ignore" => Some(Self::Ignore),
            "answer" => Some(Self::Answer),
            "escalate" => Some(Self::Escalate),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Classification {
    pub action: ClassificationAction,
    pub reason: String,
    pub priority: Priority,
    pub suggested_response: Option<String>,
}

impl Classification {
    /// The hardcoded fail-safe used whenever the model's reply can't be
    /// trusted: escalate, at medium priority, for visibility.
    fn fail_safe(reason: &str) -> Self {
        Self {
            action: ClassificationAction::Escalate,
            reason: reason.to_string(),
            priority: Priority::Medium,
            suggested_response: None,
        }
    }
}

/// Raw shape expected out of the model's JSON object, before action/priority
/// validation.
#[derive(Debug, Deserialize)]
struct RawClassification {
    action: String,
    #[serde(default = "default_reason")]
    reason: String,
    #[serde(default = "default_priority")]
    priority: String,
    suggested_response: Option<String>,
}

fn default_reason() -> String {
    String::new()
}

fn default_priority() -> String {
    "medium".to_string()
}

/// Extract the first balanced `{...}` span from `text`, ignoring braces
/// inside string literals.
fn first_json_object(text: &str) -> Option<&str> {
    let bytes = text.as_bytes();
    let start = text.find('{')?;
    let mut depth = 0i32;
    let mut in_string = false;
    let mut escaped = false;

    for (offset, &byte) in bytes.iter().enumerate().skip(start) {
        if in_string {
            if escaped {
                escaped = false;
            } else if byte == b'\\' {
                escaped = true;
            } else if byte == b'"' {
                in_string = false;
            }
            continue;
        }

        match byte {
            b'"' => in_string = true,
            b'{' => depth += 1,
            b'}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(&text[start..=offset]);
                }
            }
            _ => {}
        }
    }
    None
}

/// Strip a single ```` ```json ... ``` ```` or ```` ``` ... ``` ```` fence,
/// if the reply is wrapped in one.
fn strip_code_fence(text: &str) -> &str {
    let trimmed = text.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let rest = rest.strip_prefix("json").unwrap_or(rest);
    let rest = rest.strip_prefix('\n').unwrap_or(rest);
    rest.strip_suffix("```").unwrap_or(rest).trim()
}

/// Parse a classification model's raw text reply following the original's
/// strict rules: try the raw text as JSON, then a stripped code fence, then
/// the first balanced `{...}` span found anywhere in the text. An unknown
/// `action` or `priority` is coerced (escalate/medium) with a warning; any
/// parse failure falls back to the hardcoded escalate/medium fail-safe.
pub fn parse_classification(raw_text: &str) -> Classification {
    let candidates = [raw_text.trim(), strip_code_fence(raw_text)]
        .into_iter()
        .chain(first_json_object(raw_text));

    for candidate in candidates {
        if let Some(parsed) = try_parse(candidate) {
            return parsed;
        }
    }

    warn!("classification parsing failed, escalating for safety");
    Classification::fail_safe("classification failure")
}

fn try_parse(candidate: &str) -> Option<Classification> {
    let raw: RawClassification = serde_json::from_str(candidate).ok()?;

    let action = match ClassificationAction::parse(&raw.action) {
        Some(action) => action,
        None => {
            warn!(action = %raw.action, "unknown classification action, escalating");
            ClassificationAction::Escalate
        }
    };
    let (priority, coerced) = Priority::parse_or_medium(&raw.priority);
    if coerced {
        warn!(priority = %raw.priority, "unknown classification priority, defaulting to medium");
    }

    Some(Classification {
        action,
        reason: raw.reason,
        priority,
        suggested_response: raw.suggested_response,
    })
}
