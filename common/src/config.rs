//! Unified settings, one struct per component reading from environment
//! variables with the defaults enumerated in §6.

use std::env;

use crate::error::FabricError;

fn env_string(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_parsed<T: std::str::FromStr>(key: &str, default: T) -> T {
    env::var(key).ok().and_then(|v| v.parse().ok()).unwrap_or(default)
}

fn env_required(key: &str) -> Result<String, FabricError> {
    env::var(key).map_err(|_| FabricError::Fatal(format!("missing required env var {key}")))
}

/// Settings common to every component: broker/store endpoints and the
/// channel prefix.
#[derive(Debug, Clone)]
pub struct CommonSettings {
    pub bus_url: String,
    pub redis_url: String,
    pub channel_prefix: String,
}

impl CommonSettings {
    pub fn from_env() -> Self {
        Self {
            bus_url: env_string("BUS_URL", "redis://localhost:6379"),
            redis_url: env_string("REDIS_URL", "redis://localhost:6379"),
            channel_prefix: env_string("CHANNEL_PREFIX", ""),
        }
    }
}

/// Watcher-specific settings: §4.3/§4.4 temperatures, token caps, retries.
#[derive(Debug, Clone)]
pub struct WatcherSettings {
    pub common: CommonSettings,
    pub classification_temperature: f64,
    pub classification_max_tokens: u32,
    pub response_temperature: f64,
    pub response_max_tokens: u32,
    pub model_retry_attempts: u32,
    pub model_retry_base_delay_seconds: f64,
    pub model_retry_max_delay_seconds: f64,
}

impl WatcherSettings {
    pub fn from_env() -> Self {
        Self {
            common: CommonSettings::from_env(),
            classification_temperature: env_parsed("CLASSIFICATION_TEMPERATURE", 0.1),
            classification_max_tokens: env_parsed("CLASSIFICATION_MAX_TOKENS", 500),
            response_temperature: env_parsed("RESPONSE_TEMPERATURE", 0.3),
            response_max_tokens: env_parsed("RESPONSE_MAX_TOKENS", 200),
            model_retry_attempts: env_parsed("MODEL_RETRY_ATTEMPTS", 3),
            model_retry_base_delay_seconds: env_parsed("MODEL_RETRY_BASE_DELAY", 1.0),
            model_retry_max_delay_seconds: env_parsed("MODEL_RETRY_MAX_DELAY", 10.0),
        }
    }
}

/// Orchestrator-specific settings: §4.5/§4.10 timeouts.
#[derive(Debug, Clone)]
pub struct OrchestratorSettings {
    pub common: CommonSettings,
    pub thinking_timeout_seconds: u64,
    pub roundtable_timeout_seconds: u64,
    pub roundtable_max_rounds: u32,
    pub builder_timeout_seconds: u64,
    pub orchestrator_max_tokens: u32,
    pub orchestrator_thinking_budget: u32,
}

impl OrchestratorSettings {
    pub fn from_env() -> Self {
        Self {
            common: CommonSettings::from_env(),
            thinking_timeout_seconds: env_parsed("THINKING_TIMEOUT_SECONDS", 60),
            roundtable_timeout_seconds: env_parsed("ROUNDTABLE_TIMEOUT_SECONDS", 120),
            roundtable_max_rounds: env_parsed("ROUNDTABLE_MAX_ROUNDS", 3),
            builder_timeout_seconds: env_parsed("BUILDER_TIMEOUT", 900),
            orchestrator_max_tokens: env_parsed("ORCHESTRATOR_MAX_TOKENS", 16_000),
            orchestrator_thinking_budget: env_parsed("ORCHESTRATOR_THINKING_BUDGET", 10_000),
        }
    }
}

/// Executor-specific settings: §4.9's per-tool wall clock, plus (§9's
/// schedule-consultation supplement) how often the run loop polls
/// `schedules:*` for due experiments.
#[derive(Debug, Clone)]
pub struct ExecutorSettings {
    pub common: CommonSettings,
    pub tool_execution_timeout_seconds: u64,
    pub poll_interval_seconds: u64,
}

impl ExecutorSettings {
    pub fn from_env() -> Self {
        Self {
            common: CommonSettings::from_env(),
            tool_execution_timeout_seconds: env_parsed("TOOL_EXECUTION_TIMEOUT", 60),
            poll_interval_seconds: env_parsed("EXECUTOR_POLL_INTERVAL_SECONDS", 30),
        }
    }
}

/// Redis Agent settings: §4.7/§4.8 cooldown and poll interval.
#[derive(Debug, Clone)]
pub struct RedisAgentSettings {
    pub common: CommonSettings,
    pub alert_cooldown_seconds: i64,
    pub threshold_check_interval_seconds: u64,
    pub summary_interval_seconds: u64,
}

impl RedisAgentSettings {
    pub fn from_env() -> Self {
        Self {
            common: CommonSettings::from_env(),
            alert_cooldown_seconds: env_parsed("ALERT_COOLDOWN_SECONDS", 300),
            threshold_check_interval_seconds: env_parsed("THRESHOLD_CHECK_INTERVAL_SECONDS", 60),
            summary_interval_seconds: env_parsed("SUMMARY_INTERVAL_SECONDS", 3600),
        }
    }
}

/// Fails fast on missing mandatory config, per §6's exit-code contract:
/// a service exits non-zero before accepting traffic rather than limping
/// along with an empty credential.
pub fn require_mandatory(key: &str) -> Result<String, FabricError> {
    env_required(key)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_spec_table() {
        let settings = RedisAgentSettings {
            common: CommonSettings {
                bus_url: String::new(),
                redis_url: String::new(),
                channel_prefix: String::new(),
            },
            alert_cooldown_seconds: env_parsed("__unset_cooldown__", 300),
            threshold_check_interval_seconds: env_parsed("__unset_interval__", 60),
            summary_interval_seconds: env_parsed("__unset_summary__", 3600),
        };
        assert_eq!(settings.alert_cooldown_seconds, 300);
        assert_eq!(settings.threshold_check_interval_seconds, 60);
        assert_eq!(settings.summary_interval_seconds, 3600);
    }

    #[test]
    fn require_mandatory_reports_fatal_when_missing() {
        let err = require_mandatory("__DEFINITELY_UNSET_GTM_FABRIC_VAR__").unwrap_err();
        assert!(matches!(err, FabricError::Fatal(_)));
    }
}
