//! Shared error taxonomy (§7's table of kinds, not service-specific types).

use thiserror::Error;

/// Error kinds shared across every component. Each variant maps to one row
/// of §7's taxonomy; the recovery policy lives with the caller, not here —
/// this type only classifies what happened.
#[derive(Debug, Error)]
pub enum FabricError {
    #[error("transport transient: {0}")]
    TransportTransient(String),

    #[error("store timeout: {0}")]
    StoreTimeout(String),

    #[error("model transient: {0}")]
    ModelTransient(String),

    #[error("model non-transient: {0}")]
    ModelNonTransient(String),

    #[error("protocol violation: {0}")]
    Protocol(String),

    #[error("tool not found: {0}")]
    ToolNotFound(String),

    #[error("tool timeout after {timeout_seconds}s: {tool}")]
    ToolTimeout { tool: String, timeout_seconds: u64 },

    #[error("tool error in {tool}: {class_name}: {message}")]
    ToolError {
        tool: String,
        class_name: String,
        message: String,
    },

    #[error("supervisor failure: {0}")]
    Supervisor(String),

    #[error("fatal configuration error: {0}")]
    Fatal(String),
}

impl From<serde_json::Error> for FabricError {
    fn from(err: serde_json::Error) -> Self {
        Self::Protocol(err.to_string())
    }
}

impl FabricError {
    /// True for the kinds §7 marks as retry-eligible (transport/model
    /// transient); everything else is terminal for the current attempt.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::TransportTransient(_) | Self::StoreTimeout(_) | Self::ModelTransient(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transient_kinds_are_flagged_retry_eligible() {
        assert!(FabricError::TransportTransient("x".into()).is_transient());
        assert!(FabricError::ModelTransient("x".into()).is_transient());
        assert!(!FabricError::Protocol("x".into()).is_transient());
        assert!(!FabricError::Fatal("x".into()).is_transient());
    }

    #[test]
    fn json_errors_classify_as_protocol() {
        let parse_err = serde_json::from_str::<serde_json::Value>("{").unwrap_err();
        let err: FabricError = parse_err.into();
        assert!(matches!(err, FabricError::Protocol(_)));
    }
}
