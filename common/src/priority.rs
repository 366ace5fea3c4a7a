//! Shared priority scale used by classifications, decisions, and alerts.

use serde::{Deserialize, Serialize};

/// Priority level, shared by `Classification`, `Decision`, and alert envelopes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Low,
    Medium,
    High,
    Urgent,
}

impl Priority {
    /// Parse a priority string case-insensitively, falling back to `Medium`
    /// (the safe default used throughout the spec) on anything unrecognized.
    ///
    /// Returns whether the value had to be coerced, so callers can log a warning.
    pub fn parse_or_medium(raw: &str) -> (Self, bool) {
        match raw.trim().to_ascii_lowercase().as_str() {
            "low" => (Self::Low, false),
            "medium" => (Self::Medium, false),
            "high" => (Self::High, false),
            "urgent" => (Self::Urgent, false),
            _ => (Self::Medium, true),
        }
    }

    /// String form used on the wire (`"low"`, `"medium"`, `"high"`, `"urgent"`).
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
            Self::Urgent => "urgent",
        }
    }
}

impl std::fmt::Display for Priority {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_priority_coerces_to_medium() {
        let (p, coerced) = Priority::parse_or_medium("bogus");
        assert_eq!(p, Priority::Medium);
        assert!(coerced);
    }

    #[test]
    fn known_priorities_round_trip() {
        for raw in ["low", "medium", "high", "urgent"] {
            let (p, coerced) = Priority::parse_or_medium(raw);
            assert!(!coerced);
            assert_eq!(p.as_str(), raw);
        }
    }

    #[test]
    fn parse_is_case_insensitive() {
        let (p, coerced) = Priority::parse_or_medium("URGENT");
        assert_eq!(p, Priority::Urgent);
        assert!(!coerced);
    }
}
