//! Decode-or-drop helper shared by every typed handler.
//!
//! §7's Protocol row: a malformed envelope or a missing required field is
//! dropped with a warning, and the dispatch loop continues — it must never
//! propagate as an error that could stall the Router.

use common::envelope::Envelope;
use serde::de::DeserializeOwned;
use tracing::warn;

/// Decode `payload` as `Envelope<T>`, logging and returning `None` on any
/// parse failure instead of propagating it.
pub fn decode_or_warn<T: DeserializeOwned>(channel: &str, payload: &str) -> Option<Envelope<T>> {
    match common::envelope::decode::<T>(payload) {
        Ok(envelope) => Some(envelope),
        Err(err) => {
            warn!(%channel, error = %err, "dropping malformed envelope");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::{Deserialize, Serialize};

    #[derive(Debug, Deserialize, Serialize)]
    struct Payload {
        value: u32,
    }

    #[test]
    fn malformed_json_decodes_to_none() {
        assert!(decode_or_warn::<Payload>("topic", "not json").is_none());
    }

    #[test]
    fn missing_required_field_decodes_to_none() {
        let raw = r#"{"type":"x","source":"s","timestamp":"2026-01-01T00:00:00Z"}"#;
        assert!(decode_or_warn::<Payload>("topic", raw).is_none());
    }

    #[test]
    fn well_formed_envelope_decodes() {
        let raw = r#"{"type":"x","source":"s","timestamp":"2026-01-01T00:00:00Z","value":7}"#;
        let envelope = decode_or_warn::<Payload>("topic", raw).expect("decodes");
        assert_eq!(envelope.payload.value, 7);
    }
}
