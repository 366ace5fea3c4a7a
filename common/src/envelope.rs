//! The self-describing envelope every bus message is wrapped in.
//!
//! Every envelope published on the bus carries `{type, source, timestamp,
//! ..payload fields}` as one flat JSON object (ported from how the Python
//! original builds its `json.dumps({...})` payloads) rather than nesting
//! the payload under a literal `payload` key.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// The fields present on every envelope regardless of payload type.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct EnvelopeHeader {
    #[serde(rename = "type")]
    pub message_type: String,
    pub source: String,
    pub timestamp: DateTime<Utc>,
}

impl EnvelopeHeader {
    /// Build a header stamped with the current time.
    pub fn new(message_type: impl Into<String>, source: impl Into<String>) -> Self {
        Self {
            message_type: message_type.into(),
            source: source.into(),
            timestamp: Utc::now(),
        }
    }
}

/// An envelope wrapping a typed payload with the mandatory header fields.
///
/// `T` is serialized flattened alongside the header so the wire form is one
/// flat object, matching §6's per-channel schemas.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Envelope<T> {
    #[serde(flatten)]
    pub header: EnvelopeHeader,
    #[serde(flatten)]
    pub payload: T,
}

impl<T> Envelope<T> {
    /// Wrap a payload with a freshly stamped header.
    pub fn new(message_type: impl Into<String>, source: impl Into<String>, payload: T) -> Self {
        Self {
            header: EnvelopeHeader::new(message_type, source),
            payload,
        }
    }

    pub fn message_type(&self) -> &str {
        &self.header.message_type
    }

    pub fn source(&self) -> &str {
        &self.header.source
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.header.timestamp
    }
}

/// Encode an envelope to its text-safe wire form.
pub fn encode<T: Serialize>(envelope: &Envelope<T>) -> Result<String, serde_json::Error> {
    serde_json::to_string(envelope)
}

/// Decode an envelope from its wire form.
///
/// Invalid encodings are the caller's responsibility to drop with a logged
/// warning (the Bus does this at the transport boundary); this function
/// simply reports the parse error.
pub fn decode<T: for<'de> Deserialize<'de>>(raw: &str) -> Result<Envelope<T>, serde_json::Error> {
    serde_json::from_str(raw)
}
