//! Realtime Wire Frames
//!
//! Every frame the server pushes over the realtime connection is an [`Envelope`]:
//! a JSON object with exactly `type`, `content` and `timestamp`. Frames sent by the
//! client carry only a `content` string.

use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

/// Content of the frame emitted after every agent step.
pub const SEPARATOR: &str = "-------------------";

/// Discriminates what an [`Envelope`]'s `content` holds.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum EnvelopeKind {
    /// The greeting sent right after the connection opens.
    Connection,
    /// Human-readable text: agent output, mode confirmations, separators.
    Message,
    /// A recoverable problem reported to the client.
    Error,
    /// The raw (usually JSON-encoded) result of a tool invocation.
    Tools,
}

/// A single server-to-client frame.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct Envelope {
    #[serde(rename = "type")]
    pub kind: EnvelopeKind,
    pub content: String,
    /// ISO-8601 UTC timestamp with millisecond precision.
    pub timestamp: String,
}

impl Envelope {
    /// Builds an envelope stamped with the current time.
    pub fn new(kind: EnvelopeKind, content: impl Into<String>) -> Self {
        Self {
            kind,
            content: content.into(),
            timestamp: Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
        }
    }

    pub fn connection(content: impl Into<String>) -> Self {
        Self::new(EnvelopeKind::Connection, content)
    }

    pub fn message(content: impl Into<String>) -> Self {
        Self::new(EnvelopeKind::Message, content)
    }

    pub fn error(content: impl Into<String>) -> Self {
        Self::new(EnvelopeKind::Error, content)
    }

    pub fn tools(content: impl Into<String>) -> Self {
        Self::new(EnvelopeKind::Tools, content)
    }

    pub fn separator() -> Self {
        Self::message(SEPARATOR)
    }

    pub fn is_separator(&self) -> bool {
        self.kind == EnvelopeKind::Message && self.content == SEPARATOR
    }
}

/// A client-to-server frame.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct InboundFrame {
    pub content: String,
}

impl InboundFrame {
    pub fn new(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Value;

    #[test]
    fn test_envelope_has_exactly_three_fields() {
        let json = serde_json::to_value(Envelope::tools("{}")).unwrap();
        let obj = json.as_object().unwrap();

        assert_eq!(obj.len(), 3);
        assert_eq!(obj["type"], Value::String("tools".to_string()));
        assert_eq!(obj["content"], Value::String("{}".to_string()));
        assert!(obj.contains_key("timestamp"));
    }

    #[test]
    fn test_timestamp_is_iso8601_utc() {
        let env = Envelope::message("hi");
        assert!(env.timestamp.ends_with('Z'));
        assert!(chrono::DateTime::parse_from_rfc3339(&env.timestamp).is_ok());
    }

    #[test]
    fn test_separator_detection() {
        assert!(Envelope::separator().is_separator());
        assert!(!Envelope::tools(SEPARATOR).is_separator());
        assert!(!Envelope::message("text").is_separator());
    }

    #[test]
    fn test_inbound_frame_parsing() {
        let frame: InboundFrame = serde_json::from_str(r#"{"content": "chat"}"#).unwrap();
        assert_eq!(frame.content, "chat");

        assert!(serde_json::from_str::<InboundFrame>(r#"{"text": "chat"}"#).is_err());
        assert!(serde_json::from_str::<InboundFrame>("chat").is_err());
    }
}
