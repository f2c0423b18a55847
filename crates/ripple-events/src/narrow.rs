//! Narrow filters for delivered message events.
//!
//! A narrow restricts which `message` events a queue receives; all other
//! event kinds pass through untouched. Clients express narrows as a list of
//! `(operator, operand)` terms; the core honors `stream` and `topic`.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::event::{MessageData, RecipientKind};

/// Errors from parsing a client-supplied narrow.
#[derive(Debug, Error)]
pub enum NarrowError {
    /// Operator the core does not support.
    #[error("Unsupported narrow operator: {0}")]
    UnsupportedOperator(String),

    /// Operand was empty.
    #[error("Empty operand for narrow operator: {0}")]
    EmptyOperand(String),
}

/// Lookup boundary for validating stream references at allocation time.
///
/// Implemented by the domain collaborator that owns stream records.
pub trait StreamDirectory: Send + Sync {
    /// Whether a stream with this name exists (case-insensitive).
    fn has_stream(&self, name: &str) -> bool;
}

/// A parsed narrow filter.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Narrow {
    #[serde(skip_serializing_if = "Option::is_none")]
    stream: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    topic: Option<String>,
}

impl Narrow {
    /// The unrestricted narrow: every message event matches.
    #[must_use]
    pub fn all() -> Self {
        Self::default()
    }

    /// Narrow to a single stream.
    #[must_use]
    pub fn stream_only(name: impl Into<String>) -> Self {
        Self {
            stream: Some(name.into()),
            topic: None,
        }
    }

    /// Parse client-supplied `(operator, operand)` terms.
    ///
    /// # Errors
    ///
    /// Returns an error on an unsupported operator or empty operand. A later
    /// term for the same operator replaces an earlier one.
    pub fn parse(terms: &[(String, String)]) -> Result<Self, NarrowError> {
        let mut narrow = Narrow::default();
        for (operator, operand) in terms {
            if operand.is_empty() {
                return Err(NarrowError::EmptyOperand(operator.clone()));
            }
            match operator.as_str() {
                "stream" => narrow.stream = Some(operand.clone()),
                "topic" => narrow.topic = Some(operand.clone()),
                other => return Err(NarrowError::UnsupportedOperator(other.to_string())),
            }
        }
        Ok(narrow)
    }

    /// The stream this narrow is restricted to, if any.
    #[must_use]
    pub fn stream(&self) -> Option<&str> {
        self.stream.as_deref()
    }

    /// Whether this narrow restricts nothing.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.stream.is_none() && self.topic.is_none()
    }

    /// Fall back to the principal's configured default-events stream when
    /// the client supplied no narrow of its own.
    #[must_use]
    pub fn or_default(self, default_stream: Option<&str>) -> Self {
        if self.is_empty() {
            if let Some(name) = default_stream {
                return Narrow::stream_only(name);
            }
        }
        self
    }

    /// Whether a message event passes this narrow.
    #[must_use]
    pub fn matches(&self, message: &MessageData) -> bool {
        if let Some(stream) = &self.stream {
            if message.recipient_kind != RecipientKind::Stream
                || !message.display_recipient.eq_ignore_ascii_case(stream)
            {
                return false;
            }
        }
        if let Some(topic) = &self.topic {
            if !message.subject.eq_ignore_ascii_case(topic) {
                return false;
            }
        }
        true
    }
}

/// Resolve the effective `all_public_streams` flag for a registration.
///
/// An explicitly passed value always wins; `None` falls back to the
/// principal's stored default.
#[must_use]
pub fn resolve_all_public_streams(passed: Option<bool>, default: bool) -> bool {
    passed.unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stream_message(stream: &str, subject: &str) -> MessageData {
        MessageData {
            id: 1,
            sender_email: "hamlet@example.com".into(),
            recipient_kind: RecipientKind::Stream,
            display_recipient: stream.into(),
            subject: subject.into(),
            content: "hello".into(),
            timestamp: 0,
        }
    }

    fn private_message() -> MessageData {
        MessageData {
            id: 2,
            sender_email: "hamlet@example.com".into(),
            recipient_kind: RecipientKind::Private,
            display_recipient: "othello@example.com".into(),
            subject: String::new(),
            content: "hello".into(),
            timestamp: 0,
        }
    }

    #[test]
    fn test_parse_stream_narrow() {
        let narrow = Narrow::parse(&[("stream".into(), "denmark".into())]).unwrap();
        assert_eq!(narrow.stream(), Some("denmark"));
        assert!(!narrow.is_empty());
    }

    #[test]
    fn test_parse_rejects_unknown_operator() {
        assert!(matches!(
            Narrow::parse(&[("sender".into(), "hamlet".into())]),
            Err(NarrowError::UnsupportedOperator(_))
        ));
        assert!(matches!(
            Narrow::parse(&[("stream".into(), String::new())]),
            Err(NarrowError::EmptyOperand(_))
        ));
    }

    #[test]
    fn test_empty_narrow_matches_everything() {
        let narrow = Narrow::all();
        assert!(narrow.matches(&stream_message("denmark", "siege")));
        assert!(narrow.matches(&private_message()));
    }

    #[test]
    fn test_stream_narrow_excludes_private_messages() {
        let narrow = Narrow::stream_only("denmark");
        assert!(narrow.matches(&stream_message("Denmark", "siege")));
        assert!(!narrow.matches(&stream_message("verona", "siege")));
        assert!(!narrow.matches(&private_message()));
    }

    #[test]
    fn test_topic_narrow() {
        let narrow = Narrow::parse(&[
            ("stream".into(), "denmark".into()),
            ("topic".into(), "siege".into()),
        ])
        .unwrap();
        assert!(narrow.matches(&stream_message("denmark", "Siege")));
        assert!(!narrow.matches(&stream_message("denmark", "supplies")));
    }

    #[test]
    fn test_or_default_used_only_when_empty() {
        let explicit = Narrow::stream_only("my_stream").or_default(Some("verona"));
        assert_eq!(explicit.stream(), Some("my_stream"));

        let fallback = Narrow::all().or_default(Some("verona"));
        assert_eq!(fallback.stream(), Some("verona"));

        let none = Narrow::all().or_default(None);
        assert!(none.is_empty());
    }

    #[test]
    fn test_resolve_all_public_streams() {
        assert!(resolve_all_public_streams(Some(true), false));
        assert!(!resolve_all_public_streams(Some(false), true));
        assert!(resolve_all_public_streams(None, true));
        assert!(!resolve_all_public_streams(None, false));
    }
}
