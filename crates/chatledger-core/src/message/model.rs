//! Message data models.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Kind of content a message carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageKind {
    /// Plain text message.
    #[default]
    Text,
    /// Image attachment message.
    Image,
    /// Generic file attachment message.
    File,
    /// System-generated notice (member joined, title changed, ...).
    System,
}

impl MessageKind {
    /// Parse from database string representation.
    #[must_use]
    pub fn parse(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "image" => Self::Image,
            "file" => Self::File,
            "system" => Self::System,
            _ => Self::Text,
        }
    }

    /// Convert to database string representation.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Text => "text",
            Self::Image => "image",
            Self::File => "file",
            Self::System => "system",
        }
    }
}

/// A message within a conversation thread.
///
/// Content is immutable once created; only the `read_by` receipt map changes
/// after the fact, which is why merges union it instead of replacing it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ThreadMessage {
    /// Message identifier.
    pub id: String,
    /// Thread this message belongs to.
    pub thread_id: String,
    /// User who sent the message.
    pub sender_id: String,
    /// Content kind.
    pub kind: MessageKind,
    /// Message body text.
    pub body: String,
    /// URL of an attached media asset, the key into the media cache.
    pub attachment_url: Option<String>,
    /// Parent message id when this message is a threaded reply.
    pub parent_message_id: Option<String>,
    /// Number of replies to this message.
    pub reply_count: u32,
    /// Read receipts: user id to the time they first read the message.
    pub read_by: BTreeMap<String, DateTime<Utc>>,
    /// When the message was sent.
    pub created_at: DateTime<Utc>,
}

impl ThreadMessage {
    /// Create a new text message.
    #[must_use]
    pub fn new(
        id: impl Into<String>,
        thread_id: impl Into<String>,
        sender_id: impl Into<String>,
        body: impl Into<String>,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: id.into(),
            thread_id: thread_id.into(),
            sender_id: sender_id.into(),
            kind: MessageKind::Text,
            body: body.into(),
            attachment_url: None,
            parent_message_id: None,
            reply_count: 0,
            read_by: BTreeMap::new(),
            created_at,
        }
    }

    /// Returns true if this message is a threaded reply.
    #[must_use]
    pub const fn is_reply(&self) -> bool {
        self.parent_message_id.is_some()
    }

    /// Returns true if the given user has read this message.
    #[must_use]
    pub fn is_read_by(&self, user_id: &str) -> bool {
        self.read_by.contains_key(user_id)
    }

    /// Record a read receipt, keeping the earliest time if one exists.
    pub fn mark_read_by(&mut self, user_id: &str, at: DateTime<Utc>) {
        self.read_by
            .entry(user_id.to_string())
            .and_modify(|existing| {
                if at < *existing {
                    *existing = at;
                }
            })
            .or_insert(at);
    }
}

/// Pagination options for reading cached messages.
#[derive(Debug, Clone, Copy, Default)]
pub struct MessageQuery {
    /// Maximum number of messages to return; the most recent page wins.
    pub limit: Option<u32>,
    /// Only messages strictly older than this timestamp (for older pages).
    pub before: Option<DateTime<Utc>>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn test_message_kind_roundtrip() {
        for kind in [
            MessageKind::Text,
            MessageKind::Image,
            MessageKind::File,
            MessageKind::System,
        ] {
            assert_eq!(MessageKind::parse(kind.as_str()), kind);
        }
    }

    #[test]
    fn test_message_kind_parse_defaults_to_text() {
        assert_eq!(MessageKind::parse("sticker"), MessageKind::Text);
    }

    #[test]
    fn test_mark_read_by_keeps_earliest_receipt() {
        let now = Utc::now();
        let mut msg = ThreadMessage::new("m1", "t1", "alice", "hi", now);

        msg.mark_read_by("bob", now);
        msg.mark_read_by("bob", now + Duration::minutes(5));
        assert_eq!(msg.read_by["bob"], now);

        msg.mark_read_by("bob", now - Duration::minutes(5));
        assert_eq!(msg.read_by["bob"], now - Duration::minutes(5));
    }

    #[test]
    fn test_is_reply() {
        let now = Utc::now();
        let mut msg = ThreadMessage::new("m2", "t1", "bob", "re: hi", now);
        assert!(!msg.is_reply());

        msg.parent_message_id = Some("m1".into());
        assert!(msg.is_reply());
    }
}
