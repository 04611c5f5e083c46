//! Offline action data models.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Default number of delivery attempts before an action fails permanently.
pub const DEFAULT_MAX_RETRIES: u32 = 3;

/// The kind of mutation an offline action performs on the remote.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionKind {
    /// Send a message into a thread.
    SendMessage,
    /// Mark a thread (or message) read.
    MarkRead,
    /// Archive a thread.
    ArchiveThread,
    /// Update thread attributes (title, membership).
    UpdateThread,
    /// Delete a message.
    DeleteMessage,
}

impl ActionKind {
    /// Parse from database string representation.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "send_message" => Some(Self::SendMessage),
            "mark_read" => Some(Self::MarkRead),
            "archive_thread" => Some(Self::ArchiveThread),
            "update_thread" => Some(Self::UpdateThread),
            "delete_message" => Some(Self::DeleteMessage),
            _ => None,
        }
    }

    /// Convert to database string representation.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::SendMessage => "send_message",
            Self::MarkRead => "mark_read",
            Self::ArchiveThread => "archive_thread",
            Self::UpdateThread => "update_thread",
            Self::DeleteMessage => "delete_message",
        }
    }
}

/// A durable record of a mutation made while the remote was unreachable.
///
/// The id doubles as the idempotency key the remote upserts by, so replaying
/// an action that already succeeded is harmless.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OfflineAction {
    /// Action identifier; assigned locally when the action is created.
    pub id: String,
    /// What the action does.
    pub kind: ActionKind,
    /// Kind-specific payload forwarded to the remote verbatim.
    pub payload: serde_json::Value,
    /// When the action was queued.
    pub created_at: DateTime<Utc>,
    /// Failed delivery attempts so far.
    pub retry_count: u32,
    /// Attempts allowed before the action fails permanently.
    pub max_retries: u32,
}

impl OfflineAction {
    /// Create a new action with a fresh id and default retry budget.
    #[must_use]
    pub fn new(kind: ActionKind, payload: serde_json::Value) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            kind,
            payload,
            created_at: Utc::now(),
            retry_count: 0,
            max_retries: DEFAULT_MAX_RETRIES,
        }
    }

    /// Override the retry budget.
    #[must_use]
    pub const fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// Returns true if one more failed attempt exhausts the retry budget.
    #[must_use]
    pub const fn next_failure_is_permanent(&self) -> bool {
        self.retry_count + 1 >= self.max_retries
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_action_kind_roundtrip() {
        for kind in [
            ActionKind::SendMessage,
            ActionKind::MarkRead,
            ActionKind::ArchiveThread,
            ActionKind::UpdateThread,
            ActionKind::DeleteMessage,
        ] {
            assert_eq!(ActionKind::parse(kind.as_str()), Some(kind));
        }
        assert_eq!(ActionKind::parse("teleport"), None);
    }

    #[test]
    fn test_new_action_gets_id_and_zero_retries() {
        let action = OfflineAction::new(ActionKind::SendMessage, json!({"thread_id": "t1"}));

        assert!(!action.id.is_empty());
        assert_eq!(action.retry_count, 0);
        assert_eq!(action.max_retries, DEFAULT_MAX_RETRIES);
    }

    #[test]
    fn test_retry_exhaustion_boundary() {
        let mut action =
            OfflineAction::new(ActionKind::MarkRead, json!({})).with_max_retries(3);

        assert!(!action.next_failure_is_permanent());
        action.retry_count = 1;
        assert!(!action.next_failure_is_permanent());
        action.retry_count = 2;
        assert!(action.next_failure_is_permanent());
    }

    #[test]
    fn test_zero_retry_budget_fails_on_first_attempt() {
        let action = OfflineAction::new(ActionKind::MarkRead, json!({})).with_max_retries(0);
        assert!(action.next_failure_is_permanent());
    }
}
