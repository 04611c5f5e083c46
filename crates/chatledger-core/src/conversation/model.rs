//! Conversation data models.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A conversation thread summary held in the local cache.
///
/// `is_pinned`, `is_muted`, and `custom_title` are local-only preference
/// fields: the remote never overwrites them during a merge.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversationThread {
    /// Thread identifier.
    pub id: String,
    /// User ids participating in this thread.
    pub participant_ids: Vec<String>,
    /// Timestamp of the most recent activity in the thread.
    pub last_activity_at: DateTime<Utc>,
    /// Number of unread messages.
    pub unread_count: u32,
    /// Pinned threads are exempt from capacity eviction.
    pub is_pinned: bool,
    /// Muted threads stay cached but the app suppresses notifications.
    pub is_muted: bool,
    /// Archived threads are hidden from default listings.
    pub is_archived: bool,
    /// User-assigned title overriding the default participant listing.
    pub custom_title: Option<String>,
    /// When the thread was created.
    pub created_at: DateTime<Utc>,
}

impl ConversationThread {
    /// Create a new thread summary with default preference fields.
    #[must_use]
    pub fn new(
        id: impl Into<String>,
        participant_ids: Vec<String>,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: id.into(),
            participant_ids,
            last_activity_at: created_at,
            unread_count: 0,
            is_pinned: false,
            is_muted: false,
            is_archived: false,
            custom_title: None,
            created_at,
        }
    }

    /// Returns true if the thread has unread messages.
    #[must_use]
    pub const fn has_unread(&self) -> bool {
        self.unread_count > 0
    }

    /// The participant index rows for this thread.
    #[must_use]
    pub fn participants(&self) -> Vec<Participant> {
        self.participant_ids
            .iter()
            .map(|user_id| Participant::for_thread(&self.id, user_id))
            .collect()
    }
}

/// A participant index entry linking a user to a thread.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Participant {
    /// Unique identifier, derived from thread and user.
    pub id: String,
    /// Thread the user participates in.
    pub thread_id: String,
    /// The participating user.
    pub user_id: String,
}

impl Participant {
    /// Build the participant entry for a thread/user pair.
    #[must_use]
    pub fn for_thread(thread_id: &str, user_id: &str) -> Self {
        Self {
            id: format!("{thread_id}:{user_id}"),
            thread_id: thread_id.to_string(),
            user_id: user_id.to_string(),
        }
    }
}

/// Sort order for conversation listings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConversationSort {
    /// Most recently active first.
    #[default]
    LastActivity,
    /// Most recently created first.
    CreatedAt,
    /// Highest unread count first.
    UnreadCount,
}

impl ConversationSort {
    /// The ORDER BY clause serving this sort.
    pub(crate) const fn order_clause(self) -> &'static str {
        match self {
            Self::LastActivity => "last_activity_at DESC",
            Self::CreatedAt => "created_at DESC",
            Self::UnreadCount => "unread_count DESC",
        }
    }
}

/// Filters applied when listing cached conversations.
#[derive(Debug, Clone, Default)]
pub struct ConversationFilter {
    /// Include archived threads (hidden by default).
    pub include_archived: bool,
    /// Only threads with unread messages.
    pub unread_only: bool,
    /// Only pinned threads.
    pub pinned_only: bool,
    /// Only threads a given user participates in.
    pub participant: Option<String>,
    /// Maximum number of threads to return.
    pub limit: Option<u32>,
    /// Sort order.
    pub sort: ConversationSort,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_thread_defaults() {
        let thread = ConversationThread::new("t1", vec!["alice".into(), "bob".into()], Utc::now());

        assert!(!thread.is_pinned);
        assert!(!thread.is_archived);
        assert!(!thread.has_unread());
        assert_eq!(thread.last_activity_at, thread.created_at);
        assert_eq!(thread.custom_title, None);
    }

    #[test]
    fn test_participants_derive_stable_ids() {
        let thread = ConversationThread::new("t1", vec!["alice".into(), "bob".into()], Utc::now());

        let participants = thread.participants();
        assert_eq!(participants.len(), 2);
        assert_eq!(participants[0].id, "t1:alice");
        assert_eq!(participants[1].thread_id, "t1");
        assert_eq!(participants[1].user_id, "bob");
    }
}
