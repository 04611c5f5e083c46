//! The remote collaborator boundary.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::conversation::ConversationThread;
use crate::queue::OfflineAction;

/// Errors returned by the remote collaborator.
#[derive(Debug, thiserror::Error)]
pub enum RemoteError {
    /// The remote could not be reached.
    #[error("Remote unavailable: {0}")]
    Unavailable(String),

    /// The remote refused the request.
    #[error("Remote rejected the request: {0}")]
    Rejected(String),
}

/// The transport-agnostic contract the embedding application implements.
///
/// `execute_action` must upsert by the action id so that replaying an action
/// which already succeeded is harmless (at-least-once delivery).
#[async_trait]
pub trait RemoteApi: Send + Sync {
    /// Fetch conversation threads changed since the given timestamp, or from
    /// the beginning of time when `since` is `None`, capped at `limit`.
    async fn fetch_conversations_since(
        &self,
        user_id: &str,
        since: Option<DateTime<Utc>>,
        limit: u32,
    ) -> std::result::Result<Vec<ConversationThread>, RemoteError>;

    /// Execute a queued mutation on the remote.
    async fn execute_action(
        &self,
        action: &OfflineAction,
    ) -> std::result::Result<(), RemoteError>;
}
