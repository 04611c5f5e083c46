//! Sync orchestration.

use std::sync::Arc;

use chrono::Utc;
use tokio::sync::Mutex;
use tracing::{debug, info};

use super::metadata::SyncMetadataRepository;
use super::remote::RemoteApi;
use crate::Result;
use crate::conversation::ConversationRepository;
use crate::queue::{ActionQueue, FlushReport};

/// Options for one sync pass.
#[derive(Debug, Clone, Copy)]
pub struct SyncOptions {
    /// Fetch from the beginning of time instead of the last sync point.
    pub full_sync: bool,
    /// Maximum number of conversations to fetch in this pass.
    pub max_conversations: u32,
}

impl Default for SyncOptions {
    fn default() -> Self {
        Self {
            full_sync: false,
            max_conversations: 100,
        }
    }
}

/// Outcome of one sync pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncReport {
    /// True when the pass was skipped because another sync was in flight.
    pub skipped: bool,
    /// Conversations fetched from the remote.
    pub fetched: usize,
    /// Conversations merged into the cache.
    pub merged: usize,
    /// Conversations evicted to restore the cache bound afterwards.
    pub evicted: u64,
    /// Result of draining the offline action queue.
    pub flush: FlushReport,
}

impl SyncReport {
    /// The no-op report returned when a sync is already in flight.
    #[must_use]
    pub fn skipped() -> Self {
        Self {
            skipped: true,
            ..Self::default()
        }
    }
}

/// Coordinates fetch, merge, queue flush, and metadata commit as one guarded
/// unit of work.
#[derive(Clone)]
pub struct SyncEngine {
    conversations: ConversationRepository,
    metadata: SyncMetadataRepository,
    queue: ActionQueue,
    remote: Arc<dyn RemoteApi>,
    max_conversation_cache: u32,
    sync_guard: Arc<Mutex<()>>,
}

impl SyncEngine {
    /// Wire the engine to its repositories and the remote collaborator.
    pub fn new(
        conversations: ConversationRepository,
        metadata: SyncMetadataRepository,
        queue: ActionQueue,
        remote: Arc<dyn RemoteApi>,
        max_conversation_cache: u32,
    ) -> Self {
        Self {
            conversations,
            metadata,
            queue,
            remote,
            max_conversation_cache,
            sync_guard: Arc::new(Mutex::new(())),
        }
    }

    /// Run one sync pass for the given user.
    ///
    /// A second call while a pass is in flight returns
    /// `SyncReport::skipped()` immediately instead of waiting. Sync metadata
    /// is committed only after fetch, merge, and flush all succeeded; on any
    /// failure it stays untouched so the next pass retries the same window.
    /// Re-fetching that window is safe because merges upsert by primary key
    /// (at-least-once, not exactly-once).
    ///
    /// # Errors
    ///
    /// Returns an error if the remote fetch or any store operation fails.
    pub async fn sync(&self, user_id: &str, options: &SyncOptions) -> Result<SyncReport> {
        let Ok(_guard) = self.sync_guard.try_lock() else {
            debug!("sync already in progress, skipping");
            return Ok(SyncReport::skipped());
        };

        let started_at = Utc::now();
        let mut metadata = self.metadata.load().await?;
        let since = if options.full_sync {
            None
        } else {
            metadata.last_incremental_sync
        };

        let remote_threads = self
            .remote
            .fetch_conversations_since(user_id, since, options.max_conversations)
            .await?;
        let fetched = remote_threads.len();

        self.conversations
            .upsert_batch(&remote_threads, true, started_at)
            .await?;
        let evicted = self
            .conversations
            .evict_to_cap(self.max_conversation_cache)
            .await?;

        let flush = self.queue.execute_all().await?;

        metadata.last_incremental_sync = Some(started_at);
        if options.full_sync {
            metadata.last_full_sync = Some(started_at);
        }
        metadata.sync_version += 1;
        metadata.pending_changes =
            u32::try_from(self.queue.repository().count().await?).unwrap_or(u32::MAX);
        self.metadata.store(&metadata).await?;

        info!(
            user_id,
            fetched,
            evicted,
            executed = flush.executed.len(),
            failed = flush.failed.len(),
            full_sync = options.full_sync,
            "sync pass completed"
        );

        Ok(SyncReport {
            skipped: false,
            fetched,
            merged: fetched,
            evicted,
            flush,
        })
    }
}
