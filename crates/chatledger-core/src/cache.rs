//! The public cache facade.
//!
//! `ChatCache` wires the repositories, queue, and sync engine over one
//! shared store. It is constructed explicitly at application start-up and
//! passed where needed; there is no process-wide instance. Read paths never
//! fail: a store error is logged and an empty default returned, so the cache
//! layer cannot crash the calling UI. Write and sync paths return `Result`.

use std::collections::BTreeSet;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::Result;
use crate::conversation::{ConversationFilter, ConversationRepository, ConversationThread};
use crate::media::{CachedMedia, MediaRepository};
use crate::message::{MessageQuery, MessageRepository, ThreadMessage};
use crate::queue::{ActionQueue, ActionRepository, FlushReport, OfflineAction};
use crate::store::StoreManager;
use crate::sync::{RemoteApi, SyncEngine, SyncMetadataRepository, SyncOptions, SyncReport};

/// Configuration for the cache, passed at construction.
#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// Path of the SQLite database file.
    pub database_path: String,
    /// Maximum cached conversations before pin-aware eviction kicks in.
    pub max_conversations: u32,
    /// Hard per-thread message cap; oldest messages are evicted past it.
    pub max_messages_per_thread: u32,
    /// Days a cached media asset stays valid.
    pub media_ttl_days: i64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            database_path: "chatledger.db".into(),
            max_conversations: 100,
            max_messages_per_thread: 200,
            media_ttl_days: 7,
        }
    }
}

impl CacheConfig {
    /// The media TTL as a duration.
    #[must_use]
    pub fn media_ttl(&self) -> Duration {
        Duration::days(self.media_ttl_days)
    }
}

/// Options applied to batch writes.
#[derive(Debug, Clone, Copy, Default)]
pub struct CacheWriteOptions {
    /// Run incoming records through the conflict resolver against any local
    /// copy instead of replacing rows wholesale. The sync engine writes with
    /// this set; the application's own optimistic writes leave it off.
    pub merge: bool,
}

/// A point-in-time summary of everything the cache holds.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    /// Cached conversation threads.
    pub conversations: u64,
    /// Cached messages across all threads.
    pub messages: u64,
    /// Participant index rows.
    pub participants: u64,
    /// Queued offline actions.
    pub pending_actions: u64,
    /// Cached media entries.
    pub media_entries: u64,
    /// Total bytes held by the media cache.
    pub media_bytes: u64,
    /// When the last successful full sync completed.
    pub last_full_sync: Option<DateTime<Utc>>,
    /// When the last successful sync of any kind completed.
    pub last_incremental_sync: Option<DateTime<Utc>>,
    /// Monotonic sync counter.
    pub sync_version: u32,
}

/// Offline-first cache and sync engine for threaded conversations.
#[derive(Clone)]
pub struct ChatCache {
    config: CacheConfig,
    store: StoreManager,
    conversations: ConversationRepository,
    messages: MessageRepository,
    media: MediaRepository,
    queue: ActionQueue,
    metadata: SyncMetadataRepository,
    engine: SyncEngine,
}

impl ChatCache {
    /// Open the persistent store, migrate its schema, and wire the cache to
    /// the given remote collaborator.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be opened or migrated.
    pub async fn initialize(config: CacheConfig, remote: Arc<dyn RemoteApi>) -> Result<Self> {
        let store = StoreManager::open(&config.database_path).await?;
        Ok(Self::wire(config, store, remote))
    }

    /// An in-memory cache for tests and examples.
    ///
    /// # Errors
    ///
    /// Returns an error if the in-memory store cannot be created.
    pub async fn in_memory(config: CacheConfig, remote: Arc<dyn RemoteApi>) -> Result<Self> {
        let store = StoreManager::in_memory().await?;
        Ok(Self::wire(config, store, remote))
    }

    fn wire(config: CacheConfig, store: StoreManager, remote: Arc<dyn RemoteApi>) -> Self {
        let pool = store.pool().clone();
        let conversations = ConversationRepository::new(pool.clone());
        let messages = MessageRepository::new(pool.clone());
        let media = MediaRepository::new(pool.clone());
        let queue = ActionQueue::new(ActionRepository::new(pool.clone()), Arc::clone(&remote));
        let metadata = SyncMetadataRepository::new(pool);
        let engine = SyncEngine::new(
            conversations.clone(),
            metadata.clone(),
            queue.clone(),
            remote,
            config.max_conversations,
        );
        info!(
            database_path = %config.database_path,
            max_conversations = config.max_conversations,
            max_messages_per_thread = config.max_messages_per_thread,
            "cache initialized"
        );
        Self {
            config,
            store,
            conversations,
            messages,
            media,
            queue,
            metadata,
            engine,
        }
    }

    /// The configuration the cache was built with.
    #[must_use]
    pub const fn config(&self) -> &CacheConfig {
        &self.config
    }

    /// Write a batch of conversation summaries, then restore the cache bound
    /// with pin-aware eviction.
    ///
    /// # Errors
    ///
    /// Returns an error if the store rejects the write.
    pub async fn cache_conversations(
        &self,
        threads: &[ConversationThread],
        options: CacheWriteOptions,
    ) -> Result<()> {
        self.conversations
            .upsert_batch(threads, options.merge, Utc::now())
            .await?;
        self.conversations
            .evict_to_cap(self.config.max_conversations)
            .await?;
        Ok(())
    }

    /// Cached conversations matching the filter. Store failures yield an
    /// empty list.
    pub async fn cached_conversations(
        &self,
        filter: &ConversationFilter,
    ) -> Vec<ConversationThread> {
        match self.conversations.list(filter).await {
            Ok(threads) => threads,
            Err(err) => {
                warn!(%err, "conversation read failed, returning empty");
                Vec::new()
            }
        }
    }

    /// Write a batch of messages, then restore each touched thread's cap.
    ///
    /// With `thread_id` given, messages belonging to other threads are
    /// dropped from the batch (and logged) rather than written.
    ///
    /// # Errors
    ///
    /// Returns an error if the store rejects the write.
    pub async fn cache_messages(
        &self,
        messages: &[ThreadMessage],
        thread_id: Option<&str>,
        options: CacheWriteOptions,
    ) -> Result<()> {
        let accepted: Vec<ThreadMessage> = match thread_id {
            Some(thread_id) => {
                let (matching, foreign): (Vec<_>, Vec<_>) = messages
                    .iter()
                    .cloned()
                    .partition(|m| m.thread_id == thread_id);
                if !foreign.is_empty() {
                    warn!(
                        thread_id,
                        dropped = foreign.len(),
                        "dropped messages not belonging to the requested thread"
                    );
                }
                matching
            }
            None => messages.to_vec(),
        };

        self.messages
            .upsert_batch(&accepted, options.merge, Utc::now())
            .await?;

        let touched: BTreeSet<&str> = accepted.iter().map(|m| m.thread_id.as_str()).collect();
        for thread in touched {
            self.messages
                .evict_thread_to_cap(thread, self.config.max_messages_per_thread)
                .await?;
        }
        Ok(())
    }

    /// A thread's cached messages, ascending by send time. Store failures
    /// yield an empty list.
    pub async fn cached_messages(
        &self,
        thread_id: &str,
        query: &MessageQuery,
    ) -> Vec<ThreadMessage> {
        match self.messages.list_page(thread_id, query).await {
            Ok(messages) => messages,
            Err(err) => {
                warn!(%err, thread_id, "message read failed, returning empty");
                Vec::new()
            }
        }
    }

    /// The cached replies to a message, ascending by send time. Store
    /// failures yield an empty list.
    pub async fn cached_message_replies(&self, parent_id: &str) -> Vec<ThreadMessage> {
        match self.messages.replies(parent_id).await {
            Ok(replies) => replies,
            Err(err) => {
                warn!(%err, parent_id, "reply read failed, returning empty");
                Vec::new()
            }
        }
    }

    /// Queue a mutation for later delivery, returning the stored action.
    ///
    /// # Errors
    ///
    /// Returns an error if the store rejects the write.
    pub async fn queue_offline_action(&self, action: OfflineAction) -> Result<OfflineAction> {
        self.queue.repository().enqueue(action).await
    }

    /// All queued actions in drain order. Store failures yield an empty
    /// list.
    pub async fn pending_offline_actions(&self) -> Vec<OfflineAction> {
        match self.queue.repository().pending().await {
            Ok(actions) => actions,
            Err(err) => {
                warn!(%err, "pending action read failed, returning empty");
                Vec::new()
            }
        }
    }

    /// Drain the offline action queue against the remote.
    ///
    /// Returns an empty report immediately when a flush is already in
    /// flight.
    ///
    /// # Errors
    ///
    /// Returns an error if the queue store fails; remote failures become
    /// retry bookkeeping instead.
    pub async fn execute_pending_actions(&self) -> Result<FlushReport> {
        self.queue.execute_all().await
    }

    /// Cache a media asset under its remote URL with the configured TTL.
    ///
    /// # Errors
    ///
    /// Returns an error if the store rejects the write.
    pub async fn cache_media_file(
        &self,
        url: &str,
        data: Vec<u8>,
        mime_type: &str,
    ) -> Result<()> {
        let media = CachedMedia::new(url, data, mime_type, self.config.media_ttl());
        self.media.put(&media).await
    }

    /// A cached media asset, or `None` when absent or expired (an expired
    /// entry is deleted by the read). Store failures yield `None`.
    pub async fn cached_media_file(&self, url: &str) -> Option<CachedMedia> {
        match self.media.get(url).await {
            Ok(media) => media,
            Err(err) => {
                warn!(%err, url, "media read failed, returning miss");
                None
            }
        }
    }

    /// Explicitly evict a cached media asset.
    ///
    /// # Errors
    ///
    /// Returns an error if the store rejects the delete.
    pub async fn remove_cached_media_file(&self, url: &str) -> Result<()> {
        self.media.remove(url).await
    }

    /// Run one guarded sync pass: fetch deltas, merge, flush the action
    /// queue, then commit sync metadata.
    ///
    /// Returns `SyncReport::skipped()` when a sync is already in flight.
    ///
    /// # Errors
    ///
    /// Returns an error if the remote fetch or a store operation fails; the
    /// sync metadata is left untouched in that case.
    pub async fn sync_with_server(
        &self,
        user_id: &str,
        options: &SyncOptions,
    ) -> Result<SyncReport> {
        self.engine.sync(user_id, options).await
    }

    /// Run a sync pass as a background task, returning a handle the
    /// application can join during shutdown so no write outlives it.
    #[must_use]
    pub fn spawn_sync(
        &self,
        user_id: impl Into<String>,
        options: SyncOptions,
    ) -> JoinHandle<Result<SyncReport>> {
        let engine = self.engine.clone();
        let user_id = user_id.into();
        tokio::spawn(async move { engine.sync(&user_id, &options).await })
    }

    /// A point-in-time summary of the cache. Store failures yield zeroed
    /// stats.
    pub async fn cache_stats(&self) -> CacheStats {
        match self.try_cache_stats().await {
            Ok(stats) => stats,
            Err(err) => {
                warn!(%err, "stats read failed, returning zeroes");
                CacheStats::default()
            }
        }
    }

    async fn try_cache_stats(&self) -> Result<CacheStats> {
        let counts = self.store.collection_counts().await?;
        let media = self.media.stats().await?;
        let metadata = self.metadata.load().await?;

        Ok(CacheStats {
            conversations: counts.conversations,
            messages: counts.messages,
            participants: counts.participants,
            pending_actions: counts.offline_actions,
            media_entries: media.entries,
            media_bytes: media.total_bytes,
            last_full_sync: metadata.last_full_sync,
            last_incremental_sync: metadata.last_incremental_sync,
            sync_version: metadata.sync_version,
        })
    }

    /// Delete everything the cache holds, sync metadata included.
    ///
    /// Takes no lock against writes still in flight; a write landing after
    /// the clear re-caches its data.
    ///
    /// # Errors
    ///
    /// Returns an error if the store rejects the delete.
    pub async fn clear_cache(&self) -> Result<()> {
        self.store.clear_all().await?;
        info!("cache cleared");
        Ok(())
    }

    /// Close the underlying store. Reads afterwards return empty defaults;
    /// writes fail.
    pub async fn close(&self) {
        self.store.close().await;
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::queue::ActionKind;
    use crate::sync::RemoteError;
    use async_trait::async_trait;
    use serde_json::json;

    /// Remote stub that accepts every action and returns no conversations.
    struct NullRemote;

    #[async_trait]
    impl RemoteApi for NullRemote {
        async fn fetch_conversations_since(
            &self,
            _user_id: &str,
            _since: Option<DateTime<Utc>>,
            _limit: u32,
        ) -> std::result::Result<Vec<ConversationThread>, RemoteError> {
            Ok(Vec::new())
        }

        async fn execute_action(
            &self,
            _action: &OfflineAction,
        ) -> std::result::Result<(), RemoteError> {
            Ok(())
        }
    }

    async fn cache() -> ChatCache {
        ChatCache::in_memory(CacheConfig::default(), Arc::new(NullRemote))
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_stats_reflect_cached_data() {
        let cache = cache().await;
        let now = Utc::now();
        let thread = ConversationThread::new("t1", vec!["alice".into(), "bob".into()], now);
        cache
            .cache_conversations(&[thread], CacheWriteOptions::default())
            .await
            .unwrap();
        cache
            .cache_messages(
                &[ThreadMessage::new("m1", "t1", "alice", "hi", now)],
                Some("t1"),
                CacheWriteOptions::default(),
            )
            .await
            .unwrap();
        cache
            .cache_media_file("https://cdn.example/a.png", vec![0; 8], "image/png")
            .await
            .unwrap();

        let stats = cache.cache_stats().await;
        assert_eq!(stats.conversations, 1);
        assert_eq!(stats.messages, 1);
        assert_eq!(stats.participants, 2);
        assert_eq!(stats.media_entries, 1);
        assert_eq!(stats.media_bytes, 8);
        assert_eq!(stats.sync_version, 0);
    }

    #[tokio::test]
    async fn test_cache_messages_drops_foreign_thread_rows() {
        let cache = cache().await;
        let now = Utc::now();
        cache
            .cache_messages(
                &[
                    ThreadMessage::new("m1", "t1", "alice", "hi", now),
                    ThreadMessage::new("m2", "other", "bob", "yo", now),
                ],
                Some("t1"),
                CacheWriteOptions::default(),
            )
            .await
            .unwrap();

        assert_eq!(
            cache.cached_messages("t1", &MessageQuery::default()).await.len(),
            1
        );
        assert!(
            cache
                .cached_messages("other", &MessageQuery::default())
                .await
                .is_empty()
        );
    }

    #[tokio::test]
    async fn test_reads_are_contained_after_close() {
        let cache = cache().await;
        let now = Utc::now();
        cache
            .cache_conversations(
                &[ConversationThread::new("t1", vec!["alice".into()], now)],
                CacheWriteOptions::default(),
            )
            .await
            .unwrap();

        cache.close().await;

        // Reads degrade to empty defaults instead of erroring.
        assert!(
            cache
                .cached_conversations(&ConversationFilter::default())
                .await
                .is_empty()
        );
        assert!(cache.pending_offline_actions().await.is_empty());
        assert!(cache.cached_media_file("https://cdn.example/x").await.is_none());
        assert_eq!(cache.cache_stats().await, CacheStats::default());

        // Writes surface the failure.
        assert!(
            cache
                .queue_offline_action(OfflineAction::new(ActionKind::MarkRead, json!({})))
                .await
                .is_err()
        );
    }

    #[tokio::test]
    async fn test_clear_cache_resets_everything() {
        let cache = cache().await;
        let now = Utc::now();
        cache
            .cache_conversations(
                &[ConversationThread::new("t1", vec!["alice".into()], now)],
                CacheWriteOptions::default(),
            )
            .await
            .unwrap();
        cache
            .queue_offline_action(OfflineAction::new(ActionKind::MarkRead, json!({})))
            .await
            .unwrap();

        cache.clear_cache().await.unwrap();

        let stats = cache.cache_stats().await;
        assert_eq!(stats, CacheStats::default());
    }
}
