//! Demonstrates the offline-first flow end to end:
//! queue mutations while disconnected, reconnect, then run one sync pass
//! that merges server state and drains the queue.
//!
//! Run with: `cargo run --example offline_flow`

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::json;

use chatledger_core::{
    ActionKind, CacheConfig, ChatCache, ConversationFilter, ConversationThread, OfflineAction,
    RemoteApi, RemoteError, SyncOptions,
};

/// Toy remote: flips between offline and online, serves one conversation.
struct DemoRemote {
    online: AtomicBool,
}

#[async_trait]
impl RemoteApi for DemoRemote {
    async fn fetch_conversations_since(
        &self,
        _user_id: &str,
        _since: Option<DateTime<Utc>>,
        _limit: u32,
    ) -> Result<Vec<ConversationThread>, RemoteError> {
        if !self.online.load(Ordering::SeqCst) {
            return Err(RemoteError::Unavailable("still offline".into()));
        }
        let mut thread =
            ConversationThread::new("standup", vec!["alice".into(), "bob".into()], Utc::now());
        thread.unread_count = 2;
        Ok(vec![thread])
    }

    async fn execute_action(&self, action: &OfflineAction) -> Result<(), RemoteError> {
        if !self.online.load(Ordering::SeqCst) {
            return Err(RemoteError::Unavailable("still offline".into()));
        }
        println!("remote executed {} ({})", action.id, action.kind.as_str());
        Ok(())
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "chatledger_core=debug".into()),
        )
        .init();

    let remote = Arc::new(DemoRemote {
        online: AtomicBool::new(false),
    });
    let cache = ChatCache::in_memory(CacheConfig::default(), remote.clone()).await?;
    println!(
        "cache ready (caps: {} conversations, {} messages/thread)",
        cache.config().max_conversations,
        cache.config().max_messages_per_thread
    );

    // Work made while disconnected goes into the durable queue.
    let action = OfflineAction::new(
        ActionKind::SendMessage,
        json!({"thread_id": "standup", "body": "running late"}),
    );
    cache.queue_offline_action(action).await?;

    // Flushing while offline just burns one retry per action.
    let report = cache.execute_pending_actions().await?;
    println!(
        "offline flush: {} executed, {} pending",
        report.executed.len(),
        cache.pending_offline_actions().await.len()
    );

    // Back online: one guarded pass fetches, merges, and drains the queue.
    remote.online.store(true, Ordering::SeqCst);
    let report = cache.sync_with_server("alice", &SyncOptions::default()).await?;
    println!(
        "sync: fetched {}, executed {} queued action(s)",
        report.fetched,
        report.flush.executed.len()
    );

    for thread in cache.cached_conversations(&ConversationFilter::default()).await {
        println!("cached thread '{}' with {} unread", thread.id, thread.unread_count);
    }

    let stats = cache.cache_stats().await;
    println!(
        "stats: {} conversation(s), {} pending action(s), sync v{}",
        stats.conversations, stats.pending_actions, stats.sync_version
    );

    cache.close().await;
    Ok(())
}
