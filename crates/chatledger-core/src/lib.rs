//! # chatledger-core
//!
//! Offline-first local cache and synchronization engine for `ChatLedger`'s
//! threaded conversations.
//!
//! This crate provides:
//! - Durable local storage of conversation threads, messages, participants,
//!   and media over a single `SQLite` store with versioned migrations
//! - Size-bounded caches: pin-aware eviction for conversations, a hard
//!   per-thread cap for messages, and a fixed TTL for media
//! - **Offline Action Queue** - durable mutation intents with bounded
//!   retries and explicit permanent-failure reporting
//! - **Conflict Resolution** - pure field-level merges that preserve local
//!   preferences and read receipts
//! - **Sync Orchestration** - one guarded fetch/merge/flush/commit pass
//!   against an application-supplied remote collaborator
//!
//! The cache guarantees at-least-once execution of queued mutations with
//! idempotent-by-key remote upserts, not exactly-once delivery.

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![forbid(unsafe_code)]

pub mod cache;
pub mod conversation;
mod error;
pub mod media;
pub mod merge;
pub mod message;
pub mod queue;
pub mod store;
pub mod sync;

pub use cache::{CacheConfig, CacheStats, CacheWriteOptions, ChatCache};
pub use conversation::{
    ConversationFilter, ConversationRepository, ConversationSort, ConversationThread, Participant,
};
pub use error::{Error, Result};
pub use media::{CachedMedia, MediaRepository, MediaStats};
pub use merge::{resolve_conversation, resolve_message};
pub use message::{MessageKind, MessageQuery, MessageRepository, ThreadMessage};
pub use queue::{
    ActionKind, ActionQueue, ActionRepository, DEFAULT_MAX_RETRIES, FlushReport, OfflineAction,
};
pub use store::{CollectionCounts, StoreManager};
pub use sync::{
    RemoteApi, RemoteError, SyncEngine, SyncMetadata, SyncMetadataRepository, SyncOptions,
    SyncReport,
};
