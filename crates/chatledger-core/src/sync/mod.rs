//! Synchronization with the remote collaborator.
//!
//! The engine here is the only component that talks to the remote directly:
//! one guarded pass fetches conversation deltas, merges them through the
//! conflict resolver, drains the offline action queue, and only then commits
//! the sync metadata.

mod engine;
mod metadata;
mod remote;

pub use engine::{SyncEngine, SyncOptions, SyncReport};
pub use metadata::{SyncMetadata, SyncMetadataRepository};
pub use remote::{RemoteApi, RemoteError};
