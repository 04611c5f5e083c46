//! Sync metadata storage.

use chrono::{DateTime, Utc};
use sqlx::Row;
use sqlx::sqlite::SqlitePool;

use crate::Result;

/// Singleton record tracking the cache's sync history.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SyncMetadata {
    /// When the last successful full sync completed.
    pub last_full_sync: Option<DateTime<Utc>>,
    /// When the last successful sync of any kind completed.
    pub last_incremental_sync: Option<DateTime<Utc>>,
    /// Monotonic counter incremented on every successful sync.
    pub sync_version: u32,
    /// Queued offline actions at the time of the last successful sync.
    pub pending_changes: u32,
}

/// Repository for the singleton sync metadata record.
#[derive(Clone)]
pub struct SyncMetadataRepository {
    pool: SqlitePool,
}

impl SyncMetadataRepository {
    /// Create a repository over the shared store pool.
    #[must_use]
    pub const fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Load the metadata record, defaulting when none has been written yet.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    pub async fn load(&self) -> Result<SyncMetadata> {
        let row = sqlx::query(
            r"
            SELECT last_full_sync, last_incremental_sync, sync_version, pending_changes
            FROM sync_metadata
            WHERE id = 1
            ",
        )
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map_or_else(SyncMetadata::default, |row| {
            let parse = |value: Option<String>| {
                value
                    .as_deref()
                    .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
                    .map(|dt| dt.with_timezone(&Utc))
            };
            SyncMetadata {
                last_full_sync: parse(row.get("last_full_sync")),
                last_incremental_sync: parse(row.get("last_incremental_sync")),
                sync_version: row.get::<u32, _>("sync_version"),
                pending_changes: row.get::<u32, _>("pending_changes"),
            }
        }))
    }

    /// Persist the metadata record, replacing the previous one.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    pub async fn store(&self, metadata: &SyncMetadata) -> Result<()> {
        sqlx::query(
            r"
            INSERT OR REPLACE INTO sync_metadata
                (id, last_full_sync, last_incremental_sync, sync_version, pending_changes)
            VALUES (1, ?, ?, ?, ?)
            ",
        )
        .bind(metadata.last_full_sync.map(|dt| dt.to_rfc3339()))
        .bind(metadata.last_incremental_sync.map(|dt| dt.to_rfc3339()))
        .bind(metadata.sync_version)
        .bind(metadata.pending_changes)
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::StoreManager;

    #[tokio::test]
    async fn test_load_defaults_when_unwritten() {
        let store = StoreManager::in_memory().await.unwrap();
        let repo = SyncMetadataRepository::new(store.pool().clone());

        assert_eq!(repo.load().await.unwrap(), SyncMetadata::default());
    }

    #[tokio::test]
    async fn test_store_and_load_roundtrip() {
        let store = StoreManager::in_memory().await.unwrap();
        let repo = SyncMetadataRepository::new(store.pool().clone());

        let now = Utc::now();
        let metadata = SyncMetadata {
            last_full_sync: Some(now),
            last_incremental_sync: Some(now),
            sync_version: 3,
            pending_changes: 2,
        };
        repo.store(&metadata).await.unwrap();

        assert_eq!(repo.load().await.unwrap(), metadata);
    }

    #[tokio::test]
    async fn test_store_is_a_singleton_row() {
        let store = StoreManager::in_memory().await.unwrap();
        let repo = SyncMetadataRepository::new(store.pool().clone());

        for version in 1..=3 {
            repo.store(&SyncMetadata {
                sync_version: version,
                ..SyncMetadata::default()
            })
            .await
            .unwrap();
        }

        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM sync_metadata")
            .fetch_one(store.pool())
            .await
            .unwrap();
        assert_eq!(count, 1);
        assert_eq!(repo.load().await.unwrap().sync_version, 3);
    }
}
