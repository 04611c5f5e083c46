//! Persistent store manager.
//!
//! Owns the shared `SQLite` pool behind every collection in the cache and
//! applies schema migrations when the store is opened. Repositories receive a
//! clone of the pool from here instead of opening their own connections, so
//! cross-collection operations (stats, clear) see one consistent store.

use sqlx::sqlite::{SqlitePool, SqlitePoolOptions};
use tracing::{debug, info};

use crate::{Error, Result};

/// A single schema migration step.
///
/// Migrations are keyed by the schema version they produce and applied in
/// order inside one transaction each. The current version is tracked with
/// `PRAGMA user_version`.
struct Migration {
    /// Schema version after this migration has run.
    version: i64,
    /// Short human-readable description, logged when applied.
    description: &'static str,
    /// Statements executed in order inside the migration transaction.
    statements: &'static [&'static str],
}

/// Ordered list of all schema migrations.
const MIGRATIONS: &[Migration] = &[Migration {
    version: 1,
    description: "initial schema",
    statements: &[
        "CREATE TABLE IF NOT EXISTS conversations (
            id TEXT PRIMARY KEY,
            participant_ids TEXT NOT NULL DEFAULT '[]',
            last_activity_at TEXT NOT NULL,
            unread_count INTEGER NOT NULL DEFAULT 0,
            is_pinned INTEGER NOT NULL DEFAULT 0,
            is_muted INTEGER NOT NULL DEFAULT 0,
            is_archived INTEGER NOT NULL DEFAULT 0,
            custom_title TEXT,
            created_at TEXT NOT NULL,
            last_synced_at TEXT NOT NULL
        )",
        "CREATE INDEX IF NOT EXISTS idx_conversations_last_activity
            ON conversations(last_activity_at)",
        "CREATE INDEX IF NOT EXISTS idx_conversations_created
            ON conversations(created_at)",
        "CREATE INDEX IF NOT EXISTS idx_conversations_unread
            ON conversations(unread_count)",
        "CREATE INDEX IF NOT EXISTS idx_conversations_pinned
            ON conversations(is_pinned)",
        "CREATE TABLE IF NOT EXISTS messages (
            id TEXT PRIMARY KEY,
            thread_id TEXT NOT NULL,
            sender_id TEXT NOT NULL,
            kind TEXT NOT NULL,
            body TEXT NOT NULL DEFAULT '',
            attachment_url TEXT,
            parent_message_id TEXT,
            reply_count INTEGER NOT NULL DEFAULT 0,
            read_by TEXT NOT NULL DEFAULT '{}',
            created_at TEXT NOT NULL,
            last_synced_at TEXT NOT NULL
        )",
        "CREATE INDEX IF NOT EXISTS idx_messages_thread ON messages(thread_id)",
        "CREATE INDEX IF NOT EXISTS idx_messages_created ON messages(created_at)",
        "CREATE INDEX IF NOT EXISTS idx_messages_sender ON messages(sender_id)",
        "CREATE INDEX IF NOT EXISTS idx_messages_kind ON messages(kind)",
        "CREATE INDEX IF NOT EXISTS idx_messages_parent
            ON messages(parent_message_id)",
        "CREATE TABLE IF NOT EXISTS participants (
            id TEXT PRIMARY KEY,
            thread_id TEXT NOT NULL,
            user_id TEXT NOT NULL
        )",
        "CREATE INDEX IF NOT EXISTS idx_participants_thread
            ON participants(thread_id)",
        "CREATE INDEX IF NOT EXISTS idx_participants_user ON participants(user_id)",
        "CREATE TABLE IF NOT EXISTS offline_actions (
            id TEXT PRIMARY KEY,
            kind TEXT NOT NULL,
            payload TEXT NOT NULL DEFAULT '{}',
            created_at TEXT NOT NULL,
            retry_count INTEGER NOT NULL DEFAULT 0,
            max_retries INTEGER NOT NULL
        )",
        "CREATE INDEX IF NOT EXISTS idx_actions_created
            ON offline_actions(created_at)",
        "CREATE INDEX IF NOT EXISTS idx_actions_kind ON offline_actions(kind)",
        "CREATE INDEX IF NOT EXISTS idx_actions_retry
            ON offline_actions(retry_count)",
        "CREATE TABLE IF NOT EXISTS media_cache (
            url TEXT PRIMARY KEY,
            data BLOB NOT NULL,
            mime_type TEXT NOT NULL,
            size INTEGER NOT NULL,
            cached_at TEXT NOT NULL,
            expires_at TEXT NOT NULL
        )",
        "CREATE TABLE IF NOT EXISTS sync_metadata (
            id INTEGER PRIMARY KEY CHECK (id = 1),
            last_full_sync TEXT,
            last_incremental_sync TEXT,
            sync_version INTEGER NOT NULL DEFAULT 0,
            pending_changes INTEGER NOT NULL DEFAULT 0
        )",
    ],
}];

/// Row counts per collection, used for cache statistics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CollectionCounts {
    /// Cached conversation threads.
    pub conversations: u64,
    /// Cached messages across all threads.
    pub messages: u64,
    /// Participant index rows.
    pub participants: u64,
    /// Queued offline actions.
    pub offline_actions: u64,
    /// Cached media blobs.
    pub media_entries: u64,
}

/// Manages the shared persistent store for all cache collections.
#[derive(Clone)]
pub struct StoreManager {
    pool: SqlitePool,
}

impl StoreManager {
    /// Open (or create) the store at the given database path and bring its
    /// schema up to date.
    ///
    /// # Errors
    ///
    /// Returns an error if the database connection fails, or if the store was
    /// written by a newer schema version than this build knows about.
    pub async fn open(database_path: &str) -> Result<Self> {
        let url = format!("sqlite:{database_path}?mode=rwc");
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect(&url)
            .await?;

        let store = Self { pool };
        store.migrate().await?;
        Ok(store)
    }

    /// Create an in-memory store for testing.
    ///
    /// # Errors
    ///
    /// Returns an error if the database connection fails or migration fails.
    pub async fn in_memory() -> Result<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await?;

        let store = Self { pool };
        store.migrate().await?;
        Ok(store)
    }

    /// The shared connection pool backing every collection.
    #[must_use]
    pub const fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Apply all migrations newer than the store's current schema version.
    async fn migrate(&self) -> Result<()> {
        let current: i64 = sqlx::query_scalar("PRAGMA user_version")
            .fetch_one(&self.pool)
            .await?;

        let newest = MIGRATIONS.last().map_or(0, |m| m.version);
        if current > newest {
            return Err(Error::Migration(format!(
                "store schema version {current} is newer than supported version {newest}"
            )));
        }

        for migration in MIGRATIONS.iter().filter(|m| m.version > current) {
            let mut tx = self.pool.begin().await?;
            for statement in migration.statements {
                sqlx::query(statement).execute(&mut *tx).await?;
            }
            // PRAGMA does not support bind parameters; version is a literal.
            sqlx::query(&format!("PRAGMA user_version = {}", migration.version))
                .execute(&mut *tx)
                .await?;
            tx.commit().await?;
            info!(
                version = migration.version,
                description = migration.description,
                "applied schema migration"
            );
        }

        Ok(())
    }

    /// Count the rows in every collection.
    ///
    /// # Errors
    ///
    /// Returns an error if any count query fails.
    pub async fn collection_counts(&self) -> Result<CollectionCounts> {
        Ok(CollectionCounts {
            conversations: self.count_rows("conversations").await?,
            messages: self.count_rows("messages").await?,
            participants: self.count_rows("participants").await?,
            offline_actions: self.count_rows("offline_actions").await?,
            media_entries: self.count_rows("media_cache").await?,
        })
    }

    async fn count_rows(&self, table: &str) -> Result<u64> {
        let count: i64 = sqlx::query_scalar(&format!("SELECT COUNT(*) FROM {table}"))
            .fetch_one(&self.pool)
            .await?;
        Ok(u64::try_from(count).unwrap_or_default())
    }

    /// Delete every row from every collection, including sync metadata.
    ///
    /// Takes no lock against writes that are still in flight; a write that
    /// lands after the clear re-caches its data.
    ///
    /// # Errors
    ///
    /// Returns an error if any delete fails; the transaction is rolled back.
    pub async fn clear_all(&self) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        for table in [
            "messages",
            "participants",
            "conversations",
            "offline_actions",
            "media_cache",
            "sync_metadata",
        ] {
            sqlx::query(&format!("DELETE FROM {table}"))
                .execute(&mut *tx)
                .await?;
        }
        tx.commit().await?;
        debug!("cleared all cache collections");
        Ok(())
    }

    /// Close the underlying pool. Pending acquires fail afterwards.
    pub async fn close(&self) {
        self.pool.close().await;
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_migrate_sets_schema_version() {
        let store = StoreManager::in_memory().await.unwrap();

        let version: i64 = sqlx::query_scalar("PRAGMA user_version")
            .fetch_one(store.pool())
            .await
            .unwrap();
        assert_eq!(version, MIGRATIONS.last().unwrap().version);
    }

    #[tokio::test]
    async fn test_migrate_is_idempotent() {
        let store = StoreManager::in_memory().await.unwrap();
        store.migrate().await.unwrap();

        let counts = store.collection_counts().await.unwrap();
        assert_eq!(counts, CollectionCounts::default());
    }

    #[tokio::test]
    async fn test_open_rejects_newer_schema() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cache.db");
        let path = path.to_string_lossy().into_owned();

        {
            let store = StoreManager::open(&path).await.unwrap();
            sqlx::query("PRAGMA user_version = 999")
                .execute(store.pool())
                .await
                .unwrap();
            store.close().await;
        }

        let result = StoreManager::open(&path).await;
        assert!(matches!(result, Err(Error::Migration(_))));
    }

    #[tokio::test]
    async fn test_clear_all_empties_collections() {
        let store = StoreManager::in_memory().await.unwrap();

        sqlx::query(
            "INSERT INTO media_cache (url, data, mime_type, size, cached_at, expires_at)
             VALUES ('u', x'00', 'image/png', 1, '2026-01-01T00:00:00+00:00',
                     '2026-01-08T00:00:00+00:00')",
        )
        .execute(store.pool())
        .await
        .unwrap();

        store.clear_all().await.unwrap();
        let counts = store.collection_counts().await.unwrap();
        assert_eq!(counts.media_entries, 0);
    }
}
