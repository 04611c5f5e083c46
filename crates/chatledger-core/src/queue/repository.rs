//! Offline action queue storage repository.

use chrono::{DateTime, Utc};
use sqlx::Row;
use sqlx::sqlite::{SqlitePool, SqliteRow};
use uuid::Uuid;

use super::model::{ActionKind, OfflineAction};
use crate::Result;

/// Repository for the durable offline action queue.
#[derive(Clone)]
pub struct ActionRepository {
    pool: SqlitePool,
}

impl ActionRepository {
    /// Create a repository over the shared store pool.
    #[must_use]
    pub const fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Persist an action, assigning an id if the caller left it empty.
    ///
    /// The stored action always starts with `retry_count = 0` regardless of
    /// what the caller passed. Returns the stored record.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails or the payload cannot be
    /// serialized.
    pub async fn enqueue(&self, action: OfflineAction) -> Result<OfflineAction> {
        let mut stored = action;
        if stored.id.is_empty() {
            stored.id = Uuid::new_v4().to_string();
        }
        stored.retry_count = 0;

        sqlx::query(
            r"
            INSERT INTO offline_actions
                (id, kind, payload, created_at, retry_count, max_retries)
            VALUES (?, ?, ?, ?, 0, ?)
            ON CONFLICT(id) DO UPDATE SET
                kind = excluded.kind,
                payload = excluded.payload,
                created_at = excluded.created_at,
                retry_count = excluded.retry_count,
                max_retries = excluded.max_retries
            ",
        )
        .bind(&stored.id)
        .bind(stored.kind.as_str())
        .bind(serde_json::to_string(&stored.payload)?)
        .bind(stored.created_at.to_rfc3339())
        .bind(stored.max_retries)
        .execute(&self.pool)
        .await?;

        Ok(stored)
    }

    /// All queued actions, fewest failed attempts first, oldest first within
    /// the same attempt count.
    ///
    /// Actions that have never failed drain before actions that already
    /// failed once; new work can therefore starve a repeatedly-failing
    /// action while its retry budget lasts.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    pub async fn pending(&self) -> Result<Vec<OfflineAction>> {
        let rows = sqlx::query(
            r"
            SELECT id, kind, payload, created_at, retry_count, max_retries
            FROM offline_actions
            ORDER BY retry_count ASC, created_at ASC
            ",
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.iter().filter_map(row_to_action).collect())
    }

    /// Delete an action, after success or permanent failure.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    pub async fn remove(&self, id: &str) -> Result<()> {
        sqlx::query(r"DELETE FROM offline_actions WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Record one more failed attempt for an action.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    pub async fn bump_retry(&self, id: &str) -> Result<()> {
        sqlx::query(r"UPDATE offline_actions SET retry_count = retry_count + 1 WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Number of queued actions.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    pub async fn count(&self) -> Result<u64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM offline_actions")
            .fetch_one(&self.pool)
            .await?;
        Ok(u64::try_from(count).unwrap_or_default())
    }
}

fn row_to_action(row: &SqliteRow) -> Option<OfflineAction> {
    let kind: String = row.get("kind");
    let payload: String = row.get("payload");
    let created_at: String = row.get("created_at");

    Some(OfflineAction {
        id: row.get("id"),
        kind: ActionKind::parse(&kind)?,
        payload: serde_json::from_str(&payload).ok()?,
        created_at: DateTime::parse_from_rfc3339(&created_at)
            .ok()?
            .with_timezone(&Utc),
        retry_count: row.get::<u32, _>("retry_count"),
        max_retries: row.get::<u32, _>("max_retries"),
    })
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::StoreManager;
    use chrono::Duration;
    use serde_json::json;

    async fn repo() -> ActionRepository {
        let store = StoreManager::in_memory().await.unwrap();
        ActionRepository::new(store.pool().clone())
    }

    #[tokio::test]
    async fn test_enqueue_assigns_id_and_resets_retries() {
        let repo = repo().await;
        let mut action = OfflineAction::new(ActionKind::SendMessage, json!({"body": "hi"}));
        action.id = String::new();
        action.retry_count = 5;

        let stored = repo.enqueue(action).await.unwrap();
        assert!(!stored.id.is_empty());
        assert_eq!(stored.retry_count, 0);

        let pending = repo.pending().await.unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0], stored);
    }

    #[tokio::test]
    async fn test_pending_orders_fresh_work_first() {
        let repo = repo().await;
        let now = Utc::now();

        let mut old_failed = OfflineAction::new(ActionKind::MarkRead, json!({}));
        old_failed.id = "failed".into();
        old_failed.created_at = now - Duration::hours(1);
        repo.enqueue(old_failed).await.unwrap();
        repo.bump_retry("failed").await.unwrap();

        let mut fresh = OfflineAction::new(ActionKind::SendMessage, json!({}));
        fresh.id = "fresh".into();
        fresh.created_at = now;
        repo.enqueue(fresh).await.unwrap();

        let pending = repo.pending().await.unwrap();
        let ids: Vec<&str> = pending.iter().map(|a| a.id.as_str()).collect();
        assert_eq!(ids, ["fresh", "failed"]);
    }

    #[tokio::test]
    async fn test_pending_orders_by_age_within_same_retry_count() {
        let repo = repo().await;
        let now = Utc::now();

        let mut second = OfflineAction::new(ActionKind::SendMessage, json!({}));
        second.id = "second".into();
        second.created_at = now;
        let mut first = OfflineAction::new(ActionKind::SendMessage, json!({}));
        first.id = "first".into();
        first.created_at = now - Duration::minutes(1);

        repo.enqueue(second).await.unwrap();
        repo.enqueue(first).await.unwrap();

        let pending = repo.pending().await.unwrap();
        let ids: Vec<&str> = pending.iter().map(|a| a.id.as_str()).collect();
        assert_eq!(ids, ["first", "second"]);
    }

    #[tokio::test]
    async fn test_bump_retry_and_remove() {
        let repo = repo().await;
        let stored = repo
            .enqueue(OfflineAction::new(ActionKind::MarkRead, json!({})))
            .await
            .unwrap();

        repo.bump_retry(&stored.id).await.unwrap();
        repo.bump_retry(&stored.id).await.unwrap();
        let pending = repo.pending().await.unwrap();
        assert_eq!(pending[0].retry_count, 2);

        repo.remove(&stored.id).await.unwrap();
        assert_eq!(repo.count().await.unwrap(), 0);
    }
}
