//! Conversation cache storage repository.

use chrono::{DateTime, Utc};
use sqlx::Row;
use sqlx::sqlite::{SqlitePool, SqliteRow};
use tracing::debug;

use super::model::{ConversationFilter, ConversationThread};
use crate::{Result, merge};

/// Repository for conversation thread storage and retrieval.
#[derive(Clone)]
pub struct ConversationRepository {
    pool: SqlitePool,
}

impl ConversationRepository {
    /// Create a repository over the shared store pool.
    #[must_use]
    pub const fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Upsert a batch of threads in one transaction, replacing each thread's
    /// participant index rows.
    ///
    /// With `merge` set, an incoming thread that already has a local copy is
    /// first run through the conflict resolver so local preference fields
    /// survive; otherwise the incoming record replaces the row wholesale.
    /// Every written row is stamped with `synced_at` for eviction ordering.
    ///
    /// # Errors
    ///
    /// Returns an error if a query fails or a field cannot be serialized;
    /// the transaction is rolled back.
    pub async fn upsert_batch(
        &self,
        threads: &[ConversationThread],
        merge: bool,
        synced_at: DateTime<Utc>,
    ) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        for incoming in threads {
            let resolved = if merge {
                let local = sqlx::query(SELECT_THREAD)
                    .bind(&incoming.id)
                    .fetch_optional(&mut *tx)
                    .await?
                    .as_ref()
                    .and_then(row_to_thread);
                match local {
                    Some(local) => merge::resolve_conversation(&local, incoming),
                    None => incoming.clone(),
                }
            } else {
                incoming.clone()
            };

            sqlx::query(
                r"
                INSERT INTO conversations
                    (id, participant_ids, last_activity_at, unread_count, is_pinned,
                     is_muted, is_archived, custom_title, created_at, last_synced_at)
                VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                ON CONFLICT(id) DO UPDATE SET
                    participant_ids = excluded.participant_ids,
                    last_activity_at = excluded.last_activity_at,
                    unread_count = excluded.unread_count,
                    is_pinned = excluded.is_pinned,
                    is_muted = excluded.is_muted,
                    is_archived = excluded.is_archived,
                    custom_title = excluded.custom_title,
                    created_at = excluded.created_at,
                    last_synced_at = excluded.last_synced_at
                ",
            )
            .bind(&resolved.id)
            .bind(serde_json::to_string(&resolved.participant_ids)?)
            .bind(resolved.last_activity_at.to_rfc3339())
            .bind(resolved.unread_count)
            .bind(resolved.is_pinned)
            .bind(resolved.is_muted)
            .bind(resolved.is_archived)
            .bind(&resolved.custom_title)
            .bind(resolved.created_at.to_rfc3339())
            .bind(synced_at.to_rfc3339())
            .execute(&mut *tx)
            .await?;

            sqlx::query(r"DELETE FROM participants WHERE thread_id = ?")
                .bind(&resolved.id)
                .execute(&mut *tx)
                .await?;
            for participant in resolved.participants() {
                sqlx::query(
                    r"INSERT INTO participants (id, thread_id, user_id) VALUES (?, ?, ?)",
                )
                .bind(&participant.id)
                .bind(&participant.thread_id)
                .bind(&participant.user_id)
                .execute(&mut *tx)
                .await?;
            }
        }

        tx.commit().await?;
        Ok(())
    }

    /// Get a single thread by id.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    pub async fn get(&self, id: &str) -> Result<Option<ConversationThread>> {
        let row = sqlx::query(SELECT_THREAD)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(row.as_ref().and_then(row_to_thread))
    }

    /// List cached threads matching the filter, in the filter's sort order.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    pub async fn list(&self, filter: &ConversationFilter) -> Result<Vec<ConversationThread>> {
        let mut sql = String::from(
            "SELECT id, participant_ids, last_activity_at, unread_count, is_pinned,
                    is_muted, is_archived, custom_title, created_at
             FROM conversations",
        );

        let mut clauses: Vec<&str> = Vec::new();
        if !filter.include_archived {
            clauses.push("is_archived = 0");
        }
        if filter.unread_only {
            clauses.push("unread_count > 0");
        }
        if filter.pinned_only {
            clauses.push("is_pinned = 1");
        }
        if filter.participant.is_some() {
            clauses.push("id IN (SELECT thread_id FROM participants WHERE user_id = ?)");
        }
        if !clauses.is_empty() {
            sql.push_str(" WHERE ");
            sql.push_str(&clauses.join(" AND "));
        }
        sql.push_str(" ORDER BY ");
        sql.push_str(filter.sort.order_clause());
        if filter.limit.is_some() {
            sql.push_str(" LIMIT ?");
        }

        let mut query = sqlx::query(&sql);
        if let Some(user_id) = &filter.participant {
            query = query.bind(user_id);
        }
        if let Some(limit) = filter.limit {
            query = query.bind(limit);
        }

        let rows = query.fetch_all(&self.pool).await?;
        Ok(rows.iter().filter_map(row_to_thread).collect())
    }

    /// Remove a thread and its participant index rows.
    ///
    /// # Errors
    ///
    /// Returns an error if a delete fails; the transaction is rolled back.
    pub async fn remove(&self, id: &str) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        sqlx::query(r"DELETE FROM participants WHERE thread_id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await?;
        sqlx::query(r"DELETE FROM conversations WHERE id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        Ok(())
    }

    /// Count all cached threads, archived included.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    pub async fn count(&self) -> Result<u64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM conversations")
            .fetch_one(&self.pool)
            .await?;
        Ok(u64::try_from(count).unwrap_or_default())
    }

    /// Evict oldest-synced non-pinned threads until the cache holds at most
    /// `max` threads, or no non-pinned candidates remain.
    ///
    /// Pinned threads are never evicted; if pinned threads alone exceed the
    /// cap, the bound stays violated. Returns the number of evicted threads.
    ///
    /// # Errors
    ///
    /// Returns an error if a query fails; the transaction is rolled back.
    pub async fn evict_to_cap(&self, max: u32) -> Result<u64> {
        let total = self.count().await?;
        let max = u64::from(max);
        if total <= max {
            return Ok(0);
        }
        let excess = total - max;

        let candidates: Vec<String> = sqlx::query_scalar(
            r"
            SELECT id FROM conversations
            WHERE is_pinned = 0
            ORDER BY last_synced_at ASC
            LIMIT ?
            ",
        )
        .bind(i64::try_from(excess).unwrap_or(i64::MAX))
        .fetch_all(&self.pool)
        .await?;

        let mut tx = self.pool.begin().await?;
        for id in &candidates {
            sqlx::query(r"DELETE FROM participants WHERE thread_id = ?")
                .bind(id)
                .execute(&mut *tx)
                .await?;
            sqlx::query(r"DELETE FROM conversations WHERE id = ?")
                .bind(id)
                .execute(&mut *tx)
                .await?;
        }
        tx.commit().await?;

        if !candidates.is_empty() {
            debug!(evicted = candidates.len(), "evicted conversations over cap");
        }
        Ok(candidates.len() as u64)
    }
}

const SELECT_THREAD: &str = "
    SELECT id, participant_ids, last_activity_at, unread_count, is_pinned,
           is_muted, is_archived, custom_title, created_at
    FROM conversations
    WHERE id = ?
";

/// Map a row to a domain thread. The `last_synced_at` column is persistence
/// metadata and never crosses this boundary.
fn row_to_thread(row: &SqliteRow) -> Option<ConversationThread> {
    let participant_ids: String = row.get("participant_ids");
    let last_activity_at: String = row.get("last_activity_at");
    let created_at: String = row.get("created_at");

    Some(ConversationThread {
        id: row.get("id"),
        participant_ids: serde_json::from_str(&participant_ids).ok()?,
        last_activity_at: DateTime::parse_from_rfc3339(&last_activity_at)
            .ok()?
            .with_timezone(&Utc),
        unread_count: row.get::<u32, _>("unread_count"),
        is_pinned: row.get::<bool, _>("is_pinned"),
        is_muted: row.get::<bool, _>("is_muted"),
        is_archived: row.get::<bool, _>("is_archived"),
        custom_title: row.get("custom_title"),
        created_at: DateTime::parse_from_rfc3339(&created_at)
            .ok()?
            .with_timezone(&Utc),
    })
}
