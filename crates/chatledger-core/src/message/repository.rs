//! Message cache storage repository.

use chrono::{DateTime, Utc};
use sqlx::Row;
use sqlx::sqlite::{SqlitePool, SqliteRow};
use tracing::debug;

use super::model::{MessageKind, MessageQuery, ThreadMessage};
use crate::{Result, merge};

/// Repository for per-thread message storage and retrieval.
#[derive(Clone)]
pub struct MessageRepository {
    pool: SqlitePool,
}

impl MessageRepository {
    /// Create a repository over the shared store pool.
    #[must_use]
    pub const fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Upsert a batch of messages in one transaction.
    ///
    /// With `merge` set, an incoming message that already has a local copy is
    /// run through the conflict resolver so locally-recorded read receipts
    /// survive a server snapshot; otherwise the incoming record replaces the
    /// row wholesale. Every written row is stamped with `synced_at`.
    ///
    /// # Errors
    ///
    /// Returns an error if a query fails or a field cannot be serialized;
    /// the transaction is rolled back.
    pub async fn upsert_batch(
        &self,
        messages: &[ThreadMessage],
        merge: bool,
        synced_at: DateTime<Utc>,
    ) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        for incoming in messages {
            let resolved = if merge {
                let local = sqlx::query(SELECT_MESSAGE)
                    .bind(&incoming.id)
                    .fetch_optional(&mut *tx)
                    .await?
                    .as_ref()
                    .and_then(row_to_message);
                match local {
                    Some(local) => merge::resolve_message(&local, incoming),
                    None => incoming.clone(),
                }
            } else {
                incoming.clone()
            };

            sqlx::query(
                r"
                INSERT INTO messages
                    (id, thread_id, sender_id, kind, body, attachment_url,
                     parent_message_id, reply_count, read_by, created_at, last_synced_at)
                VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                ON CONFLICT(id) DO UPDATE SET
                    thread_id = excluded.thread_id,
                    sender_id = excluded.sender_id,
                    kind = excluded.kind,
                    body = excluded.body,
                    attachment_url = excluded.attachment_url,
                    parent_message_id = excluded.parent_message_id,
                    reply_count = excluded.reply_count,
                    read_by = excluded.read_by,
                    created_at = excluded.created_at,
                    last_synced_at = excluded.last_synced_at
                ",
            )
            .bind(&resolved.id)
            .bind(&resolved.thread_id)
            .bind(&resolved.sender_id)
            .bind(resolved.kind.as_str())
            .bind(&resolved.body)
            .bind(&resolved.attachment_url)
            .bind(&resolved.parent_message_id)
            .bind(resolved.reply_count)
            .bind(serde_json::to_string(&resolved.read_by)?)
            .bind(resolved.created_at.to_rfc3339())
            .bind(synced_at.to_rfc3339())
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    /// Get a single message by id.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    pub async fn get(&self, id: &str) -> Result<Option<ThreadMessage>> {
        let row = sqlx::query(SELECT_MESSAGE)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(row.as_ref().and_then(row_to_message))
    }

    /// List a thread's messages ascending by send time.
    ///
    /// With a `limit`, the most recent page is returned (still ascending);
    /// `before` selects strictly older messages for backwards pagination.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    pub async fn list_page(
        &self,
        thread_id: &str,
        query: &MessageQuery,
    ) -> Result<Vec<ThreadMessage>> {
        let mut sql = String::from(SELECT_PAGE_BASE);
        if query.before.is_some() {
            sql.push_str(" AND created_at < ?");
        }
        sql.push_str(" ORDER BY created_at DESC");
        if query.limit.is_some() {
            sql.push_str(" LIMIT ?");
        }

        let mut q = sqlx::query(&sql).bind(thread_id);
        if let Some(before) = query.before {
            q = q.bind(before.to_rfc3339());
        }
        if let Some(limit) = query.limit {
            q = q.bind(limit);
        }

        let rows = q.fetch_all(&self.pool).await?;
        let mut messages: Vec<ThreadMessage> = rows.iter().filter_map(row_to_message).collect();
        messages.reverse();
        Ok(messages)
    }

    /// List the replies to a message, ascending by send time.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    pub async fn replies(&self, parent_id: &str) -> Result<Vec<ThreadMessage>> {
        let rows = sqlx::query(
            r"
            SELECT id, thread_id, sender_id, kind, body, attachment_url,
                   parent_message_id, reply_count, read_by, created_at
            FROM messages
            WHERE parent_message_id = ?
            ORDER BY created_at ASC
            ",
        )
        .bind(parent_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.iter().filter_map(row_to_message).collect())
    }

    /// Count the messages cached for one thread.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    pub async fn count_for_thread(&self, thread_id: &str) -> Result<u64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM messages WHERE thread_id = ?")
            .bind(thread_id)
            .fetch_one(&self.pool)
            .await?;
        Ok(u64::try_from(count).unwrap_or_default())
    }

    /// Evict a thread's oldest messages (by send time) until at most `max`
    /// remain. No field exempts a message from this eviction.
    ///
    /// Returns the number of evicted messages.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    pub async fn evict_thread_to_cap(&self, thread_id: &str, max: u32) -> Result<u64> {
        let result = sqlx::query(
            r"
            DELETE FROM messages
            WHERE thread_id = ?1 AND id NOT IN (
                SELECT id FROM messages
                WHERE thread_id = ?1
                ORDER BY created_at DESC
                LIMIT ?2
            )
            ",
        )
        .bind(thread_id)
        .bind(i64::from(max))
        .execute(&self.pool)
        .await?;

        let evicted = result.rows_affected();
        if evicted > 0 {
            debug!(thread_id, evicted, "evicted messages over per-thread cap");
        }
        Ok(evicted)
    }
}

const SELECT_MESSAGE: &str = "
    SELECT id, thread_id, sender_id, kind, body, attachment_url,
           parent_message_id, reply_count, read_by, created_at
    FROM messages
    WHERE id = ?
";

const SELECT_PAGE_BASE: &str = "
    SELECT id, thread_id, sender_id, kind, body, attachment_url,
           parent_message_id, reply_count, read_by, created_at
    FROM messages
    WHERE thread_id = ?
";

/// Map a row to a domain message. The `last_synced_at` column is persistence
/// metadata and never crosses this boundary.
fn row_to_message(row: &SqliteRow) -> Option<ThreadMessage> {
    let kind: String = row.get("kind");
    let read_by: String = row.get("read_by");
    let created_at: String = row.get("created_at");

    Some(ThreadMessage {
        id: row.get("id"),
        thread_id: row.get("thread_id"),
        sender_id: row.get("sender_id"),
        kind: MessageKind::parse(&kind),
        body: row.get("body"),
        attachment_url: row.get("attachment_url"),
        parent_message_id: row.get("parent_message_id"),
        reply_count: row.get::<u32, _>("reply_count"),
        read_by: serde_json::from_str(&read_by).ok()?,
        created_at: DateTime::parse_from_rfc3339(&created_at)
            .ok()?
            .with_timezone(&Utc),
    })
}
