//! Media cache storage repository.

use chrono::{DateTime, Utc};
use sqlx::Row;
use sqlx::sqlite::{SqlitePool, SqliteRow};
use tracing::debug;

use super::model::{CachedMedia, MediaStats};
use crate::Result;

/// Repository for URL-keyed media blob storage.
#[derive(Clone)]
pub struct MediaRepository {
    pool: SqlitePool,
}

impl MediaRepository {
    /// Create a repository over the shared store pool.
    #[must_use]
    pub const fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Store an asset, replacing any previous entry for the same URL.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    pub async fn put(&self, media: &CachedMedia) -> Result<()> {
        sqlx::query(
            r"
            INSERT INTO media_cache (url, data, mime_type, size, cached_at, expires_at)
            VALUES (?, ?, ?, ?, ?, ?)
            ON CONFLICT(url) DO UPDATE SET
                data = excluded.data,
                mime_type = excluded.mime_type,
                size = excluded.size,
                cached_at = excluded.cached_at,
                expires_at = excluded.expires_at
            ",
        )
        .bind(&media.url)
        .bind(&media.data)
        .bind(&media.mime_type)
        .bind(i64::try_from(media.size).unwrap_or(i64::MAX))
        .bind(media.cached_at.to_rfc3339())
        .bind(media.expires_at.to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Fetch an asset by URL.
    ///
    /// An entry past its expiry is deleted as a side effect and reported as a
    /// miss; a read never renews the TTL.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    pub async fn get(&self, url: &str) -> Result<Option<CachedMedia>> {
        let row = sqlx::query(
            r"
            SELECT url, data, mime_type, size, cached_at, expires_at
            FROM media_cache
            WHERE url = ?
            ",
        )
        .bind(url)
        .fetch_optional(&self.pool)
        .await?;

        let Some(media) = row.as_ref().and_then(row_to_media) else {
            return Ok(None);
        };

        if media.is_expired() {
            self.remove(url).await?;
            debug!(url, "expired media entry dropped on read");
            return Ok(None);
        }

        Ok(Some(media))
    }

    /// Explicitly evict an asset, e.g. when it is known superseded.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    pub async fn remove(&self, url: &str) -> Result<()> {
        sqlx::query(r"DELETE FROM media_cache WHERE url = ?")
            .bind(url)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Delete every expired entry, returning how many were dropped.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    pub async fn purge_expired(&self) -> Result<u64> {
        let result = sqlx::query(r"DELETE FROM media_cache WHERE expires_at <= ?")
            .bind(Utc::now().to_rfc3339())
            .execute(&self.pool)
            .await?;

        let purged = result.rows_affected();
        if purged > 0 {
            debug!(purged, "purged expired media entries");
        }
        Ok(purged)
    }

    /// Entry count and total byte size of the cache.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    pub async fn stats(&self) -> Result<MediaStats> {
        let row = sqlx::query(
            r"SELECT COUNT(*) AS entries, COALESCE(SUM(size), 0) AS total_bytes FROM media_cache",
        )
        .fetch_one(&self.pool)
        .await?;

        Ok(MediaStats {
            entries: u64::try_from(row.get::<i64, _>("entries")).unwrap_or_default(),
            total_bytes: u64::try_from(row.get::<i64, _>("total_bytes")).unwrap_or_default(),
        })
    }
}

fn row_to_media(row: &SqliteRow) -> Option<CachedMedia> {
    let cached_at: String = row.get("cached_at");
    let expires_at: String = row.get("expires_at");

    Some(CachedMedia {
        url: row.get("url"),
        data: row.get("data"),
        mime_type: row.get("mime_type"),
        size: u64::try_from(row.get::<i64, _>("size")).unwrap_or_default(),
        cached_at: DateTime::parse_from_rfc3339(&cached_at)
            .ok()?
            .with_timezone(&Utc),
        expires_at: DateTime::parse_from_rfc3339(&expires_at)
            .ok()?
            .with_timezone(&Utc),
    })
}
