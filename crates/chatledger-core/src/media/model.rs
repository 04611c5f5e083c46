//! Media cache data models.

use chrono::{DateTime, Duration, Utc};

/// A binary asset cached by its remote URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CachedMedia {
    /// Remote URL the asset was fetched from; the cache key.
    pub url: String,
    /// Raw asset bytes.
    pub data: Vec<u8>,
    /// MIME type of the asset.
    pub mime_type: String,
    /// Size of the asset in bytes.
    pub size: u64,
    /// When the asset was cached.
    pub cached_at: DateTime<Utc>,
    /// When the asset becomes stale and must be discarded on next access.
    pub expires_at: DateTime<Utc>,
}

impl CachedMedia {
    /// Create a new entry expiring `ttl` from now.
    #[must_use]
    pub fn new(url: impl Into<String>, data: Vec<u8>, mime_type: impl Into<String>, ttl: Duration) -> Self {
        let now = Utc::now();
        Self {
            url: url.into(),
            size: data.len() as u64,
            data,
            mime_type: mime_type.into(),
            cached_at: now,
            expires_at: now + ttl,
        }
    }

    /// Returns true if the entry has passed its expiry time.
    #[must_use]
    pub fn is_expired(&self) -> bool {
        Utc::now() >= self.expires_at
    }
}

/// Aggregate size of the media cache.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MediaStats {
    /// Number of cached entries.
    pub entries: u64,
    /// Total bytes across all cached entries.
    pub total_bytes: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_derives_size_and_expiry() {
        let media = CachedMedia::new("https://cdn.example/a.png", vec![0; 16], "image/png", Duration::days(7));

        assert_eq!(media.size, 16);
        assert_eq!(media.expires_at, media.cached_at + Duration::days(7));
        assert!(!media.is_expired());
    }

    #[test]
    fn test_zero_ttl_is_immediately_expired() {
        let media = CachedMedia::new("https://cdn.example/a.png", vec![1], "image/png", Duration::zero());
        assert!(media.is_expired());
    }
}
