//! Error types for the core library.

use thiserror::Error;

/// Errors that can occur in cache and sync operations.
#[derive(Debug, Error)]
pub enum Error {
    /// Database operation failed.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Serialization/deserialization error.
    #[error("Serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Remote collaborator call failed.
    #[error("Remote error: {0}")]
    Remote(#[from] crate::sync::RemoteError),

    /// Schema migration failed, or the store was written by a newer build.
    #[error("Migration error: {0}")]
    Migration(String),
}

/// Result type alias using our Error type.
pub type Result<T> = std::result::Result<T, Error>;
