//! Failures reported by [`DesignStore`](crate::DesignStore) backends.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("sqlite: {0}")]
    Database(#[from] rusqlite::Error),

    /// A stored document or identifier could not be decoded.
    #[error("bad stored document: {0}")]
    Serialization(String),

    #[error("no design {0}")]
    NotFound(String),

    /// Ownership is checked before rename and delete.
    #[error("user {user} does not own design {project}")]
    NotOwner { project: String, user: String },

    /// The backend cannot be reached right now. Callers may retry later.
    #[error("store offline: {0}")]
    Unavailable(String),

    #[error("schema: {0}")]
    Migration(String),
}

impl From<serde_json::Error> for StoreError {
    fn from(e: serde_json::Error) -> Self {
        StoreError::Serialization(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, StoreError>;
