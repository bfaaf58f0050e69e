//! Error types for design sessions.

use design_sync_core::CoreError;
use design_sync_mesh::MeshError;
use design_sync_store::StoreError;
use thiserror::Error;

/// Errors surfaced by [`DesignSession`](crate::DesignSession) and friends.
///
/// Once a session is running, transport and store failures are logged and
/// absorbed by the driver; these only come back from setup calls and from
/// handles to a session that has ended.
#[derive(Debug, Error)]
pub enum SessionError {
    /// Peer plumbing error.
    #[error("mesh error: {0}")]
    Mesh(#[from] MeshError),

    /// Durable store error.
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// Identifier or codec error.
    #[error("core error: {0}")]
    Core(#[from] CoreError),

    /// The session driver has stopped.
    #[error("session closed")]
    Closed,

    /// Creating a design needs a signed-in user to own it.
    #[error("no local user to own the design")]
    NoLocalUser,

    /// The share link could not be parsed.
    #[error("invalid share link: {0}")]
    InvalidShareLink(String),

    #[error("malformed url: {0}")]
    Url(#[from] url::ParseError),
}

/// Result type for session operations.
pub type Result<T> = std::result::Result<T, SessionError>;
