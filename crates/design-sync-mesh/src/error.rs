//! Error types for the mesh module.

use design_sync_core::{ChunkError, CoreError};
use thiserror::Error;

/// Errors that can occur in peer plumbing.
///
/// None of these are fatal to a design session: a failed dial or a dropped
/// session is repaired by the next snapshot exchange.
#[derive(Debug, Error)]
pub enum MeshError {
    /// The id is already registered with the rendezvous service.
    #[error("peer id already taken: {0}")]
    IdTaken(String),

    /// No peer is reachable under that id.
    #[error("peer unavailable: {0}")]
    PeerUnavailable(String),

    /// Dial did not complete in time.
    #[error("dial timed out: {0}")]
    DialTimeout(String),

    /// The session's channel is gone.
    #[error("session closed: {0}")]
    SessionClosed(String),

    /// The local endpoint was closed.
    #[error("endpoint closed")]
    EndpointClosed,

    /// Host election gave up.
    #[error("host election failed after {rounds} rounds")]
    ElectionFailed { rounds: u32 },

    /// The channel to a peer broke mid-exchange.
    #[error("link failure: {0}")]
    TransportError(String),

    /// Malformed fragment.
    #[error("chunk error: {0}")]
    Chunk(#[from] ChunkError),

    /// Envelope or frame encoding failure.
    #[error("codec error: {0}")]
    Codec(#[from] CoreError),
}

/// Result type for mesh operations.
pub type Result<T> = std::result::Result<T, MeshError>;
