//! Error types for Design Sync Core.

use thiserror::Error;

/// Errors raised while building or parsing core values.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("invalid project id: {0}")]
    InvalidProjectId(String),

    #[error("invalid peer id: {0}")]
    InvalidPeerId(String),

    #[error("cannot encode: {0}")]
    EncodingError(String),

    #[error("cannot decode: {0}")]
    DecodingError(String),

    #[error("chunk error: {0}")]
    Chunk(#[from] ChunkError),
}

/// Errors from fragmenting or reassembling a transfer.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ChunkError {
    #[error("max fragment size must be positive")]
    ZeroFragmentSize,

    #[error("character of {width} bytes does not fit a {max}-byte fragment")]
    FragmentTooSmall { width: usize, max: usize },

    #[error("frame needs {needed} bytes but the ceiling is {max}")]
    FrameTooSmall { needed: usize, max: usize },

    #[error("transfer {id} declares zero chunks")]
    EmptyTransfer { id: String },

    #[error("transfer {id}: index {index} out of range for {total} chunks")]
    IndexOutOfRange { id: String, index: u32, total: u32 },

    #[error("transfer {id}: {total} chunks exceeds limit of {limit}")]
    TooManyChunks { id: String, total: u32, limit: u32 },

    #[error("transfer {id}: total changed from {expected} to {got}")]
    TotalMismatch { id: String, expected: u32, got: u32 },
}
