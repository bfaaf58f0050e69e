//! # Design Sync Core
//!
//! Pure primitives for Design Sync: identities, design documents, sync
//! envelopes and the chunk codec that carries them over size-limited
//! transports.
//!
//! This crate contains no I/O, no storage, no networking.
//!
//! ## Key Types
//!
//! - [`ProjectId`] - Shareable token identifying one design document
//! - [`RendezvousKey`] - Peer id the host of a project registers under
//! - [`DesignDocument`] - Whole-document snapshot exchanged between clients
//! - [`SyncEnvelope`] - The messages peers exchange after reassembly
//! - [`ChunkPart`] / [`TransferSlot`] - Fragmentation and reassembly
//!
//! ## Wire Format
//!
//! Every transport frame is one JSON object:
//!
//! ```text
//! {"type":"chunk-part","id":"<transfer id>","idx":0,"total":3,"payload":"<fragment>"}
//! ```
//!
//! Fragments of one transfer concatenate, in `idx` order, to the JSON text of
//! a [`SyncEnvelope`].

pub mod chunk;
pub mod document;
pub mod envelope;
pub mod error;
pub mod types;

pub use chunk::{
    decode_envelope, encode, fragment_text, frame_overhead, frame_text, limits, new_transfer_id,
    ChunkPart, TransferSlot, DEFAULT_MAX_FRAME,
};
pub use document::{
    now_millis, AccessLevel, CanvasSize, DesignDocument, DesignPatch, DesignSummary, Page,
};
pub use envelope::{SyncEnvelope, WireFrame};
pub use error::{ChunkError, CoreError};
pub use types::{PeerId, ProjectId, RendezvousKey, UserId};
