//! Chunk codec: fragmenting payloads for size-limited transports.
//!
//! A payload is serialized to JSON text first, so fragment boundaries are
//! byte-accurate. [`encode`] sizes each window by its JSON-escaped length
//! plus the `chunk-part` wrapper, so the frame on the wire stays under the
//! ceiling. Windows never split a UTF-8 character.
//!
//! ## Reassembly
//!
//! Each peer owns exactly one [`TransferSlot`]. Reassembly is keyed by
//! fragment index, so fragments may arrive in any order. A slot tracks at
//! most one in-flight transfer: a fragment carrying a different transfer id
//! discards whatever was partially received and starts over. Interrupted
//! transfers are repaired by the sender's next full snapshot, never merged.

use std::collections::BTreeMap;

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::envelope::{SyncEnvelope, WireFrame};
use crate::error::{ChunkError, CoreError};

/// Conservative ceiling on one wire frame for message-oriented peer
/// transports.
pub const DEFAULT_MAX_FRAME: usize = 16 * 1024;

/// Limits enforced on inbound transfers.
pub mod limits {
    /// Max chunks a single transfer may declare (64 MiB at the default
    /// frame size).
    pub const MAX_CHUNKS_PER_TRANSFER: u32 = 4096;
}

/// One fragment of a transfer, as carried in a `chunk-part` frame.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkPart {
    #[serde(rename = "id")]
    pub transfer_id: String,
    #[serde(rename = "idx")]
    pub index: u32,
    pub total: u32,
    #[serde(rename = "payload")]
    pub fragment: String,
}

/// Generate a fresh transfer id.
pub fn new_transfer_id() -> String {
    let bytes: [u8; 8] = rand::thread_rng().gen();
    hex::encode(bytes)
}

/// Serialize `payload` and split it under a fresh transfer id so that every
/// encoded `chunk-part` frame is at most `max_frame` bytes.
pub fn encode<T: Serialize + ?Sized>(
    payload: &T,
    max_frame: usize,
) -> Result<Vec<ChunkPart>, CoreError> {
    let text = serde_json::to_string(payload).map_err(|e| CoreError::EncodingError(e.to_string()))?;
    frame_text(&text, max_frame, &new_transfer_id())
}

/// Split already-serialized text into fragments of at most `max_fragment`
/// raw bytes under `transfer_id`.
///
/// Empty text still produces one empty fragment so the receiver sees a
/// complete transfer.
pub fn fragment_text(
    text: &str,
    max_fragment: usize,
    transfer_id: &str,
) -> Result<Vec<ChunkPart>, ChunkError> {
    if max_fragment == 0 {
        return Err(ChunkError::ZeroFragmentSize);
    }
    let windows = split_windows(text, max_fragment, char::len_utf8).map_err(|width| {
        ChunkError::FragmentTooSmall {
            width,
            max: max_fragment,
        }
    })?;
    into_parts(windows, transfer_id)
}

/// Split already-serialized text so that each part, once wrapped in a
/// `chunk-part` frame and JSON-escaped, is at most `max_frame` bytes.
pub fn frame_text(
    text: &str,
    max_frame: usize,
    transfer_id: &str,
) -> Result<Vec<ChunkPart>, CoreError> {
    let overhead = frame_overhead(transfer_id)?;
    if overhead >= max_frame {
        return Err(ChunkError::FrameTooSmall {
            needed: overhead + 1,
            max: max_frame,
        }
        .into());
    }
    let windows = split_windows(text, max_frame - overhead, escaped_len).map_err(|width| {
        ChunkError::FrameTooSmall {
            needed: overhead + width,
            max: max_frame,
        }
    })?;
    Ok(into_parts(windows, transfer_id)?)
}

/// Bytes a `chunk-part` frame for `transfer_id` takes around its payload.
///
/// Measured with the widest index and total a transfer may declare, so it
/// bounds every frame of the transfer.
pub fn frame_overhead(transfer_id: &str) -> Result<usize, CoreError> {
    let widest = WireFrame::ChunkPart(ChunkPart {
        transfer_id: transfer_id.to_string(),
        index: limits::MAX_CHUNKS_PER_TRANSFER,
        total: limits::MAX_CHUNKS_PER_TRANSFER,
        fragment: String::new(),
    });
    Ok(widest.encode()?.len())
}

/// Bytes `c` occupies inside a JSON string as serde_json writes it.
fn escaped_len(c: char) -> usize {
    match c {
        '"' | '\\' | '\u{8}' | '\t' | '\n' | '\u{c}' | '\r' => 2,
        c if u32::from(c) < 0x20 => 6,
        c => c.len_utf8(),
    }
}

/// Greedy windows of at most `budget` by `cost`, never splitting a char.
///
/// Fails with the cost of a character that alone exceeds the budget.
fn split_windows(
    text: &str,
    budget: usize,
    cost: impl Fn(char) -> usize,
) -> Result<Vec<&str>, usize> {
    let mut out = Vec::new();
    let mut start = 0;
    let mut used = 0;
    for (at, c) in text.char_indices() {
        let width = cost(c);
        if width > budget {
            return Err(width);
        }
        if used + width > budget {
            out.push(&text[start..at]);
            start = at;
            used = 0;
        }
        used += width;
    }
    if start < text.len() || out.is_empty() {
        out.push(&text[start..]);
    }
    Ok(out)
}

fn into_parts(windows: Vec<&str>, transfer_id: &str) -> Result<Vec<ChunkPart>, ChunkError> {
    let total = u32::try_from(windows.len())
        .ok()
        .filter(|n| *n <= limits::MAX_CHUNKS_PER_TRANSFER)
        .ok_or_else(|| ChunkError::TooManyChunks {
            id: transfer_id.to_string(),
            total: u32::try_from(windows.len()).unwrap_or(u32::MAX),
            limit: limits::MAX_CHUNKS_PER_TRANSFER,
        })?;

    Ok(windows
        .into_iter()
        .enumerate()
        .map(|(i, fragment)| ChunkPart {
            transfer_id: transfer_id.to_string(),
            index: i as u32,
            total,
            fragment: fragment.to_string(),
        })
        .collect())
}

/// Parse the text of a completed transfer as a [`SyncEnvelope`].
pub fn decode_envelope(text: &str) -> Result<SyncEnvelope, CoreError> {
    SyncEnvelope::from_json(text)
}

#[derive(Debug)]
struct ChunkTransfer {
    id: String,
    total: u32,
    received: BTreeMap<u32, String>,
}

/// Per-peer reassembly state. Holds at most one in-flight transfer.
#[derive(Debug, Default)]
pub struct TransferSlot {
    current: Option<ChunkTransfer>,
}

impl TransferSlot {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one fragment.
    ///
    /// Returns the reassembled text once every index of the transfer has
    /// been seen, consuming the transfer. A malformed part is rejected and
    /// leaves the slot untouched.
    pub fn accept(&mut self, part: ChunkPart) -> Result<Option<String>, ChunkError> {
        validate(&part)?;

        let continuing = match &self.current {
            Some(t) if t.id == part.transfer_id => {
                if t.total != part.total {
                    return Err(ChunkError::TotalMismatch {
                        id: part.transfer_id,
                        expected: t.total,
                        got: part.total,
                    });
                }
                true
            }
            _ => false,
        };
        if !continuing {
            self.current = Some(ChunkTransfer {
                id: part.transfer_id.clone(),
                total: part.total,
                received: BTreeMap::new(),
            });
        }

        let Some(transfer) = self.current.as_mut() else {
            return Ok(None);
        };
        transfer.received.insert(part.index, part.fragment);
        if transfer.received.len() < transfer.total as usize {
            return Ok(None);
        }

        Ok(self
            .current
            .take()
            .map(|t| t.received.into_values().collect::<String>()))
    }

    /// Id of the transfer currently being reassembled.
    pub fn in_flight(&self) -> Option<&str> {
        self.current.as_ref().map(|t| t.id.as_str())
    }

    /// Fragments received so far for the in-flight transfer.
    pub fn received_count(&self) -> usize {
        self.current.as_ref().map_or(0, |t| t.received.len())
    }

    /// Drop any partial transfer.
    pub fn clear(&mut self) {
        self.current = None;
    }
}

fn validate(part: &ChunkPart) -> Result<(), ChunkError> {
    if part.total == 0 {
        return Err(ChunkError::EmptyTransfer {
            id: part.transfer_id.clone(),
        });
    }
    if part.total > limits::MAX_CHUNKS_PER_TRANSFER {
        return Err(ChunkError::TooManyChunks {
            id: part.transfer_id.clone(),
            total: part.total,
            limit: limits::MAX_CHUNKS_PER_TRANSFER,
        });
    }
    if part.index >= part.total {
        return Err(ChunkError::IndexOutOfRange {
            id: part.transfer_id.clone(),
            index: part.index,
            total: part.total,
        });
    }
    Ok(())
}
