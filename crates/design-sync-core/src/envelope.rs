//! Sync envelopes and transport frames.
//!
//! A [`SyncEnvelope`] is what peers mean; a [`WireFrame`] is what actually
//! crosses the transport. Envelopes are always carried as one or more
//! `chunk-part` frames.

use serde::{Deserialize, Serialize};

use crate::chunk::ChunkPart;
use crate::document::DesignDocument;
use crate::error::CoreError;

/// Messages exchanged over a peer session after reassembly.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum SyncEnvelope {
    /// Ask the receiver for its current snapshot.
    RequestState,
    /// Answer to `RequestState`.
    FullState { document: DesignDocument },
    /// A locally-authored change, broadcast after debounce.
    StateUpdate { document: DesignDocument },
}

impl SyncEnvelope {
    /// The carried document, if any.
    pub fn document(&self) -> Option<&DesignDocument> {
        match self {
            SyncEnvelope::RequestState => None,
            SyncEnvelope::FullState { document } | SyncEnvelope::StateUpdate { document } => {
                Some(document)
            }
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            SyncEnvelope::RequestState => "request-state",
            SyncEnvelope::FullState { .. } => "full-state",
            SyncEnvelope::StateUpdate { .. } => "state-update",
        }
    }

    /// Serialize to the JSON text that gets fragmented.
    pub fn to_json(&self) -> Result<String, CoreError> {
        serde_json::to_string(self).map_err(|e| CoreError::EncodingError(e.to_string()))
    }

    /// Parse reassembled JSON text.
    pub fn from_json(text: &str) -> Result<Self, CoreError> {
        serde_json::from_str(text).map_err(|e| CoreError::DecodingError(e.to_string()))
    }
}

/// One transport frame.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum WireFrame {
    #[serde(rename = "chunk-part")]
    ChunkPart(ChunkPart),
}

impl WireFrame {
    pub fn encode(&self) -> Result<Vec<u8>, CoreError> {
        serde_json::to_vec(self).map_err(|e| CoreError::EncodingError(e.to_string()))
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, CoreError> {
        serde_json::from_slice(bytes).map_err(|e| CoreError::DecodingError(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::UserId;
    use serde_json::json;

    #[test]
    fn test_request_state_shape() {
        let value = serde_json::to_value(SyncEnvelope::RequestState).unwrap();
        assert_eq!(value, json!({ "type": "request-state" }));
    }

    #[test]
    fn test_state_update_shape() {
        let doc = DesignDocument::new("poster", UserId::new("alice"));
        let value = serde_json::to_value(SyncEnvelope::StateUpdate {
            document: doc.clone(),
        })
        .unwrap();
        assert_eq!(value["type"], json!("state-update"));
        assert_eq!(value["document"]["name"], json!("poster"));

        let parsed = SyncEnvelope::from_json(&value.to_string()).unwrap();
        assert_eq!(parsed.document(), Some(&doc));
    }

    #[test]
    fn test_chunk_part_frame_shape() {
        let frame = WireFrame::ChunkPart(ChunkPart {
            transfer_id: "t1".into(),
            index: 2,
            total: 5,
            fragment: "abc".into(),
        });
        let value: serde_json::Value = serde_json::from_slice(&frame.encode().unwrap()).unwrap();
        assert_eq!(
            value,
            json!({ "type": "chunk-part", "id": "t1", "idx": 2, "total": 5, "payload": "abc" })
        );
    }

    #[test]
    fn test_unknown_frame_rejected() {
        assert!(WireFrame::decode(br#"{"type":"ping"}"#).is_err());
        assert!(WireFrame::decode(b"not json").is_err());
    }

    #[test]
    fn test_unknown_envelope_rejected() {
        assert!(SyncEnvelope::from_json(r#"{"type":"cursor","x":1}"#).is_err());
    }
}
