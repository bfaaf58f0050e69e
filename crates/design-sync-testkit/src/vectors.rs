//! Golden wire vectors for the chunk codec.
//!
//! Each vector pins the exact frames a sender must emit for a given text,
//! fragment size and transfer id. Any client speaking the protocol has to
//! produce byte-identical frames.

use design_sync_core::{fragment_text, TransferSlot, WireFrame};

/// A golden chunking vector.
#[derive(Debug, Clone)]
pub struct ChunkVector {
    /// Short label used in failure reports.
    pub name: &'static str,
    /// Serialized envelope text being sent.
    pub text: &'static str,
    /// Fragment ceiling in bytes.
    pub max_fragment: usize,
    /// Transfer id stamped on every frame.
    pub transfer_id: &'static str,
    /// Expected frames, in send order.
    pub expected_frames: &'static [&'static str],
}

/// Get all golden vectors.
pub fn all_vectors() -> Vec<ChunkVector> {
    vec![
        ChunkVector {
            name: "request-state split in three",
            text: r#"{"type":"request-state"}"#,
            max_fragment: 10,
            transfer_id: "t1",
            expected_frames: &[
                r#"{"type":"chunk-part","id":"t1","idx":0,"total":3,"payload":"{\"type\":\"r"}"#,
                r#"{"type":"chunk-part","id":"t1","idx":1,"total":3,"payload":"equest-sta"}"#,
                r#"{"type":"chunk-part","id":"t1","idx":2,"total":3,"payload":"te\"}"}"#,
            ],
        },
        ChunkVector {
            name: "multi-byte characters never split",
            text: "aé😀b",
            max_fragment: 4,
            transfer_id: "mb",
            expected_frames: &[
                r#"{"type":"chunk-part","id":"mb","idx":0,"total":3,"payload":"aé"}"#,
                r#"{"type":"chunk-part","id":"mb","idx":1,"total":3,"payload":"😀"}"#,
                r#"{"type":"chunk-part","id":"mb","idx":2,"total":3,"payload":"b"}"#,
            ],
        },
        ChunkVector {
            name: "empty text is one empty frame",
            text: "",
            max_fragment: 16,
            transfer_id: "e0",
            expected_frames: &[r#"{"type":"chunk-part","id":"e0","idx":0,"total":1,"payload":""}"#],
        },
        ChunkVector {
            name: "control characters are escaped",
            text: "line1\nline2",
            max_fragment: 64,
            transfer_id: "nl",
            expected_frames: &[
                r#"{"type":"chunk-part","id":"nl","idx":0,"total":1,"payload":"line1\nline2"}"#,
            ],
        },
    ]
}

/// Produce the frames for a vector, as UTF-8 text.
pub fn frames_for_vector(vector: &ChunkVector) -> Vec<String> {
    let parts = fragment_text(vector.text, vector.max_fragment, vector.transfer_id)
        .expect("golden vector must be encodable");
    parts
        .into_iter()
        .map(|part| {
            let bytes = WireFrame::ChunkPart(part)
                .encode()
                .expect("chunk part serializes");
            String::from_utf8(bytes).expect("frames are UTF-8")
        })
        .collect()
}

/// Verify every vector: frames match byte for byte, and feeding them back
/// in reverse order reassembles the original text.
///
/// Returns `(name, passed, detail)` per vector.
pub fn verify_all_vectors() -> Vec<(String, bool, String)> {
    all_vectors()
        .into_iter()
        .map(|vector| {
            let frames = frames_for_vector(&vector);
            let (passed, detail) = if frames != vector.expected_frames {
                (false, format!("frames differ: {frames:?}"))
            } else {
                match reassemble_reversed(&frames) {
                    Some(text) if text == vector.text => (true, "ok".to_string()),
                    Some(text) => (false, format!("reassembled {text:?}")),
                    None => (false, "transfer never completed".to_string()),
                }
            };
            (vector.name.to_string(), passed, detail)
        })
        .collect()
}

fn reassemble_reversed(frames: &[String]) -> Option<String> {
    let mut slot = TransferSlot::new();
    let mut done = None;
    for frame in frames.iter().rev() {
        let WireFrame::ChunkPart(part) = WireFrame::decode(frame.as_bytes()).ok()?;
        if let Some(text) = slot.accept(part).ok()? {
            done = Some(text);
        }
    }
    done
}
