//! One peer session: a link plus its reader and writer tasks.
//!
//! The reader task owns the session's [`TransferSlot`], so reassembly state
//! lives exactly as long as the link. The writer task drains an outbox of
//! pre-encoded envelopes and paces fragments onto the link.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use bytes::Bytes;
use design_sync_core::{decode_envelope, encode, PeerId, SyncEnvelope, TransferSlot, WireFrame};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::config::ChunkConfig;
use crate::error::{MeshError, Result};
use crate::network::{Link, LinkReceiver, LinkSender};

/// Process-unique session identifier.
pub type SessionId = u64;

static NEXT_SESSION: AtomicU64 = AtomicU64::new(1);

/// Events reported by sessions to their owner.
#[derive(Debug, Clone)]
pub enum MeshEvent {
    /// A complete envelope arrived.
    Envelope {
        session: SessionId,
        from: PeerId,
        envelope: SyncEnvelope,
    },
    /// The remote side closed the link. Any partial transfer was discarded.
    Closed { session: SessionId, peer: PeerId },
}

/// An envelope already fragmented into wire frames.
///
/// Cloning shares the frames, so one encoding serves every recipient of a
/// broadcast.
#[derive(Debug, Clone)]
pub struct EncodedEnvelope {
    kind: &'static str,
    frames: Arc<[Bytes]>,
}

impl EncodedEnvelope {
    pub fn encode(envelope: &SyncEnvelope, config: &ChunkConfig) -> Result<Self> {
        let frames = encode(envelope, config.max_frame)?
            .into_iter()
            .map(|part| WireFrame::ChunkPart(part).encode().map(Bytes::from))
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(Self {
            kind: envelope.kind(),
            frames: frames.into(),
        })
    }

    pub fn kind(&self) -> &'static str {
        self.kind
    }

    pub fn frames(&self) -> &[Bytes] {
        &self.frames
    }
}

/// A live session with one remote peer.
///
/// Dropping the session stops both tasks and closes the link.
#[derive(Debug)]
pub struct PeerSession {
    id: SessionId,
    peer: PeerId,
    outbox: mpsc::UnboundedSender<EncodedEnvelope>,
    reader: JoinHandle<()>,
    writer: JoinHandle<()>,
}

impl PeerSession {
    /// Start reader and writer tasks for `link`.
    ///
    /// Completed envelopes and the final close are reported on `events`.
    pub fn spawn(
        link: Link,
        config: ChunkConfig,
        events: mpsc::UnboundedSender<MeshEvent>,
    ) -> Self {
        let id = NEXT_SESSION.fetch_add(1, Ordering::Relaxed);
        let peer = link.remote().clone();
        let (tx, rx) = link.split();
        let (outbox, queued) = mpsc::unbounded_channel();

        let reader = tokio::spawn(read_loop(id, rx, events));
        let writer = tokio::spawn(write_loop(tx, queued, config));

        debug!(session = id, peer = %peer, "session opened");
        Self {
            id,
            peer,
            outbox,
            reader,
            writer,
        }
    }

    pub fn id(&self) -> SessionId {
        self.id
    }

    pub fn peer(&self) -> &PeerId {
        &self.peer
    }

    /// Queue an envelope for transmission. Never waits on the link.
    pub fn send(&self, envelope: &EncodedEnvelope) -> Result<()> {
        self.outbox
            .send(envelope.clone())
            .map_err(|_| MeshError::SessionClosed(self.peer.to_string()))
    }

    /// False once the writer has given up on the link.
    pub fn is_open(&self) -> bool {
        !self.outbox.is_closed()
    }
}

impl Drop for PeerSession {
    fn drop(&mut self) {
        self.reader.abort();
        self.writer.abort();
    }
}

async fn read_loop(
    session: SessionId,
    mut rx: LinkReceiver,
    events: mpsc::UnboundedSender<MeshEvent>,
) {
    let peer = rx.remote().clone();
    let mut slot = TransferSlot::new();

    while let Some(frame) = rx.recv().await {
        match reassemble(&mut slot, &frame) {
            Ok(Some(envelope)) => {
                debug!(session, peer = %peer, kind = envelope.kind(), "envelope received");
                let event = MeshEvent::Envelope {
                    session,
                    from: peer.clone(),
                    envelope,
                };
                if events.send(event).is_err() {
                    return;
                }
            }
            Ok(None) => {}
            Err(e) => warn!(session, peer = %peer, error = %e, "dropping malformed frame"),
        }
    }

    if let Some(transfer) = slot.in_flight() {
        debug!(session, peer = %peer, transfer, "discarding partial transfer");
    }
    let _ = events.send(MeshEvent::Closed { session, peer });
}

fn reassemble(slot: &mut TransferSlot, frame: &[u8]) -> Result<Option<SyncEnvelope>> {
    let WireFrame::ChunkPart(part) = WireFrame::decode(frame)?;
    match slot.accept(part)? {
        Some(text) => Ok(Some(decode_envelope(&text)?)),
        None => Ok(None),
    }
}

async fn write_loop(
    tx: LinkSender,
    mut queued: mpsc::UnboundedReceiver<EncodedEnvelope>,
    config: ChunkConfig,
) {
    while let Some(envelope) = queued.recv().await {
        for (i, frame) in envelope.frames().iter().enumerate() {
            if config.pace_every > 0 && i > 0 && i % config.pace_every == 0 {
                tokio::time::sleep(config.pace_delay).await;
            }
            if let Err(e) = tx.send(frame.clone()).await {
                debug!(error = %e, kind = envelope.kind(), "link gone, stopping writer");
                return;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use design_sync_core::{fragment_text, frame_overhead, DesignDocument, UserId};
    use proptest::prelude::*;
    use serde_json::json;
    use std::time::Duration;

    fn id(s: &str) -> PeerId {
        PeerId::new(s).unwrap()
    }

    fn small_chunks() -> ChunkConfig {
        ChunkConfig {
            max_frame: 128,
            pace_every: 4,
            pace_delay: Duration::from_millis(2),
        }
    }

    fn sample_update() -> SyncEnvelope {
        let mut document = DesignDocument::new("Poster", UserId::new("alice"));
        document.name = "Poster ✨ with a long enough name to need many fragments".into();
        SyncEnvelope::StateUpdate { document }
    }

    #[test]
    fn test_encoded_frames_are_chunk_parts() {
        let encoded = EncodedEnvelope::encode(&sample_update(), &small_chunks()).unwrap();
        assert_eq!(encoded.kind(), "state-update");
        assert!(encoded.frames().len() > 1);
        for frame in encoded.frames() {
            assert!(frame.starts_with(br#"{"type":"chunk-part""#));
        }
    }

    fn quoted_layers(count: usize) -> SyncEnvelope {
        let mut document = DesignDocument::new("Quotes", UserId::new("alice"));
        document.pages[0].layers = (0..count)
            .map(|i| json!({ "id": format!("l{i}"), "text": "\"a\"\t\"b\"\n\u{2}" }))
            .collect();
        SyncEnvelope::StateUpdate { document }
    }

    #[test]
    fn test_default_frames_respect_ceiling() {
        let config = ChunkConfig::default();
        let encoded = EncodedEnvelope::encode(&quoted_layers(2000), &config).unwrap();
        assert!(encoded.frames().len() > 1);
        for frame in encoded.frames() {
            assert!(frame.len() <= config.max_frame, "frame of {} bytes", frame.len());
        }
    }

    proptest! {
        #[test]
        fn prop_encoded_frames_respect_ceiling(layers in 0usize..60, room in 6usize..400) {
            let config = ChunkConfig {
                max_frame: frame_overhead("0123456789abcdef").unwrap() + room,
                ..ChunkConfig::default()
            };
            let encoded = EncodedEnvelope::encode(&quoted_layers(layers), &config).unwrap();
            prop_assert!(encoded.frames().iter().all(|f| f.len() <= config.max_frame));
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_envelope_crosses_link() {
        let (a, b) = Link::pair(id("a"), id("b"), 16);
        let (a_events, _a_rx) = mpsc::unbounded_channel();
        let (b_events, mut b_rx) = mpsc::unbounded_channel();
        let session_a = PeerSession::spawn(a, small_chunks(), a_events);
        let session_b = PeerSession::spawn(b, small_chunks(), b_events);

        let envelope = sample_update();
        let encoded = EncodedEnvelope::encode(&envelope, &small_chunks()).unwrap();
        session_a.send(&encoded).unwrap();

        match b_rx.recv().await.unwrap() {
            MeshEvent::Envelope {
                session,
                from,
                envelope: got,
            } => {
                assert_eq!(session, session_b.id());
                assert_eq!(from, id("a"));
                assert_eq!(got, envelope);
            }
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_malformed_frames_are_skipped() {
        let (raw, b) = Link::pair(id("raw"), id("b"), 16);
        let (raw_tx, _raw_rx) = raw.split();
        let (events, mut rx) = mpsc::unbounded_channel();
        let _session = PeerSession::spawn(b, ChunkConfig::default(), events);

        raw_tx.send(Bytes::from_static(b"not json")).await.unwrap();
        raw_tx
            .send(Bytes::from_static(br#"{"type":"chunk-part","id":"x","idx":3,"total":1,"payload":""}"#))
            .await
            .unwrap();

        let text = SyncEnvelope::RequestState.to_json().unwrap();
        for part in fragment_text(&text, 8, "good").unwrap() {
            let frame = WireFrame::ChunkPart(part).encode().unwrap();
            raw_tx.send(Bytes::from(frame)).await.unwrap();
        }

        match rx.recv().await.unwrap() {
            MeshEvent::Envelope { envelope, .. } => {
                assert_eq!(envelope, SyncEnvelope::RequestState)
            }
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_remote_close_reports_closed() {
        let (raw, b) = Link::pair(id("raw"), id("b"), 16);
        let (events, mut rx) = mpsc::unbounded_channel();
        let session = PeerSession::spawn(b, ChunkConfig::default(), events);

        let (raw_tx, _raw_rx) = raw.split();
        let text = SyncEnvelope::RequestState.to_json().unwrap();
        let first = fragment_text(&text, 4, "partial").unwrap().remove(0);
        raw_tx
            .send(Bytes::from(WireFrame::ChunkPart(first).encode().unwrap()))
            .await
            .unwrap();
        drop(raw_tx);
        drop(_raw_rx);

        match rx.recv().await.unwrap() {
            MeshEvent::Closed { session: sid, peer } => {
                assert_eq!(sid, session.id());
                assert_eq!(peer, id("raw"));
            }
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_dropping_session_closes_link() {
        let (a, b) = Link::pair(id("a"), id("b"), 16);
        let (events, _rx) = mpsc::unbounded_channel();
        let session = PeerSession::spawn(a, ChunkConfig::default(), events);

        let (_b_tx, mut b_rx) = b.split();
        drop(session);
        assert!(b_rx.recv().await.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_pacing_yields_between_batches() {
        let (a, b) = Link::pair(id("a"), id("b"), 256);
        let (events, _rx) = mpsc::unbounded_channel();
        let config = ChunkConfig {
            max_frame: 100,
            pace_every: 2,
            pace_delay: Duration::from_millis(10),
        };
        let session = PeerSession::spawn(a, config.clone(), events);
        let encoded = EncodedEnvelope::encode(&sample_update(), &config).unwrap();
        let frames = encoded.frames().len();
        assert!(frames > 4);

        let (_b_tx, mut b_rx) = b.split();
        let start = tokio::time::Instant::now();
        session.send(&encoded).unwrap();
        for _ in 0..frames {
            b_rx.recv().await.unwrap();
        }
        let pauses = ((frames - 1) / 2) as u32;
        assert!(start.elapsed() >= Duration::from_millis(10) * pauses);
    }

    #[tokio::test]
    async fn test_send_after_writer_stops() {
        let (a, b) = Link::pair(id("a"), id("b"), 16);
        let (events, _rx) = mpsc::unbounded_channel();
        let session = PeerSession::spawn(a, ChunkConfig::default(), events);
        drop(b);

        let encoded = EncodedEnvelope::encode(&SyncEnvelope::RequestState, &ChunkConfig::default())
            .unwrap();
        // The first send is queued; the writer notices the dead link and exits.
        session.send(&encoded).unwrap();
        while session.is_open() {
            tokio::task::yield_now().await;
        }
        assert!(matches!(
            session.send(&encoded),
            Err(MeshError::SessionClosed(_))
        ));
    }
}
