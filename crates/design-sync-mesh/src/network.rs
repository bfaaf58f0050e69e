//! Transport abstraction for the peer mesh.
//!
//! Two external services sit behind these traits: a rendezvous service that
//! maps a peer id to a reachable process, and a message-oriented transport
//! that carries frames between two processes. Implementations may use
//! WebRTC data channels, WebSockets through a relay, or anything else that
//! delivers frames in order per link.

use async_trait::async_trait;
use bytes::Bytes;
use design_sync_core::PeerId;
use tokio::sync::mpsc;

use crate::error::{MeshError, Result};

/// Entry point to a peer network: claims ids.
#[async_trait]
pub trait PeerNetwork: Send + Sync {
    /// Register this process under `id`.
    ///
    /// Fails with [`MeshError::IdTaken`] when another process owns the id.
    async fn register(&self, id: &PeerId) -> Result<Box<dyn Endpoint>>;
}

/// A registered presence on the peer network.
#[async_trait]
pub trait Endpoint: Send + Sync {
    /// The id this endpoint is registered under.
    fn local_id(&self) -> &PeerId;

    /// Wait for the next inbound link. `None` once the endpoint is closed.
    async fn accept(&self) -> Option<Link>;

    /// Dial a remote peer.
    ///
    /// Fails with [`MeshError::PeerUnavailable`] when nothing is registered
    /// under `remote` or it stopped accepting.
    async fn connect(&self, remote: &PeerId) -> Result<Link>;

    /// Resolves when the registration channel to the rendezvous service drops.
    /// Established links are unaffected.
    async fn signalling_lost(&self);

    /// Re-register under the same id after `signalling_lost`.
    ///
    /// Fails with [`MeshError::IdTaken`] if someone claimed the id meanwhile.
    async fn reconnect(&self) -> Result<()>;

    /// Unregister and stop accepting.
    async fn close(&self);
}

/// Default frames buffered per direction of a link.
pub const DEFAULT_LINK_CAPACITY: usize = 256;

/// A bidirectional, ordered frame channel to one remote peer.
///
/// Dropping either half closes that direction; the remote side observes
/// the close as `recv() == None`.
#[derive(Debug)]
pub struct Link {
    remote: PeerId,
    tx: mpsc::Sender<Bytes>,
    rx: mpsc::Receiver<Bytes>,
}

impl Link {
    /// Build a connected pair: the first half talks to `b`, the second to `a`.
    pub fn pair(a: PeerId, b: PeerId, capacity: usize) -> (Link, Link) {
        let (a_tx, b_rx) = mpsc::channel(capacity);
        let (b_tx, a_rx) = mpsc::channel(capacity);
        (
            Link {
                remote: b,
                tx: a_tx,
                rx: a_rx,
            },
            Link {
                remote: a,
                tx: b_tx,
                rx: b_rx,
            },
        )
    }

    /// Wrap channels pumped by an external transport.
    pub fn from_channels(remote: PeerId, tx: mpsc::Sender<Bytes>, rx: mpsc::Receiver<Bytes>) -> Self {
        Self { remote, tx, rx }
    }

    pub fn remote(&self) -> &PeerId {
        &self.remote
    }

    pub fn split(self) -> (LinkSender, LinkReceiver) {
        (
            LinkSender {
                remote: self.remote.clone(),
                tx: self.tx,
            },
            LinkReceiver {
                remote: self.remote,
                rx: self.rx,
            },
        )
    }
}

/// Sending half of a [`Link`].
#[derive(Debug)]
pub struct LinkSender {
    remote: PeerId,
    tx: mpsc::Sender<Bytes>,
}

impl LinkSender {
    /// Send one frame, waiting while the channel's buffer is full.
    pub async fn send(&self, frame: Bytes) -> Result<()> {
        self.tx
            .send(frame)
            .await
            .map_err(|_| MeshError::SessionClosed(self.remote.to_string()))
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// Receiving half of a [`Link`].
#[derive(Debug)]
pub struct LinkReceiver {
    remote: PeerId,
    rx: mpsc::Receiver<Bytes>,
}

impl LinkReceiver {
    /// Next frame, or `None` once the remote closed its side.
    pub async fn recv(&mut self) -> Option<Bytes> {
        self.rx.recv().await
    }

    pub fn remote(&self) -> &PeerId {
        &self.remote
    }
}
