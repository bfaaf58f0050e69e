//! The set of live peer sessions for one project.
//!
//! In a star topology the Host holds one session per Guest and each Guest
//! holds a single session to the Host. Guests never talk to each other
//! directly: the Host relays their updates.

use std::collections::HashMap;

use design_sync_core::{PeerId, SyncEnvelope};
use tokio::sync::mpsc;
use tracing::{debug, info};

use crate::config::MeshConfig;
use crate::error::{MeshError, Result};
use crate::identity::PeerRole;
use crate::local::LocalChannel;
use crate::network::{Endpoint, Link};
use crate::session::{EncodedEnvelope, MeshEvent, PeerSession, SessionId};

/// Owns every [`PeerSession`] of one project plus its side-channel.
pub struct Mesh {
    config: MeshConfig,
    role: PeerRole,
    sessions: HashMap<PeerId, PeerSession>,
    events: mpsc::UnboundedSender<MeshEvent>,
    side: Option<LocalChannel>,
}

impl Mesh {
    /// Create an empty mesh. Session events arrive on the returned receiver.
    pub fn new(
        config: MeshConfig,
        side: Option<LocalChannel>,
    ) -> (Self, mpsc::UnboundedReceiver<MeshEvent>) {
        let (events, rx) = mpsc::unbounded_channel();
        let mesh = Self {
            config,
            role: PeerRole::Unresolved,
            sessions: HashMap::new(),
            events,
            side,
        };
        (mesh, rx)
    }

    pub fn role(&self) -> PeerRole {
        self.role
    }

    pub fn set_role(&mut self, role: PeerRole) {
        self.role = role;
    }

    /// Dial `peer` from `endpoint` and register the session.
    pub async fn connect(&mut self, endpoint: &dyn Endpoint, peer: &PeerId) -> Result<SessionId> {
        let link = tokio::time::timeout(self.config.dial_timeout, endpoint.connect(peer))
            .await
            .map_err(|_| MeshError::DialTimeout(peer.to_string()))??;
        Ok(self.accept(link))
    }

    /// Register a session over an already-open link.
    ///
    /// A newer link from the same peer replaces the older session.
    pub fn accept(&mut self, link: Link) -> SessionId {
        let peer = link.remote().clone();
        let session = PeerSession::spawn(link, self.config.chunk.clone(), self.events.clone());
        let id = session.id();
        if let Some(old) = self.sessions.insert(peer.clone(), session) {
            debug!(peer = %peer, old = old.id(), new = id, "session replaced");
        }
        info!(peer = %peer, session = id, peers = self.sessions.len(), "peer joined");
        id
    }

    /// Drop the session for `peer` if it is still `session`.
    ///
    /// Returns false for a stale close of an already-replaced session.
    pub fn remove(&mut self, session: SessionId, peer: &PeerId) -> bool {
        match self.sessions.get(peer) {
            Some(current) if current.id() == session => {
                self.sessions.remove(peer);
                info!(peer = %peer, session, peers = self.sessions.len(), "peer left");
                true
            }
            _ => false,
        }
    }

    /// Send to every open session except `exclude`, and post to the
    /// side-channel. Returns the number of sessions the envelope was queued on.
    ///
    /// A failing session is skipped; its close event removes it.
    pub fn broadcast(&self, envelope: &SyncEnvelope, exclude: Option<&PeerId>) -> Result<usize> {
        let encoded = EncodedEnvelope::encode(envelope, &self.config.chunk)?;
        let sent = self.fan_out(&encoded, exclude);
        if let Some(side) = &self.side {
            side.post(envelope);
        }
        Ok(sent)
    }

    /// Send to a single peer.
    pub fn send_to(&self, peer: &PeerId, envelope: &SyncEnvelope) -> Result<()> {
        let session = self
            .sessions
            .get(peer)
            .ok_or_else(|| MeshError::SessionClosed(peer.to_string()))?;
        let encoded = EncodedEnvelope::encode(envelope, &self.config.chunk)?;
        session.send(&encoded)
    }

    /// Forward a Guest's update to every other Guest.
    ///
    /// Only the Host relays, and only `StateUpdate`s. The side-channel is not
    /// posted: the update did not originate in this process.
    pub fn relay(&self, from: &PeerId, envelope: &SyncEnvelope) -> Result<usize> {
        if self.role != PeerRole::Host || !matches!(envelope, SyncEnvelope::StateUpdate { .. }) {
            return Ok(0);
        }
        let encoded = EncodedEnvelope::encode(envelope, &self.config.chunk)?;
        let sent = self.fan_out(&encoded, Some(from));
        debug!(from = %from, sent, "relayed update");
        Ok(sent)
    }

    fn fan_out(&self, encoded: &EncodedEnvelope, exclude: Option<&PeerId>) -> usize {
        let mut sent = 0;
        for (peer, session) in &self.sessions {
            if Some(peer) == exclude {
                continue;
            }
            match session.send(encoded) {
                Ok(()) => sent += 1,
                Err(e) => debug!(peer = %peer, error = %e, "skipping closed session"),
            }
        }
        sent
    }

    /// Next envelope from another instance on the side-channel.
    ///
    /// Pending forever when the mesh has no side-channel.
    pub async fn next_local(&mut self) -> Option<SyncEnvelope> {
        match self.side.as_mut() {
            Some(side) => side.recv().await,
            None => std::future::pending().await,
        }
    }

    pub fn peers(&self) -> Vec<PeerId> {
        let mut peers: Vec<_> = self.sessions.keys().cloned().collect();
        peers.sort();
        peers
    }

    pub fn has_peer(&self, peer: &PeerId) -> bool {
        self.sessions.contains_key(peer)
    }

    pub fn session_count(&self) -> usize {
        self.sessions.len()
    }

    /// Close every session, drop the side-channel, forget the role.
    pub fn shutdown(&mut self) {
        let closed = self.sessions.len();
        self.sessions.clear();
        self.side = None;
        self.role = PeerRole::Unresolved;
        debug!(closed, "mesh shut down");
    }

    /// Close sessions but keep the side-channel, for re-election.
    pub fn disconnect_all(&mut self) {
        self.sessions.clear();
        self.role = PeerRole::Unresolved;
    }
}
