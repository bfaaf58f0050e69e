//! A simple in-memory peer network for testing.
//!
//! Uses channels to simulate the rendezvous service and peer links between
//! processes sharing one runtime. Faults can be injected with
//! [`MemoryNetwork::interrupt_signalling`].

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use design_sync_core::PeerId;
use tokio::sync::{mpsc, Mutex, Notify};

use crate::error::{MeshError, Result};
use crate::network::{Endpoint, Link, PeerNetwork, DEFAULT_LINK_CAPACITY};

/// Pending inbound links buffered per endpoint. A dial to an endpoint with
/// a full backlog waits until one is accepted.
pub const ACCEPT_BACKLOG: usize = 16;

struct Registration {
    token: u64,
    acceptor: mpsc::Sender<Link>,
    signal: Arc<Notify>,
}

struct Shared {
    registry: RwLock<HashMap<PeerId, Registration>>,
    next_token: AtomicU64,
    link_capacity: usize,
}

/// Shared state for the in-memory peer network. Cheap to clone.
#[derive(Clone)]
pub struct MemoryNetwork {
    shared: Arc<Shared>,
}

impl MemoryNetwork {
    /// A network with no peers registered.
    pub fn new() -> Self {
        Self::with_link_capacity(DEFAULT_LINK_CAPACITY)
    }

    /// Create a network whose links buffer `capacity` frames per direction.
    pub fn with_link_capacity(capacity: usize) -> Self {
        Self {
            shared: Arc::new(Shared {
                registry: RwLock::new(HashMap::new()),
                next_token: AtomicU64::new(1),
                link_capacity: capacity.max(1),
            }),
        }
    }

    /// Whether some endpoint currently holds `id`.
    pub fn is_registered(&self, id: &PeerId) -> bool {
        self.shared
            .registry
            .read()
            .map(|r| r.get(id).is_some_and(|reg| !reg.acceptor.is_closed()))
            .unwrap_or(false)
    }

    /// Simulate the rendezvous connection of `id` dropping: the id is freed
    /// and the endpoint's `signalling_lost` fires. Established links stay up.
    pub fn interrupt_signalling(&self, id: &PeerId) -> bool {
        let removed = self
            .shared
            .registry
            .write()
            .ok()
            .and_then(|mut r| r.remove(id));
        match removed {
            Some(reg) => {
                reg.signal.notify_one();
                true
            }
            None => false,
        }
    }

    fn unregister(&self, id: &PeerId, token: u64) {
        if let Ok(mut registry) = self.shared.registry.write() {
            if registry.get(id).is_some_and(|reg| reg.token == token) {
                registry.remove(id);
            }
        }
    }
}

impl Default for MemoryNetwork {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PeerNetwork for MemoryNetwork {
    async fn register(&self, id: &PeerId) -> Result<Box<dyn Endpoint>> {
        let mut registry = self
            .shared
            .registry
            .write()
            .map_err(|_| MeshError::TransportError("registry poisoned".into()))?;

        if registry
            .get(id)
            .is_some_and(|reg| !reg.acceptor.is_closed())
        {
            return Err(MeshError::IdTaken(id.to_string()));
        }

        let token = self.shared.next_token.fetch_add(1, Ordering::Relaxed);
        let (acceptor, incoming) = mpsc::channel(ACCEPT_BACKLOG);
        let signal = Arc::new(Notify::new());
        registry.insert(
            id.clone(),
            Registration {
                token,
                acceptor: acceptor.clone(),
                signal: signal.clone(),
            },
        );

        Ok(Box::new(MemoryEndpoint {
            id: id.clone(),
            token,
            network: self.clone(),
            acceptor,
            incoming: Mutex::new(incoming),
            signal,
            closed: AtomicBool::new(false),
        }))
    }
}

/// In-memory endpoint implementation.
pub struct MemoryEndpoint {
    id: PeerId,
    token: u64,
    network: MemoryNetwork,
    acceptor: mpsc::Sender<Link>,
    incoming: Mutex<mpsc::Receiver<Link>>,
    signal: Arc<Notify>,
    closed: AtomicBool,
}

#[async_trait]
impl Endpoint for MemoryEndpoint {
    fn local_id(&self) -> &PeerId {
        &self.id
    }

    async fn accept(&self) -> Option<Link> {
        let mut incoming = self.incoming.lock().await;
        incoming.recv().await
    }

    async fn connect(&self, remote: &PeerId) -> Result<Link> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(MeshError::EndpointClosed);
        }

        let acceptor = self
            .network
            .shared
            .registry
            .read()
            .map_err(|_| MeshError::TransportError("registry poisoned".into()))?
            .get(remote)
            .map(|reg| reg.acceptor.clone())
            .ok_or_else(|| MeshError::PeerUnavailable(remote.to_string()))?;

        let (ours, theirs) =
            Link::pair(self.id.clone(), remote.clone(), self.network.shared.link_capacity);
        acceptor
            .send(theirs)
            .await
            .map_err(|_| MeshError::PeerUnavailable(remote.to_string()))?;
        Ok(ours)
    }

    async fn signalling_lost(&self) {
        self.signal.notified().await;
    }

    async fn reconnect(&self) -> Result<()> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(MeshError::EndpointClosed);
        }

        let mut registry = self
            .network
            .shared
            .registry
            .write()
            .map_err(|_| MeshError::TransportError("registry poisoned".into()))?;

        match registry.get(&self.id) {
            Some(reg) if reg.token == self.token => Ok(()),
            Some(reg) if !reg.acceptor.is_closed() => Err(MeshError::IdTaken(self.id.to_string())),
            _ => {
                registry.insert(
                    self.id.clone(),
                    Registration {
                        token: self.token,
                        acceptor: self.acceptor.clone(),
                        signal: self.signal.clone(),
                    },
                );
                Ok(())
            }
        }
    }

    async fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
        self.network.unregister(&self.id, self.token);
        self.incoming.lock().await.close();
    }
}

impl Drop for MemoryEndpoint {
    fn drop(&mut self) {
        self.network.unregister(&self.id, self.token);
    }
}
