//! Host election through the rendezvous service.
//!
//! Whoever registers a project's [`RendezvousKey`] first is the Host; every
//! later process is a Guest under a random id and dials the Host. There is
//! no consensus round: if two processes race for the key, the rendezvous
//! service decides and the loser becomes a Guest.

use std::fmt;
use std::sync::Arc;

use design_sync_core::{PeerId, ProjectId, RendezvousKey};
use tracing::{debug, info, warn};

use crate::config::MeshConfig;
use crate::error::{MeshError, Result};
use crate::network::{Endpoint, Link, PeerNetwork};

/// Where this process sits in the star topology.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PeerRole {
    #[default]
    Unresolved,
    Host,
    Guest,
}

impl fmt::Display for PeerRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            PeerRole::Unresolved => "unresolved",
            PeerRole::Host => "host",
            PeerRole::Guest => "guest",
        })
    }
}

/// Outcome of a successful election.
pub struct Resolution {
    pub role: PeerRole,
    /// The registration this process now holds.
    pub endpoint: Box<dyn Endpoint>,
    /// For a Guest, the open link to the Host.
    pub host_link: Option<Link>,
}

impl fmt::Debug for Resolution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Resolution")
            .field("role", &self.role)
            .field("endpoint", self.endpoint.local_id())
            .field("host_link", &self.host_link.as_ref().map(Link::remote))
            .finish()
    }
}

/// Host/Guest state machine for one project.
pub struct RendezvousIdentity {
    project: ProjectId,
    key: RendezvousKey,
    network: Arc<dyn PeerNetwork>,
    config: MeshConfig,
    role: PeerRole,
}

impl RendezvousIdentity {
    pub fn new(project: ProjectId, network: Arc<dyn PeerNetwork>, config: MeshConfig) -> Self {
        let key = RendezvousKey::derive(&project);
        Self {
            project,
            key,
            network,
            config,
            role: PeerRole::Unresolved,
        }
    }

    pub fn role(&self) -> PeerRole {
        self.role
    }

    pub fn project(&self) -> &ProjectId {
        &self.project
    }

    /// The id the Host of this project registers under.
    pub fn host_id(&self) -> &PeerId {
        self.key.peer_id()
    }

    /// Run the election from scratch.
    ///
    /// Each round first tries to claim the rendezvous key. If it is owned,
    /// this process registers a random id and dials the owner. An unreachable
    /// owner means it is on its way out, so the round backs off and claims
    /// again. Gives up with [`MeshError::ElectionFailed`] after
    /// `max_election_rounds`.
    pub async fn resolve(&mut self) -> Result<Resolution> {
        self.role = PeerRole::Unresolved;
        let rounds = self.config.max_election_rounds.max(1);

        for round in 1..=rounds {
            match self.attempt().await {
                Ok(resolution) => {
                    self.role = resolution.role;
                    info!(
                        project = %self.project,
                        role = %resolution.role,
                        peer = %resolution.endpoint.local_id(),
                        round,
                        "identity resolved"
                    );
                    return Ok(resolution);
                }
                Err(
                    e @ (MeshError::PeerUnavailable(_)
                    | MeshError::DialTimeout(_)
                    | MeshError::IdTaken(_)),
                ) => {
                    debug!(project = %self.project, round, error = %e, "election round failed");
                    tokio::time::sleep(self.config.election_backoff).await;
                }
                Err(e) => return Err(e),
            }
        }

        warn!(project = %self.project, rounds, "host election gave up");
        Err(MeshError::ElectionFailed { rounds })
    }

    async fn attempt(&self) -> Result<Resolution> {
        let host_id = self.key.peer_id();
        match self.network.register(host_id).await {
            Ok(endpoint) => {
                return Ok(Resolution {
                    role: PeerRole::Host,
                    endpoint,
                    host_link: None,
                })
            }
            Err(MeshError::IdTaken(_)) => {}
            Err(e) => return Err(e),
        }

        let endpoint = self.network.register(&PeerId::random()).await?;
        let dialed = tokio::time::timeout(self.config.dial_timeout, endpoint.connect(host_id)).await;
        match dialed {
            Ok(Ok(link)) => Ok(Resolution {
                role: PeerRole::Guest,
                endpoint,
                host_link: Some(link),
            }),
            Ok(Err(e)) => {
                endpoint.close().await;
                Err(e)
            }
            Err(_) => {
                endpoint.close().await;
                Err(MeshError::DialTimeout(host_id.to_string()))
            }
        }
    }

    /// Re-register under the current id after the rendezvous connection
    /// dropped, keeping the current role.
    ///
    /// On collision the role falls back to `Unresolved` and the caller
    /// should run [`resolve`](Self::resolve) again.
    pub async fn reregister(&mut self, endpoint: &dyn Endpoint) -> Result<()> {
        match endpoint.reconnect().await {
            Ok(()) => {
                info!(project = %self.project, role = %self.role, "re-registered after signalling loss");
                Ok(())
            }
            Err(e) => {
                warn!(project = %self.project, error = %e, "re-registration failed");
                self.role = PeerRole::Unresolved;
                Err(e)
            }
        }
    }

    /// Forget the current role, e.g. after the Host session closed.
    pub fn reset(&mut self) {
        self.role = PeerRole::Unresolved;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryNetwork;
    use std::time::Duration;

    fn project() -> ProjectId {
        ProjectId::parse("p-abc123").unwrap()
    }

    fn config() -> MeshConfig {
        MeshConfig {
            election_backoff: Duration::from_millis(5),
            dial_timeout: Duration::from_millis(100),
            ..MeshConfig::default()
        }
    }

    #[tokio::test]
    async fn test_first_claimer_is_host() {
        let network = MemoryNetwork::new();
        let mut identity = RendezvousIdentity::new(project(), Arc::new(network.clone()), config());
        assert_eq!(identity.role(), PeerRole::Unresolved);

        let resolution = identity.resolve().await.unwrap();
        assert_eq!(resolution.role, PeerRole::Host);
        assert_eq!(identity.role(), PeerRole::Host);
        assert!(resolution.host_link.is_none());
        assert_eq!(resolution.endpoint.local_id(), identity.host_id());
        assert!(network.is_registered(identity.host_id()));
    }

    #[tokio::test]
    async fn test_second_claimer_is_guest() {
        let network = Arc::new(MemoryNetwork::new());
        let mut a = RendezvousIdentity::new(project(), network.clone(), config());
        let mut b = RendezvousIdentity::new(project(), network.clone(), config());

        let host = a.resolve().await.unwrap();
        let guest = b.resolve().await.unwrap();
        assert_eq!(guest.role, PeerRole::Guest);
        assert_ne!(guest.endpoint.local_id(), b.host_id());

        let link = guest.host_link.unwrap();
        assert_eq!(link.remote(), a.host_id());

        let inbound = host.endpoint.accept().await.unwrap();
        assert_eq!(inbound.remote(), guest.endpoint.local_id());
    }

    #[tokio::test]
    async fn test_guest_promotes_after_host_leaves() {
        let network = Arc::new(MemoryNetwork::new());
        let mut a = RendezvousIdentity::new(project(), network.clone(), config());
        let mut b = RendezvousIdentity::new(project(), network.clone(), config());

        let host = a.resolve().await.unwrap();
        let guest = b.resolve().await.unwrap();
        assert_eq!(guest.role, PeerRole::Guest);

        host.endpoint.close().await;
        drop(host);
        drop(guest);

        let promoted = b.resolve().await.unwrap();
        assert_eq!(promoted.role, PeerRole::Host);
    }

    #[tokio::test]
    async fn test_different_projects_do_not_collide() {
        let network = Arc::new(MemoryNetwork::new());
        let mut a = RendezvousIdentity::new(project(), network.clone(), config());
        let mut b = RendezvousIdentity::new(
            ProjectId::parse("p-zzz999").unwrap(),
            network.clone(),
            config(),
        );
        assert_eq!(a.resolve().await.unwrap().role, PeerRole::Host);
        assert_eq!(b.resolve().await.unwrap().role, PeerRole::Host);
    }

    #[tokio::test]
    async fn test_reregister_keeps_role() {
        let network = MemoryNetwork::new();
        let mut identity = RendezvousIdentity::new(project(), Arc::new(network.clone()), config());
        let resolution = identity.resolve().await.unwrap();

        network.interrupt_signalling(identity.host_id());
        resolution.endpoint.signalling_lost().await;
        identity.reregister(resolution.endpoint.as_ref()).await.unwrap();
        assert_eq!(identity.role(), PeerRole::Host);
        assert!(network.is_registered(identity.host_id()));
    }

    #[tokio::test]
    async fn test_reregister_collision_unresolves() {
        let network = Arc::new(MemoryNetwork::new());
        let mut a = RendezvousIdentity::new(project(), network.clone(), config());
        let mut b = RendezvousIdentity::new(project(), network.clone(), config());

        let old = a.resolve().await.unwrap();
        network.interrupt_signalling(a.host_id());
        let usurper = b.resolve().await.unwrap();
        assert_eq!(usurper.role, PeerRole::Host);

        assert!(matches!(
            a.reregister(old.endpoint.as_ref()).await,
            Err(MeshError::IdTaken(_))
        ));
        assert_eq!(a.role(), PeerRole::Unresolved);

        let again = a.resolve().await.unwrap();
        assert_eq!(again.role, PeerRole::Guest);
    }

    /// A peer network whose host never answers dials.
    struct Unreachable(MemoryNetwork);

    #[async_trait::async_trait]
    impl PeerNetwork for Unreachable {
        async fn register(&self, id: &PeerId) -> Result<Box<dyn Endpoint>> {
            if id.as_str().starts_with("design-") {
                return Err(MeshError::IdTaken(id.to_string()));
            }
            self.0.register(id).await
        }
    }

    #[tokio::test]
    async fn test_election_gives_up() {
        let network = Arc::new(Unreachable(MemoryNetwork::new()));
        let mut identity = RendezvousIdentity::new(
            project(),
            network,
            MeshConfig {
                max_election_rounds: 2,
                ..config()
            },
        );
        assert!(matches!(
            identity.resolve().await,
            Err(MeshError::ElectionFailed { rounds: 2 })
        ));
        assert_eq!(identity.role(), PeerRole::Unresolved);
    }
}
