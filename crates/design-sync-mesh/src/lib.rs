//! # Design Sync Mesh
//!
//! Peer plumbing for Design Sync: chunked peer sessions, host election
//! through a rendezvous service, and a Host-relayed star of sessions.
//!
//! ## Overview
//!
//! Every process editing a project derives the same rendezvous key from the
//! project id. The first to register it becomes the Host; later processes
//! join as Guests and dial it. Guests send their edits to the Host, which
//! relays them to the other Guests.
//!
//! ```text
//!     Guest B ----\             /---- Guest C
//!                  \           /
//!                   +- Host A -+
//! ```
//!
//! ## Key Properties
//!
//! - **Fragmented**: every envelope is split into `chunk-part` frames no
//!   larger than the transport's frame ceiling
//! - **Lossy-tolerant**: an interrupted transfer is discarded; the next full
//!   snapshot repairs it
//! - **Non-blocking**: sends only enqueue; per-session writer tasks pace
//!   fragments onto the link
//!
//! ## Usage
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use design_sync_core::ProjectId;
//! use design_sync_mesh::{MemoryNetwork, Mesh, MeshConfig, RendezvousIdentity};
//!
//! async fn example() {
//!     let network = Arc::new(MemoryNetwork::new());
//!     let project = ProjectId::parse("p-abc123").unwrap();
//!
//!     let mut identity = RendezvousIdentity::new(project, network, MeshConfig::default());
//!     let resolution = identity.resolve().await.unwrap();
//!
//!     let (mut mesh, mut events) = Mesh::new(MeshConfig::default(), None);
//!     mesh.set_role(resolution.role);
//!     if let Some(link) = resolution.host_link {
//!         mesh.accept(link);
//!     }
//! }
//! ```

pub mod config;
pub mod error;
pub mod identity;
pub mod local;
pub mod memory;
pub mod mesh;
pub mod network;
pub mod session;

pub use config::{ChunkConfig, MeshConfig};
pub use error::{MeshError, Result};
pub use identity::{PeerRole, RendezvousIdentity, Resolution};
pub use local::{LocalBus, LocalChannel, LocalPost, DEFAULT_LOCAL_CAPACITY};
pub use memory::{MemoryEndpoint, MemoryNetwork};
pub use mesh::Mesh;
pub use network::{
    Endpoint, Link, LinkReceiver, LinkSender, PeerNetwork, DEFAULT_LINK_CAPACITY,
};
pub use session::{EncodedEnvelope, MeshEvent, PeerSession, SessionId};
