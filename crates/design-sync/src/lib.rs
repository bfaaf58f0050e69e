//! # Design Sync
//!
//! Real-time collaboration for a browser-style design editor. Every client
//! holding the same project id joins one session: the first becomes the
//! Host, later ones Guests, and each local edit is broadcast as a whole
//! document snapshot after a short debounce.
//!
//! ## Overview
//!
//! - **Identity**: the project id is the only shared secret. Clients derive
//!   the Host's rendezvous key from it; whoever claims the key first hosts.
//! - **Topology**: a star. Guests talk to the Host, the Host relays.
//! - **Replace, don't merge**: every accepted update overwrites local state.
//!   Reordering between peers can show a stale document briefly, never a
//!   corrupt one.
//! - **Durable copy**: published edits are also written to a
//!   [`DesignStore`](design_sync_store::DesignStore), which seeds later
//!   joiners and survives the whole mesh going away.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use design_sync::{DesignSession, SessionConfig, ShareLink};
//! use design_sync::core::UserId;
//! use design_sync::mesh::{LocalBus, MemoryNetwork};
//! use design_sync::store::MemoryDesignStore;
//!
//! async fn example() {
//!     let link = ShareLink::parse("https://app.example/editor?project=p-abc123").unwrap();
//!     let config = SessionConfig::for_user(UserId::new("alice")).with_mode(link.mode);
//!
//!     let session = DesignSession::join(
//!         config,
//!         Arc::new(MemoryNetwork::new()),
//!         Arc::new(MemoryDesignStore::new()),
//!         LocalBus::new(),
//!         link.project,
//!     )
//!     .await
//!     .unwrap();
//!
//!     if let Some(mut document) = session.document() {
//!         document.name = "Renamed".into();
//!         session.edit(document).unwrap();
//!     }
//!     session.close().await;
//! }
//! ```
//!
//! ## Re-exports
//!
//! - `design_sync::core` - Documents, envelopes, chunk codec
//! - `design_sync::store` - Durable store trait and backends
//! - `design_sync::mesh` - Peer sessions, host election, relay

pub mod config;
pub mod error;
pub mod library;
pub mod reconcile;
pub mod session;
pub mod share;
pub mod timer;

pub use design_sync_core as core;
pub use design_sync_mesh as mesh;
pub use design_sync_store as store;

pub use config::{EditMode, ReconcileConfig, SessionConfig};
pub use error::{Result, SessionError};
pub use library::DesignLibrary;
pub use reconcile::{ReconciliationGuard, ReconciliationLoop, RemoteOutcome};
pub use session::{DesignSession, SessionEvent, SessionHandle};
pub use share::ShareLink;
pub use timer::CoalescingTimer;

pub use design_sync_core::{DesignDocument, ProjectId, UserId};
pub use design_sync_mesh::PeerRole;
