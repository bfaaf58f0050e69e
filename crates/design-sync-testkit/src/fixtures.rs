//! Seeded documents and an in-memory network plus store for session tests.

use std::sync::Arc;
use std::time::Duration;

use design_sync_core::{AccessLevel, DesignDocument, Page, ProjectId, UserId};
use design_sync_mesh::{ChunkConfig, LocalBus, MemoryNetwork, MeshConfig, PeerNetwork};
use design_sync_store::{DesignStore, MemoryDesignStore};
use serde_json::json;

/// The external services a group of clients shares: one peer network, one
/// durable store and one side-channel bus.
#[derive(Clone)]
pub struct TestFabric {
    pub network: MemoryNetwork,
    pub store: Arc<MemoryDesignStore>,
    pub bus: LocalBus,
}

impl TestFabric {
    pub fn new() -> Self {
        Self {
            network: MemoryNetwork::new(),
            store: Arc::new(MemoryDesignStore::new()),
            bus: LocalBus::new(),
        }
    }

    pub fn peer_network(&self) -> Arc<dyn PeerNetwork> {
        Arc::new(self.network.clone())
    }

    pub fn design_store(&self) -> Arc<dyn DesignStore> {
        self.store.clone()
    }

    /// Put a design in the store under a fixed id.
    pub fn seed_project(&self, project: &ProjectId, document: DesignDocument) {
        self.store.insert(project.clone(), document);
    }

    /// Mesh settings tuned for tests: quick elections and small fragments so
    /// ordinary documents span several frames.
    pub fn mesh_config() -> MeshConfig {
        MeshConfig {
            chunk: ChunkConfig {
                max_frame: 256,
                pace_every: 8,
                pace_delay: Duration::from_millis(1),
            },
            max_election_rounds: 5,
            election_backoff: Duration::from_millis(20),
            dial_timeout: Duration::from_secs(1),
        }
    }
}

impl Default for TestFabric {
    fn default() -> Self {
        Self::new()
    }
}

/// A private two-page design with some layers and adjustments.
pub fn sample_document(owner: &UserId) -> DesignDocument {
    let mut doc = DesignDocument::new("Launch poster", owner.clone());
    doc.pages[0].layers = vec![
        json!({"id": "bg", "type": "rect", "fill": "#101820"}),
        json!({"id": "title", "type": "text", "text": "Launch ✨"}),
    ];
    let mut back = Page::new("page-2", "Back");
    back.layers = vec![json!({"id": "qr", "type": "image", "src": "qr.png"})];
    doc.pages.push(back);
    doc.adjustments.insert("brightness".into(), json!(0.1));
    doc.last_modified = 1_700_000_000_000;
    doc
}

/// [`sample_document`] readable by anyone.
pub fn public_document(owner: &UserId) -> DesignDocument {
    let mut doc = sample_document(owner);
    doc.access_level = AccessLevel::Public;
    doc
}

/// A design with `layers` text layers on one page, for chunking.
pub fn large_document(owner: &UserId, layers: usize) -> DesignDocument {
    let mut doc = DesignDocument::new("Large", owner.clone());
    doc.pages[0].layers = (0..layers)
        .map(|i| {
            json!({
                "id": format!("layer-{i}"),
                "type": "text",
                "text": "lorem ipsum dolor sit amet ü",
            })
        })
        .collect();
    doc
}

/// Distinct user ids `user-0`, `user-1`, ...
pub fn users(count: usize) -> Vec<UserId> {
    (0..count).map(|i| UserId::new(format!("user-{i}"))).collect()
}
