//! Session configuration.

use std::time::Duration;

use design_sync_core::UserId;
use design_sync_mesh::MeshConfig;

/// Whether local edits are published.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EditMode {
    #[default]
    Edit,
    /// Apply remote updates, never publish local ones.
    View,
}

/// Timing of the reconciliation loop.
#[derive(Debug, Clone)]
pub struct ReconcileConfig {
    /// Quiet period before a burst of local edits is published.
    pub debounce: Duration,
    /// How long local changes are ignored after a remote document is applied.
    pub grace: Duration,
}

impl Default for ReconcileConfig {
    fn default() -> Self {
        Self {
            debounce: Duration::from_millis(300),
            grace: Duration::from_millis(150),
        }
    }
}

/// Configuration for one design session.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// The signed-in user, if any. Anonymous sessions only see public designs.
    pub local_user: Option<UserId>,
    pub mode: EditMode,
    pub mesh: MeshConfig,
    pub reconcile: ReconcileConfig,
    /// Buffered [`SessionEvent`](crate::SessionEvent)s per subscriber.
    pub event_capacity: usize,
    /// Wait before retrying a host election that gave up.
    pub reelect_interval: Duration,
}

impl SessionConfig {
    /// Defaults for a signed-in editor.
    pub fn for_user(user: UserId) -> Self {
        Self {
            local_user: Some(user),
            ..Self::default()
        }
    }

    pub fn with_mode(mut self, mode: EditMode) -> Self {
        self.mode = mode;
        self
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            local_user: None,
            mode: EditMode::Edit,
            mesh: MeshConfig::default(),
            reconcile: ReconcileConfig::default(),
            event_capacity: 64,
            reelect_interval: Duration::from_secs(1),
        }
    }
}
