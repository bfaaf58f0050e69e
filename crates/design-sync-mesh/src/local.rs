//! Same-process side-channel between instances of one project.
//!
//! Several sessions for the same project can share one runtime (tabs of one
//! app, or tests). Every broadcast is also posted here so those instances see
//! each other's updates without a network round trip.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use design_sync_core::{ProjectId, SyncEnvelope};
use tokio::sync::broadcast;
use tracing::warn;

/// Posts buffered per project before slow listeners lag.
pub const DEFAULT_LOCAL_CAPACITY: usize = 64;

/// One side-channel message, tagged with the posting instance.
#[derive(Debug, Clone)]
pub struct LocalPost {
    pub origin: u64,
    pub envelope: Arc<SyncEnvelope>,
}

struct BusInner {
    channels: Mutex<HashMap<ProjectId, broadcast::Sender<LocalPost>>>,
    capacity: usize,
    next_origin: AtomicU64,
}

/// Registry of per-project side-channels. Cheap to clone.
#[derive(Clone)]
pub struct LocalBus {
    inner: Arc<BusInner>,
}

impl LocalBus {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_LOCAL_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            inner: Arc::new(BusInner {
                channels: Mutex::new(HashMap::new()),
                capacity: capacity.max(1),
                next_origin: AtomicU64::new(1),
            }),
        }
    }

    /// Join the side-channel for `project` as a new instance.
    pub fn open(&self, project: &ProjectId) -> LocalChannel {
        let origin = self.inner.next_origin.fetch_add(1, Ordering::Relaxed);
        let mut channels = self
            .inner
            .channels
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        channels.retain(|_, tx| tx.receiver_count() > 0);

        let tx = channels
            .entry(project.clone())
            .or_insert_with(|| broadcast::channel(self.inner.capacity).0)
            .clone();
        let rx = tx.subscribe();
        LocalChannel {
            project: project.clone(),
            origin,
            tx,
            rx,
        }
    }

    /// Projects with at least one open channel.
    pub fn project_count(&self) -> usize {
        self.inner
            .channels
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .filter(|tx| tx.receiver_count() > 0)
            .count()
    }
}

impl Default for LocalBus {
    fn default() -> Self {
        Self::new()
    }
}

/// One instance's handle on a project's side-channel.
#[derive(Debug)]
pub struct LocalChannel {
    project: ProjectId,
    origin: u64,
    tx: broadcast::Sender<LocalPost>,
    rx: broadcast::Receiver<LocalPost>,
}

impl LocalChannel {
    pub fn origin(&self) -> u64 {
        self.origin
    }

    pub fn project(&self) -> &ProjectId {
        &self.project
    }

    /// Post to every other instance. Returns how many listeners there were,
    /// this instance included.
    pub fn post(&self, envelope: &SyncEnvelope) -> usize {
        let post = LocalPost {
            origin: self.origin,
            envelope: Arc::new(envelope.clone()),
        };
        self.tx.send(post).unwrap_or(0)
    }

    /// Next envelope posted by another instance.
    ///
    /// Own posts are skipped. Lag drops the overwritten posts with a warning.
    pub async fn recv(&mut self) -> Option<SyncEnvelope> {
        loop {
            match self.rx.recv().await {
                Ok(post) if post.origin == self.origin => continue,
                Ok(post) => return Some(post.envelope.as_ref().clone()),
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(project = %self.project, skipped, "side-channel lagged");
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }
}
