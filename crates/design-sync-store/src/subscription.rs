//! Live subscriptions to a project's durable copy.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use design_sync_core::{DesignDocument, ProjectId};
use tokio::sync::mpsc;

/// A feed of durable-copy changes for one project.
///
/// Returned by `init_sync`; hand it back to `stop_sync` to unsubscribe.
/// Dropping it also stops delivery.
#[derive(Debug)]
pub struct Subscription {
    id: u64,
    project: ProjectId,
    updates: mpsc::UnboundedReceiver<DesignDocument>,
}

impl Subscription {
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn project(&self) -> &ProjectId {
        &self.project
    }

    /// Wait for the next durable-copy change. `None` once the store has
    /// stopped the subscription.
    pub async fn next(&mut self) -> Option<DesignDocument> {
        self.updates.recv().await
    }

    /// Non-blocking poll, mainly for tests.
    pub fn try_next(&mut self) -> Option<DesignDocument> {
        self.updates.try_recv().ok()
    }
}

/// Subscriber registry shared by store backends.
#[derive(Debug, Default)]
pub struct Subscribers {
    next_id: AtomicU64,
    senders: Mutex<HashMap<ProjectId, Vec<(u64, mpsc::UnboundedSender<DesignDocument>)>>>,
}

impl Subscribers {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new subscriber, optionally priming it with the current copy.
    pub fn subscribe(&self, project: &ProjectId, current: Option<DesignDocument>) -> Subscription {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = mpsc::unbounded_channel();
        if let Some(doc) = current {
            let _ = tx.send(doc);
        }
        if let Ok(mut senders) = self.senders.lock() {
            senders.entry(project.clone()).or_default().push((id, tx));
        }
        Subscription {
            id,
            project: project.clone(),
            updates: rx,
        }
    }

    /// Deliver `doc` to every live subscriber of `project`, pruning closed ones.
    pub fn notify(&self, project: &ProjectId, doc: &DesignDocument) {
        let Ok(mut senders) = self.senders.lock() else {
            return;
        };
        if let Some(list) = senders.get_mut(project) {
            list.retain(|(_, tx)| tx.send(doc.clone()).is_ok());
            if list.is_empty() {
                senders.remove(project);
            }
        }
    }

    /// Remove one subscriber.
    pub fn remove(&self, subscription: &Subscription) {
        let Ok(mut senders) = self.senders.lock() else {
            return;
        };
        if let Some(list) = senders.get_mut(&subscription.project) {
            list.retain(|(id, _)| *id != subscription.id);
            if list.is_empty() {
                senders.remove(&subscription.project);
            }
        }
    }

    /// Drop every subscriber of `project`; their feeds end.
    pub fn close_project(&self, project: &ProjectId) {
        if let Ok(mut senders) = self.senders.lock() {
            senders.remove(project);
        }
    }

    /// Live subscriber count for `project`.
    pub fn count(&self, project: &ProjectId) -> usize {
        self.senders
            .lock()
            .map(|s| s.get(project).map_or(0, Vec::len))
            .unwrap_or(0)
    }
}
