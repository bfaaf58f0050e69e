//! Reconciliation between local edits, remote snapshots and the durable copy.
//!
//! The loop performs no I/O. The session driver feeds it inputs with the
//! current time and acts on what it returns: replying to a peer, applying a
//! document to local state, or broadcasting a debounced edit.
//!
//! ## Echo suppression
//!
//! Applying a remote document makes the editor emit change notifications of
//! its own. While [`ReconciliationGuard::receiving_remote`] is set, and for a
//! grace window afterwards, local changes are dropped so a remote update is
//! never re-broadcast as if it were a local edit.

use design_sync_core::{DesignDocument, SyncEnvelope, UserId};
use tokio::time::Instant;
use tracing::{debug, info};

use crate::config::{EditMode, ReconcileConfig};
use crate::timer::CoalescingTimer;

/// Flags gating the outbound path.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReconciliationGuard {
    /// A remote document was just applied; local changes are its echo.
    pub receiving_remote: bool,
    /// Local state holds an authoritative snapshot.
    pub has_loaded_initial: bool,
}

/// What the driver should do with an inbound document or request.
#[derive(Debug, Clone, PartialEq)]
pub enum RemoteOutcome {
    Ignore,
    /// Reply to the requester.
    Respond(SyncEnvelope),
    /// Replace local state with this document.
    Apply(DesignDocument),
    /// The document is private to someone else. Reported once per document.
    AccessDenied { owner: Option<UserId> },
}

/// Guard logic for one open document.
#[derive(Debug)]
pub struct ReconciliationLoop {
    local_user: Option<UserId>,
    mode: EditMode,
    guard: ReconciliationGuard,
    latest: Option<DesignDocument>,
    pending: Option<DesignDocument>,
    debounce: CoalescingTimer,
    grace: CoalescingTimer,
    last_denied: Option<(Option<UserId>, i64)>,
}

impl ReconciliationLoop {
    pub fn new(local_user: Option<UserId>, mode: EditMode, config: &ReconcileConfig) -> Self {
        Self {
            local_user,
            mode,
            guard: ReconciliationGuard::default(),
            latest: None,
            pending: None,
            debounce: CoalescingTimer::new(config.debounce),
            grace: CoalescingTimer::new(config.grace),
            last_denied: None,
        }
    }

    pub fn guard(&self) -> ReconciliationGuard {
        self.guard
    }

    pub fn mode(&self) -> EditMode {
        self.mode
    }

    /// The last document applied or published.
    pub fn latest(&self) -> Option<&DesignDocument> {
        self.latest.as_ref()
    }

    /// Whether a local edit is waiting for the debounce window.
    pub fn has_pending(&self) -> bool {
        self.pending.is_some()
    }

    /// Treat local state as authoritative without a snapshot.
    ///
    /// Used by a Host that found no durable copy: there is nobody to load
    /// from, so its first local edit becomes the document.
    pub fn assume_authoritative(&mut self) {
        self.guard.has_loaded_initial = true;
    }

    /// Handle an envelope from a peer or the side-channel.
    pub fn on_remote_envelope(&mut self, envelope: &SyncEnvelope, now: Instant) -> RemoteOutcome {
        match envelope {
            SyncEnvelope::RequestState => match &self.latest {
                Some(document) if self.guard.has_loaded_initial => {
                    RemoteOutcome::Respond(SyncEnvelope::FullState {
                        document: document.clone(),
                    })
                }
                _ => {
                    debug!("no snapshot loaded, ignoring state request");
                    RemoteOutcome::Ignore
                }
            },
            SyncEnvelope::FullState { document } | SyncEnvelope::StateUpdate { document } => {
                if let Some(denied) = self.check_access(document) {
                    return denied;
                }
                self.apply(document.clone(), now)
            }
        }
    }

    /// Handle a document delivered by the durable store.
    ///
    /// The first one seeds local state. Later ones apply only when strictly
    /// newer, which drops the echo of this process's own writes.
    pub fn on_store_document(&mut self, document: DesignDocument, now: Instant) -> RemoteOutcome {
        if let Some(denied) = self.check_access(&document) {
            return denied;
        }
        if self.guard.has_loaded_initial {
            if let Some(latest) = &self.latest {
                if !document.is_newer_than(latest) {
                    return RemoteOutcome::Ignore;
                }
            }
        }
        self.apply(document, now)
    }

    /// Record a local edit. Returns false if it is dropped.
    pub fn on_local_change(&mut self, document: DesignDocument, now: Instant) -> bool {
        if self.guard.receiving_remote || !self.guard.has_loaded_initial || self.mode == EditMode::View
        {
            debug!(guard = ?self.guard, mode = ?self.mode, "local change not published");
            return false;
        }
        self.pending = Some(document);
        self.debounce.arm(now);
        true
    }

    /// Take the debounced edit once the window has passed.
    ///
    /// The returned document is stamped with `wall_ms`, bumped if needed so
    /// stamps strictly increase, and becomes the latest snapshot.
    pub fn on_debounce_fired(&mut self, now: Instant, wall_ms: i64) -> Option<DesignDocument> {
        if !self.debounce.fire_if_due(now) {
            return None;
        }
        let mut document = self.pending.take()?;
        let floor = self.latest.as_ref().map_or(i64::MIN, |d| d.last_modified + 1);
        document.last_modified = wall_ms.max(floor);
        self.latest = Some(document.clone());
        Some(document)
    }

    /// Clear `receiving_remote` once the grace window has passed.
    pub fn on_grace_elapsed(&mut self, now: Instant) -> bool {
        if !self.grace.fire_if_due(now) {
            return false;
        }
        self.guard.receiving_remote = false;
        true
    }

    pub async fn debounce_expired(&self) {
        self.debounce.expired().await
    }

    pub async fn grace_expired(&self) {
        self.grace.expired().await
    }

    fn check_access(&mut self, document: &DesignDocument) -> Option<RemoteOutcome> {
        if document.grants_access_to(self.local_user.as_ref()) {
            return None;
        }
        let key = (document.owner_id.clone(), document.last_modified);
        if self.last_denied.as_ref() == Some(&key) {
            return Some(RemoteOutcome::Ignore);
        }
        info!(owner = ?document.owner_id, "access denied to private design");
        self.last_denied = Some(key);
        Some(RemoteOutcome::AccessDenied {
            owner: document.owner_id.clone(),
        })
    }

    fn apply(&mut self, document: DesignDocument, now: Instant) -> RemoteOutcome {
        if self.latest.as_ref() == Some(&document) {
            self.guard.has_loaded_initial = true;
            return RemoteOutcome::Ignore;
        }
        if self.pending.take().is_some() {
            debug!("remote document supersedes pending local edit");
        }
        self.debounce.cancel();
        self.guard.receiving_remote = true;
        self.guard.has_loaded_initial = true;
        self.grace.arm(now);
        self.latest = Some(document.clone());
        RemoteOutcome::Apply(document)
    }
}
