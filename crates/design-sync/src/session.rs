//! The per-document session driver.
//!
//! One task per open document owns the mesh, the identity state machine,
//! the reconciliation loop, the store subscription and every timer. It
//! multiplexes them with `tokio::select!`, so none of that state is shared
//! and nothing needs a lock. The UI talks to the task through a cloneable
//! [`SessionHandle`].

use std::sync::Arc;

use design_sync_core::{
    now_millis, DesignDocument, DesignPatch, PeerId, ProjectId, SyncEnvelope, UserId,
};
use design_sync_mesh::{
    Endpoint, LocalBus, Link, Mesh, MeshError, MeshEvent, PeerNetwork, PeerRole,
    RendezvousIdentity, Resolution,
};
use design_sync_store::{DesignStore, Subscription};
use tokio::sync::{broadcast, mpsc, oneshot, watch};
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::config::SessionConfig;
use crate::error::{Result, SessionError};
use crate::library::DesignLibrary;
use crate::reconcile::{ReconciliationLoop, RemoteOutcome};
use crate::timer::CoalescingTimer;

/// Notifications for the UI.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    /// A remote or durable document replaced local state.
    DocumentApplied(DesignDocument),
    /// A received document is private to someone else and was not applied.
    AccessDenied { owner: Option<UserId> },
    RoleChanged(PeerRole),
    PeerJoined(PeerId),
    PeerLeft(PeerId),
}

enum Command {
    Edit(DesignDocument),
    Close(oneshot::Sender<()>),
}

/// Handle to a running session. Cheap to clone.
///
/// The session stops when [`close`](Self::close) is called or the last
/// handle is dropped.
#[derive(Clone)]
pub struct SessionHandle {
    project: ProjectId,
    commands: mpsc::UnboundedSender<Command>,
    events: broadcast::Sender<SessionEvent>,
    role: watch::Receiver<PeerRole>,
    document: watch::Receiver<Option<DesignDocument>>,
    denied: watch::Receiver<bool>,
}

impl SessionHandle {
    pub fn project(&self) -> &ProjectId {
        &self.project
    }

    /// Report a local edit. Only enqueues; publishing happens after the
    /// debounce window.
    pub fn edit(&self, document: DesignDocument) -> Result<()> {
        self.commands
            .send(Command::Edit(document))
            .map_err(|_| SessionError::Closed)
    }

    /// Events from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }

    pub fn role(&self) -> PeerRole {
        *self.role.borrow()
    }

    /// The current local document, if one has been loaded or edited.
    pub fn document(&self) -> Option<DesignDocument> {
        self.document.borrow().clone()
    }

    /// Whether access to this design was denied.
    pub fn is_access_denied(&self) -> bool {
        *self.denied.borrow()
    }

    /// Watch the role for changes.
    pub fn watch_role(&self) -> watch::Receiver<PeerRole> {
        self.role.clone()
    }

    /// Watch the local document for changes.
    pub fn watch_document(&self) -> watch::Receiver<Option<DesignDocument>> {
        self.document.clone()
    }

    /// Stop the session: close every peer session, release the rendezvous
    /// registration and end the store subscription.
    pub async fn close(&self) {
        let (ack, done) = oneshot::channel();
        if self.commands.send(Command::Close(ack)).is_ok() {
            let _ = done.await;
        }
    }

    pub fn is_closed(&self) -> bool {
        self.commands.is_closed()
    }
}

/// Entry points for opening a design.
pub struct DesignSession;

impl DesignSession {
    /// Join `project`: seed from the durable store, elect a role and start
    /// the driver.
    pub async fn join(
        config: SessionConfig,
        network: Arc<dyn PeerNetwork>,
        store: Arc<dyn DesignStore>,
        bus: LocalBus,
        project: ProjectId,
    ) -> Result<SessionHandle> {
        let seed = store.load_design(&project).await?;
        let subscription = store.init_sync(&project).await?;

        let mut identity = RendezvousIdentity::new(project.clone(), network, config.mesh.clone());
        let resolution = match identity.resolve().await {
            Ok(resolution) => resolution,
            Err(e) => {
                store.stop_sync(subscription).await;
                return Err(e.into());
            }
        };

        let (mesh, mesh_events) = Mesh::new(config.mesh.clone(), Some(bus.open(&project)));
        let (commands_tx, commands) = mpsc::unbounded_channel();
        let (events, _) = broadcast::channel(config.event_capacity.max(1));
        let (role_tx, role) = watch::channel(PeerRole::Unresolved);
        let (document_tx, document) = watch::channel(None);
        let (denied_tx, denied) = watch::channel(false);

        let mut driver = Driver {
            project: project.clone(),
            reconcile: ReconciliationLoop::new(
                config.local_user.clone(),
                config.mode,
                &config.reconcile,
            ),
            reelect_timer: CoalescingTimer::new(config.reelect_interval),
            writer: spawn_store_writer(store.clone(), project.clone()),
            identity,
            endpoint: None,
            host: None,
            mesh,
            mesh_events,
            store,
            subscription: Some(subscription),
            commands,
            events: events.clone(),
            role_tx,
            document_tx,
            denied_tx,
        };

        let now = Instant::now();
        if let Some(seed) = seed {
            driver.on_store_document(seed, now);
        }
        driver.adopt(resolution);
        if driver.mesh.role() == PeerRole::Host && !driver.reconcile.guard().has_loaded_initial {
            driver.reconcile.assume_authoritative();
        }

        tokio::spawn(driver.run());

        Ok(SessionHandle {
            project,
            commands: commands_tx,
            events,
            role,
            document,
            denied,
        })
    }

    /// Create a design owned by the local user and join it as its first
    /// participant.
    pub async fn create(
        config: SessionConfig,
        network: Arc<dyn PeerNetwork>,
        store: Arc<dyn DesignStore>,
        bus: LocalBus,
        document: DesignDocument,
    ) -> Result<SessionHandle> {
        let owner = config.local_user.clone().ok_or(SessionError::NoLocalUser)?;
        let project = DesignLibrary::new(store.clone())
            .create(&document, &owner)
            .await?;
        info!(project = %project, owner = %owner, "design created");
        Self::join(config, network, store, bus, project).await
    }
}

/// Durable writes go through one task so they land in publish order.
fn spawn_store_writer(
    store: Arc<dyn DesignStore>,
    project: ProjectId,
) -> mpsc::UnboundedSender<DesignPatch> {
    let (tx, mut rx) = mpsc::unbounded_channel::<DesignPatch>();
    tokio::spawn(async move {
        while let Some(patch) = rx.recv().await {
            if let Err(e) = store.update_design(&project, &patch).await {
                warn!(project = %project, error = %e, "durable store write failed");
            }
        }
    });
    tx
}

async fn accept_on(endpoint: Option<&dyn Endpoint>) -> Option<Link> {
    match endpoint {
        Some(endpoint) => endpoint.accept().await,
        None => std::future::pending().await,
    }
}

async fn signalling_lost_on(endpoint: Option<&dyn Endpoint>) {
    match endpoint {
        Some(endpoint) => endpoint.signalling_lost().await,
        None => std::future::pending().await,
    }
}

async fn next_stored(subscription: Option<&mut Subscription>) -> Option<DesignDocument> {
    match subscription {
        Some(subscription) => subscription.next().await,
        None => std::future::pending().await,
    }
}

struct Driver {
    project: ProjectId,
    identity: RendezvousIdentity,
    endpoint: Option<Box<dyn Endpoint>>,
    /// The Host's peer id while this process is a Guest.
    host: Option<PeerId>,
    mesh: Mesh,
    mesh_events: mpsc::UnboundedReceiver<MeshEvent>,
    reconcile: ReconciliationLoop,
    reelect_timer: CoalescingTimer,
    store: Arc<dyn DesignStore>,
    subscription: Option<Subscription>,
    writer: mpsc::UnboundedSender<DesignPatch>,
    commands: mpsc::UnboundedReceiver<Command>,
    events: broadcast::Sender<SessionEvent>,
    role_tx: watch::Sender<PeerRole>,
    document_tx: watch::Sender<Option<DesignDocument>>,
    denied_tx: watch::Sender<bool>,
}

impl Driver {
    async fn run(mut self) {
        loop {
            tokio::select! {
                command = self.commands.recv() => match command {
                    Some(Command::Edit(document)) => self.on_edit(document),
                    Some(Command::Close(ack)) => {
                        self.shutdown().await;
                        let _ = ack.send(());
                        return;
                    }
                    None => {
                        self.shutdown().await;
                        return;
                    }
                },
                Some(event) = self.mesh_events.recv() => self.on_mesh_event(event).await,
                local = self.mesh.next_local() => {
                    if let Some(envelope) = local {
                        self.on_local_post(envelope);
                    }
                }
                link = accept_on(self.endpoint.as_deref()) => match link {
                    Some(link) => self.on_inbound(link),
                    None => {
                        warn!(project = %self.project, "endpoint stopped accepting");
                        self.reelect().await;
                    }
                },
                _ = signalling_lost_on(self.endpoint.as_deref()) => self.on_signalling_lost().await,
                stored = next_stored(self.subscription.as_mut()) => match stored {
                    Some(document) => self.on_store_document(document, Instant::now()),
                    None => {
                        debug!(project = %self.project, "store subscription ended");
                        self.subscription = None;
                    }
                },
                _ = self.reconcile.debounce_expired() => self.on_debounce(),
                _ = self.reconcile.grace_expired() => {
                    self.reconcile.on_grace_elapsed(Instant::now());
                }
                _ = self.reelect_timer.expired() => {
                    if self.reelect_timer.fire_if_due(Instant::now()) {
                        self.reelect().await;
                    }
                }
            }
        }
    }

    fn emit(&self, event: SessionEvent) {
        let _ = self.events.send(event);
    }

    fn set_role(&mut self, role: PeerRole) {
        self.mesh.set_role(role);
        if *self.role_tx.borrow() != role {
            self.role_tx.send_replace(role);
            self.emit(SessionEvent::RoleChanged(role));
        }
    }

    fn publish_applied(&mut self, document: DesignDocument) {
        self.document_tx.send_replace(Some(document.clone()));
        self.emit(SessionEvent::DocumentApplied(document));
    }

    fn handle_outcome(&mut self, outcome: RemoteOutcome, reply_to: Option<&PeerId>) {
        match outcome {
            RemoteOutcome::Ignore => {}
            RemoteOutcome::Respond(envelope) => {
                if let Some(peer) = reply_to {
                    if let Err(e) = self.mesh.send_to(peer, &envelope) {
                        debug!(peer = %peer, error = %e, "state reply not sent");
                    }
                }
            }
            RemoteOutcome::Apply(document) => self.publish_applied(document),
            RemoteOutcome::AccessDenied { owner } => {
                self.denied_tx.send_replace(true);
                self.emit(SessionEvent::AccessDenied { owner });
            }
        }
    }

    /// Take on the outcome of an election.
    fn adopt(&mut self, resolution: Resolution) {
        self.host = None;
        if let Some(link) = resolution.host_link {
            let host = link.remote().clone();
            self.mesh.accept(link);
            if let Err(e) = self.mesh.send_to(&host, &SyncEnvelope::RequestState) {
                debug!(host = %host, error = %e, "state request not sent");
            }
            self.emit(SessionEvent::PeerJoined(host.clone()));
            self.host = Some(host);
        }
        self.endpoint = Some(resolution.endpoint);
        self.set_role(resolution.role);
    }

    /// Drop every session and the registration, then elect again.
    async fn reelect(&mut self) {
        for peer in self.mesh.peers() {
            self.emit(SessionEvent::PeerLeft(peer));
        }
        self.mesh.disconnect_all();
        self.host = None;
        if let Some(endpoint) = self.endpoint.take() {
            endpoint.close().await;
        }
        self.identity.reset();
        self.set_role(PeerRole::Unresolved);

        match self.identity.resolve().await {
            Ok(resolution) => {
                self.reelect_timer.cancel();
                self.adopt(resolution);
                if self.mesh.role() == PeerRole::Host && !self.reconcile.guard().has_loaded_initial {
                    self.reconcile.assume_authoritative();
                }
            }
            Err(e) => {
                warn!(project = %self.project, error = %e, "re-election failed, will retry");
                self.reelect_timer.arm(Instant::now());
            }
        }
    }

    fn on_edit(&mut self, document: DesignDocument) {
        if self.reconcile.on_local_change(document.clone(), Instant::now()) {
            self.document_tx.send_replace(Some(document));
        }
    }

    fn on_debounce(&mut self) {
        let Some(document) = self.reconcile.on_debounce_fired(Instant::now(), now_millis()) else {
            return;
        };
        let envelope = SyncEnvelope::StateUpdate {
            document: document.clone(),
        };
        match self.mesh.broadcast(&envelope, None) {
            Ok(sent) => debug!(project = %self.project, sent, "update broadcast"),
            Err(e) => warn!(project = %self.project, error = %e, "update not broadcast"),
        }
        self.document_tx.send_replace(Some(document.clone()));
        if self.writer.send(DesignPatch::from(&document)).is_err() {
            warn!(project = %self.project, "store writer stopped");
        }
    }

    async fn on_mesh_event(&mut self, event: MeshEvent) {
        match event {
            MeshEvent::Envelope {
                from, envelope, ..
            } => {
                if let Err(e) = self.mesh.relay(&from, &envelope) {
                    debug!(from = %from, error = %e, "relay failed");
                }
                let outcome = self.reconcile.on_remote_envelope(&envelope, Instant::now());
                self.handle_outcome(outcome, Some(&from));
            }
            MeshEvent::Closed { session, peer } => {
                if !self.mesh.remove(session, &peer) {
                    return;
                }
                self.emit(SessionEvent::PeerLeft(peer.clone()));
                if self.host.as_ref() == Some(&peer) {
                    info!(project = %self.project, host = %peer, "host left, re-electing");
                    self.reelect().await;
                }
            }
        }
    }

    fn on_local_post(&mut self, envelope: SyncEnvelope) {
        let outcome = self.reconcile.on_remote_envelope(&envelope, Instant::now());
        self.handle_outcome(outcome, None);
    }

    fn on_inbound(&mut self, link: Link) {
        if self.mesh.role() != PeerRole::Host {
            debug!(peer = %link.remote(), "not hosting, dropping inbound link");
            return;
        }
        let peer = link.remote().clone();
        self.mesh.accept(link);
        self.emit(SessionEvent::PeerJoined(peer));
    }

    async fn on_signalling_lost(&mut self) {
        let Some(endpoint) = self.endpoint.as_deref() else {
            return;
        };
        match self.identity.reregister(endpoint).await {
            Ok(()) => {}
            Err(MeshError::IdTaken(_)) => self.reelect().await,
            Err(e) => {
                warn!(project = %self.project, error = %e, "re-registration failed, will retry");
                self.reelect_timer.arm(Instant::now());
            }
        }
    }

    fn on_store_document(&mut self, document: DesignDocument, now: Instant) {
        let outcome = self.reconcile.on_store_document(document, now);
        self.handle_outcome(outcome, None);
    }

    async fn shutdown(&mut self) {
        if let Some(endpoint) = self.endpoint.take() {
            endpoint.close().await;
        }
        self.mesh.shutdown();
        if let Some(subscription) = self.subscription.take() {
            self.store.stop_sync(subscription).await;
        }
        self.set_role(PeerRole::Unresolved);
        info!(project = %self.project, "session closed");
    }
}
