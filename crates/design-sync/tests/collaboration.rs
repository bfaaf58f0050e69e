//! Multi-client scenarios over the in-memory network and store.
//!
//! Every test runs on paused time, so debounce, grace and election timers
//! advance instantly whenever all clients are idle.

use std::sync::Arc;
use std::time::Duration;

use design_sync::core::{PeerId, RendezvousKey};
use design_sync::mesh::memory::ACCEPT_BACKLOG;
use design_sync::mesh::{Endpoint, LocalBus, MemoryNetwork, PeerNetwork};
use design_sync::store::{DesignStore, MemoryDesignStore};
use design_sync::{
    DesignDocument, DesignSession, EditMode, PeerRole, ProjectId, SessionConfig, SessionEvent,
    SessionHandle, UserId,
};
use design_sync_testkit::{public_document, sample_document, TestFabric};
use tokio::sync::broadcast::error::TryRecvError;
use tokio::time::Instant;

fn init_tracing() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}

fn project() -> ProjectId {
    ProjectId::parse("p-abc123").unwrap()
}

fn host_id() -> PeerId {
    RendezvousKey::derive(&project()).peer_id().clone()
}

fn config(user: &str) -> SessionConfig {
    let mut config = SessionConfig::for_user(UserId::new(user));
    config.mesh = TestFabric::mesh_config();
    config
}

/// Join on the fabric's network and store, with a private side-channel so
/// only the mesh carries updates between clients.
async fn join(fabric: &TestFabric, config: SessionConfig) -> SessionHandle {
    DesignSession::join(
        config,
        fabric.peer_network(),
        fabric.design_store(),
        LocalBus::new(),
        project(),
    )
    .await
    .unwrap()
}

async fn wait_for_name(handle: &SessionHandle, name: &str) -> DesignDocument {
    let mut rx = handle.watch_document();
    let doc = rx
        .wait_for(|doc| doc.as_ref().is_some_and(|d| d.name == name))
        .await
        .unwrap()
        .clone();
    doc.unwrap()
}

async fn wait_for_role(handle: &SessionHandle, role: PeerRole) {
    let mut rx = handle.watch_role();
    rx.wait_for(|r| *r == role).await.unwrap();
}

/// Wait past the grace window that follows the initial load.
async fn settle() {
    tokio::time::sleep(Duration::from_millis(500)).await;
}

fn rename(handle: &SessionHandle, name: &str) {
    let mut doc = handle.document().unwrap();
    doc.name = name.to_string();
    handle.edit(doc).unwrap();
}

fn drain_applied(rx: &mut tokio::sync::broadcast::Receiver<SessionEvent>) -> usize {
    let mut applied = 0;
    loop {
        match rx.try_recv() {
            Ok(SessionEvent::DocumentApplied(_)) => applied += 1,
            Ok(_) | Err(TryRecvError::Lagged(_)) => {}
            Err(_) => return applied,
        }
    }
}

#[tokio::test(start_paused = true)]
async fn test_guest_receives_state_and_edits_reach_host() {
    init_tracing();
    let fabric = TestFabric::new();
    let alice = UserId::new("alice");
    fabric.seed_project(&project(), public_document(&alice));

    let a = join(&fabric, config("alice")).await;
    assert_eq!(a.role(), PeerRole::Host);

    let b = join(&fabric, config("bob")).await;
    assert_eq!(b.role(), PeerRole::Guest);
    assert_eq!(a.document(), b.document());

    settle().await;
    let mut b_events = b.subscribe();
    rename(&b, "Edited by bob");

    let seen = wait_for_name(&a, "Edited by bob").await;
    assert_eq!(seen.owner_id, Some(alice));
    assert!(seen.last_modified > public_document(&UserId::new("alice")).last_modified);

    while fabric.store.update_count() == 0 {
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    settle().await;
    assert_eq!(fabric.store.update_count(), 1);
    assert_eq!(drain_applied(&mut b_events), 0, "bob must not see his own edit echoed");
    assert_eq!(
        fabric.store.load_design(&project()).await.unwrap(),
        b.document()
    );

    a.close().await;
    b.close().await;
}

#[tokio::test(start_paused = true)]
async fn test_host_edit_reaches_every_guest() {
    let fabric = TestFabric::new();
    fabric.seed_project(&project(), public_document(&UserId::new("alice")));

    let a = join(&fabric, config("alice")).await;
    let b = join(&fabric, config("bob")).await;
    let c = join(&fabric, config("carol")).await;
    assert_eq!(c.role(), PeerRole::Guest);

    settle().await;
    rename(&a, "From the host");
    wait_for_name(&b, "From the host").await;
    wait_for_name(&c, "From the host").await;

    // Guest to guest goes through the host's relay.
    settle().await;
    rename(&c, "From carol");
    wait_for_name(&b, "From carol").await;
    wait_for_name(&a, "From carol").await;

    for handle in [a, b, c] {
        handle.close().await;
    }
}

#[tokio::test(start_paused = true)]
async fn test_guest_takes_over_when_host_leaves() {
    init_tracing();
    let fabric = TestFabric::new();
    fabric.seed_project(&project(), public_document(&UserId::new("alice")));

    let a = join(&fabric, config("alice")).await;
    let b = join(&fabric, config("bob")).await;
    assert_eq!(b.role(), PeerRole::Guest);

    a.close().await;
    assert_eq!(a.role(), PeerRole::Unresolved);
    wait_for_role(&b, PeerRole::Host).await;

    // Keep the edit out of the store so carol can only learn it from bob.
    fabric.store.set_unavailable(true);
    settle().await;
    rename(&b, "Bob hosts now");
    tokio::time::sleep(Duration::from_secs(1)).await;

    let c = join(&fabric, config("carol")).await;
    assert_eq!(c.role(), PeerRole::Guest);
    wait_for_name(&c, "Bob hosts now").await;
    assert_eq!(fabric.store.update_count(), 0);

    b.close().await;
    c.close().await;
}

#[tokio::test(start_paused = true)]
async fn test_private_design_denied_to_other_users() {
    let fabric = TestFabric::new();
    let alice = UserId::new("alice");
    fabric.seed_project(&project(), sample_document(&alice));

    let a = join(&fabric, config("alice")).await;
    let b = join(&fabric, config("bob")).await;
    let mut b_events = b.subscribe();

    assert!(b.is_access_denied());
    assert_eq!(b.document(), None);
    assert!(!a.is_access_denied());

    // Alice's answer to bob's state request is the same document: no second
    // report.
    settle().await;
    let mut denied = 0;
    while let Ok(event) = b_events.try_recv() {
        if matches!(event, SessionEvent::AccessDenied { .. }) {
            denied += 1;
        }
    }
    assert_eq!(denied, 0);

    // Bob never loaded a snapshot, so his edits go nowhere.
    let mut forged = sample_document(&alice);
    forged.name = "Hijacked".into();
    b.edit(forged).unwrap();
    settle().await;
    assert_eq!(a.document().unwrap().name, "Launch poster");
    assert_eq!(fabric.store.update_count(), 0);

    a.close().await;
    b.close().await;
}

#[tokio::test(start_paused = true)]
async fn test_view_mode_never_publishes() {
    let fabric = TestFabric::new();
    fabric.seed_project(&project(), public_document(&UserId::new("alice")));

    let a = join(&fabric, config("alice")).await;
    let viewer = join(&fabric, config("bob").with_mode(EditMode::View)).await;

    settle().await;
    rename(&viewer, "Viewer scribble");
    settle().await;
    assert_eq!(a.document().unwrap().name, "Launch poster");
    assert_eq!(fabric.store.update_count(), 0);

    // Still follows the editor.
    rename(&a, "Editor change");
    wait_for_name(&viewer, "Editor change").await;

    a.close().await;
    viewer.close().await;
}

#[tokio::test(start_paused = true)]
async fn test_side_channel_links_instances_without_mesh() {
    let bus = LocalBus::new();
    let alice = UserId::new("alice");
    let mut handles = Vec::new();

    // Two tabs of one browser: separate networks and stores, shared bus.
    for _ in 0..2 {
        let store = Arc::new(MemoryDesignStore::new());
        store.insert(project(), sample_document(&alice));
        let handle = DesignSession::join(
            config("alice"),
            Arc::new(MemoryNetwork::new()),
            store,
            bus.clone(),
            project(),
        )
        .await
        .unwrap();
        assert_eq!(handle.role(), PeerRole::Host);
        handles.push(handle);
    }

    settle().await;
    let mut first_events = handles[0].subscribe();
    rename(&handles[0], "Tab one");
    wait_for_name(&handles[1], "Tab one").await;

    settle().await;
    assert_eq!(drain_applied(&mut first_events), 0);

    for handle in handles {
        handle.close().await;
    }
}

#[tokio::test(start_paused = true)]
async fn test_create_then_share() {
    let fabric = TestFabric::new();
    let alice = UserId::new("alice");
    let mut doc = public_document(&alice);
    doc.last_modified = 0;

    let a = DesignSession::create(
        config("alice"),
        fabric.peer_network(),
        fabric.design_store(),
        LocalBus::new(),
        doc,
    )
    .await
    .unwrap();
    assert_eq!(a.role(), PeerRole::Host);
    assert!(a.document().unwrap().last_modified > 0);

    let b = DesignSession::join(
        config("bob"),
        fabric.peer_network(),
        fabric.design_store(),
        LocalBus::new(),
        a.project().clone(),
    )
    .await
    .unwrap();
    assert_eq!(b.document(), a.document());

    a.close().await;
    b.close().await;
}

#[tokio::test(start_paused = true)]
async fn test_create_requires_signed_in_user() {
    let fabric = TestFabric::new();
    let result = DesignSession::create(
        SessionConfig::default(),
        fabric.peer_network(),
        fabric.design_store(),
        LocalBus::new(),
        public_document(&UserId::new("alice")),
    )
    .await;
    assert!(matches!(result, Err(design_sync::SessionError::NoLocalUser)));
}

#[tokio::test(start_paused = true)]
async fn test_close_releases_everything() {
    let fabric = TestFabric::new();
    fabric.seed_project(&project(), public_document(&UserId::new("alice")));

    let a = join(&fabric, config("alice")).await;
    assert_eq!(fabric.store.subscriber_count(&project()), 1);

    a.close().await;
    assert_eq!(a.role(), PeerRole::Unresolved);
    assert_eq!(fabric.store.subscriber_count(&project()), 0);
    assert!(a.edit(public_document(&UserId::new("alice"))).is_err());

    // The host key is free again.
    let b = join(&fabric, config("bob")).await;
    assert_eq!(b.role(), PeerRole::Host);
    b.close().await;
}

#[tokio::test(start_paused = true)]
async fn test_host_keeps_role_after_signalling_drop() {
    let fabric = TestFabric::new();
    fabric.seed_project(&project(), public_document(&UserId::new("alice")));

    let a = join(&fabric, config("alice")).await;
    let mut a_events = a.subscribe();

    assert!(fabric.network.interrupt_signalling(&host_id()));
    while !fabric.network.is_registered(&host_id()) {
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert_eq!(a.role(), PeerRole::Host);

    let b = join(&fabric, config("bob")).await;
    assert_eq!(b.role(), PeerRole::Guest);

    settle().await;
    rename(&b, "After the outage");
    wait_for_name(&a, "After the outage").await;

    let mut role_changes = 0;
    while let Ok(event) = a_events.try_recv() {
        if matches!(event, SessionEvent::RoleChanged(_)) {
            role_changes += 1;
        }
    }
    assert_eq!(role_changes, 0);

    a.close().await;
    b.close().await;
}

#[tokio::test(start_paused = true)]
async fn test_host_becomes_guest_when_key_claimed_during_outage() {
    init_tracing();
    let fabric = TestFabric::new();
    let alice = UserId::new("alice");
    fabric.seed_project(&project(), public_document(&alice));

    let a = join(&fabric, config("alice")).await;
    assert_eq!(a.role(), PeerRole::Host);

    let mut newer = public_document(&alice);
    newer.name = "Claimed during outage".into();
    newer.last_modified += 1;
    let bob_store = Arc::new(MemoryDesignStore::new());
    bob_store.insert(project(), newer);

    // Nothing yields between the interrupt and bob's claim, so bob registers
    // the key before alice's driver notices the drop.
    assert!(fabric.network.interrupt_signalling(&host_id()));
    let b = DesignSession::join(
        config("bob"),
        fabric.peer_network(),
        bob_store,
        LocalBus::new(),
        project(),
    )
    .await
    .unwrap();
    assert_eq!(b.role(), PeerRole::Host);

    wait_for_role(&a, PeerRole::Guest).await;
    wait_for_name(&a, "Claimed during outage").await;

    a.close().await;
    b.close().await;
}

#[tokio::test(start_paused = true)]
async fn test_failed_election_retries_after_interval() {
    init_tracing();
    let fabric = TestFabric::new();
    fabric.seed_project(&project(), public_document(&UserId::new("alice")));

    let mut alice = config("alice");
    alice.mesh.max_election_rounds = 2;
    alice.mesh.dial_timeout = Duration::from_millis(100);
    alice.reelect_interval = Duration::from_secs(5);
    let a = join(&fabric, alice).await;
    assert_eq!(a.role(), PeerRole::Host);

    // A process that never accepts takes the key while alice is offline.
    // Its backlog is full, so every dial to it times out.
    assert!(fabric.network.interrupt_signalling(&host_id()));
    let squatter = fabric.network.register(&host_id()).await.unwrap();
    let filler = fabric.network.register(&PeerId::random()).await.unwrap();
    let mut queued = Vec::new();
    for _ in 0..ACCEPT_BACKLOG {
        queued.push(filler.connect(&host_id()).await.unwrap());
    }

    wait_for_role(&a, PeerRole::Unresolved).await;
    tokio::time::sleep(Duration::from_secs(1)).await;
    assert_eq!(a.role(), PeerRole::Unresolved);

    drop(queued);
    drop(filler);
    drop(squatter);
    let cleared = Instant::now();

    // The next attempt waits for the retry interval.
    tokio::time::sleep(Duration::from_secs(3)).await;
    assert_eq!(a.role(), PeerRole::Unresolved);

    wait_for_role(&a, PeerRole::Host).await;
    assert!(cleared.elapsed() >= Duration::from_secs(4));
    assert!(fabric.network.is_registered(&host_id()));

    a.close().await;
}
