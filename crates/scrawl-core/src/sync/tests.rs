use std::sync::Arc;
use std::time::Duration;

use pretty_assertions::assert_eq;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

use super::SyncEngine;
use crate::config::SyncSettings;
use crate::db::{LocalStore, WriteOrigin};
use crate::models::{Note, OpKind, OwnerId, RemoteNote, ShadowSource, SyncState};
use crate::remote::testing::{RemoteCall, ToggleRemote};
use crate::remote::InMemoryRemote;
use crate::services::NoteService;
use crate::session::Session;
use crate::state::SyncPhase;

const WAIT: Duration = Duration::from_secs(5);

struct Device {
    notes: NoteService,
    engine: SyncEngine<ToggleRemote>,
    remote: ToggleRemote,
}

fn owner() -> OwnerId {
    OwnerId::new("owner-1").unwrap()
}

fn fast_settings() -> SyncSettings {
    SyncSettings {
        request_timeout_secs: 1,
        initial_backoff_ms: 20,
        max_backoff_secs: 1,
        pull_interval_secs: 1,
        max_concurrent_sends: 4,
    }
}

fn device(server: &InMemoryRemote) -> Device {
    let store = Arc::new(LocalStore::open_in_memory().unwrap());
    let session = Session::new(owner(), Some("device-token".to_string()));
    let remote = ToggleRemote::new(server.clone());
    let engine = SyncEngine::new(
        Arc::clone(&store),
        remote.clone(),
        session.clone(),
        fast_settings(),
    )
    .unwrap();
    Device {
        notes: NoteService::new(store, session),
        engine,
        remote,
    }
}

/// Apply an edit to the server copy as another device would.
fn edit_on_server(server: &InMemoryRemote, note: &Note, title: &str, updated_at: i64) -> RemoteNote {
    let current = server.get(&note.id).unwrap();
    let next = RemoteNote {
        title: title.to_string(),
        version: current.version + 1,
        updated_at,
        ..current.clone()
    };
    server.update(&note.id, &next, current.version).unwrap()
}

#[tokio::test(flavor = "multi_thread")]
async fn created_note_round_trips_to_second_device() {
    let server = InMemoryRemote::new();
    let phone = device(&server);
    let laptop = device(&server);

    let note = phone.notes.create_note("Groceries", "milk, eggs").unwrap();
    let report = phone.engine.sync_once().await.unwrap();
    assert_eq!(report.drain.acked, 1);

    let synced = phone.notes.get_note(&note.id).unwrap();
    assert_eq!(synced.sync_state, SyncState::Clean);
    assert_eq!(synced.remote_version, 1);
    assert!(phone.notes.pending_operations().unwrap().is_empty());

    let report = laptop.engine.sync_once().await.unwrap();
    assert_eq!(report.pull.unwrap().applied, 1);
    let fetched = laptop.notes.get_note(&note.id).unwrap();
    assert_eq!(fetched.title, "Groceries");
    assert_eq!(fetched.body, "milk, eggs");
    assert_eq!(fetched.version, 1);
    assert_eq!(fetched.created_at, note.created_at);
    assert_eq!(fetched.sync_state, SyncState::Clean);
    assert_eq!(laptop.engine.status().borrow().phase, SyncPhase::Synced);
}

#[tokio::test(flavor = "multi_thread")]
async fn offline_edits_stay_queued_until_connectivity_returns() {
    let server = InMemoryRemote::new();
    let phone = device(&server);
    phone.remote.set_online(false);

    let first = phone.notes.create_note("one", "").unwrap();
    let second = phone.notes.create_note("two", "").unwrap();
    phone.notes.update_note(&first.id, "one edited", "").unwrap();

    let error = phone.engine.sync_once().await.unwrap_err();
    assert!(error.is_transient());
    let status = phone.engine.status().borrow().clone();
    assert_eq!(status.phase, SyncPhase::Pending);
    assert_eq!(status.pending_ops, 2);
    assert!(status.last_error.is_some());

    let report = phone.engine.drain().await.unwrap();
    assert_eq!(report.failures.len(), 2);
    for op in phone.notes.pending_operations().unwrap() {
        assert_eq!(op.attempts, 1);
        assert!(!op.in_flight);
    }
    for note in phone.notes.list_notes().unwrap() {
        assert_eq!(note.sync_state, SyncState::Dirty);
    }
    assert!(server.is_empty());

    phone.remote.set_online(true);
    let report = phone.engine.sync_once().await.unwrap();
    assert_eq!(report.drain.acked, 2);
    assert!(phone.notes.pending_operations().unwrap().is_empty());
    assert_eq!(server.get(&first.id).unwrap().title, "one edited");
    assert_eq!(server.get(&second.id).unwrap().title, "two");
    for note in phone.notes.list_notes().unwrap() {
        assert_eq!(note.sync_state, SyncState::Clean);
    }
    assert_eq!(phone.engine.status().borrow().phase, SyncPhase::Synced);
}

#[tokio::test(flavor = "multi_thread")]
async fn collapsed_updates_reach_remote_as_one_create() {
    let server = InMemoryRemote::new();
    let phone = device(&server);

    let note = phone.notes.create_note("v1", "").unwrap();
    phone.notes.update_note(&note.id, "v2", "").unwrap();
    phone.notes.update_note(&note.id, "v3", "final").unwrap();

    phone.engine.sync_once().await.unwrap();

    assert_eq!(phone.remote.write_calls(), vec![RemoteCall::Create(note.id)]);
    let stored = server.get(&note.id).unwrap();
    assert_eq!(stored.title, "v3");
    assert_eq!(stored.version, 3);

    let local = phone.notes.get_note(&note.id).unwrap();
    assert_eq!(local.version, 3);
    assert_eq!(local.remote_version, 3);
    assert_eq!(local.sync_state, SyncState::Clean);
}

#[tokio::test(flavor = "multi_thread")]
async fn offline_updates_of_synced_note_send_one_update_from_first_base() {
    let server = InMemoryRemote::new();
    let phone = device(&server);
    let note = phone.notes.create_note("draft", "").unwrap();
    phone.engine.sync_once().await.unwrap();

    phone.remote.set_online(false);
    phone.notes.update_note(&note.id, "a", "").unwrap();
    phone.notes.update_note(&note.id, "b", "final").unwrap();

    let ops = phone.notes.pending_operations().unwrap();
    assert_eq!(ops.len(), 1);
    assert_eq!(ops[0].kind, OpKind::Update);
    assert_eq!(ops[0].base_version, 1);

    phone.remote.set_online(true);
    let report = phone.engine.sync_once().await.unwrap();
    assert_eq!(report.drain.acked, 1);

    assert_eq!(
        phone.remote.write_calls(),
        vec![RemoteCall::Create(note.id), RemoteCall::Update(note.id, 1)]
    );
    let stored = server.get(&note.id).unwrap();
    assert_eq!(stored.title, "b");
    assert_eq!(stored.body, "final");
    assert_eq!(stored.version, 3);
}

#[tokio::test(flavor = "multi_thread")]
async fn queued_updates_are_sent_in_order() {
    let server = InMemoryRemote::new();
    let phone = device(&server);
    let note = phone.notes.create_note("v1", "").unwrap();
    phone.engine.sync_once().await.unwrap();

    phone.remote.set_online(false);
    phone.notes.update_note(&note.id, "v2", "").unwrap();
    phone.engine.drain().await.unwrap();
    // The attempted update may already have landed, so this one queues behind it
    phone.notes.update_note(&note.id, "v3", "").unwrap();
    let ops = phone.notes.pending_operations().unwrap();
    assert_eq!(ops.len(), 2);
    assert_eq!(ops[1].base_version, 2);

    phone.remote.set_online(true);
    let report = phone.engine.sync_once().await.unwrap();
    assert_eq!(report.drain.acked, 2);

    let calls = phone.remote.write_calls();
    assert_eq!(
        calls[calls.len() - 2..].to_vec(),
        vec![RemoteCall::Update(note.id, 1), RemoteCall::Update(note.id, 2)]
    );
    let stored = server.get(&note.id).unwrap();
    assert_eq!(stored.title, "v3");
    assert_eq!(stored.version, 3);
}

#[tokio::test(flavor = "multi_thread")]
async fn newer_remote_edit_wins_and_local_copy_is_shadowed() {
    let server = InMemoryRemote::new();
    let phone = device(&server);
    let note = phone.notes.create_note("shared", "").unwrap();
    phone.notes.update_note(&note.id, "shared 2", "").unwrap();
    phone.notes.update_note(&note.id, "shared 3", "").unwrap();
    phone.engine.sync_once().await.unwrap();
    assert_eq!(phone.notes.get_note(&note.id).unwrap().remote_version, 3);

    let local = phone.notes.update_note(&note.id, "local 4", "").unwrap();
    assert_eq!(local.version, 4);
    let ops = phone.notes.pending_operations().unwrap();
    assert_eq!(ops.len(), 1);
    assert_eq!(ops[0].kind, OpKind::Update);
    assert_eq!(ops[0].base_version, 3);

    let current = edit_on_server(&server, &note, "remote 4", local.updated_at + 60_000);
    assert_eq!(current.version, 4);

    let report = phone.engine.sync_once().await.unwrap();
    assert_eq!(report.pull.unwrap().deferred, 1);
    assert_eq!(report.drain.conflicts, 1);
    assert_eq!(
        phone.remote.write_calls().last(),
        Some(&RemoteCall::Update(note.id, 3))
    );

    let resolved = phone.notes.get_note(&note.id).unwrap();
    assert_eq!(resolved.title, "remote 4");
    assert!(resolved.version > 4);
    assert_eq!(resolved.remote_version, 4);
    assert_eq!(resolved.sync_state, SyncState::Conflicted);
    assert!(phone.notes.pending_operations().unwrap().is_empty());

    let shadows = phone.notes.conflicts(Some(&note.id)).unwrap();
    assert_eq!(shadows.len(), 1);
    assert_eq!(shadows[0].source, ShadowSource::Local);
    assert_eq!(shadows[0].title, "local 4");
    assert_eq!(shadows[0].version, 4);

    assert_eq!(server.get(&note.id).unwrap(), current);
}

#[tokio::test(flavor = "multi_thread")]
async fn local_edit_wins_ties_and_is_rebased_on_remote_version() {
    let server = InMemoryRemote::new();
    let phone = device(&server);
    let note = phone.notes.create_note("shared", "").unwrap();
    phone.engine.sync_once().await.unwrap();

    phone.notes.update_note(&note.id, "local edit", "").unwrap();
    // Remote edit stamped no later than the local one
    edit_on_server(&server, &note, "remote edit", note.updated_at);

    let report = phone.engine.sync_once().await.unwrap();
    assert_eq!(report.drain.conflicts, 1);
    assert_eq!(report.drain.acked, 1);

    let stored = server.get(&note.id).unwrap();
    assert_eq!(stored.title, "local edit");
    assert_eq!(stored.version, 3);

    let local = phone.notes.get_note(&note.id).unwrap();
    assert_eq!(local.version, 3);
    assert_eq!(local.remote_version, 3);
    assert_eq!(local.sync_state, SyncState::Conflicted);

    let shadows = phone.notes.conflicts(None).unwrap();
    assert_eq!(shadows.len(), 1);
    assert_eq!(shadows[0].source, ShadowSource::Remote);
    assert_eq!(shadows[0].title, "remote edit");

    let acknowledged = phone.notes.acknowledge_conflict(&note.id).unwrap().unwrap();
    assert_eq!(acknowledged.sync_state, SyncState::Clean);
    assert!(phone.notes.conflicts(None).unwrap().is_empty());
}

#[tokio::test(flavor = "multi_thread")]
async fn replayed_operations_are_acknowledged_without_conflict() {
    let server = InMemoryRemote::new();
    let phone = device(&server);

    // The create reached the server but the response was lost
    let note = phone.notes.create_note("once", "").unwrap();
    server.create(&RemoteNote::from(&note)).unwrap();

    let report = phone.engine.sync_once().await.unwrap();
    assert_eq!(report.drain.acked, 1);
    assert_eq!(report.drain.conflicts, 0);
    assert_eq!(server.revision(), 1);

    let updated = phone.notes.update_note(&note.id, "twice", "").unwrap();
    server
        .update(&note.id, &RemoteNote::from(&updated), 1)
        .unwrap();

    let report = phone.engine.sync_once().await.unwrap();
    assert_eq!(report.drain.acked, 1);
    assert_eq!(report.drain.conflicts, 0);
    assert_eq!(server.revision(), 2);

    let local = phone.notes.get_note(&note.id).unwrap();
    assert_eq!(local.sync_state, SyncState::Clean);
    assert_eq!(local.remote_version, 2);
    assert!(phone.notes.conflicts(None).unwrap().is_empty());
}

#[tokio::test(flavor = "multi_thread")]
async fn acknowledged_delete_purges_note_on_every_device() {
    let server = InMemoryRemote::new();
    let phone = device(&server);
    let laptop = device(&server);
    let note = phone.notes.create_note("temporary", "").unwrap();
    phone.engine.sync_once().await.unwrap();
    laptop.engine.sync_once().await.unwrap();
    assert!(laptop.notes.get_note(&note.id).is_ok());

    phone.notes.delete_note(&note.id).unwrap();
    phone.engine.sync_once().await.unwrap();

    let tombstone = server.get(&note.id).unwrap();
    assert!(tombstone.deleted);
    assert_eq!(tombstone.version, 2);
    assert!(phone.notes.store().get(&note.id).unwrap().is_none());

    let report = laptop.engine.sync_once().await.unwrap();
    assert_eq!(report.pull.unwrap().purged, 1);
    assert!(laptop.notes.store().get(&note.id).unwrap().is_none());
}

#[tokio::test(flavor = "multi_thread")]
async fn edit_after_remote_delete_resurrects_note() {
    let server = InMemoryRemote::new();
    let phone = device(&server);
    let laptop = device(&server);
    let note = phone.notes.create_note("contested", "").unwrap();
    phone.engine.sync_once().await.unwrap();
    laptop.engine.sync_once().await.unwrap();

    laptop.notes.delete_note(&note.id).unwrap();
    laptop.engine.sync_once().await.unwrap();
    phone.notes.update_note(&note.id, "still needed", "").unwrap();

    let report = phone.engine.sync_once().await.unwrap();
    assert_eq!(report.drain.conflicts, 1);

    let stored = server.get(&note.id).unwrap();
    assert!(!stored.deleted);
    assert_eq!(stored.title, "still needed");
    assert_eq!(stored.version, 3);

    let shadows = phone.notes.conflicts(Some(&note.id)).unwrap();
    assert_eq!(shadows.len(), 1);
    assert!(shadows[0].deleted);
}

#[tokio::test(flavor = "multi_thread")]
async fn update_of_note_missing_remotely_is_recreated() {
    let server = InMemoryRemote::new();
    let phone = device(&server);

    let mut note = Note::new(owner(), "orphan", "");
    note.remote_version = 1;
    note.sync_state = SyncState::Clean;
    phone.notes.store().put(&note, WriteOrigin::Sync).unwrap();
    phone.notes.update_note(&note.id, "orphan edited", "").unwrap();

    let report = phone.engine.sync_once().await.unwrap();
    assert_eq!(report.drain.requeued, 1);
    assert_eq!(report.drain.acked, 1);
    assert_eq!(
        phone.remote.write_calls(),
        vec![RemoteCall::Update(note.id, 1), RemoteCall::Create(note.id)]
    );

    let stored = server.get(&note.id).unwrap();
    assert_eq!(stored.title, "orphan edited");
    let local = phone.notes.get_note(&note.id).unwrap();
    assert_eq!(local.remote_version, stored.version);
    assert_eq!(local.sync_state, SyncState::Clean);
}

#[tokio::test(flavor = "multi_thread")]
async fn timed_out_call_is_released_for_retry() {
    let server = InMemoryRemote::new();
    let phone = device(&server);
    let note = phone.notes.create_note("slow", "").unwrap();
    phone.remote.set_stalled(true);

    let report = phone.engine.drain().await.unwrap();
    assert_eq!(report.failures.len(), 1);
    assert!(report.failures[0].contains("timed out"));

    let op = phone.notes.store().next_pending(&note.id).unwrap().unwrap();
    assert_eq!(op.kind, OpKind::Create);
    assert_eq!(op.attempts, 1);
    assert!(!op.in_flight);

    phone.remote.set_stalled(false);
    let report = phone.engine.drain().await.unwrap();
    assert_eq!(report.acked, 1);
}

#[tokio::test(flavor = "multi_thread")]
async fn concurrent_drains_send_each_note_once() {
    let server = InMemoryRemote::new();
    let phone = device(&server);
    let ids: Vec<_> = (0..6)
        .map(|n| phone.notes.create_note(&format!("note {n}"), "").unwrap().id)
        .collect();

    let (first, second) = tokio::join!(phone.engine.drain(), phone.engine.drain());
    assert_eq!(first.unwrap().acked + second.unwrap().acked, ids.len());

    let creates = phone
        .remote
        .write_calls()
        .into_iter()
        .filter(|call| matches!(call, RemoteCall::Create(_)))
        .count();
    assert_eq!(creates, ids.len());
    assert_eq!(server.len(), ids.len());
    assert!(phone.notes.pending_operations().unwrap().is_empty());
}

#[tokio::test(flavor = "multi_thread")]
async fn run_loop_syncs_when_connectivity_returns() {
    let server = InMemoryRemote::new();
    let phone = device(&server);
    let (online_tx, online_rx) = watch::channel(false);
    let shutdown = CancellationToken::new();

    let engine = phone.engine.clone();
    let handle = tokio::spawn({
        let shutdown = shutdown.clone();
        async move { engine.run(online_rx, shutdown).await }
    });

    let note = phone.notes.create_note("queued while offline", "").unwrap();
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(server.is_empty());
    assert_eq!(phone.engine.status().borrow().phase, SyncPhase::Offline);

    let mut status = phone.engine.status();
    online_tx.send(true).unwrap();
    tokio::time::timeout(
        WAIT,
        status.wait_for(|status| status.phase == SyncPhase::Synced && status.pending_ops == 0),
    )
    .await
    .unwrap()
    .unwrap();
    assert!(server.get(&note.id).is_some());

    // Local writes while online trigger a drain without waiting for the pull timer
    let second = phone.notes.create_note("written online", "").unwrap();
    tokio::time::timeout(WAIT, async {
        while server.get(&second.id).is_none() {
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    })
    .await
    .unwrap();

    shutdown.cancel();
    handle.await.unwrap().unwrap();
    assert_eq!(phone.engine.status().borrow().phase, SyncPhase::Offline);
}

#[tokio::test(flavor = "multi_thread")]
async fn run_loop_backs_off_and_recovers_from_transient_failures() {
    let server = InMemoryRemote::new();
    let phone = device(&server);
    phone.remote.set_online(false);
    let (_online_tx, online_rx) = watch::channel(true);
    let shutdown = CancellationToken::new();

    let engine = phone.engine.clone();
    let handle = tokio::spawn({
        let shutdown = shutdown.clone();
        async move { engine.run(online_rx, shutdown).await }
    });

    let note = phone.notes.create_note("retry me", "").unwrap();
    let mut status = phone.engine.status();
    tokio::time::timeout(
        WAIT,
        status.wait_for(|status| status.phase == SyncPhase::Pending && status.last_error.is_some()),
    )
    .await
    .unwrap()
    .unwrap();

    phone.remote.set_online(true);
    tokio::time::timeout(
        WAIT,
        status.wait_for(|status| status.phase == SyncPhase::Synced),
    )
    .await
    .unwrap()
    .unwrap();
    assert!(server.get(&note.id).is_some());

    shutdown.cancel();
    handle.await.unwrap().unwrap();
}

#[tokio::test(flavor = "multi_thread")]
async fn run_resets_in_flight_markers_left_by_a_crash() {
    let server = InMemoryRemote::new();
    let phone = device(&server);
    let note = phone.notes.create_note("interrupted", "").unwrap();
    let op = phone.notes.store().next_pending(&note.id).unwrap().unwrap();
    phone.notes.store().set_in_flight(op.op_id, true).unwrap();

    let (_online_tx, online_rx) = watch::channel(true);
    let shutdown = CancellationToken::new();
    let engine = phone.engine.clone();
    let handle = tokio::spawn({
        let shutdown = shutdown.clone();
        async move { engine.run(online_rx, shutdown).await }
    });

    let mut status = phone.engine.status();
    tokio::time::timeout(
        WAIT,
        status.wait_for(|status| status.phase == SyncPhase::Synced),
    )
    .await
    .unwrap()
    .unwrap();
    assert_eq!(server.get(&note.id).unwrap().title, "interrupted");

    shutdown.cancel();
    handle.await.unwrap().unwrap();
}

#[tokio::test(flavor = "multi_thread")]
async fn engine_only_sends_notes_of_its_own_owner() {
    let server = InMemoryRemote::new();
    let store = Arc::new(LocalStore::open_in_memory().unwrap());
    let alice = Session::new(owner(), Some("alice-token".to_string()));
    let bob = Session::new(
        OwnerId::new("owner-2").unwrap(),
        Some("bob-token".to_string()),
    );

    let alice_notes = NoteService::new(Arc::clone(&store), alice.clone());
    let note = alice_notes.create_note("alice private", "").unwrap();

    let bob_engine = SyncEngine::new(
        Arc::clone(&store),
        server.clone(),
        bob,
        fast_settings(),
    )
    .unwrap();
    let report = bob_engine.sync_once().await.unwrap();
    assert_eq!(report.drain.acked, 0);
    assert!(report.drain.failures.is_empty());
    assert!(server.get(&note.id).is_none());
    let status = bob_engine.status().borrow().clone();
    assert_eq!(status.pending_ops, 0);
    assert_eq!(status.phase, SyncPhase::Synced);
    assert_eq!(alice_notes.pending_operations().unwrap().len(), 1);

    let alice_engine =
        SyncEngine::new(Arc::clone(&store), server.clone(), alice, fast_settings()).unwrap();
    let report = alice_engine.sync_once().await.unwrap();
    assert_eq!(report.drain.acked, 1);
    assert_eq!(server.get(&note.id).unwrap().owner_id, owner());
}
