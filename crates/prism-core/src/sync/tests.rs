use std::sync::Arc;
use std::time::Duration;

use pretty_assertions::assert_eq;
use serde_json::json;

use super::*;
use crate::config::SyncConfig;
use crate::connectivity::Connectivity;
use crate::context::SyncContext;
use crate::db::{LocalStore, Query};
use crate::models::{
    Collection, Contact, ContactPatch, NewContact, NewQueueItem, Operation, QueueStatus, RecordId,
};
use crate::notify::{NotificationCenter, NotificationKind};
use crate::remote::{InMemoryRemote, RemoteCall};
use crate::state::SyncState;

struct Harness {
    ctx: SyncContext,
    remote: Arc<InMemoryRemote>,
    notes: Arc<NotificationCenter>,
}

fn harness_with(config: SyncConfig, online: bool) -> Harness {
    let store = Arc::new(LocalStore::open_in_memory().unwrap());
    let remote = Arc::new(InMemoryRemote::new().with_principal("u1").with_next_id(42));
    let notes = Arc::new(NotificationCenter::new());
    let ctx = SyncContext::builder(store, remote.clone())
        .config(config)
        .notifier(notes.clone())
        .connectivity(Connectivity::new(online))
        .build()
        .unwrap();
    Harness { ctx, remote, notes }
}

fn harness() -> Harness {
    harness_with(SyncConfig::default(), true)
}

fn ali() -> NewContact {
    NewContact {
        first_name: "Ali".into(),
        phone_numbers: vec!["09120000000".into()],
        ..NewContact::default()
    }
}

fn queue_update(h: &Harness, id: &str) -> i64 {
    h.ctx
        .queue
        .enqueue(&NewQueueItem {
            entity_type: Collection::Contacts,
            operation: Operation::Update,
            entity_id: RecordId::permanent(id),
            payload: json!({ "id": id, "notes": "changed" }),
        })
        .unwrap()
}

fn completed(outcome: DrainOutcome) -> DrainSummary {
    match outcome {
        DrainOutcome::Completed(summary) => summary,
        DrainOutcome::Skipped { reason } => panic!("drain skipped: {reason:?}"),
    }
}

fn targets(remote: &InMemoryRemote) -> Vec<String> {
    remote
        .mutations()
        .iter()
        .filter_map(RemoteCall::target_id)
        .collect()
}

/// Run raw SQL against the store, e.g. to install a failing trigger
fn execute_sql(h: &Harness, sql: &str) {
    h.ctx
        .store
        .transaction(&[], |tx| Ok(tx.conn().execute_batch(sql)?))
        .unwrap();
}

async fn eventually(mut check: impl FnMut() -> bool) {
    for _ in 0..100 {
        if check() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    panic!("condition not met in time");
}

#[tokio::test(flavor = "multi_thread")]
async fn drain_is_fifo_even_when_first_item_fails() {
    let h = harness();
    let a = queue_update(&h, "a");
    queue_update(&h, "b");
    queue_update(&h, "c");
    h.remote.fail_record("a");

    let summary = completed(h.ctx.drain().await.unwrap());

    assert_eq!(targets(&h.remote), vec!["a", "b", "c"]);
    assert_eq!(summary.succeeded, 2);
    assert_eq!(summary.failed, 1);

    let remaining = h.ctx.queue.list(None).unwrap();
    assert_eq!(remaining.len(), 1);
    assert_eq!(remaining[0].id, a);
    assert_eq!(remaining[0].status, QueueStatus::Pending);
    assert_eq!(remaining[0].attempts, 1);
}

#[tokio::test(flavor = "multi_thread")]
async fn failing_update_is_parked_after_max_attempts() {
    let h = harness();
    let id = queue_update(&h, "7");
    h.remote.set_failing(true);

    for _ in 0..5 {
        completed(h.ctx.drain().await.unwrap());
    }

    let parked = h.ctx.queue.get(id).unwrap().unwrap();
    assert_eq!(parked.status, QueueStatus::Failed);
    assert_eq!(parked.attempts, 5);
    assert!(parked.last_error.is_some());
    assert!(h.ctx.queue.dequeue_ready().unwrap().is_empty());
    assert_eq!(h.notes.of_kind(NotificationKind::Error).len(), 1);

    // Parked items are not retried automatically.
    completed(h.ctx.drain().await.unwrap());
    assert_eq!(h.remote.mutations().len(), 5);
    assert_eq!(h.ctx.engine.current_state(), SyncState::Synced);
}

#[tokio::test(flavor = "multi_thread")]
async fn concurrent_drains_run_one_pass() {
    let h = harness();
    queue_update(&h, "1");
    h.remote.set_latency(Some(Duration::from_millis(100)));

    let (first, second) = tokio::join!(h.ctx.drain(), h.ctx.drain());
    let outcomes = [first.unwrap(), second.unwrap()];

    let skipped = outcomes
        .iter()
        .filter(|o| {
            matches!(
                o,
                DrainOutcome::Skipped {
                    reason: SkipReason::AlreadyDraining
                }
            )
        })
        .count();
    assert_eq!(skipped, 1);
    assert_eq!(h.remote.mutations().len(), 1);
    assert!(!h.ctx.engine.is_draining());
}

#[tokio::test(flavor = "multi_thread")]
async fn offline_drain_is_skipped() {
    let h = harness_with(SyncConfig::default(), false);
    queue_update(&h, "1");

    let outcome = h.ctx.drain().await.unwrap();

    assert_eq!(
        outcome,
        DrainOutcome::Skipped {
            reason: SkipReason::Offline
        }
    );
    assert_eq!(h.ctx.engine.current_state(), SyncState::Offline);
    assert!(h.remote.calls().is_empty());
    assert_eq!(h.ctx.queue.counts().unwrap().pending, 1);
}

#[tokio::test(flavor = "multi_thread")]
async fn successful_create_adopts_remote_id() {
    let h = harness();
    let temp = h.ctx.contacts.create(ali()).unwrap();

    let summary = completed(h.ctx.drain().await.unwrap());

    assert_eq!(summary.adopted, 1);
    assert!(h.ctx.queue.list(None).unwrap().is_empty());
    assert!(h.ctx.contacts.get(&temp).unwrap().is_none());
    let adopted = h.ctx.contacts.get(&RecordId::permanent("42")).unwrap().unwrap();
    assert_eq!(adopted.first_name, "Ali");
    assert_eq!(adopted.phone_numbers, vec!["09120000000"]);
}

#[tokio::test(flavor = "multi_thread")]
async fn without_adoption_temporary_record_is_untouched() {
    let config = SyncConfig {
        adopt_remote_ids: false,
        ..SyncConfig::default()
    };
    let h = harness_with(config, true);
    let temp = h.ctx.contacts.create(ali()).unwrap();
    let before = h.ctx.contacts.get(&temp).unwrap().unwrap();

    let summary = completed(h.ctx.drain().await.unwrap());

    assert_eq!(summary.adopted, 0);
    assert!(h.ctx.queue.list(None).unwrap().is_empty());
    assert_eq!(h.ctx.contacts.get(&temp).unwrap().unwrap(), before);
    assert_eq!(h.remote.rows(Collection::Contacts)[0]["id"], "42");
}

#[tokio::test(flavor = "multi_thread")]
async fn update_queued_behind_in_flight_create_follows_adopted_id() {
    let h = harness();
    let temp = h.ctx.contacts.create(ali()).unwrap();
    let create = h.ctx.queue.dequeue_ready().unwrap()[0].id;

    // The create is on the wire when the edit happens.
    h.ctx.queue.mark_in_flight(create).unwrap();
    let patch = ContactPatch {
        notes: Some(Some("met at work".into())),
        ..ContactPatch::default()
    };
    h.ctx.contacts.update(&temp, &patch).unwrap();
    h.ctx.queue.recover_in_flight().unwrap();

    completed(h.ctx.drain().await.unwrap());

    let calls = h.remote.mutations();
    assert_eq!(calls.len(), 2);
    assert!(matches!(calls[0], RemoteCall::Insert { .. }));
    match &calls[1] {
        RemoteCall::Update { id, patch, .. } => {
            assert_eq!(id, &RecordId::permanent("42"));
            assert_eq!(patch["id"], "42");
            assert_eq!(patch["notes"], "met at work");
        }
        other => panic!("expected update, got {other:?}"),
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn temporary_update_waits_for_its_create() {
    let h = harness();
    let temp = h.ctx.contacts.create(ali()).unwrap();
    let create = h.ctx.queue.dequeue_ready().unwrap()[0].id;
    h.ctx.queue.mark_in_flight(create).unwrap();
    h.ctx
        .contacts
        .update(
            &temp,
            &ContactPatch {
                last_name: Some("Rezaei".into()),
                ..ContactPatch::default()
            },
        )
        .unwrap();
    h.ctx.queue.recover_in_flight().unwrap();
    h.remote.fail_next(1);

    let summary = completed(h.ctx.drain().await.unwrap());

    assert_eq!(summary.failed, 1);
    assert_eq!(summary.deferred, 1);
    assert_eq!(h.remote.mutations().len(), 1);
}

#[tokio::test(flavor = "multi_thread")]
async fn edit_after_requeued_create_is_sent_last() {
    let h = harness();
    let temp = h.ctx.contacts.create(ali()).unwrap();
    let create = h.ctx.queue.dequeue_ready().unwrap()[0].id;

    // First edit lands while the create is on the wire, then the create fails.
    h.ctx.queue.mark_in_flight(create).unwrap();
    let edit = |notes: &str| ContactPatch {
        notes: Some(Some(notes.into())),
        ..ContactPatch::default()
    };
    h.ctx.contacts.update(&temp, &edit("B")).unwrap();
    h.ctx.queue.mark_failed(create, "timeout").unwrap();
    h.ctx.contacts.update(&temp, &edit("C")).unwrap();

    let queued = h.ctx.queue.list(None).unwrap();
    assert_eq!(queued.len(), 3);
    assert_eq!(queued[0].payload["notes"], json!(null));

    completed(h.ctx.drain().await.unwrap());

    let local = h.ctx.contacts.get(&RecordId::permanent("42")).unwrap().unwrap();
    let remote = h.remote.rows(Collection::Contacts);
    assert_eq!(local.notes.as_deref(), Some("C"));
    assert_eq!(remote.len(), 1);
    assert_eq!(remote[0]["notes"], "C");
    assert!(h.ctx.queue.list(None).unwrap().is_empty());
}

#[tokio::test(flavor = "multi_thread")]
async fn sent_create_is_not_resent_when_adoption_cannot_be_stored() {
    let h = harness();
    let temp = h.ctx.contacts.create(ali()).unwrap();
    queue_update(&h, "7");
    execute_sql(
        &h,
        "CREATE TRIGGER block_rekey BEFORE UPDATE OF id ON contacts
         BEGIN SELECT RAISE(ABORT, 'disk I/O error'); END;",
    );

    let summary = completed(h.ctx.drain().await.unwrap());

    assert_eq!(summary.succeeded, 2);
    assert_eq!(summary.adopted, 0);
    assert_eq!(h.remote.mutations().len(), 2);
    assert!(h.ctx.queue.list(None).unwrap().is_empty());
    assert!(h.ctx.contacts.get(&temp).unwrap().is_some());
    assert_eq!(h.notes.of_kind(NotificationKind::Error).len(), 1);

    // Nothing is left behind for a restart to send again.
    assert_eq!(h.ctx.engine.recover_interrupted().unwrap(), 0);
    completed(h.ctx.drain().await.unwrap());
    assert_eq!(h.remote.rows(Collection::Contacts).len(), 1);
    assert_eq!(h.remote.mutations().len(), 2);
}

#[tokio::test(flavor = "multi_thread")]
async fn unrecorded_failure_returns_item_to_pending() {
    let h = harness();
    let id = queue_update(&h, "a");
    h.remote.fail_record("a");
    execute_sql(
        &h,
        "CREATE TRIGGER block_attempts BEFORE UPDATE OF attempts ON sync_queue
         BEGIN SELECT RAISE(ABORT, 'database is locked'); END;",
    );

    let summary = completed(h.ctx.drain().await.unwrap());

    assert_eq!(summary.failed, 1);
    let item = h.ctx.queue.get(id).unwrap().unwrap();
    assert_eq!(item.status, QueueStatus::Pending);
    assert_eq!(item.attempts, 0);

    execute_sql(&h, "DROP TRIGGER block_attempts;");
    h.remote.clear_failures();
    completed(h.ctx.drain().await.unwrap());
    assert!(h.ctx.queue.get(id).unwrap().is_none());
}

#[tokio::test(flavor = "multi_thread")]
async fn summary_notification_reflects_failures() {
    let h = harness();
    queue_update(&h, "1");
    completed(h.ctx.drain().await.unwrap());
    assert_eq!(h.notes.of_kind(NotificationKind::Success).len(), 1);
    assert_eq!(h.ctx.engine.current_state(), SyncState::Synced);

    queue_update(&h, "2");
    h.remote.fail_next(1);
    completed(h.ctx.drain().await.unwrap());
    assert_eq!(h.notes.of_kind(NotificationKind::Info).len(), 1);
    assert_eq!(h.ctx.engine.current_state(), SyncState::Error);
}

#[tokio::test(flavor = "multi_thread")]
async fn worker_drains_after_local_write() {
    let h = harness();
    let worker = h.ctx.start_worker();

    h.ctx.contacts.create(ali()).unwrap();

    eventually(|| h.ctx.queue.counts().unwrap().total() == 0).await;
    assert_eq!(h.remote.rows(Collection::Contacts).len(), 1);
    worker.shutdown().await;
}

#[tokio::test(flavor = "multi_thread")]
async fn worker_drains_on_reconnect() {
    let h = harness_with(SyncConfig::default(), false);
    let worker = h.ctx.start_worker();
    h.ctx.contacts.create(ali()).unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(h.remote.mutations().is_empty());

    h.ctx.connectivity.set_online(true);

    eventually(|| {
        h.ctx
            .contacts
            .get(&RecordId::permanent("42"))
            .unwrap()
            .is_some()
    })
    .await;
    let contacts: Vec<Contact> = h.ctx.contacts.list(&Query::all()).unwrap();
    assert_eq!(contacts.len(), 1);
    assert_eq!(h.remote.mutations().len(), 1);
    worker.shutdown().await;
}

#[tokio::test(flavor = "multi_thread")]
async fn worker_recovers_interrupted_items_on_start() {
    let h = harness();
    let id = queue_update(&h, "9");
    h.ctx.queue.mark_in_flight(id).unwrap();

    let worker = h.ctx.start_worker();

    eventually(|| h.ctx.queue.get(id).unwrap().is_none()).await;
    assert_eq!(targets(&h.remote), vec!["9"]);
    worker.shutdown().await;
}
