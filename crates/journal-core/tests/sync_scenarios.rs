//! Full sync passes against the in-memory remote.

use std::sync::Arc;
use std::time::Duration;

use journal_core::db::WriteOrigin;
use journal_core::models::{Entry, EntryDraft, EntryId, Resolution, SyncStatus};
use journal_core::services::LocalStore;
use journal_core::sync::memory::InMemoryRemote;
use journal_core::sync::{
    RemoteError, RemoteRecord, SyncCoordinator, SyncError, SyncOutcome, SyncTimeouts,
};
use pretty_assertions::assert_eq;

struct Device {
    store: LocalStore,
    coordinator: Arc<SyncCoordinator>,
}

impl Device {
    async fn new(remote: &InMemoryRemote) -> Self {
        let store = LocalStore::open_in_memory().await.unwrap();
        let coordinator = Arc::new(SyncCoordinator::new(
            store.clone(),
            Arc::new(remote.clone()),
            SyncTimeouts::default(),
        ));
        Self { store, coordinator }
    }

    async fn status(&self, id: &EntryId) -> SyncStatus {
        self.store.snapshot(id).await.unwrap().unwrap().state.status
    }

    async fn statuses(&self) -> Vec<(EntryId, SyncStatus)> {
        self.store
            .dirty_since(0)
            .await
            .unwrap()
            .into_iter()
            .map(|snapshot| (snapshot.entry.id, snapshot.state.status))
            .collect()
    }

    async fn edit(&self, id: &EntryId, text: &str) -> Entry {
        let mut entry = self.store.get_entry(id).await.unwrap().unwrap();
        entry.text = text.to_string();
        self.store.update_entry(&entry).await.unwrap()
    }
}

/// Let the millisecond clock move so timestamps order strictly
async fn tick() {
    tokio::time::sleep(Duration::from_millis(5)).await;
}

fn remote_edit(record: &RemoteRecord, text: &str, updated_at: i64) -> RemoteRecord {
    RemoteRecord {
        text: text.to_string(),
        updated_at,
        device_origin: "device-b".to_string(),
        ..record.clone()
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn scenario_a_new_local_entry_is_created_remotely() {
    let remote = InMemoryRemote::new();
    let device = Device::new(&remote).await;
    let entry = device
        .store
        .create_entry(EntryDraft::new("first entry"))
        .await
        .unwrap();

    let outcome = device.coordinator.synchronize().await;
    let report = outcome.report().cloned().unwrap();
    assert_eq!(report.pushed, 1);

    let snapshot = device.store.snapshot(&entry.id).await.unwrap().unwrap();
    assert_eq!(snapshot.state.status, SyncStatus::Synced);
    assert_eq!(snapshot.state.last_synced_version, snapshot.state.local_version);
    assert_eq!(remote.get(&entry.id).unwrap().text, "first entry");

    let global = device.store.load_global_state().await.unwrap();
    assert_eq!(global.last_sync_timestamp, report.started_at);
    assert!(!device.coordinator.is_syncing());
}

#[tokio::test(flavor = "multi_thread")]
async fn scenario_b_remote_change_overwrites_untouched_entry() {
    let remote = InMemoryRemote::new();
    let device = Device::new(&remote).await;
    let original = RemoteRecord::from(&Entry {
        updated_at: 1_000,
        ..Entry::new("original", "device-b")
    });
    remote.seed(original.clone());
    device.coordinator.synchronize().await;
    assert_eq!(device.status(&original.id).await, SyncStatus::Synced);

    remote.seed(remote_edit(&original, "edited remotely", 2_000));
    let outcome = device.coordinator.synchronize().await;
    assert_eq!(outcome.report().map(|report| report.applied), Some(1));

    let entry = device.store.get_entry(&original.id).await.unwrap().unwrap();
    assert_eq!(entry.text, "edited remotely");
    assert_eq!(entry.updated_at, 2_000);
    assert_eq!(device.status(&original.id).await, SyncStatus::Synced);
}

#[tokio::test(flavor = "multi_thread")]
async fn scenario_c_edits_on_both_sides_conflict() {
    let remote = InMemoryRemote::new();
    let device = Device::new(&remote).await;
    let entry = device.store.create_entry(EntryDraft::new("shared")).await.unwrap();
    device.coordinator.synchronize().await;

    let local = device.edit(&entry.id, "local edit").await;
    let pushed = remote.get(&entry.id).unwrap();
    remote.seed(remote_edit(&pushed, "remote edit", local.updated_at + 1_000));

    let outcome = device.coordinator.synchronize().await;
    assert_eq!(outcome.report().map(|report| report.conflicts), Some(1));

    let conflicts = device.coordinator.conflict_records().await.unwrap();
    assert_eq!(conflicts.len(), 1);
    assert_eq!(conflicts[0].primary.text, "local edit");
    assert_eq!(conflicts[0].primary_state.status, SyncStatus::Conflict);
    assert_eq!(
        conflicts[0].pending_remote.as_ref().unwrap().text,
        "remote edit"
    );
    // Neither side was auto-applied
    assert_eq!(remote.get(&entry.id).unwrap().text, "remote edit");

    // Conflicts are sticky across passes
    device.coordinator.synchronize().await;
    assert_eq!(device.status(&entry.id).await, SyncStatus::Conflict);
}

#[tokio::test(flavor = "multi_thread")]
async fn scenario_d_auth_failure_keeps_confirmed_progress() {
    let remote = InMemoryRemote::new();
    let device = Device::new(&remote).await;
    for index in 0..10 {
        device
            .store
            .create_entry(EntryDraft::new(format!("entry {index}")))
            .await
            .unwrap();
    }
    remote.fail_after_writes(3, RemoteError::Auth("token expired".to_string()));

    let outcome = device.coordinator.synchronize().await;
    assert!(matches!(outcome, SyncOutcome::Fatal(SyncError::Auth(_))));

    let statuses = device.statuses().await;
    let synced = statuses
        .iter()
        .filter(|(_, status)| *status == SyncStatus::Synced)
        .count();
    let pending = statuses
        .iter()
        .filter(|(_, status)| *status == SyncStatus::PendingPush)
        .count();
    assert_eq!((synced, pending), (3, 7));

    let global = device.coordinator.global_state().await.unwrap();
    assert_eq!(global.last_sync_timestamp, 0);
    assert!(!global.in_progress);
    assert!(device.coordinator.is_auth_blocked());
}

#[tokio::test(flavor = "multi_thread")]
async fn second_pass_without_changes_is_a_no_op() {
    let remote = InMemoryRemote::new();
    let device = Device::new(&remote).await;
    device.store.create_entry(EntryDraft::new("one")).await.unwrap();
    device.store.create_entry(EntryDraft::new("two")).await.unwrap();
    remote.seed(RemoteRecord::from(&Entry::new("from elsewhere", "device-b")));

    device.coordinator.synchronize().await;
    let global = device.store.load_global_state().await.unwrap();
    let statuses = device.statuses().await;
    let writes = remote.write_count();

    let outcome = device.coordinator.synchronize().await;
    assert!(!outcome.report().unwrap().changed_anything());
    assert_eq!(device.store.load_global_state().await.unwrap(), global);
    assert_eq!(device.statuses().await, statuses);
    assert_eq!(remote.write_count(), writes);
}

#[tokio::test(flavor = "multi_thread")]
async fn edit_during_push_is_not_lost() {
    let remote = InMemoryRemote::new();
    let device = Device::new(&remote).await;
    let entry = device.store.create_entry(EntryDraft::new("draft")).await.unwrap();
    let gate = remote.gate_next_push();

    let pass = tokio::spawn({
        let coordinator = device.coordinator.clone();
        async move { coordinator.synchronize().await }
    });
    gate.entered().await;
    device.edit(&entry.id, "edited mid-push").await;
    gate.release();

    let outcome = pass.await.unwrap();
    assert_eq!(outcome.report().map(|report| report.pushed), Some(1));
    assert_eq!(device.status(&entry.id).await, SyncStatus::PendingPush);
    let local = device.store.get_entry(&entry.id).await.unwrap().unwrap();
    assert_eq!(local.text, "edited mid-push");
    assert_eq!(remote.get(&entry.id).unwrap().text, "draft");

    device.coordinator.synchronize().await;
    assert_eq!(device.status(&entry.id).await, SyncStatus::Synced);
    assert_eq!(remote.get(&entry.id).unwrap().text, "edited mid-push");
}

#[tokio::test(flavor = "multi_thread")]
async fn rejected_record_does_not_abort_pass() {
    let remote = InMemoryRemote::new();
    let device = Device::new(&remote).await;
    let accepted = device.store.create_entry(EntryDraft::new("fine")).await.unwrap();
    let rejected = device.store.create_entry(EntryDraft::new("too long")).await.unwrap();
    remote.reject(rejected.id, "text too long");

    let outcome = device.coordinator.synchronize().await;
    let SyncOutcome::PartialFailure { report, failed } = outcome else {
        panic!("expected a partial failure, got {outcome:?}");
    };
    assert_eq!(report.pushed, 1);
    assert_eq!(failed.len(), 1);
    assert_eq!(failed[0].id, rejected.id);

    assert_eq!(device.status(&accepted.id).await, SyncStatus::Synced);
    assert_eq!(device.status(&rejected.id).await, SyncStatus::PendingPush);
    let global = device.store.load_global_state().await.unwrap();
    assert_eq!(global.last_sync_timestamp, report.started_at);

    remote.heal();
    let outcome = device.coordinator.synchronize().await;
    assert!(matches!(outcome, SyncOutcome::Success(_)));
    assert_eq!(device.status(&rejected.id).await, SyncStatus::Synced);
}

#[tokio::test(flavor = "multi_thread")]
async fn offline_pass_fails_without_touching_state() {
    let remote = InMemoryRemote::new();
    let device = Device::new(&remote).await;
    let entry = device.store.create_entry(EntryDraft::new("offline")).await.unwrap();
    remote.set_offline(true);

    let outcome = device.coordinator.synchronize().await;
    assert!(outcome.error().is_some_and(SyncError::is_transient));
    assert_eq!(device.status(&entry.id).await, SyncStatus::PendingPush);
    assert_eq!(
        device.coordinator.modified_since_last_sync().await.unwrap().len(),
        1
    );
}

#[tokio::test(flavor = "multi_thread")]
async fn keep_local_resolution_pushes_local_copy() {
    let remote = InMemoryRemote::new();
    let device = Device::new(&remote).await;
    let entry = device.store.create_entry(EntryDraft::new("shared")).await.unwrap();
    device.coordinator.synchronize().await;
    let local = device.edit(&entry.id, "mine").await;
    let pushed = remote.get(&entry.id).unwrap();
    remote.seed(remote_edit(&pushed, "theirs", local.updated_at + 1_000));
    device.coordinator.synchronize().await;

    device
        .coordinator
        .resolve_conflict(&entry.id, Resolution::KeepLocal)
        .await
        .unwrap();
    assert_eq!(device.status(&entry.id).await, SyncStatus::PendingPush);

    device.coordinator.synchronize().await;
    assert_eq!(device.status(&entry.id).await, SyncStatus::Synced);
    assert_eq!(remote.get(&entry.id).unwrap().text, "mine");
    assert!(device.coordinator.conflict_records().await.unwrap().is_empty());
}

#[tokio::test(flavor = "multi_thread")]
async fn keep_remote_resolution_applies_shadow() {
    let remote = InMemoryRemote::new();
    let device = Device::new(&remote).await;
    let entry = device.store.create_entry(EntryDraft::new("shared")).await.unwrap();
    device.coordinator.synchronize().await;
    let local = device.edit(&entry.id, "mine").await;
    let pushed = remote.get(&entry.id).unwrap();
    remote.seed(remote_edit(&pushed, "theirs", local.updated_at + 1_000));
    device.coordinator.synchronize().await;

    device
        .coordinator
        .resolve_conflict(&entry.id, Resolution::KeepRemote)
        .await
        .unwrap();
    assert_eq!(device.status(&entry.id).await, SyncStatus::PendingPull);

    device.coordinator.synchronize().await;
    assert_eq!(device.status(&entry.id).await, SyncStatus::Synced);
    let local = device.store.get_entry(&entry.id).await.unwrap().unwrap();
    assert_eq!(local.text, "theirs");
    assert!(device.store.shadow(&entry.id).await.unwrap().is_none());
}

#[tokio::test(flavor = "multi_thread")]
async fn local_delete_against_remote_edit_conflicts() {
    let remote = InMemoryRemote::new();
    let device = Device::new(&remote).await;
    let entry = device.store.create_entry(EntryDraft::new("contested")).await.unwrap();
    device.coordinator.synchronize().await;

    device.store.delete_entry(&entry.id).await.unwrap();
    let pushed = remote.get(&entry.id).unwrap();
    remote.seed(remote_edit(&pushed, "still wanted", pushed.updated_at + 60_000));

    device.coordinator.synchronize().await;
    assert_eq!(device.status(&entry.id).await, SyncStatus::Conflict);
    assert!(!remote.get(&entry.id).unwrap().deleted);

    device
        .coordinator
        .resolve_conflict(&entry.id, Resolution::KeepRemote)
        .await
        .unwrap();
    device.coordinator.synchronize().await;
    let restored = device.store.get_entry(&entry.id).await.unwrap().unwrap();
    assert_eq!(restored.text, "still wanted");
}

#[tokio::test(flavor = "multi_thread")]
async fn edits_travel_between_devices() {
    let remote = InMemoryRemote::new();
    let phone = Device::new(&remote).await;
    let laptop = Device::new(&remote).await;
    assert_ne!(phone.store.device_id(), laptop.store.device_id());

    let entry = phone.store.create_entry(EntryDraft::new("from phone")).await.unwrap();
    phone.coordinator.synchronize().await;
    tick().await;

    laptop.coordinator.synchronize().await;
    let copy = laptop.store.get_entry(&entry.id).await.unwrap().unwrap();
    assert_eq!(copy.device_origin, phone.store.device_id());
    tick().await;

    laptop.edit(&entry.id, "from laptop").await;
    laptop.coordinator.synchronize().await;
    tick().await;

    phone.coordinator.synchronize().await;
    let updated = phone.store.get_entry(&entry.id).await.unwrap().unwrap();
    assert_eq!(updated.text, "from laptop");
    assert_eq!(updated.device_origin, laptop.store.device_id());
    assert_eq!(phone.status(&entry.id).await, SyncStatus::Synced);
    assert_eq!(laptop.status(&entry.id).await, SyncStatus::Synced);

    laptop.store.delete_entry(&entry.id).await.unwrap();
    laptop.coordinator.synchronize().await;
    tick().await;
    phone.coordinator.synchronize().await;
    assert!(phone.store.snapshot(&entry.id).await.unwrap().is_none());
}

#[tokio::test(flavor = "multi_thread")]
async fn sync_written_entries_are_not_dirty() {
    let remote = InMemoryRemote::new();
    let device = Device::new(&remote).await;
    let remote_only = Entry::new("remote only", "device-b");
    device
        .store
        .upsert(&remote_only, WriteOrigin::Sync)
        .await
        .unwrap();

    let state = device
        .store
        .snapshot(&remote_only.id)
        .await
        .unwrap()
        .unwrap()
        .state;
    assert!(!state.is_dirty());
    assert_eq!(state.status, SyncStatus::Synced);
}
