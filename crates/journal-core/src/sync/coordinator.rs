//! Sync pass orchestration: pull, diff, resolve, push, commit.

use std::collections::BTreeMap;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, PoisonError};
use std::time::Duration;

use serde::Serialize;
use tokio::sync::{watch, Mutex, MutexGuard};
use tokio_util::sync::CancellationToken;

use super::error::{RemoteResult, SyncError, SyncResult};
use super::remote::{RemoteClient, RemoteRecord};
use super::resolver::{resolve, Decision};
use super::tracker::SyncTracker;
use crate::db::{ApplyOutcome, PushAck};
use crate::models::{
    ConflictRecord, Entry, EntryId, GlobalSyncState, LocalSnapshot, Resolution, SyncStatus,
};
use crate::services::LocalStore;
use crate::state::{SyncPhase, SyncProgress};
use crate::util::now_millis;

/// Pulls re-read this window before the last committed pass; re-seen records resolve as no-ops
const PULL_OVERLAP_MS: i64 = 1_000;

/// Deadlines for remote calls and whole passes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SyncTimeouts {
    pub request: Duration,
    pub pass: Duration,
}

impl Default for SyncTimeouts {
    fn default() -> Self {
        Self {
            request: Duration::from_secs(15),
            pass: Duration::from_secs(300),
        }
    }
}

/// What one pass did
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SyncReport {
    /// Remote records listed during `Pulling`
    pub pulled: usize,
    /// Local changes confirmed by the remote, deletions included
    pub pushed: usize,
    /// Remote changes written locally
    pub applied: usize,
    /// Entries newly flagged for a user decision
    pub conflicts: usize,
    /// Local entries removed because the remote deleted them
    pub deleted_remotely: usize,
    /// Pass start (Unix ms)
    pub started_at: i64,
}

impl SyncReport {
    pub const fn changed_anything(&self) -> bool {
        self.pushed + self.applied + self.conflicts + self.deleted_remotely > 0
    }
}

/// A record the remote refused; it stays pending for the next pass
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RecordFailure {
    pub id: EntryId,
    pub message: String,
}

/// Result of `synchronize`
#[derive(Debug)]
pub enum SyncOutcome {
    Success(SyncReport),
    /// The pass committed, but some records were refused
    PartialFailure {
        report: SyncReport,
        failed: Vec<RecordFailure>,
    },
    /// The pass aborted; records confirmed before the failure keep their progress
    Fatal(SyncError),
    /// Another pass was running; this trigger was dropped
    Skipped,
}

impl SyncOutcome {
    pub const fn report(&self) -> Option<&SyncReport> {
        match self {
            Self::Success(report) | Self::PartialFailure { report, .. } => Some(report),
            Self::Fatal(_) | Self::Skipped => None,
        }
    }

    pub const fn error(&self) -> Option<&SyncError> {
        match self {
            Self::Fatal(error) => Some(error),
            _ => None,
        }
    }
}

struct Pair {
    local: Option<LocalSnapshot>,
    remote: Option<RemoteRecord>,
}

struct Apply {
    remote: Entry,
    /// Local version observed while planning, `None` when the entry was absent
    expected_version: Option<i64>,
}

/// A push the remote already holds, found again by the pull
struct Acknowledge {
    local: LocalSnapshot,
    remote_updated_at: i64,
}

#[derive(Default)]
struct Plan {
    to_push: Vec<LocalSnapshot>,
    to_apply: Vec<Apply>,
    to_flag: Vec<Entry>,
    to_acknowledge: Vec<Acknowledge>,
}

impl Plan {
    fn len(&self) -> usize {
        self.to_push.len() + self.to_apply.len() + self.to_flag.len() + self.to_acknowledge.len()
    }
}

/// Holds the single-flight lock for one pass and resets progress on every exit path.
struct PassGuard<'a> {
    global: MutexGuard<'a, GlobalSyncState>,
    progress: &'a watch::Sender<SyncProgress>,
    finished: bool,
}

impl<'a> PassGuard<'a> {
    fn begin(
        mut global: MutexGuard<'a, GlobalSyncState>,
        progress: &'a watch::Sender<SyncProgress>,
    ) -> Self {
        global.in_progress = true;
        let guard = Self {
            global,
            progress,
            finished: false,
        };
        guard.phase(SyncPhase::Pulling);
        guard
    }

    fn phase(&self, phase: SyncPhase) {
        self.progress.send_replace(SyncProgress::phase(phase));
    }

    fn advance(&self, current: usize, total: usize) {
        self.progress.send_modify(|progress| {
            progress.current = current;
            progress.total = total;
        });
    }

    fn finish(&mut self) {
        self.finished = true;
    }
}

impl Drop for PassGuard<'_> {
    fn drop(&mut self) {
        self.global.in_progress = false;
        let phase = if self.finished {
            SyncPhase::Idle
        } else {
            SyncPhase::Failed
        };
        self.phase(phase);
    }
}

/// Runs sync passes between the local store and a remote.
///
/// At most one pass runs at a time; overlapping calls return `SyncOutcome::Skipped`.
pub struct SyncCoordinator {
    store: LocalStore,
    tracker: SyncTracker,
    remote: Arc<dyn RemoteClient>,
    timeouts: SyncTimeouts,
    global: Mutex<GlobalSyncState>,
    progress: watch::Sender<SyncProgress>,
    cancel: std::sync::Mutex<CancellationToken>,
    auth_blocked: AtomicBool,
}

impl SyncCoordinator {
    pub fn new(store: LocalStore, remote: Arc<dyn RemoteClient>, timeouts: SyncTimeouts) -> Self {
        let global = GlobalSyncState {
            last_sync_timestamp: 0,
            device_id: store.device_id().to_string(),
            in_progress: false,
        };
        let (progress, _) = watch::channel(SyncProgress::default());
        Self {
            tracker: SyncTracker::new(store.clone()),
            store,
            remote,
            timeouts,
            global: Mutex::new(global),
            progress,
            cancel: std::sync::Mutex::new(CancellationToken::new()),
            auth_blocked: AtomicBool::new(false),
        }
    }

    /// Subscribe to progress updates
    pub fn subscribe(&self) -> watch::Receiver<SyncProgress> {
        self.progress.subscribe()
    }

    pub fn progress(&self) -> SyncProgress {
        *self.progress.borrow()
    }

    pub fn is_syncing(&self) -> bool {
        self.global.try_lock().is_err()
    }

    /// Whether the last pass failed authentication and credentials have not validated since
    pub fn is_auth_blocked(&self) -> bool {
        self.auth_blocked.load(Ordering::SeqCst)
    }

    /// Cancel the running pass, if any
    pub fn cancel(&self) {
        self.cancel
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .cancel();
    }

    fn cancel_scope(&self) -> CancellationToken {
        let token = CancellationToken::new();
        *self.cancel.lock().unwrap_or_else(PoisonError::into_inner) = token.clone();
        token
    }

    /// Check credentials with the remote and lift or set the auth block
    pub async fn authorize(&self) -> SyncResult<bool> {
        let valid = self
            .call(&CancellationToken::new(), "token validation", self.remote.validate_token())
            .await??;
        self.auth_blocked.store(!valid, Ordering::SeqCst);
        if valid {
            tracing::debug!("Remote credentials accepted");
        } else {
            tracing::warn!("Remote rejected credentials; sync stays disabled");
        }
        Ok(valid)
    }

    /// Global state with the live in-progress flag
    pub async fn global_state(&self) -> SyncResult<GlobalSyncState> {
        let mut global = self.tracker.global_state().await?;
        global.in_progress = self.is_syncing();
        Ok(global)
    }

    /// Entries waiting for a user decision
    pub async fn conflict_records(&self) -> SyncResult<Vec<ConflictRecord>> {
        Ok(self.tracker.conflict_records().await?)
    }

    /// Entries modified since the last committed pass
    pub async fn modified_since_last_sync(&self) -> SyncResult<Vec<LocalSnapshot>> {
        Ok(self.tracker.modified_since_last_sync().await?)
    }

    /// Record the user's decision on a conflicted entry; takes effect on the next pass
    pub async fn resolve_conflict(&self, id: &EntryId, resolution: Resolution) -> SyncResult<()> {
        Ok(self.store.resolve_conflict(id, resolution).await?)
    }

    /// Run one full pass.
    pub async fn synchronize(&self) -> SyncOutcome {
        let Ok(global) = self.global.try_lock() else {
            tracing::debug!("Sync pass already running; trigger dropped");
            return SyncOutcome::Skipped;
        };
        let cancel = self.cancel_scope();
        let mut pass = PassGuard::begin(global, &self.progress);

        let result = tokio::time::timeout(self.timeouts.pass, self.run_pass(&mut pass, &cancel))
            .await
            .unwrap_or_else(|_| Err(SyncError::Timeout("sync pass".to_string())));

        match result {
            Ok((report, failed)) => {
                pass.finish();
                tracing::info!(
                    "Sync pass done: {} pulled, {} pushed, {} applied, {} conflicts, {} deleted remotely",
                    report.pulled,
                    report.pushed,
                    report.applied,
                    report.conflicts,
                    report.deleted_remotely
                );
                if failed.is_empty() {
                    SyncOutcome::Success(report)
                } else {
                    tracing::warn!("{} entries were refused by the remote", failed.len());
                    SyncOutcome::PartialFailure { report, failed }
                }
            }
            Err(error) => {
                if error.disables_sync() {
                    self.auth_blocked.store(true, Ordering::SeqCst);
                }
                if error.is_transient() {
                    tracing::warn!("Sync pass aborted: {}", error);
                } else {
                    tracing::error!("Sync pass failed: {}", error);
                }
                SyncOutcome::Fatal(error)
            }
        }
    }

    async fn run_pass(
        &self,
        pass: &mut PassGuard<'_>,
        cancel: &CancellationToken,
    ) -> SyncResult<(SyncReport, Vec<RecordFailure>)> {
        let loaded = self.tracker.global_state().await?;
        pass.global.last_sync_timestamp = loaded.last_sync_timestamp;
        pass.global.device_id = loaded.device_id;

        let since = pass.global.last_sync_timestamp;
        let mut report = SyncReport {
            started_at: now_millis(),
            ..SyncReport::default()
        };

        pass.phase(SyncPhase::Pulling);
        let pull_since = since.saturating_sub(PULL_OVERLAP_MS).max(0);
        let pulled = self
            .call(cancel, "pull", self.remote.list_modified_since(pull_since))
            .await??;
        report.pulled = pulled.len();
        tracing::debug!(
            "Pulled {} remote records modified since {}",
            pulled.len(),
            pull_since
        );

        pass.phase(SyncPhase::Diffing);
        let pairs = self.pair(since, pulled).await?;

        pass.phase(SyncPhase::Resolving);
        let mut plan = Plan::default();
        for pair in pairs {
            self.plan(pair, &mut plan).await?;
        }

        pass.phase(SyncPhase::Pushing);
        let failed = self.execute(plan, pass, cancel, &mut report).await?;

        pass.phase(SyncPhase::Committing);
        if report.changed_anything() {
            self.tracker.commit(report.started_at).await?;
            pass.global.last_sync_timestamp = report.started_at;
        }

        Ok((report, failed))
    }

    /// Pair every id seen on either side with its local snapshot and pulled record
    async fn pair(&self, since: i64, pulled: Vec<RemoteRecord>) -> SyncResult<Vec<Pair>> {
        let mut locals: BTreeMap<EntryId, LocalSnapshot> = self
            .tracker
            .modified_since(since)
            .await?
            .into_iter()
            .map(|snapshot| (snapshot.entry.id, snapshot))
            .collect();

        let mut pairs = Vec::with_capacity(pulled.len() + locals.len());
        for remote in pulled {
            let local = match locals.remove(&remote.id) {
                Some(local) => Some(local),
                None => self.store.snapshot(&remote.id).await?,
            };
            pairs.push(Pair {
                local,
                remote: Some(remote),
            });
        }
        pairs.extend(locals.into_values().map(|local| Pair {
            local: Some(local),
            remote: None,
        }));

        Ok(pairs)
    }

    async fn plan(&self, pair: Pair, plan: &mut Plan) -> SyncResult<()> {
        match (pair.local, pair.remote) {
            (Some(local), Some(remote)) => {
                let decision = resolve(&local, &remote);
                tracing::debug!("Entry {} resolved as {:?}", local.entry.id, decision);
                match decision {
                    Decision::KeepLocal => {
                        if local.state.is_dirty() {
                            plan.to_push.push(local);
                        }
                    }
                    Decision::KeepRemote => {
                        let remote = self.freshest_remote(&local, remote.into_entry()).await?;
                        plan.to_apply.push(Apply {
                            remote,
                            expected_version: Some(local.state.local_version),
                        });
                    }
                    Decision::Conflict if is_own_write(&local, &remote) => {
                        tracing::debug!(
                            "Entry {} already holds this device's push; acknowledging",
                            local.entry.id
                        );
                        plan.to_acknowledge.push(Acknowledge {
                            remote_updated_at: remote.updated_at,
                            local,
                        });
                    }
                    Decision::Conflict => {
                        let remote = remote.into_entry();
                        let already_shadowed = local.state.status == SyncStatus::Conflict
                            && self.store.shadow(&local.entry.id).await?.as_ref() == Some(&remote);
                        if !already_shadowed {
                            plan.to_flag.push(remote);
                        }
                    }
                }
            }
            (Some(local), None) => match local.state.status {
                SyncStatus::Conflict => {}
                SyncStatus::PendingPull => {
                    if let Some(shadow) = self.store.shadow(&local.entry.id).await? {
                        plan.to_apply.push(Apply {
                            remote: shadow,
                            expected_version: Some(local.state.local_version),
                        });
                    }
                }
                SyncStatus::Synced | SyncStatus::PendingPush => {
                    if local.state.is_dirty() {
                        plan.to_push.push(local);
                    }
                }
            },
            (None, Some(remote)) => {
                // A tombstone for an entry this device never had
                if !remote.deleted {
                    plan.to_apply.push(Apply {
                        remote: remote.into_entry(),
                        expected_version: None,
                    });
                }
            }
            (None, None) => {}
        }
        Ok(())
    }

    /// For an entry released to the remote side, prefer the newer of shadow and pulled copy
    async fn freshest_remote(&self, local: &LocalSnapshot, pulled: Entry) -> SyncResult<Entry> {
        if local.state.status != SyncStatus::PendingPull {
            return Ok(pulled);
        }
        Ok(match self.store.shadow(&local.entry.id).await? {
            Some(shadow) if shadow.updated_at > pulled.updated_at => shadow,
            _ => pulled,
        })
    }

    async fn execute(
        &self,
        plan: Plan,
        pass: &PassGuard<'_>,
        cancel: &CancellationToken,
        report: &mut SyncReport,
    ) -> SyncResult<Vec<RecordFailure>> {
        let total = plan.len();
        let mut current = 0;
        pass.advance(current, total);

        for apply in plan.to_apply {
            let id = apply.remote.id;
            match self
                .store
                .apply_synced(&apply.remote, apply.expected_version)
                .await?
            {
                ApplyOutcome::Applied if apply.remote.is_deleted => report.deleted_remotely += 1,
                ApplyOutcome::Applied => report.applied += 1,
                ApplyOutcome::ConflictDetected => {
                    tracing::warn!("Entry {} changed during sync; flagged as conflict", id);
                    report.conflicts += 1;
                }
            }
            current += 1;
            pass.advance(current, total);
        }

        for ack in plan.to_acknowledge {
            let outcome = self
                .store
                .mark_pushed(
                    &ack.local.entry.id,
                    ack.local.state.local_version,
                    ack.remote_updated_at,
                )
                .await?;
            tracing::debug!("Entry {} acknowledged: {:?}", ack.local.entry.id, outcome);
            report.pushed += 1;
            current += 1;
            pass.advance(current, total);
        }

        for remote in plan.to_flag {
            self.store.flag_conflict(&remote.id, &remote).await?;
            tracing::debug!("Entry {} flagged as conflict", remote.id);
            report.conflicts += 1;
            current += 1;
            pass.advance(current, total);
        }

        let mut failed = Vec::new();
        for local in plan.to_push {
            let id = local.entry.id;
            match self.push(&local, cancel).await {
                Ok(ack) => {
                    tracing::debug!("Entry {} pushed: {:?}", id, ack);
                    report.pushed += 1;
                }
                Err(SyncError::Validation { id, message }) => {
                    tracing::warn!("Remote refused entry {}: {}", id, message);
                    failed.push(RecordFailure { id, message });
                }
                Err(error) => return Err(error),
            }
            current += 1;
            pass.advance(current, total);
        }

        Ok(failed)
    }

    async fn push(&self, local: &LocalSnapshot, cancel: &CancellationToken) -> SyncResult<PushAck> {
        let id = local.entry.id;
        let remote_updated_at = if local.entry.is_deleted {
            self.call(cancel, "delete", self.remote.delete(&id))
                .await?
                .map_err(|error| SyncError::from_remote(error, id))?;
            local.entry.updated_at
        } else {
            let record = RemoteRecord::from(&local.entry);
            self.call(cancel, "push", self.remote.create_or_update(&record))
                .await?
                .map_err(|error| SyncError::from_remote(error, id))?
                .updated_at
        };

        Ok(self
            .store
            .mark_pushed(&id, local.state.local_version, remote_updated_at)
            .await?)
    }

    /// Run a remote call under the request timeout, unwinding on cancellation
    async fn call<T>(
        &self,
        cancel: &CancellationToken,
        operation: &str,
        request: impl Future<Output = RemoteResult<T>> + Send,
    ) -> SyncResult<RemoteResult<T>> {
        tokio::select! {
            biased;
            () = cancel.cancelled() => Err(SyncError::Cancelled),
            response = tokio::time::timeout(self.timeouts.request, request) => {
                response.map_err(|_| SyncError::Timeout(operation.to_string()))
            }
        }
    }
}

/// The pulled record is this device's unacknowledged push of the current local copy.
///
/// The remote may restamp `updated_at`, so only the content is compared.
fn is_own_write(local: &LocalSnapshot, remote: &RemoteRecord) -> bool {
    local.state.status == SyncStatus::PendingPush
        && RemoteRecord {
            updated_at: remote.updated_at,
            ..RemoteRecord::from(&local.entry)
        } == *remote
}
