//! Background sync loop driven by interval, network restore and manual triggers.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{watch, Notify};
use tokio::task::JoinHandle;
use tokio::time::{sleep_until, Instant};
use tokio_util::sync::CancellationToken;

use super::coordinator::{SyncCoordinator, SyncOutcome};
use crate::models::SyncPolicy;
use crate::services::LocalStore;

/// Connectivity as reported by the host platform
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NetworkState {
    pub connected: bool,
    pub on_wifi: bool,
}

impl NetworkState {
    pub const fn allows(self, policy: &SyncPolicy) -> bool {
        self.connected && (self.on_wifi || !policy.wifi_only)
    }
}

/// Retry spacing after failed passes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Backoff {
    /// Lower bound for the delay after a failure
    pub retry_base: Duration,
    /// Upper bound for any delay
    pub max: Duration,
}

impl Default for Backoff {
    fn default() -> Self {
        Self {
            retry_base: Duration::from_secs(30),
            max: Duration::from_secs(3600),
        }
    }
}

impl Backoff {
    /// Delay before the next tick given `failures` consecutive failed passes
    pub fn delay(&self, interval: Duration, failures: u32) -> Duration {
        if failures == 0 {
            return interval.min(self.max);
        }
        let base = interval.max(self.retry_base);
        let factor = 2_u32.saturating_pow(failures.min(16));
        base.saturating_mul(factor).min(self.max)
    }
}

/// Handle to a running scheduler
pub struct SchedulerHandle {
    trigger: Arc<Notify>,
    shutdown: CancellationToken,
    task: JoinHandle<()>,
}

impl SchedulerHandle {
    /// Request a pass now; dropped if a pass is already running
    pub fn trigger(&self) {
        self.trigger.notify_one();
    }

    /// Stop the loop, cancelling a running pass, and wait for it to exit
    pub async fn shutdown(self) {
        self.shutdown.cancel();
        if let Err(error) = self.task.await {
            tracing::error!("Sync scheduler task failed: {}", error);
        }
    }
}

/// Why a tick did not run a pass, or how the pass ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TickResult {
    Disabled,
    NetworkNotAllowed,
    Unauthorized,
    Skipped,
    Succeeded,
    Failed,
}

pub struct SyncScheduler {
    coordinator: Arc<SyncCoordinator>,
    store: LocalStore,
    network: watch::Receiver<NetworkState>,
    backoff: Backoff,
    trigger: Arc<Notify>,
    shutdown: CancellationToken,
    failures: u32,
    /// Credentials have validated at least once since start
    activated: bool,
}

impl SyncScheduler {
    /// Start the loop on the current runtime.
    pub fn spawn(
        coordinator: Arc<SyncCoordinator>,
        store: LocalStore,
        network: watch::Receiver<NetworkState>,
        backoff: Backoff,
    ) -> SchedulerHandle {
        let trigger = Arc::new(Notify::new());
        let shutdown = CancellationToken::new();
        let scheduler = Self {
            coordinator,
            store,
            network,
            backoff,
            trigger: trigger.clone(),
            shutdown: shutdown.clone(),
            failures: 0,
            activated: false,
        };
        let task = tokio::spawn(scheduler.run());
        SchedulerHandle {
            trigger,
            shutdown,
            task,
        }
    }

    async fn load_policy(&self) -> SyncPolicy {
        match self.store.load_policy().await {
            Ok(policy) => policy,
            Err(error) => {
                tracing::warn!("Failed to load sync policy, using defaults: {}", error);
                SyncPolicy::default()
            }
        }
    }

    async fn run(mut self) {
        tracing::info!("Sync scheduler started");
        let shutdown = self.shutdown.clone();
        let trigger = self.trigger.clone();
        let mut connected = self.network.borrow().connected;
        let mut network_open = true;
        let mut deadline = Instant::now();

        loop {
            tokio::select! {
                () = shutdown.cancelled() => break,
                () = sleep_until(deadline) => {}
                () = trigger.notified() => {
                    tracing::debug!("Manual sync requested");
                }
                changed = self.network.changed(), if network_open => {
                    if changed.is_err() {
                        network_open = false;
                        continue;
                    }
                    let now_connected = self.network.borrow_and_update().connected;
                    let restored = now_connected && !connected;
                    connected = now_connected;
                    if !restored {
                        continue;
                    }
                    tracing::debug!("Network restored");
                }
            }

            let result = tokio::select! {
                () = shutdown.cancelled() => break,
                result = self.tick() => result,
            };
            tracing::debug!("Sync tick finished: {:?}", result);

            // Requests that arrived mid-pass are not replayed
            tokio::select! {
                biased;
                () = trigger.notified() => {
                    tracing::debug!("Dropping sync request received during the pass");
                }
                () = std::future::ready(()) => {}
            }
            if network_open {
                connected = self.network.borrow_and_update().connected;
            }

            let policy = self.load_policy().await;
            deadline = Instant::now() + self.backoff.delay(policy.interval(), self.failures);
        }

        self.coordinator.cancel();
        tracing::info!("Sync scheduler stopped");
    }

    async fn tick(&mut self) -> TickResult {
        // Re-read every tick so preference changes apply without a restart
        let policy = self.load_policy().await;
        if !policy.sync_enabled {
            return TickResult::Disabled;
        }
        if !self.network.borrow().allows(&policy) {
            return TickResult::NetworkNotAllowed;
        }
        if self.coordinator.is_syncing() {
            return TickResult::Skipped;
        }

        if !self.activated || self.coordinator.is_auth_blocked() {
            match self.coordinator.authorize().await {
                Ok(true) => self.activated = true,
                Ok(false) => return TickResult::Unauthorized,
                Err(error) => {
                    tracing::warn!("Could not validate credentials: {}", error);
                    self.failures = self.failures.saturating_add(1);
                    return TickResult::Failed;
                }
            }
        }

        match self.coordinator.synchronize().await {
            SyncOutcome::Success(_) | SyncOutcome::PartialFailure { .. } => {
                self.failures = 0;
                TickResult::Succeeded
            }
            SyncOutcome::Fatal(error) if error.disables_sync() => TickResult::Unauthorized,
            SyncOutcome::Fatal(_) => {
                self.failures = self.failures.saturating_add(1);
                TickResult::Failed
            }
            SyncOutcome::Skipped => TickResult::Skipped,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{EntryDraft, EntryId, SyncStatus};
    use crate::sync::memory::InMemoryRemote;
    use crate::sync::{RemoteClient, RemoteRecord, RemoteResult, SyncTimeouts};
    use async_trait::async_trait;
    use pretty_assertions::assert_eq;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Counts pull requests so tests can tell how many passes ran
    struct CountingRemote {
        inner: InMemoryRemote,
        listings: AtomicUsize,
    }

    #[async_trait]
    impl RemoteClient for CountingRemote {
        async fn list_modified_since(&self, timestamp: i64) -> RemoteResult<Vec<RemoteRecord>> {
            self.listings.fetch_add(1, Ordering::SeqCst);
            self.inner.list_modified_since(timestamp).await
        }

        async fn create_or_update(&self, record: &RemoteRecord) -> RemoteResult<RemoteRecord> {
            self.inner.create_or_update(record).await
        }

        async fn delete(&self, id: &EntryId) -> RemoteResult<()> {
            self.inner.delete(id).await
        }

        async fn validate_token(&self) -> RemoteResult<bool> {
            self.inner.validate_token().await
        }
    }

    async fn wait_for_status(store: &LocalStore, id: &EntryId, status: SyncStatus) {
        tokio::time::timeout(Duration::from_secs(5), async {
            loop {
                let current = store.snapshot(id).await.unwrap().map(|s| s.state.status);
                if current == Some(status) {
                    break;
                }
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .unwrap();
    }

    async fn setup() -> (LocalStore, InMemoryRemote, Arc<SyncCoordinator>) {
        let store = LocalStore::open_in_memory().await.unwrap();
        let remote = InMemoryRemote::new();
        let coordinator = Arc::new(SyncCoordinator::new(
            store.clone(),
            Arc::new(remote.clone()),
            SyncTimeouts::default(),
        ));
        (store, remote, coordinator)
    }

    const ONLINE: NetworkState = NetworkState {
        connected: true,
        on_wifi: true,
    };

    #[test]
    fn backoff_doubles_and_caps() {
        let backoff = Backoff {
            retry_base: Duration::from_secs(30),
            max: Duration::from_secs(3600),
        };
        let interval = Duration::from_secs(15 * 60);

        assert_eq!(backoff.delay(interval, 0), interval);
        assert_eq!(backoff.delay(interval, 1), Duration::from_secs(30 * 60));
        assert_eq!(backoff.delay(interval, 2), Duration::from_secs(3600));
        assert_eq!(backoff.delay(interval, 40), Duration::from_secs(3600));
        assert_eq!(
            backoff.delay(Duration::from_secs(5), 1),
            Duration::from_secs(60)
        );
    }

    #[test]
    fn network_policy_respects_wifi_only() {
        let wifi_only = SyncPolicy {
            wifi_only: true,
            ..SyncPolicy::default()
        };
        let cellular = NetworkState {
            connected: true,
            on_wifi: false,
        };
        assert!(cellular.allows(&SyncPolicy::default()));
        assert!(!cellular.allows(&wifi_only));
        assert!(ONLINE.allows(&wifi_only));
        assert!(!NetworkState {
            connected: false,
            on_wifi: true
        }
        .allows(&SyncPolicy::default()));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn first_tick_syncs_pending_entries() {
        let (store, remote, coordinator) = setup().await;
        let entry = store.create_entry(EntryDraft::new("scheduled")).await.unwrap();
        let (_network_tx, network) = watch::channel(ONLINE);

        let handle = SyncScheduler::spawn(coordinator, store.clone(), network, Backoff::default());
        wait_for_status(&store, &entry.id, SyncStatus::Synced).await;
        assert!(remote.get(&entry.id).is_some());

        handle.shutdown().await;
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn network_restore_triggers_pass() {
        let (store, remote, coordinator) = setup().await;
        let (network_tx, network) = watch::channel(NetworkState {
            connected: false,
            on_wifi: false,
        });
        let handle = SyncScheduler::spawn(coordinator, store.clone(), network, Backoff::default());

        let entry = store.create_entry(EntryDraft::new("written offline")).await.unwrap();
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(remote.get(&entry.id).is_none());

        network_tx.send_replace(ONLINE);
        wait_for_status(&store, &entry.id, SyncStatus::Synced).await;

        handle.shutdown().await;
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn disabled_policy_skips_manual_trigger() {
        let (store, remote, coordinator) = setup().await;
        store
            .save_policy(&SyncPolicy {
                sync_enabled: false,
                ..SyncPolicy::default()
            })
            .await
            .unwrap();
        let entry = store.create_entry(EntryDraft::new("stays local")).await.unwrap();
        let (_network_tx, network) = watch::channel(ONLINE);

        let handle = SyncScheduler::spawn(coordinator, store.clone(), network, Backoff::default());
        handle.trigger();
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(remote.get(&entry.id).is_none());

        store.save_policy(&SyncPolicy::default()).await.unwrap();
        handle.trigger();
        wait_for_status(&store, &entry.id, SyncStatus::Synced).await;

        handle.shutdown().await;
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn revoked_token_gates_activation() {
        let (store, remote, coordinator) = setup().await;
        remote.set_auth_revoked(true);
        let entry = store.create_entry(EntryDraft::new("waiting")).await.unwrap();
        let (_network_tx, network) = watch::channel(ONLINE);

        let handle = SyncScheduler::spawn(
            coordinator.clone(),
            store.clone(),
            network,
            Backoff::default(),
        );
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(coordinator.is_auth_blocked());
        assert_eq!(remote.write_count(), 0);

        remote.heal();
        handle.trigger();
        wait_for_status(&store, &entry.id, SyncStatus::Synced).await;
        assert!(!coordinator.is_auth_blocked());

        handle.shutdown().await;
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn trigger_during_pass_is_dropped() {
        let store = LocalStore::open_in_memory().await.unwrap();
        let inner = InMemoryRemote::new();
        let remote = Arc::new(CountingRemote {
            inner: inner.clone(),
            listings: AtomicUsize::new(0),
        });
        let coordinator = Arc::new(SyncCoordinator::new(
            store.clone(),
            remote.clone(),
            SyncTimeouts::default(),
        ));
        let entry = store.create_entry(EntryDraft::new("slow push")).await.unwrap();
        let gate = inner.gate_next_push();
        let (_network_tx, network) = watch::channel(ONLINE);

        let handle = SyncScheduler::spawn(coordinator, store.clone(), network, Backoff::default());
        tokio::time::timeout(Duration::from_secs(5), gate.entered())
            .await
            .unwrap();
        handle.trigger();
        handle.trigger();
        gate.release();

        wait_for_status(&store, &entry.id, SyncStatus::Synced).await;
        tokio::time::sleep(Duration::from_millis(300)).await;
        assert_eq!(remote.listings.load(Ordering::SeqCst), 1);

        handle.trigger();
        tokio::time::timeout(Duration::from_secs(5), async {
            while remote.listings.load(Ordering::SeqCst) < 2 {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .unwrap();

        handle.shutdown().await;
    }
}
