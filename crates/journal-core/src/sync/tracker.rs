//! Sync metadata tracking: dirty entries and global sync state

use crate::models::{ConflictRecord, GlobalSyncState, LocalSnapshot};
use crate::services::LocalStore;
use crate::Result;

/// Derives what changed since the last committed pass.
#[derive(Clone)]
pub struct SyncTracker {
    store: LocalStore,
}

impl SyncTracker {
    pub const fn new(store: LocalStore) -> Self {
        Self { store }
    }

    /// Global state as last committed
    pub async fn global_state(&self) -> Result<GlobalSyncState> {
        self.store.load_global_state().await
    }

    /// Entries that are unsynced or changed after `timestamp`
    pub async fn modified_since(&self, timestamp: i64) -> Result<Vec<LocalSnapshot>> {
        self.store.dirty_since(timestamp).await
    }

    /// Entries modified since the last committed pass
    pub async fn modified_since_last_sync(&self) -> Result<Vec<LocalSnapshot>> {
        let global = self.global_state().await?;
        self.modified_since(global.last_sync_timestamp).await
    }

    /// Entries waiting for a user decision
    pub async fn conflict_records(&self) -> Result<Vec<ConflictRecord>> {
        self.store.conflicted().await
    }

    /// Record that a pass starting at `started_at` committed
    pub async fn commit(&self, started_at: i64) -> Result<()> {
        tracing::debug!("Advancing last sync timestamp to {}", started_at);
        self.store.save_last_sync_timestamp(started_at).await
    }
}
