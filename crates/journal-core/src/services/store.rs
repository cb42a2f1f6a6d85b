//! Local store service shared by the sync engine and clients.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::sync::Mutex;

use crate::db::{
    ApplyOutcome, Database, EntryRepository, PushAck, SettingsRepository, SqliteEntryRepository,
    SqliteSettingsRepository, WriteOrigin,
};
use crate::models::{
    ConflictRecord, Entry, EntryDraft, EntryId, GlobalSyncState, LocalSnapshot, Resolution,
    SyncPolicy, SyncState,
};
use crate::Result;

/// Thread-safe durable store for entries and their sync metadata.
///
/// Every operation holds the store lock for its whole duration, so user edits
/// and sync-originated writes never interleave on the same entry.
#[derive(Clone)]
pub struct LocalStore {
    db: Arc<Mutex<Database>>,
    db_path: Option<PathBuf>,
    device_id: Arc<str>,
}

impl LocalStore {
    /// Open a store at the given filesystem path.
    ///
    /// A file that is not a valid database is moved aside and a fresh store is created.
    pub async fn open_path(db_path: impl Into<PathBuf>) -> Result<Self> {
        let db_path = db_path.into();
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let db = match Database::open(&db_path) {
            Ok(db) => db,
            Err(error) if Self::is_corrupted_db_error(&error) => {
                tracing::warn!(
                    "Local store at {} is unreadable: {}. Moving it aside.",
                    db_path.display(),
                    error
                );
                Self::quarantine_corrupted_db_files(&db_path)?;
                Database::open(&db_path)?
            }
            Err(error) => return Err(error),
        };

        Self::from_database(db, Some(db_path))
    }

    /// Open an in-memory store (primarily for tests).
    pub async fn open_in_memory() -> Result<Self> {
        Self::from_database(Database::open_in_memory()?, None)
    }

    fn from_database(db: Database, db_path: Option<PathBuf>) -> Result<Self> {
        let global = SqliteSettingsRepository::new(db.connection()).load_global_state()?;
        tracing::debug!("Local store ready for device {}", global.device_id);
        Ok(Self {
            db: Arc::new(Mutex::new(db)),
            db_path,
            device_id: global.device_id.into(),
        })
    }

    fn is_corrupted_db_error(error: &crate::Error) -> bool {
        error
            .to_string()
            .to_ascii_lowercase()
            .contains("file is not a database")
    }

    fn quarantine_corrupted_db_files(db_path: &Path) -> Result<()> {
        if db_path.exists() {
            let timestamp = chrono::Utc::now().timestamp_millis();
            let base_name = db_path
                .file_name()
                .and_then(|name| name.to_str())
                .unwrap_or("journal.db");
            let backup_path = db_path.with_file_name(format!("{base_name}.corrupt-{timestamp}"));

            std::fs::rename(db_path, &backup_path)?;
            tracing::warn!(
                "Moved corrupted local DB file from {} to {}",
                db_path.display(),
                backup_path.display()
            );
        }

        for suffix in ["-wal", "-shm"] {
            let mut sidecar = db_path.as_os_str().to_owned();
            sidecar.push(suffix);
            let sidecar = PathBuf::from(sidecar);
            if sidecar.exists() {
                std::fs::remove_file(&sidecar)?;
                tracing::warn!("Removed stale local DB file {}", sidecar.display());
            }
        }

        Ok(())
    }

    async fn with_entries<T>(
        &self,
        op: impl FnOnce(&SqliteEntryRepository<'_>) -> Result<T>,
    ) -> Result<T> {
        let db = self.db.lock().await;
        let repo = SqliteEntryRepository::new(db.connection());
        op(&repo)
    }

    async fn with_settings<T>(
        &self,
        op: impl FnOnce(&SqliteSettingsRepository<'_>) -> Result<T>,
    ) -> Result<T> {
        let db = self.db.lock().await;
        let repo = SqliteSettingsRepository::new(db.connection());
        op(&repo)
    }

    /// Stable identifier of this install.
    pub fn device_id(&self) -> &str {
        &self.device_id
    }

    /// Path of the backing file, `None` for in-memory stores.
    pub fn db_path(&self) -> Option<&Path> {
        self.db_path.as_deref()
    }

    /// Create a new entry written by this device.
    pub async fn create_entry(&self, draft: EntryDraft) -> Result<Entry> {
        let device_id = self.device_id.clone();
        self.with_entries(|repo| repo.create(draft, &device_id))
            .await
    }

    /// Save a user edit; the entry becomes dirty.
    pub async fn update_entry(&self, entry: &Entry) -> Result<Entry> {
        let mut entry = entry.clone();
        entry.device_origin = self.device_id.to_string();
        self.with_entries(|repo| {
            repo.upsert(&entry, WriteOrigin::Local)?;
            repo.get(&entry.id)?
                .ok_or_else(|| crate::Error::NotFound(entry.id.to_string()))
        })
        .await
    }

    /// Write an entry with an explicit origin.
    pub async fn upsert(&self, entry: &Entry, origin: WriteOrigin) -> Result<Option<SyncState>> {
        self.with_entries(|repo| repo.upsert(entry, origin)).await
    }

    /// Fetch a live entry by id.
    pub async fn get_entry(&self, id: &EntryId) -> Result<Option<Entry>> {
        self.with_entries(|repo| repo.get(id)).await
    }

    /// Fetch an entry with its sync state, tombstones included.
    pub async fn snapshot(&self, id: &EntryId) -> Result<Option<LocalSnapshot>> {
        self.with_entries(|repo| repo.snapshot(id)).await
    }

    /// List live entries newest-first.
    pub async fn list_entries(&self, limit: usize, offset: usize) -> Result<Vec<Entry>> {
        self.with_entries(|repo| repo.list(limit, offset)).await
    }

    /// List live entry ids by prefix.
    pub async fn list_entry_ids_by_prefix(&self, prefix: &str, limit: usize) -> Result<Vec<String>> {
        self.with_entries(|repo| repo.list_ids_by_prefix(prefix, limit))
            .await
    }

    /// Delete an entry, leaving a tombstone until the deletion is acknowledged remotely.
    pub async fn delete_entry(&self, id: &EntryId) -> Result<()> {
        let device_id = self.device_id.clone();
        self.with_entries(|repo| repo.delete(id, &device_id)).await
    }

    /// Entries not synced or updated after `timestamp`.
    pub async fn dirty_since(&self, timestamp: i64) -> Result<Vec<LocalSnapshot>> {
        self.with_entries(|repo| repo.dirty_since(timestamp)).await
    }

    /// Conflicted entries with their shadow copies.
    pub async fn conflicted(&self) -> Result<Vec<ConflictRecord>> {
        self.with_entries(|repo| repo.conflicted()).await
    }

    /// Sync-originated write, re-checking the local version under the lock.
    pub async fn apply_synced(
        &self,
        remote: &Entry,
        expected_version: Option<i64>,
    ) -> Result<ApplyOutcome> {
        self.with_entries(|repo| repo.apply_synced(remote, expected_version))
            .await
    }

    /// Keep a remote copy as shadow and flag the entry as conflicted.
    pub async fn flag_conflict(&self, id: &EntryId, remote: &Entry) -> Result<()> {
        self.with_entries(|repo| repo.flag_conflict(id, remote))
            .await
    }

    /// Commit a confirmed remote write for one entry.
    pub async fn mark_pushed(
        &self,
        id: &EntryId,
        pushed_version: i64,
        remote_updated_at: i64,
    ) -> Result<PushAck> {
        self.with_entries(|repo| repo.mark_pushed(id, pushed_version, remote_updated_at))
            .await
    }

    /// Apply the user's decision on a conflicted entry.
    pub async fn resolve_conflict(&self, id: &EntryId, resolution: Resolution) -> Result<()> {
        self.with_entries(|repo| repo.resolve_conflict(id, resolution))
            .await
    }

    /// Shadow copy held for a conflicted entry.
    pub async fn shadow(&self, id: &EntryId) -> Result<Option<Entry>> {
        self.with_entries(|repo| repo.shadow(id)).await
    }

    /// Load the persisted sync policy.
    pub async fn load_policy(&self) -> Result<SyncPolicy> {
        self.with_settings(|repo| repo.load_policy()).await
    }

    /// Save the sync policy.
    pub async fn save_policy(&self, policy: &SyncPolicy) -> Result<()> {
        self.with_settings(|repo| repo.save_policy(policy)).await
    }

    /// Load global sync state.
    pub async fn load_global_state(&self) -> Result<GlobalSyncState> {
        self.with_settings(|repo| repo.load_global_state())
            .await
    }

    /// Persist the last committed sync timestamp.
    pub async fn save_last_sync_timestamp(&self, timestamp: i64) -> Result<()> {
        self.with_settings(|repo| repo.save_last_sync_timestamp(timestamp))
            .await
    }
}
