//! In-process remote service for tests and offline demos.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use tokio::sync::Notify;

use super::error::{RemoteError, RemoteResult};
use super::remote::{RemoteClient, RemoteRecord};
use crate::models::EntryId;
use crate::util::now_millis;

#[derive(Debug, Clone)]
struct StoredRecord {
    record: RemoteRecord,
    /// Server clock at the last write; drives `list_modified_since`
    modified_at: i64,
}

#[derive(Debug, Default)]
struct RemoteState {
    records: BTreeMap<EntryId, StoredRecord>,
    clock: i64,
    offline: bool,
    auth_revoked: bool,
    rejected: HashMap<EntryId, String>,
    fail_after_writes: Option<(usize, RemoteError)>,
    writes: usize,
    gate: Option<PushGate>,
}

impl RemoteState {
    fn tick(&mut self) -> i64 {
        self.clock = now_millis().max(self.clock + 1);
        self.clock
    }

    fn check_reachable(&self) -> RemoteResult<()> {
        if self.offline {
            return Err(RemoteError::Network("remote unreachable".to_string()));
        }
        if self.auth_revoked {
            return Err(RemoteError::Auth("token revoked".to_string()));
        }
        Ok(())
    }

    fn check_write(&mut self, id: &EntryId) -> RemoteResult<()> {
        self.check_reachable()?;
        if let Some((limit, error)) = &self.fail_after_writes {
            if self.writes >= *limit {
                return Err(error.clone());
            }
        }
        if let Some(message) = self.rejected.get(id) {
            return Err(RemoteError::Validation(message.clone()));
        }
        self.writes += 1;
        Ok(())
    }
}

/// Pauses the next push until released.
#[derive(Debug, Clone, Default)]
pub struct PushGate {
    entered: Arc<Notify>,
    release: Arc<Notify>,
}

impl PushGate {
    /// Wait until a push reaches the gate
    pub async fn entered(&self) {
        self.entered.notified().await;
    }

    /// Let the paused push continue
    pub fn release(&self) {
        self.release.notify_one();
    }
}

/// Remote service held in memory, with fault injection.
///
/// Records keep the `updated_at` the client sent; listing filters on a
/// separate server-side modification clock.
#[derive(Debug, Clone, Default)]
pub struct InMemoryRemote {
    state: Arc<Mutex<RemoteState>>,
}

impl InMemoryRemote {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, RemoteState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Store a record as if another device had written it
    pub fn seed(&self, record: RemoteRecord) {
        let mut state = self.state();
        let modified_at = state.tick();
        state
            .records
            .insert(record.id, StoredRecord { record, modified_at });
    }

    /// Current remote copy, tombstones included
    pub fn get(&self, id: &EntryId) -> Option<RemoteRecord> {
        self.state()
            .records
            .get(id)
            .map(|stored| stored.record.clone())
    }

    /// All remote copies, tombstones included
    pub fn records(&self) -> Vec<RemoteRecord> {
        self.state()
            .records
            .values()
            .map(|stored| stored.record.clone())
            .collect()
    }

    /// Number of accepted writes (updates and deletes)
    pub fn write_count(&self) -> usize {
        self.state().writes
    }

    /// Fail every call with a network error
    pub fn set_offline(&self, offline: bool) {
        self.state().offline = offline;
    }

    /// Fail every call with an auth error
    pub fn set_auth_revoked(&self, revoked: bool) {
        self.state().auth_revoked = revoked;
    }

    /// Refuse writes for one record with a validation error
    pub fn reject(&self, id: EntryId, message: impl Into<String>) {
        self.state().rejected.insert(id, message.into());
    }

    /// Accept `writes` more writes, then fail the rest with `error`
    pub fn fail_after_writes(&self, writes: usize, error: RemoteError) {
        let mut state = self.state();
        let limit = state.writes + writes;
        state.fail_after_writes = Some((limit, error));
    }

    /// Clear all injected faults
    pub fn heal(&self) {
        let mut state = self.state();
        state.offline = false;
        state.auth_revoked = false;
        state.rejected.clear();
        state.fail_after_writes = None;
    }

    /// Pause the next `create_or_update` until the returned gate is released
    pub fn gate_next_push(&self) -> PushGate {
        let gate = PushGate::default();
        self.state().gate = Some(gate.clone());
        gate
    }
}

#[async_trait]
impl RemoteClient for InMemoryRemote {
    async fn list_modified_since(&self, timestamp: i64) -> RemoteResult<Vec<RemoteRecord>> {
        let state = self.state();
        state.check_reachable()?;
        Ok(state
            .records
            .values()
            .filter(|stored| stored.modified_at > timestamp)
            .map(|stored| stored.record.clone())
            .collect())
    }

    async fn create_or_update(&self, record: &RemoteRecord) -> RemoteResult<RemoteRecord> {
        let gate = self.state().gate.take();
        if let Some(gate) = gate {
            gate.entered.notify_one();
            gate.release.notified().await;
        }

        let mut state = self.state();
        state.check_write(&record.id)?;
        let modified_at = state.tick();
        let stored = StoredRecord {
            record: record.clone(),
            modified_at,
        };
        state.records.insert(record.id, stored);
        Ok(record.clone())
    }

    async fn delete(&self, id: &EntryId) -> RemoteResult<()> {
        let mut state = self.state();
        state.check_write(id)?;
        let modified_at = state.tick();
        if let Some(stored) = state.records.get_mut(id) {
            if !stored.record.deleted {
                stored.record.deleted = true;
                stored.record.updated_at = stored.record.updated_at.max(modified_at);
                stored.modified_at = modified_at;
            }
        }
        Ok(())
    }

    async fn validate_token(&self) -> RemoteResult<bool> {
        let state = self.state();
        if state.offline {
            return Err(RemoteError::Network("remote unreachable".to_string()));
        }
        Ok(!state.auth_revoked)
    }
}
