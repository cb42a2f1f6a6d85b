//! Per-entry and process-wide sync metadata

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use super::Entry;

/// Coordination status of a single entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SyncStatus {
    /// Local and remote agree
    #[default]
    Synced,
    /// Local edits have not been pushed yet
    PendingPush,
    /// The user chose the remote copy; the next pass applies it
    PendingPull,
    /// Both sides changed; waiting for a user decision
    Conflict,
}

impl SyncStatus {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Synced => "synced",
            Self::PendingPush => "pending_push",
            Self::PendingPull => "pending_pull",
            Self::Conflict => "conflict",
        }
    }
}

impl fmt::Display for SyncStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SyncStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "synced" => Ok(Self::Synced),
            "pending_push" => Ok(Self::PendingPush),
            "pending_pull" => Ok(Self::PendingPull),
            "conflict" => Ok(Self::Conflict),
            other => Err(format!("unknown sync status '{other}'")),
        }
    }
}

/// Sync bookkeeping stored alongside every entry.
///
/// `status == Synced` holds exactly when `local_version == last_synced_version`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct SyncState {
    /// Incremented on every write to the entry
    pub local_version: i64,
    /// `local_version` at the last push/pull agreement
    pub last_synced_version: i64,
    /// Remote `updated_at` at the last agreement (Unix ms), 0 when never synced
    pub last_synced_at: i64,
    pub status: SyncStatus,
}

impl SyncState {
    /// Whether the entry has local changes the remote has not seen
    pub const fn is_dirty(&self) -> bool {
        self.local_version != self.last_synced_version
    }
}

/// An entry together with its sync bookkeeping, tombstones included
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalSnapshot {
    pub entry: Entry,
    pub state: SyncState,
}

/// Process-wide sync state.
///
/// `device_id` is generated once per install and never changes.
/// `in_progress` is process-local and never persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GlobalSyncState {
    /// Start time of the last pass that committed (Unix ms), 0 before the first
    pub last_sync_timestamp: i64,
    pub device_id: String,
    #[serde(skip)]
    pub in_progress: bool,
}
