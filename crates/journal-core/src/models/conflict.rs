//! Conflicted entry model

use serde::{Deserialize, Serialize};

use super::{Entry, SyncState};

/// A conflicted entry: the local primary plus the remote version it diverged from.
///
/// Both slots are kept until the user picks a side, so neither edit is lost.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConflictRecord {
    pub primary: Entry,
    pub primary_state: SyncState,
    /// Remote copy held as a shadow; `None` only if the shadow row went missing
    pub pending_remote: Option<Entry>,
}

/// User decision for a conflicted entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Resolution {
    /// Keep this device's version and push it on the next pass
    KeepLocal,
    /// Replace the local version with the remote one on the next pass
    KeepRemote,
}
