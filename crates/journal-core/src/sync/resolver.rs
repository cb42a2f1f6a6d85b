//! Conflict resolution between a local entry and its remote counterpart

use super::remote::RemoteRecord;
use crate::models::{LocalSnapshot, SyncStatus};

/// What a pass should do with one entry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    /// The remote has not changed since the last agreement; push the local copy
    KeepLocal,
    /// Only the remote changed; apply it locally
    KeepRemote,
    /// Both sides changed; keep the remote as a shadow copy and ask the user
    Conflict,
}

/// Decide between a local entry and the remote copy pulled for the same id.
///
/// Auto-resolves only when exactly one side changed since `last_synced_at`.
/// An entry already awaiting a user decision stays in conflict, and one the
/// user released to the remote side always takes the remote copy.
#[must_use]
pub fn resolve(local: &LocalSnapshot, remote: &RemoteRecord) -> Decision {
    match local.state.status {
        SyncStatus::Conflict => return Decision::Conflict,
        SyncStatus::PendingPull => return Decision::KeepRemote,
        SyncStatus::Synced | SyncStatus::PendingPush => {}
    }

    if remote.updated_at <= local.state.last_synced_at {
        Decision::KeepLocal
    } else if !local.state.is_dirty() {
        Decision::KeepRemote
    } else {
        Decision::Conflict
    }
}
