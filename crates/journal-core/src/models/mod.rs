//! Data models for Journal

mod conflict;
mod entry;
mod settings;
mod sync_state;

pub use conflict::{ConflictRecord, Resolution};
pub use entry::{Entry, EntryDraft, EntryId};
pub use settings::{SyncPolicy, MIN_SYNC_INTERVAL_MINUTES};
pub use sync_state::{GlobalSyncState, LocalSnapshot, SyncState, SyncStatus};
