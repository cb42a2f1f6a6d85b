//! Sync error taxonomy

use thiserror::Error;

use crate::models::EntryId;

/// Failures a remote client can report
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RemoteError {
    /// Transport failure or server-side outage
    #[error("Network error: {0}")]
    Network(String),
    /// Credentials rejected
    #[error("Authentication error: {0}")]
    Auth(String),
    /// The remote refused this particular record
    #[error("Validation error: {0}")]
    Validation(String),
}

pub type RemoteResult<T> = Result<T, RemoteError>;

/// Errors surfaced by a sync pass
#[derive(Debug, Error)]
pub enum SyncError {
    /// Transient; retried on the next scheduled tick
    #[error("Network error: {0}")]
    Network(String),
    /// Fatal to the pass; sync stays disabled until the token validates again
    #[error("Authentication error: {0}")]
    Auth(String),
    /// Record-level; the record is skipped and stays pending
    #[error("Validation error for entry {id}: {message}")]
    Validation { id: EntryId, message: String },
    /// Fatal; the local data layer cannot be trusted
    #[error("Local storage error: {0}")]
    LocalStorage(#[from] crate::Error),
    /// A remote call or the whole pass ran past its deadline
    #[error("Timed out during {0}")]
    Timeout(String),
    /// The pass was cancelled before it finished
    #[error("Sync cancelled")]
    Cancelled,
}

pub type SyncResult<T> = Result<T, SyncError>;

impl SyncError {
    /// Failures worth retrying on a later tick
    pub const fn is_transient(&self) -> bool {
        matches!(self, Self::Network(_) | Self::Timeout(_) | Self::Cancelled)
    }

    /// Failures confined to one record
    pub const fn is_record_level(&self) -> bool {
        matches!(self, Self::Validation { .. })
    }

    /// Failures that keep background sync off until credentials are fixed
    pub const fn disables_sync(&self) -> bool {
        matches!(self, Self::Auth(_))
    }

    /// Attach the record a remote failure belongs to
    pub fn from_remote(error: RemoteError, id: EntryId) -> Self {
        match error {
            RemoteError::Validation(message) => Self::Validation { id, message },
            other => other.into(),
        }
    }
}

impl From<RemoteError> for SyncError {
    fn from(error: RemoteError) -> Self {
        match error {
            RemoteError::Network(message) => Self::Network(message),
            RemoteError::Auth(message) => Self::Auth(message),
            // Without a record to pin it on, a rejected request is a server problem
            RemoteError::Validation(message) => Self::Network(message),
        }
    }
}
