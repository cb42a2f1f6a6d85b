use std::io;

use journal_core::sync::SyncError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CliError {
    #[error(transparent)]
    Core(#[from] journal_core::Error),
    #[error(transparent)]
    Sync(#[from] SyncError),
    #[error(transparent)]
    Io(#[from] io::Error),
    #[error(transparent)]
    Serialization(#[from] serde_json::Error),
    #[error("No entry text provided")]
    EmptyContent,
    #[error("Entry ID cannot be empty")]
    EmptyEntryId,
    #[error("Entry not found for id/prefix: {0}")]
    EntryNotFound(String),
    #[error("{0}")]
    AmbiguousEntryId(String),
    #[error("Entry {0} is not in conflict")]
    NotConflicted(String),
    #[error("Could not resolve the {0} directory")]
    MissingDirectory(&'static str),
    #[error(
        "Sync is not configured. Set base_url and auth_token in the config file, or JOURNAL_REMOTE_URL and JOURNAL_AUTH_TOKEN."
    )]
    SyncNotConfigured,
}
