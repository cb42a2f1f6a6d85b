//! Sync progress shared with clients.

use std::fmt;

use serde::Serialize;

/// Stage of a sync pass.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncPhase {
    #[default]
    Idle,
    Pulling,
    Diffing,
    Resolving,
    Pushing,
    Committing,
    Failed,
}

impl SyncPhase {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Pulling => "pulling",
            Self::Diffing => "diffing",
            Self::Resolving => "resolving",
            Self::Pushing => "pushing",
            Self::Committing => "committing",
            Self::Failed => "failed",
        }
    }
}

impl fmt::Display for SyncPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Read-only progress signal for display.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct SyncProgress {
    pub is_syncing: bool,
    pub phase: SyncPhase,
    /// Entries handled so far in the current phase
    pub current: usize,
    pub total: usize,
}

impl SyncProgress {
    pub const fn phase(phase: SyncPhase) -> Self {
        Self {
            is_syncing: !matches!(phase, SyncPhase::Idle | SyncPhase::Failed),
            phase,
            current: 0,
            total: 0,
        }
    }
}
