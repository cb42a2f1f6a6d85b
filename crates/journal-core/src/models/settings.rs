//! Sync policy settings model

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Smallest interval the scheduler accepts
pub const MIN_SYNC_INTERVAL_MINUTES: u32 = 1;

/// User preferences that govern background sync
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncPolicy {
    /// Master switch for background and manual sync
    pub sync_enabled: bool,
    /// Minutes between scheduled passes
    pub sync_interval_minutes: u32,
    /// Only sync while connected to Wi-Fi
    pub wifi_only: bool,
}

impl SyncPolicy {
    /// Scheduled interval, clamped to the minimum
    pub fn interval(&self) -> Duration {
        let minutes = self.sync_interval_minutes.max(MIN_SYNC_INTERVAL_MINUTES);
        Duration::from_secs(u64::from(minutes) * 60)
    }
}

impl Default for SyncPolicy {
    fn default() -> Self {
        Self {
            sync_enabled: true,
            sync_interval_minutes: 15,
            wifi_only: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_policy_default() {
        let policy = SyncPolicy::default();
        assert!(policy.sync_enabled);
        assert_eq!(policy.sync_interval_minutes, 15);
        assert!(!policy.wifi_only);
    }

    #[test]
    fn test_interval_is_clamped() {
        let policy = SyncPolicy {
            sync_interval_minutes: 0,
            ..SyncPolicy::default()
        };
        assert_eq!(policy.interval(), Duration::from_secs(60));
    }
}
