//! Settings repository implementation: sync policy and global sync state

use crate::error::Result;
use crate::models::{GlobalSyncState, SyncPolicy};
use rusqlite::{params, Connection, OptionalExtension};
use uuid::Uuid;

const KEY_SYNC_ENABLED: &str = "sync_enabled";
const KEY_SYNC_INTERVAL_MINUTES: &str = "sync_interval_minutes";
const KEY_WIFI_ONLY: &str = "wifi_only";
const KEY_DEVICE_ID: &str = "device_id";
const KEY_LAST_SYNC_TIMESTAMP: &str = "last_sync_timestamp";

/// Trait for settings storage operations
pub trait SettingsRepository {
    /// Load the sync policy, falling back to defaults for missing keys
    fn load_policy(&self) -> Result<SyncPolicy>;

    /// Save the sync policy
    fn save_policy(&self, policy: &SyncPolicy) -> Result<()>;

    /// Load global sync state, generating the device ID on first use
    fn load_global_state(&self) -> Result<GlobalSyncState>;

    /// Persist the last committed sync timestamp
    fn save_last_sync_timestamp(&self, timestamp: i64) -> Result<()>;
}

/// `SQLite` implementation of `SettingsRepository`
pub struct SqliteSettingsRepository<'a> {
    conn: &'a Connection,
}

impl<'a> SqliteSettingsRepository<'a> {
    /// Create a new repository with the given connection
    pub const fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }

    fn get_setting(&self, key: &str) -> Result<Option<String>> {
        let value = self
            .conn
            .query_row(
                "SELECT value FROM settings WHERE key = ?1",
                params![key],
                |row| row.get(0),
            )
            .optional()?;
        Ok(value)
    }

    fn set_setting(&self, key: &str, value: &str) -> Result<()> {
        self.conn.execute(
            "INSERT OR REPLACE INTO settings (key, value) VALUES (?1, ?2)",
            params![key, value],
        )?;
        Ok(())
    }
}

impl SettingsRepository for SqliteSettingsRepository<'_> {
    fn load_policy(&self) -> Result<SyncPolicy> {
        let mut policy = SyncPolicy::default();

        if let Some(value) = self.get_setting(KEY_SYNC_ENABLED)? {
            policy.sync_enabled = parse_flag(&value);
        }

        if let Some(value) = self.get_setting(KEY_SYNC_INTERVAL_MINUTES)? {
            if let Ok(minutes) = value.trim().parse() {
                policy.sync_interval_minutes = minutes;
            }
        }

        if let Some(value) = self.get_setting(KEY_WIFI_ONLY)? {
            policy.wifi_only = parse_flag(&value);
        }

        Ok(policy)
    }

    fn save_policy(&self, policy: &SyncPolicy) -> Result<()> {
        let tx = self.conn.unchecked_transaction()?;
        self.set_setting(KEY_SYNC_ENABLED, flag_text(policy.sync_enabled))?;
        self.set_setting(
            KEY_SYNC_INTERVAL_MINUTES,
            &policy.sync_interval_minutes.to_string(),
        )?;
        self.set_setting(KEY_WIFI_ONLY, flag_text(policy.wifi_only))?;
        tx.commit()?;
        Ok(())
    }

    fn load_global_state(&self) -> Result<GlobalSyncState> {
        // First writer wins, so the ID is generated exactly once per database
        self.conn.execute(
            "INSERT OR IGNORE INTO settings (key, value) VALUES (?1, ?2)",
            params![KEY_DEVICE_ID, Uuid::now_v7().to_string()],
        )?;
        let device_id = self.get_setting(KEY_DEVICE_ID)?.unwrap_or_default();

        let last_sync_timestamp = self
            .get_setting(KEY_LAST_SYNC_TIMESTAMP)?
            .and_then(|value| value.trim().parse().ok())
            .unwrap_or(0);

        Ok(GlobalSyncState {
            last_sync_timestamp,
            device_id,
            in_progress: false,
        })
    }

    fn save_last_sync_timestamp(&self, timestamp: i64) -> Result<()> {
        self.set_setting(KEY_LAST_SYNC_TIMESTAMP, &timestamp.to_string())
    }
}

fn parse_flag(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}

const fn flag_text(value: bool) -> &'static str {
    if value {
        "true"
    } else {
        "false"
    }
}
