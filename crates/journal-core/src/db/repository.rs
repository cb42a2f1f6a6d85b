//! Entry repository implementation

#![allow(clippy::cast_possible_wrap)] // SQLite uses i64 for LIMIT/OFFSET

use crate::error::{Error, Result};
use crate::models::{
    ConflictRecord, Entry, EntryDraft, EntryId, LocalSnapshot, Resolution, SyncState, SyncStatus,
};
use crate::util::now_millis;
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension, Row};

const ENTRY_COLUMNS: &str = "id, text, entry_date, location, images, is_marked, updated_at, \
     device_origin, is_deleted, local_version, last_synced_version, last_synced_at, status";

const SHADOW_COLUMNS: &str =
    "entry_id, text, entry_date, location, images, is_marked, updated_at, device_origin, is_deleted";

/// Who is writing an entry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteOrigin {
    /// A user edit on this device; the entry becomes dirty
    Local,
    /// A write that reflects remote state agreed during a sync pass
    Sync,
}

/// Result of a sync-originated write that re-checks the local version
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplyOutcome {
    /// The remote version now is the local version
    Applied,
    /// The entry changed underneath the pass; it was flagged as a conflict instead
    ConflictDetected,
}

/// Result of committing a confirmed remote write
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PushAck {
    /// Local and remote agree
    Synced,
    /// The entry was edited while its push was in flight; it stays dirty
    StillDirty,
    /// A confirmed deletion; the tombstone row was removed
    Purged,
    /// The entry no longer exists locally
    Missing,
}

/// Trait for entry storage operations
pub trait EntryRepository {
    /// Create a new entry from user input
    fn create(&self, draft: EntryDraft, device_id: &str) -> Result<Entry>;

    /// Write an entry; returns the resulting sync state, or `None` when a
    /// sync-originated tombstone removed the row
    fn upsert(&self, entry: &Entry, origin: WriteOrigin) -> Result<Option<SyncState>>;

    /// Get a live (non-deleted) entry by ID
    fn get(&self, id: &EntryId) -> Result<Option<Entry>>;

    /// Get an entry with its sync state, tombstones included
    fn snapshot(&self, id: &EntryId) -> Result<Option<LocalSnapshot>>;

    /// List live entries, most recently updated first
    fn list(&self, limit: usize, offset: usize) -> Result<Vec<Entry>>;

    /// List live entry IDs starting with `prefix`
    fn list_ids_by_prefix(&self, prefix: &str, limit: usize) -> Result<Vec<String>>;

    /// Mark an entry as deleted, keeping a tombstone until the deletion is pushed
    fn delete(&self, id: &EntryId, device_id: &str) -> Result<()>;

    /// Entries that are not synced or were updated after `timestamp`
    fn dirty_since(&self, timestamp: i64) -> Result<Vec<LocalSnapshot>>;

    /// Entries waiting for a user decision, with their shadow copies
    fn conflicted(&self) -> Result<Vec<ConflictRecord>>;

    /// Sync-originated write guarded by the local version observed earlier in the pass
    fn apply_synced(&self, remote: &Entry, expected_version: Option<i64>) -> Result<ApplyOutcome>;

    /// Keep `remote` as a shadow copy and flag the entry as conflicted
    fn flag_conflict(&self, id: &EntryId, remote: &Entry) -> Result<()>;

    /// Record that `pushed_version` of the entry was confirmed remotely
    fn mark_pushed(
        &self,
        id: &EntryId,
        pushed_version: i64,
        remote_updated_at: i64,
    ) -> Result<PushAck>;

    /// Apply a user decision to a conflicted entry
    fn resolve_conflict(&self, id: &EntryId, resolution: Resolution) -> Result<()>;

    /// Shadow copy held for a conflicted entry
    fn shadow(&self, id: &EntryId) -> Result<Option<Entry>>;
}

/// `SQLite` implementation of `EntryRepository`
pub struct SqliteEntryRepository<'a> {
    conn: &'a Connection,
}

impl<'a> SqliteEntryRepository<'a> {
    /// Create a new repository with the given connection
    pub const fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }

    /// Parse an entry with sync state from a row selected with `ENTRY_COLUMNS`
    fn parse_snapshot(row: &Row<'_>) -> rusqlite::Result<LocalSnapshot> {
        let entry = Self::parse_entry(row)?;
        let status: String = row.get(12)?;
        let status = status
            .parse::<SyncStatus>()
            .map_err(|error| conversion_error(12, error))?;

        Ok(LocalSnapshot {
            entry,
            state: SyncState {
                local_version: row.get(9)?,
                last_synced_version: row.get(10)?,
                last_synced_at: row.get(11)?,
                status,
            },
        })
    }

    /// Parse the leading entry columns (shared by `entries` and `conflict_shadows`)
    fn parse_entry(row: &Row<'_>) -> rusqlite::Result<Entry> {
        let id: String = row.get(0)?;
        let images: String = row.get(4)?;
        Ok(Entry {
            id: id
                .parse()
                .map_err(|error: uuid::Error| conversion_error(0, error.to_string()))?,
            text: row.get(1)?,
            entry_date: row.get(2)?,
            location: row.get(3)?,
            images: serde_json::from_str(&images)
                .map_err(|error| conversion_error(4, error.to_string()))?,
            is_marked: row.get::<_, i32>(5)? != 0,
            updated_at: row.get(6)?,
            device_origin: row.get(7)?,
            is_deleted: row.get::<_, i32>(8)? != 0,
        })
    }

    fn write_row(&self, entry: &Entry, state: &SyncState) -> Result<()> {
        let images = serde_json::to_string(&entry.images)?;
        self.conn.execute(
            &format!(
                "INSERT INTO entries ({ENTRY_COLUMNS})
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)
                 ON CONFLICT(id) DO UPDATE SET
                    text = excluded.text,
                    entry_date = excluded.entry_date,
                    location = excluded.location,
                    images = excluded.images,
                    is_marked = excluded.is_marked,
                    updated_at = excluded.updated_at,
                    device_origin = excluded.device_origin,
                    is_deleted = excluded.is_deleted,
                    local_version = excluded.local_version,
                    last_synced_version = excluded.last_synced_version,
                    last_synced_at = excluded.last_synced_at,
                    status = excluded.status"
            ),
            params![
                entry.id.as_str(),
                entry.text,
                entry.entry_date,
                entry.location,
                images,
                i32::from(entry.is_marked),
                entry.updated_at,
                entry.device_origin,
                i32::from(entry.is_deleted),
                state.local_version,
                state.last_synced_version,
                state.last_synced_at,
                state.status.as_str(),
            ],
        )?;
        Ok(())
    }

    fn write_shadow(&self, remote: &Entry) -> Result<()> {
        let images = serde_json::to_string(&remote.images)?;
        self.conn.execute(
            &format!(
                "INSERT OR REPLACE INTO conflict_shadows ({SHADOW_COLUMNS}, recorded_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)"
            ),
            params![
                remote.id.as_str(),
                remote.text,
                remote.entry_date,
                remote.location,
                images,
                i32::from(remote.is_marked),
                remote.updated_at,
                remote.device_origin,
                i32::from(remote.is_deleted),
                now_millis(),
            ],
        )?;
        Ok(())
    }

    fn remove_shadow(&self, id: &EntryId) -> Result<()> {
        self.conn.execute(
            "DELETE FROM conflict_shadows WHERE entry_id = ?1",
            params![id.as_str()],
        )?;
        Ok(())
    }

    fn purge(&self, id: &EntryId) -> Result<()> {
        self.remove_shadow(id)?;
        self.conn
            .execute("DELETE FROM entries WHERE id = ?1", params![id.as_str()])?;
        Ok(())
    }

    fn set_status(&self, id: &EntryId, status: SyncStatus) -> Result<()> {
        let rows = self.conn.execute(
            "UPDATE entries SET status = ?1 WHERE id = ?2",
            params![status.as_str(), id.as_str()],
        )?;
        if rows == 0 {
            return Err(Error::NotFound(id.to_string()));
        }
        Ok(())
    }

    fn upsert_local(&self, entry: &Entry) -> Result<SyncState> {
        let mut entry = entry.clone();
        entry.updated_at = now_millis();

        let state = match self.snapshot(&entry.id)? {
            Some(current) => SyncState {
                local_version: current.state.local_version + 1,
                status: match current.state.status {
                    // Only an explicit resolution leaves the conflict
                    SyncStatus::Conflict | SyncStatus::PendingPull => SyncStatus::Conflict,
                    SyncStatus::Synced | SyncStatus::PendingPush => SyncStatus::PendingPush,
                },
                ..current.state
            },
            None => SyncState {
                local_version: 1,
                last_synced_version: 0,
                last_synced_at: 0,
                status: SyncStatus::PendingPush,
            },
        };

        self.write_row(&entry, &state)?;
        Ok(state)
    }

    fn upsert_synced(&self, remote: &Entry) -> Result<Option<SyncState>> {
        if remote.is_deleted {
            self.purge(&remote.id)?;
            return Ok(None);
        }

        let local_version = self
            .snapshot(&remote.id)?
            .map_or(1, |current| current.state.local_version + 1);
        let state = SyncState {
            local_version,
            last_synced_version: local_version,
            last_synced_at: remote.updated_at,
            status: SyncStatus::Synced,
        };

        self.write_row(remote, &state)?;
        self.remove_shadow(&remote.id)?;
        Ok(Some(state))
    }
}

impl EntryRepository for SqliteEntryRepository<'_> {
    fn create(&self, draft: EntryDraft, device_id: &str) -> Result<Entry> {
        if draft.text.trim().is_empty() {
            return Err(Error::InvalidInput("entry text cannot be empty".into()));
        }

        let entry = draft.into_entry(device_id);
        self.upsert_local(&entry)?;
        self.get(&entry.id)?
            .ok_or_else(|| Error::NotFound(entry.id.to_string()))
    }

    fn upsert(&self, entry: &Entry, origin: WriteOrigin) -> Result<Option<SyncState>> {
        let tx = self.conn.unchecked_transaction()?;
        let state = match origin {
            WriteOrigin::Local => Some(self.upsert_local(entry)?),
            WriteOrigin::Sync => self.upsert_synced(entry)?,
        };
        tx.commit()?;
        Ok(state)
    }

    fn get(&self, id: &EntryId) -> Result<Option<Entry>> {
        Ok(self
            .snapshot(id)?
            .filter(|snapshot| !snapshot.entry.is_deleted)
            .map(|snapshot| snapshot.entry))
    }

    fn snapshot(&self, id: &EntryId) -> Result<Option<LocalSnapshot>> {
        let snapshot = self
            .conn
            .query_row(
                &format!("SELECT {ENTRY_COLUMNS} FROM entries WHERE id = ?1"),
                params![id.as_str()],
                Self::parse_snapshot,
            )
            .optional()?;
        Ok(snapshot)
    }

    fn list(&self, limit: usize, offset: usize) -> Result<Vec<Entry>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {ENTRY_COLUMNS}
             FROM entries
             WHERE is_deleted = 0
             ORDER BY updated_at DESC
             LIMIT ?1 OFFSET ?2"
        ))?;

        let entries = stmt
            .query_map(params![limit as i64, offset as i64], Self::parse_entry)?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        Ok(entries)
    }

    fn list_ids_by_prefix(&self, prefix: &str, limit: usize) -> Result<Vec<String>> {
        let mut stmt = self.conn.prepare(
            "SELECT id
             FROM entries
             WHERE is_deleted = 0 AND id LIKE ?1
             ORDER BY updated_at DESC
             LIMIT ?2",
        )?;

        let ids = stmt
            .query_map(params![format!("{prefix}%"), limit as i64], |row| {
                row.get::<_, String>(0)
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        Ok(ids)
    }

    fn delete(&self, id: &EntryId, device_id: &str) -> Result<()> {
        let tx = self.conn.unchecked_transaction()?;
        let Some(current) = self.snapshot(id)?.filter(|s| !s.entry.is_deleted) else {
            return Err(Error::NotFound(id.to_string()));
        };

        let mut tombstone = current.entry;
        tombstone.is_deleted = true;
        tombstone.device_origin = device_id.to_string();
        self.upsert_local(&tombstone)?;

        tx.commit()?;
        Ok(())
    }

    fn dirty_since(&self, timestamp: i64) -> Result<Vec<LocalSnapshot>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {ENTRY_COLUMNS}
             FROM entries
             WHERE status != 'synced' OR updated_at > ?1
             ORDER BY updated_at ASC"
        ))?;

        let snapshots = stmt
            .query_map(params![timestamp], Self::parse_snapshot)?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        Ok(snapshots)
    }

    fn conflicted(&self) -> Result<Vec<ConflictRecord>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {ENTRY_COLUMNS}
             FROM entries
             WHERE status = 'conflict'
             ORDER BY updated_at DESC"
        ))?;

        let snapshots = stmt
            .query_map([], Self::parse_snapshot)?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        snapshots
            .into_iter()
            .map(|snapshot| {
                Ok(ConflictRecord {
                    pending_remote: self.shadow(&snapshot.entry.id)?,
                    primary: snapshot.entry,
                    primary_state: snapshot.state,
                })
            })
            .collect()
    }

    fn apply_synced(&self, remote: &Entry, expected_version: Option<i64>) -> Result<ApplyOutcome> {
        let tx = self.conn.unchecked_transaction()?;
        let current = self.snapshot(&remote.id)?;

        let changed_underneath = match (&current, expected_version) {
            (Some(current), Some(expected)) => current.state.local_version != expected,
            // Created locally after the pass looked at this id
            (Some(current), None) => current.state.is_dirty(),
            (None, _) => false,
        };

        let outcome = if changed_underneath {
            self.write_shadow(remote)?;
            self.set_status(&remote.id, SyncStatus::Conflict)?;
            ApplyOutcome::ConflictDetected
        } else {
            self.upsert_synced(remote)?;
            ApplyOutcome::Applied
        };

        tx.commit()?;
        Ok(outcome)
    }

    fn flag_conflict(&self, id: &EntryId, remote: &Entry) -> Result<()> {
        let tx = self.conn.unchecked_transaction()?;
        self.write_shadow(remote)?;
        self.set_status(id, SyncStatus::Conflict)?;
        tx.commit()?;
        Ok(())
    }

    fn mark_pushed(
        &self,
        id: &EntryId,
        pushed_version: i64,
        remote_updated_at: i64,
    ) -> Result<PushAck> {
        let tx = self.conn.unchecked_transaction()?;
        let Some(current) = self.snapshot(id)? else {
            return Ok(PushAck::Missing);
        };

        let ack = if current.state.local_version == pushed_version {
            if current.entry.is_deleted {
                self.purge(id)?;
                PushAck::Purged
            } else {
                self.conn.execute(
                    "UPDATE entries
                     SET last_synced_version = ?1, last_synced_at = ?2, status = 'synced'
                     WHERE id = ?3",
                    params![pushed_version, remote_updated_at, id.as_str()],
                )?;
                PushAck::Synced
            }
        } else {
            self.conn.execute(
                "UPDATE entries
                 SET last_synced_version = ?1, last_synced_at = ?2
                 WHERE id = ?3",
                params![pushed_version, remote_updated_at, id.as_str()],
            )?;
            PushAck::StillDirty
        };

        tx.commit()?;
        Ok(ack)
    }

    fn resolve_conflict(&self, id: &EntryId, resolution: Resolution) -> Result<()> {
        let tx = self.conn.unchecked_transaction()?;
        let current = self
            .snapshot(id)?
            .ok_or_else(|| Error::NotFound(id.to_string()))?;
        if current.state.status != SyncStatus::Conflict {
            return Err(Error::InvalidInput(format!("entry {id} is not in conflict")));
        }

        match resolution {
            Resolution::KeepLocal => {
                // The shadow counts as seen; the primary is restamped past it so
                // other devices take it as the newer copy
                let seen_at = self
                    .shadow(id)?
                    .map_or(current.state.last_synced_at, |shadow| {
                        shadow.updated_at.max(current.state.last_synced_at)
                    });
                let mut primary = current.entry;
                primary.updated_at = now_millis().max(seen_at + 1);
                let state = SyncState {
                    local_version: current.state.local_version + 1,
                    last_synced_at: seen_at,
                    status: SyncStatus::PendingPush,
                    ..current.state
                };
                self.write_row(&primary, &state)?;
                self.remove_shadow(id)?;
            }
            Resolution::KeepRemote => {
                self.set_status(id, SyncStatus::PendingPull)?;
            }
        }

        tx.commit()?;
        Ok(())
    }

    fn shadow(&self, id: &EntryId) -> Result<Option<Entry>> {
        let shadow = self
            .conn
            .query_row(
                &format!("SELECT {SHADOW_COLUMNS} FROM conflict_shadows WHERE entry_id = ?1"),
                params![id.as_str()],
                Self::parse_entry,
            )
            .optional()?;
        Ok(shadow)
    }
}

fn conversion_error(index: usize, message: impl Into<String>) -> rusqlite::Error {
    let message: String = message.into();
    rusqlite::Error::FromSqlConversionFailure(index, Type::Text, message.into())
}
