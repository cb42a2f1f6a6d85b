//! Journal entry model

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// A unique identifier for an entry, using UUID v7 (time-sortable)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntryId(Uuid);

impl EntryId {
    /// Create a new unique entry ID using UUID v7
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }

    /// Get the string representation of this ID
    #[must_use]
    pub fn as_str(&self) -> String {
        self.0.to_string()
    }
}

impl Default for EntryId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for EntryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for EntryId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

/// A journal entry, the unit of synchronization
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Entry {
    /// Unique identifier, stable across devices
    pub id: EntryId,
    /// Plain text content
    pub text: String,
    /// The day the entry is about (Unix ms)
    pub entry_date: i64,
    /// Free-form place description
    pub location: Option<String>,
    /// References to attached images (paths or remote keys)
    pub images: Vec<String>,
    /// Whether the user starred this entry
    pub is_marked: bool,
    /// Last write timestamp (Unix ms), authoritative for ordering
    pub updated_at: i64,
    /// Identifier of the device that last wrote this entry
    pub device_origin: String,
    /// Tombstone flag; the row is kept until the deletion is acknowledged remotely
    pub is_deleted: bool,
}

impl Entry {
    /// Create a new entry written by `device_origin`
    #[must_use]
    pub fn new(text: impl Into<String>, device_origin: impl Into<String>) -> Self {
        let now = chrono::Utc::now().timestamp_millis();
        Self {
            id: EntryId::new(),
            text: text.into(),
            entry_date: now,
            location: None,
            images: Vec::new(),
            is_marked: false,
            updated_at: now,
            device_origin: device_origin.into(),
            is_deleted: false,
        }
    }

    /// Get first line as title preview, truncated to `max_len` characters
    #[must_use]
    pub fn title_preview(&self, max_len: usize) -> String {
        self.text
            .lines()
            .next()
            .unwrap_or("")
            .chars()
            .take(max_len)
            .collect()
    }

    /// Check if entry text is empty (whitespace-only counts as empty)
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.text.trim().is_empty()
    }
}

/// User-supplied fields for a new entry
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EntryDraft {
    pub text: String,
    /// Defaults to the creation time when `None`
    pub entry_date: Option<i64>,
    pub location: Option<String>,
    pub images: Vec<String>,
    pub is_marked: bool,
}

impl EntryDraft {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            ..Self::default()
        }
    }

    /// Build the entry this draft describes
    #[must_use]
    pub fn into_entry(self, device_origin: &str) -> Entry {
        let mut entry = Entry::new(self.text, device_origin);
        if let Some(entry_date) = self.entry_date {
            entry.entry_date = entry_date;
        }
        entry.location = self.location;
        entry.images = self.images;
        entry.is_marked = self.is_marked;
        entry
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_entry_id_unique() {
        let id1 = EntryId::new();
        let id2 = EntryId::new();
        assert_ne!(id1, id2);
    }

    #[test]
    fn test_entry_id_parse() {
        let id = EntryId::new();
        let parsed: EntryId = id.as_str().parse().unwrap();
        assert_eq!(id, parsed);
    }

    #[test]
    fn test_entry_new() {
        let entry = Entry::new("Walked to the lake", "device-a");
        assert_eq!(entry.text, "Walked to the lake");
        assert_eq!(entry.device_origin, "device-a");
        assert!(!entry.is_deleted);
        assert!(!entry.is_marked);
        assert_eq!(entry.entry_date, entry.updated_at);
    }

    #[test]
    fn test_draft_into_entry_keeps_fields() {
        let draft = EntryDraft {
            text: "Rainy day".to_string(),
            entry_date: Some(1_700_000_000_000),
            location: Some("Taipei".to_string()),
            images: vec!["img/1.jpg".to_string()],
            is_marked: true,
        };
        let entry = draft.into_entry("device-a");
        assert_eq!(entry.entry_date, 1_700_000_000_000);
        assert_eq!(entry.location.as_deref(), Some("Taipei"));
        assert_eq!(entry.images, vec!["img/1.jpg"]);
        assert!(entry.is_marked);
    }

    #[test]
    fn test_title_preview() {
        let entry = Entry::new("First line\nSecond line", "d");
        assert_eq!(entry.title_preview(50), "First line");
        assert_eq!(entry.title_preview(5), "First");
    }

    #[test]
    fn test_entry_id_serializes_as_plain_string() {
        let id = EntryId::new();
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, format!("\"{id}\""));
    }
}
