//! Remote service contract

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::error::RemoteResult;
use crate::models::{Entry, EntryId};

/// An entry as the remote service stores it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteRecord {
    pub id: EntryId,
    pub text: String,
    pub entry_date: i64,
    #[serde(default)]
    pub location: Option<String>,
    #[serde(default)]
    pub images: Vec<String>,
    #[serde(default)]
    pub is_marked: bool,
    pub updated_at: i64,
    pub device_origin: String,
    /// Remote tombstone; deletion propagates to other devices
    #[serde(default)]
    pub deleted: bool,
}

impl RemoteRecord {
    /// Convert into the local entry shape
    #[must_use]
    pub fn into_entry(self) -> Entry {
        Entry {
            id: self.id,
            text: self.text,
            entry_date: self.entry_date,
            location: self.location,
            images: self.images,
            is_marked: self.is_marked,
            updated_at: self.updated_at,
            device_origin: self.device_origin,
            is_deleted: self.deleted,
        }
    }
}

impl From<&Entry> for RemoteRecord {
    fn from(entry: &Entry) -> Self {
        Self {
            id: entry.id,
            text: entry.text.clone(),
            entry_date: entry.entry_date,
            location: entry.location.clone(),
            images: entry.images.clone(),
            is_marked: entry.is_marked,
            updated_at: entry.updated_at,
            device_origin: entry.device_origin.clone(),
            deleted: entry.is_deleted,
        }
    }
}

/// Authenticated access to the remote entry service.
///
/// Writes are idempotent by record id, so a pass can be retried after a partial failure.
#[async_trait]
pub trait RemoteClient: Send + Sync {
    /// Records (tombstones included) modified after `timestamp` (Unix ms)
    async fn list_modified_since(&self, timestamp: i64) -> RemoteResult<Vec<RemoteRecord>>;

    /// Create or replace a record; returns the stored version
    async fn create_or_update(&self, record: &RemoteRecord) -> RemoteResult<RemoteRecord>;

    /// Delete a record; succeeds when it is already gone
    async fn delete(&self, id: &EntryId) -> RemoteResult<()>;

    /// Whether the current credentials are accepted
    async fn validate_token(&self) -> RemoteResult<bool>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn record_mirrors_entry_fields() {
        let mut entry = Entry::new("Sunset", "device-a");
        entry.is_deleted = true;
        entry.images = vec!["a.png".to_string()];

        let record = RemoteRecord::from(&entry);
        assert!(record.deleted);
        assert_eq!(record.into_entry(), entry);
    }

    #[test]
    fn record_uses_camel_case_on_the_wire() {
        let record = RemoteRecord::from(&Entry::new("x", "device-a"));
        let json = serde_json::to_value(&record).unwrap();
        assert!(json.get("updatedAt").is_some());
        assert!(json.get("deviceOrigin").is_some());
        assert!(json.get("isMarked").is_some());
    }

    #[test]
    fn record_defaults_optional_fields() {
        let id = EntryId::new();
        let payload = format!(
            r#"{{"id":"{id}","text":"t","entryDate":1,"updatedAt":2,"deviceOrigin":"d"}}"#
        );
        let record: RemoteRecord = serde_json::from_str(&payload).unwrap();
        assert!(!record.deleted);
        assert!(record.images.is_empty());
        assert_eq!(record.location, None);
    }
}
