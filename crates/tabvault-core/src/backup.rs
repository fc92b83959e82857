use chrono::{DateTime, Utc};
use serde_json::{json, Value};
use tabvault_storage::KvStore;
use tabvault_types::error::{Result, VaultError};
use tabvault_types::item::VaultSnapshot;

use crate::codec;
use crate::meta::FORMAT_VERSION;

/// Full-fidelity copy of the vault in the unconstrained local store.
/// Written before every remote attempt.
pub struct LocalBackup<'a> {
    store: &'a dyn KvStore,
    key: &'a str,
}

#[derive(Debug, Clone, PartialEq)]
pub struct BackupRecord {
    pub snapshot: VaultSnapshot,
    pub saved_at: Option<DateTime<Utc>>,
}

impl<'a> LocalBackup<'a> {
    pub fn new(store: &'a dyn KvStore, key: &'a str) -> Self {
        Self { store, key }
    }

    pub fn write(&self, snapshot: &VaultSnapshot) -> Result<()> {
        let record = json!({
            "version": FORMAT_VERSION,
            "savedAt": Utc::now(),
            "items": snapshot,
        });
        self.store.set_one(self.key, record)
    }

    /// Read the backup. A bare item array (as written by old releases) is
    /// accepted as well as the versioned record.
    pub fn read(&self) -> Result<Option<BackupRecord>> {
        let Some(value) = self.store.get_one(self.key)? else {
            return Ok(None);
        };
        let (items, saved_at) = match value {
            Value::Object(mut obj) => {
                let saved_at = obj
                    .get("savedAt")
                    .cloned()
                    .and_then(|v| serde_json::from_value::<DateTime<Utc>>(v).ok());
                let items = obj.remove("items").ok_or_else(|| {
                    VaultError::InvalidFormat("local backup has no items".into())
                })?;
                (items, saved_at)
            }
            items @ Value::Array(_) => (items, None),
            _ => {
                return Err(VaultError::InvalidFormat(
                    "local backup is neither a record nor an item array".into(),
                ))
            }
        };
        let fallback_ms = saved_at.unwrap_or_else(Utc::now).timestamp_millis();
        let snapshot = codec::expand(items, fallback_ms)?;
        Ok(Some(BackupRecord { snapshot, saved_at }))
    }

    /// The backed-up snapshot, or an empty one if there is no backup.
    pub fn read_snapshot(&self) -> Result<VaultSnapshot> {
        Ok(self.read()?.map(|r| r.snapshot).unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::{group_item, tab_item};
    use tabvault_storage::MemoryStore;

    #[test]
    fn write_then_read_is_exact() {
        let store = MemoryStore::unbounded();
        let backup = LocalBackup::new(&store, "vault_local_backup");
        let snapshot = VaultSnapshot::new(vec![
            tab_item("a", "https://www.example.com/keep/exactly/?utm_source=x"),
            group_item("g", &["https://example.com/1"]),
        ]);
        backup.write(&snapshot).unwrap();
        let record = backup.read().unwrap().unwrap();
        assert_eq!(record.snapshot, snapshot);
        assert!(record.saved_at.is_some());
    }

    #[test]
    fn missing_backup_is_none() {
        let store = MemoryStore::unbounded();
        let backup = LocalBackup::new(&store, "vault_local_backup");
        assert!(backup.read().unwrap().is_none());
        assert!(backup.read_snapshot().unwrap().is_empty());
    }

    #[test]
    fn bare_array_is_accepted() {
        let store = MemoryStore::unbounded();
        store
            .set_one(
                "b",
                json!([{"id": 3, "url": "https://example.com", "title": "x", "index": 0}]),
            )
            .unwrap();
        let snapshot = LocalBackup::new(&store, "b").read_snapshot().unwrap();
        assert_eq!(snapshot.len(), 1);
        assert_eq!(snapshot.items[0].id(), "legacy-3");
    }
}
