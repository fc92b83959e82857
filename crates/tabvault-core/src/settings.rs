use serde_json::Value;
use tabvault_storage::KvStore;
use tabvault_types::error::Result;

/// The durable "use remote sync" switch, kept in the local store so it
/// survives a wiped or unreachable remote.
pub struct SyncPreference<'a> {
    store: &'a dyn KvStore,
    key: &'a str,
}

impl<'a> SyncPreference<'a> {
    pub fn new(store: &'a dyn KvStore, key: &'a str) -> Self {
        Self { store, key }
    }

    /// Sync is on unless explicitly switched off.
    pub fn is_enabled(&self) -> Result<bool> {
        Ok(self
            .store
            .get_one(self.key)?
            .and_then(|v| v.as_bool())
            .unwrap_or(true))
    }

    pub fn set_enabled(&self, enabled: bool) -> Result<()> {
        tracing::info!(enabled, "persisting sync preference");
        self.store.set_one(self.key, Value::Bool(enabled))
    }
}
