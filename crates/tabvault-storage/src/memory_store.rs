use std::sync::Mutex;

use serde_json::Value;
use tabvault_types::error::{Result, VaultError};

use crate::limits::{item_size, WriteGate};
use crate::{Items, KvStore, StoreLimits};

struct Inner {
    data: Items,
    gate: WriteGate,
}

/// In-process store. With limits it behaves like the quota-bound sync
/// store; without, like the unbounded local store.
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

impl MemoryStore {
    /// Store enforcing the given byte budgets and write rate.
    pub fn with_limits(limits: StoreLimits) -> Self {
        Self::build(Some(limits))
    }

    /// Store without quota or throttling.
    pub fn unbounded() -> Self {
        Self::build(None)
    }

    fn build(limits: Option<StoreLimits>) -> Self {
        Self {
            inner: Mutex::new(Inner {
                data: Items::new(),
                gate: WriteGate::new(limits),
            }),
        }
    }

    pub fn limits(&self) -> Option<StoreLimits> {
        self.lock().ok().and_then(|inner| inner.gate.limits().cloned())
    }

    /// Overwrite a value bypassing quota and rate checks.
    pub fn put_raw(&self, key: &str, value: Value) -> Result<()> {
        self.lock()?.data.insert(key.to_string(), value);
        Ok(())
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Inner>> {
        self.inner
            .lock()
            .map_err(|_| VaultError::Other("memory store mutex poisoned".into()))
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::unbounded()
    }
}

impl KvStore for MemoryStore {
    fn get(&self, keys: Option<&[String]>) -> Result<Items> {
        let inner = self.lock()?;
        Ok(match keys {
            None => inner.data.clone(),
            Some(keys) => keys
                .iter()
                .filter_map(|k| inner.data.get(k).map(|v| (k.clone(), v.clone())))
                .collect(),
        })
    }

    fn set(&self, items: Items) -> Result<()> {
        let mut inner = self.lock()?;
        inner.gate.check_budget(&inner.data, &items)?;
        inner.gate.admit_op()?;
        inner.data.extend(items);
        Ok(())
    }

    fn remove(&self, keys: &[String]) -> Result<()> {
        let mut inner = self.lock()?;
        // removing absent keys is a no-op and costs no write
        if !keys.iter().any(|k| inner.data.contains_key(k)) {
            return Ok(());
        }
        inner.gate.admit_op()?;
        for key in keys {
            inner.data.remove(key);
        }
        Ok(())
    }

    fn bytes_in_use(&self, keys: Option<&[String]>) -> Result<u64> {
        let inner = self.lock()?;
        Ok(match keys {
            None => inner.data.iter().map(|(k, v)| item_size(k, v)).sum(),
            Some(keys) => keys
                .iter()
                .filter_map(|k| inner.data.get(k).map(|v| item_size(k, v)))
                .sum(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn one(key: &str, value: Value) -> Items {
        let mut items = Items::new();
        items.insert(key.to_string(), value);
        items
    }

    #[test]
    fn get_missing_keys_are_omitted() {
        let store = MemoryStore::unbounded();
        store.set(one("a", json!(1))).unwrap();
        let got = store
            .get(Some(&["a".to_string(), "b".to_string()]))
            .unwrap();
        assert_eq!(got.len(), 1);
        assert_eq!(got["a"], json!(1));
    }

    #[test]
    fn rejected_batch_writes_nothing() {
        let store = MemoryStore::with_limits(StoreLimits {
            quota_bytes: 1000,
            quota_bytes_per_item: 12,
            max_write_ops_per_minute: None,
        });
        let mut batch = one("ok", json!("small"));
        batch.insert("big".into(), json!("far too large for the ceiling"));
        assert!(store.set(batch).unwrap_err().is_quota_exceeded());
        assert!(store.get(None).unwrap().is_empty());
    }

    #[test]
    fn bytes_in_use_sums_requested_keys() {
        let store = MemoryStore::unbounded();
        store.set(one("ab", json!("xyz"))).unwrap();
        store.set(one("c", json!(10))).unwrap();
        assert_eq!(store.bytes_in_use(Some(&["ab".to_string()])).unwrap(), 7);
        assert_eq!(store.bytes_in_use(None).unwrap(), 7 + 3);
        assert_eq!(store.bytes_in_use(Some(&["zz".to_string()])).unwrap(), 0);
    }

    #[test]
    fn remove_is_idempotent() {
        let store = MemoryStore::unbounded();
        store.set(one("a", json!(true))).unwrap();
        store.remove(&["a".to_string(), "nope".to_string()]).unwrap();
        store.remove(&["a".to_string()]).unwrap();
        assert!(store.get_one("a").unwrap().is_none());
    }

    #[test]
    fn throttled_writes_surface_rate_limit() {
        let store = MemoryStore::with_limits(StoreLimits {
            quota_bytes: 1000,
            quota_bytes_per_item: 100,
            max_write_ops_per_minute: Some(1),
        });
        store.set_one("a", json!(1)).unwrap();
        let err = store.set_one("b", json!(2)).unwrap_err();
        assert!(err.is_rate_limited());
        assert!(store.get_one("b").unwrap().is_none());
    }

    #[test]
    fn removing_absent_keys_is_not_charged() {
        let store = MemoryStore::with_limits(StoreLimits {
            quota_bytes: 1000,
            quota_bytes_per_item: 100,
            max_write_ops_per_minute: Some(2),
        });
        store.set_one("a", json!(1)).unwrap();
        for _ in 0..5 {
            store.remove(&["missing".to_string()]).unwrap();
        }
        store.remove(&["a".to_string()]).unwrap();
        assert!(store.remove(&["a".to_string()]).is_ok());
        let err = store.set_one("b", json!(2)).unwrap_err();
        assert!(err.is_rate_limited());
    }
}
