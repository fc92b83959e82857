//! Boundary to the key-value stores the vault is persisted in.
//!
//! The remote store is small, byte-budgeted and write-throttled; the local
//! store is effectively unbounded. Both are driven through [`KvStore`].

pub mod file_store;
pub mod limits;
pub mod memory_store;
pub mod retry;

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tabvault_types::error::Result;

pub use file_store::FileStore;
pub use limits::{item_size, total_size, StoreLimits};
pub use memory_store::MemoryStore;

/// Key/value pairs exchanged with a store in one call.
pub type Items = BTreeMap<String, Value>;

/// An opaque key-value backend with byte accounting.
///
/// A `set` is applied as a unit: when it is rejected (quota, throttling)
/// nothing from the batch is written.
pub trait KvStore: Send + Sync {
    /// Read the given keys, or every key when `keys` is `None`. Absent keys
    /// are simply missing from the returned map.
    fn get(&self, keys: Option<&[String]>) -> Result<Items>;

    fn set(&self, items: Items) -> Result<()>;

    /// Remove keys. Removing an absent key is not an error.
    fn remove(&self, keys: &[String]) -> Result<()>;

    /// Bytes charged against the quota for the given keys (or all keys).
    fn bytes_in_use(&self, keys: Option<&[String]>) -> Result<u64>;

    fn get_one(&self, key: &str) -> Result<Option<Value>> {
        let mut found = self.get(Some(&[key.to_string()]))?;
        Ok(found.remove(key))
    }

    fn set_one(&self, key: &str, value: Value) -> Result<()> {
        let mut items = Items::new();
        items.insert(key.to_string(), value);
        self.set(items)
    }

    fn keys(&self) -> Result<Vec<String>> {
        Ok(self.get(None)?.into_keys().collect())
    }
}

/// Exponential backoff policy for transient store failures.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Maximum number of retry attempts (0 = no retries).
    #[serde(default = "default_max_retries")]
    pub max_retries: usize,
    /// Initial delay between retries in milliseconds.
    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,
    /// Maximum delay between retries in milliseconds.
    #[serde(default = "default_retry_max_delay_ms")]
    pub retry_max_delay_ms: u64,
}

fn default_max_retries() -> usize {
    3
}

fn default_retry_delay_ms() -> u64 {
    500
}

fn default_retry_max_delay_ms() -> u64 {
    8_000
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            retry_delay_ms: default_retry_delay_ms(),
            retry_max_delay_ms: default_retry_max_delay_ms(),
        }
    }
}

impl RetryConfig {
    /// A policy that never sleeps, for tests and offline tooling.
    pub fn immediate(max_retries: usize) -> Self {
        Self {
            max_retries,
            retry_delay_ms: 0,
            retry_max_delay_ms: 0,
        }
    }
}
