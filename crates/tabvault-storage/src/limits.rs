use std::collections::VecDeque;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tabvault_types::error::{Result, VaultError, QUOTA_MARKER, RATE_LIMIT_MARKER};

use crate::Items;

/// Total byte budget of the sync store.
pub const SYNC_QUOTA_BYTES: u64 = 102_400;
/// Per-item byte ceiling of the sync store (key + serialized value).
pub const SYNC_QUOTA_BYTES_PER_ITEM: u64 = 8_192;
/// Sustained write operations allowed per minute.
pub const SYNC_MAX_WRITE_OPS_PER_MINUTE: u32 = 120;

const RATE_WINDOW: Duration = Duration::from_secs(60);

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreLimits {
    #[serde(default = "default_quota_bytes")]
    pub quota_bytes: u64,
    #[serde(default = "default_quota_bytes_per_item")]
    pub quota_bytes_per_item: u64,
    /// `None` disables write throttling.
    #[serde(default = "default_max_write_ops")]
    pub max_write_ops_per_minute: Option<u32>,
}

fn default_quota_bytes() -> u64 {
    SYNC_QUOTA_BYTES
}

fn default_quota_bytes_per_item() -> u64 {
    SYNC_QUOTA_BYTES_PER_ITEM
}

fn default_max_write_ops() -> Option<u32> {
    Some(SYNC_MAX_WRITE_OPS_PER_MINUTE)
}

impl Default for StoreLimits {
    fn default() -> Self {
        Self {
            quota_bytes: default_quota_bytes(),
            quota_bytes_per_item: default_quota_bytes_per_item(),
            max_write_ops_per_minute: default_max_write_ops(),
        }
    }
}

/// Bytes an item is charged: key length plus its JSON serialization.
pub fn item_size(key: &str, value: &Value) -> u64 {
    let encoded = serde_json::to_string(value).map(|s| s.len()).unwrap_or(0);
    (key.len() + encoded) as u64
}

pub fn total_size(items: &Items) -> u64 {
    items.iter().map(|(k, v)| item_size(k, v)).sum()
}

/// Admission control shared by the store implementations.
pub(crate) struct WriteGate {
    limits: Option<StoreLimits>,
    recent_writes: VecDeque<Instant>,
}

impl WriteGate {
    pub(crate) fn new(limits: Option<StoreLimits>) -> Self {
        Self {
            limits,
            recent_writes: VecDeque::new(),
        }
    }

    pub(crate) fn limits(&self) -> Option<&StoreLimits> {
        self.limits.as_ref()
    }

    /// Charge one write operation against the rate window.
    pub(crate) fn admit_op(&mut self) -> Result<()> {
        let Some(max_ops) = self.limits.as_ref().and_then(|l| l.max_write_ops_per_minute) else {
            return Ok(());
        };
        let now = Instant::now();
        while let Some(front) = self.recent_writes.front() {
            if now.duration_since(*front) >= RATE_WINDOW {
                self.recent_writes.pop_front();
            } else {
                break;
            }
        }
        if self.recent_writes.len() >= max_ops as usize {
            return Err(VaultError::Storage(format!(
                "{RATE_LIMIT_MARKER}_PER_MINUTE quota exceeded ({max_ops} writes per minute)"
            )));
        }
        self.recent_writes.push_back(now);
        Ok(())
    }

    /// Check a batch against the byte budgets without charging the rate window.
    pub(crate) fn check_budget(&self, current: &Items, incoming: &Items) -> Result<()> {
        let Some(limits) = &self.limits else {
            return Ok(());
        };
        let mut total = total_size(current);
        for (key, value) in incoming {
            let size = item_size(key, value);
            if size > limits.quota_bytes_per_item {
                return Err(VaultError::QuotaExceeded(format!(
                    "{QUOTA_MARKER}_PER_ITEM: '{key}' is {size} bytes (limit {})",
                    limits.quota_bytes_per_item
                )));
            }
            if let Some(old) = current.get(key) {
                total -= item_size(key, old);
            }
            total += size;
        }
        if total > limits.quota_bytes {
            return Err(VaultError::QuotaExceeded(format!(
                "{QUOTA_MARKER}: {total} bytes (limit {})",
                limits.quota_bytes
            )));
        }
        Ok(())
    }
}
