//! Add/delete deltas against the last full snapshot.
//!
//! A diff is stored under a single key as a [`DiffRecord`]: the packed diff,
//! a checksum of its own canonical JSON and the checksum of the full payload
//! it applies to. Either checksum failing to match makes the diff unusable.

use std::collections::HashSet;

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tabvault_types::checksum::Checksum;
use tabvault_types::error::{Result, VaultError};
use tabvault_types::item::{ArchivedItem, VaultSnapshot};

use crate::codec::{self, Codec};
use crate::compress::{pack_text, unpack_text};

const DIFF_RECORD_VERSION: u32 = 1;

#[derive(Debug, Clone, PartialEq)]
pub struct SnapshotDiff {
    pub added: Vec<ArchivedItem>,
    pub deleted: Vec<String>,
    pub timestamp: DateTime<Utc>,
}

impl SnapshotDiff {
    /// Items of `curr` absent from `prev`, and ids of `prev` absent from `curr`.
    pub fn compute(prev: &VaultSnapshot, curr: &VaultSnapshot) -> Self {
        let prev_ids: HashSet<&str> = prev.items.iter().map(ArchivedItem::id).collect();
        let curr_ids: HashSet<&str> = curr.items.iter().map(ArchivedItem::id).collect();
        Self {
            added: curr
                .items
                .iter()
                .filter(|item| !prev_ids.contains(item.id()))
                .cloned()
                .collect(),
            deleted: prev
                .items
                .iter()
                .map(ArchivedItem::id)
                .filter(|id| !curr_ids.contains(id))
                .map(str::to_string)
                .collect(),
            timestamp: Utc::now(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.deleted.is_empty()
    }

    /// Remove deleted ids from `base` and append the additions.
    pub fn apply(&self, base: &VaultSnapshot) -> VaultSnapshot {
        let deleted: HashSet<&str> = self.deleted.iter().map(String::as_str).collect();
        let mut items: Vec<ArchivedItem> = base
            .items
            .iter()
            .filter(|item| !deleted.contains(item.id()))
            .cloned()
            .collect();
        items.extend(self.added.iter().cloned());
        VaultSnapshot::new(items)
    }

    /// Whether applying this diff to `base` yields exactly `target`. Edits
    /// and reorders of retained items are invisible to an add/delete diff.
    pub fn reproduces(&self, base: &VaultSnapshot, target: &VaultSnapshot) -> bool {
        self.apply(base) == *target
    }

    fn canonical(&self, codec: &Codec) -> Result<String> {
        let (added, _) = codec.canonical(&VaultSnapshot::new(self.added.clone()), true)?;
        let added: Value = serde_json::from_str(&added)?;
        Ok(serde_json::to_string(&json!({
            "a": added,
            "d": self.deleted,
            "t": self.timestamp.timestamp_millis(),
        }))?)
    }

    fn from_canonical(canonical: &str) -> Result<Self> {
        let mut value: Value = serde_json::from_str(canonical)?;
        let timestamp_ms = value
            .get("t")
            .and_then(Value::as_i64)
            .ok_or_else(|| VaultError::InvalidFormat("diff has no timestamp".into()))?;
        let timestamp = Utc
            .timestamp_millis_opt(timestamp_ms)
            .single()
            .ok_or_else(|| VaultError::InvalidFormat(format!("bad diff timestamp {timestamp_ms}")))?;
        let mut field = |name: &str| value.get_mut(name).map(Value::take).unwrap_or_default();
        let added = codec::expand(field("a"), timestamp_ms)?;
        let deleted: Vec<String> = serde_json::from_value(field("d"))?;
        Ok(Self {
            added: added.items,
            deleted,
            timestamp,
        })
    }
}

/// Stored form of a diff.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiffRecord {
    #[serde(rename = "v")]
    pub version: u32,
    /// Checksum of the full payload this diff applies to.
    pub base: Checksum,
    /// Checksum of the diff's canonical JSON.
    pub sum: Checksum,
    pub data: String,
}

impl DiffRecord {
    pub fn encode(codec: &Codec, diff: &SnapshotDiff, base: Checksum) -> Result<Self> {
        let canonical = diff.canonical(codec)?;
        Ok(Self {
            version: DIFF_RECORD_VERSION,
            base,
            sum: Checksum::compute(canonical.as_bytes()),
            data: pack_text(codec.compression(), &canonical)?,
        })
    }

    /// Decode and verify a stored diff against the full payload's checksum.
    pub fn decode(value: Value, base: &Checksum) -> Result<SnapshotDiff> {
        let record: DiffRecord = serde_json::from_value(value)?;
        if record.version > DIFF_RECORD_VERSION {
            return Err(VaultError::UnsupportedVersion(record.version));
        }
        if record.base != *base {
            return Err(VaultError::ChecksumMismatch {
                expected: base.to_hex(),
                actual: record.base.to_hex(),
            });
        }
        let canonical = unpack_text(&record.data)?;
        crate::integrity::verify_canonical(&canonical, &record.sum)?;
        SnapshotDiff::from_canonical(&canonical)
    }

    pub fn to_value(&self) -> Result<Value> {
        Ok(serde_json::to_value(self)?)
    }

    /// Length of the packed diff, compared against the full payload.
    pub fn packed_len(&self) -> usize {
        self.data.len()
    }
}
