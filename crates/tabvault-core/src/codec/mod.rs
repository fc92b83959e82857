//! Snapshot codec: URL normalization, positional minification, optional
//! domain deduplication and compression.
//!
//! Three canonical shapes exist and [`expand`] tells them apart by looking
//! at the top-level value:
//!
//! - an object with `d` (domains) and `i` (rows): domain-table form
//! - an array whose first element is an array: positional rows
//! - an array of objects: named records, including legacy live-tab records

mod domains;
pub(crate) mod legacy;
mod positional;
pub mod url;

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tabvault_types::checksum::Checksum;
use tabvault_types::error::{Result, VaultError};
use tabvault_types::item::{ArchivedItem, VaultSnapshot};

use crate::compress::{pack_text, unpack_text, Compression};
use crate::config::EngineConfig;
use domains::DomainTable;

use self::url::CompactUrl;
pub use self::url::{compact_url, expand_url, normalize_url};

const DOMAINS_FIELD: &str = "d";
const ROWS_FIELD: &str = "i";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PayloadShape {
    Named,
    Positional,
    DomainTable,
}

impl PayloadShape {
    pub fn is_minified(self) -> bool {
        self != PayloadShape::Named
    }
}

/// A snapshot encoded for storage.
#[derive(Debug, Clone)]
pub struct EncodedPayload {
    /// Pre-compression JSON; the checksum is computed over it.
    pub canonical: String,
    /// Compressed, base64-encoded form that gets chunked.
    pub packed: String,
    pub shape: PayloadShape,
    pub checksum: Checksum,
}

#[derive(Debug, Clone)]
pub struct Codec {
    compression: Compression,
    dedup_min_items: usize,
    dedup_safety_factor: f64,
}

impl Codec {
    pub fn new(compression: Compression, dedup_min_items: usize, dedup_safety_factor: f64) -> Self {
        Self {
            compression,
            dedup_min_items,
            dedup_safety_factor,
        }
    }

    pub fn from_config(config: &EngineConfig) -> Self {
        Self::new(
            config.compression.codec(),
            config.dedup_min_items,
            config.dedup_safety_factor,
        )
    }

    pub fn compression(&self) -> Compression {
        self.compression
    }

    /// Positional form, with a domain table when it pays for itself.
    pub fn minify(&self, snapshot: &VaultSnapshot) -> (Value, PayloadShape) {
        if domains::worth_deduplicating(snapshot, self.dedup_min_items, self.dedup_safety_factor) {
            let table = DomainTable::build(snapshot);
            let rows = positional::encode_rows(snapshot, &|url: &CompactUrl| table.encode(url));
            let value = json!({ DOMAINS_FIELD: table.domains(), ROWS_FIELD: rows });
            (value, PayloadShape::DomainTable)
        } else {
            let rows = positional::encode_rows(snapshot, &|url: &CompactUrl| url.to_compact());
            (rows, PayloadShape::Positional)
        }
    }

    /// The pre-compression JSON text for a snapshot.
    pub fn canonical(&self, snapshot: &VaultSnapshot, minify: bool) -> Result<(String, PayloadShape)> {
        if minify {
            let (value, shape) = self.minify(snapshot);
            Ok((serde_json::to_string(&value)?, shape))
        } else {
            let normalized = normalize_snapshot(snapshot);
            Ok((serde_json::to_string(&normalized)?, PayloadShape::Named))
        }
    }

    pub fn encode(&self, snapshot: &VaultSnapshot, minify: bool) -> Result<EncodedPayload> {
        let (canonical, shape) = self.canonical(snapshot, minify)?;
        let packed = pack_text(self.compression, &canonical)?;
        let checksum = Checksum::compute(canonical.as_bytes());
        Ok(EncodedPayload {
            canonical,
            packed,
            shape,
            checksum,
        })
    }
}

/// Decompress a packed payload, returning the snapshot and the canonical
/// text it was decoded from.
pub fn decode(packed: &str, fallback_saved_at: i64) -> Result<(VaultSnapshot, String)> {
    let canonical = unpack_text(packed)?;
    let snapshot = parse_canonical(&canonical, fallback_saved_at)?;
    Ok((snapshot, canonical))
}

pub fn parse_canonical(canonical: &str, fallback_saved_at: i64) -> Result<VaultSnapshot> {
    let value: Value = serde_json::from_str(canonical)?;
    expand(value, fallback_saved_at)
}

/// Inverse of minification for every canonical shape.
///
/// `fallback_saved_at` stamps legacy records that carry no archive time.
pub fn expand(value: Value, fallback_saved_at: i64) -> Result<VaultSnapshot> {
    match value {
        Value::Object(mut obj) if obj.contains_key(DOMAINS_FIELD) => {
            let table: Vec<String> = match obj.remove(DOMAINS_FIELD) {
                Some(d) => serde_json::from_value(d)?,
                None => Vec::new(),
            };
            let Some(Value::Array(rows)) = obj.remove(ROWS_FIELD) else {
                return Err(VaultError::InvalidFormat(
                    "domain table payload has no row array".into(),
                ));
            };
            let items = positional::decode_rows(&rows, &|field: &str| {
                Ok(expand_url(&domains::decode_field(field, &table)?))
            })?;
            Ok(VaultSnapshot::new(items))
        }
        Value::Array(rows) => {
            let Some(first) = rows.first() else {
                return Ok(VaultSnapshot::default());
            };
            if first.is_array() {
                let items = positional::decode_rows(&rows, &|field: &str| Ok(expand_url(field)))?;
                Ok(VaultSnapshot::new(items))
            } else if first.is_object() {
                let mut items = rows
                    .into_iter()
                    .enumerate()
                    .map(|(i, record)| legacy::item_from_object(record, fallback_saved_at, i))
                    .collect::<Result<Vec<_>>>()?;
                legacy::ensure_unique_ids(&mut items);
                Ok(VaultSnapshot::new(items))
            } else {
                Err(VaultError::InvalidFormat(format!(
                    "unexpected record type in payload: {}",
                    json_kind(first)
                )))
            }
        }
        other => Err(VaultError::InvalidFormat(format!(
            "unexpected payload root: {}",
            json_kind(&other)
        ))),
    }
}

/// The snapshot as it reads back after a round trip through the codec.
pub fn normalize_snapshot(snapshot: &VaultSnapshot) -> VaultSnapshot {
    let mut normalized = snapshot.clone();
    for item in &mut normalized.items {
        match item {
            ArchivedItem::Tab(tab) => tab.url = normalize_url(&tab.url),
            ArchivedItem::Group(group) => {
                for tab in &mut group.tabs {
                    tab.url = normalize_url(&tab.url);
                }
            }
        }
    }
    normalized
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
