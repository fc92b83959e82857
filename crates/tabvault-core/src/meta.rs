use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tabvault_types::checksum::Checksum;
use tabvault_types::error::{Result, VaultError};

use crate::codec::PayloadShape;
use crate::tier::CompressionTier;

/// Current storage format. Version 1 stored chunks without a checksum.
pub const FORMAT_VERSION: u32 = 2;

/// First version whose meta carries a checksum.
const CHECKSUM_SINCE: u32 = 2;

/// Describes the chunked payload currently in the remote store.
/// Stored as the sole value of the meta key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StorageMeta {
    pub version: u32,
    pub chunk_count: usize,
    pub chunk_keys: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub checksum: Option<Checksum>,
    pub saved_at: DateTime<Utc>,
    #[serde(default)]
    pub minified: bool,
    #[serde(default)]
    pub domain_deduped: bool,
    #[serde(default)]
    pub tier: CompressionTier,
    /// Codec name, informational; the payload's tag byte is authoritative.
    #[serde(default)]
    pub compression: String,
}

impl StorageMeta {
    pub fn new(
        chunk_keys: Vec<String>,
        checksum: Checksum,
        shape: PayloadShape,
        tier: CompressionTier,
        compression: &str,
    ) -> Self {
        Self {
            version: FORMAT_VERSION,
            chunk_count: chunk_keys.len(),
            chunk_keys,
            checksum: Some(checksum),
            saved_at: Utc::now(),
            minified: shape.is_minified(),
            domain_deduped: shape == PayloadShape::DomainTable,
            tier,
            compression: compression.to_string(),
        }
    }

    /// Parse a stored meta value.
    ///
    /// The version is checked before anything else so that a meta written
    /// by a newer release is reported as unsupported rather than malformed.
    pub fn from_value(value: Value) -> Result<Self> {
        let version = value
            .get("version")
            .and_then(Value::as_u64)
            .ok_or_else(|| VaultError::InvalidFormat("meta has no version".into()))?;
        let version = u32::try_from(version)
            .map_err(|_| VaultError::UnsupportedVersion(u32::MAX))?;
        if version > FORMAT_VERSION {
            return Err(VaultError::UnsupportedVersion(version));
        }
        let meta: StorageMeta = serde_json::from_value(value)?;
        if meta.chunk_count != meta.chunk_keys.len() {
            return Err(VaultError::InvalidFormat(format!(
                "meta lists {} chunk keys but a chunk count of {}",
                meta.chunk_keys.len(),
                meta.chunk_count
            )));
        }
        if meta.version >= CHECKSUM_SINCE && meta.checksum.is_none() {
            return Err(VaultError::InvalidFormat(format!(
                "version {} meta without checksum",
                meta.version
            )));
        }
        Ok(meta)
    }

    pub fn to_value(&self) -> Result<Value> {
        Ok(serde_json::to_value(self)?)
    }

    /// Whether this meta predates the current format and must be rewritten.
    pub fn needs_upgrade(&self) -> bool {
        self.version < FORMAT_VERSION
    }

    pub fn saved_at_millis(&self) -> i64 {
        self.saved_at.timestamp_millis()
    }
}
