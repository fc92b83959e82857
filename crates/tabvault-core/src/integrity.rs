//! Checksums over canonical payloads and the read paths that verify them.

use tabvault_storage::KvStore;
use tabvault_types::checksum::Checksum;
use tabvault_types::error::{Result, VaultError};
use tabvault_types::item::VaultSnapshot;

use crate::chunker::reassemble;
use crate::codec;
use crate::meta::StorageMeta;

pub fn verify_canonical(canonical: &str, expected: &Checksum) -> Result<()> {
    let actual = Checksum::compute(canonical.as_bytes());
    if actual != *expected {
        return Err(VaultError::ChecksumMismatch {
            expected: expected.to_hex(),
            actual: actual.to_hex(),
        });
    }
    Ok(())
}

/// Fetch every chunk the meta lists and join them in order.
pub fn read_packed(store: &dyn KvStore, meta: &StorageMeta) -> Result<String> {
    let mut found = store.get(Some(&meta.chunk_keys))?;
    let mut parts = Vec::with_capacity(meta.chunk_keys.len());
    for key in &meta.chunk_keys {
        match found.remove(key) {
            Some(serde_json::Value::String(part)) => parts.push(part),
            Some(_) => {
                return Err(VaultError::InvalidFormat(format!(
                    "chunk '{key}' is not a string"
                )))
            }
            None => return Err(VaultError::MissingChunk(key.clone())),
        }
    }
    Ok(reassemble(parts.iter().map(String::as_str)))
}

/// Payload read back from the store and checked against its meta.
#[derive(Debug, Clone)]
pub struct VerifiedPayload {
    pub snapshot: VaultSnapshot,
    pub canonical: String,
    pub packed_len: usize,
}

/// Read, decompress and verify the payload described by `meta`.
///
/// Metas written before checksums existed are decoded without verification.
pub fn read_verified(store: &dyn KvStore, meta: &StorageMeta) -> Result<VerifiedPayload> {
    let packed = read_packed(store, meta)?;
    let canonical = crate::compress::unpack_text(&packed)?;
    if let Some(expected) = &meta.checksum {
        verify_canonical(&canonical, expected)?;
    }
    let snapshot = codec::parse_canonical(&canonical, meta.saved_at_millis())?;
    Ok(VerifiedPayload {
        snapshot,
        canonical,
        packed_len: packed.len(),
    })
}

/// Write-verify: re-read what was just written and compare checksums.
/// A backend may accept a write and still truncate it.
pub fn verify_written(store: &dyn KvStore, meta: &StorageMeta) -> Result<()> {
    let packed = read_packed(store, meta)?;
    let canonical = crate::compress::unpack_text(&packed)?;
    match &meta.checksum {
        Some(expected) => verify_canonical(&canonical, expected),
        None => Ok(()),
    }
}
