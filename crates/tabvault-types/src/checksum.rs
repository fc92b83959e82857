use blake2::digest::consts::U32;
use blake2::{Blake2b, Digest};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{Result, VaultError};

type Blake2b256 = Blake2b<U32>;

/// BLAKE2b-256 digest of a canonical payload, hex-encoded when persisted.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub struct Checksum(pub [u8; 32]);

impl Checksum {
    pub fn compute(data: &[u8]) -> Self {
        let mut hasher = Blake2b256::new();
        hasher.update(data);
        let mut out = [0u8; 32];
        out.copy_from_slice(&hasher.finalize());
        Checksum(out)
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    pub fn from_hex(s: &str) -> Result<Self> {
        let bytes = hex::decode(s)
            .map_err(|e| VaultError::InvalidFormat(format!("checksum is not hex: {e}")))?;
        let arr: [u8; 32] = bytes.try_into().map_err(|v: Vec<u8>| {
            VaultError::InvalidFormat(format!("checksum must be 32 bytes, got {}", v.len()))
        })?;
        Ok(Checksum(arr))
    }
}

impl From<Checksum> for String {
    fn from(value: Checksum) -> Self {
        value.to_hex()
    }
}

impl TryFrom<String> for Checksum {
    type Error = VaultError;

    fn try_from(value: String) -> Result<Self> {
        Checksum::from_hex(&value)
    }
}

impl fmt::Debug for Checksum {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Checksum({})", &self.to_hex()[..16])
    }
}

impl fmt::Display for Checksum {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn compute_deterministic() {
        assert_eq!(Checksum::compute(b"vault"), Checksum::compute(b"vault"));
    }

    #[test]
    fn single_byte_change_changes_digest() {
        assert_ne!(Checksum::compute(b"[1,2,3]"), Checksum::compute(b"[1,2,4]"));
    }

    #[test]
    fn hex_roundtrip() {
        let sum = Checksum::compute(b"payload");
        let hex = sum.to_hex();
        assert_eq!(hex.len(), 64);
        assert_eq!(Checksum::from_hex(&hex).unwrap(), sum);
    }

    #[test]
    fn from_hex_rejects_wrong_length() {
        assert!(Checksum::from_hex("abcd").is_err());
        assert!(Checksum::from_hex("zz").is_err());
    }

    #[test]
    fn serializes_as_hex_string() {
        let sum = Checksum::compute(b"x");
        let json = serde_json::to_string(&sum).unwrap();
        assert_eq!(json, format!("\"{}\"", sum.to_hex()));
        let back: Checksum = serde_json::from_str(&json).unwrap();
        assert_eq!(back, sum);
    }
}
