use std::io::Read;

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use serde::{Deserialize, Serialize};
use tabvault_types::error::{Result, VaultError};

use crate::config::CompressionAlgorithm;

const TAG_NONE: u8 = 0x00;
const TAG_LZ4: u8 = 0x01;
const TAG_ZSTD: u8 = 0x02;

/// Maximum decompressed output size. A vault is a few hundred KiB at most, so
/// anything beyond this is a corrupt or hostile payload.
const MAX_DECOMPRESS_SIZE: u64 = 16 * 1024 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Compression {
    None,
    Lz4,
    Zstd { level: i32 },
}

impl Default for Compression {
    fn default() -> Self {
        Compression::Zstd { level: 19 }
    }
}

impl Compression {
    pub fn from_algorithm(algorithm: CompressionAlgorithm, zstd_level: i32) -> Self {
        match algorithm {
            CompressionAlgorithm::None => Compression::None,
            CompressionAlgorithm::Lz4 => Compression::Lz4,
            CompressionAlgorithm::Zstd => Compression::Zstd { level: zstd_level },
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Compression::None => "none",
            Compression::Lz4 => "lz4",
            Compression::Zstd { .. } => "zstd",
        }
    }
}

/// Compress data and prepend a 1-byte tag identifying the codec.
pub fn compress(compression: Compression, data: &[u8]) -> Result<Vec<u8>> {
    match compression {
        Compression::None => {
            let mut out = Vec::with_capacity(1 + data.len());
            out.push(TAG_NONE);
            out.extend_from_slice(data);
            Ok(out)
        }
        Compression::Lz4 => {
            let compressed = lz4_flex::compress_prepend_size(data);
            let mut out = Vec::with_capacity(1 + compressed.len());
            out.push(TAG_LZ4);
            out.extend_from_slice(&compressed);
            Ok(out)
        }
        Compression::Zstd { level } => zstd_compress(level, data),
    }
}

fn zstd_compress(level: i32, data: &[u8]) -> Result<Vec<u8>> {
    let compressed = zstd::bulk::compress(data, level)
        .map_err(|e| VaultError::Other(format!("zstd compress: {e}")))?;
    let mut out = Vec::with_capacity(1 + compressed.len());
    out.push(TAG_ZSTD);
    out.extend_from_slice(&compressed);
    Ok(out)
}

/// Decompress data by reading the 1-byte tag prefix and dispatching.
pub fn decompress(data: &[u8]) -> Result<Vec<u8>> {
    if data.is_empty() {
        return Err(VaultError::Decompression("empty data".into()));
    }
    let tag = data[0];
    let payload = &data[1..];
    match tag {
        TAG_NONE => Ok(payload.to_vec()),
        TAG_LZ4 => {
            let Some(size_prefix) = payload.get(..4) else {
                return Err(VaultError::Decompression("lz4: payload too short".into()));
            };
            let mut size_bytes = [0u8; 4];
            size_bytes.copy_from_slice(size_prefix);
            let uncompressed_size = u32::from_le_bytes(size_bytes) as u64;
            if uncompressed_size > MAX_DECOMPRESS_SIZE {
                return Err(VaultError::Decompression(format!(
                    "lz4: decompressed size ({uncompressed_size}) exceeds limit of {MAX_DECOMPRESS_SIZE} bytes"
                )));
            }
            lz4_flex::decompress_size_prepended(payload)
                .map_err(|e| VaultError::Decompression(format!("lz4: {e}")))
        }
        TAG_ZSTD => {
            let mut decoder = zstd::stream::Decoder::new(std::io::Cursor::new(payload))
                .map_err(|e| VaultError::Decompression(format!("zstd init: {e}")))?;
            let mut output = Vec::new();
            decoder
                .by_ref()
                .take(MAX_DECOMPRESS_SIZE + 1)
                .read_to_end(&mut output)
                .map_err(|e| VaultError::Decompression(format!("zstd: {e}")))?;
            if output.len() as u64 > MAX_DECOMPRESS_SIZE {
                return Err(VaultError::Decompression(format!(
                    "zstd: decompressed size exceeds limit of {MAX_DECOMPRESS_SIZE} bytes"
                )));
            }
            Ok(output)
        }
        _ => Err(VaultError::UnknownCompressionTag(tag)),
    }
}

/// Compress a text payload into the string form stored in the key-value
/// store: the tagged compressed bytes, base64 encoded.
pub fn pack_text(compression: Compression, text: &str) -> Result<String> {
    let compressed = compress(compression, text.as_bytes())?;
    Ok(STANDARD.encode(compressed))
}

/// Inverse of [`pack_text`].
pub fn unpack_text(packed: &str) -> Result<String> {
    let bytes = STANDARD
        .decode(packed)
        .map_err(|e| VaultError::Decompression(format!("base64: {e}")))?;
    let plain = decompress(&bytes)?;
    String::from_utf8(plain).map_err(|e| VaultError::Decompression(format!("utf-8: {e}")))
}
