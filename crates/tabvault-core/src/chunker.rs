//! Splitting a packed payload into per-item-sized chunks.
//!
//! Each chunk is stored as a JSON string under its own key, so its cost is
//! the key length plus the escaped, quoted string length. The split point for
//! every chunk is the largest character boundary whose cost still fits.

use serde_json::Value;
use tabvault_storage::Items;
use tabvault_types::error::{Result, VaultError};

use crate::config::KeyLayout;

/// Chunks of one payload together with the keys they are stored under.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChunkPlan {
    pub chunks: Vec<String>,
    pub keys: Vec<String>,
}

impl ChunkPlan {
    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    /// Bytes the chunks will be charged in the store.
    pub fn stored_bytes(&self) -> u64 {
        self.keys
            .iter()
            .zip(&self.chunks)
            .map(|(key, chunk)| key.len() as u64 + stored_len(chunk))
            .sum()
    }

    pub fn into_items(self) -> Items {
        self.keys
            .into_iter()
            .zip(self.chunks)
            .map(|(key, chunk)| (key, Value::String(chunk)))
            .collect()
    }
}

/// Bytes a string occupies once serialized as a JSON string value.
pub fn stored_len(segment: &str) -> u64 {
    2 + segment.chars().map(escaped_len).sum::<u64>()
}

fn escaped_len(c: char) -> u64 {
    match c {
        '"' | '\\' | '\n' | '\r' | '\t' | '\u{08}' | '\u{0c}' => 2,
        c if (c as u32) < 0x20 => 6,
        c => c.len_utf8() as u64,
    }
}

/// Split `text` into chunks keyed by the layout's dense, zero-based chunk keys.
///
/// Each chunk plus its key stays within `per_item_quota - overhead`. Fails with
/// [`VaultError::ChunkBudgetExceeded`] when not even one character fits.
pub fn plan_chunks(
    text: &str,
    keys: &KeyLayout,
    per_item_quota: u64,
    overhead: u64,
) -> Result<ChunkPlan> {
    // prefix[i] = escaped length of the first i chars; bounds[i] = byte offset of char i
    let mut prefix = Vec::with_capacity(text.len() + 1);
    let mut bounds = Vec::with_capacity(text.len() + 1);
    prefix.push(0u64);
    for (offset, c) in text.char_indices() {
        bounds.push(offset);
        prefix.push(prefix[prefix.len() - 1] + escaped_len(c));
    }
    bounds.push(text.len());
    let char_count = bounds.len() - 1;

    let mut plan = ChunkPlan::default();
    let mut start = 0usize;
    while start < char_count {
        let key = keys.chunk_key(plan.len());
        let budget = per_item_quota
            .saturating_sub(key.len() as u64)
            .saturating_sub(overhead);
        let fits = |end: usize| 2 + prefix[end] - prefix[start] <= budget;
        if !fits(start + 1) {
            return Err(VaultError::ChunkBudgetExceeded { key, budget });
        }
        // largest end in (start, char_count] that fits
        let (mut lo, mut hi) = (start + 1, char_count);
        while lo < hi {
            let mid = lo + (hi - lo + 1) / 2;
            if fits(mid) {
                lo = mid;
            } else {
                hi = mid - 1;
            }
        }
        plan.chunks.push(text[bounds[start]..bounds[lo]].to_string());
        plan.keys.push(key);
        start = lo;
    }
    Ok(plan)
}

/// Concatenate chunks in key order.
pub fn reassemble<'a>(chunks: impl IntoIterator<Item = &'a str>) -> String {
    chunks.into_iter().collect()
}
