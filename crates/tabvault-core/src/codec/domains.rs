use std::collections::HashMap;

use tabvault_types::error::{Result, VaultError};
use tabvault_types::item::{ArchivedItem, VaultSnapshot};

use super::url::CompactUrl;

/// Bytes the domain-table wrapper object adds over a bare row array.
const TABLE_WRAPPER_BYTES: usize = r#"{"d":[],"i":}"#.len();

/// Shared table of `<tag><authority>` strings referenced by index from URLs.
#[derive(Debug, Default)]
pub(crate) struct DomainTable {
    domains: Vec<String>,
    index: HashMap<String, usize>,
}

impl DomainTable {
    /// Collect every web domain in first-appearance order.
    pub(crate) fn build(snapshot: &VaultSnapshot) -> Self {
        let mut table = DomainTable::default();
        for url in snapshot_urls(snapshot) {
            if let Some(key) = url.domain_key() {
                if !table.index.contains_key(&key) {
                    table.index.insert(key.clone(), table.domains.len());
                    table.domains.push(key);
                }
            }
        }
        table
    }

    pub(crate) fn domains(&self) -> &[String] {
        &self.domains
    }

    /// URL field in table form: `<index><rest>` for web URLs, the tagged
    /// compact string otherwise.
    pub(crate) fn encode(&self, url: &CompactUrl) -> String {
        match url.domain_key().and_then(|k| self.index.get(&k)) {
            Some(idx) => format!("{idx}{}", url.rest()),
            None => url.to_compact(),
        }
    }
}

/// Resolve a table-form URL field back to its compact string.
pub(crate) fn decode_field(field: &str, domains: &[String]) -> Result<String> {
    let digits = field.bytes().take_while(u8::is_ascii_digit).count();
    if digits == 0 {
        return Ok(field.to_string());
    }
    let idx: usize = field[..digits]
        .parse()
        .map_err(|_| VaultError::InvalidFormat(format!("bad domain index in '{field}'")))?;
    let domain = domains.get(idx).ok_or_else(|| {
        VaultError::InvalidFormat(format!(
            "domain index {idx} out of range ({} domains)",
            domains.len()
        ))
    })?;
    Ok(format!("{domain}{}", &field[digits..]))
}

/// Whether extracting a domain table pays for itself.
///
/// Savings are the domain bytes removed from each URL minus the index digits
/// that replace them; the cost is each table entry (quoted, comma separated)
/// plus the wrapper object.
pub(crate) fn worth_deduplicating(
    snapshot: &VaultSnapshot,
    min_items: usize,
    safety_factor: f64,
) -> bool {
    if snapshot.len() < min_items {
        return false;
    }
    let table = DomainTable::build(snapshot);
    if table.domains.is_empty() {
        return false;
    }
    let mut savings = 0usize;
    for url in snapshot_urls(snapshot) {
        if let Some(key) = url.domain_key() {
            if let Some(idx) = table.index.get(&key) {
                savings += key.len().saturating_sub(digit_count(*idx));
            }
        }
    }
    let overhead: usize =
        table.domains.iter().map(|d| d.len() + 3).sum::<usize>() + TABLE_WRAPPER_BYTES;
    savings as f64 > overhead as f64 * safety_factor
}

fn digit_count(n: usize) -> usize {
    n.checked_ilog10().map_or(1, |d| d as usize + 1)
}

fn snapshot_urls(snapshot: &VaultSnapshot) -> impl Iterator<Item = CompactUrl> + '_ {
    snapshot.items.iter().flat_map(|item| {
        let urls: Vec<CompactUrl> = match item {
            ArchivedItem::Tab(tab) => vec![CompactUrl::parse(&tab.url)],
            ArchivedItem::Group(group) => group
                .tabs
                .iter()
                .map(|t| CompactUrl::parse(&t.url))
                .collect(),
        };
        urls
    })
}
