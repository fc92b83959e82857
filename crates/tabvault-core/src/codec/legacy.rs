//! Conversion of object-shaped records into archived items.
//!
//! Current named records (`{"type": "tab", "savedAt": ..}`) deserialize
//! directly. Records written by old releases mirror live browser tabs
//! (`active`, `windowId`, `index`, `mutedInfo`, numeric `id`) and are mapped
//! field by field into the archived shape.

use std::collections::HashSet;

use serde_json::{Map, Value};
use tabvault_types::error::{Result, VaultError};
use tabvault_types::item::{ArchivedGroup, ArchivedItem, ArchivedTab, DEFAULT_GROUP_COLOR};

/// Fields that only exist on live browser tabs.
const LIVE_TAB_FIELDS: &[&str] = &[
    "active",
    "windowId",
    "index",
    "highlighted",
    "incognito",
    "mutedInfo",
    "discarded",
    "status",
    "groupId",
    "openerTabId",
];

/// Whether an object carries live-tab-only state and needs field mapping.
pub(crate) fn is_live_shaped(obj: &Map<String, Value>) -> bool {
    LIVE_TAB_FIELDS.iter().any(|f| obj.contains_key(*f))
}

/// Convert one object record. `fallback_saved_at` is used when the record
/// carries no archive time; `ordinal` disambiguates records without any id.
pub(crate) fn item_from_object(
    value: Value,
    fallback_saved_at: i64,
    ordinal: usize,
) -> Result<ArchivedItem> {
    let Value::Object(obj) = value else {
        return Err(VaultError::InvalidFormat(format!(
            "record {ordinal} is not an object"
        )));
    };
    let is_named = obj.contains_key("type") && obj.contains_key("savedAt");
    if is_named && !is_live_shaped(&obj) {
        if let Ok(item) = serde_json::from_value::<ArchivedItem>(Value::Object(obj.clone())) {
            return Ok(item);
        }
    }
    let is_group = obj.get("type").and_then(Value::as_str) == Some("group")
        || obj.get("tabs").is_some_and(Value::is_array);
    if is_group {
        Ok(ArchivedItem::Group(group_from_object(
            &obj,
            fallback_saved_at,
            ordinal,
        )?))
    } else {
        Ok(ArchivedItem::Tab(tab_from_object(
            &obj,
            fallback_saved_at,
            &ordinal.to_string(),
        )?))
    }
}

fn tab_from_object(
    obj: &Map<String, Value>,
    fallback_saved_at: i64,
    ordinal: &str,
) -> Result<ArchivedTab> {
    let url = str_field(obj, "url")
        .or_else(|| str_field(obj, "pendingUrl"))
        .ok_or_else(|| VaultError::InvalidFormat(format!("legacy tab {ordinal} has no url")))?;
    let (id, original_id) = ids_of(obj, ordinal);
    let was_muted = obj
        .get("mutedInfo")
        .and_then(|m| m.get("muted"))
        .and_then(Value::as_bool)
        .or_else(|| bool_field(obj, "wasMuted"))
        .or_else(|| bool_field(obj, "muted"))
        .unwrap_or(false);
    Ok(ArchivedTab {
        id,
        original_id,
        saved_at: saved_at_of(obj).unwrap_or(fallback_saved_at),
        title: str_field(obj, "title").unwrap_or_default(),
        url,
        fav_icon_url: str_field(obj, "favIconUrl"),
        was_pinned: bool_field(obj, "wasPinned")
            .or_else(|| bool_field(obj, "pinned"))
            .unwrap_or(false),
        was_muted,
        was_frozen: bool_field(obj, "wasFrozen")
            .or_else(|| bool_field(obj, "frozen"))
            .or_else(|| bool_field(obj, "discarded"))
            .unwrap_or(false),
    })
}

fn group_from_object(
    obj: &Map<String, Value>,
    fallback_saved_at: i64,
    ordinal: usize,
) -> Result<ArchivedGroup> {
    let ordinal_str = ordinal.to_string();
    let (id, original_id) = ids_of(obj, &ordinal_str);
    let saved_at = saved_at_of(obj).unwrap_or(fallback_saved_at);
    let mut tabs = Vec::new();
    if let Some(Value::Array(members)) = obj.get("tabs") {
        for (i, member) in members.iter().enumerate() {
            let Value::Object(member) = member else {
                return Err(VaultError::InvalidFormat(format!(
                    "group {ordinal} member {i} is not an object"
                )));
            };
            tabs.push(tab_from_object(member, saved_at, &format!("{ordinal}.{i}"))?);
        }
    }
    Ok(ArchivedGroup {
        id,
        original_id,
        saved_at,
        title: str_field(obj, "title").unwrap_or_default(),
        color: str_field(obj, "color").unwrap_or_else(|| DEFAULT_GROUP_COLOR.to_string()),
        collapsed: bool_field(obj, "collapsed").unwrap_or(false),
        tabs,
    })
}

/// Vault id and the id the record had in the live system.
fn ids_of(obj: &Map<String, Value>, ordinal: &str) -> (String, Option<i64>) {
    let original_id = obj
        .get("originalId")
        .and_then(Value::as_i64)
        .or_else(|| obj.get("id").and_then(Value::as_i64));
    let id = match obj.get("id") {
        Some(Value::String(s)) if !s.is_empty() => s.clone(),
        Some(Value::Number(n)) => format!("legacy-{n}"),
        _ => format!("legacy-r{ordinal}"),
    };
    (id, original_id)
}

fn saved_at_of(obj: &Map<String, Value>) -> Option<i64> {
    ["savedAt", "archivedAt", "lastAccessed"]
        .iter()
        .find_map(|f| obj.get(*f).and_then(Value::as_f64))
        .map(|ms| ms as i64)
}

fn str_field(obj: &Map<String, Value>, name: &str) -> Option<String> {
    obj.get(name).and_then(Value::as_str).map(str::to_string)
}

fn bool_field(obj: &Map<String, Value>, name: &str) -> Option<bool> {
    obj.get(name).and_then(Value::as_bool)
}

/// Rename colliding ids so the vault-wide uniqueness invariant holds after
/// migrating records that were never checked for it.
pub(crate) fn ensure_unique_ids(items: &mut [ArchivedItem]) {
    let mut seen: HashSet<String> = HashSet::new();
    let mut claim = |id: &mut String| {
        if seen.insert(id.clone()) {
            return;
        }
        let mut n = 1usize;
        loop {
            let candidate = format!("{id}-{n}");
            if seen.insert(candidate.clone()) {
                *id = candidate;
                return;
            }
            n += 1;
        }
    };
    for item in items.iter_mut() {
        match item {
            ArchivedItem::Tab(tab) => claim(&mut tab.id),
            ArchivedItem::Group(group) => {
                claim(&mut group.id);
                for tab in group.tabs.iter_mut() {
                    claim(&mut tab.id);
                }
            }
        }
    }
}
