//! Positional row schema.
//!
//! Field order is the key; optional fields are `null` so positions stay aligned.
//!
//! ```text
//! tab:   ["t", id, originalId|null, savedAt, title, url, favIcon|null, flags]
//! group: ["g", id, originalId|null, savedAt, title, color, collapsed, [tab rows]]
//! ```
//!
//! `flags` packs the `was_*` booleans; `collapsed` is `0` or `1`.

use serde_json::{json, Value};
use tabvault_types::error::{Result, VaultError};
use tabvault_types::item::{ArchivedGroup, ArchivedItem, ArchivedTab, VaultSnapshot};

use super::url::CompactUrl;

const TAB_TAG: &str = "t";
const GROUP_TAG: &str = "g";
const ROW_LEN: usize = 8;

const FLAG_PINNED: u64 = 1;
const FLAG_MUTED: u64 = 2;
const FLAG_FROZEN: u64 = 4;

/// Encode every item as a row; `url_field` renders each tab URL.
pub(crate) fn encode_rows(
    snapshot: &VaultSnapshot,
    url_field: &dyn Fn(&CompactUrl) -> String,
) -> Value {
    Value::Array(
        snapshot
            .items
            .iter()
            .map(|item| match item {
                ArchivedItem::Tab(tab) => tab_row(tab, url_field),
                ArchivedItem::Group(group) => group_row(group, url_field),
            })
            .collect(),
    )
}

fn tab_row(tab: &ArchivedTab, url_field: &dyn Fn(&CompactUrl) -> String) -> Value {
    let mut flags = 0;
    if tab.was_pinned {
        flags |= FLAG_PINNED;
    }
    if tab.was_muted {
        flags |= FLAG_MUTED;
    }
    if tab.was_frozen {
        flags |= FLAG_FROZEN;
    }
    json!([
        TAB_TAG,
        tab.id,
        tab.original_id,
        tab.saved_at,
        tab.title,
        url_field(&CompactUrl::parse(&tab.url)),
        tab.fav_icon_url,
        flags,
    ])
}

fn group_row(group: &ArchivedGroup, url_field: &dyn Fn(&CompactUrl) -> String) -> Value {
    let tabs: Vec<Value> = group.tabs.iter().map(|t| tab_row(t, url_field)).collect();
    json!([
        GROUP_TAG,
        group.id,
        group.original_id,
        group.saved_at,
        group.title,
        group.color,
        u8::from(group.collapsed),
        tabs,
    ])
}

/// Decode rows; `resolve_url` turns a stored URL field back into a full URL.
pub(crate) fn decode_rows(
    rows: &[Value],
    resolve_url: &dyn Fn(&str) -> Result<String>,
) -> Result<Vec<ArchivedItem>> {
    rows.iter()
        .enumerate()
        .map(|(i, row)| {
            let fields = row_fields(row, i)?;
            match fields[0].as_str() {
                Some(TAB_TAG) => Ok(ArchivedItem::Tab(decode_tab(fields, i, resolve_url)?)),
                Some(GROUP_TAG) => Ok(ArchivedItem::Group(decode_group(fields, i, resolve_url)?)),
                _ => Err(invalid(i, "unknown row tag")),
            }
        })
        .collect()
}

fn row_fields(row: &Value, i: usize) -> Result<&[Value]> {
    match row {
        Value::Array(fields) if fields.len() == ROW_LEN => Ok(fields),
        Value::Array(fields) => Err(invalid(
            i,
            &format!("expected {ROW_LEN} fields, got {}", fields.len()),
        )),
        _ => Err(invalid(i, "row is not an array")),
    }
}

fn decode_tab(
    fields: &[Value],
    i: usize,
    resolve_url: &dyn Fn(&str) -> Result<String>,
) -> Result<ArchivedTab> {
    if fields[0].as_str() != Some(TAB_TAG) {
        return Err(invalid(i, "group member is not a tab row"));
    }
    let flags = fields[7]
        .as_u64()
        .ok_or_else(|| invalid(i, "flags must be an integer"))?;
    Ok(ArchivedTab {
        id: string_at(fields, 1, i)?,
        original_id: optional_i64(&fields[2], i)?,
        saved_at: fields[3]
            .as_i64()
            .ok_or_else(|| invalid(i, "savedAt must be an integer"))?,
        title: string_at(fields, 4, i)?,
        url: resolve_url(&string_at(fields, 5, i)?)?,
        fav_icon_url: match &fields[6] {
            Value::Null => None,
            Value::String(s) => Some(s.clone()),
            _ => return Err(invalid(i, "favicon must be a string or null")),
        },
        was_pinned: flags & FLAG_PINNED != 0,
        was_muted: flags & FLAG_MUTED != 0,
        was_frozen: flags & FLAG_FROZEN != 0,
    })
}

fn decode_group(
    fields: &[Value],
    i: usize,
    resolve_url: &dyn Fn(&str) -> Result<String>,
) -> Result<ArchivedGroup> {
    let Value::Array(members) = &fields[7] else {
        return Err(invalid(i, "group tabs must be an array"));
    };
    let tabs = members
        .iter()
        .map(|member| decode_tab(row_fields(member, i)?, i, resolve_url))
        .collect::<Result<Vec<_>>>()?;
    Ok(ArchivedGroup {
        id: string_at(fields, 1, i)?,
        original_id: optional_i64(&fields[2], i)?,
        saved_at: fields[3]
            .as_i64()
            .ok_or_else(|| invalid(i, "savedAt must be an integer"))?,
        title: string_at(fields, 4, i)?,
        color: string_at(fields, 5, i)?,
        collapsed: fields[6].as_u64().is_some_and(|c| c != 0),
        tabs,
    })
}

fn string_at(fields: &[Value], pos: usize, i: usize) -> Result<String> {
    fields[pos]
        .as_str()
        .map(str::to_string)
        .ok_or_else(|| invalid(i, &format!("field {pos} must be a string")))
}

fn optional_i64(value: &Value, i: usize) -> Result<Option<i64>> {
    match value {
        Value::Null => Ok(None),
        v => v
            .as_i64()
            .map(Some)
            .ok_or_else(|| invalid(i, "originalId must be an integer or null")),
    }
}

fn invalid(row: usize, detail: &str) -> VaultError {
    VaultError::InvalidFormat(format!("positional row {row}: {detail}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::url::expand_url;
    use crate::testutil::{group_item, tab_item};

    fn plain(url: &CompactUrl) -> String {
        url.to_compact()
    }

    fn expand(field: &str) -> Result<String> {
        Ok(expand_url(field))
    }

    #[test]
    fn tab_row_layout() {
        let mut item = tab_item("a", "https://www.example.com/x/");
        if let ArchivedItem::Tab(tab) = &mut item {
            tab.was_pinned = true;
            tab.was_frozen = true;
        }
        let rows = encode_rows(&VaultSnapshot::new(vec![item]), &plain);
        let row = &rows[0];
        assert_eq!(row[0], "t");
        assert_eq!(row[1], "a");
        assert_eq!(row[5], "s:example.com/x");
        assert_eq!(row[7], 5);
    }

    #[test]
    fn rows_decode_back() {
        let snapshot = VaultSnapshot::new(vec![
            tab_item("a", "https://example.com/a"),
            group_item("g", &["https://example.com/b", "http://other.example/c"]),
        ]);
        let rows = encode_rows(&snapshot, &plain);
        let Value::Array(rows) = rows else {
            panic!("rows must be an array");
        };
        let decoded = decode_rows(&rows, &expand).unwrap();
        assert_eq!(decoded, snapshot.items);
    }

    #[test]
    fn short_row_is_rejected() {
        let rows = vec![json!(["t", "a", null, 1])];
        assert!(matches!(
            decode_rows(&rows, &expand),
            Err(VaultError::InvalidFormat(_))
        ));
    }

    #[test]
    fn unknown_tag_is_rejected() {
        let rows = vec![json!(["x", "a", null, 1, "", "s:a", null, 0])];
        assert!(decode_rows(&rows, &expand).is_err());
    }
}
