use std::path::Path;

use serde_json::Value;
use tabvault_core::codec;
use tabvault_core::VaultSession;
use tabvault_types::item::VaultSnapshot;

use crate::format::describe_save_status;

/// Parse an import document: a bare item array (any stored shape, including
/// legacy live-tab records) or an object carrying an `items` array, such as
/// a local backup record.
pub(crate) fn parse_import(text: &str) -> Result<VaultSnapshot, Box<dyn std::error::Error>> {
    let value: Value = serde_json::from_str(text)?;
    let value = match value {
        Value::Object(mut obj) if obj.contains_key("items") => obj
            .remove("items")
            .unwrap_or(Value::Array(Vec::new())),
        other => other,
    };
    let saved_at = chrono::Utc::now().timestamp_millis();
    Ok(codec::expand(value, saved_at)?)
}

/// Append the items of `incoming` whose ids `current` does not have yet.
fn merge_new_items(current: VaultSnapshot, incoming: VaultSnapshot) -> VaultSnapshot {
    let mut merged = current;
    for item in incoming.items {
        if merged.find(item.id()).is_none() {
            merged.items.push(item);
        }
    }
    merged
}

pub(crate) fn run_import(
    session: &mut VaultSession,
    file: &Path,
    merge: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let text = std::fs::read_to_string(file)
        .map_err(|e| format!("cannot read '{}': {e}", file.display()))?;
    let incoming = parse_import(&text)?;

    let load = session.load();
    if load.fallback_to_local {
        eprintln!("Warning: remote vault unreadable, using the local backup as the base");
    }
    let count = incoming.len();
    let snapshot = if merge {
        merge_new_items(load.snapshot, incoming)
    } else {
        incoming
    };

    let report = session.save(&snapshot)?;
    if let Some(code) = report.error() {
        return Err(format!(
            "remote write failed ({code}); {} items kept in the local backup",
            snapshot.len()
        )
        .into());
    }
    println!(
        "Imported {count} items ({} in vault): {}",
        snapshot.len(),
        describe_save_status(report.status)
    );
    if let Some(tier) = report.tier {
        tracing::info!(tier = tier.as_str(), chunks = report.chunk_count, "import saved");
    }
    Ok(())
}
