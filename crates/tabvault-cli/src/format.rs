use tabvault_core::meta::StorageMeta;
use tabvault_core::SaveStatus;

pub(crate) fn format_bytes(bytes: u64) -> String {
    const KIB: u64 = 1024;
    const MIB: u64 = KIB * 1024;

    if bytes >= MIB {
        format!("{:.2} MiB", bytes as f64 / MIB as f64)
    } else if bytes >= KIB {
        format!("{:.2} KiB", bytes as f64 / KIB as f64)
    } else {
        format!("{bytes} B")
    }
}

/// `used` against `total` with the share in percent.
pub(crate) fn format_usage(used: u64, total: u64) -> String {
    if total == 0 {
        return format_bytes(used);
    }
    let pct = used as f64 / total as f64 * 100.0;
    format!("{} of {}  ({pct:.1}%)", format_bytes(used), format_bytes(total))
}

/// Which payload shape the stored meta describes.
pub(crate) fn layout_label(meta: &StorageMeta) -> &'static str {
    match (meta.minified, meta.domain_deduped) {
        (true, true) => "positional + domain table",
        (true, false) => "positional",
        (false, _) => "named",
    }
}

pub(crate) fn describe_save_status(status: SaveStatus) -> String {
    match status {
        SaveStatus::Synced => "synced (full payload)".to_string(),
        SaveStatus::SyncedDiff => "synced (diff)".to_string(),
        SaveStatus::LocalOnly => "local only (sync disabled)".to_string(),
        SaveStatus::Fallback(code) => format!("kept locally, remote write failed ({code})"),
    }
}
