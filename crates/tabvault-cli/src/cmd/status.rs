use tabvault_core::VaultSession;

use crate::format::{format_bytes, format_usage, layout_label};
use crate::table::{add_kv_row, CliTableTheme};

pub(crate) fn run_status(session: &VaultSession) -> Result<(), Box<dyn std::error::Error>> {
    let stats = session.stats()?;
    let theme = CliTableTheme::detect();

    // Group 1: stored layout
    let mut t1 = theme.new_kv_table();
    add_kv_row(
        &mut t1,
        theme,
        "Sync",
        if stats.sync_enabled { "enabled" } else { "disabled" },
    );
    match (&stats.meta, &stats.meta_error) {
        (Some(meta), _) => {
            add_kv_row(&mut t1, theme, "Format version", meta.version);
            add_kv_row(
                &mut t1,
                theme,
                "Saved",
                meta.saved_at.format("%Y-%m-%d %H:%M:%S UTC"),
            );
            add_kv_row(&mut t1, theme, "Chunks", meta.chunk_count);
            add_kv_row(&mut t1, theme, "Layout", layout_label(meta));
            add_kv_row(&mut t1, theme, "Tier", meta.tier.as_str());
            let compression = if meta.compression.is_empty() {
                "-"
            } else {
                meta.compression.as_str()
            };
            add_kv_row(&mut t1, theme, "Compression", compression);
            let checksum = meta
                .checksum
                .map(|c| c.to_hex()[..16].to_string())
                .unwrap_or_else(|| "-".to_string());
            add_kv_row(&mut t1, theme, "Checksum", checksum);
        }
        (None, Some(err)) => add_kv_row(&mut t1, theme, "Remote vault", format!("unreadable: {err}")),
        (None, None) => add_kv_row(&mut t1, theme, "Remote vault", "none"),
    }
    add_kv_row(
        &mut t1,
        theme,
        "Pending diff",
        if stats.has_diff { "yes" } else { "no" },
    );
    if stats.has_legacy {
        add_kv_row(&mut t1, theme, "Legacy data", "present (migrates on next load)");
    }
    let backup = stats
        .local_backup_items
        .map(|n| format!("{n} items"))
        .unwrap_or_else(|| "none".to_string());
    add_kv_row(&mut t1, theme, "Local backup", backup);
    println!("{t1}");
    println!();

    // Group 2: quota
    let quota = &stats.quota;
    let mut t2 = theme.new_kv_table();
    add_kv_row(
        &mut t2,
        theme,
        "Used",
        format_usage(quota.bytes_used, quota.total_budget),
    );
    add_kv_row(&mut t2, theme, "Vault data", format_bytes(quota.vault_bytes));
    add_kv_row(&mut t2, theme, "Settings", format_bytes(quota.settings_bytes));
    add_kv_row(&mut t2, theme, "Available", format_bytes(quota.bytes_available));
    add_kv_row(&mut t2, theme, "Level", quota.warning_level.as_str());
    println!("{t2}");

    if !stats.orphan_keys.is_empty() {
        println!();
        println!(
            "{} orphan chunk key(s) found; run `tabvault sweep` to remove them.",
            stats.orphan_keys.len()
        );
    }
    Ok(())
}
