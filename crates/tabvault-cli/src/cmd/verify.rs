use tabvault_core::VaultSession;

use crate::table::{add_kv_row, CliTableTheme};

/// Read the remote vault end to end. Any integrity failure is returned as
/// an error so the process exits non-zero.
pub(crate) fn run_verify(session: &VaultSession) -> Result<(), Box<dyn std::error::Error>> {
    if !session.sync_enabled()? {
        println!("Sync is disabled; no remote vault to verify.");
        return Ok(());
    }
    let remote = match session.read_remote() {
        Ok(Some(remote)) => remote,
        Ok(None) => {
            println!("No remote vault stored.");
            return Ok(());
        }
        Err(e) => return Err(format!("remote vault failed verification: {e}").into()),
    };

    let theme = CliTableTheme::detect();
    let mut table = theme.new_kv_table();
    add_kv_row(&mut table, theme, "Items", remote.snapshot.len());
    add_kv_row(&mut table, theme, "Tabs", remote.snapshot.tab_count());
    add_kv_row(&mut table, theme, "Chunks", remote.meta.chunk_count);
    add_kv_row(&mut table, theme, "Checksum", remote.checksum);
    let diff = match &remote.diff {
        Some(diff) => format!(
            "applied ({} added, {} deleted)",
            diff.added.len(),
            diff.deleted.len()
        ),
        None => "none".to_string(),
    };
    add_kv_row(&mut table, theme, "Diff", diff);
    println!("{table}");

    let orphans = session.orphan_keys(Some(&remote.meta))?;
    if !orphans.is_empty() {
        println!();
        let mut listing = theme.new_data_table(&["Orphan key"]);
        for key in &orphans {
            listing.add_row(vec![key.as_str()]);
        }
        println!("{listing}");
    }
    println!();
    println!("Remote vault OK.");
    Ok(())
}
