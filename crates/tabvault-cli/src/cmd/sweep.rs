use tabvault_core::VaultSession;

pub(crate) fn run_sweep(
    session: &VaultSession,
    dry_run: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let keys = if dry_run {
        let stats = session.stats()?;
        if let Some(err) = stats.meta_error {
            return Err(format!("vault meta is unreadable, not sweeping: {err}").into());
        }
        stats.orphan_keys
    } else {
        session.sweep_orphans()?
    };

    if keys.is_empty() {
        println!("No orphan chunk keys.");
        return Ok(());
    }
    let verb = if dry_run { "Would remove" } else { "Removed" };
    println!("{verb} {} orphan chunk key(s):", keys.len());
    for key in &keys {
        println!("  {key}");
    }
    Ok(())
}
