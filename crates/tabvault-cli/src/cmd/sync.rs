use tabvault_core::VaultSession;

use crate::cli::SyncAction;
use crate::format::describe_save_status;

pub(crate) fn run_sync(
    session: &mut VaultSession,
    action: SyncAction,
) -> Result<(), Box<dyn std::error::Error>> {
    let enabled = session.sync_enabled()?;
    match action {
        SyncAction::Enable if enabled => println!("Sync is already enabled."),
        SyncAction::Enable => {
            let load = session.load();
            let report = session.enable_sync(&load.snapshot)?;
            if let Some(code) = report.error() {
                return Err(format!("could not enable sync ({code}); staying local-only").into());
            }
            println!(
                "Sync enabled: {} items, {}.",
                load.snapshot.len(),
                describe_save_status(report.status)
            );
        }
        SyncAction::Disable if !enabled => println!("Sync is already disabled."),
        SyncAction::Disable => {
            let load = session.load();
            if load.fallback_to_local {
                eprintln!("Warning: remote vault unreadable, keeping the local backup");
            }
            session.disable_sync(&load.snapshot)?;
            println!(
                "Sync disabled; {} items kept in the local backup.",
                load.snapshot.len()
            );
        }
    }
    Ok(())
}
