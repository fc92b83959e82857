use tabvault_core::VaultSession;

use crate::cli::Commands;
use crate::cmd;

pub(crate) fn dispatch_command(
    command: &Commands,
    session: &mut VaultSession,
) -> Result<(), Box<dyn std::error::Error>> {
    match command {
        Commands::Status => cmd::status::run_status(session),
        Commands::Import { file, merge } => cmd::import::run_import(session, file, *merge),
        Commands::Export { output } => cmd::export::run_export(session, output.as_deref()),
        Commands::Verify => cmd::verify::run_verify(session),
        Commands::Recover { force } => cmd::recover::run_recover(session, *force),
        Commands::Sweep { dry_run } => cmd::sweep::run_sweep(session, *dry_run),
        Commands::Sync { action } => cmd::sync::run_sync(session, *action),
    }
}
