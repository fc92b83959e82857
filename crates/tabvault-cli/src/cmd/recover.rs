use tabvault_core::{RecoveryOutcome, VaultSession};

pub(crate) fn run_recover(
    session: &mut VaultSession,
    force: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    if !session.sync_enabled()? {
        println!("Sync is disabled; nothing to recover.");
        return Ok(());
    }
    let load = session.load();
    let outcome = if force {
        session.recover(&load.snapshot)?
    } else {
        session.recover_if_needed(&load)?
    };
    match outcome {
        RecoveryOutcome::NotNeeded => {
            println!("Remote vault is healthy; nothing to recover.");
            Ok(())
        }
        RecoveryOutcome::Healed(report) => {
            println!(
                "Remote vault rewritten from {} items in {} chunk(s).",
                load.snapshot.len(),
                report.chunk_count
            );
            Ok(())
        }
        RecoveryOutcome::SyncDisabled(report) => {
            let reason = report
                .error()
                .map(|code| code.to_string())
                .unwrap_or_else(|| "unknown".to_string());
            Err(format!(
                "rewrite failed ({reason}); sync is now disabled and the vault stays local"
            )
            .into())
        }
        RecoveryOutcome::Refused(reason) => Err(reason.into()),
    }
}
