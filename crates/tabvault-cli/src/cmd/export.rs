use std::path::Path;

use tabvault_core::{LoadSource, VaultSession};

pub(crate) fn run_export(
    session: &mut VaultSession,
    output: Option<&Path>,
) -> Result<(), Box<dyn std::error::Error>> {
    let load = session.load();
    if let Some(code) = load.error {
        eprintln!("Warning: {code} while loading; exporting the local backup");
    }
    let json = serde_json::to_string_pretty(&load.snapshot)?;
    match output {
        Some(path) => {
            std::fs::write(path, format!("{json}\n"))
                .map_err(|e| format!("cannot write '{}': {e}", path.display()))?;
            let source = match load.source {
                LoadSource::Remote => "remote vault",
                LoadSource::RemoteWithDiff => "remote vault + diff",
                LoadSource::LocalBackup => "local backup",
                LoadSource::Empty => "empty vault",
            };
            eprintln!(
                "Exported {} items from the {source} to {}",
                load.snapshot.len(),
                path.display()
            );
        }
        None => println!("{json}"),
    }
    Ok(())
}
