use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(
    name = "tabvault",
    version,
    about = "Inspect and maintain a quota-bound tab vault",
    after_help = "\
Configuration file lookup order:
  1. --config <path>             (explicit flag)
  2. $TABVAULT_CONFIG            (environment variable)
  3. <data-dir>/tabvault.yaml    (next to the stores)
  Built-in defaults apply when none of these exists.

Store files:
  <data-dir>/sync.json    quota-bound remote store
  <data-dir>/local.json   unbounded local store (backup, sync preference)"
)]
pub(crate) struct Cli {
    /// Path to configuration file (overrides TABVAULT_CONFIG and the data dir)
    #[arg(short, long)]
    pub config: Option<String>,

    /// Directory holding the sync and local store files
    #[arg(short = 'd', long, default_value = ".")]
    pub data_dir: PathBuf,

    /// Verbosity level (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand)]
pub(crate) enum Commands {
    /// Show vault layout, quota usage and sync state (default)
    Status,

    /// Save items from a JSON file into the vault
    Import {
        /// JSON array of items, or an object with an "items" array
        file: PathBuf,

        /// Keep existing items and append only those with new ids
        #[arg(long)]
        merge: bool,
    },

    /// Write the vault contents as JSON
    Export {
        /// Output file (stdout when omitted)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Read every chunk of the remote vault and check it against its checksum
    Verify,

    /// Rewrite a corrupt remote vault from the local backup
    Recover {
        /// Rewrite even when the remote vault reads back cleanly
        #[arg(long)]
        force: bool,
    },

    /// Remove chunk keys not referenced by the vault meta
    Sweep {
        /// Only show what would be removed, don't actually remove it
        #[arg(short = 'n', long)]
        dry_run: bool,
    },

    /// Turn remote sync on or off
    Sync {
        #[command(subcommand)]
        action: SyncAction,
    },
}

#[derive(Subcommand, Clone, Copy)]
pub(crate) enum SyncAction {
    /// Upload the vault and resume syncing
    Enable,
    /// Keep the vault local-only and clear it from the sync store
    Disable,
}
