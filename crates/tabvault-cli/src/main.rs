mod cli;
mod cmd;
mod dispatch;
mod format;
mod stores;
mod table;

use clap::Parser;

use cli::{Cli, Commands};
use dispatch::dispatch_command;

fn main() {
    let cli = Cli::parse();

    let filter = match cli.verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let config_path = stores::resolve_config_path(cli.config.as_deref(), &cli.data_dir);
    let config = match stores::load_engine_config(config_path.as_deref()) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Error: {e}");
            std::process::exit(1);
        }
    };

    let mut session = match stores::open_session(&cli.data_dir, config) {
        Ok(s) => s,
        Err(e) => {
            eprintln!("Error: {e}");
            std::process::exit(1);
        }
    };

    let command = cli.command.unwrap_or(Commands::Status);
    if let Err(e) = dispatch_command(&command, &mut session) {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}
