use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tabvault_core::config::load_config;
use tabvault_core::{EngineConfig, VaultSession};
use tabvault_storage::FileStore;

pub(crate) const CONFIG_ENV: &str = "TABVAULT_CONFIG";
pub(crate) const CONFIG_FILE: &str = "tabvault.yaml";
pub(crate) const SYNC_FILE: &str = "sync.json";
pub(crate) const LOCAL_FILE: &str = "local.json";

/// Pick the configuration file: explicit flag, then `$TABVAULT_CONFIG`,
/// then `<data-dir>/tabvault.yaml` if it exists.
pub(crate) fn resolve_config_path(explicit: Option<&str>, data_dir: &Path) -> Option<PathBuf> {
    resolve_config_path_with(explicit, std::env::var_os(CONFIG_ENV), data_dir)
}

fn resolve_config_path_with(
    explicit: Option<&str>,
    env: Option<OsString>,
    data_dir: &Path,
) -> Option<PathBuf> {
    if let Some(path) = explicit {
        return Some(PathBuf::from(path));
    }
    if let Some(path) = env.filter(|p| !p.is_empty()) {
        return Some(PathBuf::from(path));
    }
    let candidate = data_dir.join(CONFIG_FILE);
    candidate.is_file().then_some(candidate)
}

pub(crate) fn load_engine_config(
    path: Option<&Path>,
) -> Result<EngineConfig, Box<dyn std::error::Error>> {
    match path {
        Some(path) => {
            tracing::info!("Using config: {}", path.display());
            Ok(load_config(path)?)
        }
        None => {
            tracing::debug!("no config file found, using defaults");
            Ok(EngineConfig::default())
        }
    }
}

/// Open both store files under `data_dir` and start a session over them.
/// The sync file enforces the configured quota; the local file does not.
pub(crate) fn open_session(
    data_dir: &Path,
    config: EngineConfig,
) -> Result<VaultSession, Box<dyn std::error::Error>> {
    std::fs::create_dir_all(data_dir)
        .map_err(|e| format!("cannot create data dir '{}': {e}", data_dir.display()))?;
    let remote = FileStore::open(data_dir.join(SYNC_FILE), Some(config.limits.clone()))?;
    let local = FileStore::open(data_dir.join(LOCAL_FILE), None)?;
    Ok(VaultSession::new(Arc::new(remote), Arc::new(local), config)?)
}
