use tabvault_types::error::{Result, VaultError};
use tabvault_types::item::VaultSnapshot;
use tracing::{info, warn};

use crate::session::{LoadReport, SaveReport, VaultSession};

#[derive(Debug, Clone)]
pub enum RecoveryOutcome {
    /// Sync is disabled or the last load did not fall back.
    NotNeeded,
    /// The remote vault was reset and rewritten.
    Healed(SaveReport),
    /// The rewrite fell back too; sync is now durably disabled.
    SyncDisabled(SaveReport),
    /// The remote holds a newer format this release must not overwrite.
    Refused(String),
}

impl VaultSession {
    /// Run [`recover`](Self::recover) when `load` fell back while sync is on.
    pub fn recover_if_needed(&mut self, load: &LoadReport) -> Result<RecoveryOutcome> {
        if !load.fallback_to_local || !self.sync_enabled()? {
            return Ok(RecoveryOutcome::NotNeeded);
        }
        self.recover(&load.snapshot)
    }

    /// Self-heal: wipe every vault key from the remote store and write
    /// `snapshot` (typically the local backup) from scratch. If that save
    /// still falls back, sync is switched off until re-enabled.
    pub fn recover(&mut self, snapshot: &VaultSnapshot) -> Result<RecoveryOutcome> {
        if !self.sync_enabled()? {
            return Ok(RecoveryOutcome::NotNeeded);
        }
        if let Err(VaultError::UnsupportedVersion(version)) = self.read_meta() {
            warn!(version, "remote vault uses a newer format, not resetting it");
            return Ok(RecoveryOutcome::Refused(format!(
                "remote vault format version {version} is newer than supported"
            )));
        }
        info!(items = snapshot.len(), "resetting remote vault");
        if let Err(e) = self.clear_remote() {
            warn!(error = %e, "failed to clear remote vault before rewrite");
        }
        let report = self.save(snapshot)?;
        if report.status.is_fallback() {
            warn!(status = ?report.status, "rewrite after reset failed, disabling sync");
            self.preference().set_enabled(false)?;
            return Ok(RecoveryOutcome::SyncDisabled(report));
        }
        Ok(RecoveryOutcome::Healed(report))
    }
}
