//! One-time conversion of legacy storage layouts.
//!
//! Two layouts are upgraded: the unversioned flat array under the legacy key
//! (in the remote store or the local one), and chunked payloads whose meta
//! predates the current format version.

use std::collections::HashSet;

use serde::Serialize;
use tabvault_storage::KvStore;
use tabvault_types::error::{Result, VaultError};
use tabvault_types::item::VaultSnapshot;
use tracing::{info, warn};

use crate::codec;
use crate::integrity;
use crate::meta::StorageMeta;
use crate::session::{ErrorCode, SaveStatus, VaultSession};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MigrationSource {
    RemoteLegacyKey,
    LocalLegacyKey,
    MetaVersion(u32),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MigrationOutcome {
    NotNeeded,
    /// Converted and written to the remote store in the current format.
    Migrated {
        source: MigrationSource,
        items: usize,
    },
    /// Converted into the local backup only; sync has been switched off
    /// when the remote store could not take the data.
    LocalOnly {
        source: MigrationSource,
        items: usize,
    },
    /// Conversion failed and was skipped; existing data is left untouched.
    Failed(String),
}

impl MigrationOutcome {
    pub fn migrated(&self) -> bool {
        matches!(
            self,
            MigrationOutcome::Migrated { .. } | MigrationOutcome::LocalOnly { .. }
        )
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, MigrationOutcome::Failed(_))
    }
}

impl VaultSession {
    /// Detect and convert legacy layouts. Never fails: errors are logged and
    /// reported as [`MigrationOutcome::Failed`].
    pub fn migrate(&mut self) -> MigrationOutcome {
        match self.try_migrate() {
            Ok(outcome) => outcome,
            Err(e) => {
                warn!(error = %e, code = %ErrorCode::MigrationFailure, "vault migration failed");
                MigrationOutcome::Failed(e.to_string())
            }
        }
    }

    fn try_migrate(&mut self) -> Result<MigrationOutcome> {
        let legacy_key = self.config.keys.legacy.clone();
        if !self.sync_enabled()? {
            // remote layouts wait until sync is switched back on
            return match self.local.get_one(&legacy_key)? {
                Some(value) => self.migrate_legacy(value, MigrationSource::LocalLegacyKey),
                None => Ok(MigrationOutcome::NotNeeded),
            };
        }
        if let Some(raw) = self.remote.get_one(&self.config.keys.meta)? {
            return match StorageMeta::from_value(raw) {
                Ok(meta) if meta.needs_upgrade() => self.upgrade_meta(&meta),
                // current meta: any legacy key is stale; unreadable meta is the load's problem
                _ => Ok(MigrationOutcome::NotNeeded),
            };
        }
        if let Some(value) = self.remote.get_one(&legacy_key)? {
            return self.migrate_legacy(value, MigrationSource::RemoteLegacyKey);
        }
        if let Some(value) = self.local.get_one(&legacy_key)? {
            return self.migrate_legacy(value, MigrationSource::LocalLegacyKey);
        }
        Ok(MigrationOutcome::NotNeeded)
    }

    fn upgrade_meta(&mut self, meta: &StorageMeta) -> Result<MigrationOutcome> {
        let source = MigrationSource::MetaVersion(meta.version);
        info!(version = meta.version, "upgrading stored vault format");
        self.baseline = None;
        // a backup written after the old payload holds the newer data
        if let Some(snapshot) = self.backup_newer_than(meta.saved_at, None) {
            info!(items = snapshot.len(), "local backup is newer than the stored vault");
            return self.rewrite(snapshot, source);
        }
        let payload = integrity::read_verified(self.remote.as_ref(), meta)
            .map_err(|e| VaultError::Migration(format!("cannot read version {} payload: {e}", meta.version)))?;
        self.rewrite(payload.snapshot, source)
    }

    fn migrate_legacy(
        &mut self,
        value: serde_json::Value,
        source: MigrationSource,
    ) -> Result<MigrationOutcome> {
        let now = chrono::Utc::now().timestamp_millis();
        let snapshot = codec::expand(value, now)
            .map_err(|e| VaultError::Migration(format!("legacy data is not decodable: {e}")))?;
        snapshot.check_unique_ids()?;
        info!(items = snapshot.len(), ?source, "migrating legacy vault");

        // the backup holds the data before the legacy key goes away
        let snapshot = self.merge_into_backup(snapshot)?;
        let key = [self.config.keys.legacy.clone()];
        match source {
            MigrationSource::RemoteLegacyKey => self.remote.remove(&key)?,
            _ => self.local.remove(&key)?,
        }
        self.rewrite(snapshot, source)
    }

    /// Append converted items the existing backup does not already hold.
    /// Backed-up items come first and are never replaced.
    fn merge_into_backup(&self, converted: VaultSnapshot) -> Result<VaultSnapshot> {
        let backup = self.local_backup();
        let existing = backup.read_snapshot()?;
        let merged = if existing.is_empty() {
            converted
        } else {
            let added: Vec<_> = {
                let known: HashSet<&str> = existing.items.iter().map(|i| i.id()).collect();
                converted
                    .items
                    .into_iter()
                    .filter(|i| !known.contains(i.id()))
                    .collect()
            };
            info!(kept = existing.len(), added = added.len(), "merging legacy items into local backup");
            let mut items = existing.items;
            items.extend(added);
            VaultSnapshot::new(items)
        };
        backup.write(&merged)?;
        Ok(merged)
    }

    /// Full save of converted data. A quota failure leaves the data in the
    /// local backup and switches sync off.
    fn rewrite(&mut self, snapshot: VaultSnapshot, source: MigrationSource) -> Result<MigrationOutcome> {
        let items = snapshot.len();
        let report = self.save(&snapshot)?;
        match report.status {
            SaveStatus::Synced | SaveStatus::SyncedDiff => {
                Ok(MigrationOutcome::Migrated { source, items })
            }
            SaveStatus::LocalOnly => Ok(MigrationOutcome::LocalOnly { source, items }),
            SaveStatus::Fallback(ErrorCode::QuotaExceeded) => {
                warn!(items, "migrated vault does not fit remote quota, disabling sync");
                self.preference().set_enabled(false)?;
                Ok(MigrationOutcome::LocalOnly { source, items })
            }
            SaveStatus::Fallback(code) => Err(VaultError::Migration(format!(
                "rewriting migrated vault failed: {code}"
            ))),
        }
    }
}
