//! Save and load entry points.
//!
//! A [`VaultSession`] owns the diff baseline for one vault. `save` and `load`
//! take `&mut self`, so a session cannot be driven by two callers at once;
//! share it behind a `Mutex` to serialize access.

use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tabvault_storage::retry::{retry_transient, retry_while};
use tabvault_storage::{item_size, KvStore};
use tabvault_types::checksum::Checksum;
use tabvault_types::error::{Result, VaultError};
use tabvault_types::item::VaultSnapshot;
use tracing::{debug, info, warn};

use crate::backup::LocalBackup;
use crate::codec::Codec;
use crate::config::EngineConfig;
use crate::diff::{DiffRecord, SnapshotDiff};
use crate::integrity;
use crate::meta::StorageMeta;
use crate::quota::{self, QuotaStatus};
use crate::settings::SyncPreference;
use crate::tier::{self, ChunkGeometry, CompressionTier};

/// Structured failure code surfaced to callers instead of an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    QuotaExceeded,
    WriteFailure,
    ReadCorruption,
    MigrationFailure,
}

impl ErrorCode {
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorCode::QuotaExceeded => "quota_exceeded",
            ErrorCode::WriteFailure => "write_failure",
            ErrorCode::ReadCorruption => "read_corruption",
            ErrorCode::MigrationFailure => "migration_failure",
        }
    }

    /// Code for a failed remote write.
    pub fn for_write(err: &VaultError) -> Self {
        if err.is_quota_exceeded() {
            ErrorCode::QuotaExceeded
        } else {
            ErrorCode::WriteFailure
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SaveStatus {
    /// Full payload written and verified.
    Synced,
    /// Only a diff against the last full payload was written.
    SyncedDiff,
    /// Sync is disabled; the local backup is the only copy.
    LocalOnly,
    /// The remote write failed; the local backup holds the snapshot.
    Fallback(ErrorCode),
}

impl SaveStatus {
    pub fn is_fallback(self) -> bool {
        matches!(self, SaveStatus::Fallback(_))
    }

    pub fn is_synced(self) -> bool {
        matches!(self, SaveStatus::Synced | SaveStatus::SyncedDiff)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SaveReport {
    pub status: SaveStatus,
    pub tier: Option<CompressionTier>,
    pub chunk_count: usize,
    /// Bytes charged to the remote store by this save.
    pub bytes_written: u64,
    pub quota: Option<QuotaStatus>,
}

impl SaveReport {
    fn status_only(status: SaveStatus, quota: Option<QuotaStatus>) -> Self {
        Self {
            status,
            tier: None,
            chunk_count: 0,
            bytes_written: 0,
            quota,
        }
    }

    pub fn error(&self) -> Option<ErrorCode> {
        match self.status {
            SaveStatus::Fallback(code) => Some(code),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LoadSource {
    Remote,
    RemoteWithDiff,
    LocalBackup,
    Empty,
}

#[derive(Debug, Clone)]
pub struct LoadReport {
    pub snapshot: VaultSnapshot,
    pub source: LoadSource,
    /// Sync is enabled but the remote copy could not be used.
    pub fallback_to_local: bool,
    pub error: Option<ErrorCode>,
    /// A legacy layout or older format was converted during this load.
    pub migrated: bool,
}

/// Remote vault state decoded and verified.
#[derive(Debug, Clone)]
pub struct RemoteVault {
    pub meta: StorageMeta,
    /// Snapshot with any pending diff applied.
    pub snapshot: VaultSnapshot,
    /// The full payload before the diff.
    pub full: VaultSnapshot,
    pub checksum: Checksum,
    pub packed_len: usize,
    pub diff: Option<SnapshotDiff>,
}

/// Last full payload known to be in the remote store.
#[derive(Debug, Clone)]
pub(crate) struct Baseline {
    pub(crate) full: VaultSnapshot,
    pub(crate) checksum: Checksum,
    pub(crate) packed_len: usize,
}

/// Overview of remote and local state for inspection.
#[derive(Debug, Clone)]
pub struct VaultStats {
    pub meta: Option<StorageMeta>,
    pub meta_error: Option<String>,
    pub quota: QuotaStatus,
    pub orphan_keys: Vec<String>,
    pub has_diff: bool,
    pub has_legacy: bool,
    pub sync_enabled: bool,
    pub local_backup_items: Option<usize>,
}

pub struct VaultSession {
    pub(crate) remote: Arc<dyn KvStore>,
    pub(crate) local: Arc<dyn KvStore>,
    pub(crate) config: EngineConfig,
    pub(crate) codec: Codec,
    pub(crate) baseline: Option<Baseline>,
}

impl VaultSession {
    pub fn new(
        remote: Arc<dyn KvStore>,
        local: Arc<dyn KvStore>,
        config: EngineConfig,
    ) -> Result<Self> {
        config.validate()?;
        let codec = Codec::from_config(&config);
        Ok(Self {
            remote,
            local,
            config,
            codec,
            baseline: None,
        })
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Whether a diff baseline is held (a load or full save has completed).
    pub fn has_baseline(&self) -> bool {
        self.baseline.is_some()
    }

    pub fn local_backup(&self) -> LocalBackup<'_> {
        LocalBackup::new(self.local.as_ref(), &self.config.keys.local_backup)
    }

    pub(crate) fn preference(&self) -> SyncPreference<'_> {
        SyncPreference::new(self.local.as_ref(), &self.config.keys.sync_enabled)
    }

    pub fn sync_enabled(&self) -> Result<bool> {
        self.preference().is_enabled()
    }

    pub fn quota_status(&self) -> Result<QuotaStatus> {
        quota::measure(self.remote.as_ref(), &self.config)
    }

    fn geometry(&self) -> ChunkGeometry<'_> {
        ChunkGeometry {
            keys: &self.config.keys,
            per_item_quota: self.config.limits.quota_bytes_per_item,
            overhead: self.config.chunk_overhead_bytes,
        }
    }

    /// Persist `snapshot`.
    ///
    /// The local backup is always written first. Remote failures are
    /// reported through [`SaveStatus::Fallback`]; `Err` is returned only for
    /// duplicate ids, a chunk budget that cannot hold one character, or a
    /// failing local store.
    pub fn save(&mut self, snapshot: &VaultSnapshot) -> Result<SaveReport> {
        snapshot.check_unique_ids()?;
        self.local_backup().write(snapshot)?;
        if !self.sync_enabled()? {
            debug!(items = snapshot.len(), "sync disabled, saved locally");
            return Ok(SaveReport::status_only(SaveStatus::LocalOnly, None));
        }
        match self.save_remote(snapshot) {
            Ok(report) => Ok(report),
            Err(e @ VaultError::ChunkBudgetExceeded { .. }) => Err(e),
            Err(e) => {
                let code = ErrorCode::for_write(&e);
                warn!(error = %e, code = %code, "remote save failed, local backup kept");
                let quota = self.quota_status().ok();
                Ok(SaveReport::status_only(SaveStatus::Fallback(code), quota))
            }
        }
    }

    fn save_remote(&mut self, snapshot: &VaultSnapshot) -> Result<SaveReport> {
        let quota = self.quota_status()?;
        debug!(
            used = quota.bytes_used,
            available = quota.bytes_available,
            level = quota.warning_level.as_str(),
            "measured remote quota"
        );
        if let Some(report) = self.try_diff_save(snapshot, &quota)? {
            return Ok(report);
        }
        self.full_save(snapshot, quota)
    }

    /// Write only a diff when it is valid, small and fits. `Ok(None)` means
    /// a full save is needed.
    fn try_diff_save(
        &self,
        snapshot: &VaultSnapshot,
        quota: &QuotaStatus,
    ) -> Result<Option<SaveReport>> {
        let Some(baseline) = &self.baseline else {
            return Ok(None);
        };
        match self.read_meta() {
            Ok(Some(meta)) if meta.checksum == Some(baseline.checksum) => {}
            _ => {
                debug!("remote payload differs from baseline, skipping diff");
                return Ok(None);
            }
        }
        let diff = SnapshotDiff::compute(&baseline.full, snapshot);
        if diff.is_empty() || !diff.reproduces(&baseline.full, snapshot) {
            return Ok(None);
        }
        let record = DiffRecord::encode(&self.codec, &diff, baseline.checksum)?;
        let limit = baseline.packed_len as f64 * self.config.diff_ratio;
        if record.packed_len() as f64 >= limit {
            debug!(
                diff_len = record.packed_len(),
                full_len = baseline.packed_len,
                "diff not small enough, writing full payload"
            );
            return Ok(None);
        }
        let key = self.config.keys.diff.clone();
        let value = record.to_value()?;
        let size = item_size(&key, &value);
        if size > self.config.limits.quota_bytes_per_item {
            return Ok(None);
        }
        let base = baseline.checksum;
        let write = retry_transient(&self.config.write_retry, "write diff", || {
            self.remote.set_one(&key, value.clone())
        });
        if let Err(e) = write {
            warn!(error = %e, "diff write failed, writing full payload");
            return Ok(None);
        }
        let verified = self
            .remote
            .get_one(&key)
            .and_then(|v| v.ok_or_else(|| VaultError::MissingChunk(key.clone())))
            .and_then(|v| DiffRecord::decode(v, &base));
        if let Err(e) = verified {
            warn!(error = %e, "diff failed write-verify, writing full payload");
            return Ok(None);
        }
        info!(
            added = diff.added.len(),
            deleted = diff.deleted.len(),
            bytes = size,
            "saved vault diff"
        );
        Ok(Some(SaveReport {
            status: SaveStatus::SyncedDiff,
            tier: None,
            chunk_count: 0,
            bytes_written: size,
            quota: Some(quota.clone()),
        }))
    }

    fn full_save(&mut self, snapshot: &VaultSnapshot, quota: QuotaStatus) -> Result<SaveReport> {
        let budget = quota.payload_budget(&self.config);
        let negotiated = tier::negotiate(&self.codec, snapshot, budget, self.geometry())?;
        let tier = negotiated.tier;
        let payload = negotiated.payload;
        let meta = StorageMeta::new(
            negotiated.plan.keys.clone(),
            payload.checksum,
            payload.shape,
            tier,
            self.codec.compression().as_str(),
        );
        let chunk_bytes = negotiated.plan.stored_bytes();
        let mut items = negotiated.plan.into_items();
        items.insert(self.config.keys.meta.clone(), meta.to_value()?);

        // chunks and meta go out as one batch so they replace each other as a unit
        retry_transient(&self.config.write_retry, "write vault", || {
            self.remote.set(items.clone())
        })?;
        integrity::verify_written(self.remote.as_ref(), &meta)?;

        if let Err(e) = self.remote.remove(&[self.config.keys.diff.clone()]) {
            warn!(error = %e, "failed to clear diff key after full save");
        }
        match self.sweep_orphans_with(Some(&meta)) {
            Ok(swept) if !swept.is_empty() => debug!(count = swept.len(), "swept orphan chunks"),
            Ok(_) => {}
            Err(e) => warn!(error = %e, "orphan sweep failed"),
        }

        info!(
            tier = tier.as_str(),
            shape = ?payload.shape,
            chunks = meta.chunk_count,
            bytes = chunk_bytes,
            "saved vault"
        );
        self.baseline = Some(Baseline {
            full: tier.apply(snapshot),
            checksum: payload.checksum,
            packed_len: payload.packed.len(),
        });
        Ok(SaveReport {
            status: SaveStatus::Synced,
            tier: Some(tier),
            chunk_count: meta.chunk_count,
            bytes_written: chunk_bytes,
            quota: Some(quota),
        })
    }

    /// Load the vault, migrating legacy layouts first and falling back to
    /// the local backup when the remote copy is missing or unusable.
    pub fn load(&mut self) -> LoadReport {
        let migration = self.migrate();
        let migrated = migration.migrated();
        let migration_error = migration.is_failed().then_some(ErrorCode::MigrationFailure);

        let sync_enabled = match self.sync_enabled() {
            Ok(enabled) => enabled,
            Err(e) => {
                warn!(error = %e, "cannot read sync preference, assuming enabled");
                true
            }
        };
        if !sync_enabled {
            self.baseline = None;
            return self.local_report(false, migration_error, migrated);
        }

        match self.read_remote() {
            Ok(Some(remote)) => {
                let diff_at = remote.diff.as_ref().map(|d| d.timestamp);
                if let Some(snapshot) = self.backup_newer_than(remote.meta.saved_at, diff_at) {
                    // a save whose remote write failed; the caller re-syncs from the backup
                    info!(items = snapshot.len(), "local backup is newer than the remote vault");
                    self.baseline = None;
                    let source = if snapshot.is_empty() {
                        LoadSource::Empty
                    } else {
                        LoadSource::LocalBackup
                    };
                    return LoadReport {
                        snapshot,
                        source,
                        fallback_to_local: true,
                        error: migration_error,
                        migrated,
                    };
                }
                let source = if remote.diff.is_some() {
                    LoadSource::RemoteWithDiff
                } else {
                    LoadSource::Remote
                };
                debug!(items = remote.snapshot.len(), ?source, "loaded vault");
                self.baseline = Some(Baseline {
                    full: remote.full,
                    checksum: remote.checksum,
                    packed_len: remote.packed_len,
                });
                LoadReport {
                    snapshot: remote.snapshot,
                    source,
                    fallback_to_local: false,
                    error: migration_error,
                    migrated,
                }
            }
            Ok(None) => {
                self.baseline = None;
                let mut report = self.local_report(true, migration_error, migrated);
                if report.source == LoadSource::Empty {
                    report.fallback_to_local = false;
                }
                report
            }
            Err(e) => {
                warn!(error = %e, "remote vault unreadable, falling back to local backup");
                self.baseline = None;
                self.local_report(true, Some(ErrorCode::ReadCorruption), migrated)
            }
        }
    }

    /// [`load`](Self::load), retried with backoff while it reports a
    /// remote read failure.
    pub fn load_with_retry(&mut self) -> LoadReport {
        let config = self.config.load_retry.clone();
        retry_while(
            &config,
            "vault load",
            || self.load(),
            |report| report.fallback_to_local && report.error == Some(ErrorCode::ReadCorruption),
        )
    }

    fn local_report(
        &self,
        fallback_to_local: bool,
        error: Option<ErrorCode>,
        migrated: bool,
    ) -> LoadReport {
        let snapshot = match self.local_backup().read_snapshot() {
            Ok(snapshot) => snapshot,
            Err(e) => {
                warn!(error = %e, "local backup unreadable");
                VaultSnapshot::default()
            }
        };
        let source = if snapshot.is_empty() {
            LoadSource::Empty
        } else {
            LoadSource::LocalBackup
        };
        LoadReport {
            snapshot,
            source,
            fallback_to_local,
            error,
            migrated,
        }
    }

    /// The backup snapshot when it was written after the remote payload
    /// and after the pending diff. Diff timestamps only keep milliseconds.
    pub(crate) fn backup_newer_than(
        &self,
        meta_at: DateTime<Utc>,
        diff_at: Option<DateTime<Utc>>,
    ) -> Option<VaultSnapshot> {
        let record = match self.local_backup().read() {
            Ok(record) => record?,
            Err(e) => {
                warn!(error = %e, "local backup unreadable");
                return None;
            }
        };
        let saved_at = record.saved_at?;
        let after_diff = diff_at.map_or(true, |d| saved_at.timestamp_millis() > d.timestamp_millis());
        (saved_at > meta_at && after_diff).then_some(record.snapshot)
    }

    pub(crate) fn read_meta(&self) -> Result<Option<StorageMeta>> {
        self.remote
            .get_one(&self.config.keys.meta)?
            .map(StorageMeta::from_value)
            .transpose()
    }

    /// Read and verify the remote vault, applying any pending diff.
    /// `Ok(None)` when no meta is stored.
    pub fn read_remote(&self) -> Result<Option<RemoteVault>> {
        let Some(meta) = self.read_meta()? else {
            return Ok(None);
        };
        let payload = integrity::read_verified(self.remote.as_ref(), &meta)?;
        let checksum = meta
            .checksum
            .unwrap_or_else(|| Checksum::compute(payload.canonical.as_bytes()));
        let diff = match self.remote.get_one(&self.config.keys.diff)? {
            Some(value) => Some(DiffRecord::decode(value, &checksum)?),
            None => None,
        };
        let snapshot = match &diff {
            Some(diff) => diff.apply(&payload.snapshot),
            None => payload.snapshot.clone(),
        };
        Ok(Some(RemoteVault {
            meta,
            snapshot,
            full: payload.snapshot,
            checksum,
            packed_len: payload.packed_len,
            diff,
        }))
    }

    /// Remove every vault key (meta, chunks, diff, legacy) from the remote store.
    pub fn clear_remote(&mut self) -> Result<usize> {
        let keys: Vec<String> = self
            .remote
            .keys()?
            .into_iter()
            .filter(|k| self.config.keys.is_vault_key(k))
            .collect();
        if !keys.is_empty() {
            retry_transient(&self.config.write_retry, "clear vault", || {
                self.remote.remove(&keys)
            })?;
        }
        self.baseline = None;
        info!(count = keys.len(), "cleared remote vault keys");
        Ok(keys.len())
    }

    /// Chunk keys present in the remote store but not listed by the meta.
    pub fn orphan_keys(&self, meta: Option<&StorageMeta>) -> Result<Vec<String>> {
        let listed: &[String] = meta.map(|m| m.chunk_keys.as_slice()).unwrap_or_default();
        Ok(self
            .remote
            .keys()?
            .into_iter()
            .filter(|k| self.config.keys.is_chunk_key(k) && !listed.contains(k))
            .collect())
    }

    /// Remove orphan chunk keys relative to the stored meta. Nothing is
    /// removed while the meta is unreadable.
    pub fn sweep_orphans(&self) -> Result<Vec<String>> {
        let meta = self.read_meta()?;
        self.sweep_orphans_with(meta.as_ref())
    }

    fn sweep_orphans_with(&self, meta: Option<&StorageMeta>) -> Result<Vec<String>> {
        let orphans = self.orphan_keys(meta)?;
        if !orphans.is_empty() {
            retry_transient(&self.config.write_retry, "sweep orphans", || {
                self.remote.remove(&orphans)
            })?;
        }
        Ok(orphans)
    }

    /// Stop syncing: keep the snapshot locally, wipe the remote vault and
    /// persist the preference.
    pub fn disable_sync(&mut self, snapshot: &VaultSnapshot) -> Result<()> {
        self.local_backup().write(snapshot)?;
        if let Err(e) = self.clear_remote() {
            warn!(error = %e, "failed to clear remote vault while disabling sync");
        }
        self.preference().set_enabled(false)
    }

    /// Resume syncing with a full save. Sync is switched back off when that
    /// save cannot reach the remote store.
    pub fn enable_sync(&mut self, snapshot: &VaultSnapshot) -> Result<SaveReport> {
        self.preference().set_enabled(true)?;
        self.baseline = None;
        let report = self.save(snapshot)?;
        if report.status.is_fallback() {
            warn!(status = ?report.status, "enabling sync failed, staying local-only");
            self.preference().set_enabled(false)?;
        }
        Ok(report)
    }

    pub fn stats(&self) -> Result<VaultStats> {
        let (meta, meta_error) = match self.read_meta() {
            Ok(meta) => (meta, None),
            Err(e) => (None, Some(e.to_string())),
        };
        let orphan_keys = if meta_error.is_none() {
            self.orphan_keys(meta.as_ref())?
        } else {
            Vec::new()
        };
        let remote_keys = self.remote.keys()?;
        let local_backup_items = match self.local_backup().read() {
            Ok(record) => record.map(|r| r.snapshot.len()),
            Err(e) => {
                warn!(error = %e, "local backup unreadable");
                None
            }
        };
        Ok(VaultStats {
            quota: self.quota_status()?,
            orphan_keys,
            has_diff: remote_keys.contains(&self.config.keys.diff),
            has_legacy: remote_keys.contains(&self.config.keys.legacy)
                || self.local.get_one(&self.config.keys.legacy)?.is_some(),
            sync_enabled: self.sync_enabled()?,
            local_backup_items,
            meta,
            meta_error,
        })
    }
}
