use std::path::Path;

use serde::{Deserialize, Serialize};
use tabvault_storage::{RetryConfig, StoreLimits};
use tabvault_types::error::{Result, VaultError};

use crate::compress::Compression;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Budgets of the remote sync store.
    #[serde(default)]
    pub limits: StoreLimits,
    #[serde(default)]
    pub keys: KeyLayout,
    /// Keys the rest of the application keeps in the same remote store.
    #[serde(default = "default_settings_keys")]
    pub settings_keys: Vec<String>,
    /// Minimum budget reserved for settings regardless of their measured size.
    #[serde(default = "default_settings_reserve_bytes")]
    pub settings_reserve_bytes: u64,
    #[serde(default = "default_warning_ratio")]
    pub warning_ratio: f64,
    #[serde(default = "default_critical_ratio")]
    pub critical_ratio: f64,
    /// Fixed per-chunk overhead subtracted from the per-item ceiling.
    #[serde(default = "default_chunk_overhead_bytes")]
    pub chunk_overhead_bytes: u64,
    /// Headroom held back from the payload budget for the meta and diff records.
    #[serde(default = "default_meta_reserve_bytes")]
    pub meta_reserve_bytes: u64,
    /// Minimum number of items before the domain table is considered.
    #[serde(default = "default_dedup_min_items")]
    pub dedup_min_items: usize,
    /// Savings must exceed the domain table's own cost by this factor.
    #[serde(default = "default_dedup_safety_factor")]
    pub dedup_safety_factor: f64,
    /// A diff is written only when its packed length is below this fraction
    /// of the packed length of the last full payload written or loaded. That
    /// stored payload stands in for the current one, which is never encoded
    /// when the diff wins.
    #[serde(default = "default_diff_ratio")]
    pub diff_ratio: f64,
    #[serde(default)]
    pub compression: CompressionConfig,
    #[serde(default)]
    pub load_retry: RetryConfig,
    #[serde(default)]
    pub write_retry: RetryConfig,
}

/// Names of the keys the engine reads and writes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyLayout {
    #[serde(default = "default_meta_key")]
    pub meta: String,
    #[serde(default = "default_chunk_prefix")]
    pub chunk_prefix: String,
    #[serde(default = "default_diff_key")]
    pub diff: String,
    /// Unversioned flat array written by old releases. Read and removed only.
    #[serde(default = "default_legacy_key")]
    pub legacy: String,
    #[serde(default = "default_local_backup_key")]
    pub local_backup: String,
    #[serde(default = "default_sync_enabled_key")]
    pub sync_enabled: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CompressionAlgorithm {
    None,
    Lz4,
    Zstd,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompressionConfig {
    #[serde(default = "default_algorithm")]
    pub algorithm: CompressionAlgorithm,
    #[serde(default = "default_zstd_level")]
    pub zstd_level: i32,
}

impl CompressionConfig {
    pub fn codec(&self) -> Compression {
        Compression::from_algorithm(self.algorithm, self.zstd_level)
    }
}

fn default_settings_keys() -> Vec<String> {
    vec!["app_settings".to_string()]
}

fn default_settings_reserve_bytes() -> u64 {
    10 * 1024
}

fn default_warning_ratio() -> f64 {
    0.80
}

fn default_critical_ratio() -> f64 {
    0.95
}

fn default_chunk_overhead_bytes() -> u64 {
    16
}

fn default_meta_reserve_bytes() -> u64 {
    1024
}

fn default_dedup_min_items() -> usize {
    3
}

fn default_dedup_safety_factor() -> f64 {
    1.2
}

fn default_diff_ratio() -> f64 {
    0.30
}

fn default_algorithm() -> CompressionAlgorithm {
    CompressionAlgorithm::Zstd
}

fn default_zstd_level() -> i32 {
    19
}

fn default_meta_key() -> String {
    "vault_meta".to_string()
}

fn default_chunk_prefix() -> String {
    "vault_chunk_".to_string()
}

fn default_diff_key() -> String {
    "vault_diff".to_string()
}

fn default_legacy_key() -> String {
    "vault_items".to_string()
}

fn default_local_backup_key() -> String {
    "vault_local_backup".to_string()
}

fn default_sync_enabled_key() -> String {
    "vault_sync_enabled".to_string()
}

impl Default for KeyLayout {
    fn default() -> Self {
        Self {
            meta: default_meta_key(),
            chunk_prefix: default_chunk_prefix(),
            diff: default_diff_key(),
            legacy: default_legacy_key(),
            local_backup: default_local_backup_key(),
            sync_enabled: default_sync_enabled_key(),
        }
    }
}

impl KeyLayout {
    pub fn chunk_key(&self, index: usize) -> String {
        format!("{}{index}", self.chunk_prefix)
    }

    pub fn is_chunk_key(&self, key: &str) -> bool {
        key.strip_prefix(self.chunk_prefix.as_str())
            .is_some_and(|rest| !rest.is_empty() && rest.bytes().all(|b| b.is_ascii_digit()))
    }

    /// Whether `key` belongs to the vault in the remote store.
    pub fn is_vault_key(&self, key: &str) -> bool {
        key == self.meta || key == self.diff || key == self.legacy || self.is_chunk_key(key)
    }
}

impl Default for CompressionConfig {
    fn default() -> Self {
        Self {
            algorithm: default_algorithm(),
            zstd_level: default_zstd_level(),
        }
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            limits: StoreLimits::default(),
            keys: KeyLayout::default(),
            settings_keys: default_settings_keys(),
            settings_reserve_bytes: default_settings_reserve_bytes(),
            warning_ratio: default_warning_ratio(),
            critical_ratio: default_critical_ratio(),
            chunk_overhead_bytes: default_chunk_overhead_bytes(),
            meta_reserve_bytes: default_meta_reserve_bytes(),
            dedup_min_items: default_dedup_min_items(),
            dedup_safety_factor: default_dedup_safety_factor(),
            diff_ratio: default_diff_ratio(),
            compression: CompressionConfig::default(),
            load_retry: RetryConfig::default(),
            write_retry: RetryConfig::default(),
        }
    }
}

impl EngineConfig {
    pub fn validate(&self) -> Result<()> {
        for (name, value) in [
            ("warning_ratio", self.warning_ratio),
            ("critical_ratio", self.critical_ratio),
            ("diff_ratio", self.diff_ratio),
        ] {
            if !(value > 0.0 && value <= 1.0) {
                return Err(VaultError::Config(format!(
                    "{name} must be in (0, 1], got {value}"
                )));
            }
        }
        if self.warning_ratio > self.critical_ratio {
            return Err(VaultError::Config(format!(
                "warning_ratio ({}) must not exceed critical_ratio ({})",
                self.warning_ratio, self.critical_ratio
            )));
        }
        if self.dedup_safety_factor < 1.0 {
            return Err(VaultError::Config(format!(
                "dedup_safety_factor must be >= 1.0, got {}",
                self.dedup_safety_factor
            )));
        }
        if self.limits.quota_bytes_per_item > self.limits.quota_bytes {
            return Err(VaultError::Config(format!(
                "limits.quota_bytes_per_item ({}) exceeds limits.quota_bytes ({})",
                self.limits.quota_bytes_per_item, self.limits.quota_bytes
            )));
        }
        if self.compression.algorithm == CompressionAlgorithm::Zstd
            && !(1..=22).contains(&self.compression.zstd_level)
        {
            return Err(VaultError::Config(format!(
                "compression.zstd_level must be in [1, 22], got {}",
                self.compression.zstd_level
            )));
        }
        let keys = &self.keys;
        if keys.chunk_prefix.is_empty() {
            return Err(VaultError::Config("keys.chunk_prefix must not be empty".into()));
        }
        for key in [&keys.meta, &keys.diff, &keys.legacy] {
            if keys.is_chunk_key(key) {
                return Err(VaultError::Config(format!(
                    "key '{key}' collides with the chunk prefix '{}'",
                    keys.chunk_prefix
                )));
            }
        }
        Ok(())
    }
}

/// Load and validate an engine configuration from a YAML file.
pub fn load_config(path: &Path) -> Result<EngineConfig> {
    let contents = std::fs::read_to_string(path).map_err(|e| {
        VaultError::Config(format!("cannot read config '{}': {e}", path.display()))
    })?;
    parse_config(&contents)
}

pub fn parse_config(contents: &str) -> Result<EngineConfig> {
    let config: EngineConfig = if contents.trim().is_empty() {
        EngineConfig::default()
    } else {
        serde_yaml::from_str(contents)?
    };
    config.validate()?;
    Ok(config)
}
