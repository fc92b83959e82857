use serde::Serialize;
use tabvault_storage::KvStore;
use tabvault_types::error::Result;

use crate::config::EngineConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum WarningLevel {
    None,
    Warning,
    Critical,
}

impl WarningLevel {
    pub fn as_str(self) -> &'static str {
        match self {
            WarningLevel::None => "none",
            WarningLevel::Warning => "warning",
            WarningLevel::Critical => "critical",
        }
    }
}

/// Remote store usage at one point in time. Measured fresh for every
/// decision because other writers share the same budget.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QuotaStatus {
    pub total_budget: u64,
    /// Settings (at least the reserve floor) plus vault keys.
    pub bytes_used: u64,
    pub bytes_available: u64,
    pub usage_ratio: f64,
    pub warning_level: WarningLevel,
    /// Measured settings usage before the reserve floor is applied.
    pub settings_bytes: u64,
    pub vault_bytes: u64,
}

impl QuotaStatus {
    /// Budget a full save may use: everything except the settings reservation
    /// and the headroom kept for meta and diff records. Vault bytes count as
    /// available since a full save replaces them.
    pub fn payload_budget(&self, config: &EngineConfig) -> u64 {
        let settings = self.settings_bytes.max(config.settings_reserve_bytes);
        self.total_budget
            .saturating_sub(settings)
            .saturating_sub(config.meta_reserve_bytes)
    }
}

/// Query the store and classify its headroom.
pub fn measure(store: &dyn KvStore, config: &EngineConfig) -> Result<QuotaStatus> {
    let total_budget = config.limits.quota_bytes;
    let settings_bytes = store.bytes_in_use(Some(&config.settings_keys))?;
    let vault_keys: Vec<String> = store
        .keys()?
        .into_iter()
        .filter(|k| config.keys.is_vault_key(k))
        .collect();
    let vault_bytes = if vault_keys.is_empty() {
        0
    } else {
        store.bytes_in_use(Some(&vault_keys))?
    };

    let bytes_used = settings_bytes.max(config.settings_reserve_bytes) + vault_bytes;
    let bytes_available = total_budget.saturating_sub(bytes_used);
    let usage_ratio = if total_budget == 0 {
        1.0
    } else {
        bytes_used as f64 / total_budget as f64
    };
    let warning_level = if usage_ratio >= config.critical_ratio {
        WarningLevel::Critical
    } else if usage_ratio >= config.warning_ratio {
        WarningLevel::Warning
    } else {
        WarningLevel::None
    };

    Ok(QuotaStatus {
        total_budget,
        bytes_used,
        bytes_available,
        usage_ratio,
        warning_level,
        settings_bytes,
        vault_bytes,
    })
}
