use serde_json::{json, Value};
use tabvault_storage::{item_size, KvStore, MemoryStore, StoreLimits};

use crate::config::EngineConfig;
use crate::quota::{measure, WarningLevel};
use crate::testutil::test_config;

fn small_config() -> EngineConfig {
    let mut config = test_config();
    config.limits = StoreLimits {
        quota_bytes: 1000,
        quota_bytes_per_item: 500,
        max_write_ops_per_minute: None,
    };
    config.settings_reserve_bytes = 100;
    config.meta_reserve_bytes = 50;
    config
}

#[test]
fn empty_store_charges_the_settings_reserve() {
    let config = EngineConfig::default();
    let status = measure(&MemoryStore::unbounded(), &config).unwrap();
    assert_eq!(status.settings_bytes, 0);
    assert_eq!(status.vault_bytes, 0);
    assert_eq!(status.bytes_used, config.settings_reserve_bytes);
    assert_eq!(
        status.bytes_available,
        config.limits.quota_bytes - config.settings_reserve_bytes
    );
    assert_eq!(status.warning_level, WarningLevel::None);
}

#[test]
fn measured_settings_above_reserve_are_used() {
    let config = small_config();
    let store = MemoryStore::unbounded();
    let settings = json!("s".repeat(200));
    store.set_one("app_settings", settings.clone()).unwrap();
    let status = measure(&store, &config).unwrap();
    assert_eq!(status.settings_bytes, item_size("app_settings", &settings));
    assert_eq!(status.bytes_used, status.settings_bytes);
    assert_eq!(
        status.payload_budget(&config),
        1000 - status.settings_bytes - 50
    );
}

#[test]
fn only_vault_and_settings_keys_count() {
    let config = small_config();
    let store = MemoryStore::unbounded();
    let chunk = Value::String("c".repeat(40));
    store.set_one("vault_chunk_0", chunk.clone()).unwrap();
    store.set_one("unrelated", json!("u".repeat(300))).unwrap();
    let status = measure(&store, &config).unwrap();
    assert_eq!(status.vault_bytes, item_size("vault_chunk_0", &chunk));
    assert_eq!(status.bytes_used, 100 + status.vault_bytes);
}

#[test]
fn warning_levels_follow_usage_ratio() {
    let config = small_config();
    let store = MemoryStore::unbounded();
    // "vault_chunk_0" (13) + quotes (2) + body
    store.put_raw("vault_chunk_0", json!("x".repeat(735))).unwrap();
    let status = measure(&store, &config).unwrap();
    assert_eq!(status.bytes_used, 850);
    assert_eq!(status.warning_level, WarningLevel::Warning);

    store.put_raw("vault_chunk_0", json!("x".repeat(845))).unwrap();
    let status = measure(&store, &config).unwrap();
    assert_eq!(status.bytes_used, 960);
    assert_eq!(status.warning_level, WarningLevel::Critical);

    store.put_raw("vault_chunk_0", json!("x".repeat(1000))).unwrap();
    let status = measure(&store, &config).unwrap();
    assert_eq!(status.bytes_available, 0);
    assert!(status.usage_ratio > 1.0);
}

#[test]
fn payload_budget_saturates_at_zero() {
    let mut config = small_config();
    config.settings_reserve_bytes = 1000;
    let status = measure(&MemoryStore::unbounded(), &config).unwrap();
    assert_eq!(status.payload_budget(&config), 0);
    assert_eq!(status.warning_level, WarningLevel::Critical);
}
