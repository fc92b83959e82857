use std::path::Path;
use std::sync::Arc;

use serde_json::json;
use tabvault_core::codec::normalize_snapshot;
use tabvault_core::config::{parse_config, CompressionAlgorithm};
use tabvault_core::meta::StorageMeta;
use tabvault_core::{EngineConfig, LoadSource, SaveStatus, VaultSession};
use tabvault_storage::{FileStore, KvStore, RetryConfig};
use tabvault_types::item::{ArchivedGroup, ArchivedItem, ArchivedTab, VaultSnapshot};

fn make_test_config() -> EngineConfig {
    let mut config = EngineConfig::default();
    config.limits.max_write_ops_per_minute = None;
    // uncompressed payloads keep the diff-versus-full comparison predictable
    config.compression.algorithm = CompressionAlgorithm::None;
    config.load_retry = RetryConfig::immediate(1);
    config.write_retry = RetryConfig::immediate(1);
    config
}

fn archived_tab(id: &str, url: &str) -> ArchivedTab {
    ArchivedTab {
        id: id.to_string(),
        original_id: Some(100),
        saved_at: 1_700_000_000_000,
        title: format!("Page {id}"),
        url: url.to_string(),
        fav_icon_url: Some("https://example.com/favicon.ico".to_string()),
        was_pinned: id.ends_with('1'),
        was_muted: false,
        was_frozen: false,
    }
}

fn sample_snapshot() -> VaultSnapshot {
    let mut items: Vec<ArchivedItem> = (0..20)
        .map(|i| {
            ArchivedItem::Tab(archived_tab(
                &format!("tab-{i}"),
                &format!("https://www.docs.example.com/guide/{i}/?utm_source=x"),
            ))
        })
        .collect();
    items.push(ArchivedItem::Group(ArchivedGroup {
        id: "group-1".to_string(),
        original_id: None,
        saved_at: 1_700_000_000_500,
        title: "Research".to_string(),
        color: "purple".to_string(),
        collapsed: true,
        tabs: vec![
            archived_tab("member-1", "https://arxiv.example.org/abs/1"),
            archived_tab("member-2", "about:blank"),
        ],
    }));
    VaultSnapshot::new(items)
}

fn open_session(dir: &Path, config: &EngineConfig) -> (VaultSession, Arc<FileStore>) {
    let remote = Arc::new(
        FileStore::open(dir.join("sync.json"), Some(config.limits.clone())).unwrap(),
    );
    let local = Arc::new(FileStore::open(dir.join("local.json"), None).unwrap());
    let session = VaultSession::new(remote.clone(), local, config.clone()).unwrap();
    (session, remote)
}

#[test]
fn vault_survives_process_restarts() {
    let tmp = tempfile::tempdir().unwrap();
    let config = make_test_config();
    let snapshot = sample_snapshot();

    let (mut session, _) = open_session(tmp.path(), &config);
    let report = session.save(&snapshot).unwrap();
    assert_eq!(report.status, SaveStatus::Synced);
    drop(session);

    let (mut session, _) = open_session(tmp.path(), &config);
    let load = session.load();
    assert_eq!(load.source, LoadSource::Remote);
    assert_eq!(load.snapshot, normalize_snapshot(&snapshot));

    let mut next = load.snapshot.clone();
    next.items
        .push(ArchivedItem::Tab(archived_tab("late", "https://example.net/late")));
    assert_eq!(session.save(&next).unwrap().status, SaveStatus::SyncedDiff);
    drop(session);

    let (mut session, _) = open_session(tmp.path(), &config);
    let load = session.load();
    assert_eq!(load.source, LoadSource::RemoteWithDiff);
    assert_eq!(load.snapshot, next);
}

#[test]
fn disabling_and_enabling_sync_round_trips() {
    let tmp = tempfile::tempdir().unwrap();
    let config = make_test_config();
    let snapshot = sample_snapshot();

    let (mut session, remote) = open_session(tmp.path(), &config);
    session.save(&snapshot).unwrap();
    session.disable_sync(&snapshot).unwrap();
    assert!(remote.keys().unwrap().is_empty());
    drop(session);

    let (mut session, _) = open_session(tmp.path(), &config);
    assert!(!session.sync_enabled().unwrap());
    let load = session.load();
    assert_eq!(load.source, LoadSource::LocalBackup);
    assert_eq!(load.snapshot, snapshot);

    let report = session.enable_sync(&load.snapshot).unwrap();
    assert_eq!(report.status, SaveStatus::Synced);
    assert!(session.stats().unwrap().meta.is_some());
}

#[test]
fn legacy_store_file_is_migrated() {
    let tmp = tempfile::tempdir().unwrap();
    let legacy = json!({
        "vault_items": [
            {"id": 5, "windowId": 1, "url": "https://example.com/a", "title": "A"},
            {"id": 6, "windowId": 1, "url": "https://example.com/b", "title": "B", "pinned": true}
        ]
    });
    std::fs::write(tmp.path().join("sync.json"), legacy.to_string()).unwrap();

    let (mut session, remote) = open_session(tmp.path(), &make_test_config());
    let load = session.load();
    assert!(load.migrated);
    assert_eq!(load.snapshot.len(), 2);
    assert!(remote.get_one("vault_items").unwrap().is_none());

    let stats = session.stats().unwrap();
    assert!(!stats.has_legacy);
    assert_eq!(stats.local_backup_items, Some(2));
}

#[test]
fn yaml_config_selects_codec_and_limits() {
    let tmp = tempfile::tempdir().unwrap();
    let mut config = parse_config(
        "limits:\n  quota_bytes_per_item: 2048\n  max_write_ops_per_minute: null\ncompression:\n  algorithm: lz4\n",
    )
    .unwrap();
    config.write_retry = RetryConfig::immediate(1);

    let (mut session, remote) = open_session(tmp.path(), &config);
    let report = session.save(&sample_snapshot()).unwrap();
    assert_eq!(report.status, SaveStatus::Synced);

    let meta = StorageMeta::from_value(remote.get_one("vault_meta").unwrap().unwrap()).unwrap();
    assert_eq!(meta.compression, "lz4");
    for key in &meta.chunk_keys {
        let value = remote.get_one(key).unwrap().unwrap();
        assert!(tabvault_storage::item_size(key, &value) <= 2048);
    }
}
