use rand::Rng;
use serde_json::Value;
use tabvault_types::item::VaultSnapshot;

use crate::codec::normalize_snapshot;
use crate::diff::SnapshotDiff;
use crate::session::{ErrorCode, LoadSource, SaveStatus};
use crate::testutil::{
    noisy_snapshot, random_snapshot, reopen, seeded, tab_item, test_config, test_vault,
};

fn with_extra(base: &VaultSnapshot, id: &str) -> VaultSnapshot {
    let mut next = base.clone();
    next.items
        .push(tab_item(id, &format!("https://example.com/{id}")));
    next
}

#[test]
fn computed_diff_rebuilds_target() {
    let mut rng = seeded(31);
    for round in 0..30 {
        let n = rng.gen_range(0..30);
        let prev = random_snapshot(&mut rng, n);
        let mut items: Vec<_> = prev
            .items
            .iter()
            .filter(|_| rng.gen_bool(0.7))
            .cloned()
            .collect();
        for i in 0..rng.gen_range(0..5) {
            items.push(tab_item(
                &format!("new-{round}-{i}"),
                &format!("https://example.net/{round}/{i}"),
            ));
        }
        let curr = VaultSnapshot::new(items);

        let diff = SnapshotDiff::compute(&prev, &curr);
        assert_eq!(diff.apply(&prev), curr);
        assert!(diff.reproduces(&prev, &curr));
        assert_eq!(diff.is_empty(), prev == curr);
    }
}

#[test]
fn small_addition_is_saved_as_diff() {
    let mut vault = test_vault(test_config());
    let base = random_snapshot(&mut seeded(32), 30);
    assert_eq!(vault.session.save(&base).unwrap().status, SaveStatus::Synced);

    let next = with_extra(&base, "added");
    let report = vault.session.save(&next).unwrap();
    assert_eq!(report.status, SaveStatus::SyncedDiff);
    assert!(vault.remote.raw("vault_diff").is_some());

    let load = reopen(&vault).load();
    assert_eq!(load.source, LoadSource::RemoteWithDiff);
    assert_eq!(load.snapshot, normalize_snapshot(&next));
}

#[test]
fn diff_after_load_applies_to_loaded_baseline() {
    let mut vault = test_vault(test_config());
    let base = random_snapshot(&mut seeded(33), 30);
    vault.session.save(&base).unwrap();

    let mut other = reopen(&vault);
    let loaded = other.load().snapshot;
    let mut next = with_extra(&loaded, "later");
    next.items.remove(0);
    assert_eq!(other.save(&next).unwrap().status, SaveStatus::SyncedDiff);
    assert_eq!(reopen(&vault).load().snapshot, normalize_snapshot(&next));
}

#[test]
fn reorder_forces_full_save_and_clears_diff() {
    let mut vault = test_vault(test_config());
    let base = random_snapshot(&mut seeded(34), 30);
    vault.session.save(&base).unwrap();
    let next = with_extra(&base, "x");
    assert_eq!(vault.session.save(&next).unwrap().status, SaveStatus::SyncedDiff);

    let mut reordered = next.clone();
    reordered.items.reverse();
    assert_eq!(vault.session.save(&reordered).unwrap().status, SaveStatus::Synced);
    assert!(vault.remote.raw("vault_diff").is_none());

    let load = reopen(&vault).load();
    assert_eq!(load.source, LoadSource::Remote);
    assert_eq!(load.snapshot, normalize_snapshot(&reordered));
}

#[test]
fn large_change_is_saved_in_full() {
    let mut vault = test_vault(test_config());
    let base = random_snapshot(&mut seeded(35), 5);
    vault.session.save(&base).unwrap();
    let mut next = base.clone();
    next.items
        .extend(noisy_snapshot(&mut seeded(36), 40, 200).items);
    assert_eq!(vault.session.save(&next).unwrap().status, SaveStatus::Synced);
}

#[test]
fn remote_changed_elsewhere_skips_diff() {
    let mut vault = test_vault(test_config());
    let base = random_snapshot(&mut seeded(37), 30);
    vault.session.save(&base).unwrap();

    // another device rewrites the vault in full
    let mut other = reopen(&vault);
    let mut theirs = base.clone();
    theirs.items.reverse();
    assert_eq!(other.save(&theirs).unwrap().status, SaveStatus::Synced);

    let ours = with_extra(&base, "mine");
    assert_eq!(vault.session.save(&ours).unwrap().status, SaveStatus::Synced);
    assert_eq!(reopen(&vault).load().snapshot, normalize_snapshot(&ours));
}

#[test]
fn tampered_diff_falls_back_to_local() {
    let mut vault = test_vault(test_config());
    let base = random_snapshot(&mut seeded(38), 30);
    vault.session.save(&base).unwrap();
    let next = with_extra(&base, "y");
    vault.session.save(&next).unwrap();

    let mut record = vault.remote.raw("vault_diff").unwrap();
    record["sum"] = Value::String("00".repeat(32));
    vault.remote.put_raw("vault_diff", record);

    let load = reopen(&vault).load();
    assert!(load.fallback_to_local);
    assert_eq!(load.error, Some(ErrorCode::ReadCorruption));
    assert_eq!(load.snapshot, next);
}
