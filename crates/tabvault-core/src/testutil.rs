use std::sync::{Arc, Mutex};

use rand::distributions::Alphanumeric;
use rand::rngs::StdRng;
use rand::Rng;
use serde_json::Value;
use tabvault_storage::{Items, KvStore, MemoryStore, RetryConfig, StoreLimits};
use tabvault_types::error::{Result, VaultError};
use tabvault_types::item::{ArchivedGroup, ArchivedItem, ArchivedTab, VaultSnapshot};

use crate::config::{CompressionAlgorithm, EngineConfig};
use crate::session::VaultSession;

const SAVED_AT: i64 = 1_700_000_000_000;

pub fn tab(id: &str, url: &str) -> ArchivedTab {
    ArchivedTab {
        id: id.to_string(),
        original_id: None,
        saved_at: SAVED_AT,
        title: format!("Title {id}"),
        url: url.to_string(),
        fav_icon_url: None,
        was_pinned: false,
        was_muted: false,
        was_frozen: false,
    }
}

pub fn tab_item(id: &str, url: &str) -> ArchivedItem {
    ArchivedItem::Tab(tab(id, url))
}

/// Group whose member tabs are named `<id>-<n>`.
pub fn group_item(id: &str, urls: &[&str]) -> ArchivedItem {
    ArchivedItem::Group(ArchivedGroup {
        id: id.to_string(),
        original_id: Some(17),
        saved_at: SAVED_AT,
        title: format!("Group {id}"),
        color: "blue".to_string(),
        collapsed: true,
        tabs: urls
            .iter()
            .enumerate()
            .map(|(i, url)| tab(&format!("{id}-{i}"), url))
            .collect(),
    })
}

pub fn snapshot_of_tabs(urls: &[&str]) -> VaultSnapshot {
    VaultSnapshot::new(
        urls.iter()
            .enumerate()
            .map(|(i, url)| tab_item(&format!("tab-{i}"), url))
            .collect(),
    )
}

/// A favicon data URL of roughly `len` bytes.
fn favicon(seed: usize, len: usize) -> String {
    let body: String = (0..len)
        .map(|i| char::from(b'A' + ((i * 7 + seed * 13) % 26) as u8))
        .collect();
    format!("data:image/png;base64,{body}")
}

/// `n` tabs with distinct paths, pseudo-random favicons and flags.
pub fn random_snapshot(rng: &mut StdRng, n: usize) -> VaultSnapshot {
    let hosts = ["docs.example.com", "news.example.org", "shop.example.net"];
    let items = (0..n)
        .map(|i| {
            let host = hosts[rng.gen_range(0..hosts.len())];
            let mut t = tab(&format!("r{i}"), &format!("https://{host}/p/{}", rng.gen::<u32>()));
            t.original_id = Some(rng.gen_range(1..10_000));
            t.was_pinned = rng.gen_bool(0.2);
            t.was_muted = rng.gen_bool(0.2);
            if rng.gen_bool(0.5) {
                t.fav_icon_url = Some(favicon(i, rng.gen_range(20..200)));
            }
            if rng.gen_bool(0.15) {
                ArchivedItem::Group(ArchivedGroup {
                    id: format!("g{i}"),
                    original_id: None,
                    saved_at: SAVED_AT + i as i64,
                    title: format!("Group {i}"),
                    color: "red".to_string(),
                    collapsed: false,
                    tabs: vec![t],
                })
            } else {
                ArchivedItem::Tab(t)
            }
        })
        .collect();
    VaultSnapshot::new(items)
}

/// `n` tabs carrying incompressible favicons of `icon_len` characters.
pub fn noisy_snapshot(rng: &mut StdRng, n: usize, icon_len: usize) -> VaultSnapshot {
    let items = (0..n)
        .map(|i| {
            let mut t = tab(&format!("n{i}"), &format!("https://example.com/{i}"));
            let body: String = (&mut *rng)
                .sample_iter(&Alphanumeric)
                .take(icon_len)
                .map(char::from)
                .collect();
            t.fav_icon_url = Some(format!("data:image/png;base64,{body}"));
            ArchivedItem::Tab(t)
        })
        .collect();
    VaultSnapshot::new(items)
}

/// Defaults with fast compression, no sleeping retries and no write throttling.
pub fn test_config() -> EngineConfig {
    let mut config = EngineConfig::default();
    config.limits = StoreLimits {
        max_write_ops_per_minute: None,
        ..StoreLimits::default()
    };
    config.compression.algorithm = CompressionAlgorithm::Zstd;
    config.compression.zstd_level = 3;
    config.load_retry = RetryConfig::immediate(2);
    config.write_retry = RetryConfig::immediate(3);
    config
}

pub struct TestVault {
    pub session: VaultSession,
    pub remote: Arc<FaultyStore>,
    pub local: Arc<MemoryStore>,
}

pub fn test_vault(config: EngineConfig) -> TestVault {
    let remote = Arc::new(FaultyStore::new(MemoryStore::with_limits(config.limits.clone())));
    let local = Arc::new(MemoryStore::unbounded());
    let session = VaultSession::new(remote.clone(), local.clone(), config)
        .expect("test config must be valid");
    TestVault {
        session,
        remote,
        local,
    }
}

/// A second session over the same stores, as another device would have.
pub fn reopen(vault: &TestVault) -> VaultSession {
    VaultSession::new(
        vault.remote.clone(),
        vault.local.clone(),
        vault.session.config().clone(),
    )
    .expect("test config must be valid")
}

#[derive(Default)]
struct Faults {
    rate_limit_writes: usize,
    quota_fail_writes: usize,
    truncate_strings: bool,
    fail_reads: bool,
}

/// Sync-store stand-in that injects the failures a real quota-bound
/// backend produces.
pub struct FaultyStore {
    inner: MemoryStore,
    faults: Mutex<Faults>,
}

impl FaultyStore {
    pub fn new(inner: MemoryStore) -> Self {
        Self {
            inner,
            faults: Mutex::new(Faults::default()),
        }
    }

    /// Throttle the next `n` writes.
    pub fn rate_limit_next(&self, n: usize) {
        self.faults.lock().unwrap().rate_limit_writes = n;
    }

    /// Reject the next `n` writes with a quota error.
    pub fn fail_quota_next(&self, n: usize) {
        self.faults.lock().unwrap().quota_fail_writes = n;
    }

    /// Accept writes but store every string value one character short.
    pub fn truncate_strings(&self, on: bool) {
        self.faults.lock().unwrap().truncate_strings = on;
    }

    pub fn fail_reads(&self, on: bool) {
        self.faults.lock().unwrap().fail_reads = on;
    }

    /// Delete a key behind the engine's back.
    pub fn drop_key(&self, key: &str) {
        self.inner.remove(&[key.to_string()]).unwrap();
    }

    /// Overwrite a value behind the engine's back.
    pub fn put_raw(&self, key: &str, value: Value) {
        self.inner.put_raw(key, value).unwrap();
    }

    pub fn raw(&self, key: &str) -> Option<Value> {
        self.inner.get_one(key).unwrap()
    }
}

impl KvStore for FaultyStore {
    fn get(&self, keys: Option<&[String]>) -> Result<Items> {
        if self.faults.lock().unwrap().fail_reads {
            return Err(VaultError::Storage("injected read failure".into()));
        }
        self.inner.get(keys)
    }

    fn set(&self, mut items: Items) -> Result<()> {
        {
            let mut faults = self.faults.lock().unwrap();
            if faults.rate_limit_writes > 0 {
                faults.rate_limit_writes -= 1;
                return Err(tabvault_storage::retry::rate_limited("injected"));
            }
            if faults.quota_fail_writes > 0 {
                faults.quota_fail_writes -= 1;
                return Err(VaultError::Storage(
                    "QUOTA_BYTES quota exceeded (injected)".into(),
                ));
            }
            if faults.truncate_strings {
                for value in items.values_mut() {
                    if let Value::String(s) = value {
                        s.pop();
                    }
                }
            }
        }
        self.inner.set(items)
    }

    fn remove(&self, keys: &[String]) -> Result<()> {
        self.inner.remove(keys)
    }

    fn bytes_in_use(&self, keys: Option<&[String]>) -> Result<u64> {
        self.inner.bytes_in_use(keys)
    }
}

/// Seeded rng for reproducible property-style loops.
pub fn seeded(seed: u64) -> StdRng {
    use rand::SeedableRng;
    StdRng::seed_from_u64(seed)
}
