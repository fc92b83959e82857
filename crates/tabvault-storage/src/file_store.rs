use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use tabvault_types::error::{Result, VaultError};

use crate::limits::{item_size, WriteGate};
use crate::{Items, KvStore, StoreLimits};

struct Inner {
    data: Items,
    gate: WriteGate,
}

/// Store persisted as a single JSON document on the local filesystem.
///
/// Every mutation rewrites the document through a temp file in the same
/// directory followed by an atomic rename, so readers never observe a
/// partially written store.
pub struct FileStore {
    path: PathBuf,
    inner: Mutex<Inner>,
}

impl FileStore {
    /// Open (or lazily create) a store at `path`, enforcing `limits` if given.
    pub fn open(path: impl AsRef<Path>, limits: Option<StoreLimits>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let data = match fs::read(&path) {
            Ok(bytes) if bytes.is_empty() => Items::new(),
            Ok(bytes) => serde_json::from_slice(&bytes).map_err(|e| {
                VaultError::InvalidFormat(format!("store file '{}': {e}", path.display()))
            })?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Items::new(),
            Err(e) => return Err(e.into()),
        };
        Ok(Self {
            path,
            inner: Mutex::new(Inner {
                data,
                gate: WriteGate::new(limits),
            }),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Inner>> {
        self.inner
            .lock()
            .map_err(|_| VaultError::Other("file store mutex poisoned".into()))
    }

    fn persist(&self, data: &Items) -> Result<()> {
        let dir = match self.path.parent() {
            Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
            _ => PathBuf::from("."),
        };
        fs::create_dir_all(&dir)?;
        let mut tmp = tempfile::NamedTempFile::new_in(&dir)?;
        serde_json::to_writer(&mut tmp, data)?;
        tmp.flush()?;
        tmp.persist(&self.path).map_err(|e| e.error)?;
        Ok(())
    }
}

impl KvStore for FileStore {
    fn get(&self, keys: Option<&[String]>) -> Result<Items> {
        let inner = self.lock()?;
        Ok(match keys {
            None => inner.data.clone(),
            Some(keys) => keys
                .iter()
                .filter_map(|k| inner.data.get(k).map(|v| (k.clone(), v.clone())))
                .collect(),
        })
    }

    fn set(&self, items: Items) -> Result<()> {
        let mut inner = self.lock()?;
        inner.gate.check_budget(&inner.data, &items)?;
        inner.gate.admit_op()?;
        let mut next = inner.data.clone();
        next.extend(items);
        self.persist(&next)?;
        inner.data = next;
        Ok(())
    }

    fn remove(&self, keys: &[String]) -> Result<()> {
        let mut inner = self.lock()?;
        // removing absent keys is a no-op and costs no write
        if !keys.iter().any(|k| inner.data.contains_key(k)) {
            return Ok(());
        }
        inner.gate.admit_op()?;
        let mut next = inner.data.clone();
        for key in keys {
            next.remove(key);
        }
        self.persist(&next)?;
        inner.data = next;
        Ok(())
    }

    fn bytes_in_use(&self, keys: Option<&[String]>) -> Result<u64> {
        let inner = self.lock()?;
        Ok(match keys {
            None => inner.data.iter().map(|(k, v)| item_size(k, v)).sum(),
            Some(keys) => keys
                .iter()
                .filter_map(|k| inner.data.get(k).map(|v| item_size(k, v)))
                .sum(),
        })
    }
}
