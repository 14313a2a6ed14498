//! Directory-backed stores used by the CLI.
//!
//! Layout under a data directory:
//!
//! ```text
//! <data-dir>/
//!   files/<random>-<name>    one blob per upload
//!   kv.json                  every key-value pair in a single JSON object
//! ```
//!
//! Writes go through a temp file + rename so a crash never leaves a
//! half-written blob or a truncated `kv.json`.

use super::memory::list_matching;
use super::{object_path, KvItem, KvStore, ObjectStore, StoredObject};
use crate::error::StoreError;
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;
use tracing::debug;

const TMP_SUFFIX: &str = ".tmp";

fn io_err(path: &Path, source: std::io::Error) -> StoreError {
    StoreError::Io {
        path: path.display().to_string(),
        source,
    }
}

/// Write `bytes` to `path` atomically (temp file, then rename).
async fn write_atomic(path: &Path, bytes: &[u8]) -> Result<(), StoreError> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|e| io_err(parent, e))?;
    }
    let mut tmp = path.as_os_str().to_owned();
    tmp.push(TMP_SUFFIX);
    let tmp = PathBuf::from(tmp);
    tokio::fs::write(&tmp, bytes)
        .await
        .map_err(|e| io_err(&tmp, e))?;
    tokio::fs::rename(&tmp, path)
        .await
        .map_err(|e| io_err(path, e))
}

#[derive(Debug, Clone)]
pub struct DirObjectStore {
    root: PathBuf,
}

impl DirObjectStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Object paths are single file names; anything that could escape the
    /// root is rejected.
    fn resolve(&self, path: &str) -> Result<PathBuf, StoreError> {
        let valid = !path.is_empty()
            && path != "."
            && path != ".."
            && !path.contains(['/', '\\'])
            && !path.ends_with(TMP_SUFFIX);
        if valid {
            Ok(self.root.join(path))
        } else {
            Err(StoreError::InvalidPath(path.to_string()))
        }
    }
}

#[async_trait]
impl ObjectStore for DirObjectStore {
    async fn upload(&self, name: &str, bytes: &[u8]) -> Result<StoredObject, StoreError> {
        let path = object_path(name);
        let target = self.resolve(&path)?;
        write_atomic(&target, bytes).await?;
        debug!("Stored {} bytes at {}", bytes.len(), target.display());
        Ok(StoredObject {
            path,
            size: bytes.len() as u64,
        })
    }

    async fn read(&self, path: &str) -> Result<Option<Vec<u8>>, StoreError> {
        let target = self.resolve(path)?;
        match tokio::fs::read(&target).await {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(io_err(&target, e)),
        }
    }

    async fn delete(&self, path: &str) -> Result<(), StoreError> {
        let target = self.resolve(path)?;
        match tokio::fs::remove_file(&target).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(io_err(&target, e)),
        }
    }

    async fn list(&self) -> Result<Vec<String>, StoreError> {
        let mut dir = match tokio::fs::read_dir(&self.root).await {
            Ok(dir) => dir,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(io_err(&self.root, e)),
        };
        let mut paths = Vec::new();
        while let Some(entry) = dir.next_entry().await.map_err(|e| io_err(&self.root, e))? {
            let name = entry.file_name().to_string_lossy().into_owned();
            if !name.ends_with(TMP_SUFFIX) {
                paths.push(name);
            }
        }
        paths.sort();
        Ok(paths)
    }
}

/// Key-value store persisted as one JSON object.
///
/// The whole map is held in memory behind a mutex and rewritten on every
/// mutation; submission records are small and writes are rare.
#[derive(Debug)]
pub struct DirKvStore {
    path: PathBuf,
    entries: Mutex<BTreeMap<String, String>>,
}

impl DirKvStore {
    /// Open (or lazily create) the store backed by `path`.
    pub async fn open(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let path = path.into();
        let entries = match tokio::fs::read(&path).await {
            Ok(bytes) => serde_json::from_slice(&bytes)?,
            Err(e) if e.kind() == ErrorKind::NotFound => BTreeMap::new(),
            Err(e) => return Err(io_err(&path, e)),
        };
        Ok(Self {
            path,
            entries: Mutex::new(entries),
        })
    }

    async fn persist(&self, entries: &BTreeMap<String, String>) -> Result<(), StoreError> {
        let bytes = serde_json::to_vec_pretty(entries)?;
        write_atomic(&self.path, &bytes).await
    }
}

#[async_trait]
impl KvStore for DirKvStore {
    async fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        let mut entries = self.entries.lock().await;
        let previous = entries.insert(key.to_string(), value.to_string());
        if let Err(e) = self.persist(&entries).await {
            // keep memory and disk in agreement
            match previous {
                Some(old) => entries.insert(key.to_string(), old),
                None => entries.remove(key),
            };
            return Err(e);
        }
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        Ok(self.entries.lock().await.get(key).cloned())
    }

    async fn list(&self, pattern: &str, include_values: bool) -> Result<Vec<KvItem>, StoreError> {
        Ok(list_matching(&*self.entries.lock().await, pattern, include_values))
    }

    async fn flush(&self) -> Result<(), StoreError> {
        let mut entries = self.entries.lock().await;
        self.persist(&BTreeMap::new()).await?;
        entries.clear();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn dir_objects_round_trip() {
        let dir = TempDir::new().unwrap();
        let store = DirObjectStore::new(dir.path().join("files"));
        assert!(store.list().await.unwrap().is_empty());

        let stored = store.upload("resume.png", b"\x89PNG").await.unwrap();
        assert_eq!(store.list().await.unwrap(), vec![stored.path.clone()]);
        assert_eq!(
            store.read(&stored.path).await.unwrap(),
            Some(b"\x89PNG".to_vec())
        );
        store.delete(&stored.path).await.unwrap();
        assert_eq!(store.read(&stored.path).await.unwrap(), None);
    }

    #[tokio::test]
    async fn dir_objects_reject_escaping_paths() {
        let dir = TempDir::new().unwrap();
        let store = DirObjectStore::new(dir.path());
        assert!(matches!(
            store.read("../secret").await,
            Err(StoreError::InvalidPath(_))
        ));
    }

    #[tokio::test]
    async fn dir_kv_survives_reopen() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("kv.json");
        {
            let kv = DirKvStore::open(&path).await.unwrap();
            kv.set("resume:1", "{\"id\":\"1\"}").await.unwrap();
        }
        let kv = DirKvStore::open(&path).await.unwrap();
        assert_eq!(
            kv.get("resume:1").await.unwrap().as_deref(),
            Some("{\"id\":\"1\"}")
        );
        kv.flush().await.unwrap();
        let kv = DirKvStore::open(&path).await.unwrap();
        assert!(kv.list("*", false).await.unwrap().is_empty());
    }
}
