//! In-process stores. Contents live as long as the value does.

use super::{key_matches, object_path, KvItem, KvStore, ObjectStore, StoredObject};
use crate::error::StoreError;
use async_trait::async_trait;
use std::collections::BTreeMap;
use tokio::sync::Mutex;

#[derive(Debug, Default)]
pub struct MemoryObjectStore {
    objects: Mutex<BTreeMap<String, Vec<u8>>>,
}

impl MemoryObjectStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.objects.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.objects.lock().await.is_empty()
    }
}

#[async_trait]
impl ObjectStore for MemoryObjectStore {
    async fn upload(&self, name: &str, bytes: &[u8]) -> Result<StoredObject, StoreError> {
        let path = object_path(name);
        self.objects.lock().await.insert(path.clone(), bytes.to_vec());
        Ok(StoredObject {
            path,
            size: bytes.len() as u64,
        })
    }

    async fn read(&self, path: &str) -> Result<Option<Vec<u8>>, StoreError> {
        Ok(self.objects.lock().await.get(path).cloned())
    }

    async fn delete(&self, path: &str) -> Result<(), StoreError> {
        self.objects.lock().await.remove(path);
        Ok(())
    }

    async fn list(&self) -> Result<Vec<String>, StoreError> {
        Ok(self.objects.lock().await.keys().cloned().collect())
    }
}

#[derive(Debug, Default)]
pub struct MemoryKvStore {
    entries: Mutex<BTreeMap<String, String>>,
}

impl MemoryKvStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl KvStore for MemoryKvStore {
    async fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        self.entries
            .lock()
            .await
            .insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        Ok(self.entries.lock().await.get(key).cloned())
    }

    async fn list(&self, pattern: &str, include_values: bool) -> Result<Vec<KvItem>, StoreError> {
        Ok(list_matching(&*self.entries.lock().await, pattern, include_values))
    }

    async fn flush(&self) -> Result<(), StoreError> {
        self.entries.lock().await.clear();
        Ok(())
    }
}

pub(crate) fn list_matching(
    entries: &BTreeMap<String, String>,
    pattern: &str,
    include_values: bool,
) -> Vec<KvItem> {
    entries
        .iter()
        .filter(|(key, _)| key_matches(pattern, key))
        .map(|(key, value)| KvItem {
            key: key.clone(),
            value: include_values.then(|| value.clone()),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn object_round_trip_and_delete() {
        let store = MemoryObjectStore::new();
        let stored = store.upload("cv.pdf", b"%PDF-1.7").await.unwrap();
        assert_eq!(stored.size, 8);
        assert_eq!(
            store.read(&stored.path).await.unwrap().as_deref(),
            Some(&b"%PDF-1.7"[..])
        );
        store.delete(&stored.path).await.unwrap();
        assert!(store.read(&stored.path).await.unwrap().is_none());
        // deleting twice is fine
        store.delete(&stored.path).await.unwrap();
        assert!(store.is_empty().await);
    }

    #[tokio::test]
    async fn kv_list_filters_and_omits_values_on_request() {
        let kv = MemoryKvStore::new();
        kv.set("resume:b", "2").await.unwrap();
        kv.set("resume:a", "1").await.unwrap();
        kv.set("other", "x").await.unwrap();

        let items = kv.list("resume:*", true).await.unwrap();
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].key, "resume:a");
        assert_eq!(items[0].value.as_deref(), Some("1"));

        let keys = kv.list("resume:*", false).await.unwrap();
        assert!(keys.iter().all(|i| i.value.is_none()));

        kv.flush().await.unwrap();
        assert!(kv.get("other").await.unwrap().is_none());
    }
}
