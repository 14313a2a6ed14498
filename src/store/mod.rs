//! Persistence collaborators: a blob store for documents and rasters, and a
//! string key-value store for submission records.
//!
//! Both are consumed through narrow traits so the pipeline runs unchanged
//! against the in-memory stores (tests, one-shot runs) or the directory-backed
//! ones (the CLI).
//!
//! Contract notes:
//! * "not found" is never an error: `read` returns `Ok(None)`, `delete` of a
//!   missing path is `Ok(())`.
//! * `KvStore::list` accepts glob patterns where `*` matches any run of
//!   characters, e.g. `resume:*`.

pub mod fs;
pub mod memory;

use crate::error::StoreError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub use fs::{DirKvStore, DirObjectStore};
pub use memory::{MemoryKvStore, MemoryObjectStore};

/// Handle to a stored blob.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredObject {
    pub path: String,
    pub size: u64,
}

/// One key (and optionally its value) returned by [`KvStore::list`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KvItem {
    pub key: String,
    pub value: Option<String>,
}

#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Store `bytes` under a fresh path derived from `name`.
    async fn upload(&self, name: &str, bytes: &[u8]) -> Result<StoredObject, StoreError>;

    async fn read(&self, path: &str) -> Result<Option<Vec<u8>>, StoreError>;

    async fn delete(&self, path: &str) -> Result<(), StoreError>;

    /// Paths of every stored object.
    async fn list(&self) -> Result<Vec<String>, StoreError>;
}

#[async_trait]
pub trait KvStore: Send + Sync {
    async fn set(&self, key: &str, value: &str) -> Result<(), StoreError>;

    async fn get(&self, key: &str) -> Result<Option<String>, StoreError>;

    /// Keys matching `pattern`, sorted. Values are filled only when
    /// `include_values` is true.
    async fn list(&self, pattern: &str, include_values: bool) -> Result<Vec<KvItem>, StoreError>;

    /// Remove every key.
    async fn flush(&self) -> Result<(), StoreError>;
}

/// Fresh object path for an upload: a random prefix plus the file name
/// component of `name`, so two uploads of `resume.pdf` never collide.
pub(crate) fn object_path(name: &str) -> String {
    let base = name
        .rsplit(['/', '\\'])
        .next()
        .filter(|s| !s.is_empty() && *s != "." && *s != "..")
        .unwrap_or("upload");
    format!("{}-{}", Uuid::new_v4().simple(), base)
}

/// Glob match where `*` matches any (possibly empty) run of characters.
pub fn key_matches(pattern: &str, key: &str) -> bool {
    let mut parts = pattern.split('*');
    let first = parts.next().unwrap_or_default();
    let Some(mut rest) = key.strip_prefix(first) else {
        return false;
    };
    let parts: Vec<&str> = parts.collect();
    let Some((last, middle)) = parts.split_last() else {
        // no '*' at all
        return rest.is_empty();
    };
    for part in middle {
        match rest.find(part) {
            Some(idx) => rest = &rest[idx + part.len()..],
            None => return false,
        }
    }
    rest.len() >= last.len() && rest.ends_with(last)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn glob_prefix_pattern() {
        assert!(key_matches("resume:*", "resume:1234"));
        assert!(key_matches("resume:*", "resume:"));
        assert!(!key_matches("resume:*", "draft:1234"));
    }

    #[test]
    fn glob_exact_and_inner_wildcards() {
        assert!(key_matches("resume:42", "resume:42"));
        assert!(!key_matches("resume:42", "resume:421"));
        assert!(key_matches("*", "anything"));
        assert!(key_matches("a*c*e", "abcde"));
        assert!(!key_matches("a*c*e", "abde"));
        assert!(!key_matches("ab*ba", "aba"));
    }

    #[test]
    fn object_paths_keep_file_name_and_are_unique() {
        let a = object_path("/home/me/resume.pdf");
        let b = object_path("resume.pdf");
        assert!(a.ends_with("-resume.pdf"));
        assert_ne!(a, b);
        assert!(object_path("../").ends_with("-upload"));
    }
}
