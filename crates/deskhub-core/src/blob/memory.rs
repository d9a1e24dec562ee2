//! In-memory blob store.
//!
//! Files live in a `BTreeMap` keyed by normalized key. Directories exist
//! explicitly (via `make_directory`) or implicitly as prefixes of stored
//! keys. Listings report prefixed keys, like [`super::LocalBlobStore`].

use std::collections::{BTreeMap, BTreeSet};
use std::io;
use std::sync::Arc;

use parking_lot::RwLock;

use super::BlobStore;
use crate::error::StorageError;
use crate::path;

#[derive(Debug, Default)]
struct Inner {
    files: BTreeMap<String, Vec<u8>>,
    dirs: BTreeSet<String>,
}

impl Inner {
    /// Every directory key, explicit and implied by stored keys.
    fn all_dirs(&self) -> BTreeSet<String> {
        let mut out = self.dirs.clone();
        for key in self.files.keys().chain(self.dirs.iter()) {
            let mut parent = key.as_str();
            while let Some((head, _)) = parent.rsplit_once('/') {
                out.insert(head.to_string());
                parent = head;
            }
        }
        out
    }

    fn is_dir(&self, key: &str) -> bool {
        if key.is_empty() || self.dirs.contains(key) {
            return true;
        }
        let prefix = format!("{key}/");
        self.files.keys().any(|k| k.starts_with(&prefix))
            || self.dirs.iter().any(|d| d.starts_with(&prefix))
    }

    /// Whether some ancestor of `key` is stored as a file.
    fn has_file_ancestor(&self, key: &str) -> bool {
        let mut parent = key;
        while let Some((head, _)) = parent.rsplit_once('/') {
            if self.files.contains_key(head) {
                return true;
            }
            parent = head;
        }
        false
    }
}

fn collision(key: String, message: &str) -> StorageError {
    StorageError::io(key, io::Error::new(io::ErrorKind::AlreadyExists, message))
}

/// Thread-safe, cloneable in-memory blob store. Clones share data.
#[derive(Debug, Clone, Default)]
pub struct MemoryBlobStore {
    inner: Arc<RwLock<Inner>>,
}

impl MemoryBlobStore {
    pub fn new() -> Self {
        Self::default()
    }
}

/// `"dir/"` for non-empty `dir`, `""` for the store root.
fn child_prefix(dir: &str) -> String {
    if dir.is_empty() {
        String::new()
    } else {
        format!("{dir}/")
    }
}

impl BlobStore for MemoryBlobStore {
    fn exists(&self, key: &str) -> bool {
        let key = path::normalize(key);
        let inner = self.inner.read();
        inner.files.contains_key(&key) || inner.is_dir(&key)
    }

    fn is_directory(&self, key: &str) -> bool {
        let key = path::normalize(key);
        let inner = self.inner.read();
        !inner.files.contains_key(&key) && inner.is_dir(&key)
    }

    fn files(&self, dir: &str) -> Result<Vec<String>, StorageError> {
        let prefix = child_prefix(&path::normalize(dir));
        let inner = self.inner.read();
        Ok(inner
            .files
            .keys()
            .filter(|k| {
                k.strip_prefix(&prefix)
                    .is_some_and(|rest| !rest.is_empty() && !rest.contains('/'))
            })
            .cloned()
            .collect())
    }

    fn directories(&self, dir: &str) -> Result<Vec<String>, StorageError> {
        let prefix = child_prefix(&path::normalize(dir));
        let inner = self.inner.read();
        Ok(inner
            .all_dirs()
            .into_iter()
            .filter(|d| {
                d.strip_prefix(&prefix)
                    .is_some_and(|rest| !rest.is_empty() && !rest.contains('/'))
            })
            .collect())
    }

    fn all_files(&self, dir: &str) -> Result<Vec<String>, StorageError> {
        let prefix = child_prefix(&path::normalize(dir));
        let inner = self.inner.read();
        Ok(inner
            .files
            .keys()
            .filter(|k| k.starts_with(&prefix))
            .cloned()
            .collect())
    }

    fn all_directories(&self, dir: &str) -> Result<Vec<String>, StorageError> {
        let prefix = child_prefix(&path::normalize(dir));
        let inner = self.inner.read();
        Ok(inner
            .all_dirs()
            .into_iter()
            .filter(|d| d.starts_with(&prefix) && d.len() > prefix.len())
            .collect())
    }

    fn read(&self, key: &str) -> Result<Vec<u8>, StorageError> {
        let key = path::normalize(key);
        self.inner
            .read()
            .files
            .get(&key)
            .cloned()
            .ok_or(StorageError::NotFound(key))
    }

    fn write(&self, key: &str, contents: &[u8]) -> Result<(), StorageError> {
        let key = path::normalize(key);
        let mut inner = self.inner.write();
        if inner.is_dir(&key) {
            return Err(collision(key, "a directory exists at this key"));
        }
        if inner.has_file_ancestor(&key) {
            return Err(collision(key, "a parent of this key is a file"));
        }
        inner.files.insert(key, contents.to_vec());
        Ok(())
    }

    fn size(&self, key: &str) -> Result<u64, StorageError> {
        let key = path::normalize(key);
        self.inner
            .read()
            .files
            .get(&key)
            .map(|bytes| bytes.len() as u64)
            .ok_or(StorageError::NotFound(key))
    }

    fn delete(&self, key: &str) -> Result<(), StorageError> {
        let key = path::normalize(key);
        match self.inner.write().files.remove(&key) {
            Some(_) => Ok(()),
            None => Err(StorageError::NotFound(key)),
        }
    }

    fn delete_directory(&self, key: &str) -> Result<(), StorageError> {
        let key = path::normalize(key);
        let mut inner = self.inner.write();
        if inner.files.contains_key(&key) || !inner.is_dir(&key) {
            return Err(StorageError::NotFound(key));
        }
        let prefix = child_prefix(&key);
        inner.files.retain(|k, _| !k.starts_with(&prefix));
        inner.dirs.retain(|d| *d != key && !d.starts_with(&prefix));
        Ok(())
    }

    fn make_directory(&self, key: &str) -> Result<(), StorageError> {
        let key = path::normalize(key);
        if key.is_empty() {
            return Ok(());
        }
        let mut inner = self.inner.write();
        if inner.files.contains_key(&key) {
            return Err(collision(key, "a file exists at this key"));
        }
        if inner.has_file_ancestor(&key) {
            return Err(collision(key, "a parent of this key is a file"));
        }
        inner.dirs.insert(key);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn implicit_directories_from_file_keys() {
        let store = MemoryBlobStore::new();
        store.write("uploads/sub/deep/c.txt", b"c").unwrap();
        assert!(store.is_directory("uploads"));
        assert!(store.is_directory("uploads/sub/deep"));
        assert!(!store.is_directory("uploads/sub/deep/c.txt"));
        assert_eq!(store.directories("uploads").unwrap(), ["uploads/sub"]);
        assert_eq!(
            store.all_directories("uploads").unwrap(),
            ["uploads/sub", "uploads/sub/deep"]
        );
    }

    #[test]
    fn immediate_listing_excludes_deeper_keys() {
        let store = MemoryBlobStore::new();
        store.write("uploads/a.txt", b"a").unwrap();
        store.write("uploads/sub/b.txt", b"b").unwrap();
        assert_eq!(store.files("uploads").unwrap(), ["uploads/a.txt"]);
        assert_eq!(
            store.all_files("uploads").unwrap(),
            ["uploads/a.txt", "uploads/sub/b.txt"]
        );
    }

    #[test]
    fn sibling_with_shared_prefix_is_not_a_child() {
        let store = MemoryBlobStore::new();
        store.write("uploads2/x", b"x").unwrap();
        assert!(store.files("uploads").unwrap().is_empty());
        assert!(!store.exists("uploads"));
    }

    #[test]
    fn explicit_empty_directory_survives() {
        let store = MemoryBlobStore::new();
        store.make_directory("uploads/empty").unwrap();
        assert!(store.exists("uploads/empty"));
        assert_eq!(store.directories("uploads").unwrap(), ["uploads/empty"]);
    }

    #[test]
    fn delete_directory_removes_descendants_only() {
        let store = MemoryBlobStore::new();
        store.write("uploads/sub/b.txt", b"b").unwrap();
        store.make_directory("uploads/sub/empty").unwrap();
        store.write("uploads/a.txt", b"a").unwrap();
        store.delete_directory("uploads/sub").unwrap();
        assert!(!store.exists("uploads/sub"));
        assert_eq!(store.all_files("uploads").unwrap(), ["uploads/a.txt"]);
        assert!(store.all_directories("uploads").unwrap().is_empty());
    }

    #[test]
    fn file_and_directory_cannot_share_a_key() {
        let store = MemoryBlobStore::new();
        store.write("uploads/a", b"x").unwrap();
        assert!(matches!(
            store.write("uploads/a/b", b"y"),
            Err(StorageError::Io { .. })
        ));
        assert!(store.make_directory("uploads/a").is_err());
        assert!(store.make_directory("uploads/a/sub").is_err());

        store.write("uploads/d/inner", b"z").unwrap();
        assert!(store.write("uploads/d", b"w").is_err());
        store.make_directory("uploads/empty").unwrap();
        assert!(store.write("uploads/empty", b"w").is_err());

        assert_eq!(
            store.all_files("uploads").unwrap(),
            ["uploads/a", "uploads/d/inner"]
        );
        assert_eq!(
            store.all_directories("uploads").unwrap(),
            ["uploads/d", "uploads/empty"]
        );
    }

    #[test]
    fn overwriting_a_file_is_allowed() {
        let store = MemoryBlobStore::new();
        store.write("uploads/a", b"1").unwrap();
        store.write("uploads/a", b"2").unwrap();
        assert_eq!(store.read("uploads/a").unwrap(), b"2");
    }

    #[test]
    fn clones_share_contents() {
        let store = MemoryBlobStore::new();
        let clone = store.clone();
        store.write("k", b"v").unwrap();
        assert_eq!(clone.read("k").unwrap(), b"v");
    }
}
