//! Filesystem-backed blob store.
//!
//! Keys map to paths below a base directory. Listings report keys relative
//! to the base directory, i.e. including the listed prefix
//! (`uploads/sub/b.txt` when listing `uploads/sub`).

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use uuid::Uuid;

use super::BlobStore;
use crate::error::StorageError;
use crate::path;

/// Blob store rooted at a directory on the local filesystem.
#[derive(Debug, Clone)]
pub struct LocalBlobStore {
    base: PathBuf,
}

impl LocalBlobStore {
    /// Create a store rooted at `base`, creating the directory if missing.
    pub fn new(base: impl Into<PathBuf>) -> Result<Self, StorageError> {
        let base = base.into();
        fs::create_dir_all(&base).map_err(|e| StorageError::io(base.display().to_string(), e))?;
        Ok(Self { base })
    }

    /// The base directory on disk.
    pub fn base(&self) -> &Path {
        &self.base
    }

    fn resolve(&self, key: &str) -> PathBuf {
        let mut full = self.base.clone();
        for segment in path::normalize(key).split('/').filter(|s| !s.is_empty()) {
            full.push(segment);
        }
        full
    }

    /// List immediate children of `dir`, keeping those whose type matches.
    fn list(&self, dir: &str, want_dirs: bool) -> Result<Vec<String>, StorageError> {
        let full = self.resolve(dir);
        if !full.is_dir() {
            return Ok(Vec::new());
        }
        let dir_key = path::normalize(dir);
        let mut keys = Vec::new();
        for item in fs::read_dir(&full).map_err(|e| StorageError::io(&dir_key, e))? {
            let item = item.map_err(|e| StorageError::io(&dir_key, e))?;
            let file_type = item.file_type().map_err(|e| StorageError::io(&dir_key, e))?;
            if file_type.is_dir() == want_dirs {
                let name = item.file_name().to_string_lossy().into_owned();
                keys.push(path::join(&dir_key, &name));
            }
        }
        keys.sort();
        Ok(keys)
    }

    /// Walk below `dir`, collecting files or directories at any depth.
    fn walk(&self, dir: &str, want_dirs: bool) -> Result<Vec<String>, StorageError> {
        let mut out = Vec::new();
        let mut pending = vec![path::normalize(dir)];
        while let Some(current) = pending.pop() {
            let subdirs = self.list(&current, true)?;
            if want_dirs {
                out.extend(subdirs.iter().cloned());
            } else {
                out.extend(self.list(&current, false)?);
            }
            pending.extend(subdirs);
        }
        out.sort();
        Ok(out)
    }
}

impl BlobStore for LocalBlobStore {
    fn exists(&self, key: &str) -> bool {
        self.resolve(key).exists()
    }

    fn is_directory(&self, key: &str) -> bool {
        self.resolve(key).is_dir()
    }

    fn files(&self, dir: &str) -> Result<Vec<String>, StorageError> {
        self.list(dir, false)
    }

    fn directories(&self, dir: &str) -> Result<Vec<String>, StorageError> {
        self.list(dir, true)
    }

    fn all_files(&self, dir: &str) -> Result<Vec<String>, StorageError> {
        self.walk(dir, false)
    }

    fn all_directories(&self, dir: &str) -> Result<Vec<String>, StorageError> {
        self.walk(dir, true)
    }

    fn read(&self, key: &str) -> Result<Vec<u8>, StorageError> {
        let full = self.resolve(key);
        if !full.is_file() {
            return Err(StorageError::NotFound(key.to_string()));
        }
        fs::read(&full).map_err(|e| StorageError::io(key, e))
    }

    /// Writes go to a sibling temp file that is renamed over the target, so
    /// readers never observe a partially written file.
    fn write(&self, key: &str, contents: &[u8]) -> Result<(), StorageError> {
        let full = self.resolve(key);
        let parent = full.parent().unwrap_or(&self.base).to_path_buf();
        fs::create_dir_all(&parent).map_err(|e| StorageError::io(key, e))?;

        let temp_path = parent.join(format!(".deskhub.{}.tmp", Uuid::new_v4().simple()));
        let result = fs::File::create(&temp_path)
            .and_then(|mut file| {
                file.write_all(contents)?;
                file.sync_all()
            })
            .and_then(|()| fs::rename(&temp_path, &full));
        if let Err(e) = result {
            let _ = fs::remove_file(&temp_path);
            return Err(StorageError::io(key, e));
        }
        Ok(())
    }

    fn size(&self, key: &str) -> Result<u64, StorageError> {
        let full = self.resolve(key);
        if !full.is_file() {
            return Err(StorageError::NotFound(key.to_string()));
        }
        fs::metadata(&full)
            .map(|meta| meta.len())
            .map_err(|e| StorageError::io(key, e))
    }

    fn delete(&self, key: &str) -> Result<(), StorageError> {
        let full = self.resolve(key);
        if !full.is_file() {
            return Err(StorageError::NotFound(key.to_string()));
        }
        fs::remove_file(&full).map_err(|e| StorageError::io(key, e))
    }

    fn delete_directory(&self, key: &str) -> Result<(), StorageError> {
        let full = self.resolve(key);
        if !full.is_dir() {
            return Err(StorageError::NotFound(key.to_string()));
        }
        fs::remove_dir_all(&full).map_err(|e| StorageError::io(key, e))
    }

    fn make_directory(&self, key: &str) -> Result<(), StorageError> {
        fs::create_dir_all(self.resolve(key)).map_err(|e| StorageError::io(key, e))
    }
}
