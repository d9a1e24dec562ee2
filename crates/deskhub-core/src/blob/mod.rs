//! # Blob Storage
//!
//! Key-addressable storage with directory semantics. Keys are `/`-separated
//! strings; a directory exists either explicitly (created with
//! [`BlobStore::make_directory`]) or implicitly as the prefix of a file key.
//!
//! Listing methods return storage keys. Backends may report them with the
//! listed prefix included or relative to the store; callers run them through
//! [`crate::path::relative_to_root`] before exposing them.

mod local;
mod memory;

pub use local::LocalBlobStore;
pub use memory::MemoryBlobStore;

use crate::error::StorageError;

/// Storage primitives the project file store is built on.
pub trait BlobStore: Send + Sync {
    /// Whether a file or directory exists at `key`.
    fn exists(&self, key: &str) -> bool;

    /// Whether `key` names a directory.
    fn is_directory(&self, key: &str) -> bool;

    /// Files directly inside `dir`. Empty if `dir` does not exist.
    fn files(&self, dir: &str) -> Result<Vec<String>, StorageError>;

    /// Directories directly inside `dir`. Empty if `dir` does not exist.
    fn directories(&self, dir: &str) -> Result<Vec<String>, StorageError>;

    /// Every file below `dir`, at any depth.
    fn all_files(&self, dir: &str) -> Result<Vec<String>, StorageError>;

    /// Every directory below `dir`, at any depth (excluding `dir`).
    fn all_directories(&self, dir: &str) -> Result<Vec<String>, StorageError>;

    /// Read a file's full contents.
    fn read(&self, key: &str) -> Result<Vec<u8>, StorageError>;

    /// Create or replace a file, creating parent directories as needed.
    fn write(&self, key: &str, contents: &[u8]) -> Result<(), StorageError>;

    /// Size of a file in bytes.
    fn size(&self, key: &str) -> Result<u64, StorageError>;

    /// Delete a single file.
    fn delete(&self, key: &str) -> Result<(), StorageError>;

    /// Delete a directory and everything below it.
    fn delete_directory(&self, key: &str) -> Result<(), StorageError>;

    /// Create a directory and any missing parents.
    fn make_directory(&self, key: &str) -> Result<(), StorageError>;
}
