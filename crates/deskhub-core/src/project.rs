//! # Project File Store
//!
//! One project tree lives under a fixed root key in a [`BlobStore`]. The
//! tree is replaced wholesale from a ZIP archive and otherwise edited one
//! file at a time.
//!
//! All paths accepted and returned here are root-relative. Keys reported by
//! storage go through [`path::relative_to_root`], so the root itself never
//! appears in a listing.

use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;
use serde::Serialize;
use uuid::Uuid;

use crate::archive::{self, MAX_DECOMPRESSED_BYTES};
use crate::blob::BlobStore;
use crate::entry::{self, Entry};
use crate::error::{ProjectError, StorageError};
use crate::path::{self, ProjectPath};

/// Storage key of the project root unless configured otherwise.
pub const DEFAULT_PROJECT_ROOT: &str = "uploads";

/// Largest accepted upload (100 MiB).
pub const MAX_ARCHIVE_BYTES: usize = 100 * 1024 * 1024;

/// Suffix marker of the archive key while it is being extracted.
const ARCHIVE_MARKER: &str = ".deskhub-upload-";

/// Outcome of [`ProjectFileStore::replace_project`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ReplaceSummary {
    /// Files under the root after extraction.
    pub files: usize,
    /// Directories under the root after extraction.
    pub directories: usize,
}

/// The project tree and the operations on it.
///
/// Cloning is cheap; clones share the backend and the upload lock.
#[derive(Clone)]
pub struct ProjectFileStore {
    blob: Arc<dyn BlobStore>,
    root: String,
    upload_lock: Arc<Mutex<()>>,
    max_archive_bytes: usize,
    max_decompressed_bytes: u64,
}

impl fmt::Debug for ProjectFileStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProjectFileStore")
            .field("root", &self.root)
            .field("max_archive_bytes", &self.max_archive_bytes)
            .field("max_decompressed_bytes", &self.max_decompressed_bytes)
            .finish_non_exhaustive()
    }
}

impl ProjectFileStore {
    /// Create a store for the project rooted at `root` within `blob`.
    ///
    /// An empty root falls back to [`DEFAULT_PROJECT_ROOT`]; the project
    /// never owns the whole backend.
    pub fn new(blob: Arc<dyn BlobStore>, root: impl Into<String>) -> Self {
        let mut root = path::normalize(&root.into());
        if root.is_empty() {
            tracing::warn!(fallback = DEFAULT_PROJECT_ROOT, "empty project root configured");
            root = DEFAULT_PROJECT_ROOT.to_string();
        }
        Self {
            blob,
            root,
            upload_lock: Arc::new(Mutex::new(())),
            max_archive_bytes: MAX_ARCHIVE_BYTES,
            max_decompressed_bytes: MAX_DECOMPRESSED_BYTES,
        }
    }

    /// Override the upload and decompression limits.
    pub fn with_limits(mut self, max_archive_bytes: usize, max_decompressed_bytes: u64) -> Self {
        self.max_archive_bytes = max_archive_bytes;
        self.max_decompressed_bytes = max_decompressed_bytes;
        self
    }

    /// Storage key of the project root.
    pub fn root(&self) -> &str {
        &self.root
    }

    pub fn max_archive_bytes(&self) -> usize {
        self.max_archive_bytes
    }

    // -- Listing --------------------------------------------------------------

    /// List the entries below `dir`.
    ///
    /// Flat listings hold the immediate children only; recursive listings
    /// nest every descendant under `children`. A missing directory lists as
    /// empty.
    pub fn list_tree(
        &self,
        dir: &ProjectPath,
        recursive: bool,
    ) -> Result<Vec<Entry>, ProjectError> {
        let key = dir.storage_key(&self.root);
        if !self.blob.is_directory(&key) {
            return Ok(Vec::new());
        }
        if recursive {
            self.walk(dir.as_str())
        } else {
            self.children(dir.as_str())
        }
    }

    fn walk(&self, relative: &str) -> Result<Vec<Entry>, ProjectError> {
        let mut entries = self.children(relative)?;
        for dir in entries.iter_mut().filter(|e| e.is_directory()) {
            let nested = self.walk(&dir.path)?;
            dir.children = Some(nested);
        }
        Ok(entries)
    }

    /// Immediate children of a root-relative directory, sorted.
    fn children(&self, relative: &str) -> Result<Vec<Entry>, ProjectError> {
        let key = path::join(&self.root, relative);
        let mut entries = Vec::new();

        for dir_key in self.blob.directories(&key)? {
            if let Some(rel) = path::relative_to_root(&self.root, &dir_key) {
                entries.push(Entry::directory(rel));
            }
        }
        for file_key in self.blob.files(&key)? {
            let Some(rel) = path::relative_to_root(&self.root, &file_key) else {
                continue;
            };
            let size = self.blob.size(&file_key)?;
            entries.push(Entry::file(rel, size));
        }

        entry::sort_siblings(&mut entries);
        Ok(entries)
    }

    /// Number of files anywhere below the root.
    pub fn count_files(&self) -> Result<usize, ProjectError> {
        Ok(self.blob.all_files(&self.root)?.len())
    }

    // -- Upload ---------------------------------------------------------------

    /// Replace the whole project with the contents of a ZIP archive.
    ///
    /// Size and signature are checked before anything is deleted. The
    /// archive is stored next to the root, never inside it, while it is
    /// extracted and removed afterwards on every path. A failed extraction
    /// leaves the root empty.
    pub fn replace_project(
        &self,
        archive_name: &str,
        bytes: &[u8],
    ) -> Result<ReplaceSummary, ProjectError> {
        if bytes.len() > self.max_archive_bytes {
            return Err(ProjectError::PayloadTooLarge {
                size: bytes.len(),
                limit: self.max_archive_bytes,
            });
        }
        if !archive::looks_like_zip(bytes) {
            return Err(ProjectError::Validation("The file must be a ZIP archive".into()));
        }

        let _guard = self.upload_lock.lock();

        self.clear()?;
        self.blob.make_directory(&self.root)?;

        let archive_key = self.staging_key();
        self.blob.write(&archive_key, bytes)?;
        let extracted = archive::extract(
            self.blob.as_ref(),
            &archive_key,
            &self.root,
            self.max_decompressed_bytes,
        );
        if let Err(e) = self.blob.delete(&archive_key) {
            tracing::warn!(key = archive_key.as_str(), error = %e, "failed to remove uploaded archive");
        }
        let stats = match extracted {
            Ok(stats) => stats,
            Err(e) => {
                if let Err(clear_err) = self.clear() {
                    tracing::warn!(error = %clear_err, "failed to clear partial extraction");
                }
                return Err(e);
            }
        };

        let summary = ReplaceSummary {
            files: self.blob.all_files(&self.root)?.len(),
            directories: self.blob.all_directories(&self.root)?.len(),
        };
        if summary.files == 0 && summary.directories == 0 {
            return Err(ProjectError::EmptyArchive);
        }

        tracing::info!(
            archive = archive_name,
            files = summary.files,
            directories = summary.directories,
            skipped = stats.skipped,
            "project replaced"
        );
        Ok(summary)
    }

    /// Sibling key of the root for the archive being extracted.
    fn staging_key(&self) -> String {
        format!("{}{ARCHIVE_MARKER}{}.zip", self.root, Uuid::new_v4().simple())
    }

    /// Delete every file below the root, then every directory, deepest first.
    fn clear(&self) -> Result<(), ProjectError> {
        let files = self.blob.all_files(&self.root)?;
        for key in &files {
            self.blob.delete(key)?;
        }

        let mut dirs = self.blob.all_directories(&self.root)?;
        dirs.sort_by(|a, b| b.cmp(a));
        for key in &dirs {
            match self.blob.delete_directory(key) {
                Ok(()) | Err(StorageError::NotFound(_)) => {}
                Err(e) => return Err(e.into()),
            }
        }

        tracing::debug!(files = files.len(), directories = dirs.len(), "cleared project root");
        Ok(())
    }

    // -- Single files ---------------------------------------------------------

    /// Read a text file.
    pub fn read_file(&self, file: &ProjectPath) -> Result<String, ProjectError> {
        let key = self.existing_file(file)?;
        let bytes = self.blob.read(&key)?;
        String::from_utf8(bytes).map_err(|_| ProjectError::Binary(file.to_string()))
    }

    /// Replace the contents of an existing file. Never creates files.
    pub fn write_file(&self, file: &ProjectPath, content: &str) -> Result<(), ProjectError> {
        let key = self.existing_file(file)?;
        self.blob.write(&key, content.as_bytes())?;
        tracing::info!(path = file.as_str(), bytes = content.len(), "file saved");
        Ok(())
    }

    /// Delete a file, or a directory with everything below it.
    pub fn delete_entry(&self, target: &ProjectPath) -> Result<(), ProjectError> {
        if target.is_root() {
            return Err(ProjectError::Validation(
                "the project root cannot be deleted".into(),
            ));
        }
        let key = target.storage_key(&self.root);
        if self.blob.is_directory(&key) {
            self.blob.delete_directory(&key)?;
        } else if self.blob.exists(&key) {
            self.blob.delete(&key)?;
        } else {
            return Err(ProjectError::NotFound(target.to_string()));
        }
        tracing::info!(path = target.as_str(), "entry deleted");
        Ok(())
    }

    /// Storage key of an existing regular file.
    fn existing_file(&self, file: &ProjectPath) -> Result<String, ProjectError> {
        let key = file.storage_key(&self.root);
        if file.is_root() || !self.blob.exists(&key) || self.blob.is_directory(&key) {
            return Err(ProjectError::NotFound(file.to_string()));
        }
        Ok(key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::archive::tests::zip_of;
    use crate::blob::{LocalBlobStore, MemoryBlobStore};

    fn memory_store() -> (MemoryBlobStore, ProjectFileStore) {
        let blob = MemoryBlobStore::new();
        let store = ProjectFileStore::new(Arc::new(blob.clone()), DEFAULT_PROJECT_ROOT);
        (blob, store)
    }

    fn p(raw: &str) -> ProjectPath {
        ProjectPath::parse(raw).unwrap()
    }

    fn example_zip() -> Vec<u8> {
        zip_of(&[("a.txt", b"hi"), ("sub/b.txt", b"bee")])
    }

    fn assert_example_tree(tree: &[Entry]) {
        assert_eq!(
            serde_json::to_value(tree).unwrap(),
            serde_json::json!([
                {"name": "sub", "type": "directory", "path": "sub", "children": [
                    {"name": "b.txt", "type": "file", "path": "sub/b.txt", "size": 3}
                ]},
                {"name": "a.txt", "type": "file", "path": "a.txt", "size": 2}
            ])
        );
    }

    #[test]
    fn upload_then_recursive_listing() {
        let (_, store) = memory_store();
        let summary = store.replace_project("project.zip", &example_zip()).unwrap();
        assert_eq!(summary, ReplaceSummary { files: 2, directories: 1 });
        assert_example_tree(&store.list_tree(&ProjectPath::root(), true).unwrap());
    }

    #[test]
    fn upload_then_recursive_listing_on_disk() {
        let dir = tempfile::TempDir::new().unwrap();
        let blob = LocalBlobStore::new(dir.path()).unwrap();
        let store = ProjectFileStore::new(Arc::new(blob), DEFAULT_PROJECT_ROOT);
        store.replace_project("project.zip", &example_zip()).unwrap();
        assert_example_tree(&store.list_tree(&ProjectPath::root(), true).unwrap());
        assert!(dir.path().join("uploads/sub/b.txt").is_file());
    }

    #[test]
    fn flat_listing_has_no_nested_paths() {
        let (_, store) = memory_store();
        store
            .replace_project("p.zip", &zip_of(&[("a", b"1"), ("x/y/z", b"2"), ("w/", b"")]))
            .unwrap();
        let flat = store.list_tree(&ProjectPath::root(), false).unwrap();
        assert!(flat.iter().all(|e| !e.path.contains('/')));
        assert!(flat.iter().all(|e| e.children.is_none()));
        let names: Vec<_> = flat.iter().map(|e| e.name.as_str()).collect();
        assert_eq!(names, ["w", "x", "a"]);
    }

    #[test]
    fn listing_a_subdirectory_keeps_root_relative_paths() {
        let (_, store) = memory_store();
        store
            .replace_project("p.zip", &zip_of(&[("src/bin/main.rs", b"fn main() {}")]))
            .unwrap();
        let flat = store.list_tree(&p("src"), false).unwrap();
        assert_eq!(flat.len(), 1);
        assert_eq!(flat[0].path, "src/bin");

        let nested = store.list_tree(&p("src"), true).unwrap();
        let children = nested[0].children.as_ref().unwrap();
        assert_eq!(children[0].path, "src/bin/main.rs");
    }

    #[test]
    fn missing_root_lists_empty() {
        let (_, store) = memory_store();
        assert!(store.list_tree(&ProjectPath::root(), true).unwrap().is_empty());
        assert!(store.list_tree(&p("nope"), false).unwrap().is_empty());
        assert_eq!(store.count_files().unwrap(), 0);
    }

    #[test]
    fn recursive_listing_counts_match_archive() {
        let (_, store) = memory_store();
        let archive = zip_of(&[
            ("docs/", b""),
            ("docs/guide/", b""),
            ("docs/guide/intro.md", b"# intro"),
            ("src/lib.rs", b""),
            ("src/util/mod.rs", b"//"),
            ("empty/", b""),
            ("README", b"read me"),
        ]);
        let summary = store.replace_project("p.zip", &archive).unwrap();
        let tree = store.list_tree(&ProjectPath::root(), true).unwrap();
        assert_eq!(entry::count(&tree), (4, 5));
        assert_eq!(summary, ReplaceSummary { files: 4, directories: 5 });
        for path in entry::all_paths(&tree) {
            assert!(!path.starts_with("uploads"));
        }
    }

    #[test]
    fn second_upload_replaces_first() {
        let (blob, store) = memory_store();
        store.replace_project("one.zip", &example_zip()).unwrap();
        store
            .replace_project("two.zip", &zip_of(&[("new/c.txt", b"c")]))
            .unwrap();
        let tree = store.list_tree(&ProjectPath::root(), true).unwrap();
        assert_eq!(entry::all_paths(&tree), ["new", "new/c.txt"]);
        assert_eq!(blob.all_files("uploads").unwrap(), ["uploads/new/c.txt"]);
    }

    #[test]
    fn rejected_uploads_leave_project_untouched() {
        let (_, store) = memory_store();
        store.replace_project("one.zip", &example_zip()).unwrap();

        let err = store.replace_project("x.txt", b"plain text").unwrap_err();
        assert!(matches!(err, ProjectError::Validation(_)));

        let small = store.clone().with_limits(16, MAX_DECOMPRESSED_BYTES);
        let err = small.replace_project("big.zip", &example_zip()).unwrap_err();
        assert!(matches!(err, ProjectError::PayloadTooLarge { limit: 16, .. }));

        assert_eq!(store.count_files().unwrap(), 2);
    }

    #[test]
    fn failed_extraction_leaves_no_archive() {
        let (blob, store) = memory_store();
        let err = store
            .replace_project("bad.zip", b"PK\x03\x04 definitely not deflate")
            .unwrap_err();
        assert!(matches!(err, ProjectError::Extraction(_)));
        assert!(blob.all_files("").unwrap().is_empty());
    }

    fn colliding_archive() -> Vec<u8> {
        zip_of(&[("keep.txt", b"k"), ("a", b"x"), ("a/b", b"y")])
    }

    #[test]
    fn file_and_folder_with_one_name_fail_extraction() {
        let (blob, store) = memory_store();
        store.replace_project("one.zip", &example_zip()).unwrap();

        let err = store.replace_project("clash.zip", &colliding_archive()).unwrap_err();
        assert!(matches!(err, ProjectError::Extraction(ref m) if m == archive::EXTRACT_FAILED));
        assert!(blob.all_files("").unwrap().is_empty());
        assert!(store.list_tree(&ProjectPath::root(), true).unwrap().is_empty());
    }

    #[test]
    fn file_and_folder_with_one_name_fail_extraction_on_disk() {
        let dir = tempfile::TempDir::new().unwrap();
        let blob = LocalBlobStore::new(dir.path()).unwrap();
        let store = ProjectFileStore::new(Arc::new(blob.clone()), DEFAULT_PROJECT_ROOT);

        let err = store.replace_project("clash.zip", &colliding_archive()).unwrap_err();
        assert!(matches!(err, ProjectError::Extraction(ref m) if m == archive::EXTRACT_FAILED));
        assert!(blob.all_files("").unwrap().is_empty());
        assert!(!dir.path().join("uploads/a").exists());
        assert_eq!(store.count_files().unwrap(), 0);
    }

    #[test]
    fn upload_archive_is_kept_outside_the_root() {
        let (blob, store) = memory_store();
        let archive = zip_of(&[(".deskhub-upload-notes.txt", b"mine"), ("a.txt", b"hi")]);
        store.replace_project("p.zip", &archive).unwrap();

        let flat = store.list_tree(&ProjectPath::root(), false).unwrap();
        let names: Vec<_> = flat.iter().map(|e| e.name.as_str()).collect();
        assert_eq!(names, [".deskhub-upload-notes.txt", "a.txt"]);
        assert_eq!(store.count_files().unwrap(), flat.len());
        assert_eq!(blob.all_files("").unwrap().len(), 2);
        assert!(!store.staging_key().starts_with("uploads/"));
    }

    #[test]
    fn empty_root_falls_back_to_default() {
        let store = ProjectFileStore::new(Arc::new(MemoryBlobStore::new()), "/");
        assert_eq!(store.root(), DEFAULT_PROJECT_ROOT);
    }

    #[test]
    fn empty_archive_is_reported() {
        let (blob, store) = memory_store();
        let err = store.replace_project("empty.zip", &zip_of(&[])).unwrap_err();
        assert!(matches!(err, ProjectError::EmptyArchive));
        assert!(blob.all_files("").unwrap().is_empty());
    }

    #[test]
    fn concurrent_uploads_do_not_interleave() {
        let (_, store) = memory_store();
        let first = zip_of(&[("one/a", b"1"), ("one/b", b"2")]);
        let second = zip_of(&[("two/c", b"3")]);
        std::thread::scope(|scope| {
            for archive in [&first, &second, &first, &second] {
                let store = store.clone();
                scope.spawn(move || store.replace_project("p.zip", archive).unwrap());
            }
        });
        let paths = entry::all_paths(&store.list_tree(&ProjectPath::root(), true).unwrap());
        assert!(
            paths == ["one", "one/a", "one/b"] || paths == ["two", "two/c"],
            "mixed tree: {paths:?}"
        );
    }

    #[test]
    fn read_write_round_trip() {
        let (_, store) = memory_store();
        store.replace_project("p.zip", &example_zip()).unwrap();
        assert_eq!(store.read_file(&p("a.txt")).unwrap(), "hi");
        store.write_file(&p("sub/b.txt"), "changed ✓").unwrap();
        assert_eq!(store.read_file(&p("sub/b.txt")).unwrap(), "changed ✓");
    }

    #[test]
    fn binary_file_is_not_displayed() {
        let (_, store) = memory_store();
        store
            .replace_project("p.zip", &zip_of(&[("img.png", &[0x89, 0x50, 0xff, 0xfe])]))
            .unwrap();
        let err = store.read_file(&p("img.png")).unwrap_err();
        assert!(matches!(err, ProjectError::Binary(_)));
    }

    #[test]
    fn read_and_write_require_existing_file() {
        let (_, store) = memory_store();
        store.replace_project("p.zip", &example_zip()).unwrap();
        assert!(matches!(store.read_file(&p("nope")), Err(ProjectError::NotFound(_))));
        assert!(matches!(store.read_file(&p("sub")), Err(ProjectError::NotFound(_))));
        assert!(matches!(
            store.write_file(&p("new.txt"), "x"),
            Err(ProjectError::NotFound(_))
        ));
        assert!(matches!(
            store.read_file(&ProjectPath::root()),
            Err(ProjectError::NotFound(_))
        ));
    }

    #[test]
    fn delete_directory_removes_descendants() {
        let (_, store) = memory_store();
        store.replace_project("p.zip", &example_zip()).unwrap();
        store.delete_entry(&p("sub")).unwrap();
        let paths = entry::all_paths(&store.list_tree(&ProjectPath::root(), true).unwrap());
        assert_eq!(paths, ["a.txt"]);

        store.delete_entry(&p("a.txt")).unwrap();
        assert_eq!(store.count_files().unwrap(), 0);
    }

    #[test]
    fn delete_rejects_missing_and_root() {
        let (_, store) = memory_store();
        store.replace_project("p.zip", &example_zip()).unwrap();
        assert!(matches!(store.delete_entry(&p("ghost")), Err(ProjectError::NotFound(_))));
        assert!(matches!(
            store.delete_entry(&ProjectPath::root()),
            Err(ProjectError::Validation(_))
        ));
    }
}
