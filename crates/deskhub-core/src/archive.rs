//! # Archive Handling
//!
//! ZIP signature sniffing and bounded extraction into a [`BlobStore`].
//!
//! Extraction reads the archive back from storage, then writes each entry
//! below a destination key. Entries whose names are absolute or contain
//! `..` are skipped. Total decompressed output is capped; an archive that
//! inflates beyond the cap fails as a whole.

use std::io::{Cursor, Read};
use std::path::{Component, Path};

use crate::blob::BlobStore;
use crate::error::{ProjectError, StorageError};
use crate::path::{self, ProjectPath};

/// Default cap on the total decompressed size of one archive (1 GiB).
pub const MAX_DECOMPRESSED_BYTES: u64 = 1 << 30;

/// Message reported when the archive cannot be opened.
pub const OPEN_FAILED: &str = "Failed to open ZIP file";

/// Message reported when an entry cannot be extracted.
pub const EXTRACT_FAILED: &str = "Failed to extract ZIP file";

const LOCAL_FILE_HEADER: &[u8; 4] = b"PK\x03\x04";
const END_OF_CENTRAL_DIRECTORY: &[u8; 4] = b"PK\x05\x06";
const SPANNED_MARKER: &[u8; 4] = b"PK\x07\x08";

/// Whether `bytes` starts with a ZIP signature.
///
/// An archive with no entries consists of the end-of-central-directory
/// record alone, so that signature is accepted as well.
pub fn looks_like_zip(bytes: &[u8]) -> bool {
    [LOCAL_FILE_HEADER, END_OF_CENTRAL_DIRECTORY, SPANNED_MARKER]
        .iter()
        .any(|signature| bytes.starts_with(*signature))
}

/// What an extraction wrote.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExtractStats {
    /// File entries written.
    pub files: usize,
    /// Directory entries created.
    pub directories: usize,
    /// Entries skipped because their names escape the destination.
    pub skipped: usize,
}

/// Turn an enclosed entry name into a `/`-separated relative path.
fn entry_path(name: &Path) -> Option<ProjectPath> {
    let mut parts = Vec::new();
    for component in name.components() {
        match component {
            Component::Normal(segment) => parts.push(segment.to_str()?.to_string()),
            Component::CurDir => {}
            _ => return None,
        }
    }
    ProjectPath::parse(&parts.join("/")).ok()
}

fn store_failed(key: &str, err: StorageError) -> ProjectError {
    tracing::warn!(key, error = %err, "cannot store archive entry");
    ProjectError::Extraction(EXTRACT_FAILED.into())
}

/// Extract the archive stored at `archive_key` into `dest_root`.
///
/// Fails with [`ProjectError::Extraction`] if the archive cannot be opened,
/// an entry cannot be read or stored, or the decompressed total exceeds
/// `limit`. Entries written before the failure are left in place.
pub fn extract(
    store: &dyn BlobStore,
    archive_key: &str,
    dest_root: &str,
    limit: u64,
) -> Result<ExtractStats, ProjectError> {
    let bytes = store.read(archive_key)?;
    let mut archive = zip::ZipArchive::new(Cursor::new(bytes)).map_err(|e| {
        tracing::warn!(archive = archive_key, error = %e, "cannot open archive");
        ProjectError::Extraction(OPEN_FAILED.into())
    })?;

    let mut stats = ExtractStats::default();
    let mut budget = limit;
    for index in 0..archive.len() {
        let mut entry = archive.by_index(index).map_err(|e| {
            tracing::warn!(archive = archive_key, index, error = %e, "cannot read entry");
            ProjectError::Extraction(EXTRACT_FAILED.into())
        })?;

        let Some(relative) = entry.enclosed_name().as_deref().and_then(entry_path) else {
            tracing::warn!(entry = entry.name(), "skipping archive entry outside destination");
            stats.skipped += 1;
            continue;
        };
        if relative.is_root() {
            continue;
        }
        let key = path::join(dest_root, relative.as_str());

        if entry.is_dir() {
            store.make_directory(&key).map_err(|e| store_failed(&key, e))?;
            stats.directories += 1;
            continue;
        }

        let mut contents = Vec::new();
        (&mut entry)
            .take(budget + 1)
            .read_to_end(&mut contents)
            .map_err(|e| {
                tracing::warn!(entry = relative.as_str(), error = %e, "cannot inflate entry");
                ProjectError::Extraction(EXTRACT_FAILED.into())
            })?;
        let written = contents.len() as u64;
        if written > budget {
            tracing::warn!(limit, "archive exceeds decompressed size limit");
            return Err(ProjectError::Extraction(format!(
                "archive expands beyond {limit} bytes"
            )));
        }
        budget -= written;
        store.write(&key, &contents).map_err(|e| store_failed(&key, e))?;
        stats.files += 1;
    }

    Ok(stats)
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::blob::MemoryBlobStore;
    use std::io::Write;
    use zip::write::SimpleFileOptions;

    /// Build an archive from `(name, contents)` pairs; a name ending in `/`
    /// becomes a directory entry.
    pub(crate) fn zip_of(entries: &[(&str, &[u8])]) -> Vec<u8> {
        let mut writer = zip::ZipWriter::new(Cursor::new(Vec::new()));
        let options = SimpleFileOptions::default();
        for (name, contents) in entries {
            if let Some(dir) = name.strip_suffix('/') {
                writer.add_directory(dir, options).unwrap();
            } else {
                writer.start_file(*name, options).unwrap();
                writer.write_all(contents).unwrap();
            }
        }
        writer.finish().unwrap().into_inner()
    }

    fn stored(entries: &[(&str, &[u8])]) -> MemoryBlobStore {
        let store = MemoryBlobStore::new();
        store.write("uploads/upload.zip", &zip_of(entries)).unwrap();
        store
    }

    #[test]
    fn detects_zip_signatures() {
        assert!(looks_like_zip(&zip_of(&[("a.txt", b"hi")])));
        assert!(looks_like_zip(&zip_of(&[])));
        assert!(!looks_like_zip(b"not a zip"));
        assert!(!looks_like_zip(b"PK"));
        assert!(!looks_like_zip(&[]));
    }

    #[test]
    fn extracts_files_and_directories() {
        let store = stored(&[("a.txt", b"hi"), ("sub/", b""), ("sub/b.txt", b"bee")]);
        let stats = extract(&store, "uploads/upload.zip", "uploads", MAX_DECOMPRESSED_BYTES)
            .unwrap();
        assert_eq!(stats.files, 2);
        assert_eq!(stats.directories, 1);
        assert_eq!(store.read("uploads/a.txt").unwrap(), b"hi");
        assert_eq!(store.read("uploads/sub/b.txt").unwrap(), b"bee");
    }

    #[test]
    fn skips_entries_escaping_destination() {
        let store = stored(&[("../evil.txt", b"x"), ("/abs.txt", b"y"), ("ok.txt", b"z")]);
        let stats = extract(&store, "uploads/upload.zip", "uploads", MAX_DECOMPRESSED_BYTES)
            .unwrap();
        assert_eq!(stats.files, 1);
        assert!(stats.skipped >= 1);
        assert!(!store.exists("evil.txt"));
        assert!(store.exists("uploads/ok.txt"));
    }

    #[test]
    fn rejects_output_beyond_limit() {
        let store = stored(&[("big.bin", &[0u8; 4096])]);
        let err = extract(&store, "uploads/upload.zip", "uploads", 1024).unwrap_err();
        assert!(matches!(err, ProjectError::Extraction(_)));
        assert!(!store.exists("uploads/big.bin"));
    }

    #[test]
    fn storage_conflict_is_an_extraction_failure() {
        let cases: [&[(&str, &[u8])]; 2] = [
            &[("a", b"x"), ("a/b", b"y")],
            &[("a", b"x"), ("a/", b"")],
        ];
        for entries in cases {
            let store = stored(entries);
            let err = extract(&store, "uploads/upload.zip", "uploads", MAX_DECOMPRESSED_BYTES)
                .unwrap_err();
            assert!(matches!(err, ProjectError::Extraction(ref m) if m == EXTRACT_FAILED));
        }
    }

    #[test]
    fn corrupt_archive_fails_to_open() {
        let store = MemoryBlobStore::new();
        store.write("uploads/upload.zip", b"PK\x03\x04garbage").unwrap();
        let err = extract(&store, "uploads/upload.zip", "uploads", MAX_DECOMPRESSED_BYTES)
            .unwrap_err();
        assert!(matches!(err, ProjectError::Extraction(ref m) if m == OPEN_FAILED));
    }
}
