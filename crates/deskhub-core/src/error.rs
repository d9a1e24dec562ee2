//! # Error Types
//!
//! [`StorageError`] is raised by blob storage backends. [`ProjectError`] is
//! the error surface of [`crate::ProjectFileStore`]; each variant corresponds
//! to one failure kind the HTTP layer reports to callers.

use thiserror::Error;

/// Failure inside a blob storage backend.
#[derive(Error, Debug)]
pub enum StorageError {
    /// The key does not name an existing file.
    #[error("no such key: {0}")]
    NotFound(String),

    /// Underlying filesystem I/O failed.
    #[error("storage io error at {key}: {source}")]
    Io {
        /// Storage key the operation targeted.
        key: String,
        /// The originating I/O error.
        source: std::io::Error,
    },
}

impl StorageError {
    pub(crate) fn io(key: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            key: key.into(),
            source,
        }
    }
}

/// Error returned by project file store operations.
#[derive(Error, Debug)]
pub enum ProjectError {
    /// No file or directory exists at the requested path.
    #[error("not found: {0}")]
    NotFound(String),

    /// The path or archive was rejected before touching storage.
    #[error("validation error: {0}")]
    Validation(String),

    /// The file exists but is not valid UTF-8 text.
    #[error("cannot display binary content: {0}")]
    Binary(String),

    /// The archive could not be opened or produced no output.
    #[error("failed to extract archive: {0}")]
    Extraction(String),

    /// The archive was extracted but the project root is empty.
    #[error("archive extracted but no files were found")]
    EmptyArchive,

    /// The uploaded archive exceeds the accepted size.
    #[error("archive of {size} bytes exceeds the {limit} byte limit")]
    PayloadTooLarge {
        /// Size of the rejected payload in bytes.
        size: usize,
        /// Maximum accepted size in bytes.
        limit: usize,
    },

    /// The storage backend failed.
    #[error(transparent)]
    Storage(#[from] StorageError),
}
