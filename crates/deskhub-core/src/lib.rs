//! # deskhub-core — Project File Store
//!
//! The file-manager core of DeskHub. A deployment manages exactly one
//! "project": a tree of files under a fixed storage root. The tree is
//! replaced wholesale by uploading a ZIP archive, browsed as a nested
//! [`Entry`] forest, and edited file by file.
//!
//! ## Layers
//!
//! - [`blob`] — the [`BlobStore`] trait (key-addressable storage with
//!   directory semantics) and two backends: [`LocalBlobStore`] on disk and
//!   [`MemoryBlobStore`] in memory.
//! - [`path`] — [`ProjectPath`] normalization for caller input and
//!   [`path::relative_to_root`] for keys reported back by storage.
//! - [`archive`] — ZIP signature detection and bounded extraction into a
//!   blob store.
//! - [`project`] — [`ProjectFileStore`], the operations the HTTP layer calls.
//!
//! ## Crate Policy
//!
//! - No HTTP types. The API crate maps [`ProjectError`] to status codes.
//! - Storage is synchronous; async callers run operations on a blocking pool.
//! - No `.unwrap()` outside tests.

pub mod archive;
pub mod blob;
pub mod entry;
pub mod error;
pub mod path;
pub mod project;

pub use blob::{BlobStore, LocalBlobStore, MemoryBlobStore};
pub use entry::{Entry, EntryKind};
pub use error::{ProjectError, StorageError};
pub use path::ProjectPath;
pub use project::{ProjectFileStore, ReplaceSummary, DEFAULT_PROJECT_ROOT, MAX_ARCHIVE_BYTES};
