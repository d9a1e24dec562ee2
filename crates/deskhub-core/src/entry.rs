//! # Entry Tree Model
//!
//! An [`Entry`] is one node of a project listing. Files carry a byte size;
//! directories carry their children when the listing is recursive.
//!
//! Serialized shape:
//!
//! ```json
//! {"name": "sub", "type": "directory", "path": "sub", "children": [
//!   {"name": "b.txt", "type": "file", "path": "sub/b.txt", "size": 5}
//! ]}
//! ```

use serde::{Deserialize, Serialize};

use crate::path;

/// Kind of a listing entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryKind {
    File,
    Directory,
}

/// A file or directory in a project listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Entry {
    /// Final path segment.
    pub name: String,
    #[serde(rename = "type")]
    pub kind: EntryKind,
    /// Root-relative, `/`-separated path with no leading slash.
    pub path: String,
    /// Size in bytes (files only).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<u64>,
    /// Children, directories first (directories in recursive listings only).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub children: Option<Vec<Entry>>,
}

impl Entry {
    /// A file entry at the given root-relative path.
    pub fn file(path: impl Into<String>, size: u64) -> Self {
        let path = path.into();
        Self {
            name: path::file_name(&path).to_string(),
            kind: EntryKind::File,
            path,
            size: Some(size),
            children: None,
        }
    }

    /// A directory entry without populated children.
    pub fn directory(path: impl Into<String>) -> Self {
        let path = path.into();
        Self {
            name: path::file_name(&path).to_string(),
            kind: EntryKind::Directory,
            path,
            size: None,
            children: None,
        }
    }

    /// Attach children to a directory entry.
    pub fn with_children(mut self, children: Vec<Entry>) -> Self {
        self.children = Some(children);
        self
    }

    pub fn is_directory(&self) -> bool {
        self.kind == EntryKind::Directory
    }

    pub fn is_file(&self) -> bool {
        self.kind == EntryKind::File
    }
}

/// Sort a sibling list: directories before files, each group by name.
pub fn sort_siblings(entries: &mut [Entry]) {
    entries.sort_by(|a, b| {
        b.is_directory()
            .cmp(&a.is_directory())
            .then_with(|| a.name.cmp(&b.name))
    });
}

/// Count `(files, directories)` in a forest, descending into children.
pub fn count(entries: &[Entry]) -> (usize, usize) {
    entries.iter().fold((0, 0), |(files, dirs), entry| {
        let (child_files, child_dirs) = entry.children.as_deref().map_or((0, 0), count);
        if entry.is_directory() {
            (files + child_files, dirs + 1 + child_dirs)
        } else {
            (files + 1 + child_files, dirs + child_dirs)
        }
    })
}

/// Flatten a forest into every entry path, depth-first.
pub fn all_paths(entries: &[Entry]) -> Vec<String> {
    let mut out = Vec::new();
    for entry in entries {
        out.push(entry.path.clone());
        if let Some(children) = &entry.children {
            out.extend(all_paths(children));
        }
    }
    out
}
