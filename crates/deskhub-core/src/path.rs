//! # Project Paths
//!
//! Two directions of path handling meet here:
//!
//! - **Inbound**: caller-supplied paths are parsed into a [`ProjectPath`],
//!   a normalized, root-relative, `/`-separated path that cannot escape the
//!   project root.
//! - **Outbound**: keys reported by a [`crate::BlobStore`] listing are turned
//!   back into root-relative paths by [`relative_to_root`]. Backends differ in
//!   whether they report keys with the root prefix (`uploads/sub/b.txt`) or
//!   already relative (`sub/b.txt`), and in separator style. Both forms
//!   produce the same result, and the root itself is never reported.

use std::fmt;

use crate::error::ProjectError;

/// Split a raw path on either separator, dropping empty and `.` segments.
fn segments(raw: &str) -> impl Iterator<Item = &str> {
    raw.split(['/', '\\'])
        .filter(|segment| !segment.is_empty() && *segment != ".")
}

/// Normalize separators and drop empty / `.` segments.
///
/// Does not resolve `..`; use [`ProjectPath::parse`] for untrusted input.
pub fn normalize(raw: &str) -> String {
    segments(raw).collect::<Vec<_>>().join("/")
}

/// Join a storage root and a root-relative path into a storage key.
pub fn join(root: &str, relative: &str) -> String {
    let root = normalize(root);
    let relative = normalize(relative);
    match (root.is_empty(), relative.is_empty()) {
        (_, true) => root,
        (true, false) => relative,
        (false, false) => format!("{root}/{relative}"),
    }
}

/// Convert a key reported by storage into a path relative to `root`.
///
/// Returns `None` when the key names the root itself (or is empty), so the
/// root never appears as an entry.
pub fn relative_to_root(root: &str, key: &str) -> Option<String> {
    let root = normalize(root);
    let key = normalize(key);
    if key.is_empty() || key == root {
        return None;
    }
    if root.is_empty() {
        return Some(key);
    }
    match key.strip_prefix(root.as_str()) {
        Some(rest) if rest.starts_with('/') => Some(rest[1..].to_string()),
        _ => Some(key),
    }
}

/// Final segment of a `/`-separated path.
pub fn file_name(path: &str) -> &str {
    path.rsplit('/').next().unwrap_or(path)
}

/// Number of segments in a normalized path.
pub fn depth(path: &str) -> usize {
    segments(path).count()
}

/// A normalized path relative to the project root.
///
/// The empty path denotes the root directory.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct ProjectPath(String);

impl ProjectPath {
    /// The project root.
    pub fn root() -> Self {
        Self(String::new())
    }

    /// Parse caller input.
    ///
    /// Accepts `/` or `\` separators and ignores leading, trailing and
    /// repeated separators. Rejects `..` segments and NUL bytes.
    pub fn parse(raw: &str) -> Result<Self, ProjectError> {
        if raw.contains('\0') {
            return Err(ProjectError::Validation(
                "path must not contain NUL bytes".into(),
            ));
        }
        let mut parts = Vec::new();
        for segment in segments(raw) {
            if segment == ".." {
                return Err(ProjectError::Validation(format!(
                    "path must not contain '..' segments: {raw}"
                )));
            }
            parts.push(segment);
        }
        Ok(Self(parts.join("/")))
    }

    /// Parse optional caller input, treating `None` as the root.
    pub fn parse_optional(raw: Option<&str>) -> Result<Self, ProjectError> {
        raw.map_or_else(|| Ok(Self::root()), Self::parse)
    }

    /// The normalized path string (empty for the root).
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Whether this path denotes the project root.
    pub fn is_root(&self) -> bool {
        self.0.is_empty()
    }

    /// Storage key for this path under `root`.
    pub fn storage_key(&self, root: &str) -> String {
        join(root, &self.0)
    }
}

impl fmt::Display for ProjectPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_root() {
            f.write_str("/")
        } else {
            f.write_str(&self.0)
        }
    }
}
