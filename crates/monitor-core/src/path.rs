//! Path normalization at the engine boundary.
//!
//! Every path reaching the classifier is in one canonical form: absolute,
//! OS-native separators, a trailing separator for folders and none for files.
//! Status Store keys and watch table keys use the same form.

use std::path::{Path, PathBuf, MAIN_SEPARATOR};

/// Native path separator.
pub const SEPARATOR: char = MAIN_SEPARATOR;

/// Normalize a folder path: absolute, native separators, trailing separator.
pub fn normalize_folder(path: impl AsRef<Path>) -> String {
    let mut normalized = canonical_string(path.as_ref());
    if !normalized.ends_with(SEPARATOR) {
        normalized.push(SEPARATOR);
    }
    normalized
}

/// Normalize a file path: absolute, native separators, no trailing separator.
pub fn normalize_file(path: impl AsRef<Path>) -> String {
    let normalized = canonical_string(path.as_ref());
    trim_trailing(&normalized).to_string()
}

/// Build a full path from a parent directory and a leaf name.
///
/// The result has no trailing separator; callers decide which kind it is.
pub fn join(dir: &str, name: &str) -> String {
    let mut path = normalize_folder(dir);
    path.push_str(name.trim_matches(SEPARATOR));
    path
}

/// Split a path into `(parent folder, leaf name)`.
///
/// Returns `None` for a filesystem root, which has no leaf.
pub fn split(path: &str) -> Option<(String, String)> {
    let trimmed = trim_trailing(path);
    let pos = trimmed.rfind(SEPARATOR)?;
    let name = &trimmed[pos + 1..];
    if name.is_empty() {
        return None;
    }
    Some((trimmed[..=pos].to_string(), name.to_string()))
}

/// Leaf name of a path (last component, separators stripped).
pub fn leaf_name(path: &str) -> &str {
    let trimmed = trim_trailing(path);
    match trimmed.rfind(SEPARATOR) {
        Some(pos) => &trimmed[pos + 1..],
        None => trimmed,
    }
}

/// Containing folder of a path, in folder form.
pub fn parent_folder(path: &str) -> Option<String> {
    split(path).map(|(dir, _)| dir)
}

/// Folder form of an arbitrary path string.
pub fn folder_key(path: &str) -> String {
    let mut key = trim_trailing(path).to_string();
    if !key.ends_with(SEPARATOR) {
        key.push(SEPARATOR);
    }
    key
}

/// Whether the given folder-form path is a strict descendant of `ancestor` (folder form).
pub fn is_descendant(path: &str, ancestor: &str) -> bool {
    path.len() > ancestor.len() && path.starts_with(ancestor)
}

/// Hidden files follow the dot-prefix convention.
pub fn is_hidden_name(name: &str) -> bool {
    name.starts_with('.')
}

/// Whether a raw path string was written in folder form.
pub fn has_trailing_separator(path: &Path) -> bool {
    let raw = path.as_os_str().to_string_lossy();
    raw.ends_with('/') || raw.ends_with(SEPARATOR)
}

fn trim_trailing(path: &str) -> &str {
    let trimmed = path.trim_end_matches(SEPARATOR);
    if trimmed.is_empty() && !path.is_empty() {
        // Root: keep a single separator
        &path[..SEPARATOR.len_utf8()]
    } else {
        trimmed
    }
}

fn canonical_string(path: &Path) -> String {
    let absolute: PathBuf = std::path::absolute(path).unwrap_or_else(|_| path.to_path_buf());
    to_native_separators(&absolute.to_string_lossy())
}

#[cfg(windows)]
fn to_native_separators(path: &str) -> String {
    path.replace('/', "\\")
}

#[cfg(not(windows))]
fn to_native_separators(path: &str) -> String {
    path.to_string()
}
