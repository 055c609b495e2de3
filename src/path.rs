//! Logical path normalization utilities
//!
//! Logical paths are `/`-separated, NFC-normalized and carry no leading or
//! trailing slash. The empty string is the root.

use crate::error::VfsError;
use unicode_normalization::UnicodeNormalization;

/// Normalize a caller-supplied path into its logical form
///
/// This function:
/// 1. Normalizes Unicode to NFC
/// 2. Treats `\` as a separator
/// 3. Drops empty and `.` segments (collapsing leading, trailing and repeated slashes)
/// 4. Rejects `..` segments
pub fn normalize(path: &str) -> Result<String, VfsError> {
    let normalized: String = path.nfc().collect();
    let mut segments = Vec::new();

    for segment in normalized.split(['/', '\\']) {
        match segment {
            "" | "." => continue,
            ".." => {
                return Err(VfsError::Logic(format!(
                    "Path '{}' must not contain '..' segments",
                    path
                )))
            }
            other => segments.push(other),
        }
    }

    Ok(segments.join("/"))
}

/// Join two logical paths, treating an empty side as the root.
pub fn join(prefix: &str, path: &str) -> String {
    match (prefix.is_empty(), path.is_empty()) {
        (true, _) => path.to_string(),
        (_, true) => prefix.to_string(),
        _ => format!("{}/{}", prefix, path),
    }
}

/// Parent of a logical path; `None` for the root itself.
pub fn parent(path: &str) -> Option<&str> {
    if path.is_empty() {
        return None;
    }
    Some(path.rfind('/').map(|idx| &path[..idx]).unwrap_or(""))
}

/// Last segment of a logical path.
pub fn basename(path: &str) -> &str {
    path.rfind('/').map(|idx| &path[idx + 1..]).unwrap_or(path)
}

/// Number of segments (the root has depth 0).
pub fn depth(path: &str) -> usize {
    if path.is_empty() {
        0
    } else {
        path.matches('/').count() + 1
    }
}

/// True if `path` equals `scope` or lies somewhere beneath it.
pub fn is_within(path: &str, scope: &str) -> bool {
    scope.is_empty()
        || path == scope
        || (path.len() > scope.len()
            && path.starts_with(scope)
            && path.as_bytes()[scope.len()] == b'/')
}

/// Strip a path prefix on segment boundaries.
///
/// Returns `None` when `path` is not within `prefix`.
pub fn strip_prefix<'a>(path: &'a str, prefix: &str) -> Option<&'a str> {
    if prefix.is_empty() {
        return Some(path);
    }
    if path == prefix {
        return Some("");
    }
    if is_within(path, prefix) {
        return Some(&path[prefix.len() + 1..]);
    }
    None
}

/// Proper ancestors of a path (excluding the root), shallowest first.
pub fn ancestors(path: &str) -> Vec<&str> {
    path.match_indices('/').map(|(idx, _)| &path[..idx]).collect()
}

/// True if `child` is an immediate child of `dir`.
pub fn is_direct_child(child: &str, dir: &str) -> bool {
    parent(child) == Some(dir) && !child.is_empty()
}
