//! Path normalization helpers shared by evaluation and conflict detection.

use std::path::Path;

/// Normalizes a path for comparison (forward slashes, no trailing slash).
pub fn normalize_path_for_compare(raw: &str) -> String {
    let mut normalized = raw.replace('\\', "/");

    while normalized.ends_with('/') {
        if normalized == "/" || looks_like_windows_drive_root(normalized.as_str()) {
            break;
        }
        normalized.pop();
    }

    if normalized.is_empty() {
        "/".to_string()
    } else {
        normalized
    }
}

fn looks_like_windows_drive_root(path: &str) -> bool {
    path.len() == 3
        && path.as_bytes()[1] == b':'
        && path.as_bytes()[2] == b'/'
        && path.as_bytes()[0].is_ascii_alphabetic()
}

/// Lossy, normalized string form of a path.
pub fn path_string(path: &Path) -> String {
    normalize_path_for_compare(path.to_string_lossy().as_ref())
}

/// Extracts the lowercase extension from a file name.
///
/// A name whose only dot is the leading one (`.bashrc`) has no extension.
pub fn extension_of_name(name: &str) -> Option<String> {
    let split = name.rfind('.')?;
    if split == 0 || split + 1 >= name.len() {
        return None;
    }
    Some(name[split + 1..].to_ascii_lowercase())
}

/// Strips a leading dot and lowercases a user-supplied extension.
pub fn normalize_extension(raw: &str) -> Option<String> {
    let trimmed = raw.trim().trim_start_matches('.');
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_ascii_lowercase())
    }
}
