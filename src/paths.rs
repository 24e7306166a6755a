use std::path::{Path, PathBuf};

use unicode_normalization::UnicodeNormalization;

use crate::error::{AppError, AppResult};

/// Folder under the data root holding one subdirectory per storage root.
pub const USER_DIRS: &str = "user_dirs";
pub const BACKUP_DIR: &str = "backup";

#[inline]
pub fn user_dirs(data_root: &Path) -> PathBuf { data_root.join(USER_DIRS) }

#[inline]
pub fn backup_root(data_root: &Path) -> PathBuf { data_root.join(BACKUP_DIR) }

/// Normalize a UTF-8 string to NFC.
pub fn normalize_nfc(input: &str) -> String {
    input.nfc().collect::<String>()
}

/// Validate a client-supplied relative path:
/// - segments separated by '/', no leading/trailing '/' and no empty segments
/// - no NUL characters
/// - no '.' or '..' segments, so a path can never leave its storage root
pub fn validate_relative_path(path: &str) -> AppResult<()> {
    let bad = |msg: &str| Err(AppError::malformed("invalid_path", format!("{}: '{}'", msg, path)));
    if path.is_empty() {
        return bad("path cannot be empty");
    }
    if path.chars().any(|c| c == '\u{0000}') {
        return bad("path cannot contain NUL characters");
    }
    if path.starts_with('/') || path.ends_with('/') {
        return bad("leading or trailing '/' is not allowed");
    }
    for seg in path.split('/') {
        if seg.is_empty() {
            return bad("empty segment in path");
        }
        if seg == "." || seg == ".." {
            return bad("segments '.' and '..' are not allowed");
        }
    }
    Ok(())
}

/// Validate then NFC-normalize a relative path.
pub fn normalize_relative_path(path: &str) -> AppResult<String> {
    validate_relative_path(path)?;
    Ok(normalize_nfc(path))
}

/// Change-log key for a file: `<root>/<relative>`.
#[inline]
pub fn log_key(root_id: &str, relative: &str) -> String { format!("{}/{}", root_id, relative) }

/// Whether a change-log key lives inside the given storage root. The match is a
/// string prefix on a segment boundary, so root "1" does not own "10/x".
pub fn is_within_root(key: &str, root_id: &str) -> bool {
    match key.strip_prefix(root_id) {
        Some(rest) => rest.is_empty() || rest.starts_with('/'),
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_nfc_basic() {
        let s = "Cafe\u{0301}";
        assert_eq!(normalize_nfc(s), "Caf\u{e9}");
    }

    #[test]
    fn test_valid_paths() {
        validate_relative_path("notes.txt").unwrap();
        validate_relative_path("docs/2024/report.md").unwrap();
        assert_eq!(normalize_relative_path("a/Cafe\u{0301}.txt").unwrap(), "a/Caf\u{e9}.txt");
    }

    #[test]
    fn test_invalid_paths() {
        for p in ["", "/leading", "trailing/", "double//slash", "a/./b", "a/../b", "..", "."] {
            let err = validate_relative_path(p).unwrap_err();
            assert_eq!(err.code_str(), "invalid_path", "path {:?}", p);
        }
        assert!(validate_relative_path("a\u{0000}b").is_err());
    }

    #[test]
    fn test_root_ownership_is_segment_aware() {
        assert!(is_within_root("1", "1"));
        assert!(is_within_root("1/notes.txt", "1"));
        assert!(is_within_root("1/a/b.txt", "1"));
        assert!(!is_within_root("10/notes.txt", "1"));
        assert!(!is_within_root("1f", "1"));
        assert!(!is_within_root("2/notes.txt", "1"));
        assert_eq!(log_key("a", "x/y.txt"), "a/x/y.txt");
    }
}
