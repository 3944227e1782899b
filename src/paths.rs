//! Key and path management
//!
//! Maps keys to their on-disk file pair and back.
//!
//! ## On-disk layout
//! - Primary file: `<root>/<key>.pt` — holds the last committed value
//! - Backup file: `<root>/<key>.pt.bak` — holds the previous committed value
//!   while a write for that key is in flight (and after a crash, until the
//!   next read heals it)

use std::path::{Path, PathBuf};

use crate::error::{FolioError, Result};

/// Extension of the primary file holding the committed value
pub const PRIMARY_EXT: &str = ".pt";

/// Suffix appended to the primary path to form the backup path
pub const BACKUP_SUFFIX: &str = ".bak";

/// Validate a key before any lock or I/O happens.
///
/// Keys become file names, so they must be non-empty and must not contain
/// path-separator characters. Violations are precondition errors, never
/// silently sanitized.
pub fn validate_key(key: &str) -> Result<()> {
    if key.is_empty() {
        return Err(FolioError::InvalidKey {
            key: key.to_string(),
            reason: "key must not be empty",
        });
    }
    if key.chars().any(std::path::is_separator) || key.contains('/') || key.contains('\\') {
        return Err(FolioError::InvalidKey {
            key: key.to_string(),
            reason: "key must not contain a path separator",
        });
    }
    Ok(())
}

/// Path of the primary file for `key` under `root`
pub fn primary_path(root: &Path, key: &str) -> PathBuf {
    root.join(format!("{key}{PRIMARY_EXT}"))
}

/// Path of the backup file next to a primary file
pub fn backup_path(primary: &Path) -> PathBuf {
    let mut name = primary.as_os_str().to_os_string();
    name.push(BACKUP_SUFFIX);
    PathBuf::from(name)
}

/// Recover a key from a directory entry name.
///
/// Only primary files count: `"city.pt"` → `Some("city")`. Backup remnants
/// (`"city.pt.bak"`) and unrelated files yield `None`, so enumeration never
/// reports a key whose only trace is an unhealed backup.
pub fn key_for_entry(file_name: &str) -> Option<&str> {
    file_name
        .strip_suffix(PRIMARY_EXT)
        .filter(|key| !key.is_empty())
}
