//! Output prefix collision detection.
//!
//! Filenames are the only record of which prefixes have been used, so the
//! check walks the whole workspace tree. It runs once per batch.

use std::path::Path;

use walkdir::WalkDir;

use crate::error::{Result, TrialError};

/// Validate a prefix before it is used to name files.
pub fn validate_prefix(prefix: &str) -> Result<()> {
    if prefix.is_empty() {
        return Err(TrialError::InvalidConfig(
            "output prefix must not be empty".to_string(),
        ));
    }
    if prefix.contains('/') || prefix.contains('\\') {
        return Err(TrialError::InvalidConfig(format!(
            "output prefix '{prefix}' must not contain a path separator"
        )));
    }
    Ok(())
}

/// Fail with [`TrialError::NamespaceCollision`] if any non-directory entry
/// under `root` has a name starting with `prefix`. Symlinks count as files
/// and are not followed.
pub fn check_prefix_unused(root: impl AsRef<Path>, prefix: &str) -> Result<()> {
    for entry in WalkDir::new(root.as_ref()) {
        let entry = entry.map_err(|e| {
            e.into_io_error()
                .unwrap_or_else(|| std::io::Error::other("filesystem loop in workspace"))
        })?;
        if entry.file_type().is_dir() {
            continue;
        }
        if entry.file_name().to_string_lossy().starts_with(prefix) {
            return Err(TrialError::NamespaceCollision {
                prefix: prefix.to_string(),
                path: entry.into_path(),
            });
        }
    }
    Ok(())
}
