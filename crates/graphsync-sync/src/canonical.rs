//! Path canonicalization
//!
//! Resolves symlinks and `.`/`..` components and produces one absolute form
//! per file. On Windows the verbatim `\\?\` prefix is stripped where the
//! path allows it so canonical roots compare equal to user-supplied ones.

use std::io::ErrorKind;
use std::path::Path;

use graphsync_core::domain::{CanonicalPath, SyncError};
use tracing::debug;

/// Resolve `path` to its canonical absolute form
///
/// # Errors
/// `NotFound` when the path does not exist, `PermissionDenied` when a
/// component cannot be traversed
pub fn canonicalize(path: impl AsRef<Path>) -> Result<CanonicalPath, SyncError> {
    let path = path.as_ref();
    let resolved = dunce::canonicalize(path).map_err(|e| match e.kind() {
        ErrorKind::NotFound => SyncError::NotFound(path.display().to_string()),
        ErrorKind::PermissionDenied => SyncError::PermissionDenied(path.display().to_string()),
        _ => SyncError::Io(format!("{}: {e}", path.display())),
    })?;
    debug!(input = %path.display(), resolved = %resolved.display(), "Canonicalized path");
    Ok(CanonicalPath::from_canonical(resolved)?)
}

/// Resolve a graph root, which must be a directory
///
/// # Errors
/// As [`canonicalize`], plus `InvalidArgument` when the path is not a directory
pub fn canonicalize_root(path: impl AsRef<Path>) -> Result<CanonicalPath, SyncError> {
    let root = canonicalize(path)?;
    if !root.as_path().is_dir() {
        return Err(SyncError::InvalidArgument(format!(
            "graph root is not a directory: {root}"
        )));
    }
    Ok(root)
}

#[cfg(test)]
mod tests {
    use tempfile::TempDir;

    use super::*;

    #[test]
    fn test_resolves_dot_components() {
        let dir = TempDir::new().unwrap();
        std::fs::create_dir(dir.path().join("pages")).unwrap();
        let messy = dir.path().join("pages").join("..").join("pages").join(".");

        let canonical = canonicalize(&messy).unwrap();
        assert_eq!(
            canonical.as_path(),
            dunce::canonicalize(dir.path().join("pages")).unwrap()
        );
        assert!(canonical.as_path().is_absolute());
    }

    #[test]
    fn test_missing_path_is_not_found() {
        let dir = TempDir::new().unwrap();
        let err = canonicalize(dir.path().join("nope")).unwrap_err();
        assert!(matches!(err, SyncError::NotFound(_)));
    }

    #[cfg(unix)]
    #[test]
    fn test_follows_symlinks() {
        let dir = TempDir::new().unwrap();
        let target = dir.path().join("real");
        std::fs::create_dir(&target).unwrap();
        let link = dir.path().join("link");
        std::os::unix::fs::symlink(&target, &link).unwrap();

        assert_eq!(canonicalize(&link).unwrap(), canonicalize(&target).unwrap());
    }

    #[test]
    fn test_root_must_be_directory() {
        let dir = TempDir::new().unwrap();
        let file = dir.path().join("a.md");
        std::fs::write(&file, b"x").unwrap();

        assert!(canonicalize_root(dir.path()).is_ok());
        assert!(matches!(
            canonicalize_root(&file),
            Err(SyncError::InvalidArgument(_))
        ));
    }
}
