//! Local metadata store (secondary/driven adapter)
//!
//! Scans and mutates the files under a graph root.
//!
//! ## Design Decisions
//!
//! - **Atomic writes**: content lands in a sibling temp file that is renamed
//!   over the target, so a crash or cancellation leaves either the old or
//!   the new complete file visible, never a partial one.
//! - **Normalization**: lookups use the NFC [`RelativePath`]. When no file
//!   exists under that spelling the parent directory is scanned for a name
//!   that normalizes equally, which finds NFD names written by macOS.
//! - **No inferred deletions**: a path that cannot be read is reported as
//!   absent for that index only; nothing here ever deletes on its own.
//! - **Blocking I/O**: directory walks and hashing run on the blocking pool.

use std::fs;
use std::io::{self, ErrorKind};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use glob::{MatchOptions, Pattern};
use graphsync_core::config::SyncConfig;
use graphsync_core::domain::{
    BatchReport, CanonicalPath, ContentDigest, LocalFileRecord, PathOutcome, RelativePath,
    SyncError,
};
use sha2::{Digest, Sha256};
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, instrument, warn};
use unicode_normalization::UnicodeNormalization;
use walkdir::WalkDir;

const MATCH_OPTIONS: MatchOptions = MatchOptions {
    case_sensitive: true,
    require_literal_separator: true,
    require_literal_leading_dot: false,
};

/// SHA-256 digest of a byte slice
#[must_use]
pub fn digest_bytes(data: &[u8]) -> ContentDigest {
    ContentDigest::from_bytes(&Sha256::digest(data).into())
}

/// Per-file metadata scanning and mutation under graph roots
#[derive(Debug, Clone)]
pub struct LocalMetadataStore {
    ignore: Arc<Vec<Pattern>>,
    temp_suffix: String,
}

impl LocalMetadataStore {
    /// # Errors
    /// `InvalidArgument` for an ignore pattern that is not a valid glob
    pub fn new(cfg: &SyncConfig) -> Result<Self, SyncError> {
        let ignore = cfg
            .ignore_patterns
            .iter()
            .map(|p| {
                Pattern::new(p).map_err(|e| {
                    SyncError::InvalidArgument(format!("invalid ignore pattern '{p}': {e}"))
                })
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self {
            ignore: Arc::new(ignore),
            temp_suffix: cfg.temp_suffix.clone(),
        })
    }

    /// Whether `path` or any of its ancestors matches an ignore pattern
    #[must_use]
    pub fn is_ignored(&self, path: &RelativePath) -> bool {
        if path.file_name().ends_with(&self.temp_suffix) {
            return true;
        }
        let mut prefix = String::new();
        for segment in path.segments() {
            if !prefix.is_empty() {
                prefix.push('/');
            }
            prefix.push_str(segment);
            if self
                .ignore
                .iter()
                .any(|p| p.matches_with(&prefix, MATCH_OPTIONS))
            {
                return true;
            }
        }
        false
    }

    // ========================================================================
    // Scanning
    // ========================================================================

    /// Look up each path; a missing or unreadable file yields `None` at its index
    ///
    /// # Errors
    /// Only if the blocking scan task itself fails
    #[instrument(skip(self, paths), fields(root = %root, count = paths.len()))]
    pub async fn scan_one(
        &self,
        root: &CanonicalPath,
        paths: &[RelativePath],
    ) -> Result<Vec<Option<LocalFileRecord>>, SyncError> {
        let root = root.clone();
        let paths = paths.to_vec();
        run_blocking(move || {
            paths
                .iter()
                .map(|rel| {
                    let on_disk = resolve_on_disk(root.as_path(), rel)?;
                    match stat_file(&root, rel, &on_disk) {
                        Ok(record) => record,
                        Err(e) => {
                            warn!(path = %rel, error = %e, "Could not read file metadata");
                            None
                        }
                    }
                })
                .collect()
        })
        .await
    }

    /// Metadata for every regular file under `root` that is not ignored
    ///
    /// Symlinks are not followed. Entries that fail to read are skipped
    /// with a warning rather than failing the walk.
    ///
    /// # Errors
    /// Only if the blocking scan task itself fails
    #[instrument(skip(self), fields(root = %root))]
    pub async fn scan_all(&self, root: &CanonicalPath) -> Result<Vec<LocalFileRecord>, SyncError> {
        let root = root.clone();
        let store = self.clone();
        let records = run_blocking(move || {
            let walker = WalkDir::new(root.as_path())
                .follow_links(false)
                .sort_by_file_name()
                .into_iter()
                .filter_entry(|entry| {
                    entry.depth() == 0
                        || RelativePath::from_fs_path(root.as_path(), entry.path())
                            .map(|rel| !store.is_ignored(&rel))
                            .unwrap_or(false)
                });

            let mut records = Vec::new();
            for entry in walker {
                let entry = match entry {
                    Ok(entry) => entry,
                    Err(e) => {
                        warn!(error = %e, "Skipping unreadable entry");
                        continue;
                    }
                };
                if !entry.file_type().is_file() {
                    continue;
                }
                let rel = match RelativePath::from_fs_path(root.as_path(), entry.path()) {
                    Ok(rel) => rel,
                    Err(e) => {
                        warn!(path = %entry.path().display(), error = %e, "Skipping unrepresentable path");
                        continue;
                    }
                };
                match stat_file(&root, &rel, entry.path()) {
                    Ok(Some(record)) => records.push(record),
                    Ok(None) => {}
                    Err(e) => warn!(path = %rel, error = %e, "Skipping file"),
                }
            }
            records
        })
        .await?;

        info!(count = records.len(), "Scanned graph");
        Ok(records)
    }

    // ========================================================================
    // Content
    // ========================================================================

    /// Read a file's bytes
    ///
    /// # Errors
    /// `NotFound` when no file exists under any normalization of the path
    #[instrument(skip(self), fields(root = %root, path = %path))]
    pub async fn read(&self, root: &CanonicalPath, path: &RelativePath) -> Result<Vec<u8>, SyncError> {
        let on_disk = self.locate(root, path).await?;
        let data = tokio::fs::read(&on_disk).await?;
        debug!(bytes = data.len(), "File read");
        Ok(data)
    }

    /// Replace a file atomically, creating parent directories as needed
    ///
    /// An existing file stored under a different normalization is replaced
    /// in place so the directory does not end up with two spellings.
    ///
    /// # Errors
    /// I/O failures; the temp file is removed on error
    #[instrument(skip(self, data), fields(root = %root, path = %path, bytes = data.len()))]
    pub async fn write_atomic(
        &self,
        root: &CanonicalPath,
        path: &RelativePath,
        data: &[u8],
    ) -> Result<(), SyncError> {
        let target = match self.locate(root, path).await {
            Ok(existing) => existing,
            Err(_) => root.join(path),
        };
        if let Some(parent) = target.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let tmp_path = {
            let mut p = target.as_os_str().to_owned();
            p.push(&self.temp_suffix);
            PathBuf::from(p)
        };

        debug!(tmp = %tmp_path.display(), "Writing temporary file");
        if let Err(e) = write_and_sync(&tmp_path, data).await {
            let _ = tokio::fs::remove_file(&tmp_path).await;
            return Err(e.into());
        }
        if let Err(e) = tokio::fs::rename(&tmp_path, &target).await {
            let _ = tokio::fs::remove_file(&tmp_path).await;
            return Err(e.into());
        }
        debug!("Write complete");
        Ok(())
    }

    // ========================================================================
    // Mutation
    // ========================================================================

    /// Move a file within the graph
    ///
    /// # Errors
    /// `NotFound` if `from` does not exist, `InvalidArgument` if `to` is
    /// already occupied by a different file
    #[instrument(skip(self), fields(root = %root, from = %from, to = %to))]
    pub async fn rename(
        &self,
        root: &CanonicalPath,
        from: &RelativePath,
        to: &RelativePath,
    ) -> Result<(), SyncError> {
        let source = self.locate(root, from).await?;
        let target = root.join(to);

        if let Ok(existing) = self.locate(root, to).await {
            // case-only renames resolve to the same file on case-insensitive volumes
            let same_file = match (
                tokio::fs::canonicalize(&existing).await,
                tokio::fs::canonicalize(&source).await,
            ) {
                (Ok(a), Ok(b)) => a == b,
                _ => false,
            };
            if !same_file {
                return Err(SyncError::InvalidArgument(format!(
                    "rename target already exists: {to}"
                )));
            }
        }

        if let Some(parent) = target.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::rename(&source, &target).await?;
        info!("Renamed file");
        Ok(())
    }

    /// Delete files, best-effort per path
    ///
    /// A path with no file behind it counts as deleted.
    #[instrument(skip(self, paths), fields(root = %root, count = paths.len()))]
    pub async fn delete(&self, root: &CanonicalPath, paths: &[RelativePath]) -> BatchReport<()> {
        let mut items = Vec::with_capacity(paths.len());
        for path in paths {
            let outcome = match self.locate(root, path).await {
                Err(SyncError::NotFound(_)) => Ok(()),
                Err(e) => Err(e),
                Ok(on_disk) => delete_file(&on_disk).await,
            };
            if let Err(e) = &outcome {
                warn!(path = %path, error = %e, "Delete failed");
            }
            items.push(PathOutcome {
                path: path.clone(),
                result: outcome,
            });
        }
        let report = BatchReport::new(items);
        info!(%report, "Deleted local files");
        report
    }

    async fn locate(&self, root: &CanonicalPath, path: &RelativePath) -> Result<PathBuf, SyncError> {
        let root_path = root.as_path().to_path_buf();
        let rel = path.clone();
        run_blocking(move || resolve_on_disk(&root_path, &rel))
            .await?
            .ok_or_else(|| SyncError::NotFound(path.to_string()))
    }
}

async fn run_blocking<T, F>(f: F) -> Result<T, SyncError>
where
    F: FnOnce() -> T + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| SyncError::Io(format!("blocking task failed: {e}")))
}

async fn write_and_sync(path: &Path, data: &[u8]) -> io::Result<()> {
    let mut file = tokio::fs::File::create(path).await?;
    file.write_all(data).await?;
    file.sync_all().await
}

async fn delete_file(path: &Path) -> Result<(), SyncError> {
    let meta = tokio::fs::symlink_metadata(path).await?;
    if meta.is_dir() {
        return Err(SyncError::InvalidArgument(format!(
            "refusing to delete directory {}",
            path.display()
        )));
    }
    match tokio::fs::remove_file(path).await {
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
        other => Ok(other?),
    }
}

/// Find the on-disk spelling of `rel`, segment by segment
///
/// Each segment is tried verbatim first, then matched against the
/// directory's entries by NFC form.
fn resolve_on_disk(root: &Path, rel: &RelativePath) -> Option<PathBuf> {
    let mut current = root.to_path_buf();
    for segment in rel.segments() {
        let direct = current.join(segment);
        if fs::symlink_metadata(&direct).is_ok() {
            current = direct;
            continue;
        }
        let entries = fs::read_dir(&current).ok()?;
        let found = entries.filter_map(Result::ok).find(|entry| {
            entry
                .file_name()
                .to_str()
                .is_some_and(|name| name.nfc().eq(segment.chars()))
        })?;
        current = found.path();
    }
    Some(current)
}

/// Stat and hash one file; `Ok(None)` for anything that is not a regular file
fn stat_file(
    root: &CanonicalPath,
    rel: &RelativePath,
    on_disk: &Path,
) -> io::Result<Option<LocalFileRecord>> {
    let meta = match fs::symlink_metadata(on_disk) {
        Ok(meta) => meta,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e),
    };
    if !meta.is_file() {
        return Ok(None);
    }

    let mut hasher = Sha256::new();
    let mut file = fs::File::open(on_disk)?;
    let size = io::copy(&mut file, &mut hasher)?;

    let incoming_name = on_disk
        .strip_prefix(root.as_path())
        .map(|p| {
            p.components()
                .map(|c| c.as_os_str().to_string_lossy())
                .collect::<Vec<_>>()
                .join("/")
        })
        .unwrap_or_else(|_| rel.to_string());

    Ok(Some(LocalFileRecord {
        path: rel.clone(),
        incoming_name,
        canonical_path: CanonicalPath::from_canonical(on_disk.to_path_buf())
            .map_err(|e| io::Error::new(ErrorKind::InvalidInput, e.to_string()))?,
        size,
        mtime: meta.modified().map(DateTime::<Utc>::from)?,
        ctime: meta.created().ok().map(DateTime::<Utc>::from),
        digest: ContentDigest::from_bytes(&hasher.finalize().into()),
        acked_version: None,
    }))
}
