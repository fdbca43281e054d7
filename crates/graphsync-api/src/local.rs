//! Local-only operations
//!
//! None of these touch the network or need a graph's keys.

use std::path::Path;

use graphsync_core::domain::{BatchReport, CanonicalPath, LocalFileRecord, RelativePath, SyncError};
use graphsync_sync::canonicalize;
use tracing::instrument;

use crate::context::{RequestedPaths, SyncContext};

impl SyncContext {
    /// Resolve `path` to its canonical absolute form
    ///
    /// # Errors
    /// `NotFound` when the path does not exist
    pub fn canonicalize_path(&self, path: impl AsRef<Path>) -> Result<CanonicalPath, SyncError> {
        canonicalize(path)
    }

    /// Metadata for each listed path, `None` where no file exists
    ///
    /// The result always has one entry per requested path, in order. A
    /// malformed path also yields `None`.
    ///
    /// # Errors
    /// Call-setup failures only: malformed graph id or bad root
    #[instrument(skip(self, root, paths), fields(count = paths.len()))]
    pub async fn get_local_files_meta<S: AsRef<str>>(
        &self,
        graph_id: &str,
        root: &Path,
        paths: &[S],
    ) -> Result<Vec<Option<LocalFileRecord>>, SyncError> {
        let (_, graph) = self.graph(graph_id, root)?;
        let requested = RequestedPaths::parse(paths);
        let mut records = self
            .coordinator()
            .store()
            .scan_one(&graph.root, &requested.valid())
            .await?;
        for record in records.iter_mut().flatten() {
            graph.ledger.annotate(record);
        }
        Ok(requested
            .expand(records, |_| None)
            .into_iter()
            .map(Option::flatten)
            .collect())
    }

    /// Metadata for every non-ignored file under the graph root
    ///
    /// # Errors
    /// Call-setup failures only
    #[instrument(skip(self, root))]
    pub async fn get_local_all_files_meta(
        &self,
        graph_id: &str,
        root: &Path,
    ) -> Result<Vec<LocalFileRecord>, SyncError> {
        let (_, graph) = self.graph(graph_id, root)?;
        let mut records = self.coordinator().store().scan_all(&graph.root).await?;
        for record in &mut records {
            graph.ledger.annotate(record);
        }
        Ok(records)
    }

    /// Rename a file under the graph root, carrying its ack along
    ///
    /// # Errors
    /// `NotFound` for a missing source, `InvalidArgument` when the target is
    /// a different existing file
    #[instrument(skip(self, root))]
    pub async fn rename_local_file(
        &self,
        graph_id: &str,
        root: &Path,
        from: &str,
        to: &str,
    ) -> Result<(), SyncError> {
        let (_, graph) = self.graph(graph_id, root)?;
        let from = RelativePath::new(from)?;
        let to = RelativePath::new(to)?;
        self.coordinator()
            .rename_local(&graph.root, &graph.ledger, &from, &to)
            .await
    }

    /// Delete files under the graph root; already-missing files count as deleted
    ///
    /// # Errors
    /// Call-setup failures only; per-file failures, malformed paths
    /// included, are in the report
    #[instrument(skip(self, root, paths), fields(count = paths.len()))]
    pub async fn delete_local_files<S: AsRef<str>>(
        &self,
        graph_id: &str,
        root: &Path,
        paths: &[S],
    ) -> Result<BatchReport<(), String>, SyncError> {
        let (_, graph) = self.graph(graph_id, root)?;
        let requested = RequestedPaths::parse(paths);
        let report = self
            .coordinator()
            .delete_local(&graph.root, &graph.ledger, &requested.valid())
            .await;
        Ok(requested.report(report))
    }
}
