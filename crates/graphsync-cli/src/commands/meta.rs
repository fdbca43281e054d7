//! Meta command - local file metadata under a graph root
//!
//! With no paths, scans the whole graph (honouring the ignore rules);
//! otherwise reports exactly the requested paths, in order.

use std::path::{Path, PathBuf};

use anyhow::Result;
use clap::Args;
use graphsync_core::domain::{GraphId, LocalFileRecord};

use super::open_context;
use crate::output::{Output, OutputFormat};

#[derive(Debug, Args)]
pub struct MetaCommand {
    /// Graph root directory
    pub root: PathBuf,

    /// Root-relative paths; the whole graph when omitted
    pub paths: Vec<String>,
}

impl MetaCommand {
    pub async fn execute(&self, format: OutputFormat, config_path: &Path) -> Result<()> {
        let ctx = open_context(config_path)?;
        let out = Output::new(format);
        // local metadata needs no keys; any fresh id binds the root
        let graph_id = GraphId::new().to_string();

        let records: Vec<(String, Option<LocalFileRecord>)> = if self.paths.is_empty() {
            let mut all = ctx.get_local_all_files_meta(&graph_id, &self.root).await?;
            all.sort_by(|a, b| a.path.cmp(&b.path));
            all.into_iter()
                .map(|r| (r.path.to_string(), Some(r)))
                .collect()
        } else {
            let found = ctx
                .get_local_files_meta(&graph_id, &self.root, &self.paths)
                .await?;
            self.paths.iter().cloned().zip(found).collect()
        };

        if format.is_json() {
            let json: Vec<_> = records
                .iter()
                .map(|(path, record)| match record {
                    Some(record) => serde_json::to_value(record).unwrap_or_default(),
                    None => serde_json::json!({"path": path, "missing": true}),
                })
                .collect();
            out.json(&serde_json::Value::Array(json));
            return Ok(());
        }

        for (path, record) in &records {
            match record {
                Some(r) => println!(
                    "{:>10}  {}  {}  {}",
                    r.size,
                    r.mtime.format("%Y-%m-%d %H:%M:%S"),
                    &r.digest.as_str()[..12],
                    r.path
                ),
                None => out.warn(&format!("{path}: not found")),
            }
        }
        out.info(&format!("{} file(s)", records.iter().filter(|(_, r)| r.is_some()).count()));
        Ok(())
    }
}
