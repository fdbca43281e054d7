//! Canonicalize command - resolve paths the way the sync core keys them

use std::path::{Path, PathBuf};

use anyhow::Result;
use clap::Args;

use super::open_context;
use crate::output::{Output, OutputFormat};

#[derive(Debug, Args)]
pub struct CanonicalizeCommand {
    /// Paths to resolve
    #[arg(required = true)]
    pub paths: Vec<PathBuf>,
}

impl CanonicalizeCommand {
    pub async fn execute(&self, format: OutputFormat, config_path: &Path) -> Result<()> {
        let ctx = open_context(config_path)?;
        let out = Output::new(format);

        let mut results = Vec::with_capacity(self.paths.len());
        let mut failed = 0;
        for path in &self.paths {
            match ctx.canonicalize_path(path) {
                Ok(canonical) => {
                    if !format.is_json() {
                        println!("{canonical}");
                    }
                    results.push(serde_json::json!({
                        "input": path.display().to_string(),
                        "canonical": canonical.to_string(),
                    }));
                }
                Err(e) => {
                    failed += 1;
                    out.warn(&format!("{}: {e}", path.display()));
                    results.push(serde_json::json!({
                        "input": path.display().to_string(),
                        "error": e.to_string(),
                    }));
                }
            }
        }

        out.json(&serde_json::Value::Array(results));
        if failed > 0 {
            anyhow::bail!("{failed} of {} paths could not be resolved", self.paths.len());
        }
        Ok(())
    }
}
