//! Sync command - reconcile a graph with the remote store
//!
//! Provides the `graphsync sync` CLI command which:
//! 1. Loads configuration and the graph's secret key
//! 2. Selects the backend environment and installs the keys
//! 3. Runs one reconciliation pass, printing transfer progress
//! 4. Reports applied changes, failures and conflicts left for the user
//!
//! Ctrl-C cancels in-flight transfers; the pass then finishes with the
//! cancelled items reported as failures.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Result;
use clap::Args;
use graphsync_api::{Applied, SyncSummary};
use graphsync_core::domain::{ProgressEvent, TransferDirection};
use graphsync_crypto::ContentCrypto;
use tracing::{info, warn};

use super::{load_secret_key, open_context, read_env_secret, PASSPHRASE_ENV, TOKEN_ENV};
use crate::output::{Output, OutputFormat};

#[derive(Debug, Args)]
pub struct SyncCommand {
    /// Graph root directory
    pub root: PathBuf,

    /// Graph identifier (UUID)
    #[arg(long)]
    pub graph_id: String,

    /// Secret key file, plain or passphrase-protected
    #[arg(long)]
    pub key_file: PathBuf,

    /// Backend environment; defaults to the configured one
    #[arg(long)]
    pub env: Option<String>,

    /// Route requests through this HTTPS proxy
    #[arg(long)]
    pub proxy: Option<String>,

    /// Environment variable holding the key file passphrase
    #[arg(long, default_value = PASSPHRASE_ENV)]
    pub passphrase_env: String,

    /// Environment variable holding the access token
    #[arg(long, default_value = TOKEN_ENV)]
    pub token_env: String,
}

impl SyncCommand {
    pub async fn execute(&self, format: OutputFormat, config_path: &Path) -> Result<()> {
        let out = Output::new(format);
        let ctx = open_context(config_path)?;

        let secret = load_secret_key(
            &self.key_file,
            &ContentCrypto::from_config(&ctx.config().crypto),
            &self.passphrase_env,
        )?;
        let token = read_env_secret(&self.token_env, "access token")?;
        let env = self
            .env
            .clone()
            .unwrap_or_else(|| ctx.config().remote.environment.to_string());

        ctx.set_env(
            &self.graph_id,
            &env,
            &secret.to_text(),
            &secret.public_key().to_text(),
        )?;
        if let Some(proxy) = &self.proxy {
            ctx.set_proxy(Some(proxy))?;
        }
        if !format.is_json() {
            ctx.set_progress_callback(Some(Arc::new(print_progress)));
        }

        info!(graph_id = %self.graph_id, root = %self.root.display(), %env, "Starting sync");

        let pass = ctx.sync_graph(&self.graph_id, &self.root, &token);
        tokio::pin!(pass);
        let finished = tokio::select! {
            result = &mut pass => Some(result),
            _ = tokio::signal::ctrl_c() => None,
        };
        let summary = match finished {
            Some(result) => result?,
            None => {
                warn!("Interrupted, cancelling transfers");
                ctx.cancel_all_requests();
                pass.await?
            }
        };
        ctx.set_progress_callback(None);

        if format.is_json() {
            out.json(&summary_json(&summary));
        } else {
            print_summary(&out, &summary);
        }

        if summary.report.failed().next().is_some() {
            anyhow::bail!("sync finished with failures: {}", summary.report);
        }
        Ok(())
    }
}

fn print_progress(event: ProgressEvent) {
    let arrow = match event.direction {
        TransferDirection::Upload => '\u{2191}',
        TransferDirection::Download => '\u{2193}',
    };
    eprintln!("  {arrow} {:>3}% {}", event.percent, event.file);
}

fn applied_label(applied: &Applied) -> String {
    match applied {
        Applied::Uploaded(v) => format!("uploaded (v{v})"),
        Applied::Downloaded(v) => format!("downloaded (v{v})"),
        Applied::DeletedLocal => "deleted locally".to_string(),
        Applied::DeletedRemote => "deleted remotely".to_string(),
        Applied::Renamed(v) => format!("renamed (v{v})"),
        Applied::Unchanged => "unchanged".to_string(),
    }
}

fn print_summary(out: &Output, summary: &SyncSummary) {
    for item in &summary.report.items {
        match &item.result {
            Ok(applied) => out.info(&format!("{}: {}", item.path, applied_label(applied))),
            Err(e) => out.error(&format!("{}: {e}", item.path)),
        }
    }
    for conflict in &summary.conflicts {
        out.warn(&format!(
            "{}: changed on both sides (remote v{}), left untouched",
            conflict.path, conflict.remote_version
        ));
    }
    if !summary.undecodable.is_empty() {
        out.warn(&format!(
            "{} remote file(s) are not readable with this key",
            summary.undecodable.len()
        ));
    }
    out.success(&format!(
        "Sync complete: {}, {} conflict(s)",
        summary.report,
        summary.conflicts.len()
    ));
}

fn summary_json(summary: &SyncSummary) -> serde_json::Value {
    let items: Vec<_> = summary
        .report
        .items
        .iter()
        .map(|item| match &item.result {
            Ok(applied) => serde_json::json!({
                "path": item.path,
                "result": applied_label(applied),
                "version": applied.version(),
            }),
            Err(e) => serde_json::json!({
                "path": item.path,
                "error": e.to_string(),
            }),
        })
        .collect();

    serde_json::json!({
        "success": summary.report.failed().next().is_none(),
        "items": items,
        "conflicts": summary.conflicts,
        "undecodable": summary.undecodable,
    })
}
