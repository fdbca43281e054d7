//! graphsync CLI - Command-line interface for graphsync
//!
//! Provides commands for:
//! - Generating graph keypairs and passphrase-protected key files
//! - Passphrase encryption of arbitrary files
//! - Encrypting and decrypting remote filenames
//! - Inspecting local file metadata and canonical paths
//! - Reconciling a graph with the remote store
//! - Decrypting a downloaded copy of a graph

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use graphsync_core::config::Config;
use tracing::debug;
use tracing_subscriber::EnvFilter;

mod commands;
mod output;

use commands::{
    canonicalize::CanonicalizeCommand,
    config::ConfigCommand,
    decrypt_graph::DecryptGraphCommand,
    envelope::{DecryptCommand, EncryptCommand},
    keygen::KeygenCommand,
    meta::MetaCommand,
    names::NamesCommand,
    sync::SyncCommand,
};
use output::OutputFormat;

#[derive(Debug, Parser)]
#[command(name = "graphsync", version, about = "Encrypted graph synchronization")]
pub struct Cli {
    /// Output in JSON format
    #[arg(long, global = true)]
    json: bool,

    /// Verbose output (can be repeated: -v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Use alternate config file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Minimal output
    #[arg(short, long, global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Generate a new graph keypair
    Keygen(KeygenCommand),
    /// Seal a file under a passphrase
    Encrypt(EncryptCommand),
    /// Open a passphrase-sealed file
    Decrypt(DecryptCommand),
    /// Encrypt or decrypt remote filenames
    #[command(subcommand)]
    Names(NamesCommand),
    /// Show local metadata for files under a graph root
    Meta(MetaCommand),
    /// Print the canonical form of a path
    Canonicalize(CanonicalizeCommand),
    /// Reconcile a graph with the remote store
    Sync(SyncCommand),
    /// Decrypt a downloaded graph directory
    DecryptGraph(DecryptGraphCommand),
    /// View and validate configuration
    #[command(subcommand)]
    Config(ConfigCommand),
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Setup tracing
    let filter = match (cli.quiet, cli.verbose) {
        (true, _) => "warn",
        (false, 0) => "info",
        (false, 1) => "debug",
        _ => "trace",
    };
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let format = if cli.json {
        OutputFormat::Json
    } else {
        OutputFormat::Human
    };

    let config_path = cli.config.unwrap_or_else(Config::default_path);
    debug!(config_path = %config_path.display(), "Using configuration");

    match cli.command {
        Commands::Keygen(cmd) => cmd.execute(format, &config_path).await,
        Commands::Encrypt(cmd) => cmd.execute(format, &config_path).await,
        Commands::Decrypt(cmd) => cmd.execute(format, &config_path).await,
        Commands::Names(cmd) => cmd.execute(format, &config_path).await,
        Commands::Meta(cmd) => cmd.execute(format, &config_path).await,
        Commands::Canonicalize(cmd) => cmd.execute(format, &config_path).await,
        Commands::Sync(cmd) => cmd.execute(format, &config_path).await,
        Commands::DecryptGraph(cmd) => cmd.execute(format, &config_path).await,
        Commands::Config(cmd) => cmd.execute(format, &config_path).await,
    }
}
