//! Names command - encrypt or decrypt remote filenames

use std::path::{Path, PathBuf};

use anyhow::Result;
use clap::{Args, Subcommand};
use graphsync_api::{decrypt_fnames, encrypt_fnames};
use graphsync_crypto::ContentCrypto;

use super::{load_config, load_secret_key, PASSPHRASE_ENV};
use crate::output::{Output, OutputFormat};

#[derive(Debug, Subcommand)]
pub enum NamesCommand {
    /// Encrypt root-relative paths into remote names
    Encrypt(NamesArgs),
    /// Decrypt remote names back into paths
    Decrypt(NamesArgs),
}

#[derive(Debug, Args)]
pub struct NamesArgs {
    /// Secret key file, plain or passphrase-protected
    #[arg(long)]
    pub key_file: PathBuf,

    /// Environment variable holding the key file passphrase
    #[arg(long, default_value = PASSPHRASE_ENV)]
    pub passphrase_env: String,

    /// Names to transform
    #[arg(required = true)]
    pub names: Vec<String>,
}

impl NamesCommand {
    pub async fn execute(&self, format: OutputFormat, config_path: &Path) -> Result<()> {
        let (args, encrypt) = match self {
            NamesCommand::Encrypt(args) => (args, true),
            NamesCommand::Decrypt(args) => (args, false),
        };
        let config = load_config(config_path)?;
        let secret = load_secret_key(
            &args.key_file,
            &ContentCrypto::from_config(&config.crypto),
            &args.passphrase_env,
        )?
        .to_text();

        let output = if encrypt {
            encrypt_fnames(&secret, &args.names)?
        } else {
            decrypt_fnames(&secret, &args.names)?
        };

        let out = Output::new(format);
        if format.is_json() {
            let pairs: Vec<_> = args
                .names
                .iter()
                .zip(&output)
                .map(|(input, output)| serde_json::json!({"input": input, "output": output}))
                .collect();
            out.json(&serde_json::Value::Array(pairs));
        } else {
            for (input, output) in args.names.iter().zip(&output) {
                println!("{input}\t{output}");
            }
        }
        Ok(())
    }
}
