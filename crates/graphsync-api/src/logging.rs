//! Logging bootstrap for embedding hosts

use graphsync_core::config::LoggingConfig;
use tracing_subscriber::EnvFilter;

/// Install a global `tracing` subscriber built from `cfg`
///
/// `RUST_LOG` overrides the configured level. Returns `false` when a
/// subscriber was already installed, which makes repeated calls harmless.
pub fn init_logging(cfg: &LoggingConfig) -> bool {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&cfg.level));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false);

    let installed = if cfg.format == "json" {
        builder.json().try_init()
    } else {
        builder.try_init()
    };
    installed.is_ok()
}
