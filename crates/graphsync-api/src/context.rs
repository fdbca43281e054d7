//! Process-wide sync context
//!
//! Everything that is ambient for a host binding lives here, behind one
//! object with explicit mutation points:
//!
//! - network settings (environment, proxy), applied to requests issued
//!   after the change
//! - the active cancellation token, replaced after every cancel
//! - the progress hub and its single registered callback
//! - per-graph state (canonical root, ack ledger) and per-graph keys

use std::path::Path;
use std::sync::{Arc, Mutex, OnceLock, PoisonError, RwLock};

use anyhow::Context;
use dashmap::DashMap;
use graphsync_core::config::{Config, Environment, RemoteConfig};
use graphsync_core::domain::{
    AuthToken, BatchReport, CanonicalPath, GraphId, PathOutcome, RelativePath, SyncError,
};
use graphsync_core::ports::{IRemoteStore, RemoteContext};
use graphsync_crypto::{ContentCrypto, EncryptionContext};
use graphsync_remote::{validate_proxy, RemoteClient};
use graphsync_sync::{
    canonicalize_root, AckLedger, GraphSession, LocalMetadataStore, ProgressCallback,
    ProgressHub, TransferCoordinator,
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Builds the remote store for the current network settings
pub type RemoteFactory = Arc<
    dyn Fn(&RemoteConfig, Environment, Option<&str>) -> anyhow::Result<Arc<dyn IRemoteStore>>
        + Send
        + Sync,
>;

static GLOBAL: OnceLock<SyncContext> = OnceLock::new();

/// Initialize the process-wide context, or return the existing one
///
/// # Errors
/// Returns an error if the context cannot be built from `config`
pub fn init_global(config: Config) -> anyhow::Result<&'static SyncContext> {
    if let Some(ctx) = GLOBAL.get() {
        return Ok(ctx);
    }
    let ctx = SyncContext::new(config)?;
    Ok(GLOBAL.get_or_init(|| ctx))
}

/// The process-wide context, if [`init_global`] has run
pub fn global() -> Option<&'static SyncContext> {
    GLOBAL.get()
}

#[derive(Debug, Clone, Default)]
struct NetworkSettings {
    environment: Environment,
    proxy: Option<String>,
}

/// Local state of one graph
#[derive(Debug)]
pub struct GraphState {
    pub root: CanonicalPath,
    pub ledger: Arc<AckLedger>,
}

pub struct SyncContext {
    pub(crate) config: Config,
    network: RwLock<NetworkSettings>,
    factory: RemoteFactory,
    coordinator: RwLock<TransferCoordinator>,
    graphs: DashMap<GraphId, Arc<GraphState>>,
    keys: DashMap<GraphId, Arc<EncryptionContext>>,
    cancel: Mutex<CancellationToken>,
    progress: ProgressHub,
    pub(crate) crypto: ContentCrypto,
}

impl SyncContext {
    /// Context talking to the configured backend over HTTP
    ///
    /// # Errors
    /// Returns an error for invalid configuration or proxy settings
    pub fn new(config: Config) -> anyhow::Result<Self> {
        Self::with_remote_factory(
            config,
            Arc::new(
                |cfg: &RemoteConfig,
                 env: Environment,
                 proxy: Option<&str>|
                 -> anyhow::Result<Arc<dyn IRemoteStore>> {
                    Ok(Arc::new(RemoteClient::new(cfg, env, proxy)?))
                },
            ),
        )
    }

    /// Context whose remote store is produced by `factory`
    ///
    /// # Errors
    /// Returns an error for invalid configuration, or if the factory or
    /// the progress thread fail
    pub fn with_remote_factory(config: Config, factory: RemoteFactory) -> anyhow::Result<Self> {
        let problems = config.validate();
        if !problems.is_empty() {
            let joined: Vec<String> = problems.iter().map(ToString::to_string).collect();
            anyhow::bail!("Invalid configuration: {}", joined.join("; "));
        }

        let network = NetworkSettings {
            environment: config.remote.environment,
            proxy: config.remote.proxy.clone().filter(|p| !p.is_empty()),
        };
        let remote = factory(&config.remote, network.environment, network.proxy.as_deref())?;
        let progress = ProgressHub::new().context("Failed to start progress dispatch thread")?;
        let store = LocalMetadataStore::new(&config.sync)?;
        let coordinator = TransferCoordinator::new(
            remote,
            store,
            Arc::new(progress.sender()),
            config.sync.max_concurrent_transfers,
        );
        info!(
            environment = %network.environment,
            max_concurrent = config.sync.max_concurrent_transfers,
            "Sync context initialized"
        );

        Ok(Self {
            crypto: ContentCrypto::from_config(&config.crypto),
            config,
            network: RwLock::new(network),
            factory,
            coordinator: RwLock::new(coordinator),
            graphs: DashMap::new(),
            keys: DashMap::new(),
            cancel: Mutex::new(CancellationToken::new()),
            progress,
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn environment(&self) -> Environment {
        self.network
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .environment
    }

    pub fn proxy(&self) -> Option<String> {
        self.network
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .proxy
            .clone()
    }

    // ========================================================================
    // Ambient settings
    // ========================================================================

    /// Register the progress callback, replacing any previous one
    pub fn set_progress_callback(&self, callback: Option<ProgressCallback>) {
        debug!(registered = callback.is_some(), "Progress callback updated");
        self.progress.set_callback(callback);
    }

    /// Cancel every in-flight request
    ///
    /// Requests issued afterwards get a fresh token and are unaffected.
    pub fn cancel_all_requests(&self) {
        let mut token = self.cancel.lock().unwrap_or_else(PoisonError::into_inner);
        token.cancel();
        *token = CancellationToken::new();
        info!("Cancelled all pending requests");
    }

    /// Route subsequent requests through an HTTPS proxy; `None` or empty clears it
    ///
    /// # Errors
    /// `InvalidArgument` when the URL is not a usable proxy
    pub fn set_proxy(&self, proxy: Option<&str>) -> Result<(), SyncError> {
        let proxy = proxy.filter(|p| !p.is_empty());
        if let Some(url) = proxy {
            validate_proxy(url).map_err(|e| SyncError::InvalidArgument(format!("{e:#}")))?;
        }
        let mut network = self.network.write().unwrap_or_else(PoisonError::into_inner);
        self.rebuild_remote(network.environment, proxy)?;
        network.proxy = proxy.map(str::to_string);
        info!(proxy = ?network.proxy, "Proxy updated");
        Ok(())
    }

    /// Select the backend environment and install a graph's keys
    ///
    /// Pending requests are cancelled since they were issued under the
    /// previous settings.
    ///
    /// # Errors
    /// `InvalidArgument` for a malformed graph id or unknown environment,
    /// `Crypto` for malformed or mismatched keys
    pub fn set_env(
        &self,
        graph_id: &str,
        env: &str,
        secret_key: &str,
        public_key: &str,
    ) -> Result<(), SyncError> {
        let graph_id = parse_graph_id(graph_id)?;
        let environment: Environment = env.parse()?;
        let crypto = EncryptionContext::from_text(secret_key, public_key)?;

        {
            let mut network = self.network.write().unwrap_or_else(PoisonError::into_inner);
            if network.environment != environment {
                self.rebuild_remote(environment, network.proxy.as_deref())?;
                network.environment = environment;
            }
        }
        self.keys.insert(graph_id, Arc::new(crypto));
        info!(graph_id = %graph_id, environment = %environment, "Environment set");

        self.cancel_all_requests();
        Ok(())
    }

    fn rebuild_remote(&self, env: Environment, proxy: Option<&str>) -> Result<(), SyncError> {
        let remote = (self.factory)(&self.config.remote, env, proxy)
            .map_err(|e| SyncError::InvalidArgument(format!("{e:#}")))?;
        let mut coordinator = self
            .coordinator
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        *coordinator = coordinator.with_remote(remote);
        Ok(())
    }

    // ========================================================================
    // Per-call resolution
    // ========================================================================

    /// Snapshot of the coordinator for the current network settings
    pub(crate) fn coordinator(&self) -> TransferCoordinator {
        self.coordinator
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub(crate) fn cancel_token(&self) -> CancellationToken {
        self.cancel
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Resolve or lazily create the state for a graph
    ///
    /// # Errors
    /// `InvalidArgument` for a malformed id, a root that is not a directory,
    /// or a root different from the one the graph was first used with
    pub fn graph(&self, graph_id: &str, root: &Path) -> Result<(GraphId, Arc<GraphState>), SyncError> {
        let graph_id = parse_graph_id(graph_id)?;
        let root = canonicalize_root(root)?;

        let state = self
            .graphs
            .entry(graph_id)
            .or_insert_with(|| {
                debug!(graph_id = %graph_id, root = %root, "Registered graph");
                Arc::new(GraphState {
                    root: root.clone(),
                    ledger: Arc::new(AckLedger::new()),
                })
            })
            .clone();

        if state.root != root {
            return Err(SyncError::InvalidArgument(format!(
                "graph {graph_id} is bound to {}, not {root}",
                state.root
            )));
        }
        Ok((graph_id, state))
    }

    /// Everything a remote operation on `graph_id` needs
    ///
    /// # Errors
    /// As [`SyncContext::graph`], plus `InvalidArgument` when no keys were
    /// installed for the graph
    pub(crate) fn session(&self, graph_id: &str, root: &Path, token: &str) -> Result<GraphSession, SyncError> {
        let (graph_id, state) = self.graph(graph_id, root)?;
        let crypto = self
            .keys
            .get(&graph_id)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| {
                warn!(graph_id = %graph_id, "Remote operation before keys were set");
                SyncError::InvalidArgument(format!("no keys set for graph {graph_id}"))
            })?;

        Ok(GraphSession {
            graph_id,
            root: state.root.clone(),
            crypto,
            ledger: state.ledger.clone(),
            remote: RemoteContext::new(graph_id, AuthToken::new(token), self.cancel_token()),
        })
    }
}

pub(crate) fn parse_graph_id(graph_id: &str) -> Result<GraphId, SyncError> {
    graph_id
        .parse()
        .map_err(|_| SyncError::InvalidArgument(format!("malformed graph id '{graph_id}'")))
}

/// Caller-supplied paths, validated one at a time
///
/// A malformed entry fails only its own slot. The engine runs over
/// [`valid`](Self::valid) and its results are laid back out in request order.
pub(crate) struct RequestedPaths {
    entries: Vec<(String, Result<RelativePath, SyncError>)>,
}

impl RequestedPaths {
    pub(crate) fn parse<S: AsRef<str>>(paths: &[S]) -> Self {
        let entries = paths
            .iter()
            .map(|raw| {
                let raw = raw.as_ref().to_string();
                let parsed = RelativePath::new(&raw).map_err(SyncError::from);
                if let Err(e) = &parsed {
                    warn!(path = %raw, error = %e, "Rejecting malformed path");
                }
                (raw, parsed)
            })
            .collect();
        Self { entries }
    }

    /// The well-formed paths with their request index
    pub(crate) fn valid_indexed(&self) -> impl Iterator<Item = (usize, &RelativePath)> {
        self.entries
            .iter()
            .enumerate()
            .filter_map(|(i, (_, parsed))| parsed.as_ref().ok().map(|p| (i, p)))
    }

    /// The well-formed paths, in request order
    pub(crate) fn valid(&self) -> Vec<RelativePath> {
        self.valid_indexed().map(|(_, p)| p.clone()).collect()
    }

    /// Spread one value per valid path back over every requested slot
    ///
    /// A valid slot left without a value comes back `None`.
    pub(crate) fn expand<T>(
        &self,
        values: impl IntoIterator<Item = T>,
        mut rejected: impl FnMut(&SyncError) -> T,
    ) -> Vec<Option<T>> {
        let mut values = values.into_iter();
        self.entries
            .iter()
            .map(|(_, parsed)| match parsed {
                Ok(_) => values.next(),
                Err(e) => Some(rejected(e)),
            })
            .collect()
    }

    /// Report every requested path under the name the caller gave it
    pub(crate) fn report<T>(&self, report: BatchReport<T>) -> BatchReport<T, String> {
        let results = self.expand(report.items.into_iter().map(|o| o.result), |e| {
            Err(e.clone())
        });
        self.entries
            .iter()
            .zip(results)
            .map(|((raw, _), result)| PathOutcome {
                path: raw.clone(),
                result: result
                    .unwrap_or_else(|| Err(SyncError::Io(format!("no result for {raw}")))),
            })
            .collect()
    }
}
