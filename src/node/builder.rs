//! A builder pattern implementation for constructing a [`Node`] instance.
//!
//! The [`NodeBuilder`] assembles the change propagation core around a change
//! log store and a secret store:
//!
//! - **Stores**: either the embedded sled stores under `db_root_dir/<node_id>`
//!   ([`NodeBuilder::with_embedded_stores`]) or any [`ChangeLogStore`] /
//!   [`SecretStore`] given through the setters.
//! - **Listeners**: the config cache and the long-poll manager are always
//!   registered on the scanner, in that order; extra listeners follow.
//! - **Lifecycle**:
//!   - `build()`: wires the components and runs the startup reads (newest change id, initial secret
//!     load) with the startup retry policy.
//!   - `start_metrics_server()`: launches the Prometheus endpoint.
//!   - `ready()`: returns the initialized [`Node`].
//!
//! ## Example
//! ```ignore
//! let (shutdown_tx, shutdown_rx) = watch::channel(());
//! let node = NodeBuilder::init(settings, shutdown_rx)
//!     .with_embedded_stores()?
//!     .build()
//!     .await?
//!     .start_metrics_server(shutdown_tx.subscribe())
//!     .ready()?;
//! node.run().await?;
//! ```

use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::debug;
use tracing::info;

use crate::async_task::spawn_task;
use crate::init_sled_db;
use crate::metrics;
use crate::ChangeListener;
use crate::ChangeLogStore;
use crate::ConfigCache;
use crate::IncrementalSecretCache;
use crate::LogScanner;
use crate::LongPollManager;
use crate::Node;
use crate::Result;
use crate::SecretStore;
use crate::ServiceConfig;
use crate::SledChangeLog;
use crate::SledSecretStore;
use crate::SystemError;
use crate::WatchIndex;

/// Builder for a [`Node`] over change log store `L` and secret store `S`
pub struct NodeBuilder<L, S>
where
    L: ChangeLogStore,
    S: SecretStore,
{
    node_id: u32,
    pub(super) settings: ServiceConfig,
    pub(super) change_log: Option<Arc<L>>,
    pub(super) secret_store: Option<Arc<S>>,
    pub(super) listeners: Vec<Arc<dyn ChangeListener>>,
    pub(super) shutdown_signal: watch::Receiver<()>,

    pub(super) node: Option<Arc<Node<L, S>>>,
}

impl NodeBuilder<SledChangeLog, SledSecretStore> {
    /// Creates a NodeBuilder with settings loaded from the environment and,
    /// if given, an override file
    pub fn new(
        config_path: Option<&str>,
        shutdown_signal: watch::Receiver<()>,
    ) -> Result<Self> {
        let mut settings = ServiceConfig::new()?;
        if let Some(p) = config_path {
            info!("with_override_config from: {}", &p);
            settings = settings.with_override_config(p)?;
        }
        Ok(Self::init(settings.validate()?, shutdown_signal))
    }

    /// Core initialization logic shared by all construction paths
    pub fn init(
        settings: ServiceConfig,
        shutdown_signal: watch::Receiver<()>,
    ) -> Self {
        Self {
            node_id: settings.node.node_id,
            settings,
            change_log: None,
            secret_store: None,
            listeners: Vec::new(),
            shutdown_signal,
            node: None,
        }
    }

    /// Opens both stores in the embedded database under `db_root_dir/<node_id>`
    pub fn with_embedded_stores(mut self) -> Result<Self> {
        let db_root_dir = self.settings.node.db_root_dir.join(self.node_id.to_string());
        let db = init_sled_db(&db_root_dir)?;
        self.change_log = Some(Arc::new(SledChangeLog::new(db.clone())?));
        self.secret_store = Some(Arc::new(SledSecretStore::new(&db)?));
        Ok(self)
    }
}

impl<L, S> NodeBuilder<L, S>
where
    L: ChangeLogStore,
    S: SecretStore,
{
    /// Sets the change log store the scanner polls
    pub fn change_log<L2>(
        self,
        change_log: Arc<L2>,
    ) -> NodeBuilder<L2, S>
    where
        L2: ChangeLogStore,
    {
        NodeBuilder {
            node_id: self.node_id,
            settings: self.settings,
            change_log: Some(change_log),
            secret_store: self.secret_store,
            listeners: self.listeners,
            shutdown_signal: self.shutdown_signal,
            node: None,
        }
    }

    /// Sets the secret store the secret cache mirrors
    pub fn secret_store<S2>(
        self,
        secret_store: Arc<S2>,
    ) -> NodeBuilder<L, S2>
    where
        S2: SecretStore,
    {
        NodeBuilder {
            node_id: self.node_id,
            settings: self.settings,
            change_log: self.change_log,
            secret_store: Some(secret_store),
            listeners: self.listeners,
            shutdown_signal: self.shutdown_signal,
            node: None,
        }
    }

    /// Registers an additional change listener after the built-in ones
    pub fn listener(
        mut self,
        listener: Arc<dyn ChangeListener>,
    ) -> Self {
        self.listeners.push(listener);
        self
    }

    /// Replaces the entire service configuration
    pub fn settings(
        mut self,
        settings: ServiceConfig,
    ) -> Self {
        self.node_id = settings.node.node_id;
        self.settings = settings;
        self
    }

    /// Wires the components and runs the startup reads.
    ///
    /// # Errors
    /// `SystemError::NodeStartFailed` when a store was not provided; the last
    /// store error once the startup retry policy is exhausted.
    pub async fn build(mut self) -> Result<Self> {
        let change_log = self
            .change_log
            .take()
            .ok_or_else(|| SystemError::NodeStartFailed("change log store not set".to_string()))?;
        let secret_store = self
            .secret_store
            .take()
            .ok_or_else(|| SystemError::NodeStartFailed("secret store not set".to_string()))?;

        let settings = Arc::new(self.settings.clone());
        let cancel = CancellationToken::new();

        let scanner = Arc::new(LogScanner::new(change_log, &settings.scanner, cancel.clone()));
        let watch_index = Arc::new(WatchIndex::new());
        let config_cache = Arc::new(ConfigCache::new(watch_index.clone(), &settings.config_cache));
        let long_poll = Arc::new(LongPollManager::new(settings.long_poll.clone()));
        let secret_cache = Arc::new(IncrementalSecretCache::new(
            secret_store,
            settings.secret_cache.clone(),
            cancel.clone(),
        ));

        // Caches drop stale entries before waiting clients are told to re-fetch
        scanner.add_listener(config_cache.clone());
        scanner.add_listener(long_poll.clone());
        for listener in self.listeners.drain(..) {
            scanner.add_listener(listener);
        }

        scanner.initialize(settings.retry.startup).await?;
        secret_cache.initialize(settings.retry.startup).await?;

        debug!(node_id = self.node_id, "node components built");
        self.node = Some(Arc::new(Node {
            node_id: self.node_id,
            settings,
            scanner,
            watch_index,
            config_cache,
            long_poll,
            secret_cache,
            cancel,
            shutdown_signal: self.shutdown_signal.clone(),
            handles: Mutex::new(Vec::new()),
            ready: AtomicBool::new(false),
        }));
        Ok(self)
    }

    /// Starts the metrics server for monitoring node operations.
    ///
    /// Launches a Prometheus endpoint on the configured port unless metrics
    /// are disabled.
    pub fn start_metrics_server(
        self,
        shutdown_signal: watch::Receiver<()>,
    ) -> Self {
        if !self.settings.node.enable_metrics {
            debug!("metrics server disabled");
            return self;
        }
        let port = self.settings.node.metrics_port;
        info!(port, "start metrics server");
        spawn_task(
            "metrics_server",
            move || async move {
                metrics::start_server(port, shutdown_signal).await;
                Ok(())
            },
            None,
        );
        self
    }

    /// Returns the built node instance after successful construction.
    ///
    /// # Errors
    /// Returns `SystemError::NodeStartFailed` if build hasn't completed
    pub fn ready(self) -> Result<Arc<Node<L, S>>> {
        self.node
            .ok_or_else(|| SystemError::NodeStartFailed("check node ready failed".to_string()).into())
    }
}
