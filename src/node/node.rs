//! The running service node.
//!
//! ## Key Responsibilities
//! - Owns the scanner, the config cache with its watch index, the long-poll
//!   manager and the secret cache
//! - Spawns their periodic tasks on [`Node::run`] and stops them on shutdown
//! - Exposes the request-side entry points (long-poll slots, cached renders)
//!
//! ## Example Usage
//! ```ignore
//! let node = NodeBuilder::init(settings, shutdown_rx)
//!     .with_embedded_stores()?
//!     .build()
//!     .await?
//!     .ready()?;
//! tokio::spawn(async move {
//!     node.run().await.expect("node execution failed");
//! });
//! ```

use std::future::Future;
use std::sync::atomic::AtomicBool;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::info;
use tracing::warn;

use crate::assemble_watch_keys;
use crate::ChangeLogStore;
use crate::ConfigCache;
use crate::IncrementalSecretCache;
use crate::LogScanner;
use crate::LongPollManager;
use crate::Result;
use crate::SecretStore;
use crate::ServiceConfig;
use crate::SlotHandle;
use crate::WatchIndex;

pub struct Node<L, S>
where
    L: ChangeLogStore,
    S: SecretStore,
{
    pub(crate) node_id: u32,
    pub(crate) settings: Arc<ServiceConfig>,

    pub(crate) scanner: Arc<LogScanner<L>>,
    pub(crate) watch_index: Arc<WatchIndex>,
    pub(crate) config_cache: Arc<ConfigCache<String>>,
    pub(crate) long_poll: Arc<LongPollManager>,
    pub(crate) secret_cache: Arc<IncrementalSecretCache<S>>,

    pub(crate) cancel: CancellationToken,
    pub(crate) shutdown_signal: watch::Receiver<()>,
    pub(crate) handles: Mutex<Vec<JoinHandle<()>>>,
    pub(crate) ready: AtomicBool,
}

impl<L, S> std::fmt::Debug for Node<L, S>
where
    L: ChangeLogStore,
    S: SecretStore,
{
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        f.debug_struct("Node")
            .field("node_id", &self.node_id)
            .field("ready", &self.server_is_ready())
            .field("scanner", &self.scanner)
            .field("secret_cache", &self.secret_cache)
            .finish()
    }
}

impl<L, S> Node<L, S>
where
    L: ChangeLogStore,
    S: SecretStore,
{
    /// Runs the periodic tasks until the shutdown signal fires, then cancels
    /// and joins them
    pub async fn run(&self) -> Result<()> {
        self.start_tasks();
        self.set_ready(true);
        info!(node_id = self.node_id, "node is serving");

        let mut shutdown_signal = self.shutdown_signal.clone();
        // A dropped sender counts as shutdown too
        let _ = shutdown_signal.changed().await;

        self.stop().await
    }

    /// Cancels the periodic tasks and waits for them to finish
    pub async fn stop(&self) -> Result<()> {
        self.set_ready(false);
        self.cancel.cancel();

        let handles: Vec<JoinHandle<()>> = std::mem::take(&mut *self.handles.lock());
        for handle in handles {
            if let Err(e) = handle.await {
                warn!("periodic task ended abnormally: {:?}", e);
            }
        }
        info!(node_id = self.node_id, "node stopped");
        Ok(())
    }

    fn start_tasks(&self) {
        let mut handles = self.handles.lock();
        if !handles.is_empty() {
            return;
        }
        handles.push(self.scanner.start(self.settings.scanner.scan_interval()));
        handles.extend(self.secret_cache.start());
    }

    /// Opens a long-poll wait on `namespaces` of `app_id` as seen from
    /// `cluster` and `data_center`, for at most `timeout` (the configured
    /// default when `None`)
    pub fn poll_notifications(
        &self,
        app_id: &str,
        cluster: &str,
        namespaces: &[&str],
        data_center: Option<&str>,
        timeout: Option<Duration>,
    ) -> SlotHandle {
        let subjects: Vec<String> = namespaces
            .iter()
            .flat_map(|ns| assemble_watch_keys(app_id, cluster, ns, data_center))
            .collect();
        self.long_poll
            .create_slot(subjects, timeout.unwrap_or_else(|| self.long_poll.default_timeout()))
    }

    /// Rendered configuration for `cache_key`, computed by `render` on a miss
    /// and invalidated by changes to any of the namespace's watch keys
    pub async fn cached_render<F, Fut>(
        &self,
        cache_key: &str,
        app_id: &str,
        cluster: &str,
        namespace: &str,
        data_center: Option<&str>,
        render: F,
    ) -> Result<String>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<String>>,
    {
        let watch_keys = assemble_watch_keys(app_id, cluster, namespace, data_center);
        self.config_cache.get_or_load(cache_key, &watch_keys, render).await
    }

    pub fn node_id(&self) -> u32 {
        self.node_id
    }

    pub fn settings(&self) -> &ServiceConfig {
        &self.settings
    }

    pub fn scanner(&self) -> &Arc<LogScanner<L>> {
        &self.scanner
    }

    pub fn watch_index(&self) -> &Arc<WatchIndex> {
        &self.watch_index
    }

    pub fn config_cache(&self) -> &Arc<ConfigCache<String>> {
        &self.config_cache
    }

    pub fn long_poll(&self) -> &Arc<LongPollManager> {
        &self.long_poll
    }

    pub fn secret_cache(&self) -> &Arc<IncrementalSecretCache<S>> {
        &self.secret_cache
    }

    pub fn set_ready(
        &self,
        is_ready: bool,
    ) {
        self.ready.store(is_ready, Ordering::SeqCst);
    }

    pub fn server_is_ready(&self) -> bool {
        self.ready.load(Ordering::Acquire)
    }
}
