use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use d_config::init_sled_db;
use d_config::ChangeListener;
use d_config::ChangeRecord;
use d_config::Node;
use d_config::NodeBuilder;
use d_config::Result;
use d_config::ServiceConfig;
use d_config::SledChangeLog;
use d_config::SledSecretStore;
use parking_lot::Mutex;
use tokio::sync::watch;
use tokio::task::JoinHandle;

pub const SCAN_INTERVAL_IN_MS: u64 = 50;

pub const WAIT_FOR_NODE_READY_IN_MS: u64 = 100;

/// Keeps every record it is handed, in dispatch order
#[allow(dead_code)]
#[derive(Default)]
pub struct CollectingListener {
    records: Mutex<Vec<ChangeRecord>>,
}

impl CollectingListener {
    #[allow(dead_code)]
    pub fn ids(&self) -> Vec<u64> {
        self.records.lock().iter().map(|r| r.id).collect()
    }
}

impl ChangeListener for CollectingListener {
    fn handle(
        &self,
        record: &ChangeRecord,
        _topic: &str,
    ) -> Result<()> {
        self.records.lock().push(record.clone());
        Ok(())
    }

    fn name(&self) -> &'static str {
        "collecting"
    }
}

#[allow(dead_code)]
pub struct TestNode {
    pub node: Arc<Node<SledChangeLog, SledSecretStore>>,
    pub change_log: Arc<SledChangeLog>,
    pub secret_store: Arc<SledSecretStore>,
    pub shutdown_tx: watch::Sender<()>,
    pub running: JoinHandle<Result<()>>,
}

impl TestNode {
    pub async fn shutdown(self) -> Result<()> {
        let _ = self.shutdown_tx.send(());
        self.running.await?
    }
}

pub fn test_settings(db_root_dir: &Path) -> ServiceConfig {
    let mut settings = ServiceConfig::default();
    settings.node.enable_metrics = false;
    settings.node.db_root_dir = db_root_dir.to_path_buf();
    settings.node.log_dir = db_root_dir.join("logs");
    settings.scanner.scan_interval_in_ms = SCAN_INTERVAL_IN_MS;
    settings.secret_cache.scan_interval_in_ms = SCAN_INTERVAL_IN_MS;
    settings.long_poll.timeout_in_ms = 2_000;
    settings
}

/// Opens the sled stores under `db_root_dir`, seeds them with `seed`, then
/// builds a node over them and runs it on a background task
pub async fn start_node<F>(
    settings: ServiceConfig,
    listener: Option<Arc<dyn ChangeListener>>,
    seed: F,
) -> Result<TestNode>
where
    F: FnOnce(&SledChangeLog, &SledSecretStore) -> Result<()>,
{
    let db = init_sled_db(&settings.node.db_root_dir)?;
    let change_log = Arc::new(SledChangeLog::new(db.clone())?);
    let secret_store = Arc::new(SledSecretStore::new(&db)?);
    seed(&change_log, &secret_store)?;

    let (shutdown_tx, shutdown_rx) = watch::channel(());
    let mut builder = NodeBuilder::init(settings, shutdown_rx)
        .change_log(change_log.clone())
        .secret_store(secret_store.clone());
    if let Some(listener) = listener {
        builder = builder.listener(listener);
    }
    let node = builder.build().await?.ready()?;

    let running = {
        let node = node.clone();
        tokio::spawn(async move { node.run().await })
    };
    tokio::time::sleep(Duration::from_millis(WAIT_FOR_NODE_READY_IN_MS)).await;

    Ok(TestNode {
        node,
        change_log,
        secret_store,
        shutdown_tx,
        running,
    })
}

/// Polls `condition` every few milliseconds until it holds or `within` elapses
pub async fn eventually<F>(
    within: Duration,
    mut condition: F,
) -> bool
where
    F: FnMut() -> bool,
{
    let deadline = tokio::time::Instant::now() + within;
    while tokio::time::Instant::now() < deadline {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    condition()
}
