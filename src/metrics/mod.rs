use autometrics::prometheus_exporter;
use lazy_static::lazy_static;
use prometheus::IntCounter;
use prometheus::IntCounterVec;
use prometheus::IntGauge;
use prometheus::Opts;
use prometheus::Registry;
use tokio::sync::watch;
use tracing::warn;
use warp::Filter;
use warp::Rejection;
use warp::Reply;


lazy_static! {
    pub static ref SCANNED_RECORDS: IntCounter =
        IntCounter::new("scanned_change_records", "Change records dispatched to listeners")
            .expect("metric can not be created");

    pub static ref HIGH_WATER_MARK: IntGauge =
        IntGauge::new("change_log_high_water_mark", "Largest change record id observed")
            .expect("metric can not be created");

    pub static ref MISSING_RECORDS: IntGauge =
        IntGauge::new("missing_change_records", "Change record ids tracked as missing")
            .expect("metric can not be created");

    pub static ref ABANDONED_RECORDS: IntCounter = IntCounter::new(
        "abandoned_change_records",
        "Missing change record ids given up after the age ceiling"
    )
    .expect("metric can not be created");

    pub static ref LISTENER_FAILURES: IntCounterVec = IntCounterVec::new(
        Opts::new("change_listener_failures", "Change listener errors and panics"),
        &["listener"]
    )
    .expect("metric can not be created");

    pub static ref LONG_POLL_PENDING: IntGauge =
        IntGauge::new("long_poll_pending_slots", "Long-poll slots waiting for a change")
            .expect("metric can not be created");

    pub static ref LONG_POLL_OUTCOMES: IntCounterVec = IntCounterVec::new(
        Opts::new("long_poll_outcomes", "Terminal transitions of long-poll slots"),
        &["outcome"]
    )
    .expect("metric can not be created");

    pub static ref WATCH_INDEX_EDGES: IntGauge =
        IntGauge::new("watch_index_edges", "Watch key to cache key edges")
            .expect("metric can not be created");

    pub static ref CACHE_INVALIDATIONS: IntCounter =
        IntCounter::new("config_cache_invalidations", "Rendered cache entries evicted")
            .expect("metric can not be created");

    pub static ref SECRET_CACHE_ENTRIES: IntGauge =
        IntGauge::new("secret_cache_entries", "Secrets held by the incremental cache")
            .expect("metric can not be created");

    pub static ref PERIODIC_TASK_FAILURES: IntCounterVec = IntCounterVec::new(
        Opts::new("periodic_task_failures", "Failed or panicked periodic cycles"),
        &["task"]
    )
    .expect("metric can not be created");

    pub static ref REGISTRY: Registry = Registry::new();
}

/// Registers every collector of this crate into `registry`.
/// Collectors already present are skipped with a warning.
pub fn register_custom_metrics(registry: &Registry) {
    let collectors: Vec<Box<dyn prometheus::core::Collector>> = vec![
        Box::new(SCANNED_RECORDS.clone()),
        Box::new(HIGH_WATER_MARK.clone()),
        Box::new(MISSING_RECORDS.clone()),
        Box::new(ABANDONED_RECORDS.clone()),
        Box::new(LISTENER_FAILURES.clone()),
        Box::new(LONG_POLL_PENDING.clone()),
        Box::new(LONG_POLL_OUTCOMES.clone()),
        Box::new(WATCH_INDEX_EDGES.clone()),
        Box::new(CACHE_INVALIDATIONS.clone()),
        Box::new(SECRET_CACHE_ENTRIES.clone()),
        Box::new(PERIODIC_TASK_FAILURES.clone()),
    ];

    for collector in collectors {
        if let Err(e) = registry.register(collector) {
            warn!("collector can not be registered: {}", e);
        }
    }
}

pub async fn start_server(
    port: u16,
    mut shutdown_signal: watch::Receiver<()>,
) {
    register_custom_metrics(&REGISTRY);
    if let Err(e) = prometheus_exporter::try_init() {
        warn!("autometrics exporter already initialized: {:?}", e);
    }

    let metrics_route = warp::path!("metrics").and_then(metrics_handler);

    let (_, server) =
        warp::serve(metrics_route).bind_with_graceful_shutdown(([0, 0, 0, 0], port), async move {
            let _ = shutdown_signal.changed().await;
        });
    server.await;
}

async fn metrics_handler() -> Result<impl Reply, Rejection> {
    let mut res = encode_registry(&REGISTRY);
    res.push_str(&get_metrics_body());
    Ok(res)
}

/// Renders a registry in the prometheus text format
pub fn encode_registry(registry: &Registry) -> String {
    use prometheus::Encoder;
    let encoder = prometheus::TextEncoder::new();

    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&registry.gather(), &mut buffer) {
        warn!("could not encode custom metrics: {}", e);
    };
    String::from_utf8(buffer).unwrap_or_else(|e| {
        warn!("custom metrics could not be from_utf8'd: {}", e);
        String::default()
    })
}

/// Export autometrics function metrics for Prometheus to scrape
pub fn get_metrics_body() -> String {
    prometheus_exporter::encode_to_string().unwrap_or_default()
}
