use crate::constants::DEFAULT_CLUSTER_NAME;
use crate::constants::WATCH_KEY_SEPARATOR;

/// `app+cluster+namespace`
pub fn watch_key(
    app_id: &str,
    cluster: &str,
    namespace: &str,
) -> String {
    [app_id, cluster, namespace].join(WATCH_KEY_SEPARATOR)
}

/// Watch keys a client of `cluster` (optionally located in `data_center`)
/// must watch for `namespace`: its own cluster, its data center, then the
/// default cluster it falls back to. No duplicates.
pub fn assemble_watch_keys(
    app_id: &str,
    cluster: &str,
    namespace: &str,
    data_center: Option<&str>,
) -> Vec<String> {
    let mut keys = Vec::with_capacity(3);

    if cluster != DEFAULT_CLUSTER_NAME {
        keys.push(watch_key(app_id, cluster, namespace));
    }

    if let Some(dc) = data_center.filter(|dc| !dc.is_empty()) {
        if dc != cluster && dc != DEFAULT_CLUSTER_NAME {
            keys.push(watch_key(app_id, dc, namespace));
        }
    }

    keys.push(watch_key(app_id, DEFAULT_CLUSTER_NAME, namespace));
    keys
}
