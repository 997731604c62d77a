// -
// Topics

/// Topic every change record is published under
pub const RELEASE_TOPIC: &str = "config-release";

// -
// Watch keys

/// Separator between the segments of a watch key (`app+cluster+namespace`)
pub const WATCH_KEY_SEPARATOR: &str = "+";

/// Cluster every client implicitly falls back to
pub const DEFAULT_CLUSTER_NAME: &str = "default";

/// Namespace suffix stripped during subject normalization
pub(crate) const PROPERTIES_SUFFIX: &str = ".properties";

// -
// Secret cache

/// Page size of the incremental secret scan
pub const SECRET_SCAN_PAGE_SIZE: usize = 500;

// -
// Sled tree namespaces

pub(crate) const CHANGE_LOG_TREE: &str = "_change_log";
pub(crate) const SECRET_TREE: &str = "_secrets";
pub(crate) const SECRET_MODIFIED_INDEX_TREE: &str = "_secrets_by_last_modified";
