use std::time::Duration;

use serde::Deserialize;
use serde::Serialize;

use super::ensure_positive;
use crate::Result;

/// Rendered configuration cache parameters
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct ConfigCacheConfig {
    /// Whether rendered responses are cached at all
    #[serde(default = "default_cache_enabled")]
    pub enabled: bool,

    /// Case-fold cache keys and watch keys before indexing them
    #[serde(default)]
    pub key_ignore_case: bool,
}

impl Default for ConfigCacheConfig {
    fn default() -> Self {
        Self {
            enabled: default_cache_enabled(),
            key_ignore_case: false,
        }
    }
}

impl ConfigCacheConfig {
    pub fn validate(&self) -> Result<()> {
        Ok(())
    }
}

fn default_cache_enabled() -> bool {
    true
}

/// Incremental secret cache parameters
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct SecretCacheConfig {
    /// Delay between incremental refresh cycles
    #[serde(default = "default_scan_interval_in_ms")]
    pub scan_interval_in_ms: u64,

    /// Period of the full reconciliation against the store
    #[serde(default = "default_rebuild_interval_in_ms")]
    pub rebuild_interval_in_ms: u64,

    /// Number of cached ids checked per reconciliation query
    #[serde(default = "default_reconcile_batch_size")]
    pub reconcile_batch_size: usize,
}

impl Default for SecretCacheConfig {
    fn default() -> Self {
        Self {
            scan_interval_in_ms: default_scan_interval_in_ms(),
            rebuild_interval_in_ms: default_rebuild_interval_in_ms(),
            reconcile_batch_size: default_reconcile_batch_size(),
        }
    }
}

impl SecretCacheConfig {
    pub fn validate(&self) -> Result<()> {
        ensure_positive(self.scan_interval_in_ms, "secret_cache.scan_interval_in_ms")?;
        ensure_positive(self.rebuild_interval_in_ms, "secret_cache.rebuild_interval_in_ms")?;
        ensure_positive(
            self.reconcile_batch_size as u64,
            "secret_cache.reconcile_batch_size",
        )?;
        Ok(())
    }

    pub fn scan_interval(&self) -> Duration {
        Duration::from_millis(self.scan_interval_in_ms)
    }

    pub fn rebuild_interval(&self) -> Duration {
        Duration::from_millis(self.rebuild_interval_in_ms)
    }
}

fn default_scan_interval_in_ms() -> u64 {
    1000
}
fn default_rebuild_interval_in_ms() -> u64 {
    20_000
}
fn default_reconcile_batch_size() -> usize {
    500
}
