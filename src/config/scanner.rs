use std::time::Duration;

use config::ConfigError;
use serde::Deserialize;
use serde::Serialize;

use super::ensure_positive;
use crate::Error;
use crate::Result;

/// Lower bound of the change log scan interval
pub const MIN_SCAN_INTERVAL_IN_MS: u64 = 100;

/// Change log scanner parameters
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct ScannerConfig {
    /// Delay between the end of one scan cycle and the start of the next
    #[serde(default = "default_scan_interval_in_ms")]
    pub scan_interval_in_ms: u64,

    /// Number of records fetched per forward-scan query
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    /// Number of cycles a missing record id is looked up before it is abandoned
    #[serde(default = "default_missing_record_max_age")]
    pub missing_record_max_age: u32,

    /// Upper bound on ids tracked as missing at the same time
    #[serde(default = "default_max_missing_records")]
    pub max_missing_records: usize,
}

impl Default for ScannerConfig {
    fn default() -> Self {
        Self {
            scan_interval_in_ms: default_scan_interval_in_ms(),
            batch_size: default_batch_size(),
            missing_record_max_age: default_missing_record_max_age(),
            max_missing_records: default_max_missing_records(),
        }
    }
}

impl ScannerConfig {
    pub fn validate(&self) -> Result<()> {
        if self.scan_interval_in_ms < MIN_SCAN_INTERVAL_IN_MS {
            return Err(Error::Config(ConfigError::Message(format!(
                "scan_interval_in_ms must be at least {}ms (got {})",
                MIN_SCAN_INTERVAL_IN_MS, self.scan_interval_in_ms
            ))));
        }

        ensure_positive(self.batch_size as u64, "batch_size")?;
        ensure_positive(self.missing_record_max_age as u64, "missing_record_max_age")?;
        ensure_positive(self.max_missing_records as u64, "max_missing_records")?;

        Ok(())
    }

    pub fn scan_interval(&self) -> Duration {
        Duration::from_millis(self.scan_interval_in_ms)
    }
}

fn default_scan_interval_in_ms() -> u64 {
    1000
}
fn default_batch_size() -> usize {
    500
}
fn default_missing_record_max_age() -> u32 {
    10
}
fn default_max_missing_records() -> usize {
    10_000
}
