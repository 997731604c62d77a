use std::time::Duration;

use config::ConfigError;
use serde::Deserialize;
use serde::Serialize;

use super::ensure_positive;
use crate::Error;
use crate::Result;

/// Clients give up on a long poll after 90 seconds, so the server must answer first
pub const MAX_LONG_POLL_TIMEOUT_IN_MS: u64 = 90_000;

/// Long-poll notification parameters
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct LongPollConfig {
    /// How long a slot waits for a change before completing empty
    #[serde(default = "default_timeout_in_ms")]
    pub timeout_in_ms: u64,

    /// Slots completed inline per change record; larger fan-outs are
    /// completed in batches of this size on a background task
    #[serde(default = "default_notification_batch")]
    pub notification_batch: usize,

    /// Pause between two notification batches
    #[serde(default = "default_notification_batch_interval_in_ms")]
    pub notification_batch_interval_in_ms: u64,

    /// Match subjects case-insensitively
    #[serde(default)]
    pub subject_ignore_case: bool,
}

impl Default for LongPollConfig {
    fn default() -> Self {
        Self {
            timeout_in_ms: default_timeout_in_ms(),
            notification_batch: default_notification_batch(),
            notification_batch_interval_in_ms: default_notification_batch_interval_in_ms(),
            subject_ignore_case: false,
        }
    }
}

impl LongPollConfig {
    pub fn validate(&self) -> Result<()> {
        if self.timeout_in_ms < 1000 || self.timeout_in_ms > MAX_LONG_POLL_TIMEOUT_IN_MS {
            return Err(Error::Config(ConfigError::Message(format!(
                "timeout_in_ms must be within [1000, {}] (got {})",
                MAX_LONG_POLL_TIMEOUT_IN_MS, self.timeout_in_ms
            ))));
        }

        ensure_positive(self.notification_batch as u64, "notification_batch")?;
        ensure_positive(
            self.notification_batch_interval_in_ms,
            "notification_batch_interval_in_ms",
        )?;

        Ok(())
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_in_ms)
    }

    pub fn notification_batch_interval(&self) -> Duration {
        Duration::from_millis(self.notification_batch_interval_in_ms)
    }
}

fn default_timeout_in_ms() -> u64 {
    60_000
}
fn default_notification_batch() -> usize {
    100
}
fn default_notification_batch_interval_in_ms() -> u64 {
    100
}
