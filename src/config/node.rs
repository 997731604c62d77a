use std::path::PathBuf;

use config::ConfigError;
use serde::Deserialize;
use serde::Serialize;

use super::validate_directory;
use crate::Error;
use crate::Result;

/// Node identity and local resource settings
///
/// Field-level defaults use helper functions prefixed with `default_`.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct NodeConfig {
    /// Identifier of this config service instance, used in log paths
    ///
    /// Default: `default_node_id()` (1)
    #[serde(default = "default_node_id")]
    pub node_id: u32,

    /// Root directory of the sled-backed stores
    ///
    /// Default: `default_db_dir()` (/tmp/d-config/db)
    #[serde(default = "default_db_dir")]
    pub db_root_dir: PathBuf,

    /// Log files output directory
    ///
    /// Default: `default_log_dir()` (./logs)
    #[serde(default = "default_log_dir")]
    pub log_dir: PathBuf,

    /// Port of the prometheus `/metrics` endpoint
    #[serde(default = "default_metrics_port")]
    pub metrics_port: u16,

    /// Whether the metrics server is started at all
    #[serde(default = "default_enable_metrics")]
    pub enable_metrics: bool,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            node_id: default_node_id(),
            db_root_dir: default_db_dir(),
            log_dir: default_log_dir(),
            metrics_port: default_metrics_port(),
            enable_metrics: default_enable_metrics(),
        }
    }
}

impl NodeConfig {
    pub fn validate(&self) -> Result<()> {
        if self.node_id == 0 {
            return Err(Error::Config(ConfigError::Message(
                "node_id cannot be 0 (reserved for invalid nodes)".into(),
            )));
        }

        if self.enable_metrics && self.metrics_port == 0 {
            return Err(Error::Config(ConfigError::Message(
                "metrics_port must be a non-zero port when metrics are enabled".into(),
            )));
        }

        validate_directory(&self.db_root_dir, "db_root_dir")?;
        validate_directory(&self.log_dir, "log_dir")?;

        Ok(())
    }
}

fn default_node_id() -> u32 {
    1
}
fn default_db_dir() -> PathBuf {
    PathBuf::from("/tmp/d-config/db")
}
fn default_log_dir() -> PathBuf {
    PathBuf::from("./logs")
}
fn default_metrics_port() -> u16 {
    9100
}
fn default_enable_metrics() -> bool {
    true
}
