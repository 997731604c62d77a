//! Configuration management for the config-service change propagation core.
//!
//! Provides hierarchical configuration loading and validation with:
//! - Default values as code base
//! - Configuration file support (`CONFIG_PATH`)
//! - Environment variable overrides (`DCONFIG__` prefix, highest priority)
//! - Component-wise validation
mod cache;
mod long_poll;
mod node;
mod retry;
mod scanner;
pub use cache::*;
pub use long_poll::*;
pub use node::*;
pub use retry::*;
pub use scanner::*;


use std::env;
use std::fmt::Debug;
use std::path::Path;

use config::Config;
use config::ConfigError;
use config::Environment;
use config::File;
use serde::Deserialize;
use serde::Serialize;

use crate::Error;
use crate::Result;

/// Environment variable prefix, e.g. `DCONFIG__SCANNER__BATCH_SIZE=200`
const ENV_PREFIX: &str = "DCONFIG";

/// Main configuration container for the service components
///
/// Combines all subsystem configurations with hierarchical override support:
/// 1. Default values from code implementation
/// 2. Configuration file specified by `CONFIG_PATH`
/// 3. Environment variables (highest priority)
#[derive(Serialize, Deserialize, Clone, Default)]
pub struct ServiceConfig {
    /// Node identity, storage and observability paths
    #[serde(default)]
    pub node: NodeConfig,
    /// Change log scanner parameters
    #[serde(default)]
    pub scanner: ScannerConfig,
    /// Long-poll notification parameters
    #[serde(default)]
    pub long_poll: LongPollConfig,
    /// Rendered configuration cache parameters
    #[serde(default)]
    pub config_cache: ConfigCacheConfig,
    /// Incremental secret cache parameters
    #[serde(default)]
    pub secret_cache: SecretCacheConfig,
    /// Retry policies for startup store reads
    #[serde(default)]
    pub retry: RetryPolicies,
}

impl Debug for ServiceConfig {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        f.debug_struct("ServiceConfig")
            .field("node", &self.node)
            .field("scanner", &self.scanner)
            .finish_non_exhaustive()
    }
}

impl ServiceConfig {
    /// Loads configuration from hierarchical sources without validation.
    ///
    /// Configuration sources are merged in the following order (later sources override earlier):
    /// 1. Type defaults (lowest priority)
    /// 2. Configuration file from `CONFIG_PATH` environment variable (if set)
    /// 3. Environment variables with `DCONFIG__` prefix (highest priority)
    ///
    /// # Note
    /// This method does NOT validate the configuration. Callers MUST call `validate()`
    /// before using the configuration.
    pub fn new() -> Result<Self> {
        let mut builder = Config::builder().add_source(Config::try_from(&Self::default())?);

        if let Ok(config_path) = env::var("CONFIG_PATH") {
            builder = builder.add_source(File::with_name(&config_path).required(true));
        }

        builder = builder.add_source(env_source());

        let config: Self = builder.build()?.try_deserialize()?;
        Ok(config)
    }

    /// Applies additional configuration overrides from file without validation.
    ///
    /// Merging order (later sources override earlier):
    /// 1. Current configuration values
    /// 2. New configuration file
    /// 3. Latest environment variables (highest priority)
    pub fn with_override_config(
        &self,
        path: &str,
    ) -> Result<Self> {
        let config: Self = Config::builder()
            .add_source(Config::try_from(self)?)
            .add_source(File::with_name(path))
            .add_source(env_source())
            .build()?
            .try_deserialize()?;
        Ok(config)
    }

    /// Validates configuration and returns validated instance.
    ///
    /// Consumes self and performs validation of all subsystems. Must be called
    /// after all configuration overrides.
    pub fn validate(self) -> Result<Self> {
        self.node.validate()?;
        self.scanner.validate()?;
        self.long_poll.validate()?;
        self.config_cache.validate()?;
        self.secret_cache.validate()?;
        self.retry.validate()?;
        Ok(self)
    }
}

fn env_source() -> Environment {
    Environment::with_prefix(ENV_PREFIX)
        .separator("__")
        .ignore_empty(true)
        .try_parsing(true)
}

/// Ensures directory path is valid and writable
pub(super) fn validate_directory(
    path: &Path,
    name: &str,
) -> Result<()> {
    if path.as_os_str().is_empty() {
        return Err(Error::Config(ConfigError::Message(format!(
            "{name} path cannot be empty"
        ))));
    }

    #[cfg(not(test))]
    {
        use std::fs;
        // Check directory existence or create ability
        if !path.exists() {
            fs::create_dir_all(path).map_err(|e| {
                Error::Config(ConfigError::Message(format!(
                    "Failed to create {} directory at {}: {}",
                    name,
                    path.display(),
                    e
                )))
            })?;
        }

        // Check write permissions
        let test_file = path.join(".permission_test");
        fs::write(&test_file, b"test").map_err(|e| {
            Error::Config(ConfigError::Message(format!(
                "No write permission in {} directory {}: {}",
                name,
                path.display(),
                e
            )))
        })?;
        fs::remove_file(&test_file).ok();
    }

    Ok(())
}

/// Rejects zero-valued intervals and sizes
pub(super) fn ensure_positive(
    value: u64,
    name: &str,
) -> Result<()> {
    if value == 0 {
        return Err(Error::Config(ConfigError::Message(format!(
            "{name} must be greater than 0"
        ))));
    }
    Ok(())
}
