mod defaults;
mod types;

pub use types::*;

use crate::error::ConfigError;
use defaults::*;
use std::path::Path;
use std::time::Duration;

/// File name looked up in the working directory when `--config` is absent
pub const CONFIG_FILE: &str = "dq.yaml";

impl Default for Config {
    fn default() -> Self {
        Self {
            version: default_version(),
            queue_dir: default_queue_dir(),
            watcher: WatcherConfig::default(),
            custom_input_ttl_sec: default_custom_input_ttl_sec(),
        }
    }
}

impl Config {
    /// Load config from a YAML file
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadFile {
            path: path.to_path_buf(),
            source: e,
        })?;

        let config: Config = serde_yaml::from_str(&content)?;
        Ok(config)
    }

    /// Load `path` if it exists, otherwise fall back to defaults
    pub fn load_or_default(path: &Path) -> Result<Self, ConfigError> {
        if path.exists() {
            Self::load(path)
        } else {
            Ok(Self::default())
        }
    }

    /// Validate the config
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.version != 1 {
            return Err(ConfigError::Invalid {
                field: "version",
                reason: format!("unsupported version {}", self.version),
            });
        }

        if self.watcher.poll_interval_ms == 0 {
            return Err(ConfigError::Invalid {
                field: "watcher.poll_interval_ms",
                reason: "must be greater than zero".to_string(),
            });
        }

        if self.queue_dir.as_os_str().is_empty() {
            return Err(ConfigError::Invalid {
                field: "queue_dir",
                reason: "must not be empty".to_string(),
            });
        }

        Ok(())
    }

    pub fn custom_input_ttl(&self) -> Duration {
        Duration::from_secs(self.custom_input_ttl_sec)
    }

    /// YAML written by `dq init`
    pub fn to_yaml(&self) -> Result<String, ConfigError> {
        Ok(serde_yaml::to_string(self)?)
    }
}
