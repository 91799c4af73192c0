use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use super::defaults::*;

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
pub struct Config {
    #[serde(default = "default_version")]
    pub version: u32,

    /// Root holding `pending/`, `completed/` and `notify/`
    #[serde(default = "default_queue_dir")]
    pub queue_dir: PathBuf,

    #[serde(default)]
    pub watcher: WatcherConfig,

    /// How long the terminal adapter waits for a typed custom answer
    #[serde(default = "default_custom_input_ttl_sec")]
    pub custom_input_ttl_sec: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
pub struct WatcherConfig {
    /// Authoritative re-scan interval
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    /// Quiet period after a filesystem notification before re-scanning
    #[serde(default = "default_debounce_ms")]
    pub debounce_ms: u64,

    /// Use OS change notifications in addition to polling
    #[serde(default = "default_true")]
    pub fs_events: bool,
}

impl Default for WatcherConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: default_poll_interval_ms(),
            debounce_ms: default_debounce_ms(),
            fs_events: true,
        }
    }
}

impl WatcherConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }
}
