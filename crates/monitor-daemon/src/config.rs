//! Configuration loading and management

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

/// Main configuration for the monitor daemon
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Config {
    /// Paths monitored by the previous session (files or folders)
    #[serde(default)]
    pub predictions: Vec<PathBuf>,

    /// JSON baseline of previously persisted items
    #[serde(default)]
    pub baseline_file: Option<PathBuf>,

    /// Where the status store is persisted between runs
    #[serde(default)]
    pub state_file: Option<PathBuf>,

    /// How long a rename-from waits for its rename-to before it counts as a delete
    #[serde(default = "default_rename_window_ms")]
    pub rename_window_ms: u64,

    /// Interval between status store snapshots (default: 30 seconds)
    #[serde(default = "default_persist_interval_secs")]
    pub persist_interval_secs: u64,
}

fn default_rename_window_ms() -> u64 {
    500
}

fn default_persist_interval_secs() -> u64 {
    30
}

impl Default for Config {
    fn default() -> Self {
        Self {
            predictions: Vec::new(),
            baseline_file: None,
            state_file: None,
            rename_window_ms: default_rename_window_ms(),
            persist_interval_secs: default_persist_interval_secs(),
        }
    }
}

impl Config {
    /// Load configuration from the config directory
    pub fn load(config_dir: &Path) -> Result<Self> {
        let config_file = config_dir.join("config.json");

        if config_file.exists() {
            let content = std::fs::read_to_string(&config_file)
                .with_context(|| format!("Failed to read config file: {:?}", config_file))?;
            let config: Config =
                serde_json::from_str(&content).with_context(|| "Failed to parse config.json")?;
            tracing::info!("Loaded configuration from {:?}", config_file);
            Ok(config)
        } else {
            tracing::info!("No config file found at {:?}, using defaults", config_file);
            let config = Config::default();

            std::fs::create_dir_all(config_dir)
                .with_context(|| format!("Failed to create config directory: {:?}", config_dir))?;

            // Write default config for reference
            let content = serde_json::to_string_pretty(&config)?;
            std::fs::write(&config_file, content)
                .with_context(|| format!("Failed to write default config: {:?}", config_file))?;
            tracing::info!("Created default config at {:?}", config_file);

            Ok(config)
        }
    }

    pub fn rename_window(&self) -> Duration {
        Duration::from_millis(self.rename_window_ms)
    }

    /// Never zero, so it can drive a timer.
    pub fn persist_interval(&self) -> Duration {
        Duration::from_secs(self.persist_interval_secs.max(1))
    }
}
