// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

// Controller Configuration Types
//
// Settings for the control-plane core: event bus sizing, job processor
// concurrency and logging. Loaded from YAML with environment overrides:
//
//   event_bus:
//     capacity: 1024
//   processor:
//     workers: 16
//     drain_timeout: 5s
//   logging:
//     level: info
//     format: compact

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const CONFIG_PATH_ENV: &str = "IKESTACK_CONFIG_PATH";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ControllerConfig {
    #[serde(default)]
    pub event_bus: EventBusSettings,

    #[serde(default)]
    pub processor: ProcessorSettings,

    #[serde(default)]
    pub logging: LoggingSettings,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventBusSettings {
    /// Signals buffered per subscriber before the slowest one starts lagging
    #[serde(default = "default_bus_capacity")]
    pub capacity: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessorSettings {
    /// Maximum number of jobs executing concurrently
    #[serde(default = "default_workers")]
    pub workers: usize,

    /// How long shutdown waits for running jobs
    #[serde(default = "default_drain_timeout", with = "humantime_serde")]
    pub drain_timeout: Duration,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoggingSettings {
    #[serde(default = "default_log_level")]
    pub level: String,

    #[serde(default)]
    pub format: LogFormat,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Compact,
    Json,
}

fn default_bus_capacity() -> usize {
    1024
}

fn default_workers() -> usize {
    16
}

fn default_drain_timeout() -> Duration {
    Duration::from_secs(5)
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for EventBusSettings {
    fn default() -> Self {
        Self {
            capacity: default_bus_capacity(),
        }
    }
}

impl Default for ProcessorSettings {
    fn default() -> Self {
        Self {
            workers: default_workers(),
            drain_timeout: default_drain_timeout(),
        }
    }
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: LogFormat::default(),
        }
    }
}

impl ControllerConfig {
    /// Load configuration from YAML file
    pub fn from_yaml_file(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml_str(&content)
    }

    /// Parse configuration from YAML string
    pub fn from_yaml_str(yaml: &str) -> anyhow::Result<Self> {
        let config = serde_yaml::from_str(yaml)?;
        Ok(config)
    }

    /// Discover configuration file using precedence order
    /// 1. IKESTACK_CONFIG_PATH environment variable
    /// 2. ./ikestack.yaml (working directory)
    /// 3. /etc/ikestack/config.yaml
    pub fn discover_config() -> Option<PathBuf> {
        if let Ok(path) = std::env::var(CONFIG_PATH_ENV) {
            let path = PathBuf::from(path);
            if path.exists() {
                return Some(path);
            }
        }

        let cwd = PathBuf::from("./ikestack.yaml");
        if cwd.exists() {
            return Some(cwd);
        }

        let system_config = PathBuf::from("/etc/ikestack/config.yaml");
        if system_config.exists() {
            return Some(system_config);
        }

        None
    }

    /// Load configuration with discovery, fallback to default
    pub fn load_or_default(explicit_path: Option<PathBuf>) -> anyhow::Result<Self> {
        let mut config = if let Some(path) = explicit_path {
            tracing::info!("Loading configuration from explicit path: {:?}", path);
            Self::from_yaml_file(&path)
                .map_err(|e| anyhow::anyhow!("Failed to load config at {:?}: {}", path, e))?
        } else if let Some(path) = Self::discover_config() {
            tracing::info!("Loading configuration from discovered path: {:?}", path);
            Self::from_yaml_file(path)?
        } else {
            tracing::warn!("No configuration file found in standard locations. Using defaults.");
            Self::default()
        };

        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Apply IKESTACK_LOG_LEVEL / IKESTACK_WORKERS overrides
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides_from(|key| std::env::var(key).ok());
    }

    fn apply_overrides_from(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(level) = lookup("IKESTACK_LOG_LEVEL") {
            tracing::info!("Environment override: IKESTACK_LOG_LEVEL={}", level);
            self.logging.level = level;
        }

        if let Some(val) = lookup("IKESTACK_WORKERS") {
            match val.parse::<usize>() {
                Ok(workers) => {
                    tracing::info!("Environment override: IKESTACK_WORKERS={}", workers);
                    self.processor.workers = workers;
                }
                Err(_) => {
                    tracing::warn!(
                        "Invalid value for IKESTACK_WORKERS: '{}'. Expected a positive integer. Ignoring.",
                        val
                    );
                }
            }
        }
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.event_bus.capacity == 0 {
            anyhow::bail!("event_bus.capacity must be greater than zero");
        }

        if self.processor.workers == 0 {
            anyhow::bail!("processor.workers must be greater than zero");
        }

        if self.logging.level.trim().is_empty() {
            anyhow::bail!("logging.level cannot be empty");
        }

        Ok(())
    }
}
