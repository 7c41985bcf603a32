use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use crate::logging::LoggingConfig;

/// When the native context gets created
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InitPolicy {
    /// On the first registration; retried on every later one until it works
    #[default]
    Lazy,
    /// Once at construction; a failure falls back to lazy retry
    Eager,
}

/// Listener configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Native context initialization policy
    pub init_policy: InitPolicy,

    /// Capacity of each notification subscriber channel
    pub channel_capacity: usize,

    /// Report already-attached devices as arrivals when registering
    pub enumerate_existing: bool,

    /// Upper bound on one native event-handling wait. Also bounds how long
    /// releasing the context waits for the event thread.
    pub event_timeout: Duration,

    /// Logging configuration
    pub logging: LoggingConfig,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            init_policy: InitPolicy::Lazy,
            event_timeout: Duration::from_millis(100),
            channel_capacity: 100,
            enumerate_existing: false,
            logging: LoggingConfig::default(),
        }
    }
}

impl ListenerConfig {
    /// Load configuration from file
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .context(format!("Failed to read config file: {}", path.display()))?;

        let config: ListenerConfig = toml::from_str(&content)
            .context("Failed to parse TOML configuration")?;

        config.validate()
            .context("Configuration validation failed")?;

        Ok(config)
    }

    /// Save configuration to file
    pub fn save_to_file(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self)
            .context("Failed to serialize configuration")?;

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .context("Failed to create config directory")?;
        }

        std::fs::write(path, content)
            .context(format!("Failed to write config file: {}", path.display()))?;

        Ok(())
    }

    /// Create development configuration
    pub fn development() -> Self {
        Self {
            init_policy: InitPolicy::Eager,
            event_timeout: Duration::from_millis(50),
            channel_capacity: 256,
            enumerate_existing: true,
            logging: LoggingConfig::development(),
        }
    }

    /// Create production configuration
    pub fn production() -> Self {
        Self {
            init_policy: InitPolicy::Lazy,
            event_timeout: Duration::from_millis(250),
            channel_capacity: 64,
            enumerate_existing: false,
            logging: LoggingConfig::production(),
        }
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.channel_capacity == 0 {
            return Err(anyhow::anyhow!("channel_capacity must be greater than 0"));
        }

        if self.event_timeout.is_zero() {
            return Err(anyhow::anyhow!("event_timeout must be greater than 0"));
        }

        if self.event_timeout > Duration::from_secs(5) {
            return Err(anyhow::anyhow!("event_timeout must not exceed 5 seconds"));
        }

        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.logging.level.as_str()) {
            return Err(anyhow::anyhow!("Invalid log level: {}", self.logging.level));
        }

        let valid_formats = ["compact", "pretty", "json"];
        if !valid_formats.contains(&self.logging.format.as_str()) {
            return Err(anyhow::anyhow!("Invalid log format: {}", self.logging.format));
        }

        Ok(())
    }
}
