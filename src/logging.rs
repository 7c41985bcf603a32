use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing_subscriber::{fmt, EnvFilter};

use crate::notify::DeviceNotification;

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,
    /// Log format (compact, pretty, json)
    pub format: String,
    /// Append log output to this file instead of stderr
    pub file_path: Option<PathBuf>,
    /// Include thread names; hotplug events arrive on the USB event thread
    pub include_thread_names: bool,
    /// Include source locations
    pub include_line_numbers: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "compact".to_string(),
            file_path: None,
            include_thread_names: false,
            include_line_numbers: false,
        }
    }
}

impl LoggingConfig {
    /// Development logging configuration
    pub fn development() -> Self {
        Self {
            level: "debug".to_string(),
            format: "pretty".to_string(),
            file_path: None,
            include_thread_names: true,
            include_line_numbers: true,
        }
    }

    /// Production logging configuration
    pub fn production() -> Self {
        Self {
            level: "info".to_string(),
            format: "json".to_string(),
            file_path: Some("/var/log/usb-hotplug/usb-hotplug.log".into()),
            include_thread_names: false,
            include_line_numbers: false,
        }
    }
}

/// Initialize structured logging based on configuration.
/// `RUST_LOG` overrides the configured level.
pub fn init_logging(config: &LoggingConfig) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.level));

    let builder = fmt::Subscriber::builder()
        .with_env_filter(filter)
        .with_thread_names(config.include_thread_names)
        .with_line_number(config.include_line_numbers)
        .with_file(config.include_line_numbers);

    let result = match (&config.file_path, config.format.as_str()) {
        (Some(path), format) => {
            let file = open_log_file(path)?;
            let builder = builder.with_ansi(false).with_writer(std::sync::Mutex::new(file));
            match format {
                "json" => tracing::subscriber::set_global_default(builder.json().finish()),
                "pretty" => tracing::subscriber::set_global_default(builder.pretty().finish()),
                _ => tracing::subscriber::set_global_default(builder.compact().finish()),
            }
        }
        (None, "json") => tracing::subscriber::set_global_default(builder.json().finish()),
        (None, "pretty") => tracing::subscriber::set_global_default(builder.pretty().finish()),
        (None, _) => tracing::subscriber::set_global_default(builder.compact().finish()),
    };
    result.context("Failed to set global tracing subscriber")?;

    tracing::info!("Structured logging initialized with level: {}", config.level);
    Ok(())
}

fn open_log_file(path: &Path) -> Result<std::fs::File> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .context(format!("Failed to create log directory: {}", parent.display()))?;
    }

    std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .context(format!("Failed to open log file: {}", path.display()))
}

/// Set up panic hook to log panics
pub fn setup_panic_hook() {
    let original_hook = std::panic::take_hook();

    std::panic::set_hook(Box::new(move |panic_info| {
        let panic_msg = if let Some(s) = panic_info.payload().downcast_ref::<&str>() {
            s
        } else if let Some(s) = panic_info.payload().downcast_ref::<String>() {
            s.as_str()
        } else {
            "Unknown panic payload"
        };

        let location = if let Some(location) = panic_info.location() {
            format!("{}:{}:{}", location.file(), location.line(), location.column())
        } else {
            "Unknown location".to_string()
        };

        tracing::error!(
            panic.msg = panic_msg,
            panic.location = location,
            "Application panicked"
        );

        original_hook(panic_info);
    }));
}

/// Structured event for one delivered hotplug notification
pub fn log_hotplug_event(notification: &DeviceNotification) {
    tracing::debug!(
        state = %notification.state,
        vendor_id = notification.device.vendor_id,
        product_id = notification.device.product_id,
        bus_number = notification.device.bus_number,
        address = notification.device.address,
        context = %notification.context,
        event_type = "hotplug",
        "Hotplug notification delivered"
    );
}

/// Create environment filter for logging
pub fn create_env_filter(level: &str) -> Result<EnvFilter> {
    EnvFilter::try_new(level).context(format!("Invalid log filter: {}", level))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notify::{DeviceRef, DeviceState, NativeHandle};
    use tempfile::tempdir;

    #[test]
    fn test_logging_config_default() {
        let config = LoggingConfig::default();
        assert_eq!(config.level, "info");
        assert_eq!(config.format, "compact");
        assert!(config.file_path.is_none());
    }

    #[test]
    fn test_logging_config_development() {
        let config = LoggingConfig::development();
        assert_eq!(config.level, "debug");
        assert_eq!(config.format, "pretty");
        assert!(config.include_thread_names);
        assert!(config.include_line_numbers);
    }

    #[test]
    fn test_logging_config_production() {
        let config = LoggingConfig::production();
        assert_eq!(config.format, "json");
        assert!(config.file_path.is_some());
    }

    #[test]
    fn test_create_env_filter() {
        assert!(create_env_filter("debug").is_ok());
        assert!(create_env_filter("usb_hotplug=trace").is_ok());
    }

    #[test]
    fn test_open_log_file_creates_parent() {
        let temp_dir = tempdir().unwrap();
        let log_path = temp_dir.path().join("nested").join("hotplug.log");

        assert!(open_log_file(&log_path).is_ok());
        assert!(log_path.exists());
    }

    #[test]
    fn test_log_hotplug_event() {
        // Only checks that emitting does not panic without a subscriber
        log_hotplug_event(&DeviceNotification {
            state: DeviceState::Left,
            context: NativeHandle::from_raw(0x10),
            device: DeviceRef {
                handle: NativeHandle::from_raw(0x20),
                bus_number: 2,
                address: 7,
                vendor_id: 0x067b,
                product_id: 0x25a1,
            },
        });
    }
}
