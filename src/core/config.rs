//! Configuration management

use anyhow::{bail, Context, Result};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// HID device selection configuration.
///
/// The defaults match the firmware's vendor-defined layer interface; they
/// are configuration, not protocol, and should be confirmed against the
/// firmware actually in use.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceConfig {
    /// USB Vendor ID
    #[serde(default = "default_vendor_id")]
    pub vendor_id: u16,
    /// USB Product ID
    #[serde(default = "default_product_id")]
    pub product_id: u16,
    /// HID Usage Page of the vendor interface
    #[serde(default = "default_usage_page")]
    pub usage_page: u16,
    /// HID Usage ID of the vendor interface
    #[serde(default = "default_usage_id")]
    pub usage_id: u16,
}

fn default_vendor_id() -> u16 {
    0xFEED
}
fn default_product_id() -> u16 {
    0x6061
}
fn default_usage_page() -> u16 {
    0xFF61
}
fn default_usage_id() -> u16 {
    0x62
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            vendor_id: default_vendor_id(),
            product_id: default_product_id(),
            usage_page: default_usage_page(),
            usage_id: default_usage_id(),
        }
    }
}

/// Monitor loop timing configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonitorConfig {
    /// Per-read timeout in milliseconds; doubles as the liveness/cancel
    /// check interval while connected
    #[serde(default = "default_read_timeout")]
    pub read_timeout_ms: u64,
    /// First reconnect delay in milliseconds
    #[serde(default = "default_backoff_initial")]
    pub backoff_initial_ms: u64,
    /// Reconnect delay ceiling in milliseconds
    #[serde(default = "default_backoff_max")]
    pub backoff_max_ms: u64,
}

fn default_read_timeout() -> u64 {
    250
}
fn default_backoff_initial() -> u64 {
    500
}
fn default_backoff_max() -> u64 {
    5000
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            read_timeout_ms: default_read_timeout(),
            backoff_initial_ms: default_backoff_initial(),
            backoff_max_ms: default_backoff_max(),
        }
    }
}

/// Main application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// HID device selection
    #[serde(default)]
    pub device: DeviceConfig,
    /// Monitor loop timing
    #[serde(default)]
    pub monitor: MonitorConfig,
}

impl Config {
    /// Load configuration from file
    pub fn load() -> Result<Self> {
        let config_path = Self::config_path()?;

        if config_path.exists() {
            let content = std::fs::read_to_string(&config_path)
                .with_context(|| format!("Failed to read config file: {:?}", config_path))?;
            let config: Config = toml::from_str(&content)
                .with_context(|| format!("Failed to parse config file: {:?}", config_path))?;
            Ok(config)
        } else {
            // Return default config if file doesn't exist
            Ok(Config::default())
        }
    }

    /// Save configuration to file
    pub fn save(&self) -> Result<()> {
        let config_path = Self::config_path()?;

        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create config directory: {:?}", parent))?;
        }

        let content = toml::to_string_pretty(self).context("Failed to serialize config")?;
        std::fs::write(&config_path, content)
            .with_context(|| format!("Failed to write config file: {:?}", config_path))?;

        Ok(())
    }

    /// Get the configuration file path
    pub fn config_path() -> Result<PathBuf> {
        let proj_dirs = ProjectDirs::from("com", "viable", "LayerMonitor")
            .context("Failed to determine config directory")?;
        Ok(proj_dirs.config_dir().join("config.toml"))
    }

    /// Reject configurations the monitor loop cannot run with. Called once
    /// at startup so misconfiguration fails fast instead of at runtime.
    pub fn validate(&self) -> Result<()> {
        if self.monitor.read_timeout_ms == 0 {
            bail!("monitor.read_timeout_ms must be greater than zero");
        }
        if self.monitor.backoff_initial_ms == 0 {
            bail!("monitor.backoff_initial_ms must be greater than zero");
        }
        if self.monitor.backoff_initial_ms > self.monitor.backoff_max_ms {
            bail!(
                "monitor.backoff_initial_ms ({}) exceeds backoff_max_ms ({})",
                self.monitor.backoff_initial_ms,
                self.monitor.backoff_max_ms
            );
        }
        Ok(())
    }
}
