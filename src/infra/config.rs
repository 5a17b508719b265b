//! Configuration management infrastructure.
//!
//! Transport and polling knobs live in a TOML file so slow hosts or
//! touch-heavy workflows can stretch the poll budget without rebuilding.
//! Secrets (PIN, passphrase) are never part of the configuration.

use crate::domain::constants::usb;
use crate::infra::error::{ConsoleError, ConsoleResult};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Application configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConsoleConfiguration {
    /// Number of APDU exchanges kept in the history
    pub apdu_history_limit: usize,

    /// Whether to show verbose output
    pub verbose: bool,

    /// USB transport and polling
    pub transport: TransportConfig,

    /// OATH applet preferences
    pub oath: OathConfig,
}

/// USB transport configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TransportConfig {
    /// Interface carrying the vendor control requests
    pub interface_number: u8,

    /// Interface class to look for when opening a device
    pub interface_class: u8,

    /// Timeout for a single control transfer
    pub usb_timeout_ms: u64,

    /// Delay between busy polls
    pub poll_interval_ms: u64,

    /// Give up after this many busy polls; absent means wait forever
    pub max_poll_attempts: Option<u32>,

    /// Receive buffer for response APDUs
    pub response_buffer_size: usize,
}

/// OATH configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct OathConfig {
    /// TOTP time step in seconds
    pub totp_period_secs: u64,
}

impl Default for ConsoleConfiguration {
    fn default() -> Self {
        Self {
            apdu_history_limit: 64,
            verbose: false,
            transport: TransportConfig::default(),
            oath: OathConfig::default(),
        }
    }
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            interface_number: 1,
            interface_class: usb::VENDOR_CLASS,
            usb_timeout_ms: 1000,
            poll_interval_ms: 100,
            // one minute at the default interval, long enough for a touch
            max_poll_attempts: Some(600),
            response_buffer_size: usb::MAX_RESPONSE_LEN,
        }
    }
}

impl Default for OathConfig {
    fn default() -> Self {
        Self {
            totp_period_secs: 30,
        }
    }
}

impl TransportConfig {
    #[must_use]
    pub fn usb_timeout(&self) -> Duration {
        Duration::from_millis(self.usb_timeout_ms)
    }

    #[must_use]
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

/// Configuration manager for handling config files
pub struct ConfigManager {
    config_path: PathBuf,
}

impl ConfigManager {
    /// Create a new configuration manager with default path
    pub fn new() -> ConsoleResult<Self> {
        let config_path = Self::default_config_path()?;
        Ok(Self { config_path })
    }

    /// Create a configuration manager with custom path
    pub fn with_path<P: AsRef<Path>>(path: P) -> Self {
        Self {
            config_path: path.as_ref().to_path_buf(),
        }
    }

    /// Get the default configuration file path
    pub fn default_config_path() -> ConsoleResult<PathBuf> {
        if let Some(config_dir) = dirs::config_dir() {
            Ok(config_dir.join("canokey-console").join("config.toml"))
        } else {
            Ok(PathBuf::from("canokey-console.toml"))
        }
    }

    /// Load configuration from file, falling back to defaults if it doesn't exist
    pub fn load_or_default(&self) -> ConsoleResult<ConsoleConfiguration> {
        if self.config_path.exists() {
            self.load()
        } else {
            log::debug!(
                "No configuration at {}, using defaults",
                self.config_path.display()
            );
            Ok(ConsoleConfiguration::default())
        }
    }

    /// Load configuration from file, creating default if it doesn't exist
    pub fn load_or_create_default(&self) -> ConsoleResult<ConsoleConfiguration> {
        if self.config_path.exists() {
            self.load()
        } else {
            log::info!(
                "Configuration file not found, creating default: {}",
                self.config_path.display()
            );
            let default_config = ConsoleConfiguration::default();
            self.save(&default_config)?;
            Ok(default_config)
        }
    }

    /// Load configuration from file
    pub fn load(&self) -> ConsoleResult<ConsoleConfiguration> {
        log::debug!("Loading configuration from: {}", self.config_path.display());

        let content = fs::read_to_string(&self.config_path).map_err(|e| {
            ConsoleError::ConfigurationError(format!(
                "Failed to read config file {}: {}",
                self.config_path.display(),
                e
            ))
        })?;

        let config: ConsoleConfiguration = toml::from_str(&content).map_err(|e| {
            ConsoleError::ConfigurationError(format!("Failed to parse config file: {e}"))
        })?;

        validate_config(&config)?;
        Ok(config)
    }

    /// Save configuration to file
    pub fn save(&self, config: &ConsoleConfiguration) -> ConsoleResult<()> {
        validate_config(config)?;

        if let Some(parent) = self.config_path.parent() {
            fs::create_dir_all(parent).map_err(|e| {
                ConsoleError::ConfigurationError(format!(
                    "Failed to create config directory {}: {}",
                    parent.display(),
                    e
                ))
            })?;
        }

        let content = toml::to_string_pretty(config).map_err(|e| {
            ConsoleError::ConfigurationError(format!("Failed to serialize config: {e}"))
        })?;

        fs::write(&self.config_path, content).map_err(|e| {
            ConsoleError::ConfigurationError(format!(
                "Failed to write config file {}: {}",
                self.config_path.display(),
                e
            ))
        })?;

        log::info!("Configuration saved to {}", self.config_path.display());
        Ok(())
    }

    /// Update a specific configuration value
    pub fn update_value(&self, key: &str, value: &str) -> ConsoleResult<()> {
        let mut config = self.load_or_default()?;

        match key {
            "transport.interface_number" => {
                config.transport.interface_number = parse_number(key, value)?;
            }
            "transport.usb_timeout_ms" => {
                config.transport.usb_timeout_ms = parse_number(key, value)?;
            }
            "transport.poll_interval_ms" => {
                config.transport.poll_interval_ms = parse_number(key, value)?;
            }
            "transport.max_poll_attempts" => {
                config.transport.max_poll_attempts = match value {
                    "none" | "unbounded" => None,
                    _ => Some(parse_number(key, value)?),
                };
            }
            "transport.response_buffer_size" => {
                config.transport.response_buffer_size = parse_number(key, value)?;
            }
            "oath.totp_period_secs" => {
                config.oath.totp_period_secs = parse_number(key, value)?;
            }
            "apdu_history_limit" => {
                config.apdu_history_limit = parse_number(key, value)?;
            }
            "verbose" => {
                config.verbose = value.parse().map_err(|_| {
                    ConsoleError::ConfigurationError(format!("Invalid boolean value: {value}"))
                })?;
            }
            _ => {
                return Err(ConsoleError::ConfigurationError(format!(
                    "Unknown configuration key: {key}"
                )));
            }
        }

        self.save(&config)
    }

    /// Get the configuration file path
    #[must_use]
    pub fn config_path(&self) -> &Path {
        &self.config_path
    }
}

/// Validate configuration values
fn validate_config(config: &ConsoleConfiguration) -> ConsoleResult<()> {
    let transport = &config.transport;

    if transport.poll_interval_ms == 0 {
        return Err(ConsoleError::ConfigurationError(
            "Poll interval must be greater than 0".to_string(),
        ));
    }

    if transport.max_poll_attempts == Some(0) {
        return Err(ConsoleError::ConfigurationError(
            "Max poll attempts must be greater than 0 (omit it to wait forever)".to_string(),
        ));
    }

    if transport.usb_timeout_ms == 0 {
        return Err(ConsoleError::ConfigurationError(
            "USB timeout must be greater than 0".to_string(),
        ));
    }

    // a response carries at least its status word
    if transport.response_buffer_size < 2 {
        return Err(ConsoleError::ConfigurationError(format!(
            "Response buffer of {} bytes cannot hold a status word",
            transport.response_buffer_size
        )));
    }

    if config.oath.totp_period_secs == 0 {
        return Err(ConsoleError::ConfigurationError(
            "TOTP period must be greater than 0".to_string(),
        ));
    }

    Ok(())
}

fn parse_number<T: std::str::FromStr>(key: &str, value: &str) -> ConsoleResult<T> {
    value.parse().map_err(|_| {
        ConsoleError::ConfigurationError(format!("Invalid number for {key}: {value}"))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_default_configuration() {
        let config = ConsoleConfiguration::default();
        assert_eq!(config.transport.interface_number, 1);
        assert_eq!(config.transport.poll_interval(), Duration::from_millis(100));
        assert_eq!(config.transport.response_buffer_size, 1500);
        assert_eq!(config.oath.totp_period_secs, 30);
        assert!(validate_config(&config).is_ok());
    }

    #[test]
    fn test_config_serialization() {
        let config = ConsoleConfiguration::default();
        let toml_str = toml::to_string(&config).unwrap();
        let deserialized: ConsoleConfiguration = toml::from_str(&toml_str).unwrap();
        assert_eq!(config, deserialized);
    }

    #[test]
    fn test_partial_file_uses_defaults() {
        let config: ConsoleConfiguration =
            toml::from_str("[transport]\npoll_interval_ms = 20\n").unwrap();
        assert_eq!(config.transport.poll_interval_ms, 20);
        assert_eq!(config.transport.interface_number, 1);
        assert_eq!(config.apdu_history_limit, 64);
    }

    #[test]
    fn test_config_manager_with_temp_path() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("nested").join("config.toml");
        let manager = ConfigManager::with_path(&config_path);

        let config = manager.load_or_create_default().unwrap();
        assert!(config_path.exists());
        assert_eq!(manager.load().unwrap(), config);
    }

    #[test]
    fn test_update_value() {
        let temp_dir = TempDir::new().unwrap();
        let manager = ConfigManager::with_path(temp_dir.path().join("config.toml"));

        manager
            .update_value("transport.max_poll_attempts", "unbounded")
            .unwrap();
        manager.update_value("oath.totp_period_secs", "60").unwrap();

        let config = manager.load().unwrap();
        assert_eq!(config.transport.max_poll_attempts, None);
        assert_eq!(config.oath.totp_period_secs, 60);

        assert!(manager.update_value("transport.poll_interval_ms", "0").is_err());
        assert!(manager.update_value("no.such.key", "1").is_err());
    }

    #[test]
    fn test_invalid_file_is_reported() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("config.toml");
        fs::write(&path, "[transport]\npoll_interval_ms = 0\n").unwrap();
        let result = ConfigManager::with_path(&path).load();
        assert!(matches!(result, Err(ConsoleError::ConfigurationError(_))));
    }
}
