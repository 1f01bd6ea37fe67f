use clap::ArgMatches;
use log::{debug, info};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use crate::modbus::protocol::{DEFAULT_UNIT_ID, MODBUS_TCP_PORT};
use crate::utils::error::ModbusError;

pub const DEFAULT_SLAVE_ADDRESS: &str = "192.168.0.180";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    Console,
    Json,
}

impl std::str::FromStr for OutputFormat {
    type Err = ModbusError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "console" => Ok(OutputFormat::Console),
            "json" => Ok(OutputFormat::Json),
            other => Err(ModbusError::ConfigError(format!(
                "Unknown output format '{}' (expected console or json)",
                other
            ))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    // Connection settings
    pub ip_address: String,
    pub port: u16,
    pub unit_id: u8,
    pub connect_timeout_ms: u64,
    pub read_timeout_ms: u64,

    // Monitoring settings
    pub update_interval_ms: u64,

    // Output settings
    pub output_format: OutputFormat,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            ip_address: DEFAULT_SLAVE_ADDRESS.to_string(),
            port: MODBUS_TCP_PORT,
            unit_id: DEFAULT_UNIT_ID,
            connect_timeout_ms: 5000,
            read_timeout_ms: 2000,
            update_interval_ms: 1000,
            output_format: OutputFormat::Console,
        }
    }
}

impl Config {
    /// Defaults, then the `--config` file if given, then individual flags.
    pub fn from_matches(matches: &ArgMatches) -> Result<Self, ModbusError> {
        let mut config = match matches.get_one::<String>("config") {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };

        if let Some(address) = matches.get_one::<String>("address") {
            config.ip_address = address.clone();
        }
        if let Some(port) = matches.get_one::<u16>("port") {
            config.port = *port;
        }
        if let Some(unit_id) = matches.get_one::<u8>("unit-id") {
            config.unit_id = *unit_id;
        }
        if let Some(interval) = matches.get_one::<u64>("interval-ms") {
            config.update_interval_ms = *interval;
        }
        if let Some(format) = matches.get_one::<String>("format") {
            config.output_format = format.parse()?;
        }

        config.validate()?;
        debug!("Effective configuration: {:?}", config);
        Ok(config)
    }

    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ModbusError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            ModbusError::ConfigError(format!("Cannot read {}: {}", path.display(), e))
        })?;
        let config: Config = toml::from_str(&content)?;
        info!("📄 Loaded configuration from {}", path.display());
        Ok(config)
    }

    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<(), ModbusError> {
        // Create directory if it doesn't exist
        if let Some(parent) = path.as_ref().parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ModbusError> {
        if self.ip_address.trim().is_empty() {
            return Err(ModbusError::ConfigError("Slave address is empty".to_string()));
        }
        if self.port == 0 {
            return Err(ModbusError::ConfigError("Port must be non-zero".to_string()));
        }
        if self.update_interval_ms == 0 {
            return Err(ModbusError::ConfigError(
                "Update interval must be non-zero".to_string(),
            ));
        }
        if self.connect_timeout_ms == 0 || self.read_timeout_ms == 0 {
            return Err(ModbusError::ConfigError("Timeouts must be non-zero".to_string()));
        }
        Ok(())
    }

    pub fn update_interval(&self) -> Duration {
        Duration::from_millis(self.update_interval_ms)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.read_timeout_ms)
    }
}
