//! Client configuration.
//!
//! All settings live in a single `config.toml` file at
//! `~/.config/fountain/config.toml` by default:
//!
//! ```toml
//! [device]
//! address = "A4:C1:38:0B:12:7E"
//!
//! [connection]
//! connect_timeout_secs = 30
//! command_timeout_secs = 10
//! heartbeat_interval_secs = 60
//! silence_window_secs = 180
//! reconnect_schedule_ms = [100, 500, 1000, 5000]
//! ```

use std::path::{Path, PathBuf};
use std::sync::LazyLock;
use std::time::Duration;

use fountain_engine::EngineConfig;
use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{ClientError, ClientResult};

static ADDRESS_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[0-9A-Fa-f]{2}(:[0-9A-Fa-f]{2}){5}$").expect("Invalid address regex")
});

/// Returns true if `address` looks like `AA:BB:CC:DD:EE:FF`.
pub fn is_valid_address(address: &str) -> bool {
    ADDRESS_RE.is_match(address)
}

/// Configuration for the fountain client.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Debug mode.
    pub debug: bool,

    /// Which fountain to talk to.
    pub device: DeviceSettings,

    /// Connection tuning.
    pub connection: ConnectionSettings,
}

/// Target device.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DeviceSettings {
    /// Bluetooth address of the fountain.
    pub address: Option<String>,

    /// Advertised name, used when the address is not known yet.
    pub name: Option<String>,
}

/// Connection settings, mapped onto [`EngineConfig`].
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ConnectionSettings {
    pub connect_timeout_secs: u64,
    pub command_timeout_secs: u64,
    pub write_timeout_secs: u64,
    pub heartbeat_interval_secs: u64,
    pub silence_window_secs: u64,
    pub reconnect_schedule_ms: Vec<u64>,
    pub queue_capacity: usize,
}

impl Default for ConnectionSettings {
    fn default() -> Self {
        let engine = EngineConfig::default();
        Self {
            connect_timeout_secs: engine.connect_timeout.as_secs(),
            command_timeout_secs: engine.command_timeout.as_secs(),
            write_timeout_secs: engine.write_timeout.as_secs(),
            heartbeat_interval_secs: engine.heartbeat_interval.as_secs(),
            silence_window_secs: engine.silence_window.as_secs(),
            reconnect_schedule_ms: engine
                .reconnect_schedule
                .iter()
                .map(|delay| delay.as_millis() as u64)
                .collect(),
            queue_capacity: engine.queue_capacity,
        }
    }
}

impl ConnectionSettings {
    /// Builds and validates the engine configuration.
    pub fn to_engine_config(&self) -> ClientResult<EngineConfig> {
        let config = EngineConfig::default()
            .with_connect_timeout(Duration::from_secs(self.connect_timeout_secs))
            .with_command_timeout(Duration::from_secs(self.command_timeout_secs))
            .with_write_timeout(Duration::from_secs(self.write_timeout_secs))
            .with_heartbeat(
                Duration::from_secs(self.heartbeat_interval_secs),
                Duration::from_secs(self.silence_window_secs),
            )
            .with_reconnect_schedule(
                self.reconnect_schedule_ms
                    .iter()
                    .copied()
                    .map(Duration::from_millis)
                    .collect(),
            )
            .with_queue_capacity(self.queue_capacity);
        config.validate()?;
        Ok(config)
    }
}

impl ClientConfig {
    /// Loads configuration from the default path, or defaults if there is
    /// no file.
    pub fn load() -> ClientResult<Self> {
        let path = Self::default_path();
        if path.exists() {
            Self::load_from(&path)
        } else {
            debug!(path = %path.display(), "No config file, using defaults");
            Ok(Self::default())
        }
    }

    /// Loads configuration from a specific path.
    pub fn load_from(path: &Path) -> ClientResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            ClientError::config(format!("failed to read {}: {}", path.display(), e))
        })?;
        Self::parse(&content)
    }

    /// Parses a `config.toml` document.
    pub fn parse(content: &str) -> ClientResult<Self> {
        toml::from_str(content).map_err(|e| ClientError::config(format!("failed to parse config: {}", e)))
    }

    /// Checks the device address and the connection settings.
    pub fn validate(&self) -> ClientResult<EngineConfig> {
        if let Some(address) = &self.device.address
            && !is_valid_address(address)
        {
            return Err(ClientError::config(format!(
                "device address {address:?} is not of the form AA:BB:CC:DD:EE:FF"
            )));
        }
        self.connection.to_engine_config()
    }

    /// Returns the default configuration file path.
    pub fn default_path() -> PathBuf {
        Self::default_config_dir().join("config.toml")
    }

    /// Returns the default configuration directory.
    pub fn default_config_dir() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("fountain")
    }
}
