//! Bridge configuration
//!
//! One TOML file with a section per subsystem. Every field has a default,
//! so a file only needs the values that differ:
//!
//! ```toml
//! [broker]
//! host = "192.168.1.69"
//! user = "bridge"
//!
//! [broker.tls]
//! ca_cert = "/etc/mosquitto/ca.crt"
//!
//! [storage]
//! base_url = "http://influx.local:8086"
//! org = "home"
//!
//! [decision]
//! threshold = 25.0
//! ```
//!
//! Secrets can be kept out of the file and passed through the environment
//! instead (`WEATHER_BRIDGE_MQTT_PASSWORD`, `WEATHER_BRIDGE_INFLUX_TOKEN`).

use std::path::{Path, PathBuf};

use clap::Parser;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::decision::DecisionConfig;
use crate::mqtt::config::{BrokerConfig, TopicConfig};
use crate::telemetry::{ForwarderConfig, StorageConfig};

const CONFIG_DIR: &str = "weather-bridge";
const CONFIG_FILE: &str = "bridge.toml";
const MIN_KEEP_ALIVE_SECS: u64 = 5;

#[derive(Parser, Debug, Default)]
#[command(name = "weather-bridge", version, about = "Bridges MQTT sensor telemetry to InfluxDB")]
pub struct Cli {
    /// Configuration file, defaults to $XDG_CONFIG_HOME/weather-bridge/bridge.toml
    #[arg(short, long, env = "WEATHER_BRIDGE_CONFIG")]
    pub config: Option<PathBuf>,

    /// Broker password, overrides the configuration file
    #[arg(long, env = "WEATHER_BRIDGE_MQTT_PASSWORD", hide_env_values = true)]
    pub mqtt_password: Option<String>,

    /// InfluxDB API token, overrides the configuration file
    #[arg(long, env = "WEATHER_BRIDGE_INFLUX_TOKEN", hide_env_values = true)]
    pub influx_token: Option<String>,
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Configuration file not found: {0}")]
    NotFound(PathBuf),

    #[error("Failed to read {path}: {reason}")]
    Read { path: PathBuf, reason: String },

    #[error("Failed to parse {path}: {reason}")]
    Parse { path: PathBuf, reason: String },

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

#[derive(Deserialize, Serialize, Clone, Debug, Default, PartialEq)]
#[serde(default)]
pub struct BridgeConfig {
    pub broker: BrokerConfig,
    pub topics: TopicConfig,
    pub storage: StorageConfig,
    pub decision: DecisionConfig,
    pub forwarder: ForwarderConfig,
}

impl BridgeConfig {
    /// Loads the file named on the command line, or the default location.
    ///
    /// A missing explicit file is an error; a missing default file falls back
    /// to built-in defaults.
    pub async fn load(cli: &Cli) -> Result<Self, ConfigError> {
        let mut config = match &cli.config {
            Some(path) => {
                if !tokio::fs::try_exists(path).await.unwrap_or(false) {
                    return Err(ConfigError::NotFound(path.clone()));
                }
                Self::from_file(path).await?
            }
            None => match default_config_path() {
                Some(path) if tokio::fs::try_exists(&path).await.unwrap_or(false) => {
                    Self::from_file(&path).await?
                }
                Some(path) => {
                    warn!(
                        "No configuration at {}, using defaults",
                        path.display()
                    );
                    Self::default()
                }
                None => {
                    warn!("No configuration directory available, using defaults");
                    Self::default()
                }
            },
        };

        config.apply_overrides(cli);
        config.validate()?;
        Ok(config)
    }

    pub async fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| ConfigError::Read {
                path: path.to_path_buf(),
                reason: e.to_string(),
            })?;

        let config = toml::from_str(&content).map_err(|e| ConfigError::Parse {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        info!("Loaded configuration from {}", path.display());
        Ok(config)
    }

    pub fn apply_overrides(&mut self, cli: &Cli) {
        if let Some(password) = &cli.mqtt_password {
            self.broker.password = password.clone();
        }
        if let Some(token) = &cli.influx_token {
            self.storage.token = token.clone();
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.broker.host.is_empty() {
            return Err(ConfigError::Invalid("broker.host is empty".to_string()));
        }
        if self.broker.keep_alive_secs < MIN_KEEP_ALIVE_SECS {
            return Err(ConfigError::Invalid(format!(
                "broker.keep_alive_secs must be at least {}",
                MIN_KEEP_ALIVE_SECS
            )));
        }
        if self.broker.request_capacity == 0 {
            return Err(ConfigError::Invalid(
                "broker.request_capacity must be positive".to_string(),
            ));
        }
        if self.topics.control.is_empty() {
            return Err(ConfigError::Invalid("topics.control is empty".to_string()));
        }
        if self.storage.base_url.is_empty() {
            return Err(ConfigError::Invalid("storage.base_url is empty".to_string()));
        }
        if !self.decision.threshold.is_finite() {
            return Err(ConfigError::Invalid(
                "decision.threshold must be a finite number".to_string(),
            ));
        }
        if !(self.decision.hysteresis >= 0.0 && self.decision.hysteresis.is_finite()) {
            return Err(ConfigError::Invalid(
                "decision.hysteresis must be zero or positive".to_string(),
            ));
        }
        if self.forwarder.queue_capacity == 0 {
            return Err(ConfigError::Invalid(
                "forwarder.queue_capacity must be positive".to_string(),
            ));
        }
        if self.forwarder.retry_base_delay_ms > self.forwarder.retry_max_delay_ms {
            return Err(ConfigError::Invalid(
                "forwarder.retry_base_delay_ms exceeds retry_max_delay_ms".to_string(),
            ));
        }
        Ok(())
    }
}

pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join(CONFIG_DIR).join(CONFIG_FILE))
}
