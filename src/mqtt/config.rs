use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

/// Connection settings for the MQTT broker the sensor publishes to.
#[derive(Deserialize, Serialize, Clone, PartialEq)]
#[serde(default)]
pub struct BrokerConfig {
    pub host: String,
    pub port: u16,
    pub client_id: String,
    pub user: String,
    pub password: String,
    /// Keep-alive interval announced to the broker
    pub keep_alive_secs: u64,
    /// Fixed wait between a lost session and the next connection attempt
    pub reconnect_interval_secs: u64,
    /// Capacity of the client's outgoing request queue
    pub request_capacity: usize,
    pub tls: TlsConfig,
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 8883,
            client_id: "weather-bridge".to_string(),
            user: String::new(),
            password: String::new(),
            keep_alive_secs: 60,
            reconnect_interval_secs: 5,
            request_capacity: 32,
            tls: TlsConfig::default(),
        }
    }
}

impl BrokerConfig {
    pub fn keep_alive(&self) -> Duration {
        Duration::from_secs(self.keep_alive_secs)
    }

    pub fn reconnect_interval(&self) -> Duration {
        Duration::from_secs(self.reconnect_interval_secs)
    }

    pub fn has_credentials(&self) -> bool {
        !self.user.is_empty()
    }
}

// Password stays out of the logs
impl fmt::Debug for BrokerConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BrokerConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("client_id", &self.client_id)
            .field("user", &self.user)
            .field("password", &"***")
            .field("keep_alive_secs", &self.keep_alive_secs)
            .field("reconnect_interval_secs", &self.reconnect_interval_secs)
            .field("request_capacity", &self.request_capacity)
            .field("tls", &self.tls)
            .finish()
    }
}

impl fmt::Display for BrokerConfig {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        if self.has_credentials() {
            write!(f, "{}@{}:{}", self.user, self.host, self.port)
        } else {
            write!(f, "{}:{}", self.host, self.port)
        }
    }
}

/// TLS material for the broker connection.
///
/// Without a CA file the platform trust store is used. Client certificate and
/// key have to be given together.
#[derive(Deserialize, Serialize, Clone, Debug, PartialEq)]
#[serde(default)]
pub struct TlsConfig {
    pub enabled: bool,
    pub ca_cert: Option<PathBuf>,
    pub client_cert: Option<PathBuf>,
    pub client_key: Option<PathBuf>,
}

impl Default for TlsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            ca_cert: None,
            client_cert: None,
            client_key: None,
        }
    }
}

/// Topic names shared between the bridge and the device.
#[derive(Deserialize, Serialize, Clone, Debug, PartialEq)]
#[serde(default)]
pub struct TopicConfig {
    pub temperature: String,
    pub pressure: String,
    pub data: String,
    pub humidity: String,
    /// Only BME280 boards publish humidity, so it is opt-in
    pub subscribe_humidity: bool,
    pub control: String,
}

impl Default for TopicConfig {
    fn default() -> Self {
        Self {
            temperature: "sensors/temperature".to_string(),
            pressure: "sensors/pressure".to_string(),
            data: "sensors/data".to_string(),
            humidity: "sensors/humidity".to_string(),
            subscribe_humidity: false,
            control: "picow/control".to_string(),
        }
    }
}
