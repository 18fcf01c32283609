//! # Telemetry Forwarding Module
//!
//! Moves validated readings into an InfluxDB v2 bucket.
//!
//! ```text
//! Reading ──► ForwarderHandle ──► worker ──► TelemetryForwarder ──► InfluxWriter ──► POST /api/v2/write
//!             (bounded queue)                 (retry, dead letters)   (one attempt)
//! ```
//!
//! ## Failure Policy
//!
//! - Readings without temperature or pressure are skipped, not failed
//! - A non-204 answer is final after exactly one attempt
//! - Transport failures are retried with exponential backoff
//! - Whatever still fails is kept in a capped dead-letter log
//!
//! Nothing here feeds back into the broker session: a storage outage costs
//! data points, never commands.

pub mod dead_letter;
pub mod error;
pub mod forwarder;
pub mod forwarder_handle;
pub mod influx_writer;
pub mod line_protocol;

pub use error::ForwardError;
pub use forwarder::TelemetryForwarder;
pub use forwarder_handle::ForwarderHandle;

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

/// Measurement and tag the weather points are stored under
#[derive(Deserialize, Serialize, Clone, Debug, PartialEq)]
#[serde(default)]
pub struct SeriesConfig {
    pub measurement: String,
    pub host_tag: String,
}

impl Default for SeriesConfig {
    fn default() -> Self {
        Self {
            measurement: "weather".to_string(),
            host_tag: "pico".to_string(),
        }
    }
}

/// Time-series endpoint settings
#[derive(Deserialize, Serialize, Clone, PartialEq)]
#[serde(default)]
pub struct StorageConfig {
    pub base_url: String,
    pub org: String,
    pub bucket: String,
    pub token: String,
    pub request_timeout_secs: u64,
    #[serde(flatten)]
    pub series: SeriesConfig,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8086".to_string(),
            org: String::new(),
            bucket: "sensordata".to_string(),
            token: String::new(),
            request_timeout_secs: 10,
            series: SeriesConfig::default(),
        }
    }
}

impl StorageConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

impl fmt::Debug for StorageConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StorageConfig")
            .field("base_url", &self.base_url)
            .field("org", &self.org)
            .field("bucket", &self.bucket)
            .field("token", &"***")
            .field("request_timeout_secs", &self.request_timeout_secs)
            .field("series", &self.series)
            .finish()
    }
}

/// Queue, retry and dead-letter settings of the forwarding worker
#[derive(Deserialize, Serialize, Clone, Debug, PartialEq)]
#[serde(default)]
pub struct ForwarderConfig {
    pub queue_capacity: usize,
    /// How long the event loop waits for queue space before dropping a reading
    pub enqueue_timeout_ms: u64,
    pub max_retries: u32,
    pub retry_base_delay_ms: u64,
    pub retry_max_delay_ms: u64,
    pub dead_letter_capacity: usize,
    pub dead_letter_path: Option<PathBuf>,
}

impl Default for ForwarderConfig {
    fn default() -> Self {
        Self {
            queue_capacity: 64,
            enqueue_timeout_ms: 2_000,
            max_retries: 3,
            retry_base_delay_ms: 500,
            retry_max_delay_ms: 10_000,
            dead_letter_capacity: 100,
            dead_letter_path: None,
        }
    }
}

impl ForwarderConfig {
    pub fn enqueue_timeout(&self) -> Duration {
        Duration::from_millis(self.enqueue_timeout_ms)
    }
}
