use std::time::Duration;

use tracing::{debug, error, info, warn};

use crate::mqtt::message_router::Reading;

use super::dead_letter::DeadLetterLog;
use super::error::ForwardError;
use super::influx_writer::{Ack, InfluxWriter};
use super::line_protocol::StorageWriteRequest;
use super::{ForwarderConfig, SeriesConfig};

/// Exponential backoff for transport failures
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl RetryPolicy {
    pub fn from_config(config: &ForwarderConfig) -> Self {
        Self {
            max_retries: config.max_retries,
            base_delay: Duration::from_millis(config.retry_base_delay_ms),
            max_delay: Duration::from_millis(config.retry_max_delay_ms),
        }
    }

    /// Delay before retry number `retry` (0-based): base * 2^retry, capped
    pub fn delay_for(&self, retry: u32) -> Duration {
        let factor = 2u32.saturating_pow(retry);
        self.base_delay
            .checked_mul(factor)
            .unwrap_or(self.max_delay)
            .min(self.max_delay)
    }
}

/// Counters reported when the worker stops
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ForwardStats {
    pub written: u64,
    pub failed: u64,
    pub skipped: u64,
    pub retries: u64,
}

/// Writes readings to the time-series store.
///
/// Non-204 answers are final after one attempt. Transport failures are
/// retried per [`RetryPolicy`]. Whatever still fails ends up in the
/// dead-letter log.
#[derive(Debug)]
pub struct TelemetryForwarder {
    writer: InfluxWriter,
    series: SeriesConfig,
    retry: RetryPolicy,
    dead_letters: DeadLetterLog,
    stats: ForwardStats,
}

impl TelemetryForwarder {
    pub fn new(
        writer: InfluxWriter,
        series: SeriesConfig,
        retry: RetryPolicy,
        dead_letters: DeadLetterLog,
    ) -> Self {
        Self {
            writer,
            series,
            retry,
            dead_letters,
            stats: ForwardStats::default(),
        }
    }

    pub fn stats(&self) -> &ForwardStats {
        &self.stats
    }

    pub fn dead_letters(&self) -> &DeadLetterLog {
        &self.dead_letters
    }

    /// `Ok(None)` when the reading lacks temperature or pressure and was
    /// skipped without contacting the endpoint.
    pub async fn forward(&mut self, reading: &Reading) -> Result<Option<Ack>, ForwardError> {
        let Some(request) = StorageWriteRequest::from_reading(reading, &self.series) else {
            debug!("Skipping incomplete reading: {}", reading);
            self.stats.skipped += 1;
            return Ok(None);
        };

        let mut retry = 0;
        loop {
            match self.writer.write(&request).await {
                Ok(ack) => {
                    debug!("Reading written to storage");
                    self.stats.written += 1;
                    return Ok(Some(ack));
                }
                Err(e) if e.is_retryable() && retry < self.retry.max_retries => {
                    let delay = self.retry.delay_for(retry);
                    retry += 1;
                    self.stats.retries += 1;
                    warn!(
                        "Storage write failed ({}), retry {}/{} in {:?}",
                        e, retry, self.retry.max_retries, delay
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(e) => {
                    error!("Failed to write reading to storage: {}", e);
                    self.stats.failed += 1;
                    self.dead_letters.record(request.to_line(), &e).await;
                    return Err(e);
                }
            }
        }
    }

    pub fn log_stats(&self) {
        info!(
            "Forwarder stats: {} written, {} failed, {} skipped, {} retries, {} dead letters",
            self.stats.written,
            self.stats.failed,
            self.stats.skipped,
            self.stats.retries,
            self.dead_letters.len()
        );
    }
}
