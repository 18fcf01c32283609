//! Threshold rule deciding the state of the device's warning LED
//!
//! ```text
//! temperature > threshold  ──► LED ON
//! temperature ≤ threshold  ──► LED OFF
//! no temperature           ──► no command
//! ```
//!
//! Every reading with a temperature produces a command, also when it repeats
//! the previous one. An optional hysteresis band keeps readings close to the
//! threshold from toggling the LED back and forth.

pub mod command;

pub use command::ActuationCommand;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::mqtt::message_router::Reading;

pub const DEFAULT_THRESHOLD: f64 = 25.0;

#[derive(Deserialize, Serialize, Clone, Debug, PartialEq)]
#[serde(default)]
pub struct DecisionConfig {
    /// Temperature in °C above which the LED is switched on
    pub threshold: f64,
    /// Half-width of the band around the threshold in °C, 0 disables it
    pub hysteresis: f64,
}

impl Default for DecisionConfig {
    fn default() -> Self {
        Self {
            threshold: DEFAULT_THRESHOLD,
            hysteresis: 0.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Command(ActuationCommand),
    NoAction,
}

/// Plain threshold rule, no memory
pub fn decide(reading: &Reading, threshold: f64) -> Decision {
    match reading.temperature() {
        Some(t) if t > threshold => Decision::Command(ActuationCommand::On),
        Some(_) => Decision::Command(ActuationCommand::Off),
        None => Decision::NoAction,
    }
}

/// Applies [`decide`] with the configured threshold.
///
/// Only remembers the last command when a hysteresis band is configured;
/// without one every call is independent of the previous ones.
#[derive(Debug, Clone)]
pub struct DecisionEngine {
    threshold: f64,
    hysteresis: f64,
    last_command: Option<ActuationCommand>,
}

impl DecisionEngine {
    pub fn new(config: &DecisionConfig) -> Self {
        Self {
            threshold: config.threshold,
            hysteresis: config.hysteresis.max(0.0),
            last_command: None,
        }
    }

    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    pub fn evaluate(&mut self, reading: &Reading) -> Decision {
        if self.hysteresis == 0.0 {
            return decide(reading, self.threshold);
        }

        let Some(temperature) = reading.temperature() else {
            return Decision::NoAction;
        };

        let in_band = temperature > self.threshold - self.hysteresis
            && temperature <= self.threshold + self.hysteresis;

        let decision = match (in_band, self.last_command) {
            (true, Some(previous)) => {
                debug!(
                    "{} °C within ±{} of {}, holding {}",
                    temperature, self.hysteresis, self.threshold, previous
                );
                Decision::Command(previous)
            }
            _ => decide(reading, self.threshold),
        };

        if let Decision::Command(command) = decision {
            self.last_command = Some(command);
        }
        decision
    }
}
