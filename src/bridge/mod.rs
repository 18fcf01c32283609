//! Bridge subsystem wiring the broker session to decision and storage
//!
//! 1. [`pipeline`] - per-message path: route, decide, forward
//! 2. [`runner`] - session event loop with reconnect and shutdown
//!
//! # Architecture
//!
//! ```text
//!                               ┌──► DecisionEngine ──► AsyncClient ──► picow/control
//! Broker ──► MqttSession ──► MessageRouter
//!                               └──► ForwarderHandle ──► worker ──► InfluxDB
//! ```

pub mod pipeline;
pub mod runner;

pub use pipeline::{BridgePipeline, PipelineOutcome};
pub use runner::run_session;
