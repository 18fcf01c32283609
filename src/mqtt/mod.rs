//! # MQTT Integration Module
//!
//! Owns everything on the broker side of the bridge: the session with the
//! broker, the topic set it subscribes to and the translation of raw
//! publishes into typed readings.
//!
//! ## Module Architecture
//!
//! ```text
//! mqtt/
//! ├── config.rs          - Broker and topic settings
//! ├── client.rs          - Request seam over rumqttc's AsyncClient
//! ├── subscriptions.rs   - Fixed topic set, re-applied on every connect
//! ├── message_router.rs  - Payload validation into Readings
//! └── mqtt_handler.rs    - Connection state machine
//! ```
//!
//! ## Delivery Semantics
//!
//! Subscriptions and command publishes use QoS 0. A lost sensor reading is
//! replaced by the next one ten seconds later, and commands are re-derived
//! from every reading, so at-most-once delivery is sufficient.

pub mod client;
pub mod config;
pub mod message_router;
pub mod mqtt_handler;
pub mod subscriptions;
