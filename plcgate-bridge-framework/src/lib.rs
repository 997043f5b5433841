//! plcgate Bridge Framework
//!
//! Common abstractions for building bridges that mirror fieldbus devices onto MQTT.
//!
//! # Overview
//!
//! This framework provides:
//! - [`BridgeConfig`] trait for configuration loading and validation
//! - [`BridgeRunner`] for managing bridge lifecycle (startup, shutdown, signal handling)
//! - [`Bus`] seam and its MQTT implementation [`Publisher`]
//! - [`BusEvent`] stream of connection lifecycle changes and inbound messages
//! - [`BridgeArgs`] for common CLI argument parsing
//! - [`BridgeStatus`] for standardized status reporting
//!
//! Bridges normally go through [`run_bridge`], which loads the configuration
//! named on the command line, connects, hands the runner to a setup closure
//! and serves until Ctrl+C.

mod args;
mod config;
mod error;
mod publisher;
mod pump;
mod runner;
mod status;

pub use args::BridgeArgs;
pub use config::BridgeConfig;
pub use error::{BridgeError, Result};
pub use publisher::{Bus, PublishStats, Publisher};
pub use pump::{BusEvent, EVENT_QUEUE_CAPACITY, classify, run_event_pump};
pub use runner::{BridgeRunner, run_bridge};
pub use status::{BridgeState, BridgeStatus, StatusPublisher};

// Re-export commonly used types from plcgate-common
pub use plcgate_common::{LoggingConfig, MqttConfig};
