//! MQTT gateway for Modbus devices.
//!
//! This gateway polls coils and holding registers of one Modbus device
//! (TCP or RTU/serial), turns them into entity state and publishes the
//! changes to MQTT. Commands received on MQTT are written back to the
//! device, and every entity is announced through Home Assistant discovery.
//!
//! # Topics
//!
//! ```text
//! <prefix>/<group>/<module>-<slot>/<suffix>
//! ```
//!
//! Where:
//! - `<group>` - Entity group id from configuration
//! - `<module>-<slot>` - 1-based coordinate of the entity within its group
//! - `<suffix>` - `state`, `set`, `click`, `long`, `target`, `position`,
//!   `t_up`, `t_dn` or `config`

pub mod availability;
pub mod command;
pub mod config;
pub mod discovery;
pub mod entity;
pub mod error;
pub mod gateway;
pub mod machine;
pub mod scheduler;
pub mod transport;

pub use availability::{Availability, AvailabilityMonitor};
pub use config::{ConfigError, GatewayConfig};
pub use error::GatewayError;
pub use gateway::{Gateway, GatewaySettings};
pub use scheduler::{PollJob, PollScheduler};
pub use transport::{ModbusTransport, Transport, TransportError};
