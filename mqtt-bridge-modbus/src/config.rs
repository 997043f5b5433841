//! Configuration for the Modbus gateway.

use std::collections::HashSet;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

use plcgate_bridge_framework::{BridgeConfig, BridgeError, LoggingConfig, MqttConfig};
use plcgate_common::topics::{self, TopicBuilder};
use plcgate_common::{AVAILABILITY_TOPIC, DISCOVERY_PREFIX, TOPIC_PREFIX};

use crate::command::StopPolicy;
use crate::discovery::DiscoverySettings;
use crate::entity::{DataKind, Entity, EntityDescriptor, EntityType, GroupDescriptor, MachineKind};
use crate::gateway::GatewaySettings;
use crate::scheduler::PollJob;
use crate::transport::SerialLine;

/// Configuration errors. All of them are fatal at startup.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("Failed to parse config: {0}")]
    Parse(#[from] json5::Error),
    #[error("Validation error: {0}")]
    Validation(String),
    #[error("Duplicate entity '{unique_id}' in group '{group}'")]
    DuplicateEntity { unique_id: String, group: String },
    #[error("Group '{group}': {reason}")]
    MalformedGroup { group: String, reason: String },
}

/// Complete gateway configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    /// MQTT broker settings
    #[serde(default)]
    pub mqtt: MqttConfig,

    /// Modbus device settings
    pub modbus: ModbusConfig,

    /// Topic layout and loop timing
    #[serde(default)]
    pub gateway: GatewaySection,

    /// Entity groups, polled in this order
    pub entity_groups: Vec<EntityGroupConfig>,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Modbus device configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModbusConfig {
    /// Connection type and address
    pub connection: ConnectionConfig,

    /// Modbus unit/slave ID
    #[serde(default = "default_unit_id")]
    pub unit_id: u8,

    /// Timeout for connecting and for every request, in milliseconds
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
}

fn default_unit_id() -> u8 {
    1
}

fn default_timeout_ms() -> u64 {
    1000
}

/// Connection configuration (TCP or RTU).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ConnectionConfig {
    /// Modbus TCP connection
    Tcp {
        /// Host address (IP or hostname)
        host: String,
        /// TCP port (default: 502)
        #[serde(default = "default_modbus_port")]
        port: u16,
    },
    /// Modbus RTU (serial) connection
    Rtu {
        /// Serial port path (e.g., "/dev/ttyUSB0" or "COM1")
        port: String,
        /// Baud rate (default: 9600)
        #[serde(default = "default_baud_rate")]
        baud_rate: u32,
        /// Data bits (default: 8)
        #[serde(default = "default_data_bits")]
        data_bits: u8,
        /// Parity: "none", "even", or "odd" (default: "none")
        #[serde(default = "default_parity")]
        parity: String,
        /// Stop bits: 1 or 2 (default: 1)
        #[serde(default = "default_stop_bits")]
        stop_bits: u8,
    },
}

fn default_modbus_port() -> u16 {
    502
}

fn default_baud_rate() -> u32 {
    9600
}

fn default_data_bits() -> u8 {
    8
}

fn default_parity() -> String {
    "none".to_string()
}

fn default_stop_bits() -> u8 {
    1
}

/// Topic layout, discovery and loop timing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewaySection {
    #[serde(default = "default_topic_prefix")]
    pub topic_prefix: String,

    #[serde(default = "default_availability_topic")]
    pub availability_topic: String,

    #[serde(default = "default_discovery_prefix")]
    pub discovery_prefix: String,

    /// Node id segment of discovery topics
    #[serde(default = "default_node_id")]
    pub node_id: String,

    /// Poll loop cadence in milliseconds
    #[serde(default = "default_tick_ms")]
    pub tick_ms: u64,

    /// Pause after a failed read, write or probe, in milliseconds
    #[serde(default = "default_retry_backoff_ms")]
    pub retry_backoff_ms: u64,

    /// Coil read to check reachability while the device is unavailable
    #[serde(default)]
    pub probe_address: u16,

    /// Device block copied into every discovery message
    #[serde(default)]
    pub device: Value,
}

impl Default for GatewaySection {
    fn default() -> Self {
        Self {
            topic_prefix: default_topic_prefix(),
            availability_topic: default_availability_topic(),
            discovery_prefix: default_discovery_prefix(),
            node_id: default_node_id(),
            tick_ms: default_tick_ms(),
            retry_backoff_ms: default_retry_backoff_ms(),
            probe_address: 0,
            device: Value::Null,
        }
    }
}

fn default_topic_prefix() -> String {
    TOPIC_PREFIX.to_string()
}

fn default_availability_topic() -> String {
    AVAILABILITY_TOPIC.to_string()
}

fn default_discovery_prefix() -> String {
    DISCOVERY_PREFIX.to_string()
}

fn default_node_id() -> String {
    "plc".to_string()
}

fn default_tick_ms() -> u64 {
    5
}

fn default_retry_backoff_ms() -> u64 {
    500
}

/// A run of same-kind entities sharing offsets and poll cadence.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EntityGroupConfig {
    /// Group id, used in topics and unique ids
    pub id: String,

    #[serde(default)]
    pub read_offset: u16,

    #[serde(default)]
    pub write_offset: u16,

    #[serde(default = "default_read_only")]
    pub read_only: bool,

    /// `coil`/`bit` or `register`
    pub data_type: DataKind,

    /// Bits or words per entity
    #[serde(default = "default_data_size")]
    pub data_size: u16,

    /// Minimum time between two reads of the group
    #[serde(default = "default_poll_delay_ms")]
    pub poll_delay_ms: u64,

    pub entity_type: EntityType,

    /// Declared entity count, checked against `entities`
    #[serde(default)]
    pub entity_count: Option<usize>,

    /// Entities in index order; an empty name leaves a hole
    pub entities: Vec<EntityConfig>,

    /// Discovery fields for every entity of the group
    #[serde(default)]
    pub defaults: Map<String, Value>,

    /// Entities per module in topic coordinates (default: 4 for covers, 8 otherwise)
    #[serde(default)]
    pub slot_size: Option<usize>,

    /// Retain `state` publishes (default: read-only binary points only)
    #[serde(default)]
    pub retain: Option<bool>,

    #[serde(default)]
    pub stop_policy: StopPolicy,
}

fn default_read_only() -> bool {
    true
}

fn default_data_size() -> u16 {
    1
}

fn default_poll_delay_ms() -> u64 {
    250
}

/// One entity: a bare name or a name with discovery overrides.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum EntityConfig {
    Name(String),
    Detailed {
        name: String,
        #[serde(flatten)]
        overrides: Map<String, Value>,
    },
}

impl EntityConfig {
    pub fn name(&self) -> &str {
        match self {
            EntityConfig::Name(name) | EntityConfig::Detailed { name, .. } => name.trim(),
        }
    }

    pub fn overrides(&self) -> Map<String, Value> {
        match self {
            EntityConfig::Name(_) => Map::new(),
            EntityConfig::Detailed { overrides, .. } => overrides.clone(),
        }
    }
}

impl EntityGroupConfig {
    fn malformed(&self, reason: impl Into<String>) -> ConfigError {
        ConfigError::MalformedGroup {
            group: self.id.clone(),
            reason: reason.into(),
        }
    }

    /// Validate the group and build its shared descriptor.
    pub fn descriptor(&self) -> Result<GroupDescriptor, ConfigError> {
        if self.id.trim().is_empty() {
            return Err(ConfigError::Validation(
                "Entity group id cannot be empty".to_string(),
            ));
        }
        if self.id.contains(['/', '+', '#']) {
            return Err(self.malformed("id cannot contain '/', '+' or '#'"));
        }
        if self.data_size == 0 {
            return Err(self.malformed("data_size must be at least 1"));
        }

        let machine = self.entity_type.machine();
        match machine {
            MachineKind::Binary | MachineKind::Button if self.data_size != 1 => {
                return Err(self.malformed(format!(
                    "{} entities need data_size 1",
                    self.entity_type.as_str()
                )));
            }
            MachineKind::Sensor
                if self.data_type != DataKind::Register || self.data_size > 2 =>
            {
                return Err(self.malformed("sensors need register data with data_size 1 or 2"));
            }
            MachineKind::Cover if self.data_type != DataKind::Register || self.data_size != 2 => {
                return Err(self.malformed("covers need register data with data_size 2"));
            }
            _ => {}
        }

        if self.entities.is_empty() {
            return Err(self.malformed("no entities configured"));
        }
        if let Some(count) = self.entity_count {
            if count != self.entities.len() {
                return Err(self.malformed(format!(
                    "entity_count is {} but {} entities are listed",
                    count,
                    self.entities.len()
                )));
            }
        }

        let span = usize::from(self.data_size) * self.entities.len();
        if span > self.data_type.max_read() {
            return Err(self.malformed(format!(
                "reading {} values exceeds the protocol limit of {}",
                span,
                self.data_type.max_read()
            )));
        }
        if usize::from(self.read_offset) + span > usize::from(u16::MAX) + 1 {
            return Err(self.malformed("read range exceeds the 16-bit address space"));
        }

        let slot_size = self.slot_size.unwrap_or(match machine {
            MachineKind::Cover => 4,
            _ => 8,
        });
        if slot_size == 0 {
            return Err(self.malformed("slot_size must be at least 1"));
        }

        if !self.read_only && !self.entity_type.accepts_commands() {
            tracing::warn!(
                group = %self.id,
                entity_type = self.entity_type.as_str(),
                "Writable group of a type that takes no commands"
            );
        }

        let retain_state = self.retain.unwrap_or(match machine {
            MachineKind::Binary | MachineKind::Button => self.read_only,
            MachineKind::Sensor | MachineKind::Cover => false,
        });

        Ok(GroupDescriptor {
            id: self.id.clone(),
            data_kind: self.data_type,
            entity_type: self.entity_type,
            words_per_item: self.data_size,
            read_offset: self.read_offset,
            write_offset: self.write_offset,
            read_only: self.read_only,
            retain_state,
            slot_size,
            stop_policy: self.stop_policy,
            defaults: self.defaults.clone(),
        })
    }
}

impl GatewayConfig {
    /// Load configuration from a JSON5 file.
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let config: GatewayConfig = json5::from_str(&content)?;
        config.check()?;
        Ok(config)
    }

    /// Validate the configuration.
    pub fn check(&self) -> Result<(), ConfigError> {
        self.build_jobs().map(|_| ())
    }

    fn check_sections(&self) -> Result<(), ConfigError> {
        if let ConnectionConfig::Rtu {
            parity,
            data_bits,
            stop_bits,
            ..
        } = &self.modbus.connection
        {
            SerialLine::parse(parity, *data_bits, *stop_bits).map_err(ConfigError::Validation)?;
            if self.modbus.unit_id == 0 || self.modbus.unit_id > 247 {
                return Err(ConfigError::Validation(
                    "unit_id must be 1-247 on a serial line".to_string(),
                ));
            }
        }

        if self.gateway.tick_ms == 0 {
            return Err(ConfigError::Validation(
                "gateway.tick_ms must be at least 1".to_string(),
            ));
        }
        if self.gateway.topic_prefix.is_empty() || self.gateway.availability_topic.is_empty() {
            return Err(ConfigError::Validation(
                "topic_prefix and availability_topic cannot be empty".to_string(),
            ));
        }
        if self.entity_groups.is_empty() {
            return Err(ConfigError::Validation(
                "At least one entity group must be configured".to_string(),
            ));
        }

        Ok(())
    }

    /// Validate every group and build the poll jobs, in configuration order.
    pub fn build_jobs(&self) -> Result<Vec<PollJob>, ConfigError> {
        self.check_sections()?;

        let topics = TopicBuilder::new(&self.gateway.topic_prefix);
        let mut group_ids = HashSet::new();
        let mut unique_ids = HashSet::new();
        let mut jobs = Vec::with_capacity(self.entity_groups.len());

        for group_config in &self.entity_groups {
            let group = group_config.descriptor()?;
            if !group_ids.insert(group.id.clone()) {
                return Err(ConfigError::Validation(format!(
                    "Duplicate entity group id '{}'",
                    group.id
                )));
            }

            let mut entities = Vec::with_capacity(group_config.entities.len());
            for (index, entity_config) in group_config.entities.iter().enumerate() {
                let name = entity_config.name();
                let descriptor = EntityDescriptor::new(
                    &group,
                    index,
                    name,
                    entity_config.overrides(),
                    &topics,
                )
                .ok_or_else(|| {
                    group_config.malformed(format!(
                        "entity {} lies outside the 16-bit address space",
                        index
                    ))
                })?;

                if !descriptor.is_inert() {
                    if descriptor.unique_id.is_empty() {
                        return Err(group_config.malformed(format!(
                            "entity name '{}' yields an empty id",
                            name
                        )));
                    }
                    if !unique_ids.insert(descriptor.unique_id.clone()) {
                        return Err(ConfigError::DuplicateEntity {
                            unique_id: descriptor.unique_id,
                            group: group.id.clone(),
                        });
                    }
                }
                entities.push(Entity::new(descriptor, &group));
            }

            jobs.push(PollJob::new(group, entities, group_config.poll_delay_ms));
        }

        Ok(jobs)
    }

    /// Runtime settings of the gateway loop.
    pub fn gateway_settings(&self) -> GatewaySettings {
        GatewaySettings {
            topic_prefix: self.gateway.topic_prefix.clone(),
            availability_topic: self.gateway.availability_topic.clone(),
            discovery: DiscoverySettings {
                prefix: self.gateway.discovery_prefix.clone(),
                node_id: topics::slugify(&self.gateway.node_id),
                device: self.gateway.device.clone(),
            },
            tick: Duration::from_millis(self.gateway.tick_ms),
            retry_backoff: Duration::from_millis(self.gateway.retry_backoff_ms),
            probe_address: self.gateway.probe_address,
        }
    }
}

impl BridgeConfig for GatewayConfig {
    fn mqtt(&self) -> &MqttConfig {
        &self.mqtt
    }

    fn logging(&self) -> &LoggingConfig {
        &self.logging
    }

    fn topic_prefix(&self) -> &str {
        &self.gateway.topic_prefix
    }

    fn availability_topic(&self) -> &str {
        &self.gateway.availability_topic
    }

    fn validate(&self) -> plcgate_bridge_framework::Result<()> {
        self.check()
            .map_err(|e| BridgeError::validation(e.to_string()))
    }
}
