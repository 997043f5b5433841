//! Entity model: groups, per-entity descriptors and live state.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use plcgate_common::topics::{self, TopicBuilder};

use crate::command::StopPolicy;
use crate::error::GatewayError;
use crate::machine::{EntityState, Event};

/// Kind of device memory a group lives in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DataKind {
    /// Single-bit coils.
    #[serde(alias = "coil")]
    Bit,
    /// 16-bit holding registers.
    Register,
}

impl DataKind {
    /// Largest read the Modbus protocol allows in one request.
    pub fn max_read(&self) -> usize {
        match self {
            DataKind::Bit => 2000,
            DataKind::Register => 125,
        }
    }
}

/// What a group of entities represents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityType {
    BinarySensor,
    Button,
    Relay,
    Light,
    Switch,
    Sensor,
    #[serde(alias = "blind")]
    Cover,
}

/// State machine variant driving an entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MachineKind {
    Binary,
    Button,
    Sensor,
    Cover,
}

impl EntityType {
    /// Return the string name for this entity type.
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityType::BinarySensor => "binary_sensor",
            EntityType::Button => "button",
            EntityType::Relay => "relay",
            EntityType::Light => "light",
            EntityType::Switch => "switch",
            EntityType::Sensor => "sensor",
            EntityType::Cover => "cover",
        }
    }

    pub fn machine(&self) -> MachineKind {
        match self {
            EntityType::BinarySensor | EntityType::Relay | EntityType::Light | EntityType::Switch => {
                MachineKind::Binary
            }
            EntityType::Button => MachineKind::Button,
            EntityType::Sensor => MachineKind::Sensor,
            EntityType::Cover => MachineKind::Cover,
        }
    }

    /// Whether a writable group of this type takes `set` commands.
    pub fn accepts_commands(&self) -> bool {
        !matches!(self, EntityType::BinarySensor | EntityType::Button)
    }

    /// Home Assistant component announced for this type.
    pub fn component(&self, read_only: bool) -> &'static str {
        match (self, read_only) {
            (EntityType::BinarySensor | EntityType::Button, _) => "binary_sensor",
            (EntityType::Relay | EntityType::Light | EntityType::Switch, true) => "binary_sensor",
            (EntityType::Relay | EntityType::Switch, false) => "switch",
            (EntityType::Light, false) => "light",
            (EntityType::Sensor, true) => "sensor",
            (EntityType::Sensor, false) => "number",
            (EntityType::Cover, _) => "cover",
        }
    }
}

/// Immutable description shared by every entity of a group.
#[derive(Debug, Clone, PartialEq)]
pub struct GroupDescriptor {
    pub id: String,
    pub data_kind: DataKind,
    pub entity_type: EntityType,
    /// Words (or bits) per entity, at least one.
    pub words_per_item: u16,
    pub read_offset: u16,
    pub write_offset: u16,
    pub read_only: bool,
    /// Whether `state` publishes are retained.
    pub retain_state: bool,
    /// Width of a module in topic coordinates.
    pub slot_size: usize,
    pub stop_policy: StopPolicy,
    /// Discovery fields applied to every entity of the group.
    pub defaults: Map<String, Value>,
}

impl GroupDescriptor {
    /// Whether commands can be routed to entities of this group.
    pub fn accepts_commands(&self) -> bool {
        !self.read_only && self.entity_type.accepts_commands()
    }

    /// Address of the entity at `index`, or `None` past the 16-bit space.
    pub fn address_of(&self, offset: u16, index: usize) -> Option<u16> {
        index
            .checked_mul(usize::from(self.words_per_item))
            .and_then(|scaled| scaled.checked_add(usize::from(offset)))
            .and_then(|address| u16::try_from(address).ok())
    }
}

/// Immutable per-entity metadata.
#[derive(Debug, Clone, PartialEq)]
pub struct EntityDescriptor {
    /// Empty for inert entities.
    pub display_name: String,
    pub group_id: String,
    pub index: usize,
    pub read_address: u16,
    pub write_address: u16,
    pub unique_id: String,
    pub base_topic: String,
    /// Discovery fields overriding the group defaults.
    pub overrides: Map<String, Value>,
}

impl EntityDescriptor {
    /// Describe the entity at `index` of `group`.
    ///
    /// Returns `None` when its addresses do not fit the 16-bit space.
    pub fn new(
        group: &GroupDescriptor,
        index: usize,
        display_name: impl Into<String>,
        overrides: Map<String, Value>,
        topics: &TopicBuilder,
    ) -> Option<Self> {
        let display_name = display_name.into();
        let unique_id = if display_name.is_empty() {
            String::new()
        } else {
            topics::slugify(&format!("{} {}", display_name, group.id))
        };

        Some(Self {
            read_address: group.address_of(group.read_offset, index)?,
            write_address: group.address_of(group.write_offset, index)?,
            base_topic: topics.entity_base(&group.id, index, group.slot_size),
            group_id: group.id.clone(),
            index,
            display_name,
            unique_id,
            overrides,
        })
    }

    /// Entities without a name are neither processed nor announced.
    pub fn is_inert(&self) -> bool {
        self.display_name.is_empty()
    }

    /// Full topic for one suffix below the entity base.
    pub fn topic(&self, suffix: &str) -> String {
        topics::join(&self.base_topic, suffix)
    }
}

/// A bus message produced from entity state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Publish {
    pub topic: String,
    pub payload: String,
    pub retain: bool,
}

/// One mirrored point: its description and live state.
#[derive(Debug, Clone, PartialEq)]
pub struct Entity {
    pub descriptor: EntityDescriptor,
    pub state: EntityState,
}

impl Entity {
    pub fn new(descriptor: EntityDescriptor, group: &GroupDescriptor) -> Self {
        Self {
            descriptor,
            state: EntityState::initial(group.entity_type.machine()),
        }
    }

    /// Feed one sample window and return the resulting publishes.
    pub fn process(
        &mut self,
        group: &GroupDescriptor,
        now_ms: u64,
        window: &[u16],
    ) -> Result<Vec<Publish>, GatewayError> {
        let events = self.state.process(group, now_ms, window)?;
        Ok(events
            .into_iter()
            .map(|Event { suffix, payload, retain }| Publish {
                topic: self.descriptor.topic(suffix),
                payload,
                retain,
            })
            .collect())
    }

    /// Forget the last sample.
    pub fn reset(&mut self) {
        self.state.reset();
    }
}
