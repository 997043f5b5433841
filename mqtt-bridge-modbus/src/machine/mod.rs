//! Per-entity state machines.
//!
//! Every variant turns a raw sample window into zero or more events and
//! only emits when a decoded value differs from the previous one. A reset
//! state treats the next sample as a change.

mod binary;
mod button;
mod cover;
mod sensor;

pub use binary::BinaryState;
pub use button::{ButtonState, CLICK_PAUSE_MS, LONG_PRESS_MS};
pub use cover::{CoverReading, CoverState, MOVE_FLAG, MotionState, NO_TARGET};
pub use sensor::SensorState;

use crate::entity::{GroupDescriptor, MachineKind};
use crate::error::GatewayError;

/// Topic suffixes below an entity base.
pub mod suffix {
    pub const STATE: &str = "state";
    pub const SET: &str = "set";
    pub const CONFIG: &str = "config";
    pub const LONG: &str = "long";
    pub const CLICK: &str = "click";
    pub const TARGET: &str = "target";
    pub const POSITION: &str = "position";
    pub const T_UP: &str = "t_up";
    pub const T_DN: &str = "t_dn";
}

/// A publish request relative to the entity base topic.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Event {
    pub suffix: &'static str,
    pub payload: String,
    pub retain: bool,
}

impl Event {
    pub(crate) fn new(suffix: &'static str, payload: impl ToString, retain: bool) -> Self {
        Self {
            suffix,
            payload: payload.to_string(),
            retain,
        }
    }
}

/// Live state of one entity, tagged by machine kind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EntityState {
    Binary(BinaryState),
    Button(ButtonState),
    Sensor(SensorState),
    Cover(CoverState),
}

impl EntityState {
    /// Unset state for a machine kind.
    pub fn initial(kind: MachineKind) -> Self {
        match kind {
            MachineKind::Binary => EntityState::Binary(BinaryState::default()),
            MachineKind::Button => EntityState::Button(ButtonState::default()),
            MachineKind::Sensor => EntityState::Sensor(SensorState::default()),
            MachineKind::Cover => EntityState::Cover(CoverState::default()),
        }
    }

    pub fn kind(&self) -> MachineKind {
        match self {
            EntityState::Binary(_) => MachineKind::Binary,
            EntityState::Button(_) => MachineKind::Button,
            EntityState::Sensor(_) => MachineKind::Sensor,
            EntityState::Cover(_) => MachineKind::Cover,
        }
    }

    /// Consume one sample window taken at `now_ms`.
    ///
    /// A window whose width differs from the group's item width is rejected
    /// before any state is touched.
    pub fn process(
        &mut self,
        group: &GroupDescriptor,
        now_ms: u64,
        window: &[u16],
    ) -> Result<Vec<Event>, GatewayError> {
        let expected = usize::from(group.words_per_item);
        if window.len() != expected {
            return Err(GatewayError::DataLengthMismatch {
                group: group.id.clone(),
                expected,
                actual: window.len(),
            });
        }

        let mut events = Vec::new();
        match self {
            EntityState::Binary(state) => state.process(window, group.retain_state, &mut events),
            EntityState::Button(state) => {
                state.process(window, now_ms, group.retain_state, &mut events)
            }
            EntityState::Sensor(state) => state.process(window, group.retain_state, &mut events),
            EntityState::Cover(state) => state.process(window, group.retain_state, &mut events),
        }
        Ok(events)
    }

    /// Return to the unset state.
    pub fn reset(&mut self) {
        *self = Self::initial(self.kind());
    }
}
