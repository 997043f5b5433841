//! Inbound command decoding.
//!
//! Decoders are pure: they map a payload plus the entity's current state to
//! a device write, or to a [`CommandError`] that is logged and dropped.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::entity::{DataKind, Entity, GroupDescriptor, MachineKind};
use crate::machine::{EntityState, MOVE_FLAG};
use crate::transport::{Transport, TransportError};

/// Reasons a command produces no write.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum CommandError {
    #[error("Unrecognized command payload '{0}'")]
    Unrecognized(String),
    #[error("Invalid cover config: {0}")]
    InvalidConfig(String),
    #[error("Entity does not accept this command")]
    NotAccepted,
}

/// How `STOP` treats the low bits of the current cover target.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StopPolicy {
    /// Write the current target without the movement flag.
    #[default]
    PreserveTarget,
    /// Write zero.
    ClearTarget,
}

/// Which command topic a message arrived on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandKind {
    Set,
    Config,
}

/// A device write produced by a command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WriteRequest {
    Bits { address: u16, values: Vec<bool> },
    Registers { address: u16, values: Vec<u16> },
}

impl WriteRequest {
    /// Issue the write on `transport`.
    pub async fn apply<T: Transport>(&self, transport: &mut T) -> Result<(), TransportError> {
        match self {
            WriteRequest::Bits { address, values } => transport.write_bits(*address, values).await,
            WriteRequest::Registers { address, values } => {
                transport.write_registers(*address, values).await
            }
        }
    }
}

/// `ON`/`1`, `OFF`/`0` or `TOGGLE`, any case.
pub fn decode_switch(payload: &str, current: Option<bool>) -> Result<bool, CommandError> {
    match payload.trim().to_ascii_uppercase().as_str() {
        "ON" | "1" => Ok(true),
        "OFF" | "0" => Ok(false),
        "TOGGLE" => Ok(!current.unwrap_or(false)),
        _ => Err(CommandError::Unrecognized(payload.to_string())),
    }
}

/// Integer payload split into `width` words, least significant first.
///
/// Negative values are written in two's complement.
pub fn decode_number(payload: &str, width: u16) -> Result<Vec<u16>, CommandError> {
    let unrecognized = || CommandError::Unrecognized(payload.to_string());
    let value: i64 = payload.trim().parse().map_err(|_| unrecognized())?;

    match width {
        1 => {
            if !(i64::from(i16::MIN)..=i64::from(u16::MAX)).contains(&value) {
                return Err(unrecognized());
            }
            Ok(vec![value as u16])
        }
        2 => {
            if !(i64::from(i32::MIN)..=i64::from(u32::MAX)).contains(&value) {
                return Err(unrecognized());
            }
            let raw = value as u32;
            Ok(vec![raw as u16, (raw >> 16) as u16])
        }
        _ => Err(CommandError::NotAccepted),
    }
}

/// Position `0..=100` (clamped), `OPEN`, `CLOSE` or `STOP` to word 0.
pub fn decode_cover(
    payload: &str,
    current_target: Option<u8>,
    policy: StopPolicy,
) -> Result<u16, CommandError> {
    let payload = payload.trim();
    if let Some(position) = parse_position(payload) {
        return Ok(u16::from(position) | MOVE_FLAG);
    }

    match payload.to_ascii_uppercase().as_str() {
        "OPEN" => Ok(100 | MOVE_FLAG),
        "CLOSE" => Ok(MOVE_FLAG),
        "STOP" => Ok(match policy {
            StopPolicy::PreserveTarget => u16::from(current_target.unwrap_or(0)) & 0x7f,
            StopPolicy::ClearTarget => 0,
        }),
        _ => Err(CommandError::Unrecognized(payload.to_string())),
    }
}

/// Integer payload clamped to `0..=100`, however many digits it has.
fn parse_position(payload: &str) -> Option<u8> {
    let digits = payload.strip_prefix(['+', '-']).unwrap_or(payload);
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let position = match payload.parse::<i64>() {
        Ok(value) => value.clamp(0, 100),
        Err(_) if payload.starts_with('-') => 0,
        Err(_) => 100,
    };
    u8::try_from(position).ok()
}

#[derive(Debug, Deserialize)]
struct TravelTimes {
    t_up: Option<u8>,
    t_dn: Option<u8>,
}

/// `{"t_up": s, "t_dn": s}` with either field optional, packed into one word.
///
/// Missing fields keep their `current` value.
pub fn decode_cover_config(payload: &str, current: (u8, u8)) -> Result<u16, CommandError> {
    let times: TravelTimes =
        serde_json::from_str(payload).map_err(|e| CommandError::InvalidConfig(e.to_string()))?;
    if times.t_up.is_none() && times.t_dn.is_none() {
        return Err(CommandError::InvalidConfig(
            "neither t_up nor t_dn given".to_string(),
        ));
    }

    let up = times.t_up.unwrap_or(current.0);
    let down = times.t_dn.unwrap_or(current.1);
    Ok(u16::from_be_bytes([up, down]))
}

/// Map a command for `entity` to the write it requires.
pub fn decode(
    kind: CommandKind,
    group: &GroupDescriptor,
    entity: &Entity,
    payload: &str,
) -> Result<WriteRequest, CommandError> {
    if !group.accepts_commands() {
        return Err(CommandError::NotAccepted);
    }
    let address = entity.descriptor.write_address;

    match (kind, &entity.state) {
        (CommandKind::Set, EntityState::Binary(state)) => {
            let value = decode_switch(payload, state.value)?;
            Ok(match group.data_kind {
                DataKind::Bit => WriteRequest::Bits {
                    address,
                    values: vec![value],
                },
                DataKind::Register => WriteRequest::Registers {
                    address,
                    values: vec![u16::from(value)],
                },
            })
        }
        (CommandKind::Set, EntityState::Sensor(_)) => Ok(WriteRequest::Registers {
            address,
            values: decode_number(payload, group.words_per_item)?,
        }),
        (CommandKind::Set, EntityState::Cover(state)) => Ok(WriteRequest::Registers {
            address,
            values: vec![decode_cover(
                payload,
                state.current_target(),
                group.stop_policy,
            )?],
        }),
        (CommandKind::Config, EntityState::Cover(state)) => {
            let current = state.travel_times().unwrap_or((0, 0));
            Ok(WriteRequest::Registers {
                address: address.checked_add(1).ok_or(CommandError::NotAccepted)?,
                values: vec![decode_cover_config(payload, current)?],
            })
        }
        _ => Err(CommandError::NotAccepted),
    }
}

/// Command topics an entity of `machine` listens on.
pub fn command_kinds(machine: MachineKind) -> &'static [CommandKind] {
    match machine {
        MachineKind::Cover => &[CommandKind::Set, CommandKind::Config],
        MachineKind::Binary | MachineKind::Sensor => &[CommandKind::Set],
        MachineKind::Button => &[],
    }
}
