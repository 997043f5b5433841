use super::{Event, suffix};

/// Unsigned integer point spanning one or two words.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SensorState {
    pub value: Option<u32>,
}

impl SensorState {
    pub(crate) fn process(&mut self, window: &[u16], retain: bool, events: &mut Vec<Event>) {
        let value = decode(window);
        if self.value != Some(value) {
            events.push(Event::new(suffix::STATE, value, retain));
            self.value = Some(value);
        }
    }
}

/// Combine words, least significant word first.
pub(crate) fn decode(window: &[u16]) -> u32 {
    match window {
        [low, high, ..] => (u32::from(*high) << 16) | u32::from(*low),
        [low] => u32::from(*low),
        [] => 0,
    }
}
