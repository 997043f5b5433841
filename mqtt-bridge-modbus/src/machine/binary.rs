use super::{Event, suffix};

const ON: &str = "ON";
const OFF: &str = "OFF";

/// On/off point.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BinaryState {
    pub value: Option<bool>,
}

impl BinaryState {
    pub(crate) fn process(&mut self, window: &[u16], retain: bool, events: &mut Vec<Event>) {
        let value = window[0] != 0;
        self.update(value, retain, events);
    }

    /// Record `value`, emitting `state` if it changed. Returns the previous value.
    pub(crate) fn update(
        &mut self,
        value: bool,
        retain: bool,
        events: &mut Vec<Event>,
    ) -> Option<bool> {
        let previous = self.value;
        if previous != Some(value) {
            events.push(Event::new(suffix::STATE, if value { ON } else { OFF }, retain));
            self.value = Some(value);
        }
        previous
    }
}
