use super::binary::BinaryState;
use super::{Event, suffix};

/// A press held longer than this becomes a long press.
pub const LONG_PRESS_MS: u64 = 400;

/// A release followed by this much quiet ends a click sequence.
pub const CLICK_PAUSE_MS: u64 = 250;

const RELEASE: &str = "RELEASE";

/// Push button with click counting and long-press detection.
///
/// Timing branches only fire when the button is sampled again, so the
/// scheduler feeds every poll through here even when the bit is unchanged.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ButtonState {
    pub binary: BinaryState,
    pub click_count: u32,
    pub holding: bool,
    pub last_edge_ms: u64,
}

impl ButtonState {
    pub(crate) fn process(
        &mut self,
        window: &[u16],
        now_ms: u64,
        retain: bool,
        events: &mut Vec<Event>,
    ) {
        let pressed = window[0] != 0;
        let previous = self.binary.update(pressed, retain, events);

        if previous != Some(pressed) {
            if pressed {
                self.click_count += 1;
            } else if self.holding {
                events.push(Event::new(suffix::LONG, RELEASE, false));
                self.holding = false;
                self.click_count = 0;
            }
            self.last_edge_ms = now_ms;
            return;
        }

        let elapsed = now_ms.saturating_sub(self.last_edge_ms);
        if pressed && !self.holding {
            if elapsed > LONG_PRESS_MS {
                events.push(Event::new(suffix::LONG, self.click_count, false));
                self.holding = true;
            }
        } else if !pressed && self.click_count > 0 && elapsed > CLICK_PAUSE_MS {
            events.push(Event::new(suffix::CLICK, self.click_count, false));
            self.click_count = 0;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn feed(state: &mut ButtonState, samples: &[(u64, u16)]) -> Vec<Event> {
        let mut events = Vec::new();
        for &(now, bit) in samples {
            state.process(&[bit], now, true, &mut events);
        }
        events.retain(|e| e.suffix != suffix::STATE);
        events
    }

    #[test]
    fn test_rapid_clicks_are_counted() {
        let mut state = ButtonState::default();
        let events = feed(
            &mut state,
            &[
                (0, 0),
                (100, 1),
                (150, 0),
                (200, 1),
                (260, 0),
                (320, 1),
                (380, 0),
                (600, 0),
                (631, 0),
                (700, 0),
            ],
        );

        assert_eq!(events, vec![Event::new("click", 3, false)]);
        assert_eq!(state.click_count, 0);
    }

    #[test]
    fn test_long_press_then_release() {
        let mut state = ButtonState::default();
        let events = feed(
            &mut state,
            &[
                (0, 0),
                (10, 1),
                (200, 1),
                (411, 1),
                (800, 1),
                (900, 0),
                (1500, 0),
            ],
        );

        assert_eq!(
            events,
            vec![
                Event::new("long", 1, false),
                Event::new("long", "RELEASE", false),
            ]
        );
        assert_eq!(state.click_count, 0);
        assert!(!state.holding);
    }

    #[test]
    fn test_double_click_then_hold() {
        let mut state = ButtonState::default();
        let events = feed(
            &mut state,
            &[(0, 0), (10, 1), (60, 0), (120, 1), (300, 1), (521, 1), (600, 0)],
        );

        assert_eq!(
            events,
            vec![
                Event::new("long", 2, false),
                Event::new("long", "RELEASE", false),
            ]
        );
    }

    #[test]
    fn test_thresholds_are_exclusive() {
        let mut state = ButtonState::default();
        let events = feed(&mut state, &[(0, 0), (100, 1), (500, 1)]);
        assert!(events.is_empty());

        let events = feed(&mut state, &[(501, 1)]);
        assert_eq!(events, vec![Event::new("long", 1, false)]);
    }

    #[test]
    fn test_state_topic_still_published() {
        let mut state = ButtonState::default();
        let mut events = Vec::new();
        state.process(&[1], 0, true, &mut events);
        assert_eq!(events, vec![Event::new("state", "ON", true)]);
    }
}
