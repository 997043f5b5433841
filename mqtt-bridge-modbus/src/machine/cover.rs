use super::{Event, suffix};

/// Bit in word 0 flagging an active movement target.
pub const MOVE_FLAG: u16 = 0x80;

/// Payload published on `target` while no movement is requested.
pub const NO_TARGET: &str = "none";

/// Motion label derived from position and target.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MotionState {
    Stopped,
    Opening,
    Closing,
    Open,
    Closed,
}

impl MotionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            MotionState::Stopped => "stopped",
            MotionState::Opening => "opening",
            MotionState::Closing => "closing",
            MotionState::Open => "open",
            MotionState::Closed => "closed",
        }
    }

    pub fn derive(position: u8, target: Option<u8>) -> Self {
        let Some(target) = target else {
            return MotionState::Stopped;
        };
        match (position, target) {
            (p, t) if p < t => MotionState::Opening,
            (p, t) if p > t => MotionState::Closing,
            (0, 0) => MotionState::Closed,
            (100, 100) => MotionState::Open,
            _ => MotionState::Stopped,
        }
    }
}

/// Fields decoded from one two-word cover sample.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CoverReading {
    pub position: u8,
    pub target: Option<u8>,
    pub travel_up_secs: u8,
    pub travel_down_secs: u8,
}

impl CoverReading {
    /// Word 0: position in the high byte, movement flag and target in the
    /// low byte. Word 1: travel up seconds high, travel down seconds low.
    pub fn decode(word0: u16, word1: u16) -> Self {
        let [position, command] = word0.to_be_bytes();
        let [travel_up_secs, travel_down_secs] = word1.to_be_bytes();
        let target = (u16::from(command) & MOVE_FLAG != 0).then_some(command & 0x7f);
        Self {
            position,
            target,
            travel_up_secs,
            travel_down_secs,
        }
    }
}

/// Motorized cover.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CoverState {
    pub last: Option<CoverReading>,
    pub motion: Option<MotionState>,
}

impl CoverState {
    pub(crate) fn process(&mut self, window: &[u16], retain: bool, events: &mut Vec<Event>) {
        let reading = CoverReading::decode(window[0], window[1]);
        let last = self.last;
        let changed = |field: fn(&CoverReading) -> Option<u8>| {
            last.as_ref().map(field) != Some(field(&reading))
        };

        if changed(|r| r.target) {
            let payload = match reading.target {
                Some(target) => target.to_string(),
                None => NO_TARGET.to_string(),
            };
            events.push(Event::new(suffix::TARGET, payload, retain));
        }
        if changed(|r| Some(r.position)) {
            events.push(Event::new(suffix::POSITION, reading.position, retain));
        }
        if changed(|r| Some(r.travel_up_secs)) {
            events.push(Event::new(suffix::T_UP, reading.travel_up_secs, retain));
        }
        if changed(|r| Some(r.travel_down_secs)) {
            events.push(Event::new(suffix::T_DN, reading.travel_down_secs, retain));
        }
        self.last = Some(reading);

        let motion = MotionState::derive(reading.position, reading.target);
        if self.motion != Some(motion) {
            events.push(Event::new(suffix::STATE, motion.as_str(), retain));
            self.motion = Some(motion);
        }
    }

    /// Target of the last sample, if a movement is in progress.
    pub fn current_target(&self) -> Option<u8> {
        self.last.and_then(|r| r.target)
    }

    /// Travel times of the last sample as `(up, down)` seconds.
    pub fn travel_times(&self) -> Option<(u8, u8)> {
        self.last.map(|r| (r.travel_up_secs, r.travel_down_secs))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(state: &mut CoverState, word0: u16, word1: u16) -> Vec<(&'static str, String)> {
        let mut events = Vec::new();
        state.process(&[word0, word1], false, &mut events);
        events.into_iter().map(|e| (e.suffix, e.payload)).collect()
    }

    fn owned(pairs: &[(&'static str, &str)]) -> Vec<(&'static str, String)> {
        pairs.iter().map(|(s, p)| (*s, p.to_string())).collect()
    }

    #[test]
    fn test_first_sample_publishes_everything_in_order() {
        let mut state = CoverState::default();
        let events = sample(&mut state, 0x80 | 50, (10 << 8) | 5);

        assert_eq!(
            events,
            owned(&[
                ("target", "50"),
                ("position", "0"),
                ("t_up", "10"),
                ("t_dn", "5"),
                ("state", "opening"),
            ])
        );
    }

    #[test]
    fn test_fields_publish_independently() {
        let mut state = CoverState::default();
        sample(&mut state, 0x80 | 50, (10 << 8) | 5);

        let events = sample(&mut state, (20 << 8) | 0x80 | 50, (10 << 8) | 5);
        assert_eq!(events, owned(&[("position", "20")]));

        let events = sample(&mut state, (20 << 8) | 0x80 | 50, (12 << 8) | 5);
        assert_eq!(events, owned(&[("t_up", "12")]));
    }

    #[test]
    fn test_stop_clears_target() {
        let mut state = CoverState::default();
        sample(&mut state, (30 << 8) | 0x80 | 50, 0);

        let events = sample(&mut state, (40 << 8) | 50, 0);
        assert_eq!(
            events,
            owned(&[("target", "none"), ("position", "40"), ("state", "stopped")])
        );
        assert_eq!(state.current_target(), None);
    }

    #[test]
    fn test_end_positions() {
        let mut state = CoverState::default();
        let events = sample(&mut state, (100 << 8) | 0x80 | 100, 0);
        assert_eq!(events.last().unwrap(), &("state", "open".to_string()));

        let events = sample(&mut state, 0x80, 0);
        assert_eq!(events.last().unwrap(), &("state", "closed".to_string()));

        let events = sample(&mut state, (60 << 8) | 0x80 | 60, 0);
        assert_eq!(events.last().unwrap(), &("state", "stopped".to_string()));

        let events = sample(&mut state, (70 << 8) | 0x80 | 10, 0);
        assert_eq!(events.last().unwrap(), &("state", "closing".to_string()));
    }

    #[test]
    fn test_derive() {
        assert_eq!(MotionState::derive(0, None), MotionState::Stopped);
        assert_eq!(MotionState::derive(100, None), MotionState::Stopped);
        assert_eq!(MotionState::derive(10, Some(50)), MotionState::Opening);
        assert_eq!(MotionState::derive(90, Some(50)), MotionState::Closing);
        assert_eq!(MotionState::derive(0, Some(0)), MotionState::Closed);
        assert_eq!(MotionState::derive(100, Some(100)), MotionState::Open);
        assert_eq!(MotionState::derive(50, Some(50)), MotionState::Stopped);
    }

    #[test]
    fn test_accessors() {
        let mut state = CoverState::default();
        assert_eq!(state.travel_times(), None);
        sample(&mut state, 0x80 | 25, (30 << 8) | 20);
        assert_eq!(state.current_target(), Some(25));
        assert_eq!(state.travel_times(), Some((30, 20)));
    }
}
