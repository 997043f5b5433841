//! Device reachability tracking.

use std::time::Duration;

use plcgate_common::{PAYLOAD_OFFLINE, PAYLOAD_ONLINE};

use crate::error::GatewayError;
use crate::transport::{Transport, TransportError};

/// Whether the device is currently reachable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Availability {
    Available,
    /// Initial state, until a probe read succeeds.
    #[default]
    Unavailable,
}

impl std::fmt::Display for Availability {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.payload())
    }
}

impl Availability {
    /// Payload announced on the availability topic.
    pub fn payload(&self) -> &'static str {
        match self {
            Availability::Available => PAYLOAD_ONLINE,
            Availability::Unavailable => PAYLOAD_OFFLINE,
        }
    }
}

/// Tracks transitions between available and unavailable.
///
/// The monitor only records; the gateway reacts to the transitions it
/// reports (announcements, state reset).
#[derive(Debug, Clone)]
pub struct AvailabilityMonitor {
    state: Availability,
    changed_at_ms: u64,
    consecutive_failures: u32,
    last_error: Option<String>,
    backoff: Duration,
    probe_address: u16,
}

impl AvailabilityMonitor {
    pub fn new(backoff: Duration, probe_address: u16) -> Self {
        Self {
            state: Availability::Unavailable,
            changed_at_ms: 0,
            consecutive_failures: 0,
            last_error: None,
            backoff,
            probe_address,
        }
    }

    pub fn state(&self) -> Availability {
        self.state
    }

    pub fn is_available(&self) -> bool {
        self.state == Availability::Available
    }

    /// Time of the last transition.
    pub fn changed_at_ms(&self) -> u64 {
        self.changed_at_ms
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.consecutive_failures
    }

    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    /// Record a successful transport call. Returns `true` on transition.
    pub fn record_success(&mut self, now_ms: u64) -> bool {
        self.consecutive_failures = 0;
        self.transition(Availability::Available, now_ms)
    }

    /// Record a failed transport call. Returns `true` on transition.
    pub fn record_failure(&mut self, now_ms: u64, error: &GatewayError) -> bool {
        self.consecutive_failures = self.consecutive_failures.saturating_add(1);
        self.last_error = Some(error.to_string());
        self.transition(Availability::Unavailable, now_ms)
    }

    fn transition(&mut self, next: Availability, now_ms: u64) -> bool {
        if self.state == next {
            return false;
        }
        self.state = next;
        self.changed_at_ms = now_ms;
        true
    }

    /// Lightweight reachability check: read one coil.
    pub async fn probe<T: Transport>(&self, transport: &mut T) -> Result<(), TransportError> {
        transport.read_bits(self.probe_address, 1).await.map(|_| ())
    }

    /// Wait out the retry window after a failure.
    pub async fn backoff(&self) {
        if !self.backoff.is_zero() {
            tokio::time::sleep(self.backoff).await;
        }
    }
}
