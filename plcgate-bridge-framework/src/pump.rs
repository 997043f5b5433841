//! MQTT event loop pump.
//!
//! Drives the [`rumqttc::EventLoop`] and forwards connection lifecycle
//! changes and inbound messages into a bounded channel. The consumer drains
//! the channel at its own pace; when it falls behind, messages are dropped
//! and reported instead of queueing without bound.

use std::time::Duration;

use rumqttc::{Event, EventLoop, Packet};
use tokio::sync::mpsc;

/// Capacity of the channel between the pump and the bridge loop.
pub const EVENT_QUEUE_CAPACITY: usize = 256;

/// Delay before polling the event loop again after a connection error.
const RECONNECT_DELAY: Duration = Duration::from_secs(1);

/// Something the bridge loop needs to react to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BusEvent {
    /// The broker accepted a (re)connection.
    Connected,
    /// The connection to the broker was lost.
    Disconnected,
    /// A message arrived on a subscribed topic.
    Message { topic: String, payload: String },
}

/// Map a raw event loop notification to a bus event.
pub fn classify(event: &Event) -> Option<BusEvent> {
    match event {
        Event::Incoming(Packet::ConnAck(_)) => Some(BusEvent::Connected),
        Event::Incoming(Packet::Publish(publish)) => match std::str::from_utf8(&publish.payload) {
            Ok(payload) => Some(BusEvent::Message {
                topic: publish.topic.clone(),
                payload: payload.to_string(),
            }),
            Err(e) => {
                tracing::warn!(topic = %publish.topic, error = %e, "Dropping non UTF-8 payload");
                None
            }
        },
        Event::Incoming(Packet::Disconnect) => Some(BusEvent::Disconnected),
        _ => None,
    }
}

/// Forward an event without waiting; returns `false` once the receiver is gone.
fn forward(tx: &mpsc::Sender<BusEvent>, event: BusEvent) -> bool {
    match tx.try_send(event) {
        Ok(()) => true,
        Err(mpsc::error::TrySendError::Full(event)) => {
            tracing::warn!(event = ?event, "Bus event queue full, dropping event");
            true
        }
        Err(mpsc::error::TrySendError::Closed(_)) => false,
    }
}

/// Poll the event loop forever, forwarding events into `tx`.
///
/// Returns when the receiving side of the channel is dropped.
pub async fn run_event_pump(mut eventloop: EventLoop, tx: mpsc::Sender<BusEvent>) {
    let mut connected = false;

    loop {
        match eventloop.poll().await {
            Ok(event) => {
                tracing::trace!(event = ?event, "MQTT notification");
                let Some(bus_event) = classify(&event) else {
                    continue;
                };
                match bus_event {
                    BusEvent::Connected => {
                        tracing::info!("Connected to MQTT broker");
                        connected = true;
                    }
                    BusEvent::Disconnected => connected = false,
                    BusEvent::Message { .. } => {}
                }
                if !forward(&tx, bus_event) {
                    break;
                }
            }
            Err(e) => {
                if connected {
                    tracing::warn!(error = %e, "Lost connection to MQTT broker");
                    connected = false;
                    if !forward(&tx, BusEvent::Disconnected) {
                        break;
                    }
                } else {
                    tracing::debug!(error = %e, "MQTT connection attempt failed");
                }
                tokio::time::sleep(RECONNECT_DELAY).await;
            }
        }
    }

    tracing::debug!("Bus event receiver dropped, stopping pump");
}

#[cfg(test)]
mod tests {
    use super::*;
    use rumqttc::{ConnAck, ConnectReturnCode, Publish, QoS};

    #[test]
    fn test_classify_connack() {
        let event = Event::Incoming(Packet::ConnAck(ConnAck::new(
            ConnectReturnCode::Success,
            false,
        )));
        assert_eq!(classify(&event), Some(BusEvent::Connected));
    }

    #[test]
    fn test_classify_publish() {
        let event = Event::Incoming(Packet::Publish(Publish::new(
            "plc/do/1-1/set",
            QoS::AtLeastOnce,
            "ON",
        )));
        assert_eq!(
            classify(&event),
            Some(BusEvent::Message {
                topic: "plc/do/1-1/set".to_string(),
                payload: "ON".to_string(),
            })
        );
    }

    #[test]
    fn test_classify_ignores_invalid_utf8_and_acks() {
        let event = Event::Incoming(Packet::Publish(Publish::new(
            "plc/do/1-1/set",
            QoS::AtLeastOnce,
            vec![0xff, 0xfe],
        )));
        assert_eq!(classify(&event), None);
        assert_eq!(classify(&Event::Incoming(Packet::PingResp)), None);
    }

    #[test]
    fn test_forward_drops_when_full() {
        let (tx, mut rx) = mpsc::channel(1);
        assert!(forward(&tx, BusEvent::Connected));
        assert!(forward(&tx, BusEvent::Disconnected));
        assert_eq!(rx.try_recv().unwrap(), BusEvent::Connected);
        assert!(rx.try_recv().is_err());

        drop(rx);
        assert!(!forward(&tx, BusEvent::Connected));
    }
}
