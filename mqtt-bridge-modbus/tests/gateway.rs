//! End-to-end gateway behavior against an in-memory device and bus.

use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};

use plcgate_bridge_framework::{BridgeError, Bus, BusEvent};

use mqtt_bridge_modbus::command::WriteRequest;
use mqtt_bridge_modbus::{Gateway, GatewayConfig, PollScheduler, Transport, TransportError};

const CONFIG: &str = r#"{
    modbus: { connection: { type: "tcp", host: "127.0.0.1" } },
    gateway: { retry_backoff_ms: 0, device: { identifiers: ["plc"], name: "PLC" } },
    entity_groups: [
        {
            id: "di",
            data_type: "coil",
            entity_type: "button",
            read_offset: 0,
            poll_delay_ms: 0,
            entities: ["Hall", "", "Porch"],
        },
        {
            id: "do",
            data_type: "coil",
            entity_type: "light",
            read_only: false,
            read_offset: 16,
            write_offset: 32,
            poll_delay_ms: 0,
            entities: ["Kitchen", "Garage"],
        },
        {
            id: "ai",
            data_type: "register",
            entity_type: "sensor",
            data_size: 2,
            read_offset: 0,
            poll_delay_ms: 0,
            entities: ["Energy"],
        },
        {
            id: "blind",
            data_type: "register",
            entity_type: "cover",
            data_size: 2,
            read_only: false,
            read_offset: 10,
            write_offset: 10,
            poll_delay_ms: 0,
            entities: ["Bedroom"],
        },
    ],
}"#;

#[derive(Debug)]
struct FakeTransport {
    coils: Vec<bool>,
    registers: Vec<u16>,
    fail: bool,
    short_reads: bool,
    writes: Vec<WriteRequest>,
}

impl Default for FakeTransport {
    fn default() -> Self {
        Self {
            coils: vec![false; 64],
            registers: vec![0; 64],
            fail: false,
            short_reads: false,
            writes: Vec::new(),
        }
    }
}

impl FakeTransport {
    fn check(&self) -> Result<(), TransportError> {
        if self.fail {
            return Err(TransportError::Connection("device unplugged".to_string()));
        }
        Ok(())
    }

    fn range(&self, address: u16, count: u16) -> std::ops::Range<usize> {
        let start = usize::from(address);
        let mut end = start + usize::from(count);
        if self.short_reads {
            end -= 1;
        }
        start..end
    }
}

impl Transport for FakeTransport {
    async fn read_bits(&mut self, address: u16, count: u16) -> Result<Vec<bool>, TransportError> {
        self.check()?;
        Ok(self.coils[self.range(address, count)].to_vec())
    }

    async fn read_registers(
        &mut self,
        address: u16,
        count: u16,
    ) -> Result<Vec<u16>, TransportError> {
        self.check()?;
        Ok(self.registers[self.range(address, count)].to_vec())
    }

    async fn write_bits(&mut self, address: u16, values: &[bool]) -> Result<(), TransportError> {
        self.check()?;
        self.writes.push(WriteRequest::Bits {
            address,
            values: values.to_vec(),
        });
        Ok(())
    }

    async fn write_registers(&mut self, address: u16, values: &[u16]) -> Result<(), TransportError> {
        self.check()?;
        self.writes.push(WriteRequest::Registers {
            address,
            values: values.to_vec(),
        });
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Message {
    topic: String,
    payload: String,
    retain: bool,
}

#[derive(Debug, Default)]
struct FakeBus {
    published: Mutex<Vec<Message>>,
    subscriptions: Mutex<Vec<String>>,
    /// Refuse publishes, like a client whose request queue is full.
    refusing: AtomicBool,
}

impl FakeBus {
    fn take(&self) -> Vec<Message> {
        std::mem::take(&mut *self.published.lock().unwrap())
    }

    fn subscriptions(&self) -> Vec<String> {
        self.subscriptions.lock().unwrap().clone()
    }

    fn refuse(&self, refusing: bool) {
        self.refusing.store(refusing, Ordering::SeqCst);
    }
}

impl Bus for FakeBus {
    async fn publish(
        &self,
        topic: &str,
        payload: &str,
        retain: bool,
    ) -> plcgate_bridge_framework::Result<()> {
        if self.refusing.load(Ordering::SeqCst) {
            return Err(BridgeError::Publish {
                topic: topic.to_string(),
                message: "request queue full".to_string(),
            });
        }
        self.published.lock().unwrap().push(Message {
            topic: topic.to_string(),
            payload: payload.to_string(),
            retain,
        });
        Ok(())
    }

    async fn subscribe(&self, filter: &str) -> plcgate_bridge_framework::Result<()> {
        self.subscriptions.lock().unwrap().push(filter.to_string());
        Ok(())
    }
}

fn gateway() -> Gateway<FakeTransport, FakeBus> {
    let config: GatewayConfig = json5::from_str(CONFIG).unwrap();
    let scheduler = PollScheduler::new(config.build_jobs().unwrap());
    Gateway::new(
        FakeTransport::default(),
        FakeBus::default(),
        scheduler,
        config.gateway_settings(),
    )
}

/// Gateway that has probed the device and published its first samples.
async fn online_gateway() -> Gateway<FakeTransport, FakeBus> {
    let mut gw = gateway();
    gw.step(0).await;
    gw.step(1).await;
    gw.bus().take();
    gw
}

fn msg(topic: &str, payload: &str, retain: bool) -> Message {
    Message {
        topic: topic.to_string(),
        payload: payload.to_string(),
        retain,
    }
}

#[tokio::test]
async fn test_probe_then_first_poll() {
    let mut gw = gateway();
    assert!(!gw.availability().is_available());

    gw.step(0).await;
    assert!(gw.availability().is_available());
    assert_eq!(gw.bus().take(), vec![msg("plc/availability", "online", true)]);

    gw.step(1).await;
    assert_eq!(
        gw.bus().take(),
        vec![
            msg("plc/di/1-1/state", "OFF", true),
            msg("plc/di/1-3/state", "OFF", true),
            msg("plc/do/1-1/state", "OFF", false),
            msg("plc/do/1-2/state", "OFF", false),
            msg("plc/ai/1-1/state", "0", false),
            msg("plc/blind/1-1/target", "none", false),
            msg("plc/blind/1-1/position", "0", false),
            msg("plc/blind/1-1/t_up", "0", false),
            msg("plc/blind/1-1/t_dn", "0", false),
            msg("plc/blind/1-1/state", "stopped", false),
        ]
    );
}

#[tokio::test]
async fn test_unchanged_samples_publish_nothing() {
    let mut gw = online_gateway().await;
    gw.step(2).await;
    gw.step(3).await;
    assert!(gw.bus().take().is_empty());

    gw.transport_mut().registers[0] = 7;
    gw.transport_mut().registers[1] = 1;
    gw.step(4).await;
    assert_eq!(gw.bus().take(), vec![msg("plc/ai/1-1/state", "65543", false)]);
}

#[tokio::test]
async fn test_refused_publishes_do_not_stall_polling() {
    let mut gw = online_gateway().await;
    let before = gw.stats();
    gw.bus().refuse(true);

    for now in 2..100 {
        gw.transport_mut().registers[0] = now as u16;
        gw.step(now).await;
    }

    assert!(gw.availability().is_available());
    assert_eq!(gw.stats().failed - before.failed, 98);
    assert!(gw.bus().take().is_empty());

    // Nothing queued while refused is replayed afterwards.
    gw.bus().refuse(false);
    gw.transport_mut().registers[0] = 500;
    gw.step(100).await;
    assert_eq!(gw.bus().take(), vec![msg("plc/ai/1-1/state", "500", false)]);
    assert_eq!(gw.stats().success - before.success, 1);
}

#[tokio::test]
async fn test_button_clicks_through_the_scheduler() {
    let mut gw = online_gateway().await;

    for (now, pressed) in [(10, true), (60, false), (110, true), (160, false)] {
        gw.transport_mut().coils[0] = pressed;
        gw.step(now).await;
    }
    // Quiet polls keep the timeout branches running.
    gw.step(300).await;
    gw.step(411).await;

    let events: Vec<Message> = gw
        .bus()
        .take()
        .into_iter()
        .filter(|m| !m.topic.ends_with("/state"))
        .collect();
    assert_eq!(events, vec![msg("plc/di/1-1/click", "2", false)]);
}

#[tokio::test]
async fn test_long_press_and_release() {
    let mut gw = online_gateway().await;

    gw.transport_mut().coils[2] = true;
    gw.step(10).await;
    gw.step(200).await;
    gw.step(411).await;
    gw.step(600).await;
    gw.transport_mut().coils[2] = false;
    gw.step(700).await;
    gw.step(1200).await;

    let events: Vec<Message> = gw
        .bus()
        .take()
        .into_iter()
        .filter(|m| !m.topic.ends_with("/state"))
        .collect();
    assert_eq!(
        events,
        vec![
            msg("plc/di/1-3/long", "1", false),
            msg("plc/di/1-3/long", "RELEASE", false),
        ]
    );
}

#[tokio::test]
async fn test_outage_announces_offline_and_republishes() {
    let mut gw = online_gateway().await;

    gw.transport_mut().fail = true;
    gw.step(2).await;
    assert!(!gw.availability().is_available());
    assert_eq!(gw.bus().take(), vec![msg("plc/availability", "offline", true)]);

    // Failing probes stay quiet.
    gw.step(3).await;
    gw.step(4).await;
    assert!(gw.bus().take().is_empty());
    assert_eq!(gw.availability().consecutive_failures(), 3);

    gw.transport_mut().fail = false;
    gw.step(5).await;
    assert_eq!(gw.bus().take(), vec![msg("plc/availability", "online", true)]);

    // Values identical to the pre-outage ones are published again.
    gw.step(6).await;
    let republished = gw.bus().take();
    assert_eq!(republished.len(), 10);
    assert!(republished.contains(&msg("plc/ai/1-1/state", "0", false)));
}

#[tokio::test]
async fn test_short_read_counts_as_failure() {
    let mut gw = online_gateway().await;

    gw.transport_mut().short_reads = true;
    gw.transport_mut().coils[0] = true;
    gw.step(2).await;

    assert!(!gw.availability().is_available());
    assert_eq!(gw.bus().take(), vec![msg("plc/availability", "offline", true)]);
    assert!(
        gw.availability()
            .last_error()
            .unwrap()
            .contains("expected 3 values, got 2")
    );
}

#[tokio::test]
async fn test_switch_commands() {
    let mut gw = online_gateway().await;

    gw.on_command("plc/do/1-1/set", "on").await;
    gw.on_command("plc/do/1-1/set", "OFF").await;
    gw.on_command("plc/do/1-2/set", "1").await;
    gw.on_command("plc/do/1-2/set", "toggle").await;
    gw.on_command("plc/do/1-2/set", "banana").await;

    assert_eq!(
        gw.transport().writes,
        vec![
            WriteRequest::Bits { address: 32, values: vec![true] },
            WriteRequest::Bits { address: 32, values: vec![false] },
            WriteRequest::Bits { address: 33, values: vec![true] },
            // Garage still reads OFF, so toggle turns it on.
            WriteRequest::Bits { address: 33, values: vec![true] },
        ]
    );
}

#[tokio::test]
async fn test_commands_for_unknown_or_read_only_topics_are_ignored() {
    let mut gw = online_gateway().await;

    gw.on_command("plc/di/1-1/set", "ON").await;
    gw.on_command("plc/ai/1-1/set", "12").await;
    gw.on_command("plc/do/9-9/set", "ON").await;
    gw.on_command("plc/do/1-1/state", "ON").await;

    assert!(gw.transport().writes.is_empty());
}

#[tokio::test]
async fn test_commands_dropped_while_unavailable() {
    let mut gw = gateway();
    gw.on_command("plc/do/1-1/set", "ON").await;
    assert!(gw.transport().writes.is_empty());
}

#[tokio::test]
async fn test_failed_write_marks_device_unavailable() {
    let mut gw = online_gateway().await;

    gw.transport_mut().fail = true;
    gw.on_command("plc/do/1-1/set", "ON").await;

    assert!(!gw.availability().is_available());
    assert_eq!(gw.bus().take(), vec![msg("plc/availability", "offline", true)]);
}

#[tokio::test]
async fn test_cover_commands() {
    let mut gw = online_gateway().await;

    // Moving from 20 towards 60, travel times 30s up and 25s down.
    gw.transport_mut().registers[10] = (20 << 8) | 0x80 | 60;
    gw.transport_mut().registers[11] = (30 << 8) | 25;
    gw.step(2).await;
    assert!(
        gw.bus()
            .take()
            .contains(&msg("plc/blind/1-1/state", "opening", false))
    );

    gw.on_command("plc/blind/1-1/set", "75").await;
    gw.on_command("plc/blind/1-1/set", "OPEN").await;
    gw.on_command("plc/blind/1-1/set", "STOP").await;
    gw.on_command("plc/blind/1-1/config", r#"{"t_dn": 40}"#).await;
    gw.on_command("plc/blind/1-1/config", "{}").await;

    assert_eq!(
        gw.transport().writes,
        vec![
            WriteRequest::Registers { address: 10, values: vec![0x80 | 75] },
            WriteRequest::Registers { address: 10, values: vec![0x80 | 100] },
            WriteRequest::Registers { address: 10, values: vec![60] },
            WriteRequest::Registers { address: 11, values: vec![(30 << 8) | 40] },
        ]
    );
}

#[tokio::test]
async fn test_announce_on_connect() {
    let mut gw = gateway();
    gw.handle_event(BusEvent::Connected).await;

    let subscriptions = gw.bus().subscriptions();
    assert_eq!(
        subscriptions,
        vec!["plc/do/+/set", "plc/blind/+/set", "plc/blind/+/config"]
    );

    let published = gw.bus().take();
    let discovery: Vec<&Message> = published
        .iter()
        .filter(|m| m.topic.starts_with("homeassistant/"))
        .collect();
    assert_eq!(discovery.len(), 6);
    assert_eq!(gw.stats().total(), published.len());
    assert_eq!(gw.stats().failed, 0);
    assert!(discovery.iter().all(|m| m.retain));
    assert!(
        discovery
            .iter()
            .any(|m| m.topic == "homeassistant/light/plc/kitchen_do/config")
    );

    let light: serde_json::Value = serde_json::from_str(
        &discovery
            .iter()
            .find(|m| m.topic.contains("kitchen_do"))
            .unwrap()
            .payload,
    )
    .unwrap();
    assert_eq!(light["~"], "plc/do/1-1");
    assert_eq!(light["device"]["name"], "PLC");

    // Not yet probed: the current availability is offline.
    assert_eq!(
        published.last().unwrap(),
        &msg("plc/availability", "offline", true)
    );
}

#[tokio::test]
async fn test_reconnect_reannounces_availability() {
    let mut gw = online_gateway().await;
    gw.handle_event(BusEvent::Disconnected).await;
    gw.handle_event(BusEvent::Connected).await;

    assert_eq!(
        gw.bus().take().last().unwrap(),
        &msg("plc/availability", "online", true)
    );
}

#[tokio::test]
async fn test_message_events_route_to_commands() {
    let mut gw = online_gateway().await;
    gw.handle_event(BusEvent::Message {
        topic: "plc/do/1-1/set".to_string(),
        payload: "ON".to_string(),
    })
    .await;

    assert_eq!(gw.transport().writes.len(), 1);
}

#[tokio::test]
async fn test_run_stops_when_channel_closes() {
    let gw = gateway();
    let (tx, rx) = tokio::sync::mpsc::channel(8);
    tx.send(BusEvent::Connected).await.unwrap();
    drop(tx);

    gw.run(rx).await;
}
