//! MQTT gateway for Modbus devices.
//!
//! Polls one Modbus device (TCP or RTU/serial), mirrors its entities onto
//! MQTT and writes MQTT commands back to the device.

use anyhow::Context;
use mqtt_bridge_modbus::{Gateway, GatewayConfig, ModbusTransport, PollScheduler};
use plcgate_bridge_framework::{BridgeConfig, run_bridge};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    run_bridge::<GatewayConfig, _>("modbus", "modbus-mqtt.json5", |runner| {
        let config = runner.config();
        let jobs = config
            .build_jobs()
            .context("Invalid entity group configuration")?;
        let scheduler = PollScheduler::new(jobs);

        let metadata = serde_json::json!({
            "groups": scheduler.jobs().iter().map(|job| job.group().id.as_str()).collect::<Vec<_>>(),
            "entities": scheduler.entity_count(),
            "availability_topic": config.availability_topic(),
        });

        let transport = ModbusTransport::new(config.modbus.clone());
        let settings = config.gateway_settings();
        let events = runner
            .take_events()
            .context("Bus events already taken")?;

        let gateway = Gateway::new(transport, runner.publisher(), scheduler, settings);
        runner.spawn(gateway.run(events));

        Ok(Some(metadata))
    })
    .await
}
