//! Home Assistant discovery payloads.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};

use plcgate_common::topics::discovery_topic;

use crate::entity::{EntityDescriptor, EntityType, GroupDescriptor};
use crate::machine::suffix;

/// Where and how discovery messages are announced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiscoverySettings {
    pub prefix: String,
    pub node_id: String,
    /// Device block shared by every entity, omitted when null.
    pub device: Value,
}

/// A retained config message for one entity.
#[derive(Debug, Clone, PartialEq)]
pub struct DiscoveryMessage {
    pub topic: String,
    pub payload: Value,
}

fn rel(suffix: &str) -> String {
    format!("~/{}", suffix)
}

/// Build the discovery message of one entity.
///
/// Returns `None` for inert entities. Group defaults override the generated
/// fields and entity overrides win over both.
pub fn discovery_message(
    settings: &DiscoverySettings,
    availability_topic: &str,
    group: &GroupDescriptor,
    entity: &EntityDescriptor,
) -> Option<DiscoveryMessage> {
    if entity.is_inert() {
        return None;
    }

    let component = group.entity_type.component(group.read_only);
    let mut payload = Map::new();
    payload.insert("~".into(), json!(entity.base_topic));
    payload.insert("name".into(), json!(entity.display_name));
    payload.insert("unique_id".into(), json!(entity.unique_id));
    payload.insert("availability_topic".into(), json!(availability_topic));
    if !settings.device.is_null() {
        payload.insert("device".into(), settings.device.clone());
    }

    match group.entity_type {
        EntityType::Cover => {
            payload.insert("state_topic".into(), json!(rel(suffix::STATE)));
            payload.insert("position_topic".into(), json!(rel(suffix::POSITION)));
            payload.insert("position_open".into(), json!(100));
            payload.insert("position_closed".into(), json!(0));
            if !group.read_only {
                payload.insert("command_topic".into(), json!(rel(suffix::SET)));
                payload.insert("set_position_topic".into(), json!(rel(suffix::SET)));
                payload.insert("payload_open".into(), json!("OPEN"));
                payload.insert("payload_close".into(), json!("CLOSE"));
                payload.insert("payload_stop".into(), json!("STOP"));
            }
        }
        EntityType::Sensor => {
            payload.insert("state_topic".into(), json!(rel(suffix::STATE)));
            if group.accepts_commands() {
                let max = if group.words_per_item > 1 {
                    u64::from(u32::MAX)
                } else {
                    u64::from(u16::MAX)
                };
                payload.insert("command_topic".into(), json!(rel(suffix::SET)));
                payload.insert("min".into(), json!(0));
                payload.insert("max".into(), json!(max));
            }
        }
        _ => {
            payload.insert("state_topic".into(), json!(rel(suffix::STATE)));
            payload.insert("payload_on".into(), json!("ON"));
            payload.insert("payload_off".into(), json!("OFF"));
            if group.accepts_commands() {
                payload.insert("command_topic".into(), json!(rel(suffix::SET)));
            }
        }
    }

    for (key, value) in group.defaults.iter().chain(entity.overrides.iter()) {
        payload.insert(key.clone(), value.clone());
    }

    Some(DiscoveryMessage {
        topic: discovery_topic(
            &settings.prefix,
            component,
            &settings.node_id,
            &entity.unique_id,
        ),
        payload: Value::Object(payload),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::tests::group;
    use plcgate_common::TopicBuilder;

    fn settings() -> DiscoverySettings {
        DiscoverySettings {
            prefix: "homeassistant".to_string(),
            node_id: "plc".to_string(),
            device: json!({ "identifiers": ["plc"], "name": "PLC" }),
        }
    }

    #[test]
    fn test_light_payload() {
        let mut g = group("do", EntityType::Light, 1);
        g.read_only = false;
        let d = EntityDescriptor::new(&g, 9, "Kitchen", Map::new(), &TopicBuilder::default())
            .unwrap();

        let msg = discovery_message(&settings(), "plc/availability", &g, &d).unwrap();
        assert_eq!(msg.topic, "homeassistant/light/plc/kitchen_do/config");
        assert_eq!(msg.payload["~"], "plc/do/2-2");
        assert_eq!(msg.payload["command_topic"], "~/set");
        assert_eq!(msg.payload["state_topic"], "~/state");
        assert_eq!(msg.payload["availability_topic"], "plc/availability");
        assert_eq!(msg.payload["device"]["name"], "PLC");
    }

    #[test]
    fn test_cover_payload() {
        let mut g = group("blind", EntityType::Cover, 2);
        g.read_only = false;
        g.slot_size = 4;
        let d = EntityDescriptor::new(&g, 0, "Bedroom", Map::new(), &TopicBuilder::default())
            .unwrap();

        let msg = discovery_message(&settings(), "plc/availability", &g, &d).unwrap();
        assert_eq!(msg.topic, "homeassistant/cover/plc/bedroom_blind/config");
        assert_eq!(msg.payload["set_position_topic"], "~/set");
        assert_eq!(msg.payload["position_topic"], "~/position");
        assert_eq!(msg.payload["payload_stop"], "STOP");
    }

    #[test]
    fn test_read_only_relay_has_no_command_topic() {
        let g = group("do", EntityType::Relay, 1);
        let d = EntityDescriptor::new(&g, 0, "Pump", Map::new(), &TopicBuilder::default()).unwrap();

        let msg = discovery_message(&settings(), "plc/availability", &g, &d).unwrap();
        assert!(msg.topic.starts_with("homeassistant/binary_sensor/"));
        assert!(msg.payload.get("command_topic").is_none());
    }

    #[test]
    fn test_defaults_and_overrides_merge() {
        let mut g = group("ai", EntityType::Sensor, 1);
        g.defaults.insert("unit_of_measurement".into(), json!("°C"));
        g.defaults.insert("icon".into(), json!("mdi:thermometer"));
        let mut overrides = Map::new();
        overrides.insert("icon".into(), json!("mdi:water"));

        let d = EntityDescriptor::new(&g, 0, "Tank", overrides, &TopicBuilder::default()).unwrap();
        let msg = discovery_message(&settings(), "plc/availability", &g, &d).unwrap();

        assert_eq!(msg.payload["unit_of_measurement"], "°C");
        assert_eq!(msg.payload["icon"], "mdi:water");
    }

    #[test]
    fn test_inert_entity_is_not_announced() {
        let g = group("di", EntityType::BinarySensor, 1);
        let d = EntityDescriptor::new(&g, 0, "", Map::new(), &TopicBuilder::default()).unwrap();
        assert!(discovery_message(&settings(), "plc/availability", &g, &d).is_none());
    }

    #[test]
    fn test_null_device_is_omitted() {
        let mut s = settings();
        s.device = Value::Null;
        let g = group("di", EntityType::BinarySensor, 1);
        let d = EntityDescriptor::new(&g, 0, "Door", Map::new(), &TopicBuilder::default()).unwrap();
        let msg = discovery_message(&s, "plc/availability", &g, &d).unwrap();
        assert!(msg.payload.get("device").is_none());
    }
}
