//! Home Assistant MQTT discovery publishing.
//!
//! Discovery messages are retained JSON configs that tell Home Assistant how
//! to render an entity: where its state lives, how to template the value,
//! and which device card it belongs to. Publishing the same entity twice
//! overwrites the broker-side config, so re-announcing is always safe.
//!
//! Reference: https://www.home-assistant.io/integrations/mqtt/#mqtt-discovery

use serde::Serialize;

use crate::device::{DeviceBlock, DeviceIdentity};
use crate::mqtt::client::{BridgeInner, MqttBridge};
use crate::mqtt::topics::{self, PAYLOAD_OFFLINE, PAYLOAD_ONLINE};

use rumqttc::QoS;

/// Metadata for one entity, passed per discovery or state call.
///
/// `(slug, suffix)` is the sole key: it alone determines the unique id and
/// both topics. All rendering hints are optional and omitted from the wire
/// payload when unset.
#[derive(Clone, Debug, Default)]
pub struct EntityDescriptor {
    pub slug: String,
    pub name: String,
    pub device_class: Option<String>,
    pub unit_of_measurement: Option<String>,
    pub icon: Option<String>,
    pub value_template: Option<String>,
    pub entity_category: Option<String>,
    pub state_class: Option<String>,
    /// Distinguishes multiple instances of the same entity type,
    /// e.g. one `fan_rpm` entity per fan.
    pub suffix: Option<String>,
}

impl EntityDescriptor {
    pub fn new(slug: &str, name: &str) -> Self {
        Self {
            slug: slug.to_string(),
            name: name.to_string(),
            ..Self::default()
        }
    }
}

/// Discovery config payload for a sensor entity.
#[derive(Debug, Serialize)]
pub struct SensorConfig {
    pub name: String,
    pub state_topic: String,
    pub unique_id: String,
    pub device: DeviceBlock,
    pub availability_topic: String,
    pub payload_available: String,
    pub payload_not_available: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub device_class: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub unit_of_measurement: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub icon: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value_template: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub entity_category: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub state_class: Option<String>,
}

/// Discovery config payload for the connectivity binary_sensor.
#[derive(Debug, Serialize)]
pub struct BinarySensorConfig {
    pub name: String,
    pub state_topic: String,
    pub unique_id: String,
    pub device_class: String,
    pub payload_on: String,
    pub payload_off: String,
    pub device: DeviceBlock,
}

/// Build the config topic and payload for one sensor entity.
pub fn sensor_discovery(
    device: &DeviceIdentity,
    entity: &EntityDescriptor,
) -> (String, SensorConfig) {
    let device_id = device.device_id();
    let suffix = entity.suffix.as_deref();
    let config = SensorConfig {
        name: entity.name.clone(),
        state_topic: topics::sensor_state_topic(device_id, &entity.slug, suffix),
        unique_id: topics::unique_id(device_id, &entity.slug, suffix),
        device: device.device_block(),
        availability_topic: topics::status_topic(),
        payload_available: PAYLOAD_ONLINE.to_string(),
        payload_not_available: PAYLOAD_OFFLINE.to_string(),
        device_class: entity.device_class.clone(),
        unit_of_measurement: entity.unit_of_measurement.clone(),
        icon: entity.icon.clone(),
        value_template: entity.value_template.clone(),
        entity_category: entity.entity_category.clone(),
        state_class: entity.state_class.clone(),
    };
    let topic = topics::sensor_config_topic(device_id, &entity.slug, suffix);
    (topic, config)
}

/// Build the config topic and payload for the bridge connectivity entity.
/// Its state topic is the shared status topic, so the entity flips with the
/// last-will without any extra publishing.
pub fn connectivity_discovery(device: &DeviceIdentity) -> (String, BinarySensorConfig) {
    let device_id = device.device_id();
    let config = BinarySensorConfig {
        name: "iDRAC Controller Connectivity".to_string(),
        state_topic: topics::status_topic(),
        unique_id: format!("{}_connectivity", device_id),
        device_class: "connectivity".to_string(),
        payload_on: PAYLOAD_ONLINE.to_string(),
        payload_off: PAYLOAD_OFFLINE.to_string(),
        device: device.device_block(),
    };
    let topic = topics::binary_sensor_config_topic(device_id, "status");
    (topic, config)
}

/// The fixed entity set announced on every successful connect. Per-fan and
/// per-CPU entities are dynamic and discovered by the caller once telemetry
/// names them.
pub fn static_entities() -> Vec<EntityDescriptor> {
    vec![
        EntityDescriptor {
            device_class: Some("temperature".to_string()),
            unit_of_measurement: Some("°C".to_string()),
            value_template: Some("{{ value_json.temperature | round(1) }}".to_string()),
            ..EntityDescriptor::new("inlet_temp", "Inlet Temperature")
        },
        EntityDescriptor {
            device_class: Some("temperature".to_string()),
            unit_of_measurement: Some("°C".to_string()),
            value_template: Some("{{ value_json.temperature | round(1) }}".to_string()),
            ..EntityDescriptor::new("exhaust_temp", "Exhaust Temperature")
        },
        EntityDescriptor {
            unit_of_measurement: Some("%".to_string()),
            icon: Some("mdi:fan-chevron-up".to_string()),
            value_template: Some(
                "{{ value_json.speed if value_json.speed is not none else 'Auto' }}".to_string(),
            ),
            ..EntityDescriptor::new("target_fan_speed", "Target Fan Speed")
        },
        EntityDescriptor {
            device_class: Some("temperature".to_string()),
            unit_of_measurement: Some("°C".to_string()),
            value_template: Some("{{ value_json.temperature | round(1) }}".to_string()),
            ..EntityDescriptor::new("hottest_cpu_temp", "Hottest CPU Temp")
        },
        EntityDescriptor {
            device_class: Some("power".to_string()),
            unit_of_measurement: Some("W".to_string()),
            state_class: Some("measurement".to_string()),
            icon: Some("mdi:flash".to_string()),
            value_template: Some("{{ value_json.power | round(0) }}".to_string()),
            ..EntityDescriptor::new("power_consumption", "Power Consumption")
        },
    ]
}

impl MqttBridge {
    /// Publish the retained discovery config for one entity.
    ///
    /// Requires the device identity; without it this logs a warning and
    /// publishes nothing. Discovery is idempotent, so callers may re-announce
    /// freely (e.g. after the hub restarts).
    pub fn publish_entity_discovery(&self, entity: &EntityDescriptor) -> bool {
        publish_entity_discovery(self.inner(), entity)
    }

    /// Publish discovery for the fixed entity set.
    ///
    /// Skipped entirely, with a warning, when not connected or when the
    /// device identity is unset.
    pub fn publish_static_entity_discoveries(&self) -> bool {
        publish_static_entity_discoveries(self.inner())
    }
}

pub(crate) fn publish_entity_discovery(inner: &BridgeInner, entity: &EntityDescriptor) -> bool {
    let Some(device) = inner.device() else {
        log::warn!(
            "device identity not set, cannot publish discovery for '{}'",
            entity.name
        );
        return false;
    };

    let (topic, config) = sensor_discovery(&device, entity);
    let payload = match serde_json::to_vec(&config) {
        Ok(payload) => payload,
        Err(e) => {
            log::error!("failed to encode discovery config for '{}': {}", entity.name, e);
            return false;
        }
    };
    let sent = inner.publish_raw(&topic, payload, QoS::AtMostOnce, true);
    if sent {
        log::debug!(
            "published discovery for '{}' (unique_id: {}) on {}",
            entity.name,
            config.unique_id,
            topic
        );
    }
    sent
}

pub(crate) fn publish_static_entity_discoveries(inner: &BridgeInner) -> bool {
    if !inner.is_connected() || inner.device().is_none() {
        log::warn!("not connected or device identity unset, skipping static discoveries");
        return false;
    }

    log::info!("publishing static sensor discovery messages");
    let mut all_sent = true;
    for entity in static_entities() {
        all_sent &= publish_entity_discovery(inner, &entity);
    }
    all_sent
}

/// One message of the on-connect announcement sequence.
#[derive(Debug)]
pub(crate) struct Announcement {
    pub(crate) topic: String,
    pub(crate) payload: Vec<u8>,
    pub(crate) qos: QoS,
    pub(crate) retain: bool,
}

/// Build the on-connect announcement sequence: one retained online status,
/// one connectivity discovery, then the static entity discoveries, in that
/// order. Entities whose config fails to encode are logged and dropped from
/// the sequence; the remaining order is preserved.
pub(crate) fn connect_announcements(device: &DeviceIdentity) -> Vec<Announcement> {
    let mut messages = vec![Announcement {
        topic: topics::status_topic(),
        payload: PAYLOAD_ONLINE.as_bytes().to_vec(),
        qos: QoS::AtLeastOnce,
        retain: true,
    }];

    let (topic, config) = connectivity_discovery(device);
    match serde_json::to_vec(&config) {
        Ok(payload) => messages.push(Announcement {
            topic,
            payload,
            qos: QoS::AtMostOnce,
            retain: true,
        }),
        Err(e) => log::error!("failed to encode connectivity discovery: {}", e),
    }

    for entity in static_entities() {
        let (topic, config) = sensor_discovery(device, &entity);
        match serde_json::to_vec(&config) {
            Ok(payload) => messages.push(Announcement {
                topic,
                payload,
                qos: QoS::AtMostOnce,
                retain: true,
            }),
            Err(e) => log::error!(
                "failed to encode discovery config for '{}': {}",
                entity.name,
                e
            ),
        }
    }

    messages
}

pub(crate) fn publish_connect_announcements(inner: &BridgeInner) {
    let Some(device) = inner.device() else {
        // The status topic needs no identity; discovery does.
        inner.publish_raw(
            &topics::status_topic(),
            PAYLOAD_ONLINE.as_bytes().to_vec(),
            QoS::AtLeastOnce,
            true,
        );
        log::warn!("device identity not set, skipping discovery announcements");
        return;
    };

    log::info!("publishing online status and discovery messages");
    for message in connect_announcements(&device) {
        inner.publish_raw(&message.topic, message.payload, message.qos, message.retain);
    }
}
