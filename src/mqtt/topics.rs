//! Canonical topic derivation for the Home Assistant namespace.
//!
//! Pure string functions: identical input yields identical output across
//! process restarts, which is what keeps discovery idempotent. Both the
//! discovery and state publishers derive their topics here.

/// Home Assistant MQTT discovery prefix.
pub const DISCOVERY_PREFIX: &str = "homeassistant";

/// Prefix for all state and status topics owned by this bridge.
pub const STATE_PREFIX: &str = "ha_idrac_controller";

pub const PAYLOAD_ONLINE: &str = "online";
pub const PAYLOAD_OFFLINE: &str = "offline";

const AVAILABILITY_TOPIC_SUFFIX: &str = "status";

/// Retained availability topic; also the last-will topic.
pub fn status_topic() -> String {
    format!("{}/{}", STATE_PREFIX, AVAILABILITY_TOPIC_SUFFIX)
}

/// Discovery config topic for a sensor entity.
/// `homeassistant/sensor/<device-id>/<slug><suffix>/config`
pub fn sensor_config_topic(device_id: &str, slug: &str, suffix: Option<&str>) -> String {
    format!(
        "{}/sensor/{}/{}/config",
        DISCOVERY_PREFIX,
        device_id,
        entity_node(slug, suffix)
    )
}

/// Discovery config topic for a binary_sensor entity.
pub fn binary_sensor_config_topic(device_id: &str, slug: &str) -> String {
    format!(
        "{}/binary_sensor/{}/{}/config",
        DISCOVERY_PREFIX, device_id, slug
    )
}

/// State topic for a sensor entity.
/// `ha_idrac_controller/sensor/<device-id>/<slug><suffix>/state`
pub fn sensor_state_topic(device_id: &str, slug: &str, suffix: Option<&str>) -> String {
    format!(
        "{}/sensor/{}/{}/state",
        STATE_PREFIX,
        device_id,
        entity_node(slug, suffix)
    )
}

/// Unique id for a sensor entity: `<device-id>_<slug>[_<suffix>]`.
pub fn unique_id(device_id: &str, slug: &str, suffix: Option<&str>) -> String {
    match suffix {
        Some(suffix) => format!("{}_{}_{}", device_id, slug, suffix),
        None => format!("{}_{}", device_id, slug),
    }
}

// Topic node for one entity instance. The suffix is appended directly,
// matching the wire contract (`fan1` on slug `fan_rpm` -> `fan_rpmfan1`).
fn entity_node(slug: &str, suffix: Option<&str>) -> String {
    match suffix {
        Some(suffix) => format!("{}{}", slug, suffix),
        None => slug.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const DEVICE_ID: &str = "idrac_controller_192_168_1_5_device";

    #[test]
    fn status_topic_is_fixed() {
        assert_eq!(status_topic(), "ha_idrac_controller/status");
    }

    #[test]
    fn sensor_topics_without_suffix() {
        assert_eq!(
            sensor_config_topic(DEVICE_ID, "inlet_temp", None),
            "homeassistant/sensor/idrac_controller_192_168_1_5_device/inlet_temp/config"
        );
        assert_eq!(
            sensor_state_topic(DEVICE_ID, "inlet_temp", None),
            "ha_idrac_controller/sensor/idrac_controller_192_168_1_5_device/inlet_temp/state"
        );
    }

    #[test]
    fn suffix_is_appended_to_topic_node_but_separated_in_unique_id() {
        assert_eq!(
            sensor_state_topic(DEVICE_ID, "fan_rpm", Some("_fan1")),
            "ha_idrac_controller/sensor/idrac_controller_192_168_1_5_device/fan_rpm_fan1/state"
        );
        assert_eq!(
            unique_id(DEVICE_ID, "fan_rpm", Some("fan1")),
            "idrac_controller_192_168_1_5_device_fan_rpm_fan1"
        );
        assert_eq!(
            unique_id(DEVICE_ID, "inlet_temp", None),
            "idrac_controller_192_168_1_5_device_inlet_temp"
        );
    }

    #[test]
    fn binary_sensor_config_topic_shape() {
        assert_eq!(
            binary_sensor_config_topic(DEVICE_ID, "status"),
            "homeassistant/binary_sensor/idrac_controller_192_168_1_5_device/status/config"
        );
    }

    #[test]
    fn derivation_is_deterministic() {
        assert_eq!(
            sensor_config_topic(DEVICE_ID, "power_consumption", None),
            sensor_config_topic(DEVICE_ID, "power_consumption", None)
        );
    }
}
