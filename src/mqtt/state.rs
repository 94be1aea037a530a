//! State publication: live telemetry values onto entity state topics.
//!
//! State payloads are flat JSON objects with caller-defined keys (the
//! discovery value templates pick the field they want). They are published
//! non-retained; a hub that missed one simply waits for the next cycle.

use rumqttc::QoS;
use serde::Serialize;

use crate::mqtt::client::MqttBridge;
use crate::mqtt::topics;

impl MqttBridge {
    /// Publish one entity's current value structure to its state topic.
    ///
    /// `values` is serialized to JSON as-is, e.g. `{"temperature": 42.0}`.
    /// Returns false, with a warning and without raising, when the device
    /// identity is unset, the bridge is not connected, or the transport
    /// refuses the message. Works for static entities and for dynamically
    /// named ones (per-fan, per-CPU) alike via `suffix`.
    pub fn publish_entity_state<T: Serialize>(
        &self,
        slug: &str,
        values: &T,
        suffix: Option<&str>,
    ) -> bool {
        let inner = self.inner();
        let Some(device) = inner.device() else {
            log::warn!("device identity not set, cannot publish state for '{}'", slug);
            return false;
        };

        let payload = match serde_json::to_vec(values) {
            Ok(payload) => payload,
            Err(e) => {
                log::error!("failed to encode state payload for '{}': {}", slug, e);
                return false;
            }
        };

        let topic = topics::sensor_state_topic(device.device_id(), slug, suffix);
        inner.publish_raw(&topic, payload, QoS::AtMostOnce, false)
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    #[test]
    fn state_payload_round_trips_as_structured_value() {
        let values = json!({"temperature": 41.2});
        let wire = serde_json::to_vec(&values).expect("encode");
        let decoded: serde_json::Value = serde_json::from_slice(&wire).expect("decode");
        assert_eq!(decoded, values);
        assert_eq!(decoded["temperature"], json!(41.2));
    }

    #[test]
    fn null_fields_survive_the_wire() {
        // target_fan_speed publishes {"speed": null} in automatic mode; the
        // value template renders that as 'Auto'.
        let values = json!({"speed": null});
        let wire = serde_json::to_vec(&values).expect("encode");
        let decoded: serde_json::Value = serde_json::from_slice(&wire).expect("decode");
        assert!(decoded["speed"].is_null());
    }
}
