//! MQTT layer: connection lifecycle, topic derivation, Home Assistant
//! discovery, and state publication.
//!
//! The wire contract lives in three places: `topics` derives every topic
//! string, `discovery` builds the retained config payloads, and `client`
//! owns the single broker connection both publishers go through.

pub mod client;
pub mod discovery;
pub mod state;
pub mod topics;

pub use client::{ConnectionState, MqttBridge};
pub use discovery::{
    connectivity_discovery, sensor_discovery, static_entities, BinarySensorConfig,
    EntityDescriptor, SensorConfig,
};
