//! HA iDRAC bridge
//!
//! Republishes telemetry from a Dell iDRAC into a Home Assistant MQTT
//! namespace, using the MQTT Discovery convention so the hub creates UI
//! entities without manual configuration.
//!
//! # Architecture
//!
//! - `config`: broker endpoint, credentials, device fields, log verbosity
//! - `device`: stable device identifier and the shared HA device block
//! - `mqtt::topics`: pure derivation of every topic string
//! - `mqtt::discovery`: retained entity configuration payloads
//! - `mqtt::client`: the single broker connection and its lifecycle
//! - `mqtt::state`: non-retained value publication
//!
//! The bridge never retries a failed connection and never queues messages
//! beyond the transport's own buffer; both are the caller's call. Failures
//! surface through logs and boolean results, not errors.

pub mod config;
pub mod device;
pub mod mqtt;

pub use config::{BridgeConfig, BrokerSettings, DeviceSettings, LogLevel};
pub use device::{DeviceBlock, DeviceIdentity};
pub use mqtt::{ConnectionState, EntityDescriptor, MqttBridge};
