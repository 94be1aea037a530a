//! ha-idrac-bridge - Republish iDRAC telemetry to Home Assistant over MQTT.
//!
//! The telemetry collector (iDRAC polling) lives outside this process; it
//! feeds newline-delimited JSON records on stdin:
//!
//! ```text
//! {"slug": "inlet_temp", "values": {"temperature": 21.0}}
//! {"slug": "fan_rpm", "suffix": "fan1", "name": "Fan 1 RPM", "unit_of_measurement": "RPM", "values": {"rpm": 4560}}
//! ```
//!
//! Records carrying a `name` announce a dynamic entity (discovery is
//! published once per slug/suffix pair per run); every record publishes its
//! `values` to the entity's state topic. The bridge connects once and never
//! retries: if the link drops, publishes return false and are logged until
//! the process is restarted.

use anyhow::{anyhow, Result};
use clap::Parser;
use serde::Deserialize;
use std::collections::HashSet;
use std::io::BufRead;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use ha_idrac_bridge::{BridgeConfig, ConnectionState, DeviceIdentity, EntityDescriptor, MqttBridge};

const CONNECT_SETTLE_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Parser, Debug)]
#[command(
    author,
    version,
    about = "Republish iDRAC telemetry to Home Assistant via MQTT discovery"
)]
struct Args {
    /// Path to a TOML config file (broker, device identity, log level).
    #[arg(long, env = "HA_IDRAC_CONFIG")]
    config: Option<PathBuf>,
}

/// One telemetry record from the collector.
#[derive(Debug, Deserialize)]
struct TelemetryRecord {
    slug: String,
    #[serde(default)]
    suffix: Option<String>,
    values: serde_json::Value,

    /// Discovery metadata for dynamically named entities (per-fan, per-CPU).
    /// Static entities are announced at connect time and need none of this.
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    device_class: Option<String>,
    #[serde(default)]
    unit_of_measurement: Option<String>,
    #[serde(default)]
    icon: Option<String>,
    #[serde(default)]
    value_template: Option<String>,
    #[serde(default)]
    state_class: Option<String>,
}

fn main() -> Result<()> {
    let args = Args::parse();
    let cfg = BridgeConfig::load(args.config.as_deref())?;

    env_logger::Builder::from_env(
        env_logger::Env::default().default_filter_or(cfg.log_level.level_filter().as_str()),
    )
    .init();

    log::info!("ha-idrac-bridge starting");
    log::info!("  MQTT broker: {}:{}", cfg.broker.host, cfg.broker.port);
    log::info!(
        "  iDRAC: {} (auth: {})",
        cfg.device.address.as_deref().unwrap_or("N/A"),
        cfg.broker.username.is_some()
    );

    let mut bridge = MqttBridge::new(cfg.broker.clone());
    bridge.set_device_identity(DeviceIdentity::new(
        cfg.device.manufacturer.as_deref(),
        cfg.device.model.as_deref(),
        cfg.device.address.as_deref(),
    ));

    bridge.connect();
    wait_for_settle(&bridge)?;

    let running = Arc::new(AtomicBool::new(true));
    let flag = Arc::clone(&running);
    ctrlc::set_handler(move || flag.store(false, Ordering::SeqCst))
        .map_err(|e| anyhow!("failed to install signal handler: {}", e))?;

    let mut discovered: HashSet<(String, Option<String>)> = HashSet::new();
    let mut published = 0u64;
    let stdin = std::io::stdin();

    for line in stdin.lock().lines() {
        if !running.load(Ordering::SeqCst) {
            break;
        }
        let line = match line {
            Ok(line) => line,
            Err(e) => {
                log::info!("stdin closed: {}", e);
                break;
            }
        };
        if line.trim().is_empty() {
            continue;
        }

        let record: TelemetryRecord = match serde_json::from_str(&line) {
            Ok(record) => record,
            Err(e) => {
                log::warn!("skipping malformed telemetry record: {}", e);
                continue;
            }
        };

        if let Some(entity) = dynamic_entity(&record) {
            let key = (record.slug.clone(), record.suffix.clone());
            if !discovered.contains(&key) && bridge.publish_entity_discovery(&entity) {
                discovered.insert(key);
            }
        }

        if bridge.publish_entity_state(&record.slug, &record.values, record.suffix.as_deref()) {
            published += 1;
        }
    }

    bridge.disconnect();
    log::info!("published {} state updates", published);
    Ok(())
}

/// Wait a bounded time for the connect attempt to settle. A failed attempt
/// is logged by the event loop; this process keeps running either way and
/// simply publishes nothing until restarted with a reachable broker.
fn wait_for_settle(bridge: &MqttBridge) -> Result<()> {
    let deadline = Instant::now() + CONNECT_SETTLE_TIMEOUT;
    while bridge.connection_state() == ConnectionState::Connecting && Instant::now() < deadline {
        std::thread::sleep(Duration::from_millis(100));
    }
    match bridge.connection_state() {
        ConnectionState::Connected => Ok(()),
        state => {
            log::warn!(
                "broker connection did not come up (state: {:?}); telemetry will be dropped",
                state
            );
            Ok(())
        }
    }
}

fn dynamic_entity(record: &TelemetryRecord) -> Option<EntityDescriptor> {
    let name = record.name.as_deref()?;
    Some(EntityDescriptor {
        device_class: record.device_class.clone(),
        unit_of_measurement: record.unit_of_measurement.clone(),
        icon: record.icon.clone(),
        value_template: record.value_template.clone(),
        state_class: record.state_class.clone(),
        suffix: record.suffix.clone(),
        ..EntityDescriptor::new(&record.slug, name)
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn telemetry_record_parses_minimal_form() {
        let record: TelemetryRecord =
            serde_json::from_str(r#"{"slug": "inlet_temp", "values": {"temperature": 21.0}}"#)
                .expect("parse");
        assert_eq!(record.slug, "inlet_temp");
        assert!(record.suffix.is_none());
        assert!(record.name.is_none());
        assert!(dynamic_entity(&record).is_none());
    }

    #[test]
    fn telemetry_record_with_discovery_metadata() {
        let record: TelemetryRecord = serde_json::from_str(
            r#"{"slug": "fan_rpm", "suffix": "fan1", "name": "Fan 1 RPM",
                "unit_of_measurement": "RPM", "icon": "mdi:fan",
                "values": {"rpm": 4560}}"#,
        )
        .expect("parse");

        let entity = dynamic_entity(&record).expect("dynamic entity");
        assert_eq!(entity.slug, "fan_rpm");
        assert_eq!(entity.name, "Fan 1 RPM");
        assert_eq!(entity.suffix.as_deref(), Some("fan1"));
        assert_eq!(entity.unit_of_measurement.as_deref(), Some("RPM"));
    }
}
