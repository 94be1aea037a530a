//! Bridge configuration: broker endpoint, credentials, device identity
//! fields, and log verbosity.
//!
//! Configuration is layered: built-in defaults, then an optional TOML file
//! (path from `HA_IDRAC_CONFIG`), then environment overrides, then
//! validation. Broker settings are immutable once a connection is active;
//! re-applying them requires a fresh connect cycle.

use anyhow::{anyhow, Context, Result};
use serde::Deserialize;
use std::path::Path;
use std::str::FromStr;

const DEFAULT_BROKER_HOST: &str = "core-mosquitto";
const DEFAULT_BROKER_PORT: u16 = 1883;
const DEFAULT_CLIENT_ID: &str = "ha_idrac_controller_2";

#[derive(Debug, Deserialize, Default)]
struct BridgeConfigFile {
    mqtt: Option<MqttConfigFile>,
    device: Option<DeviceConfigFile>,
    log_level: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
struct MqttConfigFile {
    host: Option<String>,
    port: Option<u16>,
    username: Option<String>,
    password: Option<String>,
    client_id: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
struct DeviceConfigFile {
    manufacturer: Option<String>,
    model: Option<String>,
    address: Option<String>,
}

/// Broker connection parameters.
#[derive(Clone, Debug)]
pub struct BrokerSettings {
    pub host: String,
    pub port: u16,
    pub username: Option<String>,
    pub password: Option<String>,
    pub client_id: String,
}

impl Default for BrokerSettings {
    fn default() -> Self {
        Self {
            host: DEFAULT_BROKER_HOST.to_string(),
            port: DEFAULT_BROKER_PORT,
            username: None,
            password: None,
            client_id: DEFAULT_CLIENT_ID.to_string(),
        }
    }
}

/// Identity fields for the managed iDRAC, as configured by the operator.
#[derive(Clone, Debug, Default)]
pub struct DeviceSettings {
    pub manufacturer: Option<String>,
    pub model: Option<String>,
    pub address: Option<String>,
}

#[derive(Clone, Debug)]
pub struct BridgeConfig {
    pub broker: BrokerSettings,
    pub device: DeviceSettings,
    pub log_level: LogLevel,
}

impl BridgeConfig {
    /// Load configuration: optional TOML file, then env overrides, then
    /// validation.
    pub fn load(config_path: Option<&Path>) -> Result<Self> {
        let file_cfg = match config_path {
            Some(path) => read_config_file(path)?,
            None => BridgeConfigFile::default(),
        };
        let mut cfg = Self::from_file(file_cfg)?;
        cfg.apply_env()?;
        cfg.validate()?;
        Ok(cfg)
    }

    fn from_file(file: BridgeConfigFile) -> Result<Self> {
        let mqtt = file.mqtt.unwrap_or_default();
        let device = file.device.unwrap_or_default();
        let log_level = match file.log_level {
            Some(level) => level.parse()?,
            None => LogLevel::default(),
        };
        Ok(Self {
            broker: BrokerSettings {
                host: mqtt.host.unwrap_or_else(|| DEFAULT_BROKER_HOST.to_string()),
                port: mqtt.port.unwrap_or(DEFAULT_BROKER_PORT),
                username: mqtt.username.filter(|u| !u.is_empty()),
                password: mqtt.password,
                client_id: mqtt
                    .client_id
                    .unwrap_or_else(|| DEFAULT_CLIENT_ID.to_string()),
            },
            device: DeviceSettings {
                manufacturer: device.manufacturer,
                model: device.model,
                address: device.address,
            },
            log_level,
        })
    }

    fn apply_env(&mut self) -> Result<()> {
        if let Ok(addr) = std::env::var("MQTT_BROKER_ADDR") {
            if !addr.trim().is_empty() {
                let (host, port) = split_host_port(addr.trim())?;
                self.broker.host = host;
                self.broker.port = port;
            }
        }
        if let Ok(username) = std::env::var("MQTT_USERNAME") {
            if !username.trim().is_empty() {
                self.broker.username = Some(username);
            }
        }
        if let Ok(password) = std::env::var("MQTT_PASSWORD") {
            if !password.is_empty() {
                self.broker.password = Some(password);
            }
        }
        if let Ok(client_id) = std::env::var("MQTT_CLIENT_ID") {
            if !client_id.trim().is_empty() {
                self.broker.client_id = client_id;
            }
        }
        if let Ok(level) = std::env::var("LOG_LEVEL") {
            if !level.trim().is_empty() {
                self.log_level = level.trim().parse()?;
            }
        }
        if let Ok(manufacturer) = std::env::var("IDRAC_MANUFACTURER") {
            if !manufacturer.trim().is_empty() {
                self.device.manufacturer = Some(manufacturer);
            }
        }
        if let Ok(model) = std::env::var("IDRAC_MODEL") {
            if !model.trim().is_empty() {
                self.device.model = Some(model);
            }
        }
        if let Ok(address) = std::env::var("IDRAC_ADDRESS") {
            if !address.trim().is_empty() {
                self.device.address = Some(address);
            }
        }
        Ok(())
    }

    fn validate(&self) -> Result<()> {
        if self.broker.host.trim().is_empty() {
            return Err(anyhow!("mqtt broker host must not be empty"));
        }
        if self.broker.port == 0 {
            return Err(anyhow!("mqtt broker port must be non-zero"));
        }
        if self.broker.client_id.trim().is_empty() {
            return Err(anyhow!("mqtt client id must not be empty"));
        }
        Ok(())
    }
}

/// Log verbosity, matching the add-on's configuration surface.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum LogLevel {
    Trace,
    Debug,
    #[default]
    Info,
    Warning,
    Error,
    Fatal,
}

impl FromStr for LogLevel {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "trace" => Ok(Self::Trace),
            "debug" => Ok(Self::Debug),
            "info" => Ok(Self::Info),
            "warning" | "warn" => Ok(Self::Warning),
            "error" => Ok(Self::Error),
            "fatal" => Ok(Self::Fatal),
            other => Err(anyhow!(
                "unknown log level '{}': expected trace|debug|info|warning|error|fatal",
                other
            )),
        }
    }
}

impl LogLevel {
    /// Map onto the `log` crate's filters. `log` has no fatal severity, so
    /// `fatal` selects the most severe available filter.
    pub fn level_filter(&self) -> log::LevelFilter {
        match self {
            Self::Trace => log::LevelFilter::Trace,
            Self::Debug => log::LevelFilter::Debug,
            Self::Info => log::LevelFilter::Info,
            Self::Warning => log::LevelFilter::Warn,
            Self::Error | Self::Fatal => log::LevelFilter::Error,
        }
    }
}

impl std::fmt::Display for LogLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Trace => "trace",
            Self::Debug => "debug",
            Self::Info => "info",
            Self::Warning => "warning",
            Self::Error => "error",
            Self::Fatal => "fatal",
        };
        write!(f, "{}", name)
    }
}

fn read_config_file(path: &Path) -> Result<BridgeConfigFile> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read config file {}", path.display()))?;
    toml::from_str(&raw).with_context(|| format!("invalid config file {}", path.display()))
}

/// Split `host:port`, accepting the `[v6]:port` bracket form.
pub fn split_host_port(addr: &str) -> Result<(String, u16)> {
    if let Some(rest) = addr.strip_prefix('[') {
        let (host, rest) = rest
            .split_once(']')
            .ok_or_else(|| anyhow!("invalid broker address: {}", addr))?;
        let port = rest
            .strip_prefix(':')
            .ok_or_else(|| anyhow!("missing broker port in {}", addr))?;
        let port: u16 = port.parse().context("invalid broker port")?;
        return Ok((host.to_string(), port));
    }

    let (host, port) = addr
        .rsplit_once(':')
        .ok_or_else(|| anyhow!("missing broker port in {}", addr))?;
    let port: u16 = port.parse().context("invalid broker port")?;
    Ok((host.to_string(), port))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn defaults_match_the_addon() {
        let cfg = BridgeConfig::from_file(BridgeConfigFile::default()).expect("defaults");
        assert_eq!(cfg.broker.host, "core-mosquitto");
        assert_eq!(cfg.broker.port, 1883);
        assert_eq!(cfg.broker.client_id, "ha_idrac_controller_2");
        assert!(cfg.broker.username.is_none());
        assert_eq!(cfg.log_level, LogLevel::Info);
    }

    #[test]
    fn toml_file_overrides_defaults() {
        let mut file = tempfile::NamedTempFile::new().expect("tempfile");
        writeln!(
            file,
            r#"
log_level = "debug"

[mqtt]
host = "broker.local"
port = 8883
username = "ha"
password = "secret"

[device]
manufacturer = "Dell"
model = "PowerEdge R730"
address = "192.168.1.5"
"#
        )
        .expect("write");

        let parsed = read_config_file(file.path()).expect("parse");
        let cfg = BridgeConfig::from_file(parsed).expect("config");
        assert_eq!(cfg.broker.host, "broker.local");
        assert_eq!(cfg.broker.port, 8883);
        assert_eq!(cfg.broker.username.as_deref(), Some("ha"));
        assert_eq!(cfg.broker.password.as_deref(), Some("secret"));
        assert_eq!(cfg.device.address.as_deref(), Some("192.168.1.5"));
        assert_eq!(cfg.log_level, LogLevel::Debug);
    }

    #[test]
    fn split_host_port_accepts_plain_and_bracketed() {
        assert_eq!(
            split_host_port("broker.local:1883").expect("plain"),
            ("broker.local".to_string(), 1883)
        );
        assert_eq!(
            split_host_port("[fe80::1]:1883").expect("bracketed"),
            ("fe80::1".to_string(), 1883)
        );
        assert!(split_host_port("no-port").is_err());
        assert!(split_host_port("[fe80::1]").is_err());
    }

    #[test]
    fn log_level_parsing_and_filters() {
        assert_eq!("trace".parse::<LogLevel>().expect("trace"), LogLevel::Trace);
        assert_eq!(
            "WARNING".parse::<LogLevel>().expect("warn"),
            LogLevel::Warning
        );
        assert_eq!("fatal".parse::<LogLevel>().expect("fatal"), LogLevel::Fatal);
        assert!("loud".parse::<LogLevel>().is_err());

        assert_eq!(LogLevel::Fatal.level_filter(), log::LevelFilter::Error);
        assert_eq!(LogLevel::Warning.level_filter(), log::LevelFilter::Warn);
    }

    #[test]
    fn validation_rejects_empty_endpoint() {
        let mut cfg = BridgeConfig::from_file(BridgeConfigFile::default()).expect("defaults");
        cfg.broker.host = "  ".to_string();
        assert!(cfg.validate().is_err());

        let mut cfg = BridgeConfig::from_file(BridgeConfigFile::default()).expect("defaults");
        cfg.broker.port = 0;
        assert!(cfg.validate().is_err());
    }
}
