//! Device identity and the Home Assistant device block.
//!
//! Every discovery payload embeds the same device block so Home Assistant
//! groups all entities under a single device card. The identifier is derived
//! once from the iDRAC network address and stays stable across reconnects
//! and process restarts.

use serde::Serialize;

const DEFAULT_MODEL: &str = "HA iDRAC Controller";
const DEFAULT_MANUFACTURER: &str = "HA Add-on";
const MISSING_ADDRESS_ID: &str = "default_ip";

/// Identity of the managed iDRAC device.
///
/// The derived identifier is the sole key used for discovery topics and
/// unique ids; it must never change for a running instance.
#[derive(Clone, Debug)]
pub struct DeviceIdentity {
    manufacturer: String,
    model: String,
    address: Option<String>,
    device_id: String,
}

impl DeviceIdentity {
    /// Build an identity from the configured manufacturer, model, and
    /// network address. Missing fields fall back to generic names so the
    /// bridge stays usable before the iDRAC has been queried.
    pub fn new(manufacturer: Option<&str>, model: Option<&str>, address: Option<&str>) -> Self {
        let address = address
            .map(str::trim)
            .filter(|a| !a.is_empty())
            .map(str::to_string);
        let device_id = derive_device_id(address.as_deref());
        Self {
            manufacturer: non_empty_or(manufacturer, DEFAULT_MANUFACTURER),
            model: non_empty_or(model, DEFAULT_MODEL),
            address,
            device_id,
        }
    }

    /// Stable identifier, e.g. `idrac_controller_192_168_1_5_device`.
    pub fn device_id(&self) -> &str {
        &self.device_id
    }

    pub fn address(&self) -> Option<&str> {
        self.address.as_deref()
    }

    /// Device block embedded in every discovery payload.
    pub fn device_block(&self) -> DeviceBlock {
        DeviceBlock {
            identifiers: vec![self.device_id.clone()],
            name: format!(
                "iDRAC Controller ({})",
                self.address.as_deref().unwrap_or("N/A")
            ),
            model: self.model.clone(),
            manufacturer: self.manufacturer.clone(),
        }
    }
}

/// Home Assistant device metadata for entity grouping.
#[derive(Clone, Debug, Serialize)]
pub struct DeviceBlock {
    pub identifiers: Vec<String>,
    pub name: String,
    pub model: String,
    pub manufacturer: String,
}

fn derive_device_id(address: Option<&str>) -> String {
    let sanitized = match address {
        Some(addr) => sanitize_for_id(addr),
        None => MISSING_ADDRESS_ID.to_string(),
    };
    format!("idrac_controller_{}_device", sanitized)
}

fn sanitize_for_id(s: &str) -> String {
    s.chars()
        .map(|c| if c.is_alphanumeric() { c } else { '_' })
        .collect()
}

fn non_empty_or(value: Option<&str>, fallback: &str) -> String {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .unwrap_or(fallback)
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn device_id_from_ipv4_address() {
        let identity = DeviceIdentity::new(None, None, Some("192.168.1.5"));
        assert_eq!(identity.device_id(), "idrac_controller_192_168_1_5_device");
    }

    #[test]
    fn device_id_without_address_uses_placeholder() {
        let identity = DeviceIdentity::new(None, None, None);
        assert_eq!(identity.device_id(), "idrac_controller_default_ip_device");

        let blank = DeviceIdentity::new(None, None, Some("  "));
        assert_eq!(blank.device_id(), "idrac_controller_default_ip_device");
    }

    #[test]
    fn device_id_is_deterministic() {
        let a = DeviceIdentity::new(Some("Dell"), Some("R730"), Some("10.0.0.7"));
        let b = DeviceIdentity::new(Some("Dell"), Some("R730"), Some("10.0.0.7"));
        assert_eq!(a.device_id(), b.device_id());
    }

    #[test]
    fn sanitize_replaces_every_separator() {
        assert_eq!(sanitize_for_id("fe80::1"), "fe80__1");
        assert_eq!(sanitize_for_id("rack-2.example"), "rack_2_example");
    }

    #[test]
    fn device_block_defaults_and_name() {
        let identity = DeviceIdentity::new(None, None, Some("192.168.1.5"));
        let block = identity.device_block();
        assert_eq!(block.identifiers, vec!["idrac_controller_192_168_1_5_device"]);
        assert_eq!(block.name, "iDRAC Controller (192.168.1.5)");
        assert_eq!(block.model, "HA iDRAC Controller");
        assert_eq!(block.manufacturer, "HA Add-on");

        let anonymous = DeviceIdentity::new(Some("Dell"), Some("PowerEdge R730"), None);
        let block = anonymous.device_block();
        assert_eq!(block.name, "iDRAC Controller (N/A)");
        assert_eq!(block.model, "PowerEdge R730");
        assert_eq!(block.manufacturer, "Dell");
    }
}
