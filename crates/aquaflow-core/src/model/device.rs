use aquaflow_api::{AttributeMap, WireDevice, WireProject};

/// A project (installation site) visible to the account.
///
/// Immutable once parsed from a login response; the collection is
/// replaced wholesale on each login.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Project {
    pub id: String,
    pub name: String,
}

impl From<WireProject> for Project {
    fn from(wire: WireProject) -> Self {
        Self {
            id: wire.id,
            name: wire.name,
        }
    }
}

/// A water-treatment device with its last known telemetry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Device {
    /// User-facing serial number; the stable identifier hosts address.
    pub serial: String,
    /// Vendor collection id (`dclg`), required for status/control calls.
    pub control_id: String,
    /// Portal alias, or the serial when no alias exists.
    pub name: String,
    /// The project this device was listed under.
    pub project_id: String,
    /// Flattened telemetry from the last completed status fetch.
    pub status: AttributeMap,
    /// `false` only when the last status fetch failed outright. An
    /// incomplete response does not flip this.
    pub available: bool,
}

impl Device {
    /// Build a device from its wire entry with no telemetry yet.
    pub fn from_wire(wire: WireDevice, project_id: &str) -> Self {
        Self {
            serial: wire.serial,
            control_id: wire.control_id,
            name: wire.name,
            project_id: project_id.to_owned(),
            status: AttributeMap::new(),
            available: true,
        }
    }

    /// Raw telemetry value by vendor key (e.g. `getPRS`).
    pub fn attr(&self, key: &str) -> Option<&str> {
        self.status.get(key).map(String::as_str)
    }

    /// Telemetry value parsed as a number, when the vendor sent one.
    pub fn attr_f64(&self, key: &str) -> Option<f64> {
        self.attr(key)?.parse().ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn from_wire_starts_available_with_empty_status() {
        let wire = WireDevice {
            serial: "SN-1".into(),
            control_id: "D1".into(),
            name: "Basement".into(),
        };
        let device = Device::from_wire(wire, "P1");
        assert!(device.available);
        assert!(device.status.is_empty());
        assert_eq!(device.project_id, "P1");
    }

    #[test]
    fn attr_f64_parses_numeric_telemetry() {
        let wire = WireDevice {
            serial: "SN-1".into(),
            control_id: "D1".into(),
            name: "SN-1".into(),
        };
        let mut device = Device::from_wire(wire, "P1");
        device.status.insert("getPRS".into(), "3.9".into());
        device.status.insert("getSTA".into(), "regenerating".into());

        assert_eq!(device.attr_f64("getPRS"), Some(3.9));
        assert_eq!(device.attr_f64("getSTA"), None);
    }
}
