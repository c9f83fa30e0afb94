use super::{Device, Project};

/// The coordinator's externally visible result for one polling cycle.
///
/// Built privately during a cycle and swapped in atomically at the end,
/// so consumers never observe a half-updated view. A device missing from
/// a subsequent device-list response is simply absent from the next
/// snapshot.
#[derive(Debug, Clone, Default)]
pub struct Snapshot {
    pub devices: Vec<Device>,
    pub projects: Vec<Project>,
}

impl Snapshot {
    /// Look up a device by serial number.
    pub fn device(&self, serial: &str) -> Option<&Device> {
        self.devices.iter().find(|d| d.serial == serial)
    }

    pub(crate) fn device_mut(&mut self, serial: &str) -> Option<&mut Device> {
        self.devices.iter_mut().find(|d| d.serial == serial)
    }
}
