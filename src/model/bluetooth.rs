//! Bluetooth Model
//!
//! This module defines the plain data exchanged with the BLE collaborator:
//! - Identity of the connected peripheral
//! - Characteristics reported by characteristic discovery

use btleplug::api::{BDAddr, CharPropFlags};
use std::fmt;
use uuid::Uuid;

/// Represents the peripheral a session is connected to.
///
/// Contains:
/// - Device name (empty if the peripheral does not advertise one)
/// - Bluetooth address (MAC)
#[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord)]
pub struct PeripheralIdentity {
    /// The name of the device, if available.
    pub name: String,
    /// The unique Bluetooth address of the device.
    pub address: BDAddr,
}

impl fmt::Display for PeripheralIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.name.is_empty() {
            write!(f, "{}", self.address)
        } else {
            write!(f, "{} ({})", self.name, self.address)
        }
    }
}

/// A characteristic reported by characteristic discovery.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DiscoveredCharacteristic {
    pub uuid: Uuid,
    pub service_uuid: Uuid,
    pub properties: CharPropFlags,
}

impl DiscoveredCharacteristic {
    pub fn can_read(&self) -> bool {
        self.properties.contains(CharPropFlags::READ)
    }

    pub fn can_notify(&self) -> bool {
        self.properties.contains(CharPropFlags::NOTIFY)
    }
}

impl From<&btleplug::api::Characteristic> for DiscoveredCharacteristic {
    fn from(c: &btleplug::api::Characteristic) -> Self {
        Self {
            uuid: c.uuid,
            service_uuid: c.service_uuid,
            properties: c.properties,
        }
    }
}
