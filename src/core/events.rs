//! Core Events
//!
//! This module defines the events flowing through a device session. `GattEvent`s
//! arrive from the BLE collaborator in a single ordered sequence; `DisplayEvent`s
//! carry decoded values out to the display collaborator.
use uuid::Uuid;

use crate::model::{
    bluetooth::{DiscoveredCharacteristic, PeripheralIdentity},
    gatt::BodySensorLocation,
};

/// Enumeration of events delivered by the BLE collaborator.
#[derive(Clone, Debug, PartialEq)]
pub enum GattEvent {
    /// The peripheral accepted the connection.
    Connected(PeripheralIdentity),
    /// Service discovery finished.
    ///
    /// # Fields
    /// - `Vec<Uuid>`: The discovered service UUIDs in discovery order.
    ServicesDiscovered(Vec<Uuid>),
    /// Characteristic discovery of one service finished.
    CharacteristicsDiscovered(Vec<DiscoveredCharacteristic>),
    /// A read completed or a notification arrived.
    ValueUpdated { uuid: Uuid, payload: Vec<u8> },
    /// The link to the peripheral was lost or closed.
    Disconnected,
}

/// Enumeration of events published to the display collaborator.
#[derive(Clone, Debug, PartialEq)]
pub enum DisplayEvent {
    BodySensorLocation(BodySensorLocation),
    HeartRate(u16),
    UnreadableValue { uuid: Uuid, reason: String },
    /// Advisory: the peripheral reported no matching service.
    ServiceListEmpty,
}
