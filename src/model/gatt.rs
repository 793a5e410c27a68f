//! GATT Characteristic Codec
//!
//! This module decodes the two standard characteristics of the Bluetooth SIG
//! Heart Rate Service and classifies UUIDs against the ones the session acts on:
//! - Heart Rate Measurement (variable width BPM value)
//! - Body Sensor Location (single byte enumeration)
//!
//! All functions are pure and may be called from any thread.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;
use uuid::Uuid;

use crate::core::constants::{
    BODY_SENSOR_LOCATION_UUID, HEARTRATE_MEASUREMENT_UUID, HEARTRATE_SERVICE_UUID,
};
use crate::is_bit_set;

/// Classification of a UUID against the registry of known identifiers.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum CharacteristicKind {
    HeartRateService,
    HeartRateMeasurement,
    BodySensorLocation,
    Unknown,
}

impl fmt::Display for CharacteristicKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            CharacteristicKind::HeartRateService => "Heart Rate Service",
            CharacteristicKind::HeartRateMeasurement => "Heart Rate Measurement",
            CharacteristicKind::BodySensorLocation => "Body Sensor Location",
            CharacteristicKind::Unknown => "Unknown",
        };
        f.write_str(name)
    }
}

/// Errors raised while decoding a characteristic payload.
#[derive(Error, Clone, Debug, PartialEq, Eq)]
pub enum CodecError {
    #[error("malformed {kind} payload: expected at least {needed} bytes, got {actual}")]
    MalformedPayload {
        kind: CharacteristicKind,
        needed: usize,
        actual: usize,
    },
}

/// Location of the sensor on the body as reported by the peripheral.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BodySensorLocation {
    Other,
    Chest,
    Wrist,
    Finger,
    Hand,
    EarLobe,
    Foot,
    Reserved,
}

impl BodySensorLocation {
    /// Maps the raw characteristic byte; every value above 6 is reserved.
    pub fn from_byte(byte: u8) -> Self {
        match byte {
            0 => BodySensorLocation::Other,
            1 => BodySensorLocation::Chest,
            2 => BodySensorLocation::Wrist,
            3 => BodySensorLocation::Finger,
            4 => BodySensorLocation::Hand,
            5 => BodySensorLocation::EarLobe,
            6 => BodySensorLocation::Foot,
            _ => BodySensorLocation::Reserved,
        }
    }
}

impl fmt::Display for BodySensorLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            BodySensorLocation::Other => "Other",
            BodySensorLocation::Chest => "Chest",
            BodySensorLocation::Wrist => "Wrist",
            BodySensorLocation::Finger => "Finger",
            BodySensorLocation::Hand => "Hand",
            BodySensorLocation::EarLobe => "Ear Lobe",
            BodySensorLocation::Foot => "Foot",
            BodySensorLocation::Reserved => "Reserved for future use",
        };
        f.write_str(label)
    }
}

/// Classifies a UUID against the registry. Unknown identifiers are never an error.
pub fn classify_uuid(uuid: &Uuid) -> CharacteristicKind {
    if *uuid == HEARTRATE_SERVICE_UUID {
        CharacteristicKind::HeartRateService
    } else if *uuid == HEARTRATE_MEASUREMENT_UUID {
        CharacteristicKind::HeartRateMeasurement
    } else if *uuid == BODY_SENSOR_LOCATION_UUID {
        CharacteristicKind::BodySensorLocation
    } else {
        CharacteristicKind::Unknown
    }
}

/// Decodes a Body Sensor Location payload.
///
/// Only the first byte is inspected; trailing bytes are tolerated.
///
/// # Errors
/// `CodecError::MalformedPayload` if the payload is empty.
pub fn decode_body_sensor_location(payload: &[u8]) -> Result<BodySensorLocation, CodecError> {
    payload
        .first()
        .map(|&byte| BodySensorLocation::from_byte(byte))
        .ok_or(CodecError::MalformedPayload {
            kind: CharacteristicKind::BodySensorLocation,
            needed: 1,
            actual: 0,
        })
}

/// Decodes the BPM value of a Heart Rate Measurement payload.
///
/// Bit 0 of the flags byte selects the value format: cleared means a single
/// `u8` at offset 1, set means two bytes at offsets 1 and 2 combined as
/// `(byte1 << 8) + byte2`.
///
/// # Errors
/// `CodecError::MalformedPayload` if the payload is shorter than the flags
/// byte plus the width selected by the format flag.
pub fn decode_heart_rate(payload: &[u8]) -> Result<u16, CodecError> {
    let flags = *payload.first().ok_or(CodecError::MalformedPayload {
        kind: CharacteristicKind::HeartRateMeasurement,
        needed: 1,
        actual: 0,
    })?;

    let needed = if has_long_hr(flags) { 3 } else { 2 };
    if payload.len() < needed {
        return Err(CodecError::MalformedPayload {
            kind: CharacteristicKind::HeartRateMeasurement,
            needed,
            actual: payload.len(),
        });
    }

    if has_long_hr(flags) {
        Ok(((payload[1] as u16) << 8) + payload[2] as u16)
    } else {
        Ok(payload[1] as u16)
    }
}

/// Checks if the heart rate value uses 16-bit representation.
pub fn has_long_hr(flags: u8) -> bool {
    is_bit_set!(flags, 0)
}

/// Checks if the sensor has contact with the user's body.
pub fn sensor_contact_detected(flags: u8) -> bool {
    is_bit_set!(flags, 1)
}

/// Checks if the sensor supports contact detection.
pub fn sensor_contact_supported(flags: u8) -> bool {
    is_bit_set!(flags, 2)
}
