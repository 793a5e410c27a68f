//! Display API
//!
//! This module defines the `DisplaySink` trait, the receiving end of every value a
//! device session decodes. Implementations render, log or forward the values.

#[cfg(test)]
use mockall::automock;
use uuid::Uuid;

use crate::model::gatt::BodySensorLocation;

/// Trait defining the interface for the display collaborator.
///
/// Callbacks are invoked in event order from the session's single callback sequence.
#[cfg_attr(test, automock)]
pub trait DisplaySink: Send {
    /// Called when a Body Sensor Location read was decoded.
    fn on_body_sensor_location_decoded(&mut self, location: BodySensorLocation);

    /// Called for every decoded Heart Rate Measurement.
    fn on_heart_rate_decoded(&mut self, bpm: u16);

    /// Called when a payload of a known characteristic could not be decoded.
    ///
    /// # Arguments
    /// * `uuid` - The characteristic the payload belongs to.
    /// * `reason` - Human-readable decode failure.
    fn on_unreadable_value(&mut self, uuid: Uuid, reason: String);

    /// Advisory: service discovery returned no services, the session will stall.
    fn on_service_list_empty(&mut self);
}
