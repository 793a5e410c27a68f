//! Display Sinks
//!
//! Implementations of `DisplaySink` used by the binary: a broadcast forwarder
//! so any number of consumers can follow a session, and a sink that renders the
//! values to the log.
use log::{info, trace, warn};
use tokio::sync::broadcast::Sender;
use uuid::Uuid;

use crate::api::view::DisplaySink;
use crate::core::events::DisplayEvent;
use crate::model::gatt::BodySensorLocation;

impl DisplaySink for Sender<DisplayEvent> {
    fn on_body_sensor_location_decoded(&mut self, location: BodySensorLocation) {
        publish(self, DisplayEvent::BodySensorLocation(location));
    }

    fn on_heart_rate_decoded(&mut self, bpm: u16) {
        publish(self, DisplayEvent::HeartRate(bpm));
    }

    fn on_unreadable_value(&mut self, uuid: Uuid, reason: String) {
        publish(self, DisplayEvent::UnreadableValue { uuid, reason });
    }

    fn on_service_list_empty(&mut self) {
        publish(self, DisplayEvent::ServiceListEmpty);
    }
}

fn publish(tx: &Sender<DisplayEvent>, event: DisplayEvent) {
    if tx.send(event).is_err() {
        trace!("No display subscribers, value dropped.");
    }
}

/// Renders display events to the log.
#[derive(Debug, Default)]
pub struct LogDisplay;

impl LogDisplay {
    pub fn render(&mut self, event: DisplayEvent) {
        match event {
            DisplayEvent::BodySensorLocation(location) => {
                self.on_body_sensor_location_decoded(location)
            }
            DisplayEvent::HeartRate(bpm) => self.on_heart_rate_decoded(bpm),
            DisplayEvent::UnreadableValue { uuid, reason } => {
                self.on_unreadable_value(uuid, reason)
            }
            DisplayEvent::ServiceListEmpty => self.on_service_list_empty(),
        }
    }
}

impl DisplaySink for LogDisplay {
    fn on_body_sensor_location_decoded(&mut self, location: BodySensorLocation) {
        info!("Body sensor location: {}", location);
    }

    fn on_heart_rate_decoded(&mut self, bpm: u16) {
        info!("BPM: {}", bpm);
    }

    fn on_unreadable_value(&mut self, uuid: Uuid, reason: String) {
        warn!("Unreadable value from {}: {}", uuid, reason);
    }

    fn on_service_list_empty(&mut self) {
        warn!("Peripheral does not expose the Heart Rate Service.");
    }
}
