//! Device Session
//!
//! This module implements the lifecycle of a single connection to a heart rate
//! peripheral. The session is driven by `GattEvent`s from the BLE collaborator,
//! issues discovery/read/subscribe requests through a `GattClient` and hands
//! decoded values to a `DisplaySink`.
//!
//! ```text
//! Disconnected -> ServicesDiscovering -> CharacteristicsDiscovering -> Active
//!       ^___________________ Disconnected (from any state) ______________|
//! ```
//!
//! Events arriving in a state that does not accept them are dropped. BLE
//! callbacks race with manual disconnects, so stale events are expected.
use anyhow::Result;
use log::{debug, error, info, trace, warn};
use rust_fsm::{StateMachine, StateMachineImpl};
use uuid::Uuid;

use crate::api::controller::GattClient;
use crate::api::view::DisplaySink;
use crate::core::constants::HEARTRATE_SERVICE_UUID;
use crate::core::events::GattEvent;
use crate::model::bluetooth::{DiscoveredCharacteristic, PeripheralIdentity};
use crate::model::gatt::{
    classify_uuid, decode_body_sensor_location, decode_heart_rate, sensor_contact_detected,
    sensor_contact_supported, BodySensorLocation, CharacteristicKind,
};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SessionState {
    Disconnected,
    ServicesDiscovering,
    CharacteristicsDiscovering,
    Active,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SessionInput {
    Connected,
    ServicesDiscovered,
    /// A characteristic list arrived while more are outstanding.
    CharacteristicsDiscovered,
    /// The last outstanding characteristic list arrived.
    AllCharacteristicsDiscovered,
    ValueUpdated,
    Disconnected,
}

/// Side effect the session performs after a transition.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SessionAction {
    RequestServiceDiscovery,
    RequestCharacteristicDiscovery,
    ConfigureCharacteristics,
    DecodeValue,
    ClearReadings,
}

/// Transition table of the session lifecycle.
#[derive(Debug)]
pub struct SessionMachine;

impl StateMachineImpl for SessionMachine {
    type Input = SessionInput;
    type State = SessionState;
    type Output = SessionAction;
    const INITIAL_STATE: Self::State = SessionState::Disconnected;

    fn transition(state: &Self::State, input: &Self::Input) -> Option<Self::State> {
        match (state, input) {
            (_, SessionInput::Disconnected) => Some(SessionState::Disconnected),
            (SessionState::Disconnected, SessionInput::Connected) => {
                Some(SessionState::ServicesDiscovering)
            }
            (SessionState::ServicesDiscovering, SessionInput::ServicesDiscovered) => {
                Some(SessionState::CharacteristicsDiscovering)
            }
            (SessionState::CharacteristicsDiscovering, SessionInput::CharacteristicsDiscovered) => {
                Some(SessionState::CharacteristicsDiscovering)
            }
            (
                SessionState::CharacteristicsDiscovering,
                SessionInput::AllCharacteristicsDiscovered,
            ) => Some(SessionState::Active),
            (SessionState::Active, SessionInput::ValueUpdated) => Some(SessionState::Active),
            _ => None,
        }
    }

    fn output(state: &Self::State, input: &Self::Input) -> Option<Self::Output> {
        match (state, input) {
            (_, SessionInput::Disconnected) => Some(SessionAction::ClearReadings),
            (SessionState::Disconnected, SessionInput::Connected) => {
                Some(SessionAction::RequestServiceDiscovery)
            }
            (SessionState::ServicesDiscovering, SessionInput::ServicesDiscovered) => {
                Some(SessionAction::RequestCharacteristicDiscovery)
            }
            (
                SessionState::CharacteristicsDiscovering,
                SessionInput::CharacteristicsDiscovered
                | SessionInput::AllCharacteristicsDiscovered,
            ) => Some(SessionAction::ConfigureCharacteristics),
            (SessionState::Active, SessionInput::ValueUpdated) => Some(SessionAction::DecodeValue),
            _ => None,
        }
    }
}

/// One connection attempt to one peripheral.
///
/// # Type Parameters
/// - `C`: Outbound BLE collaborator
/// - `D`: Receiver of decoded values
///
/// # Fields
/// - `machine`: Lifecycle state machine
/// - `identity`: Peripheral the session is connected to
/// - `pending_discoveries`: Characteristic lists requested but not yet received
/// - `body_sensor_location`: Last decoded sensor location, unset until first read
/// - `heart_rate`: Last decoded BPM, unset until first notification
pub struct DeviceSession<C: GattClient, D: DisplaySink> {
    machine: StateMachine<SessionMachine>,
    client: C,
    display: D,
    identity: Option<PeripheralIdentity>,
    pending_discoveries: usize,
    body_sensor_location: Option<BodySensorLocation>,
    heart_rate: Option<u16>,
}

impl<C: GattClient, D: DisplaySink> DeviceSession<C, D> {
    /// Creates a session in the `Disconnected` state.
    pub fn new(client: C, display: D) -> Self {
        Self {
            machine: StateMachine::new(),
            client,
            display,
            identity: None,
            pending_discoveries: 0,
            body_sensor_location: None,
            heart_rate: None,
        }
    }

    pub fn state(&self) -> SessionState {
        *self.machine.state()
    }

    pub fn identity(&self) -> Option<&PeripheralIdentity> {
        self.identity.as_ref()
    }

    pub fn body_sensor_location(&self) -> Option<BodySensorLocation> {
        self.body_sensor_location
    }

    pub fn heart_rate(&self) -> Option<u16> {
        self.heart_rate
    }

    /// Dispatches a collaborator event to its transition.
    pub fn handle_event(&mut self, event: GattEvent) {
        match event {
            GattEvent::Connected(identity) => self.on_connected(identity),
            GattEvent::ServicesDiscovered(services) => self.on_services_discovered(&services),
            GattEvent::CharacteristicsDiscovered(characteristics) => {
                self.on_characteristics_discovered(&characteristics)
            }
            GattEvent::ValueUpdated { uuid, payload } => self.on_value_updated(uuid, &payload),
            GattEvent::Disconnected => self.on_disconnected(),
        }
    }

    /// The peripheral is connected; request discovery of the Heart Rate Service only.
    pub fn on_connected(&mut self, identity: PeripheralIdentity) {
        if self.advance(SessionInput::Connected) != Some(SessionAction::RequestServiceDiscovery) {
            return;
        }
        info!("Connected to {}.", identity);
        self.identity = Some(identity);
        let result = self.client.discover_services(vec![HEARTRATE_SERVICE_UUID]);
        log_request_failure(result, "service discovery");
    }

    /// Requests characteristic discovery for every reported service.
    pub fn on_services_discovered(&mut self, services: &[Uuid]) {
        if self.advance(SessionInput::ServicesDiscovered)
            != Some(SessionAction::RequestCharacteristicDiscovery)
        {
            return;
        }
        if services.is_empty() {
            warn!("Peripheral reported no Heart Rate Service, session stalls.");
            self.display.on_service_list_empty();
            return;
        }
        self.pending_discoveries = 0;
        for service in services {
            debug!("Discovering characteristics of service {}.", service);
            match self.client.discover_characteristics(*service) {
                Ok(()) => self.pending_discoveries += 1,
                Err(e) => error!("Could not request characteristic discovery: {}", e),
            }
        }
    }

    /// Reads the sensor location once and subscribes to heart rate notifications.
    ///
    /// The session becomes `Active` once the last requested list has arrived.
    pub fn on_characteristics_discovered(&mut self, characteristics: &[DiscoveredCharacteristic]) {
        let input = if self.pending_discoveries > 1 {
            SessionInput::CharacteristicsDiscovered
        } else {
            SessionInput::AllCharacteristicsDiscovered
        };
        if self.advance(input) != Some(SessionAction::ConfigureCharacteristics) {
            return;
        }
        self.pending_discoveries = self.pending_discoveries.saturating_sub(1);
        for characteristic in characteristics {
            match classify_uuid(&characteristic.uuid) {
                CharacteristicKind::BodySensorLocation => {
                    if !characteristic.can_read() {
                        warn!("{} does not advertise read support.", characteristic.uuid);
                    }
                    let result = self.client.read(characteristic.uuid);
                    log_request_failure(result, "body sensor location read");
                }
                CharacteristicKind::HeartRateMeasurement => {
                    if !characteristic.can_notify() {
                        warn!("{} does not advertise notify support.", characteristic.uuid);
                    }
                    let result = self.client.subscribe(characteristic.uuid);
                    log_request_failure(result, "heart rate subscription");
                }
                kind => trace!("Skipping characteristic {} ({}).", characteristic.uuid, kind),
            }
        }
    }

    /// Decodes a characteristic value and forwards it to the display.
    pub fn on_value_updated(&mut self, uuid: Uuid, payload: &[u8]) {
        if self.advance(SessionInput::ValueUpdated) != Some(SessionAction::DecodeValue) {
            return;
        }
        match classify_uuid(&uuid) {
            CharacteristicKind::BodySensorLocation => match decode_body_sensor_location(payload) {
                Ok(location) => {
                    trace!("Body sensor location: {}", location);
                    self.body_sensor_location = Some(location);
                    self.display.on_body_sensor_location_decoded(location);
                }
                Err(e) => self.report_unreadable(uuid, e.to_string()),
            },
            CharacteristicKind::HeartRateMeasurement => match decode_heart_rate(payload) {
                Ok(bpm) => {
                    trace!(
                        "BPM: {} (contact supported: {}, detected: {})",
                        bpm,
                        sensor_contact_supported(payload[0]),
                        sensor_contact_detected(payload[0])
                    );
                    self.heart_rate = Some(bpm);
                    self.display.on_heart_rate_decoded(bpm);
                }
                Err(e) => self.report_unreadable(uuid, e.to_string()),
            },
            _ => debug!("Unhandled characteristic UUID: {}", uuid),
        }
    }

    /// Resets the session; valid from any state.
    pub fn on_disconnected(&mut self) {
        if self.advance(SessionInput::Disconnected) != Some(SessionAction::ClearReadings) {
            return;
        }
        if let Some(identity) = self.identity.take() {
            info!("Disconnected from {}.", identity);
        }
        self.pending_discoveries = 0;
        self.body_sensor_location = None;
        self.heart_rate = None;
    }

    fn report_unreadable(&mut self, uuid: Uuid, reason: String) {
        warn!("Unreadable value for {}: {}", uuid, reason);
        self.display.on_unreadable_value(uuid, reason);
    }

    /// Feeds `input` to the state machine, returning the action to perform.
    fn advance(&mut self, input: SessionInput) -> Option<SessionAction> {
        let state = self.state();
        match self.machine.consume(&input) {
            Ok(action) => {
                trace!("{:?} --{:?}--> {:?}", state, input, self.state());
                action
            }
            Err(_) => {
                debug!("Dropping {:?} event in state {:?}.", input, state);
                None
            }
        }
    }
}

fn log_request_failure(result: Result<()>, what: &str) {
    if let Err(e) = result {
        error!("Could not request {}: {}", what, e);
    }
}
