//! Bluetooth Component
//!
//! This module connects a `DeviceSession` to btleplug. It handles adapter
//! selection, peripheral discovery according to the configured selector, and
//! execution of the session's GATT requests against the connected peripheral.
//! Requests are queued by `ChannelGattClient` and executed by `PeripheralDriver`
//! between events, so the session only ever sees one event at a time.
use crate::api::controller::{DisplayName, GattClient, GattPeripheral};
use crate::api::view::DisplaySink;
use crate::components::session::DeviceSession;
use crate::core::config::PeripheralSelector;
use crate::core::events::GattEvent;
use crate::model::bluetooth::{DiscoveredCharacteristic, PeripheralIdentity};
use anyhow::{anyhow, Result};
use async_trait::async_trait;
use btleplug::api::{
    Central, CentralEvent, CentralState, Characteristic, Manager as _, Peripheral, ScanFilter,
    Service, ValueNotification,
};
use btleplug::platform::{Adapter, Manager, PeripheralId};
use futures::stream::{self, Stream, StreamExt};
use log::{debug, error, info, trace, warn};
use std::collections::BTreeSet;
use std::pin::Pin;
use std::time::Duration;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use uuid::Uuid;

/// Interval between two polls of the adapter's peripheral list while scanning.
const SCAN_POLL_INTERVAL: Duration = Duration::from_millis(500);

/// Request issued by a session, executed by the driver.
#[derive(Clone, Debug, PartialEq)]
pub enum GattRequest {
    DiscoverServices { filter: Vec<Uuid> },
    DiscoverCharacteristics { service: Uuid },
    Read { characteristic: Uuid },
    Subscribe { characteristic: Uuid },
}

/// Why `PeripheralDriver::run` returned.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SessionEnd {
    /// The adapter reported that the peripheral disconnected.
    Disconnected,
    /// The event stream ended without a disconnect.
    StreamEnded,
}

/// `GattClient` that queues requests on an unbounded channel.
#[derive(Clone, Debug)]
pub struct ChannelGattClient {
    tx: UnboundedSender<GattRequest>,
}

impl ChannelGattClient {
    /// Creates a client and the receiving end of its request queue.
    pub fn channel() -> (Self, UnboundedReceiver<GattRequest>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    fn send(&self, request: GattRequest) -> Result<()> {
        self.tx
            .send(request)
            .map_err(|e| anyhow!("request queue closed, dropping {:?}", e.0))
    }
}

impl GattClient for ChannelGattClient {
    fn discover_services(&mut self, filter: Vec<Uuid>) -> Result<()> {
        self.send(GattRequest::DiscoverServices { filter })
    }

    fn discover_characteristics(&mut self, service: Uuid) -> Result<()> {
        self.send(GattRequest::DiscoverCharacteristics { service })
    }

    fn read(&mut self, characteristic: Uuid) -> Result<()> {
        self.send(GattRequest::Read { characteristic })
    }

    fn subscribe(&mut self, characteristic: Uuid) -> Result<()> {
        self.send(GattRequest::Subscribe { characteristic })
    }
}

/// Drives one `DeviceSession` against one connected peripheral.
///
/// # Fields
/// - `peripheral`: The connected peripheral
/// - `session`: The session fed with the results of every request
/// - `requests`: Queue filled by the session's `ChannelGattClient`
/// - `services`: Services found by the last discovery
pub struct PeripheralDriver<P: GattPeripheral, D: DisplaySink> {
    peripheral: P,
    session: DeviceSession<ChannelGattClient, D>,
    requests: UnboundedReceiver<GattRequest>,
    services: BTreeSet<Service>,
}

impl<P: GattPeripheral, D: DisplaySink> PeripheralDriver<P, D> {
    pub fn new(peripheral: P, display: D) -> Self {
        let (client, requests) = ChannelGattClient::channel();
        Self {
            peripheral,
            session: DeviceSession::new(client, display),
            requests,
            services: BTreeSet::new(),
        }
    }

    pub fn session(&self) -> &DeviceSession<ChannelGattClient, D> {
        &self.session
    }

    /// Runs the session until the event stream reports a disconnect or ends.
    ///
    /// # Arguments
    /// - `identity`: The peripheral the connection was established with.
    /// - `events`: Notifications and link events of the peripheral, in order.
    pub async fn run<S>(&mut self, identity: PeripheralIdentity, mut events: S) -> SessionEnd
    where
        S: Stream<Item = GattEvent> + Unpin,
    {
        self.dispatch(GattEvent::Connected(identity)).await;
        let mut end = SessionEnd::StreamEnded;
        while let Some(event) = events.next().await {
            if event == GattEvent::Disconnected {
                end = SessionEnd::Disconnected;
                break;
            }
            self.dispatch(event).await;
        }
        match end {
            SessionEnd::Disconnected => info!("Peripheral disconnected."),
            SessionEnd::StreamEnded => warn!("Peripheral event stream terminated."),
        }
        self.session.on_disconnected();
        end
    }

    /// Feeds one event to the session and executes the requests it queued.
    async fn dispatch(&mut self, event: GattEvent) {
        let mut pending = vec![event];
        while let Some(event) = pending.pop() {
            self.session.handle_event(event);
            let mut follow_ups = Vec::new();
            while let Ok(request) = self.requests.try_recv() {
                match self.execute(request.clone()).await {
                    Ok(Some(event)) => follow_ups.push(event),
                    Ok(None) => {}
                    Err(e) => error!("GATT request {:?} failed: {}", request, e),
                }
            }
            // keep the order in which the requests were issued
            pending.extend(follow_ups.into_iter().rev());
        }
    }

    /// Executes one request and returns the event reporting its result.
    async fn execute(&mut self, request: GattRequest) -> Result<Option<GattEvent>> {
        trace!("Executing {:?}", request);
        match request {
            GattRequest::DiscoverServices { filter } => {
                self.services = self.peripheral.discover().await?;
                let matching: Vec<Uuid> = self
                    .services
                    .iter()
                    .map(|s| s.uuid)
                    .filter(|uuid| filter.contains(uuid))
                    .collect();
                Ok(Some(GattEvent::ServicesDiscovered(matching)))
            }
            GattRequest::DiscoverCharacteristics { service } => {
                let characteristics: Vec<DiscoveredCharacteristic> = self
                    .services
                    .iter()
                    .find(|s| s.uuid == service)
                    .map(|s| {
                        s.characteristics
                            .iter()
                            .map(DiscoveredCharacteristic::from)
                            .collect()
                    })
                    .unwrap_or_default();
                Ok(Some(GattEvent::CharacteristicsDiscovered(characteristics)))
            }
            GattRequest::Read { characteristic } => {
                let c = self.find_characteristic(characteristic)?;
                let payload = self.peripheral.read_value(&c).await?;
                Ok(Some(GattEvent::ValueUpdated {
                    uuid: characteristic,
                    payload,
                }))
            }
            GattRequest::Subscribe { characteristic } => {
                let c = self.find_characteristic(characteristic)?;
                self.peripheral.enable_notifications(&c).await?;
                debug!("Notifications enabled for {}.", characteristic);
                Ok(None)
            }
        }
    }

    fn find_characteristic(&self, uuid: Uuid) -> Result<Characteristic> {
        self.services
            .iter()
            .flat_map(|s| s.characteristics.iter())
            .find(|c| c.uuid == uuid)
            .cloned()
            .ok_or(anyhow!("Peripheral has no characteristic {}", uuid))
    }
}

#[async_trait]
impl<T: Peripheral> GattPeripheral for T {
    async fn discover(&self) -> Result<BTreeSet<Service>> {
        Peripheral::discover_services(self).await?;
        Ok(self.services())
    }

    async fn read_value(&self, characteristic: &Characteristic) -> Result<Vec<u8>> {
        Ok(Peripheral::read(self, characteristic).await?)
    }

    async fn enable_notifications(&self, characteristic: &Characteristic) -> Result<()> {
        Ok(Peripheral::subscribe(self, characteristic).await?)
    }
}

#[async_trait]
impl DisplayName for Adapter {
    async fn get_name(&self) -> Result<String> {
        Ok(self.adapter_info().await?)
    }
}

#[async_trait]
impl DisplayName for btleplug::platform::Peripheral {
    async fn get_name(&self) -> Result<String> {
        if let Some(props) = self.properties().await? {
            if let Some(name) = props.local_name {
                return Ok(name);
            }
        }
        Err(anyhow!("No name found"))
    }
}

/// Returns the adapter at `index` in the platform manager's list.
pub async fn select_adapter(index: usize) -> Result<Adapter> {
    let manager = Manager::new().await?;
    let adapters = manager.adapters().await?;
    let adapter = adapters
        .into_iter()
        .nth(index)
        .ok_or(anyhow!("No Bluetooth adapter at index {}", index))?;
    info!("Using adapter {}.", adapter.get_name().await?);
    Ok(adapter)
}

/// Fails unless the adapter radio is powered on.
fn ensure_powered_on(state: CentralState) -> Result<()> {
    match state {
        CentralState::PoweredOn => Ok(()),
        other => Err(anyhow!("Bluetooth adapter is not powered on ({:?})", other)),
    }
}

/// Scans until a peripheral matching `selector` shows up or `timeout` elapses.
///
/// Fails without scanning when the adapter is not powered on.
pub async fn find_peripheral<A>(
    adapter: &A,
    selector: &PeripheralSelector,
    timeout: Duration,
) -> Result<(A::Peripheral, PeripheralIdentity)>
where
    A: Central,
    A::Peripheral: DisplayName,
{
    let state = adapter.adapter_state().await?;
    info!("Adapter state: {:?}.", state);
    ensure_powered_on(state)?;
    adapter
        .start_scan(ScanFilter {
            services: selector.scan_services(),
        })
        .await?;
    info!("Scanning for a peripheral matching {:?}.", selector);

    let found = tokio::time::timeout(timeout, poll_for_match(adapter, selector)).await;

    if let Err(e) = adapter.stop_scan().await {
        warn!("Could not stop scanning: {}", e);
    }
    match found {
        Ok(result) => result,
        Err(_) => Err(anyhow!("No matching peripheral found within {:?}", timeout)),
    }
}

/// Polls the adapter's peripheral list until one matches `selector`.
async fn poll_for_match<A>(
    adapter: &A,
    selector: &PeripheralSelector,
) -> Result<(A::Peripheral, PeripheralIdentity)>
where
    A: Central,
    A::Peripheral: DisplayName,
{
    loop {
        for peripheral in adapter.peripherals().await? {
            let Some(props) = peripheral.properties().await? else {
                continue;
            };
            let address = peripheral.address();
            if selector.matches(props.local_name.as_deref(), address, &props.services) {
                let name = peripheral.get_name().await.unwrap_or_default();
                return Ok((peripheral, PeripheralIdentity { name, address }));
            }
        }
        tokio::time::sleep(SCAN_POLL_INTERVAL).await;
    }
}

/// Merges the notifications of `peripheral` and the adapter's disconnect events
/// for it into a single ordered event stream.
pub async fn peripheral_events<A>(
    adapter: &A,
    peripheral: &A::Peripheral,
) -> Result<Pin<Box<dyn Stream<Item = GattEvent> + Send>>>
where
    A: Central,
{
    let notifications = peripheral.notifications().await?;
    let link_events = adapter.events().await?.map(disconnected_id);
    Ok(merge_link_events(notifications, link_events, peripheral.id()))
}

fn disconnected_id(event: CentralEvent) -> Option<PeripheralId> {
    match event {
        CentralEvent::DeviceDisconnected(id) => Some(id),
        _ => None,
    }
}

/// Maps notifications to `ValueUpdated` and disconnects of `id` to `Disconnected`.
///
/// `link_events` yields the id of every disconnected peripheral, `None` for
/// any other adapter event.
fn merge_link_events<N, L, I>(
    notifications: N,
    link_events: L,
    id: I,
) -> Pin<Box<dyn Stream<Item = GattEvent> + Send>>
where
    N: Stream<Item = ValueNotification> + Send + 'static,
    L: Stream<Item = Option<I>> + Send + 'static,
    I: PartialEq + Send + 'static,
{
    let values = notifications.map(|n| GattEvent::ValueUpdated {
        uuid: n.uuid,
        payload: n.value,
    });
    let disconnects = link_events.filter_map(move |disconnected| {
        let ours = disconnected.as_ref() == Some(&id);
        async move { ours.then_some(GattEvent::Disconnected) }
    });
    Box::pin(stream::select(values, disconnects))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::controller::MockGattPeripheral;
    use crate::api::view::MockDisplaySink;
    use crate::components::session::SessionState;
    use crate::core::constants::{
        BODY_SENSOR_LOCATION_UUID, HEARTRATE_MEASUREMENT_UUID, HEARTRATE_SERVICE_UUID,
    };
    use crate::model::gatt::BodySensorLocation;
    use btleplug::api::{
        bleuuid::uuid_from_u16, BDAddr, CharPropFlags, Descriptor, PeripheralProperties,
        WriteType,
    };
    use mockall::mock;
    use mockall::predicate::eq;

    mock! {
        Peripheral{}

        impl Clone for Peripheral {
            fn clone(&self) -> Self;
        }

        impl std::fmt::Debug for Peripheral {
            fn fmt<'a>(&self, f: &mut std::fmt::Formatter<'a>) -> std::fmt::Result;
        }

        #[async_trait]
        impl Peripheral for Peripheral {
            fn id(&self) -> PeripheralId;
            fn address(&self) -> BDAddr;
            async fn properties(&self) -> btleplug::Result<Option<PeripheralProperties>>;
            fn services(&self) -> BTreeSet<Service>;
            fn characteristics(&self) -> BTreeSet<Characteristic>;
            async fn is_connected(&self) -> btleplug::Result<bool>;
            async fn connect(&self) -> btleplug::Result<()>;
            async fn disconnect(&self) -> btleplug::Result<()>;
            async fn discover_services(&self) -> btleplug::Result<()>;
            async fn write(
                &self,
                characteristic: &Characteristic,
                data: &[u8],
                write_type: WriteType,
            ) -> btleplug::Result<()>;
            async fn read(&self, characteristic: &Characteristic) -> btleplug::Result<Vec<u8>>;
            async fn subscribe(&self, characteristic: &Characteristic) -> btleplug::Result<()>;
            async fn unsubscribe(&self, characteristic: &Characteristic) -> btleplug::Result<()>;
            async fn notifications(&self) -> btleplug::Result<Pin<Box<dyn Stream<Item = ValueNotification> + Send>>>;
            async fn write_descriptor(&self, descriptor: &Descriptor, data: &[u8]) -> btleplug::Result<()>;
            async fn read_descriptor(&self, descriptor: &Descriptor) -> btleplug::Result<Vec<u8>>;
        }

        #[async_trait]
        impl DisplayName for Peripheral {
            async fn get_name(&self) -> Result<String>;
        }
    }

    mock! {
        Adapter{}

        impl Clone for Adapter {
            fn clone(&self) -> Self;
        }

        impl std::fmt::Debug for Adapter {
            fn fmt<'a>(&self, f: &mut std::fmt::Formatter<'a>) -> std::fmt::Result;
        }

        #[async_trait]
        impl Central for Adapter {
            type Peripheral = MockPeripheral;

            async fn events(&self) -> btleplug::Result<Pin<Box<dyn Stream<Item = CentralEvent> + Send>>>;

            async fn start_scan(&self, filter: ScanFilter) -> btleplug::Result<()>;

            async fn stop_scan(&self) -> btleplug::Result<()>;

            async fn peripherals(&self) -> btleplug::Result<Vec<MockPeripheral>>;

            async fn peripheral(&self, id: &PeripheralId) -> btleplug::Result<MockPeripheral>;

            async fn add_peripheral(&self, address: &PeripheralId) -> btleplug::Result<MockPeripheral>;

            async fn adapter_info(&self) -> btleplug::Result<String>;

            async fn adapter_state(&self) -> btleplug::Result<CentralState>;
        }
    }

    const BATTERY_SERVICE_UUID: Uuid = uuid_from_u16(0x180F);

    fn characteristic(uuid: Uuid, service_uuid: Uuid, properties: CharPropFlags) -> Characteristic {
        Characteristic {
            uuid,
            service_uuid,
            properties,
            descriptors: BTreeSet::new(),
        }
    }

    fn heart_rate_services() -> BTreeSet<Service> {
        let mut characteristics = BTreeSet::new();
        characteristics.insert(characteristic(
            BODY_SENSOR_LOCATION_UUID,
            HEARTRATE_SERVICE_UUID,
            CharPropFlags::READ,
        ));
        characteristics.insert(characteristic(
            HEARTRATE_MEASUREMENT_UUID,
            HEARTRATE_SERVICE_UUID,
            CharPropFlags::NOTIFY,
        ));
        let mut battery = BTreeSet::new();
        battery.insert(characteristic(
            uuid_from_u16(0x2A19),
            BATTERY_SERVICE_UUID,
            CharPropFlags::READ,
        ));

        let mut services = BTreeSet::new();
        services.insert(Service {
            uuid: HEARTRATE_SERVICE_UUID,
            primary: true,
            characteristics,
        });
        services.insert(Service {
            uuid: BATTERY_SERVICE_UUID,
            primary: true,
            characteristics: battery,
        });
        services
    }

    fn identity() -> PeripheralIdentity {
        PeripheralIdentity {
            name: "Polar H10".to_string(),
            address: BDAddr::default(),
        }
    }

    #[test]
    fn test_channel_client_queues_requests() {
        let (mut client, mut rx) = ChannelGattClient::channel();
        client.discover_services(vec![HEARTRATE_SERVICE_UUID]).unwrap();
        client.read(BODY_SENSOR_LOCATION_UUID).unwrap();
        assert_eq!(
            rx.try_recv().unwrap(),
            GattRequest::DiscoverServices {
                filter: vec![HEARTRATE_SERVICE_UUID]
            }
        );
        assert_eq!(
            rx.try_recv().unwrap(),
            GattRequest::Read {
                characteristic: BODY_SENSOR_LOCATION_UUID
            }
        );
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_channel_client_closed_queue() {
        let (mut client, rx) = ChannelGattClient::channel();
        drop(rx);
        assert!(client.subscribe(HEARTRATE_MEASUREMENT_UUID).is_err());
    }

    #[tokio::test]
    async fn test_driver_runs_full_session() {
        let mut peripheral = MockGattPeripheral::new();
        peripheral
            .expect_discover()
            .times(1)
            .returning(|| Ok(heart_rate_services()));
        peripheral
            .expect_read_value()
            .withf(|c| c.uuid == BODY_SENSOR_LOCATION_UUID)
            .times(1)
            .returning(|_| Ok(vec![1]));
        peripheral
            .expect_enable_notifications()
            .withf(|c| c.uuid == HEARTRATE_MEASUREMENT_UUID)
            .times(1)
            .returning(|_| Ok(()));

        let mut display = MockDisplaySink::new();
        display
            .expect_on_body_sensor_location_decoded()
            .with(eq(BodySensorLocation::Chest))
            .times(1)
            .return_const(());
        display
            .expect_on_heart_rate_decoded()
            .with(eq(64))
            .times(1)
            .return_const(());
        display
            .expect_on_heart_rate_decoded()
            .with(eq(300))
            .times(1)
            .return_const(());

        let mut driver = PeripheralDriver::new(peripheral, display);
        let events = stream::iter(vec![
            GattEvent::ValueUpdated {
                uuid: HEARTRATE_MEASUREMENT_UUID,
                payload: vec![0x06, 64],
            },
            GattEvent::ValueUpdated {
                uuid: HEARTRATE_MEASUREMENT_UUID,
                payload: vec![0x01, 1, 44],
            },
        ]);
        let end = driver.run(identity(), events).await;
        assert_eq!(end, SessionEnd::StreamEnded);
        assert_eq!(driver.session().state(), SessionState::Disconnected);
        assert!(driver.session().heart_rate().is_none());
    }

    #[tokio::test]
    async fn test_driver_stops_on_disconnect() {
        let mut peripheral = MockGattPeripheral::new();
        peripheral
            .expect_discover()
            .returning(|| Ok(heart_rate_services()));
        peripheral.expect_read_value().returning(|_| Ok(vec![2]));
        peripheral
            .expect_enable_notifications()
            .returning(|_| Ok(()));

        let mut display = MockDisplaySink::new();
        display
            .expect_on_body_sensor_location_decoded()
            .return_const(());
        display
            .expect_on_heart_rate_decoded()
            .with(eq(80))
            .times(1)
            .return_const(());

        let mut driver = PeripheralDriver::new(peripheral, display);
        let events = stream::iter(vec![
            GattEvent::ValueUpdated {
                uuid: HEARTRATE_MEASUREMENT_UUID,
                payload: vec![0x00, 80],
            },
            GattEvent::Disconnected,
            GattEvent::ValueUpdated {
                uuid: HEARTRATE_MEASUREMENT_UUID,
                payload: vec![0x00, 81],
            },
        ]);
        let end = driver.run(identity(), events).await;
        assert_eq!(end, SessionEnd::Disconnected);
        assert_eq!(driver.session().state(), SessionState::Disconnected);
    }

    #[tokio::test]
    async fn test_driver_filters_services() {
        let mut peripheral = MockGattPeripheral::new();
        peripheral.expect_discover().returning(|| {
            let mut services = heart_rate_services();
            services.retain(|s| s.uuid == BATTERY_SERVICE_UUID);
            Ok(services)
        });
        peripheral.expect_read_value().never();
        peripheral.expect_enable_notifications().never();

        let mut display = MockDisplaySink::new();
        display
            .expect_on_service_list_empty()
            .times(1)
            .return_const(());

        let mut driver = PeripheralDriver::new(peripheral, display);
        driver.dispatch(GattEvent::Connected(identity())).await;
        assert_eq!(
            driver.session().state(),
            SessionState::CharacteristicsDiscovering
        );
    }

    #[tokio::test]
    async fn test_driver_survives_failed_discovery() {
        let mut peripheral = MockGattPeripheral::new();
        peripheral
            .expect_discover()
            .returning(|| Err(anyhow!("not connected")));

        let mut driver = PeripheralDriver::new(peripheral, MockDisplaySink::new());
        driver.dispatch(GattEvent::Connected(identity())).await;
        assert_eq!(driver.session().state(), SessionState::ServicesDiscovering);
    }

    #[tokio::test]
    async fn test_unknown_characteristic_read_fails() {
        let mut driver = PeripheralDriver::new(MockGattPeripheral::new(), MockDisplaySink::new());
        let result = driver
            .execute(GattRequest::Read {
                characteristic: HEARTRATE_MEASUREMENT_UUID,
            })
            .await;
        assert!(result.is_err());
    }

    fn advertising_peripheral(
        name: &'static str,
        address: BDAddr,
        services: Vec<Uuid>,
    ) -> MockPeripheral {
        let mut peripheral = MockPeripheral::new();
        peripheral.expect_address().return_const(address);
        peripheral.expect_properties().returning(move || {
            Ok(Some(PeripheralProperties {
                local_name: Some(name.to_string()),
                services: services.clone(),
                ..Default::default()
            }))
        });
        peripheral
            .expect_get_name()
            .returning(move || Ok(name.to_string()));
        peripheral
    }

    fn powered_adapter() -> MockAdapter {
        let mut adapter = MockAdapter::new();
        adapter
            .expect_adapter_state()
            .returning(|| Ok(CentralState::PoweredOn));
        adapter
    }

    #[tokio::test]
    async fn test_find_peripheral_scans_for_heart_rate_service() {
        let address = BDAddr::from([0xA0, 0x9E, 0x1A, 0x00, 0x00, 0x01]);
        let mut adapter = powered_adapter();
        adapter
            .expect_start_scan()
            .withf(|filter| filter.services == vec![HEARTRATE_SERVICE_UUID])
            .times(1)
            .returning(|_| Ok(()));
        adapter.expect_peripherals().returning(move || {
            Ok(vec![
                advertising_peripheral("Scale", BDAddr::default(), vec![]),
                advertising_peripheral("Polar H10", address, vec![HEARTRATE_SERVICE_UUID]),
            ])
        });
        adapter.expect_stop_scan().times(1).returning(|| Ok(()));

        let (_, identity) = find_peripheral(
            &adapter,
            &PeripheralSelector::AdvertisesHeartRateService,
            Duration::from_secs(1),
        )
        .await
        .unwrap();
        assert_eq!(
            identity,
            PeripheralIdentity {
                name: "Polar H10".to_string(),
                address,
            }
        );
    }

    #[tokio::test]
    async fn test_find_peripheral_by_local_name_scans_unfiltered() {
        let address = BDAddr::from([0x01, 0x02, 0x03, 0x04, 0x05, 0x06]);
        let mut adapter = powered_adapter();
        adapter
            .expect_start_scan()
            .withf(|filter| filter.services.is_empty())
            .times(1)
            .returning(|_| Ok(()));
        adapter.expect_peripherals().returning(move || {
            Ok(vec![advertising_peripheral("Heart Rate", address, vec![])])
        });
        adapter.expect_stop_scan().returning(|| Ok(()));

        let (_, identity) = find_peripheral(
            &adapter,
            &PeripheralSelector::LocalName("Heart Rate".to_string()),
            Duration::from_secs(1),
        )
        .await
        .unwrap();
        assert_eq!(identity.name, "Heart Rate");
        assert_eq!(identity.address, address);
    }

    #[tokio::test]
    async fn test_find_peripheral_times_out() {
        let mut adapter = powered_adapter();
        adapter.expect_start_scan().returning(|_| Ok(()));
        adapter.expect_peripherals().returning(|| Ok(vec![]));
        adapter.expect_stop_scan().times(1).returning(|| Ok(()));

        let result = find_peripheral(
            &adapter,
            &PeripheralSelector::AdvertisesHeartRateService,
            Duration::from_millis(50),
        )
        .await;
        let error = result.err().unwrap().to_string();
        assert!(error.contains("No matching peripheral"), "{}", error);
    }

    #[tokio::test]
    async fn test_find_peripheral_requires_powered_adapter() {
        let mut adapter = MockAdapter::new();
        adapter
            .expect_adapter_state()
            .returning(|| Ok(CentralState::PoweredOff));
        adapter.expect_start_scan().never();
        adapter.expect_stop_scan().never();

        let result = find_peripheral(
            &adapter,
            &PeripheralSelector::AdvertisesHeartRateService,
            Duration::from_secs(1),
        )
        .await;
        let error = result.err().unwrap().to_string();
        assert!(error.contains("not powered on"), "{}", error);
    }

    #[test]
    fn test_only_powered_on_adapters_scan() {
        assert!(ensure_powered_on(CentralState::PoweredOn).is_ok());
        assert!(ensure_powered_on(CentralState::PoweredOff).is_err());
        assert!(ensure_powered_on(CentralState::Unknown).is_err());
    }

    #[tokio::test]
    async fn test_link_events_ignore_other_peripherals() {
        let notifications = stream::iter(vec![
            ValueNotification {
                uuid: HEARTRATE_MEASUREMENT_UUID,
                value: vec![0x00, 72],
            },
            ValueNotification {
                uuid: BODY_SENSOR_LOCATION_UUID,
                value: vec![1],
            },
        ]);
        let link_events = stream::iter(vec![Some(7u8), None, Some(3u8), Some(7u8)]);

        let events: Vec<GattEvent> = merge_link_events(notifications, link_events, 3u8)
            .collect()
            .await;
        assert_eq!(events.len(), 3);
        assert_eq!(
            events
                .iter()
                .filter(|e| **e == GattEvent::Disconnected)
                .count(),
            1
        );
        let values: Vec<&GattEvent> = events
            .iter()
            .filter(|e| **e != GattEvent::Disconnected)
            .collect();
        assert_eq!(
            values,
            vec![
                &GattEvent::ValueUpdated {
                    uuid: HEARTRATE_MEASUREMENT_UUID,
                    payload: vec![0x00, 72],
                },
                &GattEvent::ValueUpdated {
                    uuid: BODY_SENSOR_LOCATION_UUID,
                    payload: vec![1],
                },
            ]
        );
    }

    #[tokio::test]
    async fn test_link_events_without_disconnect() {
        let link_events = stream::iter(vec![None, Some(9u8)]);
        let events: Vec<GattEvent> =
            merge_link_events(stream::empty::<ValueNotification>(), link_events, 3u8)
                .collect()
                .await;
        assert!(events.is_empty());
    }
}
