//! BlueZ D-Bus backend for sensor scanning.
//!
//! This backend uses the `bluer` crate to communicate with the BlueZ daemon
//! via D-Bus. It requires the `bluetoothd` daemon to be running.
//!
//! BlueZ reports each device once through the advertisement monitor; later
//! advertisements show up as `ServiceData` property changes on the device, so
//! every found sensor gets its own watcher task.
//!
//! The sensor's name only travels in its scan response. Monitors scan
//! passively, so discovery filtered on `0xFE95` runs alongside the monitor
//! for as long as the scan lasts; that makes BlueZ send scan requests and
//! fill in the `Name` property.

use super::{
    DEFAULT_ADAPTER, RECORD_CHANNEL_BUFFER_SIZE, SENSOR_SERVICE_UUID, ScanConfig, ScanError,
    full_uuid, short_uuid, shutdown_requested,
};
use crate::advertisement::{AdvertisementRecord, ServiceDataEntry};
use crate::mac_address::MacAddress;
use bluer::monitor::{Monitor, MonitorEvent, Pattern, RssiSamplingPeriod, Type};
use bluer::{
    Adapter, AdapterEvent, Address, Device, DeviceEvent, DeviceProperty, DiscoveryFilter,
    DiscoveryTransport, Session, Uuid,
};
use futures::StreamExt;
use std::collections::{HashMap, HashSet};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// AD type for service data with a 16-bit UUID.
const SERVICE_DATA_UUID16_TYPE: u8 = 0x16;

impl From<bluer::Error> for ScanError {
    fn from(err: bluer::Error) -> Self {
        ScanError::Bluetooth(err.to_string())
    }
}

/// Start scanning for sensors using the BlueZ D-Bus backend.
///
/// Registers an advertisement monitor matching service data tagged with
/// `0xFE95`, starts active LE discovery for the same UUID, and spawns the
/// task that owns the session. The task runs until `shutdown` is set, then
/// stops discovery and unregisters the monitor by dropping them.
pub async fn start_scan(
    config: &ScanConfig,
    mut shutdown: watch::Receiver<bool>,
) -> Result<mpsc::Receiver<AdvertisementRecord>, ScanError> {
    let session = Session::new().await?;
    let adapter = if config.adapter.eq_ignore_ascii_case(DEFAULT_ADAPTER) {
        session.default_adapter().await?
    } else {
        session.adapter(&config.adapter)?
    };
    adapter.set_powered(true).await?;

    if config.random_address.is_some() {
        warn!("random address is only supported by the hci backend, ignoring");
    }

    let pattern = Pattern {
        data_type: SERVICE_DATA_UUID16_TYPE,
        start_position: 0,
        content: SENSOR_SERVICE_UUID.to_le_bytes().to_vec(),
    };

    let monitor_manager = adapter.monitor().await?;
    let mut monitor_handle = monitor_manager
        .register(Monitor {
            monitor_type: Type::OrPatterns,
            rssi_sampling_period: Some(RssiSamplingPeriod::All),
            patterns: Some(vec![pattern]),
            ..Default::default()
        })
        .await?;

    adapter.set_discovery_filter(discovery_filter()).await?;
    let mut discovery = Box::pin(adapter.discover_devices().await?);

    info!(adapter = adapter.name(), "registered BlueZ advertisement monitor and discovery");

    let (tx, rx) = mpsc::channel(RECORD_CHANNEL_BUFFER_SIZE);

    tokio::spawn(async move {
        // Keep all Bluetooth state alive by moving it into this task
        let _session = session;
        let _monitor_manager = monitor_manager;
        let mut watchers: HashMap<Address, JoinHandle<()>> = HashMap::new();

        loop {
            tokio::select! {
                _ = shutdown_requested(&mut shutdown) => break,
                event = monitor_handle.next() => match event {
                    Some(MonitorEvent::DeviceFound(device_id)) => {
                        ensure_watcher(&adapter, &mut watchers, device_id.device, &tx);
                    }
                    Some(MonitorEvent::DeviceLost(device_id)) => {
                        debug!(address = %device_id.device, "sensor lost");
                        if let Some(watcher) = watchers.remove(&device_id.device) {
                            watcher.abort();
                        }
                    }
                    #[allow(unreachable_patterns)]
                    Some(_) => {}
                    None => break,
                },
                event = discovery.next() => match event {
                    Some(AdapterEvent::DeviceAdded(address)) => {
                        ensure_watcher(&adapter, &mut watchers, address, &tx);
                    }
                    Some(_) => {}
                    None => {
                        warn!("BlueZ discovery ended");
                        break;
                    }
                },
            }
        }

        for watcher in watchers.into_values() {
            watcher.abort();
        }
        info!("BlueZ scan stopped");
    });

    Ok(rx)
}

/// Active LE discovery restricted to devices advertising the sensor UUID.
fn discovery_filter() -> DiscoveryFilter {
    DiscoveryFilter {
        uuids: HashSet::from([Uuid::from_u128(full_uuid(SENSOR_SERVICE_UUID))]),
        transport: DiscoveryTransport::Le,
        duplicate_data: true,
        ..Default::default()
    }
}

/// Spawn a watcher for `address` unless one is already running.
fn ensure_watcher(
    adapter: &Adapter,
    watchers: &mut HashMap<Address, JoinHandle<()>>,
    address: Address,
    tx: &mpsc::Sender<AdvertisementRecord>,
) {
    if watchers.get(&address).is_some_and(|w| !w.is_finished()) {
        return;
    }
    match adapter.device(address) {
        Ok(device) => {
            debug!(%address, "sensor found");
            watchers.insert(address, tokio::spawn(watch_device(device, tx.clone())));
        }
        Err(e) => debug!(%address, error = %e, "cannot open device"),
    }
}

/// Name and address of one device, updated from its property changes.
#[derive(Debug)]
struct DeviceState {
    address: MacAddress,
    name: Option<String>,
}

impl DeviceState {
    /// Apply a property change, returning a record for new service data.
    ///
    /// The name usually arrives after the first service data, once BlueZ has
    /// seen a scan response. Records built before that carry no name.
    fn apply(&mut self, property: DeviceProperty) -> Option<AdvertisementRecord> {
        match property {
            DeviceProperty::Name(name) => {
                self.name = Some(name);
                None
            }
            DeviceProperty::ServiceData(service_data) => {
                Some(to_record(self.name.clone(), self.address, &service_data))
            }
            _ => None,
        }
    }
}

/// Forward the current and every subsequent service-data update of a device.
async fn watch_device(device: Device, tx: mpsc::Sender<AdvertisementRecord>) {
    let address: MacAddress = device.address().into();

    let name = device.name().await.unwrap_or_else(|e| {
        debug!(%address, error = %e, "cannot read device name");
        None
    });
    let mut state = DeviceState { address, name };

    match device.service_data().await {
        Ok(Some(service_data)) => {
            let record = state.apply(DeviceProperty::ServiceData(service_data));
            if let Some(record) = record
                && tx.send(record).await.is_err()
            {
                return;
            }
        }
        Ok(None) => {}
        Err(e) => debug!(%address, error = %e, "cannot read service data"),
    }

    let mut events = match device.events().await {
        Ok(events) => events,
        Err(e) => {
            debug!(%address, error = %e, "cannot subscribe to device events");
            return;
        }
    };

    while let Some(DeviceEvent::PropertyChanged(property)) = events.next().await {
        if let Some(record) = state.apply(property)
            && tx.send(record).await.is_err()
        {
            break;
        }
    }
}

/// Build a record from BlueZ's service-data map.
///
/// BlueZ keys service data by full 128-bit UUID and does not preserve
/// advertisement order. Entries without a 16-bit short form are dropped.
fn to_record(
    name: Option<String>,
    address: MacAddress,
    service_data: &HashMap<Uuid, Vec<u8>>,
) -> AdvertisementRecord {
    let entries = service_data
        .iter()
        .filter_map(|(uuid, data)| {
            short_uuid(uuid.as_u128()).map(|short| ServiceDataEntry::new(short, data.clone()))
        })
        .collect();
    AdvertisementRecord::new(name, address, entries)
}
