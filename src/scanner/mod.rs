//! BLE scanner abstraction for sensor advertisements.
//!
//! Backends own all radio state inside a spawned task and deliver
//! [`AdvertisementRecord`]s over a channel. Filtering and decoding happen in
//! the consumer, so records can just as well come from a test fixture.
//!
//! Every backend watches a shutdown flag; once it flips, the backend releases
//! the adapter and drops its sender. A closed channel therefore means the
//! scan has fully stopped.

#[cfg(feature = "bluer")]
pub mod bluer;

#[cfg(feature = "hci")]
pub mod hci;

use crate::advertisement::AdvertisementRecord;
use crate::mac_address::MacAddress;
use thiserror::Error;
use tokio::sync::{mpsc, watch};

pub use crate::decoder::SENSOR_SERVICE_UUID;

/// Error type for scanner operations.
#[derive(Error, Debug)]
pub enum ScanError {
    /// Bluetooth/adapter related error
    #[error("Bluetooth error: {0}")]
    Bluetooth(String),
    /// Adapter identifier could not be resolved
    #[error("Invalid adapter '{0}': expected 'default', 'hciN' or N")]
    InvalidAdapter(String),
}

/// Channel buffer size for advertisement records.
pub const RECORD_CHANNEL_BUFFER_SIZE: usize = 100;

/// Adapter identifier that selects the system default adapter.
pub const DEFAULT_ADAPTER: &str = "default";

/// The Bluetooth base UUID, `0000xxxx-0000-1000-8000-00805F9B34FB`.
const BLUETOOTH_BASE_UUID: u128 = 0x00000000_0000_1000_8000_00805f9b34fb;

/// Convert a 128-bit UUID to its 16-bit short form, if it has one.
pub fn short_uuid(uuid: u128) -> Option<u16> {
    let short = (uuid >> 96) as u32;
    let rebuilt = BLUETOOTH_BASE_UUID | (u128::from(short) << 96);
    (uuid == rebuilt && short <= u32::from(u16::MAX)).then_some(short as u16)
}

/// Expand a 16-bit UUID onto the Bluetooth base UUID.
pub const fn full_uuid(short: u16) -> u128 {
    BLUETOOTH_BASE_UUID | ((short as u128) << 96)
}

/// Available scanner backends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum Backend {
    /// BlueZ D-Bus backend (requires bluetoothd daemon)
    #[cfg(feature = "bluer")]
    #[value(alias = "bluez")]
    Bluer,
    /// Raw HCI socket backend (direct kernel access, no daemon required)
    #[cfg(feature = "hci")]
    #[value(alias = "raw")]
    Hci,
}

impl Default for Backend {
    fn default() -> Self {
        #[cfg(feature = "bluer")]
        return Backend::Bluer;
        #[cfg(all(feature = "hci", not(feature = "bluer")))]
        return Backend::Hci;
        #[cfg(not(any(feature = "bluer", feature = "hci")))]
        compile_error!("At least one backend feature must be enabled");
    }
}

impl std::fmt::Display for Backend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            #[cfg(feature = "bluer")]
            Backend::Bluer => write!(f, "bluer"),
            #[cfg(feature = "hci")]
            Backend::Hci => write!(f, "hci"),
        }
    }
}

/// Everything a backend needs to start scanning.
///
/// The adapter is always passed explicitly; there is no process-wide default
/// device handle.
#[derive(Debug, Clone, PartialEq)]
pub struct ScanConfig {
    pub backend: Backend,
    /// `default`, an adapter name such as `hci1`, or a bare index.
    pub adapter: String,
    /// Random static address to assign before scanning (HCI backend only).
    pub random_address: Option<MacAddress>,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            backend: Backend::default(),
            adapter: DEFAULT_ADAPTER.to_string(),
            random_address: None,
        }
    }
}

/// Resolve an adapter identifier to an HCI device index.
pub fn adapter_index(adapter: &str) -> Result<u16, ScanError> {
    if adapter.eq_ignore_ascii_case(DEFAULT_ADAPTER) {
        return Ok(0);
    }
    adapter
        .strip_prefix("hci")
        .unwrap_or(adapter)
        .parse()
        .map_err(|_| ScanError::InvalidAdapter(adapter.to_string()))
}

/// Start scanning with the configured backend.
///
/// Returns once the adapter is set up; fatal setup problems (no adapter, no
/// permission) are reported here. Records then arrive on the receiver until
/// `shutdown` becomes `true`.
pub async fn start_scan(
    config: ScanConfig,
    shutdown: watch::Receiver<bool>,
) -> Result<mpsc::Receiver<AdvertisementRecord>, ScanError> {
    match config.backend {
        #[cfg(feature = "bluer")]
        Backend::Bluer => bluer::start_scan(&config, shutdown).await,
        #[cfg(feature = "hci")]
        Backend::Hci => hci::start_scan(&config, shutdown).await,
    }
}

/// Resolves when the shutdown flag is set or its sender is gone.
pub(crate) async fn shutdown_requested(shutdown: &mut watch::Receiver<bool>) {
    // An error means the sender was dropped, which also ends the scan.
    let _ = shutdown.wait_for(|stop| *stop).await;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_short_uuid() {
        assert_eq!(
            short_uuid(0x0000fe95_0000_1000_8000_00805f9b34fb),
            Some(SENSOR_SERVICE_UUID)
        );
        assert_eq!(short_uuid(0x0000181a_0000_1000_8000_00805f9b34fb), Some(0x181A));
        // 32-bit short form
        assert_eq!(short_uuid(0x1234fe95_0000_1000_8000_00805f9b34fb), None);
        // Vendor UUID
        assert_eq!(short_uuid(0x226caa55_6476_4566_7562_66734470666d), None);
    }

    #[test]
    fn test_adapter_index() {
        assert_eq!(adapter_index("default").unwrap(), 0);
        assert_eq!(adapter_index("hci0").unwrap(), 0);
        assert_eq!(adapter_index("hci2").unwrap(), 2);
        assert_eq!(adapter_index("1").unwrap(), 1);
        assert!(matches!(
            adapter_index("usb0"),
            Err(ScanError::InvalidAdapter(name)) if name == "usb0"
        ));
    }

    #[test]
    fn test_full_uuid() {
        assert_eq!(
            full_uuid(SENSOR_SERVICE_UUID),
            0x0000fe95_0000_1000_8000_00805f9b34fb
        );
        assert_eq!(short_uuid(full_uuid(0x181A)), Some(0x181A));
    }

    #[cfg(feature = "bluer")]
    #[test]
    fn test_bluer_backend_display() {
        assert_eq!(Backend::Bluer.to_string(), "bluer");
    }

    #[cfg(feature = "hci")]
    #[test]
    fn test_hci_backend_display() {
        assert_eq!(Backend::Hci.to_string(), "hci");
    }

    #[test]
    fn test_backend_parses_as_value_enum() {
        use clap::ValueEnum;

        #[cfg(feature = "bluer")]
        {
            assert_eq!(Backend::from_str("bluer", true).unwrap(), Backend::Bluer);
            assert_eq!(Backend::from_str("BlueZ", true).unwrap(), Backend::Bluer);
        }
        #[cfg(feature = "hci")]
        {
            assert_eq!(Backend::from_str("HCI", true).unwrap(), Backend::Hci);
            assert_eq!(Backend::from_str("raw", true).unwrap(), Backend::Hci);
        }
        assert!(Backend::from_str("invalid", true).is_err());
    }

    #[test]
    fn test_scan_error_display() {
        assert_eq!(
            ScanError::InvalidAdapter("usb0".into()).to_string(),
            "Invalid adapter 'usb0': expected 'default', 'hciN' or N"
        );
        assert_eq!(
            ScanError::Bluetooth("No default adapter".into()).to_string(),
            "Bluetooth error: No default adapter"
        );
    }

    #[test]
    fn test_shutdown_requested_resolves_when_flag_set() {
        let (tx, mut rx) = watch::channel(false);
        tx.send(true).unwrap();
        tokio_test::block_on(shutdown_requested(&mut rx));

        let (tx, mut rx) = watch::channel(false);
        drop(tx);
        tokio_test::block_on(shutdown_requested(&mut rx));
    }
}
