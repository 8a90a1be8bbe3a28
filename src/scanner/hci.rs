//! Raw HCI socket backend for sensor scanning.
//!
//! This backend uses raw Linux HCI sockets to scan for BLE advertisements
//! without requiring the BlueZ daemon. It requires CAP_NET_RAW and
//! CAP_NET_ADMIN capabilities or root privileges.
//!
//! The sensor puts its service data in the advertisement and its local name
//! in the scan response, so the scan is active and names are remembered per
//! address.

use super::{
    RECORD_CHANNEL_BUFFER_SIZE, ScanConfig, ScanError, adapter_index, shutdown_requested,
};
use crate::advertisement::{AdvertisementRecord, ServiceDataEntry};
use crate::mac_address::MacAddress;
use libc::{AF_BLUETOOTH, SOCK_CLOEXEC, SOCK_NONBLOCK, SOCK_RAW, c_int, c_void, sockaddr, socklen_t};
use std::collections::HashMap;
use std::io;
use std::mem;
use std::os::fd::{AsRawFd, FromRawFd, OwnedFd};
use tokio::io::unix::AsyncFd;
use tokio::sync::{mpsc, watch};
use tracing::{debug, info, warn};

// HCI protocol constants
const BTPROTO_HCI: c_int = 1;
const SOL_HCI: c_int = 0;
const HCI_FILTER: c_int = 2;
const HCI_CHANNEL_RAW: u16 = 0;

// HCI packet types
const HCI_COMMAND_PKT: u8 = 0x01;
const HCI_EVENT_PKT: u8 = 0x04;

// HCI events
const EVT_LE_META_EVENT: u8 = 0x3E;

// LE Meta event sub-events
const EVT_LE_ADVERTISING_REPORT: u8 = 0x02;

// HCI commands
const OGF_LE_CTL: u16 = 0x08;
const OCF_LE_SET_RANDOM_ADDRESS: u16 = 0x0005;
const OCF_LE_SET_SCAN_PARAMETERS: u16 = 0x000B;
const OCF_LE_SET_SCAN_ENABLE: u16 = 0x000C;

// Scan parameters
const LE_SCAN_ACTIVE: u8 = 0x01;
const LE_PUBLIC_ADDRESS: u8 = 0x00;
const LE_RANDOM_ADDRESS: u8 = 0x01;
const FILTER_POLICY_ACCEPT_ALL: u8 = 0x00;
/// 10ms in 0.625ms units
const SCAN_INTERVAL: u16 = 0x0010;
const SCAN_WINDOW: u16 = 0x0010;

// AD types
const AD_TYPE_SHORT_LOCAL_NAME: u8 = 0x08;
const AD_TYPE_COMPLETE_LOCAL_NAME: u8 = 0x09;
const AD_TYPE_SERVICE_DATA_UUID16: u8 = 0x16;

/// Max HCI event size
const HCI_MAX_EVENT_SIZE: usize = 258;

/// Upper bound on remembered device names.
const NAME_CACHE_LIMIT: usize = 1024;

/// HCI socket address structure
#[repr(C)]
struct SockaddrHci {
    hci_family: u16,
    hci_dev: u16,
    hci_channel: u16,
}

/// HCI filter structure for raw sockets
#[repr(C)]
struct HciFilter {
    type_mask: u32,
    event_mask: [u32; 2],
    opcode: u16,
}

impl HciFilter {
    /// A filter passing only LE meta events.
    fn le_meta_events() -> Self {
        let mut filter = Self {
            type_mask: 0,
            event_mask: [0, 0],
            opcode: 0,
        };
        filter.type_mask |= 1 << u32::from(HCI_EVENT_PKT);
        let bit = usize::from(EVT_LE_META_EVENT);
        filter.event_mask[bit / 32] |= 1 << (bit % 32);
        filter
    }
}

/// Create an HCI command packet
fn hci_command_packet(ogf: u16, ocf: u16, params: &[u8]) -> Vec<u8> {
    let opcode = ((ogf << 10) | ocf).to_le_bytes();
    let mut packet = Vec::with_capacity(4 + params.len());
    packet.push(HCI_COMMAND_PKT);
    packet.extend_from_slice(&opcode);
    packet.push(params.len() as u8);
    packet.extend_from_slice(params);
    packet
}

/// LE Set Scan Parameters command parameters
fn scan_parameters(own_address_type: u8) -> [u8; 7] {
    let [interval_lo, interval_hi] = SCAN_INTERVAL.to_le_bytes();
    let [window_lo, window_hi] = SCAN_WINDOW.to_le_bytes();
    [
        LE_SCAN_ACTIVE,
        interval_lo,
        interval_hi,
        window_lo,
        window_hi,
        own_address_type,
        FILTER_POLICY_ACCEPT_ALL,
    ]
}

fn os_error(what: &str) -> ScanError {
    ScanError::Bluetooth(format!("{what}: {}", io::Error::last_os_error()))
}

/// Open a raw HCI socket bound to `hci<dev_id>`
fn open_hci_socket(dev_id: u16) -> Result<OwnedFd, ScanError> {
    // SOCK_NONBLOCK is required for AsyncFd
    let fd = unsafe {
        libc::socket(
            AF_BLUETOOTH,
            SOCK_RAW | SOCK_CLOEXEC | SOCK_NONBLOCK,
            BTPROTO_HCI,
        )
    };
    if fd < 0 {
        return Err(os_error("Failed to create HCI socket"));
    }
    let fd = unsafe { OwnedFd::from_raw_fd(fd) };

    let addr = SockaddrHci {
        hci_family: AF_BLUETOOTH as u16,
        hci_dev: dev_id,
        hci_channel: HCI_CHANNEL_RAW,
    };
    let ret = unsafe {
        libc::bind(
            fd.as_raw_fd(),
            &addr as *const SockaddrHci as *const sockaddr,
            mem::size_of::<SockaddrHci>() as socklen_t,
        )
    };
    if ret < 0 {
        return Err(os_error(&format!("Failed to bind HCI socket to hci{dev_id}")));
    }

    Ok(fd)
}

/// Restrict the socket to LE meta events
fn set_hci_filter(fd: &OwnedFd) -> Result<(), ScanError> {
    let filter = HciFilter::le_meta_events();
    let ret = unsafe {
        libc::setsockopt(
            fd.as_raw_fd(),
            SOL_HCI,
            HCI_FILTER,
            &filter as *const HciFilter as *const c_void,
            mem::size_of::<HciFilter>() as socklen_t,
        )
    };
    if ret < 0 {
        return Err(os_error("Failed to set HCI filter"));
    }
    Ok(())
}

fn send_hci_command(fd: &OwnedFd, ocf: u16, params: &[u8]) -> Result<(), ScanError> {
    let packet = hci_command_packet(OGF_LE_CTL, ocf, params);
    let ret = unsafe {
        libc::write(
            fd.as_raw_fd(),
            packet.as_ptr() as *const c_void,
            packet.len(),
        )
    };
    if ret < 0 {
        return Err(os_error("Failed to send HCI command"));
    }
    Ok(())
}

fn set_scan_enable(fd: &OwnedFd, enable: bool) -> Result<(), ScanError> {
    // Second byte 0x00: report duplicates, every advertisement counts.
    send_hci_command(fd, OCF_LE_SET_SCAN_ENABLE, &[u8::from(enable), 0x00])
}

/// Configure and enable LE scanning, optionally with a random own address.
///
/// Some adapters come without a usable public address; assigning a random
/// static address lets them scan anyway.
fn configure_le_scan(fd: &OwnedFd, random_address: Option<MacAddress>) -> Result<(), ScanError> {
    set_scan_enable(fd, false)?;

    let own_address_type = match random_address {
        Some(address) => {
            send_hci_command(fd, OCF_LE_SET_RANDOM_ADDRESS, &address.to_le_bytes())?;
            LE_RANDOM_ADDRESS
        }
        None => LE_PUBLIC_ADDRESS,
    };

    send_hci_command(
        fd,
        OCF_LE_SET_SCAN_PARAMETERS,
        &scan_parameters(own_address_type),
    )?;
    set_scan_enable(fd, true)
}

/// AD structures of interest from one advertising report.
#[derive(Debug, Default, PartialEq)]
struct AdFields {
    local_name: Option<String>,
    service_data: Vec<ServiceDataEntry>,
}

/// Walk the AD structures; malformed trailing data ends the walk.
fn parse_ad_structures(ad_data: &[u8]) -> AdFields {
    let mut fields = AdFields::default();
    let mut offset = 0;

    while offset + 2 <= ad_data.len() {
        let len = usize::from(ad_data[offset]);
        if len == 0 || offset + 1 + len > ad_data.len() {
            break;
        }
        let ad_type = ad_data[offset + 1];
        let value = &ad_data[offset + 2..offset + 1 + len];

        match ad_type {
            AD_TYPE_COMPLETE_LOCAL_NAME => {
                fields.local_name = Some(String::from_utf8_lossy(value).into_owned());
            }
            AD_TYPE_SHORT_LOCAL_NAME if fields.local_name.is_none() => {
                fields.local_name = Some(String::from_utf8_lossy(value).into_owned());
            }
            AD_TYPE_SERVICE_DATA_UUID16 if value.len() >= 2 => {
                let uuid = u16::from_le_bytes([value[0], value[1]]);
                fields
                    .service_data
                    .push(ServiceDataEntry::new(uuid, &value[2..]));
            }
            _ => {}
        }

        offset += 1 + len;
    }

    fields
}

/// Extract the address and AD data of every report in an LE advertising
/// report event (`packet` includes the HCI packet type byte).
///
/// Reports are laid out back to back. A truncated report ends the walk and
/// keeps the ones before it.
fn parse_advertising_reports(packet: &[u8]) -> Vec<(MacAddress, &[u8])> {
    // packet type, event code, parameter length, subevent, num_reports
    let Some((&num_reports, mut rest)) = packet.get(4..).and_then(<[u8]>::split_first) else {
        return Vec::new();
    };

    let mut reports = Vec::with_capacity(usize::from(num_reports));
    for _ in 0..num_reports {
        // event_type(1) addr_type(1) addr(6) data_len(1) data rssi(1)
        if rest.len() < 9 {
            break;
        }
        let mut addr = [0u8; 6];
        addr.copy_from_slice(&rest[2..8]);
        let data_len = usize::from(rest[8]);
        let Some(ad_data) = rest.get(9..9 + data_len) else {
            break;
        };
        reports.push((MacAddress::from_le_bytes(addr), ad_data));
        rest = rest.get(9 + data_len + 1..).unwrap_or_default();
    }
    reports
}

/// Turns advertising report events into records, remembering names from
/// scan responses.
#[derive(Debug, Default)]
struct ReportDecoder {
    names: HashMap<MacAddress, String>,
}

impl ReportDecoder {
    fn process(&mut self, packet: &[u8]) -> Vec<AdvertisementRecord> {
        if packet.len() < 4
            || packet[0] != HCI_EVENT_PKT
            || packet[1] != EVT_LE_META_EVENT
            || packet[3] != EVT_LE_ADVERTISING_REPORT
        {
            return Vec::new();
        }

        parse_advertising_reports(packet)
            .into_iter()
            .filter_map(|(address, ad_data)| self.process_report(address, ad_data))
            .collect()
    }

    fn process_report(
        &mut self,
        address: MacAddress,
        ad_data: &[u8],
    ) -> Option<AdvertisementRecord> {
        let AdFields {
            local_name,
            service_data,
        } = parse_ad_structures(ad_data);

        let local_name = match local_name {
            Some(name) => {
                if self.names.len() >= NAME_CACHE_LIMIT && !self.names.contains_key(&address) {
                    self.names.clear();
                }
                self.names.insert(address, name.clone());
                Some(name)
            }
            None => self.names.get(&address).cloned(),
        };

        if service_data.is_empty() {
            return None;
        }
        Some(AdvertisementRecord::new(local_name, address, service_data))
    }
}

/// Start scanning for sensors using raw HCI sockets.
///
/// Opens one socket for events and one for commands on the configured
/// adapter, enables active scanning, and spawns the reader task. On shutdown
/// the task disables scanning before closing the sockets.
///
/// # Requirements
/// - CAP_NET_RAW and CAP_NET_ADMIN capabilities or root privileges
/// - An available HCI device
pub async fn start_scan(
    config: &ScanConfig,
    mut shutdown: watch::Receiver<bool>,
) -> Result<mpsc::Receiver<AdvertisementRecord>, ScanError> {
    let dev_id = adapter_index(&config.adapter)?;

    let fd = open_hci_socket(dev_id)?;
    set_hci_filter(&fd)?;

    let cmd_fd = open_hci_socket(dev_id)?;
    configure_le_scan(&cmd_fd, config.random_address)?;

    let async_fd = AsyncFd::new(fd)
        .map_err(|e| ScanError::Bluetooth(format!("Failed to create async fd: {e}")))?;

    info!(adapter = %format!("hci{dev_id}"), random_address = ?config.random_address, "HCI scan enabled");

    let (tx, rx) = mpsc::channel(RECORD_CHANNEL_BUFFER_SIZE);

    tokio::spawn(async move {
        let mut decoder = ReportDecoder::default();
        let mut buf = [0u8; HCI_MAX_EVENT_SIZE];

        'scan: loop {
            let mut guard = tokio::select! {
                _ = shutdown_requested(&mut shutdown) => break,
                ready = async_fd.readable() => match ready {
                    Ok(guard) => guard,
                    Err(e) => {
                        warn!(error = %e, "HCI socket failed");
                        break;
                    }
                },
            };

            // Drain all available packets before waiting again
            loop {
                let n = match guard.try_io(|inner| {
                    let ret = unsafe {
                        libc::read(
                            inner.as_raw_fd(),
                            buf.as_mut_ptr() as *mut c_void,
                            buf.len(),
                        )
                    };
                    if ret < 0 {
                        Err(io::Error::last_os_error())
                    } else {
                        Ok(ret as usize)
                    }
                }) {
                    Ok(Ok(n)) if n > 0 => n,
                    Ok(Ok(_)) => break,
                    Ok(Err(e)) => {
                        debug!(error = %e, "HCI read failed");
                        break;
                    }
                    Err(_would_block) => break,
                };

                for record in decoder.process(&buf[..n]) {
                    if tx.send(record).await.is_err() {
                        break 'scan;
                    }
                }
            }
        }

        if let Err(e) = set_scan_enable(&cmd_fd, false) {
            warn!(error = %e, "failed to disable HCI scan");
        }
        info!("HCI scan stopped");
    });

    Ok(rx)
}
