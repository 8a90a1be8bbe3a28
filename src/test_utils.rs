use crate::advertisement::{AdvertisementRecord, ServiceDataEntry};
use crate::decoder::SENSOR_SERVICE_UUID;
use crate::mac_address::MacAddress;
use std::time::{Duration, SystemTime};

/// A stable address for unit tests.
pub const TEST_MAC: MacAddress = MacAddress([0x4C, 0x65, 0xA8, 0xDD, 0xEE, 0xFF]);

/// A fixed observation time (2001-09-09T01:46:40Z).
pub fn test_time() -> SystemTime {
    SystemTime::UNIX_EPOCH + Duration::from_secs(1_000_000_000)
}

/// Build an 18-byte sensor frame ending in `tail`.
///
/// The 14 leading bytes mimic the frame control / product id / counter /
/// address header the sensor sends; the decoder never looks at them.
pub fn sensor_payload(tail: [u8; 4]) -> Vec<u8> {
    let mut payload = vec![
        0x50, 0x20, 0xAA, 0x01, 0x17, 0xFF, 0xEE, 0xDD, 0xA8, 0x65, 0x4C, 0x0D, 0x10, 0x04,
    ];
    payload.extend_from_slice(&tail);
    payload
}

/// A complete sensor service-data entry with the given tail.
pub fn sensor_entry(tail: [u8; 4]) -> ServiceDataEntry {
    ServiceDataEntry::new(SENSOR_SERVICE_UUID, sensor_payload(tail))
}

/// Build a record with a fixed timestamp.
pub fn record(name: Option<&str>, service_data: Vec<ServiceDataEntry>) -> AdvertisementRecord {
    AdvertisementRecord {
        local_name: name.map(str::to_string),
        address: TEST_MAC,
        service_data,
        received_at: test_time(),
    }
}
