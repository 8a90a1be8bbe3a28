//! Advertisement records as delivered by the scanner backends.

use crate::mac_address::MacAddress;
use std::time::SystemTime;

/// One service-data element: a 16-bit service UUID and its opaque payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceDataEntry {
    pub uuid: u16,
    pub data: Vec<u8>,
}

impl ServiceDataEntry {
    pub fn new(uuid: u16, data: impl Into<Vec<u8>>) -> Self {
        Self {
            uuid,
            data: data.into(),
        }
    }
}

/// A single observed broadcast.
///
/// `service_data` keeps the order the backend delivered it in. `received_at`
/// is stamped by the backend when the frame was observed.
#[derive(Debug, Clone, PartialEq)]
pub struct AdvertisementRecord {
    pub local_name: Option<String>,
    pub address: MacAddress,
    pub service_data: Vec<ServiceDataEntry>,
    pub received_at: SystemTime,
}

impl AdvertisementRecord {
    /// Create a record stamped with the current time.
    pub fn new(
        local_name: Option<String>,
        address: MacAddress,
        service_data: Vec<ServiceDataEntry>,
    ) -> Self {
        Self {
            local_name,
            address,
            service_data,
            received_at: SystemTime::now(),
        }
    }
}
