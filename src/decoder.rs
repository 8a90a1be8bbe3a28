//! Decoder for the Xiaomi MJ_HT_V1 service-data frame.
//!
//! The sensor tags its environmental payload with the 16-bit service UUID
//! `0xFE95`. A complete frame is 18 bytes long and ends in two signed
//! little-endian 16-bit values:
//!
//! ```text
//! offset  14..16   temperature, decicelsius (i16 LE)
//! offset  16..18   relative humidity, decipercent (i16 LE)
//! ```
//!
//! Frames of any other length are treated as incomplete and skipped.
//! See: https://github.com/hannseman/homebridge-mi-hygrothermograph

use crate::advertisement::{AdvertisementRecord, ServiceDataEntry};
use crate::reading::Reading;
use thiserror::Error;

/// 16-bit service UUID carrying the sensor payload.
pub const SENSOR_SERVICE_UUID: u16 = 0xFE95;

/// Length of a complete sensor frame.
pub const FRAME_LEN: usize = 18;

/// Reasons a service-data entry did not produce a reading.
///
/// These are expected in a noisy broadcast environment and are never
/// escalated; they only surface as verbose diagnostics.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum DecodeError {
    #[error("service data UUID {0:#06x} is not a sensor frame")]
    UnexpectedUuid(u16),
    #[error("incomplete frame: expected {expected} bytes, got {actual}")]
    IncompleteFrame { expected: usize, actual: usize },
}

/// Decode one service-data entry into `(temperature °C, humidity %)`.
pub fn decode_entry(entry: &ServiceDataEntry) -> Result<(f64, f64), DecodeError> {
    if entry.uuid != SENSOR_SERVICE_UUID {
        return Err(DecodeError::UnexpectedUuid(entry.uuid));
    }
    if entry.data.len() != FRAME_LEN {
        return Err(DecodeError::IncompleteFrame {
            expected: FRAME_LEN,
            actual: entry.data.len(),
        });
    }

    let tail = &entry.data[FRAME_LEN - 4..];
    let temperature = i16::from_le_bytes([tail[0], tail[1]]);
    let humidity = i16::from_le_bytes([tail[2], tail[3]]);

    Ok((f64::from(temperature) / 10.0, f64::from(humidity) / 10.0))
}

/// Decode every complete sensor frame in the record, in delivery order.
///
/// A record may carry more than one `0xFE95` block; each complete one yields
/// its own reading.
pub fn decode_all(record: &AdvertisementRecord) -> Vec<Reading> {
    record
        .service_data
        .iter()
        .filter_map(|entry| decode_entry(entry).ok())
        .map(|(temperature, humidity)| Reading {
            name: record.local_name.clone().unwrap_or_default(),
            address: record.address,
            timestamp: record.received_at,
            temperature,
            humidity,
        })
        .collect()
}

/// Decode the first complete sensor frame in the record, if any.
pub fn decode(record: &AdvertisementRecord) -> Option<Reading> {
    decode_all(record).into_iter().next()
}

/// Why the record's sensor frames were skipped.
///
/// Entries with other UUIDs are not reported; only `0xFE95` frames that
/// failed the length check are.
pub fn skipped(record: &AdvertisementRecord) -> Vec<DecodeError> {
    record
        .service_data
        .iter()
        .filter(|entry| entry.uuid == SENSOR_SERVICE_UUID)
        .filter_map(|entry| decode_entry(entry).err())
        .collect()
}
