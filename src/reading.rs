//! Decoded sensor reading.

use crate::mac_address::MacAddress;

/// A temperature/humidity reading from one sensor advertisement.
///
/// - Temperature in degrees Celsius, one decimal digit of precision
/// - Relative humidity in percent, one decimal digit of precision
#[derive(Debug, Clone, PartialEq)]
pub struct Reading {
    /// Local name the sensor advertised (e.g. `MJ_HT_V1`)
    pub name: String,
    pub address: MacAddress,
    /// When the advertisement carrying this reading was observed
    pub timestamp: std::time::SystemTime,
    pub temperature: f64,
    pub humidity: f64,
}
