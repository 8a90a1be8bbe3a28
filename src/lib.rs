//! `mitemp-listener` library.
//!
//! The binary (`src/main.rs`) is responsible for CLI parsing, signal handling
//! and process exit codes. Advertisement filtering and decoding live in
//! [`crate::filter`] and [`crate::decoder`]; [`crate::app`] ties them to a
//! scanner and an output stream so the whole loop can be tested without
//! Bluetooth hardware.

pub mod advertisement;
pub mod alias;
pub mod app;
pub mod decoder;
pub mod filter;
pub mod mac_address;
pub mod output;
pub mod reading;
pub mod scanner;
pub mod throttle;

#[cfg(test)]
mod test_utils;

// Re-export commonly used types at the crate root
pub use advertisement::{AdvertisementRecord, ServiceDataEntry};
pub use alias::{Alias, AliasMap, parse_alias, resolve_name, to_map};
pub use decoder::{DecodeError, SENSOR_SERVICE_UUID, decode, decode_all};
pub use filter::matches;
pub use mac_address::MacAddress;
pub use output::influxdb::InfluxDbFormatter;
pub use output::text::TextFormatter;
pub use output::{OutputFormat, OutputFormatter};
pub use reading::Reading;
pub use scanner::{Backend, ScanConfig, ScanError};
pub use throttle::{Throttle, parse_duration};
