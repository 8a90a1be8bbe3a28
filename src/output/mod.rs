//! Output formatters for sensor readings.
//!
//! Readings are printed one per line on stdout. The `text` format is meant
//! for people; the `influxdb` format plugs into Telegraf's `execd` input.

pub mod influxdb;
pub mod text;

use crate::reading::Reading;

/// Converts a reading into a single output line (without the newline).
pub trait OutputFormatter: Send + Sync {
    /// `name` is the display name resolved for the sensor (alias or advertised name).
    fn format(&self, reading: &Reading, name: &str) -> String;
}

/// Output formats selectable from the command line.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    /// `NAME - ADDRESS [ T °C - H %]`
    #[default]
    Text,
    /// InfluxDB line protocol
    Influxdb,
}
