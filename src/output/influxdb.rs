//! InfluxDB line protocol output formatter.

use crate::output::OutputFormatter;
use crate::reading::Reading;
use std::collections::BTreeMap;
use std::fmt;
use std::time::SystemTime;

/// Default measurement name in the line protocol.
pub const DEFAULT_MEASUREMENT: &str = "mitemp_measurement";

/// Data point in InfluxDB line protocol.
#[derive(Debug)]
pub struct DataPoint {
    pub measurement: String,
    pub tag_set: BTreeMap<&'static str, String>,
    pub field_set: BTreeMap<&'static str, f64>,
    pub timestamp: Option<SystemTime>,
}

/// Escape a measurement name, tag key, or tag value.
fn escape(value: &str, out: &mut fmt::Formatter) -> fmt::Result {
    for c in value.chars() {
        if matches!(c, ',' | '=' | ' ') {
            write!(out, "\\")?;
        }
        write!(out, "{c}")?;
    }
    Ok(())
}

impl fmt::Display for DataPoint {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        escape(&self.measurement, f)?;
        for (key, value) in &self.tag_set {
            write!(f, ",{key}=")?;
            escape(value, f)?;
        }

        let mut separator = " ";
        for (key, value) in &self.field_set {
            write!(f, "{separator}{key}={value}")?;
            separator = ",";
        }

        // Pre-epoch clocks are dropped rather than emitted as negative time.
        if let Some(nanos) = self
            .timestamp
            .and_then(|t| t.duration_since(SystemTime::UNIX_EPOCH).ok())
            .map(|d| d.as_nanos())
        {
            write!(f, " {nanos}")?;
        }
        Ok(())
    }
}

/// Formats readings as InfluxDB line protocol for Telegraf.
///
/// Tags: `mac`, `name`. Fields: `temperature` (°C) and `humidity` as a
/// fraction between 0 and 1.
pub struct InfluxDbFormatter {
    measurement_name: String,
}

impl InfluxDbFormatter {
    pub fn new(measurement_name: String) -> Self {
        Self { measurement_name }
    }

    fn to_data_point(&self, reading: &Reading, name: &str) -> DataPoint {
        let tag_set = BTreeMap::from([("mac", reading.address.to_string()), ("name", name.into())]);
        let field_set = BTreeMap::from([
            ("temperature", reading.temperature),
            ("humidity", reading.humidity / 100.0),
        ]);

        DataPoint {
            measurement: self.measurement_name.clone(),
            tag_set,
            field_set,
            timestamp: Some(reading.timestamp),
        }
    }
}

impl OutputFormatter for InfluxDbFormatter {
    fn format(&self, reading: &Reading, name: &str) -> String {
        self.to_data_point(reading, name).to_string()
    }
}
