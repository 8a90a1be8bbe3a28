//! Plain-text log line formatter.

use crate::output::OutputFormatter;
use crate::reading::Reading;

/// Formats readings as `MJ_HT_V1 - 4C:65:A8:DD:EE:FF [ 21.5 °C - 40.2 %]`.
#[derive(Debug, Default, Clone, Copy)]
pub struct TextFormatter;

impl OutputFormatter for TextFormatter {
    fn format(&self, reading: &Reading, name: &str) -> String {
        format!(
            "{} - {} [ {:.1} °C - {:.1} %]",
            name, reading.address, reading.temperature, reading.humidity
        )
    }
}
