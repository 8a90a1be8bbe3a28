//! Per-sensor rate limiting.
//!
//! The thermometer advertises every couple of seconds while the values change
//! slowly; throttling keeps at most one reading per sensor per interval.

use crate::mac_address::MacAddress;
use std::collections::HashMap;
use std::time::{Duration, Instant};

/// Allows at most one event per device per `interval`.
///
/// The first event for a device always passes. A blocked event does not
/// restart the interval.
#[derive(Debug)]
pub struct Throttle {
    interval: Duration,
    last_emitted: HashMap<MacAddress, Instant>,
}

impl Throttle {
    pub fn new(interval: Duration) -> Self {
        Throttle {
            interval,
            last_emitted: HashMap::new(),
        }
    }

    /// Check (and record) an event from `mac` happening now.
    pub fn should_emit(&mut self, mac: MacAddress) -> bool {
        self.should_emit_at(mac, Instant::now())
    }

    /// Check (and record) an event from `mac` happening at `now`.
    pub fn should_emit_at(&mut self, mac: MacAddress, now: Instant) -> bool {
        match self.last_emitted.get(&mac) {
            Some(last) if now.saturating_duration_since(*last) < self.interval => false,
            _ => {
                self.last_emitted.insert(mac, now);
                true
            }
        }
    }
}

/// Parse a duration such as `3s`, `1m`, `500ms`, `2h`, or bare seconds (`30`).
///
/// # Examples
/// ```
/// use mitemp_listener::throttle::parse_duration;
/// use std::time::Duration;
///
/// assert_eq!(parse_duration("1m").unwrap(), Duration::from_secs(60));
/// assert_eq!(parse_duration("500ms").unwrap(), Duration::from_millis(500));
/// ```
pub fn parse_duration(src: &str) -> Result<Duration, String> {
    let src = src.trim();
    if src.is_empty() {
        return Err("empty duration string".to_string());
    }

    // "ms" must be tried before "m" and "s".
    const UNITS: [(&str, u64); 4] = [("ms", 1), ("h", 3_600_000), ("m", 60_000), ("s", 1000)];

    let (number, millis_per_unit) = UNITS
        .iter()
        .find_map(|(suffix, factor)| src.strip_suffix(*suffix).map(|n| (n, *factor)))
        .unwrap_or((src, 1000));

    let value: u64 = number
        .trim()
        .parse()
        .map_err(|_| format!("invalid duration: {src}"))?;
    let millis = value
        .checked_mul(millis_per_unit)
        .ok_or_else(|| format!("duration out of range: {src}"))?;

    Ok(Duration::from_millis(millis))
}
