//! Human-readable names for individual sensors.
//!
//! Every thermometer of this model advertises the same local name, so an
//! alias is the only way to tell rooms apart in the output.

use crate::mac_address::MacAddress;
use crate::reading::Reading;
use std::collections::HashMap;

/// Address-to-name lookup built from the `--alias` options.
pub type AliasMap = HashMap<MacAddress, String>;

/// A parsed `MAC=NAME` alias.
#[derive(Debug, Clone, PartialEq)]
pub struct Alias {
    pub address: MacAddress,
    pub name: String,
}

/// Parse an alias in the format `AA:BB:CC:DD:EE:FF=Name`.
///
/// # Example
/// ```
/// use mitemp_listener::alias::parse_alias;
///
/// let alias = parse_alias("4C:65:A8:DD:EE:FF=Bedroom").unwrap();
/// assert_eq!(alias.address.to_string(), "4C:65:A8:DD:EE:FF");
/// assert_eq!(alias.name, "Bedroom");
/// ```
pub fn parse_alias(src: &str) -> Result<Alias, String> {
    let (address, name) = src
        .split_once('=')
        .ok_or_else(|| "invalid alias: expected format MAC=NAME".to_string())?;
    if name.is_empty() {
        return Err("invalid alias: name is empty".into());
    }
    let address = address
        .parse::<MacAddress>()
        .map_err(|e| format!("invalid alias: {e}"))?;

    Ok(Alias {
        address,
        name: name.into(),
    })
}

pub fn to_map(aliases: &[Alias]) -> AliasMap {
    aliases
        .iter()
        .map(|a| (a.address, a.name.clone()))
        .collect()
}

/// Name to print for a reading: its alias, or the advertised name.
pub fn resolve_name<'a>(reading: &'a Reading, aliases: &'a AliasMap) -> &'a str {
    aliases
        .get(&reading.address)
        .map_or(reading.name.as_str(), String::as_str)
}
