//! Selects advertisements coming from the target sensor model.

use crate::advertisement::AdvertisementRecord;

/// Default local name of the Xiaomi Mijia Bluetooth thermometer.
pub const DEFAULT_TARGET_NAME: &str = "MJ_HT_V1";

/// Returns `true` if the record's local name equals `target_name`, ignoring case.
///
/// Only whole names match; there is no prefix or pattern matching. Records
/// without a local name never match. Case folding is per character, so
/// `ß` does not match `SS`.
pub fn matches(record: &AdvertisementRecord, target_name: &str) -> bool {
    record.local_name.as_deref().is_some_and(|name| {
        name.chars()
            .map(simple_uppercase)
            .eq(target_name.chars().map(simple_uppercase))
    })
}

/// Uppercase `c` when it maps to exactly one character, otherwise keep it.
fn simple_uppercase(c: char) -> char {
    let mut upper = c.to_uppercase();
    match (upper.next(), upper.next()) {
        (Some(u), None) => u,
        _ => c,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::record;

    #[test]
    fn test_matches_ignores_case() {
        assert!(matches(&record(Some("mj_ht_v1"), vec![]), "MJ_HT_V1"));
        assert!(matches(&record(Some("MJ_HT_V1"), vec![]), "mj_ht_v1"));
    }

    #[test]
    fn test_other_names_do_not_match() {
        assert!(!matches(&record(Some("Other"), vec![]), DEFAULT_TARGET_NAME));
    }

    #[test]
    fn test_prefix_and_substring_do_not_match() {
        assert!(!matches(&record(Some("MJ_HT"), vec![]), DEFAULT_TARGET_NAME));
        assert!(!matches(&record(Some("MJ_HT_V1 "), vec![]), DEFAULT_TARGET_NAME));
        assert!(!matches(&record(Some("xMJ_HT_V1"), vec![]), DEFAULT_TARGET_NAME));
    }

    #[test]
    fn test_case_folding_is_per_character() {
        assert!(matches(&record(Some("straße"), vec![]), "STRAßE"));
        assert!(!matches(&record(Some("STRAßE"), vec![]), "STRASSE"));
        assert!(!matches(&record(Some("STRASSE"), vec![]), "straße"));
    }

    #[test]
    fn test_missing_name_never_matches() {
        assert!(!matches(&record(None, vec![]), DEFAULT_TARGET_NAME));
        assert!(!matches(&record(None, vec![]), ""));
    }
}
