//! Compute-region to DNS-region mapping used when creating latency records.
//!
//! Configured as comma-separated `slug=dns-region` pairs, e.g.
//! `lon1=eu-west-1,sfo1=us-west-1`.

use std::collections::BTreeMap;

use serde::Serialize;

use crate::FleetError;

pub const DEFAULT_DNS_REGION_MAP: &str = "lon1=eu-west-1,sfo1=us-west-1,sgp1=ap-southeast-1";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RegionMap {
    entries: BTreeMap<String, String>,
}

impl RegionMap {
    pub fn from_pairs<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            entries: pairs
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }

    pub fn dns_region(&self, region_slug: &str) -> Option<&str> {
        self.entries.get(region_slug).map(|s| s.as_str())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Default for RegionMap {
    fn default() -> Self {
        // The default table is a compile-time constant and always parses.
        parse_region_map(None).unwrap_or_else(|_| Self::from_pairs(Vec::<(String, String)>::new()))
    }
}

/// Parse comma-separated `slug=region` pairs.
///
/// - Trims whitespace around entries, keys and values
/// - Drops empty entries
/// - If input is empty/None, returns the default table
/// - A later duplicate key overrides an earlier one
pub fn parse_region_map(raw: Option<&str>) -> Result<RegionMap, FleetError> {
    let raw = match raw.map(|s| s.trim()).filter(|s| !s.is_empty()) {
        Some(r) => r,
        None => DEFAULT_DNS_REGION_MAP,
    };

    let mut entries = BTreeMap::new();
    for entry in raw.split(',').map(|s| s.trim()).filter(|s| !s.is_empty()) {
        let Some((slug, region)) = entry.split_once('=') else {
            return Err(FleetError::InvalidRegionMapEntry(entry.to_string()));
        };
        let (slug, region) = (slug.trim(), region.trim());
        if slug.is_empty() || region.is_empty() {
            return Err(FleetError::InvalidRegionMapEntry(entry.to_string()));
        }
        entries.insert(slug.to_string(), region.to_string());
    }

    Ok(RegionMap { entries })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_table() {
        let map = parse_region_map(None).unwrap();
        assert_eq!(map.len(), 3);
        assert_eq!(map.dns_region("lon1"), Some("eu-west-1"));
        assert_eq!(map.dns_region("sfo1"), Some("us-west-1"));
        assert_eq!(map.dns_region("sgp1"), Some("ap-southeast-1"));
        assert_eq!(map.dns_region("nyc3"), None);
        assert_eq!(RegionMap::default(), map);
    }

    #[test]
    fn blank_input_falls_back_to_default() {
        assert_eq!(parse_region_map(Some("  ")).unwrap(), RegionMap::default());
    }

    #[test]
    fn custom_table_with_whitespace() {
        let map = parse_region_map(Some(" nyc3 = us-east-1 ,, ams3=eu-central-1 ")).unwrap();
        assert_eq!(map.len(), 2);
        assert_eq!(map.dns_region("nyc3"), Some("us-east-1"));
        assert_eq!(map.dns_region("ams3"), Some("eu-central-1"));
    }

    #[test]
    fn malformed_entries_are_rejected() {
        assert_eq!(
            parse_region_map(Some("lon1")),
            Err(FleetError::InvalidRegionMapEntry("lon1".to_string()))
        );
        assert!(parse_region_map(Some("lon1=")).is_err());
        assert!(parse_region_map(Some("=eu-west-1")).is_err());
    }
}
