//! GeoIP enrichment.
//!
//! The tracker only needs coordinates for an address. [`StaticGeoTable`]
//! maps configured CIDR blocks to fixed coordinates; a database-backed
//! locator can implement [`GeoLocator`] the same way.

use std::net::IpAddr;

use lure_core::CidrBlock;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinates {
    pub latitude: f64,
    pub longitude: f64,
}

#[derive(Debug, thiserror::Error)]
pub enum GeoError {
    #[error("invalid IP address: {0:?}")]
    InvalidAddress(String),

    #[error("geo lookup failed: {0}")]
    Lookup(String),
}

/// Resolves an IP address to coordinates.
///
/// `Ok(None)` means the address is valid but has no known location.
pub trait GeoLocator: Send + Sync {
    fn lookup(&self, ip: &str) -> Result<Option<Coordinates>, GeoError>;
}

/// Locator that never finds anything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoGeoLocator;

impl GeoLocator for NoGeoLocator {
    fn lookup(&self, _ip: &str) -> Result<Option<Coordinates>, GeoError> {
        Ok(None)
    }
}

/// One row of a [`StaticGeoTable`], as written in configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeoEntry {
    pub cidr: CidrBlock,
    pub latitude: f64,
    pub longitude: f64,
}

/// CIDR block to coordinates. First matching entry wins.
#[derive(Debug, Clone, Default)]
pub struct StaticGeoTable {
    entries: Vec<GeoEntry>,
}

impl StaticGeoTable {
    pub fn new(entries: Vec<GeoEntry>) -> Self {
        Self { entries }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl GeoLocator for StaticGeoTable {
    fn lookup(&self, ip: &str) -> Result<Option<Coordinates>, GeoError> {
        let addr: IpAddr = ip
            .trim()
            .parse()
            .map_err(|_| GeoError::InvalidAddress(ip.to_string()))?;
        Ok(self
            .entries
            .iter()
            .find(|e| e.cidr.contains(addr))
            .map(|e| Coordinates {
                latitude: e.latitude,
                longitude: e.longitude,
            }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table() -> StaticGeoTable {
        StaticGeoTable::new(vec![
            GeoEntry {
                cidr: "203.0.113.0/25".parse().unwrap(),
                latitude: 51.5,
                longitude: -0.12,
            },
            GeoEntry {
                cidr: "203.0.113.0/24".parse().unwrap(),
                latitude: 40.7,
                longitude: -74.0,
            },
        ])
    }

    #[test]
    fn first_match_wins() {
        let hit = table().lookup("203.0.113.9").unwrap().unwrap();
        assert_eq!(hit.latitude, 51.5);
        let hit = table().lookup("203.0.113.200").unwrap().unwrap();
        assert_eq!(hit.latitude, 40.7);
    }

    #[test]
    fn unknown_address_is_not_found() {
        assert_eq!(table().lookup("198.51.100.1").unwrap(), None);
    }

    #[test]
    fn malformed_address_is_an_error() {
        assert!(matches!(
            table().lookup("not-an-ip"),
            Err(GeoError::InvalidAddress(_))
        ));
    }

    #[test]
    fn entries_deserialize_from_toml_shaped_json() {
        let entry: GeoEntry = serde_json::from_value(serde_json::json!({
            "cidr": "2001:db8::/32",
            "latitude": 1.5,
            "longitude": 2.5
        }))
        .unwrap();
        assert_eq!(entry.cidr.prefix_len(), 32);
    }

    #[test]
    fn no_locator_finds_nothing() {
        assert_eq!(NoGeoLocator.lookup("203.0.113.9").unwrap(), None);
    }
}
