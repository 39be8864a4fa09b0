//! CIDR block parsing and membership.

use std::fmt;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::ClassifierError;

/// An IPv4 or IPv6 network in CIDR notation, e.g. `66.249.84.0/24`.
///
/// The stored network address is masked on construction, so
/// `10.1.2.3/8` and `10.0.0.0/8` compare equal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct CidrBlock {
    network: IpAddr,
    prefix_len: u8,
}

impl CidrBlock {
    pub fn new(addr: IpAddr, prefix_len: u8) -> Result<Self, ClassifierError> {
        let max = match addr {
            IpAddr::V4(_) => 32,
            IpAddr::V6(_) => 128,
        };
        if prefix_len > max {
            return Err(ClassifierError::InvalidCidr {
                cidr: format!("{addr}/{prefix_len}"),
                reason: format!("prefix length exceeds {max}"),
            });
        }
        let network = match addr {
            IpAddr::V4(v4) => IpAddr::V4(Ipv4Addr::from(u32::from(v4) & v4_mask(prefix_len))),
            IpAddr::V6(v6) => IpAddr::V6(Ipv6Addr::from(u128::from(v6) & v6_mask(prefix_len))),
        };
        Ok(Self {
            network,
            prefix_len,
        })
    }

    pub fn network(&self) -> IpAddr {
        self.network
    }

    pub fn prefix_len(&self) -> u8 {
        self.prefix_len
    }

    /// Whether `ip` falls inside this block.
    ///
    /// IPv4-mapped IPv6 addresses (`::ffff:a.b.c.d`) are matched against
    /// IPv4 blocks, since dual-stack listeners report IPv4 clients that way.
    pub fn contains(&self, ip: IpAddr) -> bool {
        match (self.network, ip) {
            (IpAddr::V4(net), IpAddr::V4(addr)) => {
                u32::from(addr) & v4_mask(self.prefix_len) == u32::from(net)
            }
            (IpAddr::V4(net), IpAddr::V6(addr)) => match addr.to_ipv4_mapped() {
                Some(v4) => u32::from(v4) & v4_mask(self.prefix_len) == u32::from(net),
                None => false,
            },
            (IpAddr::V6(net), IpAddr::V6(addr)) => {
                u128::from(addr) & v6_mask(self.prefix_len) == u128::from(net)
            }
            (IpAddr::V6(_), IpAddr::V4(_)) => false,
        }
    }
}

fn v4_mask(prefix_len: u8) -> u32 {
    if prefix_len == 0 {
        0
    } else {
        u32::MAX << (32 - u32::from(prefix_len))
    }
}

fn v6_mask(prefix_len: u8) -> u128 {
    if prefix_len == 0 {
        0
    } else {
        u128::MAX << (128 - u32::from(prefix_len))
    }
}

impl FromStr for CidrBlock {
    type Err = ClassifierError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = |reason: &str| ClassifierError::InvalidCidr {
            cidr: s.to_string(),
            reason: reason.to_string(),
        };
        let (addr, prefix) = s
            .trim()
            .split_once('/')
            .ok_or_else(|| invalid("missing '/<prefix>'"))?;
        let addr: IpAddr = addr.parse().map_err(|_| invalid("invalid address"))?;
        let prefix_len: u8 = prefix.parse().map_err(|_| invalid("invalid prefix length"))?;
        CidrBlock::new(addr, prefix_len)
    }
}

impl TryFrom<String> for CidrBlock {
    type Error = ClassifierError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<CidrBlock> for String {
    fn from(block: CidrBlock) -> Self {
        block.to_string()
    }
}

impl fmt::Display for CidrBlock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.network, self.prefix_len)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ip(s: &str) -> IpAddr {
        s.parse().unwrap()
    }

    #[test]
    fn parses_and_masks_host_bits() {
        let block: CidrBlock = "10.1.2.3/8".parse().unwrap();
        assert_eq!(block.to_string(), "10.0.0.0/8");
        assert_eq!(block, "10.0.0.0/8".parse().unwrap());
    }

    #[test]
    fn v4_membership() {
        let block: CidrBlock = "66.249.84.0/24".parse().unwrap();
        assert!(block.contains(ip("66.249.84.10")));
        assert!(block.contains(ip("66.249.84.255")));
        assert!(!block.contains(ip("66.249.85.1")));
    }

    #[test]
    fn zero_prefix_matches_everything_in_family() {
        let block: CidrBlock = "0.0.0.0/0".parse().unwrap();
        assert!(block.contains(ip("203.0.113.9")));
        assert!(!block.contains(ip("2001:db8::1")));
    }

    #[test]
    fn v6_membership() {
        let block: CidrBlock = "2001:db8::/32".parse().unwrap();
        assert!(block.contains(ip("2001:db8:1::1")));
        assert!(!block.contains(ip("2001:db9::1")));
        assert!(!block.contains(ip("10.0.0.1")));
    }

    #[test]
    fn v4_mapped_v6_matches_v4_block() {
        let block: CidrBlock = "54.0.0.0/8".parse().unwrap();
        assert!(block.contains(ip("::ffff:54.1.2.3")));
        assert!(!block.contains(ip("::ffff:55.1.2.3")));
    }

    #[test]
    fn rejects_malformed_blocks() {
        for bad in ["", "10.0.0.0", "10.0.0.0/33", "nope/8", "10.0.0.0/x", "::/129"] {
            assert!(bad.parse::<CidrBlock>().is_err(), "accepted {bad:?}");
        }
    }

    #[test]
    fn serde_uses_cidr_notation() {
        let block: CidrBlock = serde_json::from_str("\"35.0.0.0/8\"").unwrap();
        assert_eq!(serde_json::to_string(&block).unwrap(), "\"35.0.0.0/8\"");
        assert!(serde_json::from_str::<CidrBlock>("\"35.0.0.0\"").is_err());
    }
}
