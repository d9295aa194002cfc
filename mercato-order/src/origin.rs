//! Source address checks for inbound payment provider notifications.

use mercato_core::{CoreError, CoreResult};
use std::fmt;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};
use std::str::FromStr;

pub const FORBIDDEN_ORIGIN_MESSAGE: &str = "Your IP address is not allowed!";

/// Networks the provider sends notifications from.
pub const PROVIDER_NETWORKS: [IpNetwork; 7] = [
    IpNetwork::v4(Ipv4Addr::new(185, 71, 76, 0), 27),
    IpNetwork::v4(Ipv4Addr::new(185, 71, 77, 0), 27),
    IpNetwork::v4(Ipv4Addr::new(77, 75, 153, 0), 25),
    IpNetwork::v4(Ipv4Addr::new(77, 75, 156, 11), 32),
    IpNetwork::v4(Ipv4Addr::new(77, 75, 156, 35), 32),
    IpNetwork::v4(Ipv4Addr::new(77, 75, 154, 128), 25),
    IpNetwork::v6(Ipv6Addr::new(0x2a02, 0x5180, 0, 0, 0, 0, 0, 0), 32),
];

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum OriginError {
    #[error("invalid network {0:?}")]
    InvalidNetwork(String),
    #[error("invalid client address {0:?}")]
    InvalidAddress(String),
}

/// A CIDR block. Host bits of `addr` are always zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IpNetwork {
    addr: IpAddr,
    prefix: u8,
}

impl IpNetwork {
    pub const fn v4(addr: Ipv4Addr, prefix: u8) -> Self {
        Self {
            addr: IpAddr::V4(addr),
            prefix,
        }
    }

    pub const fn v6(addr: Ipv6Addr, prefix: u8) -> Self {
        Self {
            addr: IpAddr::V6(addr),
            prefix,
        }
    }

    pub fn contains(&self, ip: IpAddr) -> bool {
        match (self.addr, normalize(ip)) {
            (IpAddr::V4(net), IpAddr::V4(ip)) => {
                let mask = v4_mask(self.prefix);
                u32::from(ip) & mask == u32::from(net) & mask
            }
            (IpAddr::V6(net), IpAddr::V6(ip)) => {
                let mask = v6_mask(self.prefix);
                u128::from(ip) & mask == u128::from(net) & mask
            }
            _ => false,
        }
    }
}

impl FromStr for IpNetwork {
    type Err = OriginError;

    /// `a.b.c.d/n`, `x::y/n`, or a bare address meaning a single host.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || OriginError::InvalidNetwork(s.to_string());
        let s = s.trim();
        let (addr, prefix) = match s.split_once('/') {
            Some((addr, prefix)) => {
                let addr: IpAddr = addr.parse().map_err(|_| invalid())?;
                let prefix: u8 = prefix.parse().map_err(|_| invalid())?;
                (addr, prefix)
            }
            None => {
                let addr: IpAddr = s.parse().map_err(|_| invalid())?;
                let prefix = if addr.is_ipv4() { 32 } else { 128 };
                (addr, prefix)
            }
        };

        let host_bits_clear = match addr {
            IpAddr::V4(a) if prefix <= 32 => u32::from(a) & !v4_mask(prefix) == 0,
            IpAddr::V6(a) if prefix <= 128 => u128::from(a) & !v6_mask(prefix) == 0,
            _ => return Err(invalid()),
        };
        if !host_bits_clear {
            return Err(invalid());
        }
        Ok(Self { addr, prefix })
    }
}

impl fmt::Display for IpNetwork {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.addr, self.prefix)
    }
}

fn v4_mask(prefix: u8) -> u32 {
    match prefix {
        0 => 0,
        p => u32::MAX << (32 - u32::from(p.min(32))),
    }
}

fn v6_mask(prefix: u8) -> u128 {
    match prefix {
        0 => 0,
        p => u128::MAX << (128 - u32::from(p.min(128))),
    }
}

/// IPv4-mapped IPv6 addresses (`::ffff:a.b.c.d`) compare as IPv4.
fn normalize(ip: IpAddr) -> IpAddr {
    match ip {
        IpAddr::V6(v6) => v6.to_ipv4_mapped().map(IpAddr::V4).unwrap_or(ip),
        v4 => v4,
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IpAllowList {
    networks: Vec<IpNetwork>,
}

impl Default for IpAllowList {
    fn default() -> Self {
        Self {
            networks: PROVIDER_NETWORKS.to_vec(),
        }
    }
}

impl IpAllowList {
    pub fn new(networks: Vec<IpNetwork>) -> Self {
        Self { networks }
    }

    pub fn from_cidrs<I, S>(cidrs: I) -> Result<Self, OriginError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let networks = cidrs
            .into_iter()
            .map(|cidr| cidr.as_ref().parse())
            .collect::<Result<Vec<IpNetwork>, _>>()?;
        Ok(Self { networks })
    }

    pub fn networks(&self) -> &[IpNetwork] {
        &self.networks
    }

    pub fn is_allowed(&self, ip: IpAddr) -> bool {
        self.networks.iter().any(|network| network.contains(ip))
    }

    /// Validate the caller of a notification endpoint and return its address.
    pub fn check(&self, forwarded_for: Option<&str>, peer: IpAddr) -> CoreResult<IpAddr> {
        let ip = client_ip(forwarded_for, peer)
            .map_err(|_| CoreError::Forbidden(FORBIDDEN_ORIGIN_MESSAGE.to_string()))?;
        if self.is_allowed(ip) {
            Ok(ip)
        } else {
            Err(CoreError::Forbidden(FORBIDDEN_ORIGIN_MESSAGE.to_string()))
        }
    }
}

/// First `X-Forwarded-For` entry when the header is present and non-empty, else the peer.
pub fn client_ip(forwarded_for: Option<&str>, peer: IpAddr) -> Result<IpAddr, OriginError> {
    match forwarded_for.map(str::trim).filter(|value| !value.is_empty()) {
        Some(value) => {
            let first = value.split(',').next().unwrap_or_default().trim();
            first
                .parse()
                .map_err(|_| OriginError::InvalidAddress(first.to_string()))
        }
        None => Ok(peer),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ip(s: &str) -> IpAddr {
        s.parse().unwrap()
    }

    #[test]
    fn test_provider_ranges() {
        let list = IpAllowList::default();
        assert!(list.is_allowed(ip("185.71.76.5")));
        assert!(list.is_allowed(ip("185.71.77.31")));
        assert!(list.is_allowed(ip("77.75.156.11")));
        assert!(list.is_allowed(ip("77.75.154.200")));
        assert!(list.is_allowed(ip("2a02:5180:0:1509::12")));

        assert!(!list.is_allowed(ip("185.71.76.40")));
        assert!(!list.is_allowed(ip("77.75.156.12")));
        assert!(!list.is_allowed(ip("77.75.154.127")));
        assert!(!list.is_allowed(ip("2a02:5181::1")));
        assert!(!list.is_allowed(ip("127.0.0.1")));
    }

    #[test]
    fn test_mapped_ipv4_compares_as_ipv4() {
        let list = IpAllowList::default();
        assert!(list.is_allowed(ip("::ffff:185.71.76.5")));
        assert!(!list.is_allowed(ip("::ffff:185.71.76.40")));
    }

    #[test]
    fn test_forwarded_for_takes_precedence() {
        let peer = ip("10.0.0.2");
        assert_eq!(client_ip(Some("185.71.76.5, 10.0.0.1"), peer).unwrap(), ip("185.71.76.5"));
        assert_eq!(client_ip(Some("  "), peer).unwrap(), peer);
        assert_eq!(client_ip(None, peer).unwrap(), peer);
        assert!(client_ip(Some("not-an-ip"), peer).is_err());

        let list = IpAllowList::default();
        assert!(list.check(Some("185.71.76.5"), peer).is_ok());
        assert!(matches!(
            list.check(Some("185.71.76.40"), ip("185.71.76.5")),
            Err(CoreError::Forbidden(_))
        ));
        assert!(list.check(Some("garbage"), ip("185.71.76.5")).is_err());
    }

    #[test]
    fn test_parse_networks() {
        let list = IpAllowList::from_cidrs(["10.1.0.0/16", "192.168.1.7", "fd00::/8"]).unwrap();
        assert!(list.is_allowed(ip("10.1.200.3")));
        assert!(list.is_allowed(ip("192.168.1.7")));
        assert!(!list.is_allowed(ip("192.168.1.8")));
        assert!(list.is_allowed(ip("fd12::1")));

        assert!("10.1.0.1/16".parse::<IpNetwork>().is_err());
        assert!("10.1.0.0/33".parse::<IpNetwork>().is_err());
        assert!("nonsense".parse::<IpNetwork>().is_err());
        assert_eq!("0.0.0.0/0".parse::<IpNetwork>().unwrap().to_string(), "0.0.0.0/0");
    }
}
