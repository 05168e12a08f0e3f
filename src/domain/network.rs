// Copyright (c) 2025 - Cowboy AI, Inc.
//! Network Value Objects with Validation Invariants
//!
//! Addresses are handled as 32-bit unsigned integers packed big-endian from
//! their dotted octets, `(a << 24) + (b << 16) + (c << 8) + d`. All subnet
//! arithmetic in [`crate::allocator`] runs on that integer form.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::Ipv4Addr;
use std::str::FromStr;
use thiserror::Error;

/// Network validation error
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum NetworkError {
    #[error("Invalid IPv4 address format: {0}")]
    InvalidIpAddress(String),

    #[error("Invalid CIDR notation: {0}")]
    InvalidCidr(String),

    #[error("Invalid prefix length: {0} (must be 0-32)")]
    InvalidPrefixLength(u8),

    #[error("Invalid MAC address format: {0}")]
    InvalidMacAddress(String),

    #[error("Unknown protocol: {0}")]
    InvalidProtocol(String),
}

/// Pack a dotted IPv4 address into its big-endian integer form
pub fn ip_to_int(ip: &str) -> Result<u32, NetworkError> {
    let octets: Vec<&str> = ip.trim().split('.').collect();
    if octets.len() != 4 {
        return Err(NetworkError::InvalidIpAddress(ip.to_string()));
    }

    let mut packed: u32 = 0;
    for octet in octets {
        let value = octet
            .parse::<u8>()
            .map_err(|_| NetworkError::InvalidIpAddress(ip.to_string()))?;
        packed = (packed << 8) + u32::from(value);
    }
    Ok(packed)
}

/// Unpack an integer address into canonical dotted form
pub fn int_to_ip(value: u32) -> String {
    format!(
        "{}.{}.{}.{}",
        (value >> 24) & 0xff,
        (value >> 16) & 0xff,
        (value >> 8) & 0xff,
        value & 0xff
    )
}

/// IPv4 CIDR block value object
///
/// Invariants:
/// - prefix length is 0-32
/// - the stored base is the network address (host bits cleared)
///
/// # Examples
///
/// ```rust
/// use cim_fabric::domain::Ipv4Cidr;
///
/// let cidr: Ipv4Cidr = "10.10.0.7/24".parse().unwrap();
/// assert_eq!(cidr.to_string(), "10.10.0.0/24");
/// assert_eq!(cidr.size(), 256);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Ipv4Cidr {
    base: u32,
    prefix_length: u8,
}

impl Ipv4Cidr {
    /// `10.10.0.0/24`, the block the first zone is allocated after
    pub const DEFAULT_SEED: Ipv4Cidr = Ipv4Cidr {
        base: 0x0a0a_0000,
        prefix_length: 24,
    };

    /// Build a block from an integer base and prefix, clearing host bits
    pub fn from_parts(base: u32, prefix_length: u8) -> Result<Self, NetworkError> {
        if prefix_length > 32 {
            return Err(NetworkError::InvalidPrefixLength(prefix_length));
        }
        let mask = Self::mask_for(prefix_length);
        Ok(Self {
            base: base & mask,
            prefix_length,
        })
    }

    fn mask_for(prefix_length: u8) -> u32 {
        if prefix_length == 0 {
            0
        } else {
            u32::MAX << (32 - u32::from(prefix_length))
        }
    }

    /// Network address as integer
    pub fn base(&self) -> u32 {
        self.base
    }

    /// Prefix length (0-32)
    pub fn prefix_length(&self) -> u8 {
        self.prefix_length
    }

    /// Number of addresses in the block, network and broadcast included
    pub fn size(&self) -> u64 {
        1u64 << (32 - u32::from(self.prefix_length))
    }

    /// Broadcast (last) address as integer
    pub fn broadcast(&self) -> u32 {
        self.base | !Self::mask_for(self.prefix_length)
    }

    /// Gateway address, the first host of the block
    pub fn gateway(&self) -> u32 {
        self.base.saturating_add(1)
    }

    /// Network address in dotted form
    pub fn network_address(&self) -> Ipv4Addr {
        Ipv4Addr::from(self.base)
    }

    /// Whether an integer address falls inside the block
    pub fn contains(&self, address: u32) -> bool {
        address >= self.base && address <= self.broadcast()
    }

    /// Whether two blocks share any address
    pub fn overlaps(&self, other: &Ipv4Cidr) -> bool {
        self.base <= other.broadcast() && other.base <= self.broadcast()
    }
}

impl fmt::Display for Ipv4Cidr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", int_to_ip(self.base), self.prefix_length)
    }
}

impl FromStr for Ipv4Cidr {
    type Err = NetworkError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (addr, prefix) = s
            .trim()
            .split_once('/')
            .ok_or_else(|| NetworkError::InvalidCidr(s.to_string()))?;
        let base = ip_to_int(addr).map_err(|_| NetworkError::InvalidCidr(s.to_string()))?;
        let prefix_length = prefix
            .parse::<u8>()
            .map_err(|_| NetworkError::InvalidCidr(s.to_string()))?;
        Self::from_parts(base, prefix_length)
    }
}

impl TryFrom<String> for Ipv4Cidr {
    type Error = NetworkError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Ipv4Cidr> for String {
    fn from(cidr: Ipv4Cidr) -> Self {
        cidr.to_string()
    }
}

/// MAC Address value object
///
/// Canonical representation is lowercase and colon-separated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct MacAddress([u8; 6]);

impl MacAddress {
    /// Parse a MAC address in `aa:bb:..`, `aa-bb-..` or bare hex form
    pub fn new(mac: impl AsRef<str>) -> Result<Self, NetworkError> {
        let mac = mac.as_ref();
        let hex: String = mac.chars().filter(|c| *c != ':' && *c != '-').collect();

        if hex.len() != 12 || !hex.is_ascii() {
            return Err(NetworkError::InvalidMacAddress(mac.to_string()));
        }

        let mut octets = [0u8; 6];
        for (i, octet) in octets.iter_mut().enumerate() {
            *octet = u8::from_str_radix(&hex[i * 2..i * 2 + 2], 16)
                .map_err(|_| NetworkError::InvalidMacAddress(mac.to_string()))?;
        }

        Ok(Self(octets))
    }

    /// Locally administered unicast address derived from a resource id
    ///
    /// Uses the `52:54:00` prefix hypervisors hand out to guests.
    pub fn for_guest(seed: &uuid::Uuid) -> Self {
        let bytes = seed.as_bytes();
        Self([0x52, 0x54, 0x00, bytes[13], bytes[14], bytes[15]])
    }

    pub fn octets(&self) -> [u8; 6] {
        self.0
    }
}

impl fmt::Display for MacAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let o = self.0;
        write!(
            f,
            "{:02x}:{:02x}:{:02x}:{:02x}:{:02x}:{:02x}",
            o[0], o[1], o[2], o[3], o[4], o[5]
        )
    }
}

impl FromStr for MacAddress {
    type Err = NetworkError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl TryFrom<String> for MacAddress {
    type Error = NetworkError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<MacAddress> for String {
    fn from(mac: MacAddress) -> Self {
        mac.to_string()
    }
}

/// Transport protocol of a port forward
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Protocol {
    Tcp,
    Udp,
}

impl Protocol {
    pub fn as_str(&self) -> &'static str {
        match self {
            Protocol::Tcp => "tcp",
            Protocol::Udp => "udp",
        }
    }
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Protocol {
    type Err = NetworkError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "tcp" => Ok(Protocol::Tcp),
            "udp" => Ok(Protocol::Udp),
            other => Err(NetworkError::InvalidProtocol(other.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ip_packing_round_trips_canonical_form() {
        assert_eq!(ip_to_int("10.10.0.1").unwrap(), (10 << 24) + (10 << 16) + 1);
        assert_eq!(int_to_ip(ip_to_int("192.168.1.254").unwrap()), "192.168.1.254");
        assert_eq!(int_to_ip(0), "0.0.0.0");
        assert_eq!(int_to_ip(u32::MAX), "255.255.255.255");
    }

    #[test]
    fn test_invalid_ip() {
        assert!(ip_to_int("999.1.1.1").is_err());
        assert!(ip_to_int("10.0.0").is_err());
        assert!(ip_to_int("a.b.c.d").is_err());
    }

    #[test]
    fn test_cidr_parse_clears_host_bits() {
        let cidr: Ipv4Cidr = "10.10.1.77/24".parse().unwrap();
        assert_eq!(cidr.to_string(), "10.10.1.0/24");
        assert_eq!(int_to_ip(cidr.broadcast()), "10.10.1.255");
        assert_eq!(int_to_ip(cidr.gateway()), "10.10.1.1");
    }

    #[test]
    fn test_cidr_overlap() {
        let a: Ipv4Cidr = "10.10.0.0/24".parse().unwrap();
        let b: Ipv4Cidr = "10.10.0.128/25".parse().unwrap();
        let c: Ipv4Cidr = "10.10.1.0/24".parse().unwrap();
        assert!(a.overlaps(&b));
        assert!(!a.overlaps(&c));
    }

    #[test]
    fn test_invalid_cidr() {
        assert!("10.0.0.0".parse::<Ipv4Cidr>().is_err());
        assert!("10.0.0.0/33".parse::<Ipv4Cidr>().is_err());
    }

    #[test]
    fn test_mac_address_formats() {
        let mac = MacAddress::new("52-54-00-AA-bb-01").unwrap();
        assert_eq!(mac.to_string(), "52:54:00:aa:bb:01");
        assert!(MacAddress::new("525400aabb01").is_ok());
        assert!(MacAddress::new("52:54:00:aa:bb").is_err());
    }

    #[test]
    fn test_protocol_parse() {
        assert_eq!("TCP".parse::<Protocol>().unwrap(), Protocol::Tcp);
        assert!("icmp".parse::<Protocol>().is_err());
    }
}
