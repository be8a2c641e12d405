//! Common protocol types

use std::fmt;
use std::net::Ipv6Addr;
use std::str::FromStr;

/// MAC address (6 bytes)
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct MacAddr(pub [u8; 6]);

impl MacAddr {
    pub const BROADCAST: MacAddr = MacAddr([0xff, 0xff, 0xff, 0xff, 0xff, 0xff]);

    pub fn is_broadcast(&self) -> bool {
        *self == Self::BROADCAST
    }

    pub fn is_multicast(&self) -> bool {
        self.0[0] & 0x01 != 0
    }

    pub fn is_unicast(&self) -> bool {
        !self.is_multicast()
    }

    /// Ethernet multicast address for an IPv6 multicast group (RFC 2464 §7)
    pub fn ipv6_multicast(group: &Ipv6Addr) -> Self {
        let o = group.octets();
        MacAddr([0x33, 0x33, o[12], o[13], o[14], o[15]])
    }
}

impl fmt::Debug for MacAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:02x}:{:02x}:{:02x}:{:02x}:{:02x}:{:02x}",
            self.0[0], self.0[1], self.0[2], self.0[3], self.0[4], self.0[5]
        )
    }
}

impl fmt::Display for MacAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// EUI-64 link-layer identifier (IEEE 802.15.4 extended address)
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Eui64(pub [u8; 8]);

impl Eui64 {
    /// Expand an EUI-48 into an EUI-64 by inserting ff:fe in the middle
    pub fn from_mac(mac: MacAddr) -> Self {
        let m = mac.0;
        Eui64([m[0], m[1], m[2], 0xff, 0xfe, m[3], m[4], m[5]])
    }

    /// Modified EUI-64 interface identifier (U/L bit inverted, RFC 4291 App. A)
    pub fn interface_id(&self) -> [u8; 8] {
        let mut iid = self.0;
        iid[0] ^= 0x02;
        iid
    }

    /// Link-local address fe80::/64 formed from this identifier
    pub fn link_local(&self) -> Ipv6Addr {
        let mut octets = [0u8; 16];
        octets[0] = 0xfe;
        octets[1] = 0x80;
        octets[8..].copy_from_slice(&self.interface_id());
        Ipv6Addr::from(octets)
    }

    /// Whether `addr`'s interface identifier was derived from this EUI-64
    pub fn derives(&self, addr: &Ipv6Addr) -> bool {
        addr.octets()[8..] == self.interface_id()
    }
}

impl fmt::Debug for Eui64 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let b = &self.0;
        write!(
            f,
            "{:02x}:{:02x}:{:02x}:{:02x}:{:02x}:{:02x}:{:02x}:{:02x}",
            b[0], b[1], b[2], b[3], b[4], b[5], b[6], b[7]
        )
    }
}

impl fmt::Display for Eui64 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Error type for link-layer address parsing
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseLinkAddrError {
    kind: ParseLinkAddrErrorKind,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum ParseLinkAddrErrorKind {
    Length,
    Format,
    Hex,
}

impl fmt::Display for ParseLinkAddrError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            ParseLinkAddrErrorKind::Length => write!(f, "invalid link-layer address length"),
            ParseLinkAddrErrorKind::Format => write!(f, "invalid link-layer address format"),
            ParseLinkAddrErrorKind::Hex => write!(f, "invalid hex digit in link-layer address"),
        }
    }
}

impl std::error::Error for ParseLinkAddrError {}

/// Parse `N` hex octets written as "aa:bb:..", "aa-bb-.." or "aabb.."
fn parse_octets<const N: usize>(s: &str) -> Result<[u8; N], ParseLinkAddrError> {
    let err = |kind| ParseLinkAddrError { kind };

    let parts: Vec<&str> = if s.contains(':') {
        s.split(':').collect()
    } else if s.contains('-') {
        s.split('-').collect()
    } else if s.len() == N * 2 && s.is_ascii() {
        (0..N).map(|i| &s[i * 2..i * 2 + 2]).collect()
    } else {
        return Err(err(ParseLinkAddrErrorKind::Format));
    };

    if parts.len() != N {
        return Err(err(ParseLinkAddrErrorKind::Length));
    }

    let mut result = [0u8; N];
    for (i, part) in parts.iter().enumerate() {
        if part.len() != 2 {
            return Err(err(ParseLinkAddrErrorKind::Format));
        }
        result[i] =
            u8::from_str_radix(part, 16).map_err(|_| err(ParseLinkAddrErrorKind::Hex))?;
    }
    Ok(result)
}

impl FromStr for MacAddr {
    type Err = ParseLinkAddrError;

    /// Parse a MAC address from string
    ///
    /// Supported formats:
    /// - Colon-separated: "00:11:22:33:44:55"
    /// - Hyphen-separated: "00-11-22-33-44-55"
    /// - No separator: "001122334455"
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        parse_octets::<6>(s).map(MacAddr)
    }
}

impl FromStr for Eui64 {
    type Err = ParseLinkAddrError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        parse_octets::<8>(s).map(Eui64)
    }
}

/// EtherType values
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u16)]
pub enum EtherType {
    Ipv4 = 0x0800,
    Arp = 0x0806,
    Ipv6 = 0x86DD,
}

impl EtherType {
    pub fn from_u16(value: u16) -> Option<Self> {
        match value {
            0x0800 => Some(EtherType::Ipv4),
            0x0806 => Some(EtherType::Arp),
            0x86DD => Some(EtherType::Ipv6),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mac_addr_broadcast() {
        assert!(MacAddr::BROADCAST.is_broadcast());
        assert!(MacAddr::BROADCAST.is_multicast());
        assert!(!MacAddr::BROADCAST.is_unicast());
    }

    #[test]
    fn test_mac_addr_display() {
        let mac = MacAddr([0x00, 0x11, 0x22, 0x33, 0x44, 0x55]);
        assert_eq!(format!("{}", mac), "00:11:22:33:44:55");
    }

    #[test]
    fn test_mac_addr_parse_formats() {
        let expected = MacAddr([0x00, 0x11, 0x22, 0x33, 0x44, 0x55]);
        assert_eq!("00:11:22:33:44:55".parse::<MacAddr>().unwrap(), expected);
        assert_eq!("00-11-22-33-44-55".parse::<MacAddr>().unwrap(), expected);
        assert_eq!("001122334455".parse::<MacAddr>().unwrap(), expected);
    }

    #[test]
    fn test_mac_addr_parse_invalid() {
        assert!("00:11:22:33:44".parse::<MacAddr>().is_err());
        assert!("00:11:22:33:44:gg".parse::<MacAddr>().is_err());
        assert!("00.11.22.33.44.55".parse::<MacAddr>().is_err());
    }

    #[test]
    fn test_ipv6_multicast_mac() {
        let group: Ipv6Addr = "ff02::1:ff00:1".parse().unwrap();
        assert_eq!(
            MacAddr::ipv6_multicast(&group),
            MacAddr([0x33, 0x33, 0xff, 0x00, 0x00, 0x01])
        );
    }

    #[test]
    fn test_eui64_parse_and_display() {
        let eui: Eui64 = "00:07:62:ff:fe:00:00:01".parse().unwrap();
        assert_eq!(eui, Eui64([0x00, 0x07, 0x62, 0xff, 0xfe, 0x00, 0x00, 0x01]));
        assert_eq!(eui.to_string(), "00:07:62:ff:fe:00:00:01");
        assert!("00:07:62:ff:fe:00:00".parse::<Eui64>().is_err());
    }

    #[test]
    fn test_eui64_from_mac() {
        let mac = MacAddr([0x00, 0x11, 0x22, 0x33, 0x44, 0x55]);
        assert_eq!(
            Eui64::from_mac(mac),
            Eui64([0x00, 0x11, 0x22, 0xff, 0xfe, 0x33, 0x44, 0x55])
        );
    }

    #[test]
    fn test_eui64_link_local() {
        let eui = Eui64([0x00, 0x11, 0x22, 0x33, 0x44, 0x55, 0x66, 0x77]);
        let ll = eui.link_local();
        assert_eq!(ll, "fe80::211:2233:4455:6677".parse::<Ipv6Addr>().unwrap());
        assert!(eui.derives(&ll));
        assert!(eui.derives(&"2001:db8::211:2233:4455:6677".parse().unwrap()));
        assert!(!eui.derives(&"fe80::1".parse().unwrap()));
    }

    #[test]
    fn test_ethertype_from_u16() {
        assert_eq!(EtherType::from_u16(0x86DD), Some(EtherType::Ipv6));
        assert_eq!(EtherType::from_u16(0x0800), Some(EtherType::Ipv4));
        assert_eq!(EtherType::from_u16(0x1234), None);
    }
}
