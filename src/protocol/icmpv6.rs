//! ICMPv6 Neighbor Discovery - RFC 4861, 6LoWPAN-ND options - RFC 6775

use super::checksum;
use super::ipv6::mask_prefix;
use super::{Eui64, MacAddr};
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::net::Ipv6Addr;

/// Minimum ICMPv6 header size
pub const MIN_HEADER_SIZE: usize = 4;

/// Neighbor Solicitation/Advertisement message size (without options)
pub const NDP_MSG_SIZE: usize = 24; // 4 (header) + 4 (reserved/flags) + 16 (target)

/// Router Advertisement message size (without options)
pub const RA_MSG_SIZE: usize = 16;

/// Router Solicitation message size (without options)
pub const RS_MSG_SIZE: usize = 8;

/// ICMPv6 Neighbor Discovery message types
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Icmpv6Type {
    RouterSolicitation = 133,
    RouterAdvertisement = 134,
    NeighborSolicitation = 135,
    NeighborAdvertisement = 136,
}

impl Icmpv6Type {
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            133 => Some(Icmpv6Type::RouterSolicitation),
            134 => Some(Icmpv6Type::RouterAdvertisement),
            135 => Some(Icmpv6Type::NeighborSolicitation),
            136 => Some(Icmpv6Type::NeighborAdvertisement),
            _ => None,
        }
    }
}

/// Type numbers carried by the 6LoWPAN-ND options
///
/// The pre-RFC drafts numbered ARO 131, 6CO 32 and ABRO 33; RFC 6775
/// reassigned them to 33, 34 and 35. Layouts are identical. Draft ABRO and
/// RFC ARO share 33, so a link speaks one numbering or the other.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OptionNumbering {
    #[default]
    Rfc6775,
    Draft,
}

/// NDP option types (RFC 4861 and RFC 6775 assignments)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum NdpOptionType {
    SourceLinkLayerAddress = 1,
    TargetLinkLayerAddress = 2,
    PrefixInformation = 3,
    Mtu = 5,
    AddressRegistration = 33,
    SixLowpanContext = 34,
    AuthoritativeBorderRouter = 35,
}

impl NdpOptionType {
    pub fn from_u8(value: u8) -> Option<Self> {
        Self::decode(value, OptionNumbering::Rfc6775)
    }

    pub fn decode(value: u8, numbering: OptionNumbering) -> Option<Self> {
        use OptionNumbering::{Draft, Rfc6775};
        match (numbering, value) {
            (_, 1) => Some(NdpOptionType::SourceLinkLayerAddress),
            (_, 2) => Some(NdpOptionType::TargetLinkLayerAddress),
            (_, 3) => Some(NdpOptionType::PrefixInformation),
            (_, 5) => Some(NdpOptionType::Mtu),
            (Rfc6775, 33) | (Draft, 131) => Some(NdpOptionType::AddressRegistration),
            (Rfc6775, 34) | (Draft, 32) => Some(NdpOptionType::SixLowpanContext),
            (Rfc6775, 35) | (Draft, 33) => Some(NdpOptionType::AuthoritativeBorderRouter),
            _ => None,
        }
    }

    /// Wire type number under `numbering`
    pub fn code(self, numbering: OptionNumbering) -> u8 {
        match (numbering, self) {
            (OptionNumbering::Draft, NdpOptionType::AddressRegistration) => 131,
            (OptionNumbering::Draft, NdpOptionType::SixLowpanContext) => 32,
            (OptionNumbering::Draft, NdpOptionType::AuthoritativeBorderRouter) => 33,
            _ => self as u8,
        }
    }
}

/// ARO status codes (RFC 6775 §4.1)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(u8)]
pub enum AroStatus {
    #[default]
    Success = 0,
    Duplicate = 1,
    RouterNcFull = 2,
}

impl AroStatus {
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(AroStatus::Success),
            1 => Some(AroStatus::Duplicate),
            2 => Some(AroStatus::RouterNcFull),
            _ => None,
        }
    }
}

/// Status reported to a node whose registration failed with `err`
impl From<&Error> for AroStatus {
    fn from(err: &Error) -> Self {
        match err {
            Error::Duplicate => AroStatus::Duplicate,
            _ => AroStatus::RouterNcFull,
        }
    }
}

fn read_u16(buf: &[u8], offset: usize) -> u16 {
    u16::from_be_bytes([buf[offset], buf[offset + 1]])
}

fn read_u32(buf: &[u8], offset: usize) -> u32 {
    u32::from_be_bytes([buf[offset], buf[offset + 1], buf[offset + 2], buf[offset + 3]])
}

fn read_addr(buf: &[u8], offset: usize) -> Ipv6Addr {
    let mut octets = [0u8; 16];
    octets.copy_from_slice(&buf[offset..offset + 16]);
    Ipv6Addr::from(octets)
}

fn malformed(what: &str) -> Error {
    Error::MalformedOption(what.into())
}

/// Link-layer address carried in SLLAO/TLLAO
///
/// Ethernet uses the 6-byte form (length 1); IEEE 802.15.4 uses the 8-byte
/// EUI-64 form (length 2, RFC 4944 §8).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkAddr {
    Mac(MacAddr),
    Eui64(Eui64),
}

impl LinkAddr {
    /// EUI-64 view; an Ethernet MAC is expanded with ff:fe
    pub fn eui64(&self) -> Eui64 {
        match self {
            LinkAddr::Mac(mac) => Eui64::from_mac(*mac),
            LinkAddr::Eui64(eui) => *eui,
        }
    }

    pub fn mac(&self) -> Option<MacAddr> {
        match self {
            LinkAddr::Mac(mac) => Some(*mac),
            LinkAddr::Eui64(_) => None,
        }
    }

    fn parse(opt: &[u8]) -> Result<Self> {
        match opt[1] {
            1 => {
                let mut mac = [0u8; 6];
                mac.copy_from_slice(&opt[2..8]);
                Ok(LinkAddr::Mac(MacAddr(mac)))
            }
            2 => {
                let mut eui = [0u8; 8];
                eui.copy_from_slice(&opt[2..10]);
                Ok(LinkAddr::Eui64(Eui64(eui)))
            }
            _ => Err(malformed("link-layer address option length")),
        }
    }

    fn write(&self, kind: NdpOptionType, buf: &mut Vec<u8>) {
        match self {
            LinkAddr::Mac(mac) => {
                buf.extend_from_slice(&[kind as u8, 1]);
                buf.extend_from_slice(&mac.0);
            }
            LinkAddr::Eui64(eui) => {
                buf.extend_from_slice(&[kind as u8, 2]);
                buf.extend_from_slice(&eui.0);
                buf.extend_from_slice(&[0u8; 6]);
            }
        }
    }
}

/// Prefix Information Option (RFC 4861 §4.6.2)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrefixInformation {
    pub prefix_len: u8,
    pub on_link: bool,
    pub autonomous: bool,
    pub valid_lifetime: u32,
    pub preferred_lifetime: u32,
    pub prefix: Ipv6Addr,
}

impl PrefixInformation {
    const LEN: u8 = 4;

    fn parse(opt: &[u8]) -> Result<Self> {
        if opt[1] != Self::LEN || opt[2] > 128 {
            return Err(malformed("prefix information"));
        }
        Ok(Self {
            prefix_len: opt[2],
            on_link: opt[3] & 0x80 != 0,
            autonomous: opt[3] & 0x40 != 0,
            valid_lifetime: read_u32(opt, 4),
            preferred_lifetime: read_u32(opt, 8),
            prefix: read_addr(opt, 16),
        })
    }

    fn write(&self, buf: &mut Vec<u8>) {
        let mut flags = 0u8;
        if self.on_link {
            flags |= 0x80;
        }
        if self.autonomous {
            flags |= 0x40;
        }
        buf.extend_from_slice(&[
            NdpOptionType::PrefixInformation as u8,
            Self::LEN,
            self.prefix_len,
            flags,
        ]);
        buf.extend_from_slice(&self.valid_lifetime.to_be_bytes());
        buf.extend_from_slice(&self.preferred_lifetime.to_be_bytes());
        buf.extend_from_slice(&[0u8; 4]);
        buf.extend_from_slice(&self.prefix.octets());
    }
}

/// Address Registration Option (RFC 6775 §4.1)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AddressRegistration {
    /// Raw status; hosts send 0, routers answer with an `AroStatus`
    pub status: u8,
    /// Registration lifetime in units of 60 seconds
    pub lifetime: u16,
    pub eui64: Eui64,
}

impl AddressRegistration {
    const LEN: u8 = 2;

    pub fn new(status: AroStatus, lifetime: u16, eui64: Eui64) -> Self {
        Self {
            status: status as u8,
            lifetime,
            eui64,
        }
    }

    fn parse(opt: &[u8]) -> Result<Self> {
        if opt[1] != Self::LEN {
            return Err(malformed("address registration"));
        }
        let mut eui = [0u8; 8];
        eui.copy_from_slice(&opt[8..16]);
        Ok(Self {
            status: opt[2],
            lifetime: read_u16(opt, 6),
            eui64: Eui64(eui),
        })
    }

    fn write(&self, numbering: OptionNumbering, buf: &mut Vec<u8>) {
        buf.extend_from_slice(&[
            NdpOptionType::AddressRegistration.code(numbering),
            Self::LEN,
            self.status,
            0,
            0,
            0,
        ]);
        buf.extend_from_slice(&self.lifetime.to_be_bytes());
        buf.extend_from_slice(&self.eui64.0);
    }
}

/// 6LoWPAN Context Option (RFC 6775 §4.2)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SixLowpanContext {
    pub context_len: u8,
    /// C flag: the context may be used for compression
    pub compression: bool,
    pub context_id: u8,
    /// Valid lifetime in units of 60 seconds
    pub lifetime: u16,
    pub prefix: Ipv6Addr,
}

impl SixLowpanContext {
    const FLAG_C: u8 = 0x10;
    const CID_MASK: u8 = 0x0F;

    fn parse(opt: &[u8]) -> Result<Self> {
        let context_len = opt[2];
        let prefix_bytes = match opt[1] {
            2 if context_len <= 64 => 8,
            3 if context_len <= 128 => 16,
            _ => return Err(malformed("6LoWPAN context")),
        };

        let mut octets = [0u8; 16];
        octets[..prefix_bytes].copy_from_slice(&opt[8..8 + prefix_bytes]);

        Ok(Self {
            context_len,
            compression: opt[3] & Self::FLAG_C != 0,
            context_id: opt[3] & Self::CID_MASK,
            lifetime: read_u16(opt, 6),
            prefix: mask_prefix(&Ipv6Addr::from(octets), context_len),
        })
    }

    fn write(&self, numbering: OptionNumbering, buf: &mut Vec<u8>) {
        let (len, prefix_bytes) = if self.context_len <= 64 { (2, 8) } else { (3, 16) };
        let mut flags = self.context_id & Self::CID_MASK;
        if self.compression {
            flags |= Self::FLAG_C;
        }
        buf.extend_from_slice(&[
            NdpOptionType::SixLowpanContext.code(numbering),
            len,
            self.context_len,
            flags,
            0,
            0,
        ]);
        buf.extend_from_slice(&self.lifetime.to_be_bytes());
        buf.extend_from_slice(&self.prefix.octets()[..prefix_bytes]);
    }
}

/// Authoritative Border Router Option (RFC 6775 §4.3)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AuthoritativeBorderRouter {
    pub version: u32,
    /// Valid lifetime in units of 60 seconds
    pub lifetime: u16,
    pub address: Ipv6Addr,
}

impl AuthoritativeBorderRouter {
    const LEN: u8 = 3;

    fn parse(opt: &[u8]) -> Result<Self> {
        if opt[1] != Self::LEN {
            return Err(malformed("authoritative border router"));
        }
        let low = read_u16(opt, 2) as u32;
        let high = read_u16(opt, 4) as u32;
        Ok(Self {
            version: (high << 16) | low,
            lifetime: read_u16(opt, 6),
            address: read_addr(opt, 8),
        })
    }

    fn write(&self, numbering: OptionNumbering, buf: &mut Vec<u8>) {
        buf.extend_from_slice(&[
            NdpOptionType::AuthoritativeBorderRouter.code(numbering),
            Self::LEN,
        ]);
        buf.extend_from_slice(&(self.version as u16).to_be_bytes());
        buf.extend_from_slice(&((self.version >> 16) as u16).to_be_bytes());
        buf.extend_from_slice(&self.lifetime.to_be_bytes());
        buf.extend_from_slice(&self.address.octets());
    }
}

/// Options of one ND message, grouped by kind
///
/// Unknown option types are skipped (RFC 4861 §4.6); a zero-length or
/// truncated option makes the whole message invalid.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NdOptions {
    pub source_link_addr: Option<LinkAddr>,
    pub target_link_addr: Option<LinkAddr>,
    pub mtu: Option<u32>,
    pub prefixes: Vec<PrefixInformation>,
    pub aro: Option<AddressRegistration>,
    pub contexts: Vec<SixLowpanContext>,
    pub abro: Option<AuthoritativeBorderRouter>,
}

impl NdOptions {
    pub fn parse(buf: &[u8]) -> Result<Self> {
        Self::parse_with(buf, OptionNumbering::default())
    }

    pub fn parse_with(buf: &[u8], numbering: OptionNumbering) -> Result<Self> {
        let mut options = NdOptions::default();
        let mut offset = 0;

        while offset < buf.len() {
            if offset + 2 > buf.len() {
                return Err(malformed("truncated option header"));
            }
            let opt_len = buf[offset + 1] as usize * 8;
            if opt_len == 0 {
                return Err(malformed("zero-length option"));
            }
            if offset + opt_len > buf.len() {
                return Err(malformed("truncated option"));
            }

            let opt = &buf[offset..offset + opt_len];
            match NdpOptionType::decode(opt[0], numbering) {
                Some(NdpOptionType::SourceLinkLayerAddress) => {
                    options.source_link_addr = Some(LinkAddr::parse(opt)?);
                }
                Some(NdpOptionType::TargetLinkLayerAddress) => {
                    options.target_link_addr = Some(LinkAddr::parse(opt)?);
                }
                Some(NdpOptionType::PrefixInformation) => {
                    options.prefixes.push(PrefixInformation::parse(opt)?);
                }
                Some(NdpOptionType::Mtu) => {
                    if opt.len() != 8 {
                        return Err(malformed("MTU"));
                    }
                    options.mtu = Some(read_u32(opt, 4));
                }
                Some(NdpOptionType::AddressRegistration) => {
                    options.aro = Some(AddressRegistration::parse(opt)?);
                }
                Some(NdpOptionType::SixLowpanContext) => {
                    options.contexts.push(SixLowpanContext::parse(opt)?);
                }
                Some(NdpOptionType::AuthoritativeBorderRouter) => {
                    options.abro = Some(AuthoritativeBorderRouter::parse(opt)?);
                }
                None => {}
            }

            offset += opt_len;
        }

        Ok(options)
    }

    pub fn write(&self, buf: &mut Vec<u8>) {
        self.write_with(buf, OptionNumbering::default());
    }

    pub fn write_with(&self, buf: &mut Vec<u8>, numbering: OptionNumbering) {
        if let Some(lladdr) = &self.source_link_addr {
            lladdr.write(NdpOptionType::SourceLinkLayerAddress, buf);
        }
        if let Some(lladdr) = &self.target_link_addr {
            lladdr.write(NdpOptionType::TargetLinkLayerAddress, buf);
        }
        if let Some(mtu) = self.mtu {
            buf.extend_from_slice(&[NdpOptionType::Mtu as u8, 1, 0, 0]);
            buf.extend_from_slice(&mtu.to_be_bytes());
        }
        for prefix in &self.prefixes {
            prefix.write(buf);
        }
        if let Some(aro) = &self.aro {
            aro.write(numbering, buf);
        }
        for context in &self.contexts {
            context.write(numbering, buf);
        }
        if let Some(abro) = &self.abro {
            abro.write(numbering, buf);
        }
    }
}

/// Parsed ICMPv6 header (zero-copy reference)
#[derive(Debug)]
pub struct Icmpv6Packet<'a> {
    buffer: &'a [u8],
}

impl<'a> Icmpv6Packet<'a> {
    pub fn parse(buffer: &'a [u8]) -> Result<Self> {
        if buffer.len() < MIN_HEADER_SIZE {
            return Err(Error::Parse("ICMPv6 packet too short".into()));
        }

        Ok(Self { buffer })
    }

    pub fn msg_type(&self) -> u8 {
        self.buffer[0]
    }

    pub fn code(&self) -> u8 {
        self.buffer[1]
    }

    pub fn checksum(&self) -> u16 {
        u16::from_be_bytes([self.buffer[2], self.buffer[3]])
    }

    /// Message body (after type/code/checksum)
    pub fn body(&self) -> &[u8] {
        &self.buffer[MIN_HEADER_SIZE..]
    }

    pub fn as_bytes(&self) -> &[u8] {
        self.buffer
    }
}

fn header(kind: Icmpv6Type, capacity: usize) -> Vec<u8> {
    let mut buf = Vec::with_capacity(capacity);
    buf.extend_from_slice(&[kind as u8, 0, 0, 0]);
    buf
}

/// Router Solicitation message
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RouterSolicitation {
    pub options: NdOptions,
}

impl RouterSolicitation {
    /// Parse from ICMPv6 body (after type/code/checksum)
    pub fn parse(buffer: &[u8]) -> Result<Self> {
        Self::parse_with(buffer, OptionNumbering::default())
    }

    pub fn parse_with(buffer: &[u8], numbering: OptionNumbering) -> Result<Self> {
        if buffer.len() < 4 {
            return Err(Error::Parse("Router Solicitation too short".into()));
        }
        Ok(Self {
            options: NdOptions::parse_with(&buffer[4..], numbering)?,
        })
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        self.to_bytes_with(OptionNumbering::default())
    }

    pub fn to_bytes_with(&self, numbering: OptionNumbering) -> Vec<u8> {
        let mut buf = header(Icmpv6Type::RouterSolicitation, RS_MSG_SIZE + 16);
        buf.extend_from_slice(&[0u8; 4]);
        self.options.write_with(&mut buf, numbering);
        buf
    }
}

/// Router Advertisement message
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RouterAdvertisement {
    pub cur_hop_limit: u8,
    pub managed: bool,
    pub other: bool,
    /// Seconds; 0 means not a default router
    pub router_lifetime: u16,
    /// Milliseconds
    pub reachable_time: u32,
    /// Milliseconds
    pub retrans_timer: u32,
    pub options: NdOptions,
}

impl RouterAdvertisement {
    /// Parse from ICMPv6 body (after type/code/checksum)
    pub fn parse(buffer: &[u8]) -> Result<Self> {
        Self::parse_with(buffer, OptionNumbering::default())
    }

    pub fn parse_with(buffer: &[u8], numbering: OptionNumbering) -> Result<Self> {
        if buffer.len() < RA_MSG_SIZE - MIN_HEADER_SIZE {
            return Err(Error::Parse("Router Advertisement too short".into()));
        }
        Ok(Self {
            cur_hop_limit: buffer[0],
            managed: buffer[1] & 0x80 != 0,
            other: buffer[1] & 0x40 != 0,
            router_lifetime: read_u16(buffer, 2),
            reachable_time: read_u32(buffer, 4),
            retrans_timer: read_u32(buffer, 8),
            options: NdOptions::parse_with(&buffer[12..], numbering)?,
        })
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        self.to_bytes_with(OptionNumbering::default())
    }

    pub fn to_bytes_with(&self, numbering: OptionNumbering) -> Vec<u8> {
        let mut buf = header(Icmpv6Type::RouterAdvertisement, RA_MSG_SIZE + 128);
        let mut flags = 0u8;
        if self.managed {
            flags |= 0x80;
        }
        if self.other {
            flags |= 0x40;
        }
        buf.extend_from_slice(&[self.cur_hop_limit, flags]);
        buf.extend_from_slice(&self.router_lifetime.to_be_bytes());
        buf.extend_from_slice(&self.reachable_time.to_be_bytes());
        buf.extend_from_slice(&self.retrans_timer.to_be_bytes());
        self.options.write_with(&mut buf, numbering);
        buf
    }
}

/// Neighbor Solicitation message
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NeighborSolicitation {
    pub target_addr: Ipv6Addr,
    pub options: NdOptions,
}

impl NeighborSolicitation {
    /// Parse from ICMPv6 body (after type/code/checksum)
    pub fn parse(buffer: &[u8]) -> Result<Self> {
        Self::parse_with(buffer, OptionNumbering::default())
    }

    pub fn parse_with(buffer: &[u8], numbering: OptionNumbering) -> Result<Self> {
        // Minimum: 4 (reserved) + 16 (target) = 20 bytes
        if buffer.len() < 20 {
            return Err(Error::Parse("Neighbor Solicitation too short".into()));
        }

        let target_addr = read_addr(buffer, 4);
        if target_addr.is_multicast() {
            return Err(Error::Parse("multicast NS target".into()));
        }

        Ok(Self {
            target_addr,
            options: NdOptions::parse_with(&buffer[20..], numbering)?,
        })
    }

    /// Build NS message bytes (ICMPv6 payload, checksum zero)
    pub fn to_bytes(&self) -> Vec<u8> {
        self.to_bytes_with(OptionNumbering::default())
    }

    pub fn to_bytes_with(&self, numbering: OptionNumbering) -> Vec<u8> {
        let mut buf = header(Icmpv6Type::NeighborSolicitation, NDP_MSG_SIZE + 32);
        buf.extend_from_slice(&[0u8; 4]);
        buf.extend_from_slice(&self.target_addr.octets());
        self.options.write_with(&mut buf, numbering);
        buf
    }

    /// Create a new NS for the given target
    pub fn new(target_addr: Ipv6Addr, source_link_addr: Option<LinkAddr>) -> Self {
        Self {
            target_addr,
            options: NdOptions {
                source_link_addr,
                ..NdOptions::default()
            },
        }
    }
}

/// Neighbor Advertisement message
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NeighborAdvertisement {
    pub router_flag: bool,
    pub solicited_flag: bool,
    pub override_flag: bool,
    pub target_addr: Ipv6Addr,
    pub options: NdOptions,
}

impl NeighborAdvertisement {
    /// Parse from ICMPv6 body (after type/code/checksum)
    pub fn parse(buffer: &[u8]) -> Result<Self> {
        Self::parse_with(buffer, OptionNumbering::default())
    }

    pub fn parse_with(buffer: &[u8], numbering: OptionNumbering) -> Result<Self> {
        if buffer.len() < 20 {
            return Err(Error::Parse("Neighbor Advertisement too short".into()));
        }

        let flags = buffer[0];
        Ok(Self {
            router_flag: flags & 0x80 != 0,
            solicited_flag: flags & 0x40 != 0,
            override_flag: flags & 0x20 != 0,
            target_addr: read_addr(buffer, 4),
            options: NdOptions::parse_with(&buffer[20..], numbering)?,
        })
    }

    /// Build NA message bytes (ICMPv6 payload, checksum zero)
    pub fn to_bytes(&self) -> Vec<u8> {
        self.to_bytes_with(OptionNumbering::default())
    }

    pub fn to_bytes_with(&self, numbering: OptionNumbering) -> Vec<u8> {
        let mut buf = header(Icmpv6Type::NeighborAdvertisement, NDP_MSG_SIZE + 32);
        let mut flags: u8 = 0;
        if self.router_flag {
            flags |= 0x80;
        }
        if self.solicited_flag {
            flags |= 0x40;
        }
        if self.override_flag {
            flags |= 0x20;
        }
        buf.extend_from_slice(&[flags, 0, 0, 0]);
        buf.extend_from_slice(&self.target_addr.octets());
        self.options.write_with(&mut buf, numbering);
        buf
    }

    pub fn new(
        target_addr: Ipv6Addr,
        target_link_addr: Option<LinkAddr>,
        router_flag: bool,
        solicited_flag: bool,
        override_flag: bool,
    ) -> Self {
        Self {
            router_flag,
            solicited_flag,
            override_flag,
            target_addr,
            options: NdOptions {
                target_link_addr,
                ..NdOptions::default()
            },
        }
    }

    /// Solicited NA for one of our own addresses
    pub fn solicited_reply(target_addr: Ipv6Addr, target_link_addr: LinkAddr, router: bool) -> Self {
        Self::new(target_addr, Some(target_link_addr), router, true, true)
    }

    /// Proxy NA answering for a registered mesh node (RFC 4389: O=0)
    pub fn proxy_reply(target_addr: Ipv6Addr, proxy_mac: MacAddr) -> Self {
        Self::new(target_addr, Some(LinkAddr::Mac(proxy_mac)), false, true, false)
    }

    /// NA carrying the ARO status back to a registering node (RFC 6775 §6.5.2)
    pub fn aro_reply(target_addr: Ipv6Addr, aro: AddressRegistration) -> Self {
        Self {
            router_flag: true,
            solicited_flag: true,
            override_flag: false,
            target_addr,
            options: NdOptions {
                aro: Some(aro),
                ..NdOptions::default()
            },
        }
    }
}

/// Any Neighbor Discovery message the gateway handles
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NdMessage {
    RouterSolicitation(RouterSolicitation),
    RouterAdvertisement(RouterAdvertisement),
    NeighborSolicitation(NeighborSolicitation),
    NeighborAdvertisement(NeighborAdvertisement),
}

impl NdMessage {
    /// Decode a full ICMPv6 message; `Ok(None)` for non-ND types
    pub fn parse(packet: &Icmpv6Packet<'_>) -> Result<Option<Self>> {
        Self::parse_with(packet, OptionNumbering::default())
    }

    pub fn parse_with(packet: &Icmpv6Packet<'_>, numbering: OptionNumbering) -> Result<Option<Self>> {
        let Some(kind) = Icmpv6Type::from_u8(packet.msg_type()) else {
            return Ok(None);
        };
        if packet.code() != 0 {
            return Err(Error::InvalidPacket("ND message with non-zero code".into()));
        }

        let body = packet.body();
        let message = match kind {
            Icmpv6Type::RouterSolicitation => {
                NdMessage::RouterSolicitation(RouterSolicitation::parse_with(body, numbering)?)
            }
            Icmpv6Type::RouterAdvertisement => {
                NdMessage::RouterAdvertisement(RouterAdvertisement::parse_with(body, numbering)?)
            }
            Icmpv6Type::NeighborSolicitation => {
                NdMessage::NeighborSolicitation(NeighborSolicitation::parse_with(body, numbering)?)
            }
            Icmpv6Type::NeighborAdvertisement => {
                NdMessage::NeighborAdvertisement(NeighborAdvertisement::parse_with(body, numbering)?)
            }
        };
        Ok(Some(message))
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        self.to_bytes_with(OptionNumbering::default())
    }

    pub fn to_bytes_with(&self, numbering: OptionNumbering) -> Vec<u8> {
        match self {
            NdMessage::RouterSolicitation(m) => m.to_bytes_with(numbering),
            NdMessage::RouterAdvertisement(m) => m.to_bytes_with(numbering),
            NdMessage::NeighborSolicitation(m) => m.to_bytes_with(numbering),
            NdMessage::NeighborAdvertisement(m) => m.to_bytes_with(numbering),
        }
    }
}

/// Set checksum in ICMPv6 message buffer
pub fn set_checksum(buffer: &mut [u8], src_addr: &Ipv6Addr, dst_addr: &Ipv6Addr) {
    if buffer.len() < MIN_HEADER_SIZE {
        return;
    }
    buffer[2] = 0;
    buffer[3] = 0;

    let checksum = checksum::icmpv6_checksum(src_addr, dst_addr, buffer);
    buffer[2..4].copy_from_slice(&checksum.to_be_bytes());
}

/// Validate ICMPv6 checksum
pub fn validate_checksum(src_addr: &Ipv6Addr, dst_addr: &Ipv6Addr, icmpv6_data: &[u8]) -> bool {
    checksum::verify_icmpv6(src_addr, dst_addr, icmpv6_data)
}

#[cfg(test)]
mod tests {
    use super::*;

    const NODE_EUI: Eui64 = Eui64([0x02, 0x12, 0x4b, 0x00, 0x01, 0x02, 0x03, 0x04]);

    fn make_ns_with_aro() -> Vec<u8> {
        vec![
            0x87, // Type: NS (135)
            0x00, // Code: 0
            0x00, 0x00, // Checksum (placeholder)
            0x00, 0x00, 0x00, 0x00, // Reserved
            // Target: 2001:db8::1
            0x20, 0x01, 0x0d, 0xb8, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00,
            0x00, 0x01, // SLLAO, EUI-64 form
            0x01, 0x02, 0x02, 0x12, 0x4b, 0x00, 0x01, 0x02, 0x03, 0x04, 0x00, 0x00, 0x00, 0x00,
            0x00, 0x00, // ARO: status 0, lifetime 10 min
            0x21, 0x02, 0x00, 0x00, 0x00, 0x00, 0x00, 0x0a, 0x02, 0x12, 0x4b, 0x00, 0x01, 0x02,
            0x03, 0x04,
        ]
    }

    fn make_na_packet() -> Vec<u8> {
        vec![
            0x88, // Type: NA (136)
            0x00, // Code: 0
            0x00, 0x00, // Checksum (placeholder)
            0x60, // Flags: S=1, O=1
            0x00, 0x00, 0x00, // Reserved
            // Target: 2001:db8::1
            0x20, 0x01, 0x0d, 0xb8, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00,
            0x00, 0x01, // TLLAO, MAC form
            0x02, 0x01, 0xaa, 0xbb, 0xcc, 0xdd, 0xee, 0xff,
        ]
    }

    #[test]
    fn test_icmpv6_type_from_u8() {
        assert_eq!(Icmpv6Type::from_u8(133), Some(Icmpv6Type::RouterSolicitation));
        assert_eq!(Icmpv6Type::from_u8(136), Some(Icmpv6Type::NeighborAdvertisement));
        assert_eq!(Icmpv6Type::from_u8(128), None);
    }

    #[test]
    fn test_ndp_option_type_uses_rfc_numbers() {
        assert_eq!(NdpOptionType::from_u8(33), Some(NdpOptionType::AddressRegistration));
        assert_eq!(NdpOptionType::from_u8(34), Some(NdpOptionType::SixLowpanContext));
        assert_eq!(
            NdpOptionType::from_u8(35),
            Some(NdpOptionType::AuthoritativeBorderRouter)
        );
        assert_eq!(NdpOptionType::from_u8(131), None);
        assert_eq!(NdpOptionType::from_u8(32), None);
    }

    #[test]
    fn test_ns_parse_with_aro() {
        let data = make_ns_with_aro();
        let ns = NeighborSolicitation::parse(&data[4..]).unwrap();

        assert_eq!(ns.target_addr, "2001:db8::1".parse::<Ipv6Addr>().unwrap());
        assert_eq!(ns.options.source_link_addr, Some(LinkAddr::Eui64(NODE_EUI)));
        let aro = ns.options.aro.unwrap();
        assert_eq!(aro.status, 0);
        assert_eq!(aro.lifetime, 10);
        assert_eq!(aro.eui64, NODE_EUI);
    }

    #[test]
    fn test_ns_to_bytes_matches_wire_layout() {
        let mut ns = NeighborSolicitation::new(
            "2001:db8::1".parse().unwrap(),
            Some(LinkAddr::Eui64(NODE_EUI)),
        );
        ns.options.aro = Some(AddressRegistration::new(AroStatus::Success, 10, NODE_EUI));

        assert_eq!(ns.to_bytes(), make_ns_with_aro());
    }

    #[test]
    fn test_ns_parse_too_short() {
        assert!(NeighborSolicitation::parse(&[0u8; 19]).is_err());
    }

    #[test]
    fn test_ns_multicast_target_rejected() {
        let mut data = make_ns_with_aro();
        data[8] = 0xff;
        assert!(NeighborSolicitation::parse(&data[4..]).is_err());
    }

    #[test]
    fn test_na_parse() {
        let data = make_na_packet();
        let na = NeighborAdvertisement::parse(&data[4..]).unwrap();

        assert!(!na.router_flag);
        assert!(na.solicited_flag);
        assert!(na.override_flag);
        assert_eq!(na.target_addr, "2001:db8::1".parse::<Ipv6Addr>().unwrap());
        assert_eq!(
            na.options.target_link_addr,
            Some(LinkAddr::Mac(MacAddr([0xaa, 0xbb, 0xcc, 0xdd, 0xee, 0xff])))
        );
    }

    #[test]
    fn test_na_proxy_reply_flags() {
        let mac = MacAddr([0x02, 0x00, 0x00, 0x00, 0x00, 0x01]);
        let bytes = NeighborAdvertisement::proxy_reply("2001:db8::5".parse().unwrap(), mac).to_bytes();

        assert_eq!(bytes[0], 136);
        assert_eq!(bytes[4], 0x40); // R=0, S=1, O=0
        assert_eq!(&bytes[24..26], &[2, 1]);
        assert_eq!(&bytes[26..32], &mac.0);
    }

    #[test]
    fn test_na_aro_reply_layout() {
        let aro = AddressRegistration::new(AroStatus::Duplicate, 0, NODE_EUI);
        let bytes = NeighborAdvertisement::aro_reply("2001:db8::1".parse().unwrap(), aro).to_bytes();

        assert_eq!(bytes.len(), NDP_MSG_SIZE + 16);
        assert_eq!(&bytes[24..28], &[33, 2, 1, 0]);
        assert_eq!(&bytes[30..32], &[0, 0]);
        assert_eq!(&bytes[32..40], &NODE_EUI.0);
    }

    #[test]
    fn test_6co_short_form() {
        let opt = [34, 2, 64, 0x13, 0, 0, 0x00, 0x3c, 0x20, 0x01, 0x0d, 0xb8, 0, 0, 0, 0];
        let options = NdOptions::parse(&opt).unwrap();
        let ctx = options.contexts[0];

        assert_eq!(ctx.context_len, 64);
        assert!(ctx.compression);
        assert_eq!(ctx.context_id, 3);
        assert_eq!(ctx.lifetime, 60);
        assert_eq!(ctx.prefix, "2001:db8::".parse::<Ipv6Addr>().unwrap());

        let mut written = Vec::new();
        options.write(&mut written);
        assert_eq!(written, opt);
    }

    #[test]
    fn test_6co_long_form_and_masking() {
        let mut opt = vec![34, 3, 80, 0x01, 0, 0, 0x00, 0x0a];
        opt.extend_from_slice(&"2001:db8:1:2:3fff::".parse::<Ipv6Addr>().unwrap().octets());
        let ctx = NdOptions::parse(&opt).unwrap().contexts[0];

        assert_eq!(ctx.context_len, 80);
        assert!(!ctx.compression);
        assert_eq!(ctx.context_id, 1);
        assert_eq!(ctx.prefix, "2001:db8:1:2:3fff::".parse::<Ipv6Addr>().unwrap());
    }

    #[test]
    fn test_6co_length_mismatch_rejected() {
        // context length 96 needs the 3-unit form
        let opt = [34, 2, 96, 0x10, 0, 0, 0, 1, 0x20, 0x01, 0x0d, 0xb8, 0, 0, 0, 0];
        assert!(matches!(
            NdOptions::parse(&opt),
            Err(Error::MalformedOption(_))
        ));
    }

    #[test]
    fn test_abro_version_split() {
        let mut opt = vec![35, 3, 0x00, 0x02, 0x00, 0x01, 0x00, 0x0a];
        opt.extend_from_slice(&"2001:db8::1".parse::<Ipv6Addr>().unwrap().octets());
        let options = NdOptions::parse(&opt).unwrap();
        let abro = options.abro.unwrap();

        assert_eq!(abro.version, 0x0001_0002);
        assert_eq!(abro.lifetime, 10);
        assert_eq!(abro.address, "2001:db8::1".parse::<Ipv6Addr>().unwrap());

        let mut written = Vec::new();
        options.write(&mut written);
        assert_eq!(written, opt);
    }

    #[test]
    fn test_draft_aro_type_131() {
        let mut opt = vec![131, 2, 0, 0, 0, 0, 0, 10];
        opt.extend_from_slice(&NODE_EUI.0);

        assert_eq!(NdOptions::parse(&opt).unwrap().aro, None);

        let options = NdOptions::parse_with(&opt, OptionNumbering::Draft).unwrap();
        let aro = options.aro.unwrap();
        assert_eq!(aro.lifetime, 10);
        assert_eq!(aro.eui64, NODE_EUI);

        let mut written = Vec::new();
        options.write_with(&mut written, OptionNumbering::Draft);
        assert_eq!(written, opt);
    }

    #[test]
    fn test_type_33_depends_on_numbering() {
        // 33 is the RFC ARO and the draft ABRO
        let mut aro = vec![33, 2, 0, 0, 0, 0, 0, 10];
        aro.extend_from_slice(&NODE_EUI.0);
        assert!(NdOptions::parse(&aro).unwrap().aro.is_some());
        assert!(matches!(
            NdOptions::parse_with(&aro, OptionNumbering::Draft),
            Err(Error::MalformedOption(_))
        ));

        let mut abro = vec![33, 3, 0x00, 0x02, 0x00, 0x00, 0x00, 0x0a];
        abro.extend_from_slice(&"2001:db8::1".parse::<Ipv6Addr>().unwrap().octets());
        let options = NdOptions::parse_with(&abro, OptionNumbering::Draft).unwrap();
        assert_eq!(options.abro.unwrap().version, 2);
        assert!(options.aro.is_none());
    }

    #[test]
    fn test_draft_6co_and_rfc_34_ignored() {
        let opt = [32, 2, 64, 0x11, 0, 0, 0x00, 0x3c, 0x20, 0x01, 0x0d, 0xb8, 0, 0, 0, 0];
        let options = NdOptions::parse_with(&opt, OptionNumbering::Draft).unwrap();
        assert_eq!(options.contexts[0].context_id, 1);

        let mut rfc = opt;
        rfc[0] = 34;
        assert!(NdOptions::parse_with(&rfc, OptionNumbering::Draft)
            .unwrap()
            .contexts
            .is_empty());
    }

    #[test]
    fn test_aro_reply_in_draft_numbering() {
        let aro = AddressRegistration::new(AroStatus::Success, 5, NODE_EUI);
        let na = NeighborAdvertisement::aro_reply("2001:db8::1".parse().unwrap(), aro);
        let bytes = na.to_bytes_with(OptionNumbering::Draft);
        assert_eq!(&bytes[24..26], &[131, 2]);

        let parsed = NeighborAdvertisement::parse_with(&bytes[4..], OptionNumbering::Draft).unwrap();
        assert_eq!(parsed, na);
        assert_eq!(NdpOptionType::AuthoritativeBorderRouter.code(OptionNumbering::Draft), 33);
        assert_eq!(NdpOptionType::SixLowpanContext.code(OptionNumbering::Rfc6775), 34);
    }

    #[test]
    fn test_ra_parse_with_options() {
        let mut body = vec![
            64, 0x00, 0x07, 0x08, // hop limit, flags, lifetime 1800
            0x00, 0x00, 0x75, 0x30, // reachable 30000 ms
            0x00, 0x00, 0x03, 0xe8, // retrans 1000 ms
            0x05, 0x01, 0x00, 0x00, 0x00, 0x00, 0x05, 0x00, // MTU 1280
            0x03, 0x04, 64, 0xc0, // PIO /64 L A
            0x00, 0x00, 0x0e, 0x10, 0x00, 0x00, 0x07, 0x08, 0x00, 0x00, 0x00, 0x00,
        ];
        body.extend_from_slice(&"2001:db8::".parse::<Ipv6Addr>().unwrap().octets());

        let ra = RouterAdvertisement::parse(&body).unwrap();
        assert_eq!(ra.cur_hop_limit, 64);
        assert_eq!(ra.router_lifetime, 1800);
        assert_eq!(ra.reachable_time, 30000);
        assert_eq!(ra.retrans_timer, 1000);
        assert_eq!(ra.options.mtu, Some(1280));

        let pio = &ra.options.prefixes[0];
        assert_eq!(pio.prefix_len, 64);
        assert!(pio.on_link && pio.autonomous);
        assert_eq!(pio.valid_lifetime, 3600);
        assert_eq!(pio.preferred_lifetime, 1800);

        assert_eq!(&ra.to_bytes()[4..], &body[..]);
    }

    #[test]
    fn test_rs_with_eui64_sllao() {
        let rs = RouterSolicitation {
            options: NdOptions {
                source_link_addr: Some(LinkAddr::Eui64(NODE_EUI)),
                ..NdOptions::default()
            },
        };
        let bytes = rs.to_bytes();
        assert_eq!(bytes.len(), RS_MSG_SIZE + 16);

        let parsed = RouterSolicitation::parse(&bytes[4..]).unwrap();
        assert_eq!(parsed.options.source_link_addr.unwrap().eui64(), NODE_EUI);
    }

    #[test]
    fn test_options_zero_length_rejected() {
        let options = [0x01, 0x00, 0x02, 0x01, 0xaa, 0xbb, 0xcc, 0xdd, 0xee, 0xff];
        assert!(NdOptions::parse(&options).is_err());
    }

    #[test]
    fn test_options_truncated_rejected() {
        let options = [0x01, 0x02, 0x00, 0x11, 0x22, 0x33];
        assert!(NdOptions::parse(&options).is_err());
    }

    #[test]
    fn test_options_unknown_type_skipped() {
        let options = [
            0x1f, 0x01, 0, 0, 0, 0, 0, 0, // unknown
            0x02, 0x01, 0x11, 0x22, 0x33, 0x44, 0x55, 0x66,
        ];
        let parsed = NdOptions::parse(&options).unwrap();
        assert_eq!(
            parsed.target_link_addr,
            Some(LinkAddr::Mac(MacAddr([0x11, 0x22, 0x33, 0x44, 0x55, 0x66])))
        );
    }

    #[test]
    fn test_link_addr_mac_expands_to_eui64() {
        let lladdr = LinkAddr::Mac(MacAddr([0x00, 0x11, 0x22, 0x33, 0x44, 0x55]));
        assert_eq!(
            lladdr.eui64(),
            Eui64([0x00, 0x11, 0x22, 0xff, 0xfe, 0x33, 0x44, 0x55])
        );
    }

    #[test]
    fn test_nd_message_dispatch() {
        let data = make_na_packet();
        let icmp = Icmpv6Packet::parse(&data).unwrap();
        assert!(matches!(
            NdMessage::parse(&icmp).unwrap(),
            Some(NdMessage::NeighborAdvertisement(_))
        ));

        let echo = [128u8, 0, 0, 0, 0, 1, 0, 1];
        let icmp = Icmpv6Packet::parse(&echo).unwrap();
        assert!(NdMessage::parse(&icmp).unwrap().is_none());
    }

    #[test]
    fn test_nd_message_nonzero_code_rejected() {
        let mut data = make_na_packet();
        data[1] = 1;
        let icmp = Icmpv6Packet::parse(&data).unwrap();
        assert!(NdMessage::parse(&icmp).is_err());
    }

    #[test]
    fn test_checksum_set_and_validate() {
        let src: Ipv6Addr = "fe80::1".parse().unwrap();
        let dst: Ipv6Addr = "fe80::2".parse().unwrap();
        let mut bytes = make_ns_with_aro();

        set_checksum(&mut bytes, &src, &dst);
        assert!(validate_checksum(&src, &dst, &bytes));

        bytes[2] ^= 0xFF;
        assert!(!validate_checksum(&src, &dst, &bytes));
    }
}
