//! IPv6 protocol - RFC 8200

use crate::{Error, Result};
use std::net::Ipv6Addr;

/// IPv6 header size (fixed, unlike IPv4)
pub const HEADER_SIZE: usize = 40;

/// Hop limit required on all Neighbor Discovery messages (RFC 4861 §6.1)
pub const ND_HOP_LIMIT: u8 = 255;

/// IPv6 next header values
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum NextHeader {
    HopByHop = 0,
    Tcp = 6,
    Udp = 17,
    Routing = 43,
    Fragment = 44,
    Icmpv6 = 58,
    NoNextHeader = 59,
    DestinationOptions = 60,
}

impl NextHeader {
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(NextHeader::HopByHop),
            6 => Some(NextHeader::Tcp),
            17 => Some(NextHeader::Udp),
            43 => Some(NextHeader::Routing),
            44 => Some(NextHeader::Fragment),
            58 => Some(NextHeader::Icmpv6),
            59 => Some(NextHeader::NoNextHeader),
            60 => Some(NextHeader::DestinationOptions),
            _ => None,
        }
    }

    /// Extension headers that use the generic (next, hdr-ext-len) layout
    fn is_skippable_extension(value: u8) -> bool {
        matches!(value, 0 | 43 | 60)
    }
}

/// Read a 16-byte address at `offset`; caller guarantees the bounds
fn addr_at(buffer: &[u8], offset: usize) -> Ipv6Addr {
    let mut octets = [0u8; 16];
    octets.copy_from_slice(&buffer[offset..offset + 16]);
    Ipv6Addr::from(octets)
}

/// Parsed IPv6 header (zero-copy reference)
#[derive(Debug)]
pub struct Ipv6Header<'a> {
    buffer: &'a [u8],
}

impl<'a> Ipv6Header<'a> {
    pub fn parse(buffer: &'a [u8]) -> Result<Self> {
        if buffer.len() < HEADER_SIZE {
            return Err(Error::Parse("IPv6 header too short".into()));
        }

        let version = buffer[0] >> 4;
        if version != 6 {
            return Err(Error::Parse("not an IPv6 packet".into()));
        }

        let payload_length = u16::from_be_bytes([buffer[4], buffer[5]]) as usize;
        if buffer.len() < HEADER_SIZE + payload_length {
            return Err(Error::Parse("IPv6 payload truncated".into()));
        }

        Ok(Self { buffer })
    }

    pub fn version(&self) -> u8 {
        self.buffer[0] >> 4
    }

    /// Traffic Class (4 bits from byte 0, 4 bits from byte 1)
    pub fn traffic_class(&self) -> u8 {
        ((self.buffer[0] & 0x0F) << 4) | (self.buffer[1] >> 4)
    }

    /// Flow Label (20 bits)
    pub fn flow_label(&self) -> u32 {
        let b1 = (self.buffer[1] & 0x0F) as u32;
        let b2 = self.buffer[2] as u32;
        let b3 = self.buffer[3] as u32;
        (b1 << 16) | (b2 << 8) | b3
    }

    /// Payload Length (does not include header)
    pub fn payload_length(&self) -> u16 {
        u16::from_be_bytes([self.buffer[4], self.buffer[5]])
    }

    pub fn next_header(&self) -> u8 {
        self.buffer[6]
    }

    pub fn hop_limit(&self) -> u8 {
        self.buffer[7]
    }

    pub fn src_addr(&self) -> Ipv6Addr {
        addr_at(self.buffer, 8)
    }

    pub fn dst_addr(&self) -> Ipv6Addr {
        addr_at(self.buffer, 24)
    }

    /// Payload as announced by the header; link padding is cut off
    pub fn payload(&self) -> &[u8] {
        &self.buffer[HEADER_SIZE..HEADER_SIZE + self.payload_length() as usize]
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.buffer[..HEADER_SIZE]
    }
}

/// Walk hop-by-hop, routing and destination-options headers
///
/// Returns the upper-layer protocol and the number of extension-header bytes
/// in front of it. A fragment header ends the walk: fragments are not
/// reassembled here.
pub fn skip_extension_headers(next_header: u8, payload: &[u8]) -> Result<(u8, usize)> {
    let mut next = next_header;
    let mut offset = 0;

    while NextHeader::is_skippable_extension(next) {
        if payload.len() < offset + 2 {
            return Err(Error::Parse("extension header truncated".into()));
        }
        let len = (payload[offset + 1] as usize + 1) * 8;
        if payload.len() < offset + len {
            return Err(Error::Parse("extension header truncated".into()));
        }
        next = payload[offset];
        offset += len;
    }

    Ok((next, offset))
}

/// Builder for constructing IPv6 packets
#[derive(Debug, Clone)]
pub struct Ipv6Builder {
    traffic_class: u8,
    flow_label: u32,
    next_header: u8,
    hop_limit: u8,
    src_addr: Ipv6Addr,
    dst_addr: Ipv6Addr,
    payload: Vec<u8>,
}

impl Ipv6Builder {
    pub fn new() -> Self {
        Self {
            traffic_class: 0,
            flow_label: 0,
            next_header: NextHeader::NoNextHeader as u8,
            hop_limit: 64,
            src_addr: Ipv6Addr::UNSPECIFIED,
            dst_addr: Ipv6Addr::UNSPECIFIED,
            payload: Vec::new(),
        }
    }

    pub fn traffic_class(mut self, tc: u8) -> Self {
        self.traffic_class = tc;
        self
    }

    pub fn flow_label(mut self, fl: u32) -> Self {
        self.flow_label = fl & 0xFFFFF;
        self
    }

    pub fn next_header(mut self, nh: u8) -> Self {
        self.next_header = nh;
        self
    }

    pub fn hop_limit(mut self, hl: u8) -> Self {
        self.hop_limit = hl;
        self
    }

    pub fn src_addr(mut self, addr: Ipv6Addr) -> Self {
        self.src_addr = addr;
        self
    }

    pub fn dst_addr(mut self, addr: Ipv6Addr) -> Self {
        self.dst_addr = addr;
        self
    }

    pub fn payload(mut self, payload: &[u8]) -> Self {
        self.payload = payload.to_vec();
        self
    }

    pub fn build(self) -> Vec<u8> {
        let payload_length = self.payload.len() as u16;
        let mut buffer = Vec::with_capacity(HEADER_SIZE + self.payload.len());

        buffer.push(0x60 | (self.traffic_class >> 4));
        buffer.push(((self.traffic_class & 0x0F) << 4) | ((self.flow_label >> 16) as u8 & 0x0F));
        buffer.push((self.flow_label >> 8) as u8);
        buffer.push(self.flow_label as u8);
        buffer.extend_from_slice(&payload_length.to_be_bytes());
        buffer.push(self.next_header);
        buffer.push(self.hop_limit);
        buffer.extend_from_slice(&self.src_addr.octets());
        buffer.extend_from_slice(&self.dst_addr.octets());
        buffer.extend_from_slice(&self.payload);

        buffer
    }
}

impl Default for Ipv6Builder {
    fn default() -> Self {
        Self::new()
    }
}

/// Solicited-node multicast address ff02::1:ffXX:XXXX (RFC 4291 §2.7.1)
pub fn solicited_node(addr: &Ipv6Addr) -> Ipv6Addr {
    let o = addr.octets();
    Ipv6Addr::new(
        0xff02,
        0,
        0,
        0,
        0,
        1,
        0xff00 | o[13] as u16,
        u16::from_be_bytes([o[14], o[15]]),
    )
}

/// fe80::/10
pub fn is_link_local(addr: &Ipv6Addr) -> bool {
    addr.segments()[0] & 0xffc0 == 0xfe80
}

/// Keep the first `len` bits of `addr`
pub fn mask_prefix(addr: &Ipv6Addr, len: u8) -> Ipv6Addr {
    let len = len.min(128) as u32;
    let bits = u128::from(*addr);
    let mask = if len == 0 { 0 } else { u128::MAX << (128 - len) };
    Ipv6Addr::from(bits & mask)
}
