//! Packet buffer view with link-header and extension-header offsets

use super::ethernet::{self, Frame};
use super::icmpv6::Icmpv6Packet;
use super::ipv6::{self, Ipv6Header};
use super::EtherType;
use crate::{Error, Result};

/// Link layer a frame was received on
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkLayer {
    /// Ethernet II, 14-byte header
    Ethernet,
    /// Linux lowpan interface: the kernel hands over decompressed IPv6
    Lowpan,
}

impl LinkLayer {
    pub fn header_len(self) -> usize {
        match self {
            LinkLayer::Ethernet => ethernet::HEADER_SIZE,
            LinkLayer::Lowpan => 0,
        }
    }
}

/// Read-only view of a received IPv6 frame
///
/// `llh_len` bytes of link header precede the IPv6 header; `ext_len` bytes of
/// extension headers sit between the IPv6 header and the upper layer.
#[derive(Debug)]
pub struct PacketBuf<'a> {
    data: &'a [u8],
    link: LinkLayer,
    ext_len: usize,
    payload_len: usize,
    upper_protocol: u8,
}

impl<'a> PacketBuf<'a> {
    pub fn parse(data: &'a [u8], link: LinkLayer) -> Result<Self> {
        if link == LinkLayer::Ethernet {
            let frame = Frame::parse(data)?;
            if frame.ethertype() != EtherType::Ipv6 as u16 {
                return Err(Error::InvalidPacket(format!(
                    "ethertype 0x{:04x} is not IPv6",
                    frame.ethertype()
                )));
            }
        }

        let ip = Ipv6Header::parse(&data[link.header_len()..])?;
        let (upper_protocol, ext_len) = ipv6::skip_extension_headers(ip.next_header(), ip.payload())?;

        Ok(Self {
            data,
            link,
            ext_len,
            payload_len: ip.payload_length() as usize,
            upper_protocol,
        })
    }

    pub fn link(&self) -> LinkLayer {
        self.link
    }

    pub fn llh_len(&self) -> usize {
        self.link.header_len()
    }

    pub fn ext_len(&self) -> usize {
        self.ext_len
    }

    /// Ethernet header view; `None` on the lowpan interface
    pub fn frame(&self) -> Option<Frame<'a>> {
        match self.link {
            LinkLayer::Ethernet => Frame::parse(self.data).ok(),
            LinkLayer::Lowpan => None,
        }
    }

    pub fn ip(&self) -> Result<Ipv6Header<'a>> {
        Ipv6Header::parse(&self.data[self.llh_len()..])
    }

    /// Protocol number after the extension headers
    pub fn upper_protocol(&self) -> u8 {
        self.upper_protocol
    }

    /// Upper-layer bytes, bounded by the IPv6 payload length
    pub fn upper_layer(&self) -> &'a [u8] {
        let start = self.llh_len() + ipv6::HEADER_SIZE;
        &self.data[start + self.ext_len..start + self.payload_len]
    }

    pub fn icmpv6(&self) -> Result<Icmpv6Packet<'a>> {
        if self.upper_protocol != ipv6::NextHeader::Icmpv6 as u8 {
            return Err(Error::InvalidPacket("not ICMPv6".into()));
        }
        Icmpv6Packet::parse(self.upper_layer())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::ethernet::FrameBuilder;
    use crate::protocol::ipv6::{Ipv6Builder, NextHeader};
    use crate::protocol::MacAddr;

    fn rs_packet(next_header: u8, ext: &[u8]) -> Vec<u8> {
        let mut payload = ext.to_vec();
        payload.extend_from_slice(&[0x85, 0, 0, 0, 0, 0, 0, 0]);
        Ipv6Builder::new()
            .src_addr("fe80::1".parse().unwrap())
            .dst_addr("ff02::2".parse().unwrap())
            .hop_limit(255)
            .next_header(next_header)
            .payload(&payload)
            .build()
    }

    #[test]
    fn test_lowpan_has_no_link_header() {
        let packet = rs_packet(NextHeader::Icmpv6 as u8, &[]);
        let buf = PacketBuf::parse(&packet, LinkLayer::Lowpan).unwrap();

        assert_eq!(buf.llh_len(), 0);
        assert_eq!(buf.ext_len(), 0);
        assert!(buf.frame().is_none());
        assert_eq!(buf.icmpv6().unwrap().msg_type(), 133);
    }

    #[test]
    fn test_ethernet_frame_offsets() {
        let packet = rs_packet(NextHeader::Icmpv6 as u8, &[]);
        let frame = FrameBuilder::new()
            .dst_mac(MacAddr([0x33, 0x33, 0, 0, 0, 2]))
            .src_mac(MacAddr([0x02, 0, 0, 0, 0, 1]))
            .ethertype(EtherType::Ipv6 as u16)
            .payload(&packet)
            .build();

        let buf = PacketBuf::parse(&frame, LinkLayer::Ethernet).unwrap();
        assert_eq!(buf.llh_len(), 14);
        assert_eq!(buf.frame().unwrap().src_mac(), MacAddr([0x02, 0, 0, 0, 0, 1]));
        assert_eq!(buf.ip().unwrap().hop_limit(), 255);
        assert_eq!(buf.upper_layer().len(), 8);
    }

    #[test]
    fn test_hop_by_hop_is_skipped() {
        let hbh = [NextHeader::Icmpv6 as u8, 0, 5, 2, 0, 0, 1, 0]; // router alert
        let packet = rs_packet(NextHeader::HopByHop as u8, &hbh);
        let buf = PacketBuf::parse(&packet, LinkLayer::Lowpan).unwrap();

        assert_eq!(buf.ext_len(), 8);
        assert_eq!(buf.upper_protocol(), 58);
        assert_eq!(buf.icmpv6().unwrap().msg_type(), 133);
    }

    #[test]
    fn test_non_ipv6_ethertype_rejected() {
        let frame = FrameBuilder::new()
            .dst_mac(MacAddr::BROADCAST)
            .src_mac(MacAddr([0x02, 0, 0, 0, 0, 1]))
            .ethertype(EtherType::Arp as u16)
            .payload(&[0u8; 28])
            .build();
        assert!(PacketBuf::parse(&frame, LinkLayer::Ethernet).is_err());
    }

    #[test]
    fn test_non_icmp_upper_layer() {
        let packet = Ipv6Builder::new()
            .next_header(NextHeader::Udp as u8)
            .payload(&[0u8; 8])
            .build();
        let buf = PacketBuf::parse(&packet, LinkLayer::Lowpan).unwrap();
        assert!(buf.icmpv6().is_err());
    }
}
