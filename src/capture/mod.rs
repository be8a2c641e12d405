//! Packet capture
//!
//! Both links are served by AF_PACKET sockets:
//! - Ethernet: raw socket, frames carry the Ethernet header
//! - Mesh: datagram socket on the lowpan interface, the kernel strips the
//!   802.15.4 header and hands over decompressed IPv6

mod af_packet;

pub use af_packet::{AfPacketSocket, SocketMode};

use crate::protocol::LinkLayer;
use crate::Result;
use std::future::Future;

/// Information about a received packet
#[derive(Debug, Clone)]
pub struct RxInfo {
    /// Number of bytes received
    pub len: usize,
    /// The packet is a copy of one this host sent
    pub outgoing: bool,
}

/// Packet capture backend trait
pub trait Capture: Send + Sync {
    /// Receive a packet into the provided buffer
    fn recv(&mut self, buf: &mut [u8]) -> impl Future<Output = Result<RxInfo>> + Send;

    /// Send a packet; `link_dst` is required in datagram mode
    fn send(
        &mut self,
        buf: &[u8],
        link_dst: Option<&[u8]>,
    ) -> impl Future<Output = Result<usize>> + Send;
}

impl From<LinkLayer> for SocketMode {
    fn from(link: LinkLayer) -> Self {
        match link {
            LinkLayer::Ethernet => SocketMode::Raw,
            LinkLayer::Lowpan => SocketMode::Datagram,
        }
    }
}
