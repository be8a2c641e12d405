//! Network protocol implementations
//!
//! Wire codecs for the two links the gateway sits on: Ethernet II framing,
//! IPv6, and ICMPv6 Neighbor Discovery with the 6LoWPAN-ND options.

pub mod buffer;
pub mod checksum;
pub mod ethernet;
pub mod icmpv6;
pub mod ipv6;
pub mod types;

pub use buffer::{LinkLayer, PacketBuf};
pub use types::*;
