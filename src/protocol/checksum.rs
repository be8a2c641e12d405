//! Checksum service - RFC 1071 Internet checksum and upper-layer pseudo-headers
//!
//! All functions work on network-order byte slices and return host-order
//! values; callers write results with `to_be_bytes()`. Derived checksums
//! (header and upper-layer) never return 0: a zero result is sent as 0xFFFF.

use std::net::{Ipv4Addr, Ipv6Addr};

/// IANA protocol numbers used in pseudo-headers
pub const PROTO_TCP: u8 = 6;
pub const PROTO_UDP: u8 = 17;
pub const PROTO_ICMPV6: u8 = 58;

/// 32-bit big-endian addition of a 16-bit operand
///
/// Used for sequence-number style arithmetic on 4-byte wire fields.
pub fn add32(op32: [u8; 4], op16: u16) -> [u8; 4] {
    u32::from_be_bytes(op32)
        .wrapping_add(op16 as u32)
        .to_be_bytes()
}

/// One's-complement sum of `data` (16-bit big-endian words) starting at `initial`
///
/// An odd trailing byte is padded with zero. The result is not inverted.
pub fn ones_complement_sum(initial: u16, data: &[u8]) -> u16 {
    let mut sum = initial as u64;

    let mut chunks = data.chunks_exact(2);
    for chunk in &mut chunks {
        sum += u16::from_be_bytes([chunk[0], chunk[1]]) as u64;
    }
    if let [last] = chunks.remainder() {
        sum += u16::from_be_bytes([*last, 0]) as u64;
    }

    fold(sum)
}

fn fold(mut sum: u64) -> u16 {
    while sum >> 16 != 0 {
        sum = (sum & 0xFFFF) + (sum >> 16);
    }
    sum as u16
}

/// Internet checksum over an arbitrary byte range
///
/// Writing the result into a zeroed, even-aligned field of `data` makes the
/// checksum of the whole range 0.
pub fn internet_checksum(data: &[u8]) -> u16 {
    !ones_complement_sum(0, data)
}

/// Complement a sum, reporting zero as 0xFFFF
fn finish(sum: u16) -> u16 {
    match !sum {
        0 => 0xFFFF,
        checksum => checksum,
    }
}

/// Checksum of an IP header (checksum field zeroed by the caller)
pub fn ipv4_header_checksum(header: &[u8]) -> u16 {
    finish(ones_complement_sum(0, header))
}

/// Sum of the IPv6 pseudo-header (RFC 8200 §8.1)
pub fn ipv6_pseudo_header_sum(
    src: &Ipv6Addr,
    dst: &Ipv6Addr,
    upper_layer_len: u32,
    next_header: u8,
) -> u16 {
    let mut sum = ones_complement_sum(0, &src.octets());
    sum = ones_complement_sum(sum, &dst.octets());
    sum = ones_complement_sum(sum, &upper_layer_len.to_be_bytes());
    ones_complement_sum(sum, &[0, 0, 0, next_header])
}

/// Sum of the IPv4 pseudo-header (RFC 768/793)
pub fn ipv4_pseudo_header_sum(src: &Ipv4Addr, dst: &Ipv4Addr, protocol: u8, len: u16) -> u16 {
    let mut sum = ones_complement_sum(0, &src.octets());
    sum = ones_complement_sum(sum, &dst.octets());
    sum = ones_complement_sum(sum, &[0, protocol]);
    ones_complement_sum(sum, &len.to_be_bytes())
}

/// Upper-layer checksum over an IPv6 pseudo-header and `payload`
///
/// The checksum field inside `payload` must be zero.
pub fn upper_layer_checksum_v6(
    src: &Ipv6Addr,
    dst: &Ipv6Addr,
    next_header: u8,
    payload: &[u8],
) -> u16 {
    let pseudo = ipv6_pseudo_header_sum(src, dst, payload.len() as u32, next_header);
    finish(ones_complement_sum(pseudo, payload))
}

/// Upper-layer checksum over an IPv4 pseudo-header and `payload`
pub fn upper_layer_checksum_v4(
    src: &Ipv4Addr,
    dst: &Ipv4Addr,
    protocol: u8,
    payload: &[u8],
) -> u16 {
    let pseudo = ipv4_pseudo_header_sum(src, dst, protocol, payload.len() as u16);
    finish(ones_complement_sum(pseudo, payload))
}

pub fn icmpv6_checksum(src: &Ipv6Addr, dst: &Ipv6Addr, payload: &[u8]) -> u16 {
    upper_layer_checksum_v6(src, dst, PROTO_ICMPV6, payload)
}

pub fn udp_checksum_v6(src: &Ipv6Addr, dst: &Ipv6Addr, payload: &[u8]) -> u16 {
    upper_layer_checksum_v6(src, dst, PROTO_UDP, payload)
}

pub fn tcp_checksum_v6(src: &Ipv6Addr, dst: &Ipv6Addr, payload: &[u8]) -> u16 {
    upper_layer_checksum_v6(src, dst, PROTO_TCP, payload)
}

pub fn udp_checksum_v4(src: &Ipv4Addr, dst: &Ipv4Addr, payload: &[u8]) -> u16 {
    upper_layer_checksum_v4(src, dst, PROTO_UDP, payload)
}

pub fn tcp_checksum_v4(src: &Ipv4Addr, dst: &Ipv4Addr, payload: &[u8]) -> u16 {
    upper_layer_checksum_v4(src, dst, PROTO_TCP, payload)
}

/// Verify an upper-layer checksum already present in `payload`
pub fn verify_v6(src: &Ipv6Addr, dst: &Ipv6Addr, next_header: u8, payload: &[u8]) -> bool {
    let pseudo = ipv6_pseudo_header_sum(src, dst, payload.len() as u32, next_header);
    ones_complement_sum(pseudo, payload) == 0xFFFF
}

pub fn verify_icmpv6(src: &Ipv6Addr, dst: &Ipv6Addr, payload: &[u8]) -> bool {
    verify_v6(src, dst, PROTO_ICMPV6, payload)
}
