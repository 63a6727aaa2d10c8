//! UDP relay datagram header
//!
//! ```text
//! +----+------+------+----------+----------+----------+
//! |RSV | FRAG | ATYP | DST.ADDR | DST.PORT |   DATA   |
//! +----+------+------+----------+----------+----------+
//! | 2  |  1   |  1   | Variable |    2     | Variable |
//! +----+------+------+----------+----------+----------+
//! ```
//!
//! Only standalone datagrams (FRAG = 0) are produced or accepted, and the
//! receive path only understands IPv4 sender addresses.

use super::encode_address;
use crate::error::{Result, Socks5Error};
use crate::socks::consts::*;
use crate::socks::types::TargetAddr;
use bytes::{Buf, BufMut, Bytes, BytesMut};
use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4};

/// Append the datagram header addressed to `target`
pub fn encode_udp_header(target: &TargetAddr, buf: &mut BytesMut) -> Result<()> {
    target.validate()?;
    buf.reserve(3 + target.encoded_len());
    buf.put_u16(0); // RSV
    buf.put_u8(0); // FRAG
    encode_address(target, buf)
}

/// Build a complete datagram: header for `target` followed by `payload`
pub fn encode_udp_packet(target: &TargetAddr, payload: &[u8]) -> Result<Bytes> {
    let mut buf = BytesMut::with_capacity(3 + target.encoded_len() + payload.len());
    encode_udp_header(target, &mut buf)?;
    buf.put_slice(payload);
    Ok(buf.freeze())
}

/// Decode a datagram header
///
/// Returns the sender address and the header length; the payload is
/// `&buf[len..]`.
pub fn decode_udp_header(buf: &[u8]) -> Result<(SocketAddr, usize)> {
    if buf.len() < 4 {
        return Err(Socks5Error::violation(format!(
            "UDP datagram too short: {} bytes",
            buf.len()
        )));
    }

    let mut cursor = buf;
    let rsv = cursor.get_u16();
    if rsv != 0 {
        return Err(Socks5Error::violation(format!("invalid RSV field: {:#06x}", rsv)));
    }

    let frag = cursor.get_u8();
    if frag != 0 {
        return Err(Socks5Error::FragmentationUnsupported(frag));
    }

    let atyp = cursor.get_u8();
    if atyp != SOCKS5_ADDR_TYPE_IPV4 {
        return Err(Socks5Error::UnsupportedAddressFamily(atyp));
    }

    if buf.len() < UDP_HEADER_IPV4_LEN {
        return Err(Socks5Error::violation(format!(
            "UDP header too short for IPv4 address: {} bytes",
            buf.len()
        )));
    }

    let mut octets = [0u8; 4];
    cursor.copy_to_slice(&mut octets);
    let port = cursor.get_u16();

    Ok((
        SocketAddr::V4(SocketAddrV4::new(Ipv4Addr::from(octets), port)),
        UDP_HEADER_IPV4_LEN,
    ))
}
