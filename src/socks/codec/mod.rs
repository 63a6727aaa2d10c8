//! SOCKS5 wire codec
//!
//! Pure encode/decode routines for every message the client exchanges with
//! the proxy. Nothing here performs I/O; the control session and the packet
//! connection feed these functions complete buffers.

mod command;
mod handshake;
mod udp;

pub use command::{command_reply_len, decode_command_reply, encode_command_request};
pub use handshake::{
    decode_auth_reply, decode_method_selection, encode_greeting, encode_user_pass_auth,
};
pub use udp::{decode_udp_header, encode_udp_header, encode_udp_packet};

use super::consts::*;
use super::types::TargetAddr;
use crate::error::{Result, Socks5Error};
use bytes::{Buf, BufMut, BytesMut};
use std::net::{Ipv4Addr, Ipv6Addr};

/// Append `ATYP | ADDR | PORT` for `target`
///
/// Domain names must be 1..=255 bytes; they are rejected before anything is
/// written.
pub fn encode_address(target: &TargetAddr, buf: &mut BytesMut) -> Result<()> {
    target.validate()?;
    buf.reserve(target.encoded_len());

    match target {
        TargetAddr::Ip(std::net::SocketAddr::V4(addr)) => {
            buf.put_u8(SOCKS5_ADDR_TYPE_IPV4);
            buf.put_slice(&addr.ip().octets());
            buf.put_u16(addr.port());
        }
        TargetAddr::Ip(std::net::SocketAddr::V6(addr)) => {
            buf.put_u8(SOCKS5_ADDR_TYPE_IPV6);
            buf.put_slice(&addr.ip().octets());
            buf.put_u16(addr.port());
        }
        TargetAddr::Domain(domain, port) => {
            buf.put_u8(SOCKS5_ADDR_TYPE_DOMAIN);
            buf.put_u8(domain.len() as u8);
            buf.put_slice(domain.as_bytes());
            buf.put_u16(*port);
        }
    }

    Ok(())
}

/// Decode `ATYP | ADDR | PORT` from the start of `buf`
///
/// Returns the address and the number of bytes consumed.
pub fn decode_address(buf: &[u8]) -> Result<(TargetAddr, usize)> {
    let atyp = *buf
        .first()
        .ok_or_else(|| Socks5Error::violation("missing address type"))?;
    let mut rest = &buf[1..];

    match atyp {
        SOCKS5_ADDR_TYPE_IPV4 => {
            if rest.len() < 4 + 2 {
                return Err(Socks5Error::violation("buffer too short for IPv4 address"));
            }
            let mut octets = [0u8; 4];
            rest.copy_to_slice(&mut octets);
            let port = rest.get_u16();
            Ok((TargetAddr::ipv4(Ipv4Addr::from(octets), port), 1 + 4 + 2))
        }

        SOCKS5_ADDR_TYPE_IPV6 => {
            if rest.len() < 16 + 2 {
                return Err(Socks5Error::violation("buffer too short for IPv6 address"));
            }
            let mut octets = [0u8; 16];
            rest.copy_to_slice(&mut octets);
            let port = rest.get_u16();
            Ok((TargetAddr::ipv6(Ipv6Addr::from(octets), port), 1 + 16 + 2))
        }

        SOCKS5_ADDR_TYPE_DOMAIN => {
            if rest.is_empty() {
                return Err(Socks5Error::violation("buffer too short for domain length"));
            }
            let len = rest.get_u8() as usize;
            if rest.len() < len + 2 {
                return Err(Socks5Error::violation("buffer too short for domain name"));
            }
            let domain = std::str::from_utf8(&rest[..len])
                .map_err(|_| Socks5Error::violation("invalid UTF-8 in domain name"))?
                .to_string();
            rest.advance(len);
            let port = rest.get_u16();
            Ok((TargetAddr::domain(domain, port), 1 + 1 + len + 2))
        }

        other => Err(Socks5Error::UnsupportedAddressFamily(other)),
    }
}
