//! Command request and reply messages
//!
//! ```text
//! +----+-----+-------+------+----------+----------+
//! |VER | CMD |  RSV  | ATYP | DST.ADDR | DST.PORT |
//! +----+-----+-------+------+----------+----------+
//! | 1  |  1  | X'00' |  1   | Variable |    2     |
//! +----+-----+-------+------+----------+----------+
//!
//! +----+-----+-------+------+----------+----------+
//! |VER | REP |  RSV  | ATYP | BND.ADDR | BND.PORT |
//! +----+-----+-------+------+----------+----------+
//! | 1  |  1  | X'00' |  1   | Variable |    2     |
//! +----+-----+-------+------+----------+----------+
//! ```

use super::{decode_address, encode_address};
use crate::error::{ReplyCode, Result, Socks5Error};
use crate::socks::consts::*;
use crate::socks::types::{SocksCommand, TargetAddr};
use bytes::{BufMut, Bytes, BytesMut};

/// Encode a command request
///
/// CONNECT targets must carry a non-zero port. BIND and UDP ASSOCIATE
/// requests carry a hint where the all-zero address and port mean "any".
pub fn encode_command_request(command: SocksCommand, target: &TargetAddr) -> Result<Bytes> {
    if command == SocksCommand::Connect {
        target.validate_target()?;
    }

    let mut buf = BytesMut::with_capacity(3 + target.encoded_len());
    buf.put_u8(SOCKS5_VERSION);
    buf.put_u8(command.to_byte());
    buf.put_u8(SOCKS5_RESERVED);
    encode_address(target, &mut buf)?;
    Ok(buf.freeze())
}

/// Compute the full length of a command reply from its first five bytes
///
/// The fifth byte is the first address byte, which for domain replies is the
/// name length.
pub fn command_reply_len(prefix: &[u8]) -> Result<usize> {
    if prefix.len() < REPLY_PREFIX_LEN {
        return Err(Socks5Error::violation(format!(
            "reply prefix too short: {}",
            prefix.len()
        )));
    }
    check_reply_header(prefix)?;

    match prefix[3] {
        SOCKS5_ADDR_TYPE_IPV4 => Ok(4 + 4 + 2),
        SOCKS5_ADDR_TYPE_IPV6 => Ok(4 + 16 + 2),
        SOCKS5_ADDR_TYPE_DOMAIN => Ok(4 + 1 + prefix[4] as usize + 2),
        // A refusal with a garbage address is still a refusal
        _ if prefix[1] != SOCKS5_REPLY_SUCCEEDED => {
            Err(Socks5Error::CommandFailed(ReplyCode::from(prefix[1])))
        }
        other => Err(Socks5Error::UnsupportedAddressFamily(other)),
    }
}

/// Decode a complete command reply and return the bound address
///
/// Any non-success status is returned as [`Socks5Error::CommandFailed`].
pub fn decode_command_reply(buf: &[u8]) -> Result<TargetAddr> {
    if buf.len() < 4 {
        return Err(Socks5Error::violation(format!(
            "unexpected reply size: {}",
            buf.len()
        )));
    }
    check_reply_header(buf)?;

    let status = ReplyCode::from(buf[1]);
    if !status.is_success() {
        return Err(Socks5Error::CommandFailed(status));
    }

    let (addr, used) = decode_address(&buf[3..])?;
    if 3 + used != buf.len() {
        return Err(Socks5Error::violation(format!(
            "unexpected reply size: {} (expected {})",
            buf.len(),
            3 + used
        )));
    }

    Ok(addr)
}

fn check_reply_header(buf: &[u8]) -> Result<()> {
    if buf[0] != SOCKS5_VERSION {
        return Err(Socks5Error::violation(format!(
            "unsupported SOCKS version in reply: {}",
            buf[0]
        )));
    }
    if buf[2] != SOCKS5_RESERVED {
        return Err(Socks5Error::violation(format!(
            "non-zero reserved byte in reply: {:#04x}",
            buf[2]
        )));
    }
    Ok(())
}
