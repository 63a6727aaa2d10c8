//! Method negotiation and username/password messages
//!
//! Implements the greeting of RFC 1928 and the sub-negotiation of RFC 1929,
//! seen from the client side.

use crate::error::{Result, Socks5Error};
use crate::socks::consts::*;
use crate::socks::types::Credentials;
use bytes::{BufMut, Bytes, BytesMut};

/// Encode the client greeting
///
/// ```text
/// +----+----------+----------+
/// |VER | NMETHODS | METHODS  |
/// +----+----------+----------+
/// | 1  |    1     | 1 to 255 |
/// +----+----------+----------+
/// ```
pub fn encode_greeting(methods: &[u8]) -> Result<Bytes> {
    if methods.is_empty() || methods.len() > 255 {
        return Err(Socks5Error::violation(format!(
            "greeting must carry 1..=255 methods, got {}",
            methods.len()
        )));
    }

    let mut buf = BytesMut::with_capacity(2 + methods.len());
    buf.put_u8(SOCKS5_VERSION);
    buf.put_u8(methods.len() as u8);
    buf.put_slice(methods);
    Ok(buf.freeze())
}

/// Decode the server's method selection and return the chosen method byte
///
/// 0xFF means the server accepted none of the offered methods.
pub fn decode_method_selection(buf: &[u8]) -> Result<u8> {
    if buf.len() != 2 {
        return Err(Socks5Error::violation(format!(
            "unexpected method selection size: {}",
            buf.len()
        )));
    }
    if buf[0] != SOCKS5_VERSION {
        return Err(Socks5Error::violation(format!(
            "unsupported SOCKS version in method selection: {}",
            buf[0]
        )));
    }
    if buf[1] == SOCKS5_AUTH_METHOD_NOT_ACCEPTABLE {
        return Err(Socks5Error::AuthMethodRejected);
    }
    Ok(buf[1])
}

/// Encode the username/password request
///
/// ```text
/// +----+------+----------+------+----------+
/// |VER | ULEN |  UNAME   | PLEN |  PASSWD  |
/// +----+------+----------+------+----------+
/// | 1  |  1   | 1 to 255 |  1   | 1 to 255 |
/// +----+------+----------+------+----------+
/// ```
pub fn encode_user_pass_auth(credentials: &Credentials) -> Result<Bytes> {
    credentials.validate()?;

    let username = credentials.username().as_bytes();
    let password = credentials.password().as_bytes();

    let mut buf = BytesMut::with_capacity(3 + username.len() + password.len());
    buf.put_u8(SOCKS5_AUTH_VERSION);
    buf.put_u8(username.len() as u8);
    buf.put_slice(username);
    buf.put_u8(password.len() as u8);
    buf.put_slice(password);
    Ok(buf.freeze())
}

/// Decode the username/password reply
///
/// ```text
/// +----+--------+
/// |VER | STATUS |
/// +----+--------+
/// | 1  |   1    |
/// +----+--------+
/// ```
pub fn decode_auth_reply(buf: &[u8]) -> Result<()> {
    if buf.len() != 2 {
        return Err(Socks5Error::violation(format!(
            "unexpected auth reply size: {}",
            buf.len()
        )));
    }
    if buf[0] != SOCKS5_AUTH_VERSION {
        return Err(Socks5Error::violation(format!(
            "invalid auth version: {:#04x}",
            buf[0]
        )));
    }
    if buf[1] != SOCKS5_AUTH_SUCCESS {
        return Err(Socks5Error::AuthFailed { status: buf[1] });
    }
    Ok(())
}
