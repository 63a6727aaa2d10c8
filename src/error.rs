//! Error types for Sockdial
//!
//! This module defines the error taxonomy shared by the wire codec, the
//! control session and the connection adapters.

use std::fmt;
use std::io;
use thiserror::Error;

/// Result alias used throughout the library
pub type Result<T, E = Socks5Error> = std::result::Result<T, E>;

/// SOCKS5 client errors
#[derive(Error, Debug)]
pub enum Socks5Error {
    /// Underlying socket dial/read/write failure
    #[error("Transport error: {0}")]
    Transport(#[from] io::Error),

    /// Malformed, undersized or wrong-version message from the proxy
    #[error("Protocol violation: {0}")]
    ProtocolViolation(String),

    /// The proxy answered the greeting with 0xFF
    #[error("No acceptable authentication method")]
    AuthMethodRejected,

    /// Username/password sub-negotiation returned a non-zero status
    #[error("Authentication failed: status={status:#04x}")]
    AuthFailed {
        /// Status byte returned by the proxy
        status: u8,
    },

    /// The proxy refused a command
    #[error("Command failed: {0}")]
    CommandFailed(ReplyCode),

    /// Address type this client does not encode or decode on this path
    #[error("Unsupported address type: {0:#04x}")]
    UnsupportedAddressFamily(u8),

    /// UDP datagram carried a non-zero FRAG byte
    #[error("Fragmented UDP datagrams are not supported: frag={0}")]
    FragmentationUnsupported(u8),

    /// Target address rejected before encoding
    #[error("Invalid address: {0}")]
    InvalidAddress(String),

    /// Credentials that do not fit the one-byte length prefix
    #[error("Invalid credentials: {0}")]
    InvalidCredentials(String),

    /// Client configuration rejected by validation
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Network name other than tcp/udp variants
    #[error("Unsupported network: {0}")]
    UnsupportedNetwork(String),

    /// Operation not valid in the current session or connection state
    #[error("Invalid state: {0}")]
    InvalidState(&'static str),

    /// Operation on a closed connection
    #[error("Connection closed")]
    Closed,
}

impl Socks5Error {
    /// Build a protocol violation from anything printable
    pub fn violation(msg: impl fmt::Display) -> Self {
        Socks5Error::ProtocolViolation(msg.to_string())
    }

    /// Map an I/O error raised while reading a fixed-structure reply.
    ///
    /// EOF in the middle of a reply is a framing error, not a transport one.
    pub(crate) fn from_reply_read(err: io::Error, what: &str) -> Self {
        if err.kind() == io::ErrorKind::UnexpectedEof {
            Socks5Error::ProtocolViolation(format!("short {}", what))
        } else {
            Socks5Error::Transport(err)
        }
    }
}

impl From<Socks5Error> for io::Error {
    fn from(err: Socks5Error) -> Self {
        match err {
            Socks5Error::Transport(e) => e,
            Socks5Error::Closed => io::Error::new(io::ErrorKind::NotConnected, err),
            Socks5Error::InvalidAddress(_)
            | Socks5Error::InvalidConfig(_)
            | Socks5Error::UnsupportedAddressFamily(_)
            | Socks5Error::InvalidState(_) => io::Error::new(io::ErrorKind::InvalidInput, err),
            other => io::Error::new(io::ErrorKind::Other, other),
        }
    }
}

/// Reply codes for SOCKS5 protocol
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplyCode {
    /// Command succeeded
    Succeeded,
    /// General SOCKS server failure
    GeneralFailure,
    /// Connection not allowed by ruleset
    ConnectionNotAllowed,
    /// Network unreachable
    NetworkUnreachable,
    /// Host unreachable
    HostUnreachable,
    /// Connection refused
    ConnectionRefused,
    /// TTL expired
    TtlExpired,
    /// Command not supported
    CommandNotSupported,
    /// Address type not supported
    AddressTypeNotSupported,
    /// Unassigned code, treated as a generic failure
    Unknown(u8),
}

impl ReplyCode {
    /// Whether this code means success
    pub fn is_success(self) -> bool {
        self == ReplyCode::Succeeded
    }
}

impl From<u8> for ReplyCode {
    fn from(value: u8) -> Self {
        match value {
            0x00 => ReplyCode::Succeeded,
            0x01 => ReplyCode::GeneralFailure,
            0x02 => ReplyCode::ConnectionNotAllowed,
            0x03 => ReplyCode::NetworkUnreachable,
            0x04 => ReplyCode::HostUnreachable,
            0x05 => ReplyCode::ConnectionRefused,
            0x06 => ReplyCode::TtlExpired,
            0x07 => ReplyCode::CommandNotSupported,
            0x08 => ReplyCode::AddressTypeNotSupported,
            other => ReplyCode::Unknown(other),
        }
    }
}

impl From<ReplyCode> for u8 {
    fn from(code: ReplyCode) -> Self {
        match code {
            ReplyCode::Succeeded => 0x00,
            ReplyCode::GeneralFailure => 0x01,
            ReplyCode::ConnectionNotAllowed => 0x02,
            ReplyCode::NetworkUnreachable => 0x03,
            ReplyCode::HostUnreachable => 0x04,
            ReplyCode::ConnectionRefused => 0x05,
            ReplyCode::TtlExpired => 0x06,
            ReplyCode::CommandNotSupported => 0x07,
            ReplyCode::AddressTypeNotSupported => 0x08,
            ReplyCode::Unknown(other) => other,
        }
    }
}

impl fmt::Display for ReplyCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReplyCode::Succeeded => write!(f, "succeeded"),
            ReplyCode::GeneralFailure => write!(f, "general SOCKS server failure"),
            ReplyCode::ConnectionNotAllowed => write!(f, "connection not allowed by ruleset"),
            ReplyCode::NetworkUnreachable => write!(f, "network unreachable"),
            ReplyCode::HostUnreachable => write!(f, "host unreachable"),
            ReplyCode::ConnectionRefused => write!(f, "connection refused"),
            ReplyCode::TtlExpired => write!(f, "TTL expired"),
            ReplyCode::CommandNotSupported => write!(f, "command not supported"),
            ReplyCode::AddressTypeNotSupported => write!(f, "address type not supported"),
            ReplyCode::Unknown(code) => write!(f, "unknown failure (code {:#04x})", code),
        }
    }
}
