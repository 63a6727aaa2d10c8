//! SOCKS5 protocol constants
//!
//! Defines all constants used by the client-side protocol engine.

/// SOCKS5 protocol version
pub const SOCKS5_VERSION: u8 = 0x05;

/// SOCKS5 authentication sub-negotiation version
pub const SOCKS5_AUTH_VERSION: u8 = 0x01;

// Authentication methods
/// No authentication required
pub const SOCKS5_AUTH_METHOD_NONE: u8 = 0x00;
/// Username/password authentication
pub const SOCKS5_AUTH_METHOD_PASSWORD: u8 = 0x02;
/// No acceptable methods
pub const SOCKS5_AUTH_METHOD_NOT_ACCEPTABLE: u8 = 0xFF;

/// Username/password sub-negotiation success status
pub const SOCKS5_AUTH_SUCCESS: u8 = 0x00;

// Commands
/// TCP CONNECT command
pub const SOCKS5_CMD_TCP_CONNECT: u8 = 0x01;
/// TCP BIND command
pub const SOCKS5_CMD_TCP_BIND: u8 = 0x02;
/// UDP ASSOCIATE command
pub const SOCKS5_CMD_UDP_ASSOCIATE: u8 = 0x03;

// Address types
/// IPv4 address
pub const SOCKS5_ADDR_TYPE_IPV4: u8 = 0x01;
/// Domain name
pub const SOCKS5_ADDR_TYPE_DOMAIN: u8 = 0x03;
/// IPv6 address
pub const SOCKS5_ADDR_TYPE_IPV6: u8 = 0x04;

/// Command reply status for success
pub const SOCKS5_REPLY_SUCCEEDED: u8 = 0x00;

/// Reserved byte value (always 0x00)
pub const SOCKS5_RESERVED: u8 = 0x00;

// Sizes
/// Maximum domain name length
pub const MAX_DOMAIN_LEN: usize = 255;
/// Maximum username or password length
pub const MAX_CREDENTIAL_LEN: usize = 255;
/// Largest single protocol message (fixed fields plus a 255-byte domain)
pub const MAX_PROTO_SIZE: usize = 262;
/// Bytes of a command reply needed to know its full length
pub const REPLY_PREFIX_LEN: usize = 5;
/// UDP header length for an IPv4 address: RSV(2) + FRAG(1) + ATYP(1) + IPv4(4) + PORT(2)
pub const UDP_HEADER_IPV4_LEN: usize = 10;
