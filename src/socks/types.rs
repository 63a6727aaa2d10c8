//! SOCKS5 type definitions
//!
//! Defines the core types used by the client-side protocol engine.

use super::consts::*;
use crate::error::{Result, Socks5Error};
use std::fmt;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};
use std::str::FromStr;

/// SOCKS5 command types
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SocksCommand {
    /// TCP CONNECT - establish a TCP connection to target
    Connect,
    /// TCP BIND - have the proxy accept one inbound connection
    Bind,
    /// UDP ASSOCIATE - establish UDP relay
    UdpAssociate,
}

impl SocksCommand {
    /// Convert SocksCommand to byte
    pub fn to_byte(self) -> u8 {
        match self {
            SocksCommand::Connect => SOCKS5_CMD_TCP_CONNECT,
            SocksCommand::Bind => SOCKS5_CMD_TCP_BIND,
            SocksCommand::UdpAssociate => SOCKS5_CMD_UDP_ASSOCIATE,
        }
    }
}

impl fmt::Display for SocksCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SocksCommand::Connect => write!(f, "CONNECT"),
            SocksCommand::Bind => write!(f, "BIND"),
            SocksCommand::UdpAssociate => write!(f, "UDP ASSOCIATE"),
        }
    }
}

/// Authentication method types
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthMethod {
    /// No authentication required
    None,
    /// Username/password authentication
    Password,
}

impl AuthMethod {
    /// Convert to SOCKS5 method byte
    pub fn to_byte(self) -> u8 {
        match self {
            AuthMethod::None => SOCKS5_AUTH_METHOD_NONE,
            AuthMethod::Password => SOCKS5_AUTH_METHOD_PASSWORD,
        }
    }

    /// Parse from SOCKS5 method byte
    pub fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            SOCKS5_AUTH_METHOD_NONE => Some(AuthMethod::None),
            SOCKS5_AUTH_METHOD_PASSWORD => Some(AuthMethod::Password),
            _ => None,
        }
    }
}

/// Username/password pair presented to the proxy.
///
/// Both fields empty selects the "no authentication" method; anything else
/// requires username/password authentication.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct Credentials {
    username: String,
    password: String,
}

impl Credentials {
    /// Create credentials, checking the one-byte length limits
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Result<Self> {
        let creds = Credentials {
            username: username.into(),
            password: password.into(),
        };
        creds.validate()?;
        Ok(creds)
    }

    /// Credentials selecting the "no authentication" method
    pub fn none() -> Self {
        Self::default()
    }

    /// Build from optional config values; missing values count as empty
    pub fn from_options(username: Option<&str>, password: Option<&str>) -> Result<Self> {
        Self::new(username.unwrap_or_default(), password.unwrap_or_default())
    }

    /// Username (may be empty)
    pub fn username(&self) -> &str {
        &self.username
    }

    /// Password (may be empty)
    pub fn password(&self) -> &str {
        &self.password
    }

    /// True when neither username nor password is set
    pub fn is_empty(&self) -> bool {
        self.username.is_empty() && self.password.is_empty()
    }

    /// The single method advertised in the greeting
    pub fn method(&self) -> AuthMethod {
        if self.is_empty() {
            AuthMethod::None
        } else {
            AuthMethod::Password
        }
    }

    /// Check both fields fit the protocol's one-byte length prefix
    pub fn validate(&self) -> Result<()> {
        if self.username.len() > MAX_CREDENTIAL_LEN {
            return Err(Socks5Error::InvalidCredentials(format!(
                "username too long: {} bytes (max {})",
                self.username.len(),
                MAX_CREDENTIAL_LEN
            )));
        }
        if self.password.len() > MAX_CREDENTIAL_LEN {
            return Err(Socks5Error::InvalidCredentials(format!(
                "password too long: {} bytes (max {})",
                self.password.len(),
                MAX_CREDENTIAL_LEN
            )));
        }
        Ok(())
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Target address for SOCKS5 requests
///
/// Represents the destination address in a SOCKS5 request or the bound
/// address in a reply. Can be an IP address (v4 or v6) or a domain name.
/// Domain names are forwarded to the proxy unresolved.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum TargetAddr {
    /// IP address with port
    Ip(SocketAddr),
    /// Domain name with port
    Domain(String, u16),
}

impl TargetAddr {
    /// Create a new TargetAddr from an IPv4 address and port
    pub fn ipv4(ip: Ipv4Addr, port: u16) -> Self {
        TargetAddr::Ip(SocketAddr::new(IpAddr::V4(ip), port))
    }

    /// Create a new TargetAddr from an IPv6 address and port
    pub fn ipv6(ip: Ipv6Addr, port: u16) -> Self {
        TargetAddr::Ip(SocketAddr::new(IpAddr::V6(ip), port))
    }

    /// Create a new TargetAddr from a domain name and port
    pub fn domain(domain: impl Into<String>, port: u16) -> Self {
        TargetAddr::Domain(domain.into(), port)
    }

    /// The all-zero IPv4 address, used as an "any" hint
    pub fn unspecified() -> Self {
        TargetAddr::ipv4(Ipv4Addr::UNSPECIFIED, 0)
    }

    /// Get the port number
    pub fn port(&self) -> u16 {
        match self {
            TargetAddr::Ip(addr) => addr.port(),
            TargetAddr::Domain(_, port) => *port,
        }
    }

    /// Get the address type byte for SOCKS5 protocol
    pub fn addr_type(&self) -> u8 {
        match self {
            TargetAddr::Ip(SocketAddr::V4(_)) => SOCKS5_ADDR_TYPE_IPV4,
            TargetAddr::Ip(SocketAddr::V6(_)) => SOCKS5_ADDR_TYPE_IPV6,
            TargetAddr::Domain(_, _) => SOCKS5_ADDR_TYPE_DOMAIN,
        }
    }

    /// The socket address, if this is an IP target
    pub fn socket_addr(&self) -> Option<SocketAddr> {
        match self {
            TargetAddr::Ip(addr) => Some(*addr),
            TargetAddr::Domain(_, _) => None,
        }
    }

    /// Number of bytes `ATYP + ADDR + PORT` occupies on the wire
    pub fn encoded_len(&self) -> usize {
        match self {
            TargetAddr::Ip(SocketAddr::V4(_)) => 1 + 4 + 2,
            TargetAddr::Ip(SocketAddr::V6(_)) => 1 + 16 + 2,
            TargetAddr::Domain(domain, _) => 1 + 1 + domain.len() + 2,
        }
    }

    /// Check the domain name fits the protocol (1..=255 bytes)
    pub fn validate(&self) -> Result<()> {
        if let TargetAddr::Domain(domain, _) = self {
            if domain.is_empty() {
                return Err(Socks5Error::InvalidAddress("empty hostname".to_string()));
            }
            if domain.len() > MAX_DOMAIN_LEN {
                return Err(Socks5Error::InvalidAddress(format!(
                    "hostname too long: {} bytes (max {})",
                    domain.len(),
                    MAX_DOMAIN_LEN
                )));
            }
        }
        Ok(())
    }

    /// Stricter check for CONNECT targets: the port must be non-zero
    pub fn validate_target(&self) -> Result<()> {
        self.validate()?;
        if self.port() == 0 {
            return Err(Socks5Error::InvalidAddress(format!(
                "port number out of range: {}",
                self
            )));
        }
        Ok(())
    }
}

impl fmt::Display for TargetAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TargetAddr::Ip(addr) => write!(f, "{}", addr),
            TargetAddr::Domain(domain, port) => write!(f, "{}:{}", domain, port),
        }
    }
}

impl From<SocketAddr> for TargetAddr {
    fn from(addr: SocketAddr) -> Self {
        TargetAddr::Ip(addr)
    }
}

impl FromStr for TargetAddr {
    type Err = Socks5Error;

    /// Parse `host:port`, `ipv4:port` or `[ipv6]:port` without resolving
    fn from_str(s: &str) -> Result<Self> {
        if let Ok(addr) = s.parse::<SocketAddr>() {
            return Ok(TargetAddr::Ip(addr));
        }

        let (host, port) = s
            .rsplit_once(':')
            .ok_or_else(|| Socks5Error::InvalidAddress(format!("missing port in address: {}", s)))?;

        let port: u16 = port
            .parse()
            .map_err(|_| Socks5Error::InvalidAddress(format!("failed to parse port number: {}", port)))?;

        if host.contains(':') || host.starts_with('[') {
            return Err(Socks5Error::InvalidAddress(format!("malformed address: {}", s)));
        }

        let target = TargetAddr::domain(host, port);
        target.validate()?;
        Ok(target)
    }
}

impl Default for TargetAddr {
    fn default() -> Self {
        TargetAddr::unspecified()
    }
}
