//! Client configuration types
//!
//! Defines the configuration structures for the SOCKS5 client.

use super::TcpConfig;
use crate::error::Result;
use crate::socks::consts::MAX_CREDENTIAL_LEN;
use crate::socks::types::Credentials;
use serde::{Deserialize, Serialize};
use std::net::IpAddr;
use std::time::Duration;

/// Default control connection timeout in seconds
fn default_connect_timeout() -> u64 {
    10
}

/// Root configuration structure
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Config {
    /// Client configuration
    pub client: ClientConfig,
}

/// Client configuration
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct ClientConfig {
    /// SOCKS5 server address (e.g., "proxy.example.com:1080")
    pub server_addr: String,

    /// Username for username/password authentication
    #[serde(default)]
    pub username: Option<String>,

    /// Password for username/password authentication
    #[serde(default)]
    pub password: Option<String>,

    /// Address announced in BIND requests instead of the listener's own
    #[serde(default)]
    pub public_ip: Option<IpAddr>,

    /// Control connection timeout in seconds
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout: u64,

    /// TCP options for control connections
    #[serde(default)]
    pub tcp: TcpConfig,
}

impl ClientConfig {
    /// Minimal configuration for a proxy address, no authentication
    pub fn new(server_addr: impl Into<String>) -> Self {
        ClientConfig {
            server_addr: server_addr.into(),
            username: None,
            password: None,
            public_ip: None,
            connect_timeout: default_connect_timeout(),
            tcp: TcpConfig::default(),
        }
    }

    /// Set username and password
    pub fn with_credentials(
        mut self,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        self.username = Some(username.into());
        self.password = Some(password.into());
        self
    }

    /// Set the BIND hint override
    pub fn with_public_ip(mut self, ip: IpAddr) -> Self {
        self.public_ip = Some(ip);
        self
    }

    /// Control connection timeout
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout)
    }

    /// Credentials to present to the proxy
    pub fn credentials(&self) -> Result<Credentials> {
        Credentials::from_options(self.username.as_deref(), self.password.as_deref())
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), String> {
        if self.server_addr.trim().is_empty() {
            return Err("server_addr must not be empty".to_string());
        }
        if self.connect_timeout == 0 {
            return Err("connect_timeout must be non-zero".to_string());
        }
        for (name, value) in [("username", &self.username), ("password", &self.password)] {
            if let Some(value) = value {
                if value.len() > MAX_CREDENTIAL_LEN {
                    return Err(format!(
                        "{} too long: {} bytes (max {})",
                        name,
                        value.len(),
                        MAX_CREDENTIAL_LEN
                    ));
                }
            }
        }
        self.tcp.validate()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_config_new() {
        let config = ClientConfig::new("127.0.0.1:1080");
        assert_eq!(config.server_addr, "127.0.0.1:1080");
        assert_eq!(config.connect_timeout(), Duration::from_secs(10));
        assert!(config.credentials().unwrap().is_empty());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_client_config_with_credentials() {
        let config = ClientConfig::new("proxy:1080").with_credentials("alice", "s3cret");
        let creds = config.credentials().unwrap();
        assert_eq!(creds.username(), "alice");
        assert_eq!(creds.password(), "s3cret");
    }

    #[test]
    fn test_client_config_validate_empty_server() {
        let config = ClientConfig::new("  ");
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_client_config_validate_long_password() {
        let config = ClientConfig::new("proxy:1080").with_credentials("bob", "p".repeat(256));
        let err = config.validate().unwrap_err();
        assert!(err.contains("password"));
    }

    #[test]
    fn test_client_config_validate_zero_timeout() {
        let mut config = ClientConfig::new("proxy:1080");
        config.connect_timeout = 0;
        assert!(config.validate().is_err());
    }
}
