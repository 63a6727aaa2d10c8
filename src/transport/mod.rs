//! Control connection transport
//!
//! Dials the SOCKS5 server over plain TCP and applies socket options.

use crate::config::TcpConfig;
use crate::error::{Result, Socks5Error};
use std::io;
use std::time::Duration;
use tokio::net::TcpStream;
use tracing::{debug, warn};

/// Socket options for configuring connections
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SocketOpts {
    /// Enable TCP_NODELAY
    pub nodelay: bool,
    /// TCP keepalive timeout
    pub keepalive_secs: Option<u64>,
    /// TCP keepalive interval
    pub keepalive_interval: Option<u64>,
}

impl Default for SocketOpts {
    fn default() -> Self {
        SocketOpts::from_tcp_config(&TcpConfig::default())
    }
}

impl SocketOpts {
    /// Create socket options from TCP config
    ///
    /// A zero keepalive time leaves keepalive off.
    pub fn from_tcp_config(config: &TcpConfig) -> Self {
        let keepalive = config.keepalive_secs > 0;
        SocketOpts {
            nodelay: config.nodelay,
            keepalive_secs: keepalive.then_some(config.keepalive_secs),
            keepalive_interval: keepalive.then_some(config.keepalive_interval),
        }
    }

    /// Apply socket options to a TCP stream
    pub fn apply(&self, stream: &TcpStream) -> io::Result<()> {
        stream.set_nodelay(self.nodelay)?;

        if let (Some(timeout), Some(interval)) = (self.keepalive_secs, self.keepalive_interval) {
            let socket = socket2::SockRef::from(stream);
            let keepalive = socket2::TcpKeepalive::new()
                .with_time(Duration::from_secs(timeout))
                .with_interval(Duration::from_secs(interval));
            socket.set_tcp_keepalive(&keepalive)?;
        }

        Ok(())
    }
}

/// Open a control connection to the proxy
///
/// The proxy's own host name is resolved by the OS resolver; target
/// addresses never are.
pub async fn connect_control(
    server_addr: &str,
    connect_timeout: Duration,
    opts: &SocketOpts,
) -> Result<TcpStream> {
    let stream = tokio::time::timeout(connect_timeout, TcpStream::connect(server_addr))
        .await
        .map_err(|_| {
            Socks5Error::Transport(io::Error::new(
                io::ErrorKind::TimedOut,
                format!("connection timeout to {}", server_addr),
            ))
        })?
        .map_err(|e| {
            Socks5Error::Transport(io::Error::new(
                e.kind(),
                format!("can't connect to socks5 server {}: {}", server_addr, e),
            ))
        })?;

    if let Err(e) = opts.apply(&stream) {
        warn!("Failed to apply socket options: {}", e);
    }

    debug!("Control connection established to {}", server_addr);
    Ok(stream)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;

    #[test]
    fn test_socket_opts_default() {
        let opts = SocketOpts::default();
        assert!(opts.nodelay);
        assert_eq!(opts.keepalive_secs, Some(20));
        assert_eq!(opts.keepalive_interval, Some(8));
    }

    #[test]
    fn test_socket_opts_from_tcp_config() {
        let config = TcpConfig {
            nodelay: false,
            keepalive_secs: 60,
            keepalive_interval: 15,
        };
        let opts = SocketOpts::from_tcp_config(&config);
        assert!(!opts.nodelay);
        assert_eq!(opts.keepalive_secs, Some(60));
        assert_eq!(opts.keepalive_interval, Some(15));
    }

    #[test]
    fn test_socket_opts_keepalive_disabled() {
        let config = TcpConfig {
            nodelay: true,
            keepalive_secs: 0,
            keepalive_interval: 15,
        };
        let opts = SocketOpts::from_tcp_config(&config);
        assert_eq!(opts.keepalive_secs, None);
        assert_eq!(opts.keepalive_interval, None);
    }

    #[tokio::test]
    async fn test_connect_control_applies_opts() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap().to_string();

        let stream = connect_control(&addr, Duration::from_secs(5), &SocketOpts::default())
            .await
            .unwrap();
        assert!(stream.nodelay().unwrap());
    }

    #[tokio::test]
    async fn test_connect_control_refused() {
        // Bind then drop to get a port that is very likely closed
        let addr = {
            let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
            listener.local_addr().unwrap().to_string()
        };

        let result = connect_control(&addr, Duration::from_secs(5), &SocketOpts::default()).await;
        assert!(matches!(result, Err(Socks5Error::Transport(_))));
    }
}
