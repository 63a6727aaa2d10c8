//! Client facade
//!
//! Opens one control connection per logical operation and hands back the
//! matching connection type.

use super::listener::ListenerHandle;
use super::packet::PacketConnection;
use super::stream::StreamConnection;
use super::Dialed;
use crate::config::ClientConfig;
use crate::error::{Result, Socks5Error};
use crate::socks::observer::{FrameObserver, TracingObserver};
use crate::socks::session::ControlSession;
use crate::socks::types::{Credentials, TargetAddr};
use crate::transport::{connect_control, SocketOpts};
use std::net::{Ipv4Addr, Ipv6Addr, SocketAddr};
use std::sync::Arc;
use tokio::net::{lookup_host, TcpListener, TcpStream, UdpSocket};
use tracing::{debug, info};

/// Network families accepted by [`Client::dial`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Network {
    Tcp,
    Udp,
}

impl Network {
    fn parse(network: &str) -> Result<Self> {
        match network {
            "tcp" | "tcp4" | "tcp6" => Ok(Network::Tcp),
            "udp" | "udp4" | "udp6" => Ok(Network::Udp),
            other => Err(Socks5Error::UnsupportedNetwork(other.to_string())),
        }
    }
}

/// SOCKS5 client
///
/// Cheap to clone; clones share configuration and the frame observer but
/// nothing else.
#[derive(Debug, Clone)]
pub struct Client {
    config: Arc<ClientConfig>,
    credentials: Credentials,
    socket_opts: SocketOpts,
    observer: Arc<dyn FrameObserver>,
}

impl Client {
    /// Create a client from a validated configuration
    pub fn new(config: ClientConfig) -> Result<Self> {
        config.validate().map_err(Socks5Error::InvalidConfig)?;
        let credentials = config.credentials()?;
        let socket_opts = SocketOpts::from_tcp_config(&config.tcp);

        Ok(Client {
            config: Arc::new(config),
            credentials,
            socket_opts,
            observer: Arc::new(TracingObserver),
        })
    }

    /// Report frames to `observer` instead of `tracing`
    pub fn with_observer(mut self, observer: Arc<dyn FrameObserver>) -> Self {
        self.observer = observer;
        self
    }

    /// Get a reference to the configuration
    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Connect to the proxy and authenticate
    pub async fn open_session(&self) -> Result<ControlSession<TcpStream>> {
        let stream = connect_control(
            &self.config.server_addr,
            self.config.connect_timeout(),
            &self.socket_opts,
        )
        .await?;

        let mut session = ControlSession::new(stream, self.observer.clone());
        session.authenticate(&self.credentials).await?;
        Ok(session)
    }

    /// Dial `address` over `network` (`tcp`, `tcp4`, `tcp6`, `udp`, `udp4`, `udp6`)
    pub async fn dial(&self, network: &str, address: &str) -> Result<Dialed> {
        let network = Network::parse(network)?;
        let target: TargetAddr = address.parse()?;

        match network {
            Network::Tcp => Ok(Dialed::Stream(self.dial_tcp(&target).await?)),
            Network::Udp => Ok(Dialed::Packet(self.dial_udp(&target).await?)),
        }
    }

    /// Open a TCP stream to `target` through the proxy
    ///
    /// Domain targets are sent to the proxy unresolved.
    pub async fn dial_tcp(&self, target: &TargetAddr) -> Result<StreamConnection> {
        target.validate_target()?;

        let mut session = self.open_session().await?;
        let bound = session.request_connect(target).await?;
        info!("Connected to {} via {} (bound {})", target, self.config.server_addr, bound);

        Ok(StreamConnection::new(
            session.into_inner(),
            bound,
            target.clone(),
            self.observer.clone(),
        ))
    }

    /// Open a UDP association whose fixed peer is `target`
    ///
    /// The relay path only carries IPv4 addresses, so `target` must be an
    /// IPv4 socket address.
    pub async fn dial_udp(&self, target: &TargetAddr) -> Result<PacketConnection> {
        let peer = match target {
            TargetAddr::Ip(addr @ SocketAddr::V4(_)) => *addr,
            other => return Err(Socks5Error::UnsupportedAddressFamily(other.addr_type())),
        };
        target.validate_target()?;

        let mut session = self.open_session().await?;
        let relay = session.request_udp_associate(&TargetAddr::unspecified()).await?;
        let relay_addr = self.relay_socket_addr(&relay, &session).await?;

        let bind_addr = match relay_addr {
            SocketAddr::V4(_) => SocketAddr::from((Ipv4Addr::UNSPECIFIED, 0)),
            SocketAddr::V6(_) => SocketAddr::from((Ipv6Addr::UNSPECIFIED, 0)),
        };
        let socket = UdpSocket::bind(bind_addr).await?;
        socket.connect(relay_addr).await?;

        info!("UDP association to {} via relay {}", peer, relay_addr);
        PacketConnection::new(socket, relay_addr, Some(peer), session, self.observer.clone())
    }

    /// Ask the proxy to accept one inbound TCP connection
    ///
    /// A local listener is opened on `local_addr`; the BIND hint carries its
    /// address, or the configured public IP when one is set.
    pub async fn listen_tcp(&self, local_addr: SocketAddr) -> Result<ListenerHandle> {
        let listener = TcpListener::bind(local_addr).await?;
        let listening = listener.local_addr()?;

        let mut session = self.open_session().await?;
        let hint_ip = self.config.public_ip.unwrap_or(listening.ip());
        let hint = TargetAddr::Ip(SocketAddr::new(hint_ip, listening.port()));
        let bind_addr = session.request_bind(&hint).await?;

        info!("TCP listener bound on {} (local {})", bind_addr, listening);
        Ok(ListenerHandle::new(
            listener,
            session,
            bind_addr,
            self.observer.clone(),
        ))
    }

    /// Open a UDP association for arbitrary destinations
    ///
    /// Without `local_addr` the socket binds to the control connection's
    /// local IP on an ephemeral port.
    pub async fn listen_udp(&self, local_addr: Option<SocketAddr>) -> Result<PacketConnection> {
        let mut session = self.open_session().await?;
        let local_addr = match local_addr {
            Some(addr) => addr,
            None => SocketAddr::new(session.get_ref().local_addr()?.ip(), 0),
        };

        let relay = session.request_udp_associate(&TargetAddr::unspecified()).await?;
        let relay_addr = self.relay_socket_addr(&relay, &session).await?;

        let socket = UdpSocket::bind(local_addr).await?;
        socket.connect(relay_addr).await?;

        info!("UDP listener on {} via relay {}", socket.local_addr()?, relay_addr);
        PacketConnection::new(socket, relay_addr, None, session, self.observer.clone())
    }

    /// Turn the relay address from the ASSOCIATE reply into a socket address
    ///
    /// An unspecified IP means "the address you already reach me on", so the
    /// proxy's own IP is used with the reported port.
    async fn relay_socket_addr(
        &self,
        relay: &TargetAddr,
        session: &ControlSession<TcpStream>,
    ) -> Result<SocketAddr> {
        let addr = match relay {
            TargetAddr::Ip(addr) => *addr,
            TargetAddr::Domain(host, port) => lookup_host((host.as_str(), *port))
                .await?
                .next()
                .ok_or_else(|| {
                    Socks5Error::InvalidAddress(format!("relay host {} did not resolve", host))
                })?,
        };

        if addr.ip().is_unspecified() {
            let proxy_ip = session.get_ref().peer_addr()?.ip();
            debug!("Relay reported {}, using proxy address {}", addr, proxy_ip);
            return Ok(SocketAddr::new(proxy_ip, addr.port()));
        }
        Ok(addr)
    }
}
