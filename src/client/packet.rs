//! UDP packet connection
//!
//! Datagrams travel through the relay allocated by UDP ASSOCIATE, each one
//! prefixed with the relay header naming the real destination (outbound) or
//! sender (inbound). The association lives as long as the control session,
//! which this connection owns.

use super::deadline::within;
use crate::error::{Result, Socks5Error};
use crate::socks::codec::{decode_udp_header, encode_udp_packet};
use crate::socks::consts::*;
use crate::socks::observer::{Frame, FrameKind, FrameObserver};
use crate::socks::session::ControlSession;
use crate::socks::types::TargetAddr;
use std::net::{Ipv4Addr, SocketAddr};
use std::sync::{Arc, Mutex};
use tokio::net::{TcpStream, UdpSocket};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

/// Datagram socket bound to a SOCKS5 UDP relay
///
/// All methods take `&self`, so the connection can be shared (e.g. in an
/// `Arc`) and closed from one task while another is blocked in
/// [`read_from`](Self::read_from).
#[derive(Debug)]
pub struct PacketConnection {
    relay: Mutex<Option<Arc<UdpSocket>>>,
    relay_addr: SocketAddr,
    local_addr: SocketAddr,
    peer: Option<SocketAddr>,
    session: tokio::sync::Mutex<Option<ControlSession<TcpStream>>>,
    closed: CancellationToken,
    read_deadline: Mutex<Option<Instant>>,
    write_deadline: Mutex<Option<Instant>>,
    observer: Arc<dyn FrameObserver>,
}

impl PacketConnection {
    /// Wrap a UDP socket already connected to `relay_addr`
    pub(crate) fn new(
        socket: UdpSocket,
        relay_addr: SocketAddr,
        peer: Option<SocketAddr>,
        session: ControlSession<TcpStream>,
        observer: Arc<dyn FrameObserver>,
    ) -> Result<Self> {
        let local_addr = socket.local_addr()?;
        Ok(PacketConnection {
            relay: Mutex::new(Some(Arc::new(socket))),
            relay_addr,
            local_addr,
            peer,
            session: tokio::sync::Mutex::new(Some(session)),
            closed: CancellationToken::new(),
            read_deadline: Mutex::new(None),
            write_deadline: Mutex::new(None),
            observer,
        })
    }

    /// Local UDP socket address
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Relay address allocated by the proxy
    pub fn relay_addr(&self) -> SocketAddr {
        self.relay_addr
    }

    /// Fixed peer, when the connection was dialed to one
    pub fn peer_addr(&self) -> Option<SocketAddr> {
        self.peer
    }

    /// Whether [`close`](Self::close) has been called
    pub fn is_closed(&self) -> bool {
        self.closed.is_cancelled()
    }

    /// Set both read and write deadlines; `None` clears them
    pub fn set_deadline(&self, at: Option<Instant>) {
        self.set_read_deadline(at);
        self.set_write_deadline(at);
    }

    /// Set the deadline for `read_from` and `read`
    pub fn set_read_deadline(&self, at: Option<Instant>) {
        *lock(&self.read_deadline) = at;
    }

    /// Set the deadline for `write_to` and `write`
    pub fn set_write_deadline(&self, at: Option<Instant>) {
        *lock(&self.write_deadline) = at;
    }

    /// Send `payload` to `addr` through the relay
    ///
    /// Returns the number of payload bytes sent, header excluded. Only IPv4
    /// destinations are supported; IPv4-mapped IPv6 addresses are sent as
    /// plain IPv4.
    pub async fn write_to(&self, payload: &[u8], addr: SocketAddr) -> Result<usize> {
        let addr = match addr {
            SocketAddr::V6(v6) => match v6.ip().to_ipv4_mapped() {
                Some(ip) => SocketAddr::from((ip, v6.port())),
                None => return Err(Socks5Error::UnsupportedAddressFamily(SOCKS5_ADDR_TYPE_IPV6)),
            },
            v4 => v4,
        };

        let socket = self.socket()?;
        let target = TargetAddr::from(addr);
        let packet = encode_udp_packet(&target, payload)?;
        let header_len = packet.len() - payload.len();

        let deadline = *lock(&self.write_deadline);
        let sent = within(deadline, async {
            tokio::select! {
                _ = self.closed.cancelled() => Err(Socks5Error::Closed),
                sent = socket.send(&packet) => sent.map_err(Socks5Error::from),
            }
        })
        .await?;

        self.observer
            .on_frame(&Frame::outbound(FrameKind::Datagram, sent).with_addr(&target));
        trace!("UDP sent {} bytes to {} via relay {}", sent, addr, self.relay_addr);

        Ok(sent.saturating_sub(header_len))
    }

    /// Receive one datagram from the relay
    ///
    /// Copies the payload into `buf`, truncating it if `buf` is too small,
    /// and returns its length and the original sender. An empty `buf`
    /// returns `(0, 0.0.0.0:0)` without touching the socket.
    pub async fn read_from(&self, buf: &mut [u8]) -> Result<(usize, SocketAddr)> {
        if buf.is_empty() {
            return Ok((0, SocketAddr::from((Ipv4Addr::UNSPECIFIED, 0))));
        }

        let socket = self.socket()?;
        let mut scratch = vec![0u8; buf.len() + MAX_PROTO_SIZE];

        let deadline = *lock(&self.read_deadline);
        let received = within(deadline, async {
            tokio::select! {
                _ = self.closed.cancelled() => Err(Socks5Error::Closed),
                received = socket.recv(&mut scratch) => received.map_err(Socks5Error::from),
            }
        })
        .await?;

        let (sender, header_len) = decode_udp_header(&scratch[..received])?;
        let payload = &scratch[header_len..received];
        let n = payload.len().min(buf.len());
        buf[..n].copy_from_slice(&payload[..n]);

        let sender_addr = TargetAddr::from(sender);
        self.observer
            .on_frame(&Frame::inbound(FrameKind::Datagram, received).with_addr(&sender_addr));
        trace!("UDP received {} bytes from {}", payload.len(), sender);

        Ok((n, sender))
    }

    /// Receive the next datagram from the fixed peer
    ///
    /// Datagrams from other senders are dropped.
    pub async fn read(&self, buf: &mut [u8]) -> Result<usize> {
        let peer = self
            .peer
            .ok_or(Socks5Error::InvalidState("read requires a dialed peer"))?;
        if buf.is_empty() {
            return Ok(0);
        }

        loop {
            let (n, from) = match self.read_from(buf).await {
                Ok(received) => received,
                // Only IPv4 unfragmented datagrams can come from the peer
                Err(
                    e @ (Socks5Error::UnsupportedAddressFamily(_)
                    | Socks5Error::FragmentationUnsupported(_)),
                ) => {
                    debug!("Dropping UDP datagram not from {}: {}", peer, e);
                    continue;
                }
                Err(e) => return Err(e),
            };
            if from == peer {
                return Ok(n);
            }
            debug!("Dropping UDP datagram from {} (expecting {})", from, peer);
        }
    }

    /// Send to the fixed peer
    pub async fn write(&self, payload: &[u8]) -> Result<usize> {
        let peer = self
            .peer
            .ok_or(Socks5Error::InvalidState("write requires a dialed peer"))?;
        self.write_to(payload, peer).await
    }

    /// Release the relay socket and close the control session
    ///
    /// Safe to call more than once, and while another task is blocked in a
    /// read or write (which then fails with [`Socks5Error::Closed`]).
    pub async fn close(&self) -> Result<()> {
        self.closed.cancel();
        lock(&self.relay).take();

        let session = self.session.lock().await.take();
        match session {
            Some(mut session) => {
                debug!("Closing UDP association via relay {}", self.relay_addr);
                session.close().await
            }
            None => Ok(()),
        }
    }

    fn socket(&self) -> Result<Arc<UdpSocket>> {
        lock(&self.relay).clone().ok_or(Socks5Error::Closed)
    }
}

/// Lock a std mutex, recovering the data if a holder panicked
fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
