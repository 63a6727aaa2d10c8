//! Client module for Sockdial
//!
//! This module contains the caller-facing client and the three connection
//! flavors it produces: streams (CONNECT, accepted BIND peers), the BIND
//! listener, and UDP packet connections.

#[allow(clippy::module_inception)]
mod client;
mod deadline;
mod listener;
mod packet;
mod stream;

pub use client::Client;
pub use listener::ListenerHandle;
pub use packet::PacketConnection;
pub use stream::{CloseHandle, StreamConnection};

use crate::error::Result;
use crate::socks::types::TargetAddr;
use async_trait::async_trait;
use tokio::io::{AsyncRead, AsyncWrite};

/// Capabilities shared by every proxied socket
#[async_trait]
pub trait ProxySocket: Send {
    /// Local address of the socket as the proxy sees it
    fn local_addr(&self) -> TargetAddr;

    /// Close the socket and any control session it owns
    async fn close(&mut self) -> Result<()>;
}

#[async_trait]
impl<S> ProxySocket for StreamConnection<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    fn local_addr(&self) -> TargetAddr {
        StreamConnection::local_addr(self).clone()
    }

    async fn close(&mut self) -> Result<()> {
        StreamConnection::close(self).await
    }
}

#[async_trait]
impl ProxySocket for ListenerHandle {
    fn local_addr(&self) -> TargetAddr {
        self.addr().clone()
    }

    async fn close(&mut self) -> Result<()> {
        ListenerHandle::close(self).await
    }
}

#[async_trait]
impl ProxySocket for PacketConnection {
    fn local_addr(&self) -> TargetAddr {
        TargetAddr::from(PacketConnection::local_addr(self))
    }

    async fn close(&mut self) -> Result<()> {
        PacketConnection::close(self).await
    }
}

/// Result of [`Client::dial`]
#[derive(Debug)]
pub enum Dialed {
    /// `tcp`, `tcp4` or `tcp6`
    Stream(StreamConnection),
    /// `udp`, `udp4` or `udp6`
    Packet(PacketConnection),
}

impl Dialed {
    /// The stream, if this is a TCP dial
    pub fn into_stream(self) -> Option<StreamConnection> {
        match self {
            Dialed::Stream(stream) => Some(stream),
            Dialed::Packet(_) => None,
        }
    }

    /// The packet connection, if this is a UDP dial
    pub fn into_packet(self) -> Option<PacketConnection> {
        match self {
            Dialed::Packet(packet) => Some(packet),
            Dialed::Stream(_) => None,
        }
    }

    /// Remote address the dial was made to
    pub fn remote_addr(&self) -> Option<TargetAddr> {
        match self {
            Dialed::Stream(stream) => Some(stream.remote_addr().clone()),
            Dialed::Packet(packet) => packet.peer_addr().map(TargetAddr::from),
        }
    }
}

#[async_trait]
impl ProxySocket for Dialed {
    fn local_addr(&self) -> TargetAddr {
        match self {
            Dialed::Stream(stream) => ProxySocket::local_addr(stream),
            Dialed::Packet(packet) => ProxySocket::local_addr(packet),
        }
    }

    async fn close(&mut self) -> Result<()> {
        match self {
            Dialed::Stream(stream) => StreamConnection::close(stream).await,
            Dialed::Packet(packet) => PacketConnection::close(packet).await,
        }
    }
}
