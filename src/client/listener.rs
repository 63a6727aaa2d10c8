//! BIND listener
//!
//! A single-peer listener: the proxy reports one inbound connection on the
//! control session, and the matching socket is accepted locally.

use super::stream::StreamConnection;
use crate::error::{Result, Socks5Error};
use crate::socks::observer::FrameObserver;
use crate::socks::session::{ControlSession, SessionState};
use crate::socks::types::TargetAddr;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::{TcpListener, TcpStream};
use tracing::{debug, info};

/// Listener created by a successful BIND
#[derive(Debug)]
pub struct ListenerHandle {
    listener: Option<TcpListener>,
    session: ControlSession<TcpStream>,
    pending_peer: Option<TargetAddr>,
    pending_stream: Option<(TcpStream, SocketAddr)>,
    bind_addr: TargetAddr,
    observer: Arc<dyn FrameObserver>,
}

impl ListenerHandle {
    pub(crate) fn new(
        listener: TcpListener,
        session: ControlSession<TcpStream>,
        bind_addr: TargetAddr,
        observer: Arc<dyn FrameObserver>,
    ) -> Self {
        ListenerHandle {
            listener: Some(listener),
            session,
            pending_peer: None,
            pending_stream: None,
            bind_addr,
            observer,
        }
    }

    /// The proxy's externally reachable bind address
    pub fn addr(&self) -> &TargetAddr {
        &self.bind_addr
    }

    /// Address of the local listening socket, while it is open
    pub fn local_listener_addr(&self) -> Option<SocketAddr> {
        self.listener
            .as_ref()
            .and_then(|listener| listener.local_addr().ok())
    }

    /// Accept the single inbound connection
    ///
    /// Waits for the proxy's second reply and the local accept together. The
    /// returned stream reports the bind address as its local address and the
    /// peer from the second reply as its remote address.
    ///
    /// If the future is dropped (e.g. by a timeout), whichever half already
    /// completed is kept and a later call picks up from there.
    pub async fn accept(&mut self) -> Result<StreamConnection> {
        let listener = match self.listener.as_ref() {
            Some(listener) => listener,
            None if self.session.state() == SessionState::Closed => {
                return Err(Socks5Error::Closed)
            }
            None => {
                return Err(Socks5Error::InvalidState("BIND listener already accepted its peer"))
            }
        };

        let session = &mut self.session;
        let pending_peer = &mut self.pending_peer;
        let pending_stream = &mut self.pending_stream;
        tokio::try_join!(
            async {
                if pending_peer.is_none() {
                    *pending_peer = Some(session.await_peer().await?);
                }
                Ok::<_, Socks5Error>(())
            },
            async {
                if pending_stream.is_none() {
                    *pending_stream = Some(listener.accept().await?);
                }
                Ok::<_, Socks5Error>(())
            },
        )?;

        let (Some(peer), Some((stream, from))) =
            (self.pending_peer.take(), self.pending_stream.take())
        else {
            return Err(Socks5Error::InvalidState("BIND accept did not complete"));
        };

        debug!("Local accept from {} paired with proxy peer {}", from, peer);
        info!("TCP listener on {} accepted connection from {}", self.bind_addr, peer);

        // One BIND serves one peer
        self.listener = None;

        Ok(StreamConnection::new(
            stream,
            self.bind_addr.clone(),
            peer,
            self.observer.clone(),
        ))
    }

    /// Close the local listener and the control session
    pub async fn close(&mut self) -> Result<()> {
        self.listener = None;
        self.pending_stream = None;
        self.session.close().await
    }
}
