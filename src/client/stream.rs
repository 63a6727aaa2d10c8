//! Stream connection
//!
//! The data path of a CONNECT (the control socket itself, after the reply)
//! or of an accepted BIND peer. Bytes pass through unchanged.

use super::deadline::Deadline;
use crate::error::{Result, Socks5Error};
use crate::socks::observer::{Frame, FrameKind, FrameObserver};
use crate::socks::types::TargetAddr;
use std::fmt;
use std::future::Future;
use std::io;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{ready, Context, Poll};
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt, ReadBuf};
use tokio::net::TcpStream;
use tokio::time::Instant;
use tokio_util::sync::{CancellationToken, WaitForCancellationFutureOwned};
use tracing::debug;

/// Closes a [`StreamConnection`] from another task
///
/// A read or write pending on the connection is woken and fails; the socket
/// is released.
#[derive(Debug, Clone)]
pub struct CloseHandle {
    token: CancellationToken,
}

impl CloseHandle {
    /// Close the connection
    pub fn close(&self) {
        self.token.cancel();
    }

    /// Whether the connection has been closed
    pub fn is_closed(&self) -> bool {
        self.token.is_cancelled()
    }
}

/// A proxied TCP byte stream
pub struct StreamConnection<S = TcpStream> {
    inner: Option<S>,
    local_addr: TargetAddr,
    remote_addr: TargetAddr,
    read_deadline: Deadline,
    write_deadline: Deadline,
    token: CancellationToken,
    cancelled: Pin<Box<WaitForCancellationFutureOwned>>,
    observer: Arc<dyn FrameObserver>,
}

impl<S> fmt::Debug for StreamConnection<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StreamConnection")
            .field("local_addr", &self.local_addr)
            .field("remote_addr", &self.remote_addr)
            .field("closed", &self.inner.is_none())
            .finish()
    }
}

impl<S> StreamConnection<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    /// Wrap an established data stream
    pub fn new(
        inner: S,
        local_addr: TargetAddr,
        remote_addr: TargetAddr,
        observer: Arc<dyn FrameObserver>,
    ) -> Self {
        let token = CancellationToken::new();
        let cancelled = Box::pin(token.clone().cancelled_owned());
        StreamConnection {
            inner: Some(inner),
            local_addr,
            remote_addr,
            read_deadline: Deadline::default(),
            write_deadline: Deadline::default(),
            token,
            cancelled,
            observer,
        }
    }

    /// Local address as reported by the proxy
    pub fn local_addr(&self) -> &TargetAddr {
        &self.local_addr
    }

    /// Remote address: the CONNECT target, or the accepted BIND peer
    pub fn remote_addr(&self) -> &TargetAddr {
        &self.remote_addr
    }

    /// Handle that can close this connection from elsewhere
    pub fn close_handle(&self) -> CloseHandle {
        CloseHandle {
            token: self.token.clone(),
        }
    }

    /// Whether the connection has been closed
    pub fn is_closed(&self) -> bool {
        self.inner.is_none() || self.token.is_cancelled()
    }

    /// Set both read and write deadlines; `None` clears them
    pub fn set_deadline(&mut self, at: Option<Instant>) {
        self.read_deadline.set(at);
        self.write_deadline.set(at);
    }

    /// Set the read deadline; `None` clears it
    pub fn set_read_deadline(&mut self, at: Option<Instant>) {
        self.read_deadline.set(at);
    }

    /// Set the write deadline; `None` clears it
    pub fn set_write_deadline(&mut self, at: Option<Instant>) {
        self.write_deadline.set(at);
    }

    /// Shut the connection down
    ///
    /// Closing an already closed connection is not an error.
    pub async fn close(&mut self) -> Result<()> {
        self.token.cancel();
        let Some(mut inner) = self.inner.take() else {
            return Ok(());
        };

        debug!("Closing stream {} -> {}", self.local_addr, self.remote_addr);
        match inner.shutdown().await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotConnected => Ok(()),
            Err(e) => Err(Socks5Error::Transport(e)),
        }
    }

    /// Drop the socket if a close was requested, then hand out the stream
    fn live(&mut self, cx: &mut Context<'_>) -> io::Result<&mut S> {
        if self.inner.is_some() && self.cancelled.as_mut().poll(cx).is_ready() {
            self.inner = None;
        }
        self.inner
            .as_mut()
            .ok_or_else(|| Socks5Error::Closed.into())
    }
}

impl<S> AsyncRead for StreamConnection<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        let this = self.get_mut();
        this.read_deadline.poll_check(cx)?;
        let inner = this.live(cx)?;
        let before = buf.filled().len();

        ready!(Pin::new(inner).poll_read(cx, buf))?;
        let n = buf.filled().len() - before;
        this.observer
            .on_frame(&Frame::inbound(FrameKind::Stream, n).with_addr(&this.remote_addr));
        Poll::Ready(Ok(()))
    }
}

impl<S> AsyncWrite for StreamConnection<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        let this = self.get_mut();
        this.write_deadline.poll_check(cx)?;
        let inner = this.live(cx)?;

        let n = ready!(Pin::new(inner).poll_write(cx, buf))?;
        this.observer
            .on_frame(&Frame::outbound(FrameKind::Stream, n).with_addr(&this.remote_addr));
        Poll::Ready(Ok(n))
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        let this = self.get_mut();
        this.write_deadline.poll_check(cx)?;
        let inner = this.live(cx)?;
        Pin::new(inner).poll_flush(cx)
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        let this = self.get_mut();
        match this.inner.as_mut() {
            Some(inner) => Pin::new(inner).poll_shutdown(cx),
            None => Poll::Ready(Ok(())),
        }
    }
}
