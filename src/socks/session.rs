//! SOCKS5 control session
//!
//! A [`ControlSession`] owns one control-channel byte stream and drives it
//! through method negotiation, optional username/password authentication and
//! exactly one command. Every message goes through the wire codec, so the
//! session itself only deals with framing: how many bytes to read and when.

use super::codec::{
    command_reply_len, decode_auth_reply, decode_command_reply, decode_method_selection,
    encode_command_request, encode_greeting, encode_user_pass_auth,
};
use super::consts::*;
use super::observer::{Frame, FrameKind, FrameObserver, TracingObserver};
use super::types::{AuthMethod, Credentials, SocksCommand, TargetAddr};
use crate::error::{Result, Socks5Error};
use std::fmt;
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tracing::debug;

/// Where a session is in its lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Stream connected, nothing sent yet
    New,
    /// Method negotiation (and authentication, if any) done
    Authenticated,
    /// A command request has been written and its reply is pending
    CommandIssued,
    /// CONNECT or UDP ASSOCIATE succeeded
    Established,
    /// BIND succeeded, the second reply has not been read yet
    AwaitingPeer,
    /// The second BIND reply has been read
    PeerAccepted,
    /// The session was closed by the caller
    Closed,
    /// A step failed; the session cannot be used any more
    Failed,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SessionState::New => "new",
            SessionState::Authenticated => "authenticated",
            SessionState::CommandIssued => "command issued",
            SessionState::Established => "established",
            SessionState::AwaitingPeer => "awaiting peer",
            SessionState::PeerAccepted => "peer accepted",
            SessionState::Closed => "closed",
            SessionState::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// One SOCKS5 control connection
pub struct ControlSession<S> {
    stream: S,
    state: SessionState,
    observer: Arc<dyn FrameObserver>,
}

impl<S> fmt::Debug for ControlSession<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ControlSession")
            .field("state", &self.state)
            .field("observer", &self.observer)
            .finish()
    }
}

impl<S> ControlSession<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    /// Wrap a freshly connected control stream
    pub fn new(stream: S, observer: Arc<dyn FrameObserver>) -> Self {
        ControlSession {
            stream,
            state: SessionState::New,
            observer,
        }
    }

    /// Wrap a stream, reporting frames through `tracing`
    pub fn with_tracing(stream: S) -> Self {
        Self::new(stream, Arc::new(TracingObserver))
    }

    /// Current lifecycle state
    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Borrow the underlying stream
    pub fn get_ref(&self) -> &S {
        &self.stream
    }

    /// Give up the session and return the stream
    ///
    /// After a successful CONNECT the stream carries the raw data path.
    pub fn into_inner(self) -> S {
        self.stream
    }

    /// Negotiate the authentication method and authenticate if required
    ///
    /// Exactly one method is offered: "no authentication" for empty
    /// credentials, username/password otherwise.
    pub async fn authenticate(&mut self, credentials: &Credentials) -> Result<()> {
        self.expect(SessionState::New, "authenticate requires a new session")?;
        let result = self.negotiate(credentials).await;
        self.settle(result, SessionState::Authenticated)
    }

    /// Issue CONNECT and return the address the proxy bound for it
    pub async fn request_connect(&mut self, target: &TargetAddr) -> Result<TargetAddr> {
        self.command(SocksCommand::Connect, target, SessionState::Established)
            .await
    }

    /// Issue BIND and return the proxy's externally reachable address
    ///
    /// The session is then armed for [`await_peer`](Self::await_peer).
    pub async fn request_bind(&mut self, hint: &TargetAddr) -> Result<TargetAddr> {
        self.command(SocksCommand::Bind, hint, SessionState::AwaitingPeer)
            .await
    }

    /// Wait for the second BIND reply and return the connecting peer's address
    pub async fn await_peer(&mut self) -> Result<TargetAddr> {
        match self.state {
            SessionState::AwaitingPeer => {}
            SessionState::PeerAccepted => {
                return Err(Socks5Error::InvalidState("BIND peer already accepted"))
            }
            _ => return Err(Socks5Error::InvalidState("no BIND request pending")),
        }

        let result = self.read_reply().await;
        let peer = self.settle(result, SessionState::PeerAccepted)?;
        debug!("BIND peer connected: {}", peer);
        Ok(peer)
    }

    /// Issue UDP ASSOCIATE and return the relay address
    pub async fn request_udp_associate(&mut self, hint: &TargetAddr) -> Result<TargetAddr> {
        self.command(SocksCommand::UdpAssociate, hint, SessionState::Established)
            .await
    }

    /// Shut down the control stream
    ///
    /// Closing twice is not an error.
    pub async fn close(&mut self) -> Result<()> {
        if self.state == SessionState::Closed {
            return Ok(());
        }
        self.state = SessionState::Closed;
        match self.stream.shutdown().await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotConnected => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    async fn negotiate(&mut self, credentials: &Credentials) -> Result<()> {
        let offered = credentials.method();
        let greeting = encode_greeting(&[offered.to_byte()])?;
        self.send(
            &greeting,
            FrameKind::Greeting {
                method: offered.to_byte(),
            },
        )
        .await?;

        let mut reply = [0u8; 2];
        self.stream
            .read_exact(&mut reply)
            .await
            .map_err(|e| Socks5Error::from_reply_read(e, "method selection"))?;
        let selected = decode_method_selection(&reply)?;
        self.observer.on_frame(&Frame::inbound(
            FrameKind::MethodSelection { method: selected },
            reply.len(),
        ));

        if AuthMethod::from_byte(selected) != Some(offered) {
            return Err(Socks5Error::violation(format!(
                "proxy selected method {:#04x} which was not offered",
                selected
            )));
        }

        if offered == AuthMethod::Password {
            let request = encode_user_pass_auth(credentials)?;
            self.send(&request, FrameKind::AuthRequest).await?;

            let mut reply = [0u8; 2];
            self.stream
                .read_exact(&mut reply)
                .await
                .map_err(|e| Socks5Error::from_reply_read(e, "auth reply"))?;
            self.observer.on_frame(&Frame::inbound(
                FrameKind::AuthReply { status: reply[1] },
                reply.len(),
            ));
            decode_auth_reply(&reply)?;
            debug!("Authenticated as {}", credentials.username());
        }

        Ok(())
    }

    async fn command(
        &mut self,
        command: SocksCommand,
        target: &TargetAddr,
        next: SessionState,
    ) -> Result<TargetAddr> {
        self.expect(SessionState::Authenticated, "command requires an authenticated session")?;
        self.state = SessionState::CommandIssued;

        let result = self.exchange(command, target).await;
        let bound = self.settle(result, next)?;
        debug!("{} {} accepted, bound address {}", command, target, bound);
        Ok(bound)
    }

    async fn exchange(&mut self, command: SocksCommand, target: &TargetAddr) -> Result<TargetAddr> {
        let request = encode_command_request(command, target)?;
        self.stream.write_all(&request).await?;
        self.stream.flush().await?;
        self.observer.on_frame(
            &Frame::outbound(FrameKind::CommandRequest { command }, request.len()).with_addr(target),
        );

        self.read_reply().await
    }

    /// Read exactly one command reply off the stream
    async fn read_reply(&mut self) -> Result<TargetAddr> {
        let mut buf = [0u8; MAX_PROTO_SIZE];
        self.stream
            .read_exact(&mut buf[..REPLY_PREFIX_LEN])
            .await
            .map_err(|e| Socks5Error::from_reply_read(e, "command reply"))?;

        let total = command_reply_len(&buf[..REPLY_PREFIX_LEN])?;
        self.stream
            .read_exact(&mut buf[REPLY_PREFIX_LEN..total])
            .await
            .map_err(|e| Socks5Error::from_reply_read(e, "command reply"))?;

        let decoded = decode_command_reply(&buf[..total]);
        let frame = Frame::inbound(FrameKind::CommandReply { status: buf[1] }, total);
        match &decoded {
            Ok(addr) => self.observer.on_frame(&frame.with_addr(addr)),
            Err(_) => self.observer.on_frame(&frame),
        }
        decoded
    }

    async fn send(&mut self, bytes: &[u8], kind: FrameKind) -> Result<()> {
        self.stream.write_all(bytes).await?;
        self.stream.flush().await?;
        self.observer.on_frame(&Frame::outbound(kind, bytes.len()));
        Ok(())
    }

    fn expect(&self, state: SessionState, what: &'static str) -> Result<()> {
        if self.state != state {
            return Err(Socks5Error::InvalidState(what));
        }
        Ok(())
    }

    fn settle<T>(&mut self, result: Result<T>, next: SessionState) -> Result<T> {
        match result {
            Ok(value) => {
                self.state = next;
                Ok(value)
            }
            Err(e) => {
                self.state = SessionState::Failed;
                Err(e)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ReplyCode;
    use crate::socks::observer::testing::RecordingObserver;
    use std::net::Ipv4Addr;
    use std::time::Duration;
    use tokio::io::duplex;
    use tokio_test::io::Builder;

    fn session<S: AsyncRead + AsyncWrite + Unpin>(stream: S) -> ControlSession<S> {
        ControlSession::with_tracing(stream)
    }

    #[tokio::test]
    async fn test_authenticate_no_auth() {
        let mock = Builder::new()
            .write(&[0x05, 0x01, 0x00])
            .read(&[0x05, 0x00])
            .build();

        let mut session = session(mock);
        session.authenticate(&Credentials::none()).await.unwrap();
        assert_eq!(session.state(), SessionState::Authenticated);
    }

    #[tokio::test]
    async fn test_authenticate_password_success() {
        let mock = Builder::new()
            .write(&[0x05, 0x01, 0x02])
            .read(&[0x05, 0x02])
            .write(&[0x01, 0x04, b'u', b's', b'e', b'r', 0x04, b'p', b'a', b's', b's'])
            .read(&[0x01, 0x00])
            .build();

        let mut session = session(mock);
        let creds = Credentials::new("user", "pass").unwrap();
        session.authenticate(&creds).await.unwrap();
        assert_eq!(session.state(), SessionState::Authenticated);
    }

    #[tokio::test]
    async fn test_authenticate_password_failure() {
        let mock = Builder::new()
            .write(&[0x05, 0x01, 0x02])
            .read(&[0x05, 0x02])
            .write(&[0x01, 0x01, b'u', 0x01, b'p'])
            .read(&[0x01, 0x01])
            .build();

        let mut session = session(mock);
        let creds = Credentials::new("u", "p").unwrap();
        let result = session.authenticate(&creds).await;
        assert!(matches!(result, Err(Socks5Error::AuthFailed { status: 0x01 })));
        assert_eq!(session.state(), SessionState::Failed);
    }

    #[tokio::test]
    async fn test_authenticate_method_rejected() {
        let mock = Builder::new()
            .write(&[0x05, 0x01, 0x02])
            .read(&[0x05, 0xFF])
            .build();

        let mut session = session(mock);
        let creds = Credentials::new("u", "p").unwrap();
        assert!(matches!(
            session.authenticate(&creds).await,
            Err(Socks5Error::AuthMethodRejected)
        ));
    }

    #[tokio::test]
    async fn test_authenticate_unoffered_method() {
        let mock = Builder::new()
            .write(&[0x05, 0x01, 0x00])
            .read(&[0x05, 0x02])
            .build();

        let mut session = session(mock);
        assert!(matches!(
            session.authenticate(&Credentials::none()).await,
            Err(Socks5Error::ProtocolViolation(_))
        ));
        assert_eq!(session.state(), SessionState::Failed);
    }

    #[tokio::test]
    async fn test_authenticate_short_reply() {
        let mock = Builder::new()
            .write(&[0x05, 0x01, 0x00])
            .read(&[0x05])
            .build();

        let mut session = session(mock);
        assert!(matches!(
            session.authenticate(&Credentials::none()).await,
            Err(Socks5Error::ProtocolViolation(_))
        ));
    }

    #[tokio::test]
    async fn test_authenticate_twice_is_invalid() {
        let mock = Builder::new()
            .write(&[0x05, 0x01, 0x00])
            .read(&[0x05, 0x00])
            .build();

        let mut session = session(mock);
        session.authenticate(&Credentials::none()).await.unwrap();
        assert!(matches!(
            session.authenticate(&Credentials::none()).await,
            Err(Socks5Error::InvalidState(_))
        ));
    }

    #[tokio::test]
    async fn test_connect_returns_bound_address() {
        let mock = Builder::new()
            .write(&[0x05, 0x01, 0x00])
            .read(&[0x05, 0x00])
            .write(&[0x05, 0x01, 0x00, 0x01, 93, 184, 216, 34, 0x00, 0x50])
            .read(&[0x05, 0x00, 0x00, 0x01, 203, 0, 113, 9, 0x0F, 0xA0])
            .build();

        let observer = Arc::new(RecordingObserver::default());
        let mut session = ControlSession::new(mock, observer.clone());
        session.authenticate(&Credentials::none()).await.unwrap();

        let target = TargetAddr::ipv4(Ipv4Addr::new(93, 184, 216, 34), 80);
        let bound = session.request_connect(&target).await.unwrap();

        assert_eq!(bound, TargetAddr::ipv4(Ipv4Addr::new(203, 0, 113, 9), 4000));
        assert_eq!(session.state(), SessionState::Established);
        assert_eq!(
            observer.kinds(),
            vec![
                FrameKind::Greeting { method: 0 },
                FrameKind::MethodSelection { method: 0 },
                FrameKind::CommandRequest {
                    command: SocksCommand::Connect
                },
                FrameKind::CommandReply { status: 0 },
            ]
        );
    }

    #[tokio::test]
    async fn test_connect_domain_reply() {
        let mock = Builder::new()
            .write(&[0x05, 0x01, 0x00])
            .read(&[0x05, 0x00])
            .write(&[0x05, 0x01, 0x00, 0x03, 0x03, b'f', b'o', b'o', 0x01, 0xBB])
            .read(&[0x05, 0x00, 0x00, 0x03, 0x03])
            .read(&[b'b', b'a', b'r', 0x04, 0x38])
            .build();

        let mut session = session(mock);
        session.authenticate(&Credentials::none()).await.unwrap();
        let bound = session
            .request_connect(&TargetAddr::domain("foo", 443))
            .await
            .unwrap();
        assert_eq!(bound, TargetAddr::domain("bar", 1080));
    }

    #[tokio::test]
    async fn test_connect_refused() {
        let mock = Builder::new()
            .write(&[0x05, 0x01, 0x00])
            .read(&[0x05, 0x00])
            .write(&[0x05, 0x01, 0x00, 0x01, 10, 0, 0, 1, 0x00, 0x16])
            .read(&[0x05, 0x05, 0x00, 0x01, 0, 0, 0, 0, 0, 0])
            .build();

        let mut session = session(mock);
        session.authenticate(&Credentials::none()).await.unwrap();
        let result = session
            .request_connect(&TargetAddr::ipv4(Ipv4Addr::new(10, 0, 0, 1), 22))
            .await;

        assert!(matches!(
            result,
            Err(Socks5Error::CommandFailed(ReplyCode::ConnectionRefused))
        ));
        assert_eq!(session.state(), SessionState::Failed);
    }

    #[tokio::test]
    async fn test_connect_short_reply() {
        let mock = Builder::new()
            .write(&[0x05, 0x01, 0x00])
            .read(&[0x05, 0x00])
            .write(&[0x05, 0x01, 0x00, 0x01, 10, 0, 0, 1, 0x00, 0x16])
            .read(&[0x05, 0x00, 0x00, 0x01, 10, 0, 0])
            .build();

        let mut session = session(mock);
        session.authenticate(&Credentials::none()).await.unwrap();
        assert!(matches!(
            session
                .request_connect(&TargetAddr::ipv4(Ipv4Addr::new(10, 0, 0, 1), 22))
                .await,
            Err(Socks5Error::ProtocolViolation(_))
        ));
    }

    #[tokio::test]
    async fn test_command_before_authenticate() {
        let mock = Builder::new().build();
        let mut session = session(mock);

        assert!(matches!(
            session
                .request_connect(&TargetAddr::ipv4(Ipv4Addr::LOCALHOST, 80))
                .await,
            Err(Socks5Error::InvalidState(_))
        ));
        assert_eq!(session.state(), SessionState::New);
    }

    #[tokio::test]
    async fn test_connect_rejects_port_zero_before_sending() {
        let mock = Builder::new()
            .write(&[0x05, 0x01, 0x00])
            .read(&[0x05, 0x00])
            .build();

        let mut session = session(mock);
        session.authenticate(&Credentials::none()).await.unwrap();
        assert!(matches!(
            session
                .request_connect(&TargetAddr::ipv4(Ipv4Addr::LOCALHOST, 0))
                .await,
            Err(Socks5Error::InvalidAddress(_))
        ));
    }

    #[tokio::test]
    async fn test_udp_associate() {
        let mock = Builder::new()
            .write(&[0x05, 0x01, 0x00])
            .read(&[0x05, 0x00])
            .write(&[0x05, 0x03, 0x00, 0x01, 0, 0, 0, 0, 0, 0])
            .read(&[0x05, 0x00, 0x00, 0x01, 127, 0, 0, 1, 0x13, 0x88])
            .build();

        let mut session = session(mock);
        session.authenticate(&Credentials::none()).await.unwrap();
        let relay = session
            .request_udp_associate(&TargetAddr::unspecified())
            .await
            .unwrap();
        assert_eq!(relay, TargetAddr::ipv4(Ipv4Addr::LOCALHOST, 5000));
        assert_eq!(session.state(), SessionState::Established);
    }

    #[tokio::test]
    async fn test_bind_await_peer_blocks_until_second_reply() {
        let (client, mut server) = duplex(1024);

        let proxy = tokio::spawn(async move {
            let mut buf = [0u8; 10];
            server.read_exact(&mut buf[..3]).await.unwrap();
            assert_eq!(&buf[..3], &[0x05, 0x01, 0x00]);
            server.write_all(&[0x05, 0x00]).await.unwrap();

            server.read_exact(&mut buf).await.unwrap();
            assert_eq!(&buf, &[0x05, 0x02, 0x00, 0x01, 0, 0, 0, 0, 0, 0]);
            server
                .write_all(&[0x05, 0x00, 0x00, 0x01, 198, 51, 100, 1, 0x1F, 0x90])
                .await
                .unwrap();
            server
        });

        let mut session = session(client);
        session.authenticate(&Credentials::none()).await.unwrap();
        let bound = session.request_bind(&TargetAddr::unspecified()).await.unwrap();
        assert_eq!(bound, TargetAddr::ipv4(Ipv4Addr::new(198, 51, 100, 1), 8080));
        assert_eq!(session.state(), SessionState::AwaitingPeer);

        let mut server = proxy.await.unwrap();

        // No second reply yet: await_peer must not complete
        let pending = tokio::time::timeout(Duration::from_millis(50), session.await_peer()).await;
        assert!(pending.is_err());
        assert_eq!(session.state(), SessionState::AwaitingPeer);

        server
            .write_all(&[0x05, 0x00, 0x00, 0x01, 192, 0, 2, 44, 0xC3, 0x50])
            .await
            .unwrap();
        let peer = session.await_peer().await.unwrap();
        assert_eq!(peer, TargetAddr::ipv4(Ipv4Addr::new(192, 0, 2, 44), 50000));
        assert_eq!(session.state(), SessionState::PeerAccepted);

        assert!(matches!(
            session.await_peer().await,
            Err(Socks5Error::InvalidState(_))
        ));
    }

    #[tokio::test]
    async fn test_await_peer_without_bind() {
        let mock = Builder::new()
            .write(&[0x05, 0x01, 0x00])
            .read(&[0x05, 0x00])
            .build();

        let mut session = session(mock);
        session.authenticate(&Credentials::none()).await.unwrap();
        assert!(matches!(
            session.await_peer().await,
            Err(Socks5Error::InvalidState(_))
        ));
    }

    #[tokio::test]
    async fn test_close_is_idempotent() {
        let (client, _server) = duplex(64);
        let mut session = session(client);

        session.close().await.unwrap();
        session.close().await.unwrap();
        assert_eq!(session.state(), SessionState::Closed);
    }
}
