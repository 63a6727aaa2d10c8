//! Test utilities for Sockdial
//!
//! A scripted fake SOCKS5 proxy on 127.0.0.1: each test spawns a handler
//! that plays the server side of one control connection byte for byte.

#![allow(dead_code)]

use sockdial::socks::codec::decode_address;
use sockdial::socks::{Frame, FrameKind, FrameObserver};
use sockdial::{ClientConfig, TargetAddr};
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Mutex;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;

/// Create a test TCP listener on an available port
pub async fn create_test_listener() -> (TcpListener, SocketAddr) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    (listener, addr)
}

/// Spawn a fake proxy that serves exactly one control connection
pub async fn spawn_proxy<F, Fut, T>(handler: F) -> (SocketAddr, JoinHandle<T>)
where
    F: FnOnce(TcpStream) -> Fut + Send + 'static,
    Fut: Future<Output = T> + Send + 'static,
    T: Send + 'static,
{
    let (listener, addr) = create_test_listener().await;
    let task = tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        handler(stream).await
    });
    (addr, task)
}

/// Client configuration pointing at a fake proxy
pub fn config_for(addr: SocketAddr) -> ClientConfig {
    ClientConfig::new(addr.to_string())
}

/// Read exactly `expected.len()` bytes and compare
pub async fn expect_bytes(stream: &mut TcpStream, expected: &[u8]) {
    let mut buf = vec![0u8; expected.len()];
    stream.read_exact(&mut buf).await.unwrap();
    assert_eq!(buf, expected);
}

/// Serve the greeting for a client without credentials
pub async fn negotiate_no_auth(stream: &mut TcpStream) {
    expect_bytes(stream, &[0x05, 0x01, 0x00]).await;
    stream.write_all(&[0x05, 0x00]).await.unwrap();
}

/// Serve the greeting and username/password exchange, answering `status`
pub async fn negotiate_password(stream: &mut TcpStream, username: &str, password: &str, status: u8) {
    expect_bytes(stream, &[0x05, 0x01, 0x02]).await;
    stream.write_all(&[0x05, 0x02]).await.unwrap();

    let mut expected = vec![0x01, username.len() as u8];
    expected.extend_from_slice(username.as_bytes());
    expected.push(password.len() as u8);
    expected.extend_from_slice(password.as_bytes());
    expect_bytes(stream, &expected).await;

    stream.write_all(&[0x01, status]).await.unwrap();
}

/// Read one command request, returning the command byte and the address
pub async fn read_request(stream: &mut TcpStream) -> (u8, TargetAddr) {
    let mut head = [0u8; 4];
    stream.read_exact(&mut head).await.unwrap();
    assert_eq!(head[0], 0x05);
    assert_eq!(head[2], 0x00);

    let mut addr = vec![head[3]];
    let rest = match head[3] {
        0x01 => 4 + 2,
        0x04 => 16 + 2,
        0x03 => {
            let len = stream.read_u8().await.unwrap();
            addr.push(len);
            len as usize + 2
        }
        other => panic!("unexpected ATYP {}", other),
    };
    let mut tail = vec![0u8; rest];
    stream.read_exact(&mut tail).await.unwrap();
    addr.extend_from_slice(&tail);

    let (target, used) = decode_address(&addr).unwrap();
    assert_eq!(used, addr.len());
    (head[1], target)
}

/// Write a command reply with an IPv4 bound address
pub async fn reply(stream: &mut TcpStream, status: u8, bound: SocketAddr) {
    let ip = match bound {
        SocketAddr::V4(v4) => v4.ip().octets(),
        SocketAddr::V6(_) => panic!("fake proxy only replies with IPv4"),
    };
    let mut buf = vec![0x05, status, 0x00, 0x01];
    buf.extend_from_slice(&ip);
    buf.extend_from_slice(&bound.port().to_be_bytes());
    stream.write_all(&buf).await.unwrap();
}

/// Observer that records frame kinds
#[derive(Debug, Default)]
pub struct KindRecorder {
    kinds: Mutex<Vec<FrameKind>>,
}

impl KindRecorder {
    pub fn kinds(&self) -> Vec<FrameKind> {
        self.kinds.lock().unwrap().clone()
    }
}

impl FrameObserver for KindRecorder {
    fn on_frame(&self, frame: &Frame<'_>) {
        self.kinds.lock().unwrap().push(frame.kind);
    }
}
