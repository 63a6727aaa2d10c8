//! # Sockdial - SOCKS5 Client
//!
//! Sockdial reaches the network through a remote SOCKS5 proxy (RFC 1928,
//! RFC 1929). Each logical operation gets its own control connection to the
//! proxy, authenticated with either no authentication or username/password.
//!
//! ## Features
//!
//! - **CONNECT**: outbound TCP streams, with domain targets resolved by the proxy
//! - **BIND**: accept a single inbound TCP connection via the proxy
//! - **UDP ASSOCIATE**: send and receive datagrams through the proxy's relay
//! - **Deadlines and cross-task close** on every connection flavor
//! - **Frame observer** hook for every control message and datagram
//!
//! ## Usage
//!
//! ```rust,ignore
//! use sockdial::{Client, ClientConfig};
//! use tokio::io::AsyncWriteExt;
//!
//! #[tokio::main]
//! async fn main() -> sockdial::Result<()> {
//!     let client = Client::new(ClientConfig::new("127.0.0.1:1080"))?;
//!
//!     let mut stream = client.dial_tcp(&"example.com:80".parse()?).await?;
//!     stream.write_all(b"GET / HTTP/1.0\r\n\r\n").await?;
//!
//!     let packets = client.dial_udp(&"198.51.100.2:53".parse()?).await?;
//!     packets.write(b"query").await?;
//!     Ok(())
//! }
//! ```
//!
//! ## Architecture
//!
//! ```text
//! Client -> transport (control TCP) -> ControlSession -> StreamConnection
//!                                                     -> ListenerHandle
//!                                                     -> PacketConnection
//! ```

#![warn(missing_docs)]
#![warn(rust_2018_idioms)]

pub mod client;
pub mod config;
pub mod error;
pub mod socks;
pub mod transport;

// Re-export commonly used items
pub use client::{
    Client, CloseHandle, Dialed, ListenerHandle, PacketConnection, ProxySocket, StreamConnection,
};
pub use config::{load_config, ClientConfig, Config};
pub use error::{ReplyCode, Result, Socks5Error};
pub use socks::{Credentials, FrameObserver, TargetAddr};

/// Version of the Sockdial library
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Name of the application
pub const NAME: &str = env!("CARGO_PKG_NAME");
