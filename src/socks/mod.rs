//! SOCKS5 protocol engine
//!
//! Client side of RFC 1928 and RFC 1929: the wire codec, the control session
//! that drives a single proxy connection, and the frame observer hook.

pub mod codec;
pub mod consts;
pub mod observer;
pub mod session;
pub mod types;

pub use observer::{Direction, Frame, FrameKind, FrameObserver, TracingObserver};
pub use session::{ControlSession, SessionState};
pub use types::{AuthMethod, Credentials, SocksCommand, TargetAddr};
