//! Frame observation hook
//!
//! Every control-channel message and every relay datagram is reported to a
//! [`FrameObserver`] after it is encoded (outbound) or decoded (inbound).
//! The default observer forwards frames to `tracing` at trace level.

use super::types::{SocksCommand, TargetAddr};
use std::fmt;
use tracing::trace;

/// Which way a frame travelled
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// Client to proxy
    Outbound,
    /// Proxy to client
    Inbound,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::Outbound => write!(f, "->"),
            Direction::Inbound => write!(f, "<-"),
        }
    }
}

/// Decoded header fields of a frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameKind {
    /// Method negotiation greeting with the single advertised method
    Greeting {
        /// Advertised method byte
        method: u8,
    },
    /// Method selected by the proxy
    MethodSelection {
        /// Selected method byte
        method: u8,
    },
    /// Username/password request (contents are never reported)
    AuthRequest,
    /// Username/password reply
    AuthReply {
        /// Status byte
        status: u8,
    },
    /// Command request
    CommandRequest {
        /// Requested command
        command: SocksCommand,
    },
    /// Command reply
    CommandReply {
        /// Reply status byte
        status: u8,
    },
    /// Relay datagram
    Datagram,
    /// Data-plane bytes on a stream
    Stream,
}

/// A single observed frame
#[derive(Debug, Clone, Copy)]
pub struct Frame<'a> {
    /// Direction
    pub direction: Direction,
    /// Decoded header
    pub kind: FrameKind,
    /// Size on the wire, headers included
    pub size: usize,
    /// Address carried by the frame, if any
    pub addr: Option<&'a TargetAddr>,
}

impl<'a> Frame<'a> {
    /// Frame sent to the proxy
    pub fn outbound(kind: FrameKind, size: usize) -> Self {
        Frame {
            direction: Direction::Outbound,
            kind,
            size,
            addr: None,
        }
    }

    /// Frame received from the proxy
    pub fn inbound(kind: FrameKind, size: usize) -> Self {
        Frame {
            direction: Direction::Inbound,
            kind,
            size,
            addr: None,
        }
    }

    /// Attach the address carried by the frame
    pub fn with_addr(mut self, addr: &'a TargetAddr) -> Self {
        self.addr = Some(addr);
        self
    }
}

/// Callback invoked for every frame
pub trait FrameObserver: Send + Sync + fmt::Debug {
    /// Called once per frame
    fn on_frame(&self, frame: &Frame<'_>);
}

/// Observer that emits one `trace!` event per frame
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingObserver;

impl FrameObserver for TracingObserver {
    fn on_frame(&self, frame: &Frame<'_>) {
        match frame.addr {
            Some(addr) => trace!(
                direction = %frame.direction,
                kind = ?frame.kind,
                size = frame.size,
                addr = %addr,
                "socks5 frame"
            ),
            None => trace!(
                direction = %frame.direction,
                kind = ?frame.kind,
                size = frame.size,
                "socks5 frame"
            ),
        }
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use std::sync::Mutex;

    /// Observer that records frames for assertions
    #[derive(Debug, Default)]
    pub struct RecordingObserver {
        frames: Mutex<Vec<(Direction, FrameKind, usize, Option<TargetAddr>)>>,
    }

    impl RecordingObserver {
        pub fn frames(&self) -> Vec<(Direction, FrameKind, usize, Option<TargetAddr>)> {
            self.frames.lock().unwrap().clone()
        }

        pub fn kinds(&self) -> Vec<FrameKind> {
            self.frames().into_iter().map(|(_, kind, _, _)| kind).collect()
        }
    }

    impl FrameObserver for RecordingObserver {
        fn on_frame(&self, frame: &Frame<'_>) {
            self.frames.lock().unwrap().push((
                frame.direction,
                frame.kind,
                frame.size,
                frame.addr.cloned(),
            ));
        }
    }
}
