//! Read/write deadlines
//!
//! A deadline is an absolute instant after which pending and future
//! operations fail with [`io::ErrorKind::TimedOut`] until it is cleared or
//! moved.

use crate::error::{Result, Socks5Error};
use std::future::Future;
use std::io;
use std::pin::Pin;
use std::task::{Context, Poll};
use tokio::time::{sleep_until, Instant, Sleep};

/// Poll-side deadline for `AsyncRead`/`AsyncWrite` implementations
#[derive(Debug, Default)]
pub(crate) struct Deadline {
    at: Option<Instant>,
    sleep: Option<Pin<Box<Sleep>>>,
    expired: bool,
}

impl Deadline {
    /// Replace the deadline; `None` clears it
    ///
    /// The timer itself is created on the next poll, so this works outside
    /// a runtime.
    pub(crate) fn set(&mut self, at: Option<Instant>) {
        self.at = at;
        self.sleep = None;
        self.expired = false;
    }

    /// Ready with a timeout error once the deadline has passed
    ///
    /// Registers the waker, so a pending operation is woken when the
    /// deadline fires.
    pub(crate) fn poll_check(&mut self, cx: &mut Context<'_>) -> io::Result<()> {
        if !self.expired {
            if let Some(at) = self.at {
                let sleep = self.sleep.get_or_insert_with(|| Box::pin(sleep_until(at)));
                if sleep.as_mut().poll(cx).is_ready() {
                    self.expired = true;
                }
            }
        }

        if self.expired {
            Err(timed_out())
        } else {
            Ok(())
        }
    }
}

/// Run `fut` bounded by an optional deadline
pub(crate) async fn within<T, F>(deadline: Option<Instant>, fut: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    match deadline {
        Some(at) => tokio::time::timeout_at(at, fut)
            .await
            .map_err(|_| Socks5Error::Transport(timed_out()))?,
        None => fut.await,
    }
}

fn timed_out() -> io::Error {
    io::Error::new(io::ErrorKind::TimedOut, "i/o deadline exceeded")
}
