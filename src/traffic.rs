//! Raw traffic logging.
//!
//! Bytes crossing a connection are logged at `trace` level under the
//! `msrp::traffic` target, headed `local --> peer` for outbound data and
//! `local <-- peer` for inbound data. Enable the target to capture complete
//! wire transcripts.

use std::{
    io,
    pin::Pin,
    sync::Arc,
    task::{Context, Poll},
};

use log::{Level, log_enabled, trace};
use tokio::io::{AsyncRead, ReadBuf};

/// Log target used for raw traffic.
pub const TARGET: &str = "msrp::traffic";

/// Labels naming both ends of a connection.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TrafficLog {
    local: Arc<str>,
    peer: Arc<str>,
}

impl TrafficLog {
    #[must_use]
    pub fn new(local: impl AsRef<str>, peer: impl AsRef<str>) -> Self {
        Self {
            local: Arc::from(local.as_ref()),
            peer: Arc::from(peer.as_ref()),
        }
    }

    #[must_use]
    pub fn local(&self) -> &str { &self.local }

    #[must_use]
    pub fn peer(&self) -> &str { &self.peer }

    /// Log bytes written to the peer.
    pub fn outgoing(&self, data: &[u8]) {
        if data.is_empty() || !log_enabled!(target: TARGET, Level::Trace) {
            return;
        }
        trace!(
            target: TARGET,
            "{} --> {}\n{}",
            self.local,
            self.peer,
            String::from_utf8_lossy(data)
        );
    }

    /// Log bytes read from the peer.
    pub fn incoming(&self, data: &[u8]) {
        if data.is_empty() || !log_enabled!(target: TARGET, Level::Trace) {
            return;
        }
        trace!(
            target: TARGET,
            "{} <-- {}\n{}",
            self.local,
            self.peer,
            String::from_utf8_lossy(data)
        );
    }
}

/// Reader adapter logging every byte it yields.
pub struct LoggedReader<R> {
    inner: R,
    log: TrafficLog,
}

impl<R> LoggedReader<R> {
    pub fn new(inner: R, log: TrafficLog) -> Self { Self { inner, log } }

    pub fn into_inner(self) -> R { self.inner }
}

impl<R: AsyncRead + Unpin> AsyncRead for LoggedReader<R> {
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        let before = buf.filled().len();
        let poll = Pin::new(&mut self.inner).poll_read(cx, buf);
        if let Poll::Ready(Ok(())) = &poll
            && let Some(read) = buf.filled().get(before..)
        {
            self.log.incoming(read);
        }
        poll
    }
}
