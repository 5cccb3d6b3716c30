//! Writer actor responsible for outbound chunks.
//!
//! The actor polls a shutdown token and the high- and low-priority push
//! queues using a `tokio::select!` loop. Exactly one chunk is written at a
//! time. A data chunk marked interruptible is written in slices; when a high
//! priority frame is waiting between slices the chunk is cut short with the
//! `+` flag so the waiting frame goes out first.

mod counter;
mod event;

use std::{io, num::NonZeroUsize};

use bytes::{Bytes, BytesMut};
pub use counter::{ActiveConnection, active_connection_count};
pub use event::WriteEvent;
use log::{debug, info, warn};
use tokio::{
    io::{AsyncWrite, AsyncWriteExt},
    sync::mpsc,
};
use tokio_util::sync::CancellationToken;

use crate::{
    chunk::{Chunk, Flag},
    codec::{self, CodecError},
    metrics::{self, Direction},
    push::PushQueues,
    traffic::TrafficLog,
};

/// Default number of body bytes written between interruption checks.
pub const DEFAULT_WRITE_SLICE: usize = 8 * 1024;

/// Frame queued for the writer.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Outbound {
    /// Written in one piece.
    Chunk(Chunk),
    /// A message data chunk, reported through [`WriteEvent`].
    ///
    /// An `interruptible` chunk should advertise an open-ended Byte-Range
    /// since the writer may end it early.
    Data { chunk: Chunk, interruptible: bool },
}

impl Outbound {
    #[must_use]
    pub fn chunk(&self) -> &Chunk {
        match self {
            Self::Chunk(chunk) | Self::Data { chunk, .. } => chunk,
        }
    }
}

/// Actor serialising chunks onto a transport.
///
/// # Examples
///
/// ```no_run
/// use std::num::NonZeroUsize;
///
/// use msrp::{connection::ChunkWriter, push::PushQueues, traffic::TrafficLog};
/// use tokio::sync::mpsc;
/// use tokio_util::sync::CancellationToken;
///
/// # async fn demo(io: tokio::io::DuplexStream) {
/// let (queues, _handle) = PushQueues::bounded(8, 8).expect("valid capacities");
/// let (events, _events_rx) = mpsc::unbounded_channel();
/// let writer = ChunkWriter::new(
///     io,
///     queues,
///     events,
///     CancellationToken::new(),
///     NonZeroUsize::new(8192).expect("non-zero"),
///     TrafficLog::new("local", "peer"),
/// );
/// let _ = writer.run().await;
/// # }
/// ```
pub struct ChunkWriter<W> {
    io: W,
    queues: PushQueues<Outbound>,
    events: mpsc::UnboundedSender<WriteEvent>,
    shutdown: CancellationToken,
    write_slice: NonZeroUsize,
    traffic: TrafficLog,
    buf: BytesMut,
}

impl<W> ChunkWriter<W>
where
    W: AsyncWrite + Unpin,
{
    #[must_use]
    pub fn new(
        io: W,
        queues: PushQueues<Outbound>,
        events: mpsc::UnboundedSender<WriteEvent>,
        shutdown: CancellationToken,
        write_slice: NonZeroUsize,
        traffic: TrafficLog,
    ) -> Self {
        Self {
            io,
            queues,
            events,
            shutdown,
            write_slice,
            traffic,
            buf: BytesMut::with_capacity(1024),
        }
    }

    /// Drive the writer until the queues close or shutdown is triggered.
    ///
    /// Once every [`PushHandle`](crate::push::PushHandle) is dropped the
    /// remaining frames are written and the transport is shut down.
    /// Cancelling the token stops immediately, abandoning queued frames.
    ///
    /// # Errors
    ///
    /// Returns the transport error that stopped the writer. The same error
    /// is also reported as [`WriteEvent::Failed`].
    pub async fn run(mut self) -> io::Result<()> {
        let result = self.run_inner().await;
        if let Err(e) = &result {
            warn!("chunk writer failed: error={e}");
            metrics::inc_errors(metrics::ErrorKind::Transport);
            let _ = self
                .events
                .send(WriteEvent::Failed(io::Error::new(e.kind(), e.to_string())));
        }
        self.queues.close();
        result
    }

    async fn run_inner(&mut self) -> io::Result<()> {
        loop {
            let next = tokio::select! {
                biased;

                () = self.shutdown.cancelled() => {
                    info!("chunk writer cancelled: peer={}", self.traffic.peer());
                    return Ok(());
                }
                next = self.queues.recv() => next,
            };
            let Some((priority, frame)) = next else {
                debug!("chunk writer drained: peer={}", self.traffic.peer());
                return self.io.shutdown().await;
            };
            tracing::trace!(?priority, chunk = %frame.chunk(), "writing chunk");
            match frame {
                Outbound::Chunk(chunk) => self.write_whole(&chunk).await?,
                Outbound::Data {
                    chunk,
                    interruptible,
                } => self.write_data(chunk, interruptible).await?,
            }
            self.io.flush().await?;
            metrics::inc_chunks(Direction::Outbound);
        }
    }

    async fn write_whole(&mut self, chunk: &Chunk) -> io::Result<()> {
        self.buf.clear();
        match codec::encode_chunk(chunk, &mut self.buf) {
            Ok(()) => self.write_buf().await,
            Err(e) => {
                self.reject(chunk, &e);
                Ok(())
            }
        }
    }

    async fn write_data(&mut self, chunk: Chunk, interruptible: bool) -> io::Result<()> {
        let transaction_id = chunk.transaction_id.clone();
        let Some(body) = chunk.body.clone() else {
            self.write_whole(&chunk).await?;
            self.notify(WriteEvent::Written { transaction_id });
            return Ok(());
        };
        if codec::contains_end_line(&body, &transaction_id) {
            self.reject(
                &chunk,
                &codec::FramingError::BoundaryInBody {
                    transaction_id: transaction_id.to_string(),
                }
                .into(),
            );
            return Ok(());
        }

        self.buf.clear();
        codec::encode_head(&chunk, &mut self.buf);
        self.write_buf().await?;

        let mut sent = 0;
        while sent < body.len() {
            let end = (sent + self.write_slice.get()).min(body.len());
            self.write_bytes(body.slice(sent..end)).await?;
            sent = end;
            // Interruptible chunks go out with an open-ended `n-*/total`
            // range, so cutting the body here and closing with `+` still
            // leaves a well-formed chunk. The outbound side resumes from
            // `sent` in a fresh transaction.
            if interruptible && sent < body.len() && self.queues.high_pending() {
                self.buf.clear();
                codec::encode_end_line(&transaction_id, Flag::Continue, true, &mut self.buf);
                self.write_buf().await?;
                tracing::debug!(%transaction_id, sent, "chunk interrupted");
                self.notify(WriteEvent::Interrupted {
                    transaction_id,
                    sent: sent as u64,
                });
                return Ok(());
            }
        }

        self.buf.clear();
        codec::encode_end_line(&transaction_id, chunk.flag, true, &mut self.buf);
        self.write_buf().await?;
        self.notify(WriteEvent::Written { transaction_id });
        Ok(())
    }

    async fn write_buf(&mut self) -> io::Result<()> {
        let bytes = self.buf.split().freeze();
        self.write_bytes(bytes).await
    }

    async fn write_bytes(&mut self, bytes: Bytes) -> io::Result<()> {
        self.io.write_all(&bytes).await?;
        self.traffic.outgoing(&bytes);
        Ok(())
    }

    fn reject(&self, chunk: &Chunk, error: &CodecError) {
        warn!(
            "chunk not written: transaction_id={}, error={error}",
            chunk.transaction_id
        );
        self.notify(WriteEvent::Rejected {
            transaction_id: chunk.transaction_id.clone(),
        });
    }

    fn notify(&self, event: WriteEvent) { let _ = self.events.send(event); }
}

#[cfg(test)]
mod tests;
