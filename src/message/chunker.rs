//! Outbound message slicing.

use std::num::NonZeroUsize;

use bytes::{Buf, Bytes, BytesMut};

use crate::chunk::{ByteRange, FailureReport, Flag, MessageId, SuccessReport, TransactionId};

/// One piece of an outgoing message body.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Slice {
    /// Zero-based offset of `body` within the message.
    pub offset: u64,
    pub body: Bytes,
    /// Message size, when known.
    pub total: Option<u64>,
    pub flag: Flag,
}

impl Slice {
    /// `Byte-Range` header for this slice.
    ///
    /// An open-ended range (`n-*/total`) lets the writer cut the chunk short.
    #[must_use]
    pub fn byte_range(&self, open_ended: bool) -> ByteRange {
        ByteRange::from_span(self.offset, self.body.len() as u64, self.total, open_ended)
    }

    #[must_use]
    pub fn is_last(&self) -> bool { self.flag == Flag::End }
}

/// Cut the next slice from `available`, which starts at `offset`.
///
/// `finished` states that no bytes follow `available`.
fn cut(available: &Bytes, offset: u64, max: usize, finished: bool) -> Slice {
    let take = available.len().min(max);
    let last = finished && take == available.len();
    Slice {
        offset,
        body: available.slice(..take),
        total: finished.then(|| offset + available.len() as u64),
        flag: if last { Flag::End } else { Flag::Continue },
    }
}

/// Splits complete bodies into slices of at most `max_chunk_size` bytes.
///
/// # Examples
///
/// ```
/// use std::num::NonZeroUsize;
///
/// use bytes::Bytes;
/// use msrp::{chunk::Flag, message::Chunker};
///
/// let chunker = Chunker::new(NonZeroUsize::new(4).expect("non-zero"));
/// let slices = chunker.split(&Bytes::from_static(b"0123456789"));
/// assert_eq!(slices.len(), 3);
/// assert_eq!(slices[2].byte_range(false).to_string(), "9-10/10");
/// assert_eq!(slices[2].flag, Flag::End);
/// ```
#[derive(Clone, Copy, Debug)]
pub struct Chunker {
    max_chunk_size: NonZeroUsize,
}

impl Chunker {
    #[must_use]
    pub fn new(max_chunk_size: NonZeroUsize) -> Self { Self { max_chunk_size } }

    #[must_use]
    pub fn max_chunk_size(&self) -> NonZeroUsize { self.max_chunk_size }

    /// All slices of `body`, in order. An empty body yields one empty slice.
    #[must_use]
    pub fn split(&self, body: &Bytes) -> Vec<Slice> {
        let mut slices = Vec::with_capacity(body.len().div_ceil(self.max_chunk_size.get()).max(1));
        let mut offset = 0;
        loop {
            let slice = cut(&body.slice(offset..), offset as u64, self.max_chunk_size.get(), true);
            offset += slice.body.len();
            let last = slice.is_last();
            slices.push(slice);
            if last {
                return slices;
            }
        }
    }
}

#[derive(Debug)]
enum Source {
    Whole(Bytes),
    /// Bytes not yet confirmed on the wire, starting at the message offset.
    /// `staged` holds the slice split off for the current chunk and
    /// `pending` everything after it.
    Stream {
        staged: Bytes,
        pending: BytesMut,
        finished: bool,
    },
}

#[derive(Debug)]
struct InFlight {
    transaction_id: TransactionId,
    body: Bytes,
    last: bool,
}

/// Sender-side progress of one message.
///
/// At most one slice is in flight at a time. The slice is confirmed with
/// [`on_written`](Self::on_written), or cut short with
/// [`on_interrupted`](Self::on_interrupted), after which the next slice
/// resumes exactly at the number of bytes transmitted.
#[derive(Debug)]
pub struct OutgoingMessage {
    message_id: MessageId,
    content_type: String,
    success_report: SuccessReport,
    failure_report: FailureReport,
    source: Source,
    offset: u64,
    in_flight: Option<InFlight>,
    all_sent: bool,
    outstanding: usize,
}

impl OutgoingMessage {
    /// Message with a body known up front.
    #[must_use]
    pub fn whole(message_id: MessageId, content_type: impl Into<String>, body: Bytes) -> Self {
        Self::with_source(message_id, content_type.into(), Source::Whole(body))
    }

    /// Message whose body is supplied incrementally; its size is unknown until
    /// [`finish`](Self::finish) is called.
    #[must_use]
    pub fn stream(message_id: MessageId, content_type: impl Into<String>) -> Self {
        Self::with_source(
            message_id,
            content_type.into(),
            Source::Stream {
                staged: Bytes::new(),
                pending: BytesMut::new(),
                finished: false,
            },
        )
    }

    fn with_source(message_id: MessageId, content_type: String, source: Source) -> Self {
        Self {
            message_id,
            content_type,
            success_report: SuccessReport::default(),
            failure_report: FailureReport::default(),
            source,
            offset: 0,
            in_flight: None,
            all_sent: false,
            outstanding: 0,
        }
    }

    #[must_use]
    pub fn with_reports(mut self, success: SuccessReport, failure: FailureReport) -> Self {
        self.success_report = success;
        self.failure_report = failure;
        self
    }

    #[must_use]
    pub fn message_id(&self) -> &MessageId { &self.message_id }

    #[must_use]
    pub fn content_type(&self) -> &str { &self.content_type }

    #[must_use]
    pub fn success_report(&self) -> SuccessReport { self.success_report }

    #[must_use]
    pub fn failure_report(&self) -> FailureReport { self.failure_report }

    /// Bytes confirmed on the wire.
    #[must_use]
    pub fn offset(&self) -> u64 { self.offset }

    /// Message size, once known.
    #[must_use]
    pub fn total(&self) -> Option<u64> {
        match &self.source {
            Source::Whole(body) => Some(body.len() as u64),
            Source::Stream {
                staged,
                pending,
                finished: true,
            } => Some(self.offset + (staged.len() + pending.len()) as u64),
            Source::Stream { .. } => None,
        }
    }

    /// Append streamed body bytes. Ignored for whole bodies and finished
    /// streams.
    pub fn push_data(&mut self, data: &[u8]) {
        if let Source::Stream {
            pending,
            finished: false,
            ..
        } = &mut self.source
        {
            pending.extend_from_slice(data);
        }
    }

    /// Mark a streamed body complete.
    pub fn finish(&mut self) {
        if let Source::Stream { finished, .. } = &mut self.source {
            *finished = true;
        }
    }

    /// Whether every byte has been written.
    #[must_use]
    pub fn all_sent(&self) -> bool { self.all_sent }

    #[must_use]
    pub fn in_flight(&self) -> Option<&TransactionId> {
        self.in_flight.as_ref().map(|f| &f.transaction_id)
    }

    /// Transactions of this message still awaiting a response.
    #[must_use]
    pub fn outstanding(&self) -> usize { self.outstanding }

    /// Whether the message is fully written and acknowledged.
    #[must_use]
    pub fn is_delivered(&self) -> bool { self.all_sent && self.outstanding == 0 }

    /// Next slice to transmit, if one is ready.
    ///
    /// Returns `None` while a slice is in flight, after the last slice, or
    /// when a stream has fewer than `max_chunk_size` bytes buffered and is
    /// not finished.
    pub fn next_slice(&mut self, max_chunk_size: NonZeroUsize) -> Option<Slice> {
        if self.in_flight.is_some() || self.all_sent {
            return None;
        }
        let max = max_chunk_size.get();
        let slice = match &mut self.source {
            Source::Whole(body) => {
                let start = usize::try_from(self.offset).ok()?;
                cut(&body.slice(start..), self.offset, max, true)
            }
            Source::Stream {
                staged,
                pending,
                finished,
            } => {
                if staged.is_empty() {
                    if !*finished && pending.len() < max {
                        return None;
                    }
                    *staged = pending.split_to(pending.len().min(max)).freeze();
                }
                let last = *finished && pending.is_empty();
                Slice {
                    offset: self.offset,
                    body: staged.clone(),
                    total: finished.then(|| self.offset + (staged.len() + pending.len()) as u64),
                    flag: if last { Flag::End } else { Flag::Continue },
                }
            }
        };
        Some(slice)
    }

    /// Record that `slice` was queued as transaction `transaction_id`.
    pub fn on_queued(&mut self, slice: &Slice, transaction_id: TransactionId) {
        self.outstanding += 1;
        self.in_flight = Some(InFlight {
            transaction_id,
            body: slice.body.clone(),
            last: slice.is_last(),
        });
    }

    /// The in-flight slice was written completely.
    pub fn on_written(&mut self, transaction_id: &TransactionId) {
        let Some(in_flight) = self.take_in_flight(transaction_id) else {
            return;
        };
        self.advance(in_flight.body.len());
        if in_flight.last {
            self.all_sent = true;
        }
    }

    /// The in-flight slice was cut short after `sent` body bytes.
    pub fn on_interrupted(&mut self, transaction_id: &TransactionId, sent: u64) {
        let Some(in_flight) = self.take_in_flight(transaction_id) else {
            return;
        };
        let sent = usize::try_from(sent).map_or(in_flight.body.len(), |s| s.min(in_flight.body.len()));
        self.advance(sent);
    }

    /// A transaction of this message received a successful response.
    pub fn on_acknowledged(&mut self) { self.outstanding = self.outstanding.saturating_sub(1); }

    /// Empty slice terminating the message with the abort flag.
    #[must_use]
    pub fn abort_slice(&self) -> Slice {
        Slice {
            offset: self.offset,
            body: Bytes::new(),
            total: self.total(),
            flag: Flag::Abort,
        }
    }

    fn take_in_flight(&mut self, transaction_id: &TransactionId) -> Option<InFlight> {
        if self.in_flight.as_ref()?.transaction_id != *transaction_id {
            return None;
        }
        self.in_flight.take()
    }

    fn advance(&mut self, written: usize) {
        self.offset += written as u64;
        if let Source::Stream {
            staged, pending, ..
        } = &mut self.source
        {
            let from_staged = written.min(staged.len());
            staged.advance(from_staged);
            pending.advance((written - from_staged).min(pending.len()));
        }
    }
}
