//! Inbound message reassembly.
//!
//! [`Reassembler`] tracks in-progress messages keyed by [`MessageId`]. Each
//! SEND chunk must continue exactly where the received prefix ends; a message
//! is released only when an END chunk completes it, so consumers never see a
//! partial body.

use std::{
    collections::{HashMap, hash_map::Entry},
    num::NonZeroUsize,
};

use bytes::{Bytes, BytesMut};
use tokio::time::{Duration, Instant};

use super::ReassemblyError;
use crate::chunk::{ByteRange, Chunk, Flag, MessageId};

/// A fully reassembled message.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ReceivedMessage<C> {
    pub message_id: MessageId,
    pub content_type: Option<String>,
    pub body: Bytes,
    /// Context captured from the first chunk.
    pub context: C,
}

/// A message the sender abandoned with the `#` flag.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AbortedMessage<C> {
    pub message_id: MessageId,
    /// Bytes received before the abort.
    pub received: u64,
    /// Declared size of the message, when known.
    pub total: Option<u64>,
    pub context: C,
}

/// A partial message evicted after sitting idle too long.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ExpiredMessage<C> {
    pub message_id: MessageId,
    pub received: u64,
    pub total: Option<u64>,
    pub context: C,
}

/// Result of feeding one chunk to the [`Reassembler`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ChunkOutcome<C> {
    /// More chunks are expected.
    Incomplete { message_id: MessageId, received: u64 },
    Complete(ReceivedMessage<C>),
    Aborted(AbortedMessage<C>),
}

#[derive(Debug)]
struct PartialMessage<C> {
    total: Option<u64>,
    content_type: Option<String>,
    buffer: BytesMut,
    last_activity: Instant,
    context: C,
}

impl<C> PartialMessage<C> {
    fn received(&self) -> u64 { self.buffer.len() as u64 }
}

/// Per-session reassembly state.
///
/// # Examples
///
/// ```
/// use std::num::NonZeroUsize;
///
/// use bytes::Bytes;
/// use msrp::{
///     chunk::{ByteRange, Chunk, Flag, Header, MessageId, Method, TransactionId},
///     message::{ChunkOutcome, Reassembler},
/// };
/// use tokio::time::{Duration, Instant};
///
/// let mut reassembler = Reassembler::new(
///     NonZeroUsize::new(1024).expect("non-zero"),
///     Duration::from_secs(60),
/// );
/// let chunk = |range: &str, body: &'static [u8], flag| {
///     Chunk::request(TransactionId::new("tx000001").expect("valid id"), Method::Send)
///         .with_header(Header::MessageId(MessageId::new("m1").expect("valid id")))
///         .with_header(Header::ByteRange(range.parse::<ByteRange>().expect("valid range")))
///         .with_body(Bytes::from_static(body))
///         .with_flag(flag)
/// };
/// let now = Instant::now();
/// let first = reassembler
///     .push_at(&chunk("1-5/10", b"hello", Flag::Continue), (), now)
///     .expect("first chunk");
/// assert!(matches!(first, ChunkOutcome::Incomplete { received: 5, .. }));
/// let ChunkOutcome::Complete(message) = reassembler
///     .push_at(&chunk("6-10/10", b"world", Flag::End), (), now)
///     .expect("second chunk")
/// else {
///     panic!("message should complete");
/// };
/// assert_eq!(&message.body[..], b"helloworld");
/// ```
#[derive(Debug)]
pub struct Reassembler<C> {
    max_message_size: NonZeroUsize,
    timeout: Duration,
    messages: HashMap<MessageId, PartialMessage<C>>,
}

impl<C> Reassembler<C> {
    /// Create a reassembler accepting messages up to `max_message_size`
    /// bytes and evicting partial messages idle for `timeout`.
    #[must_use]
    pub fn new(max_message_size: NonZeroUsize, timeout: Duration) -> Self {
        Self {
            max_message_size,
            timeout,
            messages: HashMap::new(),
        }
    }

    /// Feed a SEND chunk received at `now`.
    ///
    /// `context` is stored when the chunk starts a new message and dropped
    /// otherwise. A chunk without a `Byte-Range` is treated as covering the
    /// whole message.
    ///
    /// # Errors
    ///
    /// Returns [`ReassemblyError`] when the chunk cannot extend its message
    /// contiguously. The partial message, if any, is discarded.
    pub fn push_at(
        &mut self,
        chunk: &Chunk,
        context: C,
        now: Instant,
    ) -> Result<ChunkOutcome<C>, ReassemblyError> {
        let message_id = chunk
            .message_id()
            .cloned()
            .ok_or(ReassemblyError::MissingMessageId)?;
        let body: &[u8] = chunk.body.as_deref().unwrap_or_default();
        let len = body.len() as u64;
        let range = chunk.byte_range().unwrap_or_else(|| {
            ByteRange::from_span(0, len, (chunk.flag == Flag::End).then_some(len), false)
        });

        if chunk.flag == Flag::Abort {
            let (received, total, context) = match self.messages.remove(&message_id) {
                Some(partial) => (partial.received(), partial.total.or(range.total()), partial.context),
                None => (0, range.total(), context),
            };
            return Ok(ChunkOutcome::Aborted(AbortedMessage {
                message_id,
                received,
                total,
                context,
            }));
        }

        let result = self.extend(&message_id, &range, chunk, context, now);
        if result.is_err() {
            self.messages.remove(&message_id);
        }
        result
    }

    fn extend(
        &mut self,
        message_id: &MessageId,
        range: &ByteRange,
        chunk: &Chunk,
        context: C,
        now: Instant,
    ) -> Result<ChunkOutcome<C>, ReassemblyError> {
        let body: &[u8] = chunk.body.as_deref().unwrap_or_default();
        let len = body.len() as u64;
        let offset = range.offset();
        if let Some(end) = range.end() {
            let declared = end - offset;
            if declared != len {
                return Err(ReassemblyError::LengthMismatch {
                    declared,
                    actual: len,
                });
            }
        }
        let limit = self.max_message_size.get();
        let Some(chunk_end) = offset.checked_add(len) else {
            return Err(ReassemblyError::TooLarge {
                size: u64::MAX,
                limit,
            });
        };
        let size = range.total().unwrap_or(0).max(chunk_end);
        if size > limit as u64 {
            return Err(ReassemblyError::TooLarge { size, limit });
        }

        let mut entry = match self.messages.entry(message_id.clone()) {
            Entry::Occupied(entry) => entry,
            Entry::Vacant(entry) => entry.insert_entry(PartialMessage {
                total: None,
                content_type: None,
                buffer: BytesMut::new(),
                last_activity: now,
                context,
            }),
        };
        let partial = entry.get_mut();

        let received = partial.received();
        if offset > received {
            return Err(ReassemblyError::Gap {
                expected: received,
                found: offset,
            });
        }
        if offset < received {
            return Err(ReassemblyError::Overlap {
                expected: received,
                found: offset,
            });
        }
        match (partial.total, range.total()) {
            (Some(previous), Some(found)) if previous != found => {
                return Err(ReassemblyError::TotalConflict { previous, found });
            }
            (None, Some(found)) => partial.total = Some(found),
            _ => {}
        }
        if let Some(total) = partial.total
            && chunk_end > total
        {
            return Err(ReassemblyError::ExceedsTotal {
                end: chunk_end,
                total,
            });
        }
        if partial.content_type.is_none() {
            partial.content_type = chunk.content_type().map(str::to_owned);
        }
        partial.buffer.extend_from_slice(body);
        partial.last_activity = now;

        let received = partial.received();
        if chunk.flag == Flag::Continue {
            return Ok(ChunkOutcome::Incomplete {
                message_id: message_id.clone(),
                received,
            });
        }
        if let Some(total) = partial.total
            && received != total
        {
            return Err(ReassemblyError::PrematureEnd { received, total });
        }
        let partial = entry.remove();
        Ok(ChunkOutcome::Complete(ReceivedMessage {
            message_id: message_id.clone(),
            content_type: partial.content_type,
            body: partial.buffer.freeze(),
            context: partial.context,
        }))
    }

    /// Evict partial messages idle for at least the configured timeout.
    pub fn purge_expired_at(&mut self, now: Instant) -> Vec<ExpiredMessage<C>> {
        let timeout = self.timeout;
        let expired: Vec<MessageId> = self
            .messages
            .iter()
            .filter(|(_, p)| now.saturating_duration_since(p.last_activity) >= timeout)
            .map(|(id, _)| id.clone())
            .collect();
        expired
            .into_iter()
            .filter_map(|message_id| {
                let partial = self.messages.remove(&message_id)?;
                Some(ExpiredMessage {
                    received: partial.received(),
                    total: partial.total,
                    context: partial.context,
                    message_id,
                })
            })
            .collect()
    }

    /// When the next partial message would expire.
    #[must_use]
    pub fn next_deadline(&self) -> Option<Instant> {
        self.messages
            .values()
            .map(|p| p.last_activity + self.timeout)
            .min()
    }

    /// Discard every partial message.
    pub fn drain(&mut self) -> Vec<AbortedMessage<C>> {
        self.messages
            .drain()
            .map(|(message_id, partial)| AbortedMessage {
                received: partial.received(),
                total: partial.total,
                context: partial.context,
                message_id,
            })
            .collect()
    }

    #[must_use]
    pub fn contains(&self, message_id: &MessageId) -> bool { self.messages.contains_key(message_id) }

    /// Bytes buffered so far for `message_id`.
    #[must_use]
    pub fn received(&self, message_id: &MessageId) -> Option<u64> {
        self.messages.get(message_id).map(PartialMessage::received)
    }

    /// Number of partial messages buffered.
    #[must_use]
    pub fn buffered_count(&self) -> usize { self.messages.len() }
}
