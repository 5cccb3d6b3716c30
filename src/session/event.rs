//! Notifications delivered to the application.

use bytes::Bytes;

use super::{SessionError, SessionState};
use crate::{
    chunk::{ByteRange, MessageId, Status},
    status::StatusCode,
};

/// Why an inbound message was discarded.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AbortReason {
    /// The sender terminated it with the `#` flag.
    Sender,
    /// No chunk arrived within the reassembly timeout.
    TimedOut,
    /// A chunk was refused with this status.
    Rejected(StatusCode),
    /// The session closed first.
    SessionClosed,
}

/// Why an outbound message was not delivered.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DeliveryFailure {
    /// The peer answered a chunk with an error status.
    Rejected(StatusCode),
    /// A chunk received no response in time.
    TimedOut,
    /// The application aborted the message.
    Aborted,
    /// The session closed first.
    SessionClosed,
    /// A chunk could not be framed for the wire.
    Unwritable,
}

/// Progress of an outbound message.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum DeliveryStatus {
    /// Every chunk was acknowledged with `200`.
    Sent,
    Failed(DeliveryFailure),
    /// The peer sent a REPORT for the message.
    Report {
        status: Status,
        byte_range: Option<ByteRange>,
    },
}

/// Event emitted by a running session.
#[derive(Debug)]
pub enum SessionEvent {
    StateChanged(SessionState),
    /// A complete inbound message.
    MessageReceived {
        message_id: MessageId,
        content_type: Option<String>,
        body: Bytes,
    },
    MessageAborted {
        message_id: MessageId,
        received: u64,
        reason: AbortReason,
    },
    DeliveryStatus {
        message_id: MessageId,
        status: DeliveryStatus,
    },
    /// The session reached `CLOSED`. `error` is set when it did not close
    /// on request.
    Closed { error: Option<SessionError> },
}
