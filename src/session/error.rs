//! Errors surfaced by sessions and their handles.

use std::io;

use thiserror::Error;
use tokio::time::Duration;

use super::SessionState;
use crate::{
    chunk::MessageId,
    codec::{CodecError, ProtocolError},
    path::PathError,
    push::PushConfigError,
    status::StatusCode,
};

/// Why a session stopped or refused an operation.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("transport error: {0}")]
    Transport(#[from] io::Error),

    /// The inbound stream could not be framed any further.
    #[error("codec error: {0}")]
    Codec(#[from] CodecError),

    #[error("transport not connected within {0:?}")]
    ConnectTimedOut(Duration),

    /// The peer answered the binding SEND with an error.
    #[error("session setup rejected: {0}")]
    SetupRejected(StatusCode),

    #[error("session setup timed out")]
    SetupTimedOut,

    #[error("connection closed by peer")]
    ConnectionClosed,

    /// The configured route is not a valid path.
    #[error("invalid path: {0}")]
    Path(#[from] PathError),

    /// New messages are refused in this state.
    #[error("session is {0}; no new messages accepted")]
    NotAccepting(SessionState),

    /// The session worker has stopped.
    #[error("session closed")]
    Closed,

    #[error("no outgoing message {0}")]
    UnknownMessage(MessageId),

    #[error(transparent)]
    InvalidState(#[from] ProtocolError),

    #[error("invalid queue configuration: {0}")]
    Config(#[from] PushConfigError),
}

impl SessionError {
    /// Whether the error ended the session rather than a single request.
    #[must_use]
    pub fn is_fatal(&self) -> bool {
        !matches!(
            self,
            Self::NotAccepting(_) | Self::UnknownMessage(_) | Self::Closed
        )
    }
}
