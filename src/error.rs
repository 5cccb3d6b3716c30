//! Canonical error and result types for the crate.
//!
//! [`MsrpError`] folds the error classes of the individual layers into one
//! surface and maps each to the status code a peer should receive, if any,
//! and to whether the connection survives it.

use std::io;

use thiserror::Error;

use crate::{
    chunk::TransactionId,
    codec::CodecError,
    message::ReassemblyError,
    metrics::ErrorKind,
    path::PathError,
    session::SessionError,
    status::StatusCode,
};

/// Top-level error type exposed by `msrp`.
#[derive(Debug, Error)]
pub enum MsrpError {
    /// A frame could not be parsed.
    #[error("parse error: {0}")]
    Parse(#[from] CodecError),

    /// To-Path or From-Path did not match the session.
    #[error("path error: {0}")]
    Path(#[from] PathError),

    /// A request received no response in time.
    #[error("transaction {0} timed out")]
    TransactionTimeout(TransactionId),

    #[error("transport error: {0}")]
    Transport(#[from] io::Error),

    /// A message or chunk exceeds the configured limits.
    #[error("{size} bytes exceed the limit of {limit}")]
    Overflow { size: u64, limit: usize },

    /// Byte-range accounting failed for one message.
    #[error("reassembly error: {0}")]
    Reassembly(ReassemblyError),

    #[error(transparent)]
    Session(#[from] SessionError),
}

impl From<ReassemblyError> for MsrpError {
    fn from(error: ReassemblyError) -> Self {
        match error {
            ReassemblyError::TooLarge { size, limit } => Self::Overflow { size, limit },
            other => Self::Reassembly(other),
        }
    }
}

impl MsrpError {
    /// Status code answering the request that caused the error.
    ///
    /// `None` for errors that are not reported to the peer.
    #[must_use]
    pub fn status_code(&self) -> Option<StatusCode> {
        match self {
            Self::Parse(e) if !e.should_disconnect() => Some(StatusCode::BAD_REQUEST),
            Self::Path(e) => Some(e.status_code()),
            Self::Overflow { .. } => Some(StatusCode::MESSAGE_TOO_LARGE),
            Self::Reassembly(e) => Some(e.status_code()),
            Self::TransactionTimeout(_) => Some(StatusCode::REQUEST_TIMEOUT),
            Self::Parse(_) | Self::Transport(_) | Self::Session(_) => None,
        }
    }

    /// Whether the connection must be closed.
    #[must_use]
    pub fn is_fatal(&self) -> bool {
        match self {
            Self::Parse(e) => e.should_disconnect(),
            Self::Transport(_) => true,
            Self::Session(e) => e.is_fatal(),
            Self::Path(_)
            | Self::TransactionTimeout(_)
            | Self::Overflow { .. }
            | Self::Reassembly(_) => false,
        }
    }

    /// Class under which the error is counted.
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Parse(_) => ErrorKind::Parse,
            Self::Path(_) => ErrorKind::Path,
            Self::Overflow { .. } | Self::Reassembly(_) => ErrorKind::Reassembly,
            Self::TransactionTimeout(_) | Self::Transport(_) | Self::Session(_) => {
                ErrorKind::Transport
            }
        }
    }
}

/// Canonical result alias used by `msrp` public APIs.
pub type Result<T> = std::result::Result<T, MsrpError>;

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;
    use crate::codec::{FramingError, ProtocolError};

    #[test]
    fn too_large_becomes_overflow() {
        let err = MsrpError::from(ReassemblyError::TooLarge {
            size: 2048,
            limit: 1024,
        });
        assert!(matches!(err, MsrpError::Overflow { size: 2048, limit: 1024 }));
        assert_eq!(err.status_code(), Some(StatusCode::MESSAGE_TOO_LARGE));
        assert!(!err.is_fatal());
    }

    #[rstest]
    #[case(MsrpError::Reassembly(ReassemblyError::MissingMessageId), Some(StatusCode::BAD_REQUEST), false)]
    #[case(MsrpError::Transport(io::Error::from(io::ErrorKind::BrokenPipe)), None, true)]
    #[case(
        MsrpError::Parse(CodecError::Framing(FramingError::UnterminatedBody { max: 1024 })),
        None,
        true
    )]
    #[case(
        MsrpError::Parse(CodecError::Protocol(ProtocolError::MissingHeader { field: "To-Path" })),
        Some(StatusCode::BAD_REQUEST),
        false
    )]
    fn classification(
        #[case] err: MsrpError,
        #[case] status: Option<StatusCode>,
        #[case] fatal: bool,
    ) {
        assert_eq!(err.status_code(), status);
        assert_eq!(err.is_fatal(), fatal);
    }
}
