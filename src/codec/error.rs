//! Error types for the codec layer.
//!
//! The taxonomy separates framing errors (the byte stream can no longer be
//! split into frames), protocol errors (one frame was delimited correctly but
//! its content is malformed), I/O errors, and EOF conditions.
//!
//! # Recovery Policies
//!
//! Each error has a default recovery policy accessible via
//! [`CodecError::default_recovery_policy`]:
//!
//! - [`RecoveryPolicy::Drop`]: Answer or discard the malformed frame and continue.
//! - [`RecoveryPolicy::Disconnect`]: Terminate the connection.

use std::io;

use thiserror::Error;

/// How the owner of a connection should react to a codec error.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RecoveryPolicy {
    /// The frame boundary is intact; handle the frame locally and carry on.
    Drop,
    /// Framing can no longer be trusted; close the connection.
    Disconnect,
}

/// Framing-level errors: the decoder lost track of frame boundaries.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum FramingError {
    /// The first line of a frame is not `MSRP <transaction-id> <method|code>`.
    #[error("invalid start line: {line:?}")]
    InvalidStartLine {
        /// The offending line, lossily decoded.
        line: String,
    },

    /// A start or header line exceeded the configured limit.
    #[error("line exceeds max length: {size} > {max}")]
    LineTooLong {
        /// Bytes buffered without a line terminator.
        size: usize,
        /// Maximum allowed line length.
        max: usize,
    },

    /// A frame carried more header lines than allowed.
    #[error("frame exceeds {max} header lines")]
    TooManyHeaders {
        /// Maximum allowed header lines.
        max: usize,
    },

    /// No end-line for the current transaction appeared within the limit.
    #[error("unterminated body exceeds {max} bytes")]
    UnterminatedBody {
        /// Maximum unterminated body size.
        max: usize,
    },

    /// An outbound body contains its own transaction's end-line.
    #[error("body contains the end-line of transaction {transaction_id}")]
    BoundaryInBody {
        /// Transaction whose end-line appeared in the body.
        transaction_id: String,
    },
}

/// Protocol-level errors in a correctly delimited frame.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ProtocolError {
    /// A header line is not of the form `Name: value`.
    #[error("malformed header line: {line:?}")]
    MalformedHeaderLine {
        /// The offending line, lossily decoded.
        line: String,
    },

    /// A known header carried an invalid value.
    #[error("invalid {name} header: {reason}")]
    InvalidHeader {
        /// Canonical header name.
        name: &'static str,
        /// Why the value was rejected.
        reason: String,
    },

    /// A header the request requires is missing.
    #[error("missing required header field: {field}")]
    MissingHeader {
        /// Name of the missing field.
        field: &'static str,
    },

    /// Protocol state machine violation.
    #[error("invalid state transition: {from} -> {to}")]
    InvalidStateTransition {
        /// State the session was in.
        from: String,
        /// State that was incorrectly attempted.
        to: String,
    },
}

/// EOF handling variants distinguishing normal vs. premature closure.
#[derive(Clone, Copy, Debug, Error, PartialEq, Eq)]
pub enum EofError {
    /// The peer closed the connection between frames.
    #[error("connection closed cleanly at frame boundary")]
    CleanClose,

    /// The peer closed the connection while a frame was being read.
    #[error("premature EOF: {bytes_buffered} bytes of an incomplete frame buffered")]
    MidFrame {
        /// Bytes of the incomplete frame still buffered.
        bytes_buffered: usize,
    },

    /// The peer closed the connection in the middle of a start line.
    #[error("premature EOF during start line: {bytes_buffered} bytes buffered")]
    MidStartLine {
        /// Bytes of the partial start line.
        bytes_buffered: usize,
    },
}

/// Top-level codec error taxonomy.
///
/// # Examples
///
/// ```
/// use msrp::codec::{CodecError, FramingError, RecoveryPolicy};
///
/// let err = CodecError::Framing(FramingError::UnterminatedBody { max: 1024 });
/// assert_eq!(err.default_recovery_policy(), RecoveryPolicy::Disconnect);
/// assert!(err.should_disconnect());
/// ```
#[derive(Debug, Error)]
pub enum CodecError {
    /// Framing layer error (frame boundaries lost).
    #[error("framing error: {0}")]
    Framing(#[from] FramingError),

    /// Protocol layer error (malformed frame content).
    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// Transport layer I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// End-of-stream handling.
    #[error("EOF: {0}")]
    Eof(#[from] EofError),
}

impl CodecError {
    /// Returns the recommended recovery policy for this error.
    ///
    /// | Error Type | Policy |
    /// |------------|--------|
    /// | `Framing::BoundaryInBody` | `Drop` |
    /// | Other `Framing` errors | `Disconnect` |
    /// | All `Protocol` errors | `Drop` |
    /// | All `Io` errors | `Disconnect` |
    /// | All `Eof` errors | `Disconnect` |
    #[must_use]
    pub fn default_recovery_policy(&self) -> RecoveryPolicy {
        match self {
            Self::Framing(FramingError::BoundaryInBody { .. }) | Self::Protocol(_) => {
                RecoveryPolicy::Drop
            }
            Self::Framing(_) | Self::Io(_) | Self::Eof(_) => RecoveryPolicy::Disconnect,
        }
    }

    /// Returns true if this error represents a clean connection close.
    #[must_use]
    pub fn is_clean_close(&self) -> bool { matches!(self, Self::Eof(EofError::CleanClose)) }

    /// Returns true if the connection should be terminated.
    #[must_use]
    pub fn should_disconnect(&self) -> bool {
        self.default_recovery_policy() == RecoveryPolicy::Disconnect
    }

    /// Returns the error category as a string for logging and metrics.
    #[must_use]
    pub fn error_type(&self) -> &'static str {
        match self {
            Self::Framing(_) => "framing",
            Self::Protocol(_) => "protocol",
            Self::Io(_) => "io",
            Self::Eof(_) => "eof",
        }
    }
}

impl From<CodecError> for io::Error {
    fn from(err: CodecError) -> Self {
        match err {
            CodecError::Io(e) => e,
            CodecError::Framing(e) => io::Error::new(io::ErrorKind::InvalidData, e),
            CodecError::Protocol(e) => io::Error::new(io::ErrorKind::InvalidData, e),
            CodecError::Eof(e) => io::Error::new(io::ErrorKind::UnexpectedEof, e),
        }
    }
}

#[cfg(test)]
#[path = "error_tests.rs"]
mod tests;
