//! Errors raised while reassembling inbound messages.

use thiserror::Error;

use crate::status::StatusCode;

/// A chunk that cannot be reconciled with the message it belongs to.
///
/// The partial message is discarded; other messages on the session are
/// unaffected.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ReassemblyError {
    /// The SEND carried no `Message-ID`.
    #[error("missing Message-ID header")]
    MissingMessageId,

    /// The chunk starts after the received prefix ends.
    #[error("byte range gap: expected offset {expected}, found {found}")]
    Gap {
        /// Bytes received so far.
        expected: u64,
        /// Zero-based offset of the chunk.
        found: u64,
    },

    /// The chunk starts inside the received prefix.
    #[error("byte range overlap: expected offset {expected}, found {found}")]
    Overlap {
        /// Bytes received so far.
        expected: u64,
        /// Zero-based offset of the chunk.
        found: u64,
    },

    /// The declared range and the body length disagree.
    #[error("byte range declares {declared} bytes but body has {actual}")]
    LengthMismatch {
        /// Length implied by the `Byte-Range` header.
        declared: u64,
        /// Actual body length.
        actual: u64,
    },

    /// The chunk extends past the declared total.
    #[error("chunk ends at {end}, beyond total {total}")]
    ExceedsTotal {
        /// Exclusive end of the chunk.
        end: u64,
        /// Declared message size.
        total: u64,
    },

    /// A later chunk declared a different total than an earlier one.
    #[error("total size changed from {previous} to {found}")]
    TotalConflict {
        /// Total declared first.
        previous: u64,
        /// Total declared by this chunk.
        found: u64,
    },

    /// The final chunk arrived before the whole message was covered.
    #[error("final chunk leaves message incomplete: {received} of {total} bytes")]
    PrematureEnd {
        /// Bytes received including the final chunk.
        received: u64,
        /// Declared message size.
        total: u64,
    },

    /// The message is larger than the configured limit.
    #[error("message size {size} exceeds limit {limit}")]
    TooLarge {
        /// Declared or accumulated size.
        size: u64,
        /// Configured maximum.
        limit: usize,
    },
}

impl ReassemblyError {
    /// Status to answer the offending SEND with.
    #[must_use]
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::TooLarge { .. } => StatusCode::MESSAGE_TOO_LARGE,
            _ => StatusCode::BAD_REQUEST,
        }
    }
}
