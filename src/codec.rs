//! Incremental MSRP framing.
//!
//! [`MsrpCodec`] implements `tokio_util`'s [`Decoder`] and [`Encoder`] for
//! MSRP chunks. The decoder is a small state machine (start line, headers,
//! body) that makes progress on arbitrarily small reads. A body ends only at
//! the end-line of the frame's own transaction: `\r\n-------<tid><flag>\r\n`.
//!
//! # Error Handling
//!
//! Content errors inside a correctly delimited frame do not fail the stream.
//! They surface as [`Decoded::Malformed`] so the receiver can answer the
//! transaction with `400`. Errors that lose track of frame boundaries are
//! returned as [`CodecError`] with a [`RecoveryPolicy::Disconnect`] policy.

use std::fmt::Write as _;

use bytes::{Buf, Bytes, BytesMut};
use serde::{Deserialize, Serialize};
use tokio_util::codec::{Decoder, Encoder};

mod decode;
pub mod error;

use decode::DecodeState;
pub use error::{CodecError, EofError, FramingError, ProtocolError, RecoveryPolicy};

use crate::chunk::{Chunk, ChunkKind, Flag, TransactionId};

/// Smallest unterminated body limit accepted by [`CodecConfig`].
pub const MIN_BODY_LIMIT: usize = 1024;

/// Largest unterminated body limit accepted by [`CodecConfig`] (16 MiB).
pub const MAX_BODY_LIMIT: usize = 16 * 1024 * 1024;

/// Default limit for a single start or header line.
pub const DEFAULT_MAX_LINE_LENGTH: usize = 16 * 1024;

/// Default limit on header lines per frame.
pub const DEFAULT_MAX_HEADER_LINES: usize = 64;

const END_LINE_DASHES: &[u8] = b"-------";

pub(crate) fn clamp_body_limit(value: usize) -> usize {
    value.clamp(MIN_BODY_LIMIT, MAX_BODY_LIMIT)
}

/// Decoder limits.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CodecConfig {
    /// Longest start or header line, excluding its CRLF.
    pub max_line_length: usize,
    /// Most header lines a single frame may carry.
    pub max_header_lines: usize,
    /// Most body bytes buffered while waiting for the end-line.
    pub max_body_size: usize,
}

impl Default for CodecConfig {
    fn default() -> Self {
        Self {
            max_line_length: DEFAULT_MAX_LINE_LENGTH,
            max_header_lines: DEFAULT_MAX_HEADER_LINES,
            max_body_size: MAX_BODY_LIMIT,
        }
    }
}

impl CodecConfig {
    /// Set the unterminated body limit, clamped to
    /// `MIN_BODY_LIMIT..=MAX_BODY_LIMIT`.
    #[must_use]
    pub fn with_max_body_size(mut self, limit: usize) -> Self {
        self.max_body_size = clamp_body_limit(limit);
        self
    }
}

/// A frame whose boundaries were intact but whose content was not.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MalformedChunk {
    /// Transaction the frame belonged to.
    pub transaction_id: TransactionId,
    /// Start line of the frame.
    pub kind: ChunkKind,
    /// First problem found.
    pub error: ProtocolError,
}

/// Item produced by [`MsrpCodec`]'s decoder.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Decoded {
    Chunk(Chunk),
    Malformed(MalformedChunk),
}

/// Codec turning a byte stream into [`Decoded`] frames and [`Chunk`]s into
/// bytes.
///
/// # Examples
///
/// ```
/// use bytes::BytesMut;
/// use msrp::codec::{Decoded, MsrpCodec};
/// use tokio_util::codec::Decoder;
///
/// let mut codec = MsrpCodec::default();
/// let mut buf = BytesMut::from(&b"MSRP a786hjs2 200 OK\r\n-------a786hjs2$\r\n"[..]);
/// let Some(Decoded::Chunk(chunk)) = codec.decode(&mut buf).expect("valid frame") else {
///     panic!("expected a chunk");
/// };
/// assert_eq!(chunk.transaction_id.as_str(), "a786hjs2");
/// ```
#[derive(Debug, Default)]
pub struct MsrpCodec {
    config: CodecConfig,
    state: DecodeState,
}

impl MsrpCodec {
    #[must_use]
    pub fn new(config: CodecConfig) -> Self {
        Self {
            config,
            state: DecodeState::default(),
        }
    }

    #[must_use]
    pub fn config(&self) -> &CodecConfig { &self.config }
}

impl Decoder for MsrpCodec {
    type Item = Decoded;
    type Error = CodecError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        decode::decode(&mut self.state, &self.config, src)
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        if let Some(frame) = self.decode(src)? {
            return Ok(Some(frame));
        }
        let bytes_buffered = src.len();
        let at_boundary = self.state.is_idle();
        src.clear();
        self.state = DecodeState::default();
        match (at_boundary, bytes_buffered) {
            (true, 0) => Ok(None),
            (true, _) => Err(EofError::MidStartLine { bytes_buffered }.into()),
            (false, _) => Err(EofError::MidFrame { bytes_buffered }.into()),
        }
    }
}

impl Encoder<Chunk> for MsrpCodec {
    type Error = CodecError;

    fn encode(&mut self, item: Chunk, dst: &mut BytesMut) -> Result<(), Self::Error> {
        encode_chunk(&item, dst)
    }
}

impl Encoder<&Chunk> for MsrpCodec {
    type Error = CodecError;

    fn encode(&mut self, item: &Chunk, dst: &mut BytesMut) -> Result<(), Self::Error> {
        encode_chunk(item, dst)
    }
}

/// Serialise a complete chunk.
///
/// # Errors
///
/// Returns [`FramingError::BoundaryInBody`] if the body contains the chunk's
/// own end-line, which would truncate it on the receiving side.
pub fn encode_chunk(chunk: &Chunk, dst: &mut BytesMut) -> Result<(), CodecError> {
    if let Some(body) = &chunk.body
        && contains_end_line(body, &chunk.transaction_id)
    {
        return Err(FramingError::BoundaryInBody {
            transaction_id: chunk.transaction_id.to_string(),
        }
        .into());
    }
    dst.reserve(128 + chunk.body_len());
    encode_head(chunk, dst);
    if let Some(body) = &chunk.body {
        dst.extend_from_slice(body);
    }
    encode_end_line(&chunk.transaction_id, chunk.flag, chunk.body.is_some(), dst);
    Ok(())
}

/// Serialise a chunk into a fresh buffer.
///
/// # Errors
///
/// See [`encode_chunk`].
pub fn to_bytes(chunk: &Chunk) -> Result<Bytes, CodecError> {
    let mut buf = BytesMut::new();
    encode_chunk(chunk, &mut buf)?;
    Ok(buf.freeze())
}

/// Write the start line and headers, plus the blank line separating them
/// from the body when one is present.
pub fn encode_head(chunk: &Chunk, dst: &mut BytesMut) {
    let mut head = String::with_capacity(128);
    let _ = write!(head, "MSRP {} ", chunk.transaction_id);
    match &chunk.kind {
        ChunkKind::Request(method) => head.push_str(method.as_str()),
        ChunkKind::Response { status, comment } => {
            let _ = write!(head, "{status}");
            if let Some(comment) = comment {
                let _ = write!(head, " {comment}");
            }
        }
    }
    head.push_str("\r\n");
    for header in &chunk.headers {
        let _ = write!(head, "{}: {header}\r\n", header.name());
    }
    if chunk.body.is_some() {
        head.push_str("\r\n");
    }
    dst.extend_from_slice(head.as_bytes());
}

/// Write the end-line for `transaction_id`.
///
/// `after_body` adds the CRLF that separates a body from its end-line.
pub fn encode_end_line(
    transaction_id: &TransactionId,
    flag: Flag,
    after_body: bool,
    dst: &mut BytesMut,
) {
    if after_body {
        dst.extend_from_slice(b"\r\n");
    }
    dst.extend_from_slice(END_LINE_DASHES);
    dst.extend_from_slice(transaction_id.as_str().as_bytes());
    dst.extend_from_slice(&[flag.as_byte(), b'\r', b'\n']);
}

/// Bytes that open an end-line inside a body: `\r\n-------<tid>`.
pub(crate) fn boundary(transaction_id: &TransactionId) -> Vec<u8> {
    let mut needle = Vec::with_capacity(2 + END_LINE_DASHES.len() + transaction_id.as_str().len());
    needle.extend_from_slice(b"\r\n");
    needle.extend_from_slice(END_LINE_DASHES);
    needle.extend_from_slice(transaction_id.as_str().as_bytes());
    needle
}

/// Whether `body` contains something the decoder could take for the
/// end-line of `transaction_id`.
#[must_use]
pub fn contains_end_line(body: &[u8], transaction_id: &TransactionId) -> bool {
    let needle = boundary(transaction_id);
    body.windows(needle.len() + 1).any(|window| {
        window.starts_with(&needle) && Flag::from_byte(window[needle.len()]).is_some()
    })
}

/// Total bytes an end-line following a body occupies.
pub(crate) fn end_line_len(transaction_id: &TransactionId) -> usize {
    2 + END_LINE_DASHES.len() + transaction_id.as_str().len() + 3
}

fn advance_past_end_line(src: &mut BytesMut, transaction_id: &TransactionId) {
    src.advance(end_line_len(transaction_id));
}

#[cfg(test)]
mod tests;
