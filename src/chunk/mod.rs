//! Chunk data model.
//!
//! A [`Chunk`] is one complete MSRP frame: a request (`SEND`, `REPORT`,
//! `AUTH`, or an extension method) or a response, together with its ordered
//! headers, optional body, and the continuation flag carried by its end-line.

pub mod header;
pub mod id;
pub mod values;

use std::fmt;

use bytes::Bytes;
pub use header::{Header, HeaderError, KNOWN_HEADERS};
pub use id::{IdGenerator, InvalidId, MessageId, TransactionId};
pub use values::{
    ByteRange,
    ContentDisposition,
    Digest,
    FailureReport,
    Parameters,
    Status,
    SuccessReport,
    ValueError,
};

use crate::{path::Path, status::StatusCode};

/// Request method.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum Method {
    Send,
    Report,
    Auth,
    /// A method this crate does not implement; answered with 501.
    Extension(String),
}

impl Method {
    /// Parse a method token (`[A-Z_]+`).
    #[must_use]
    pub fn parse(token: &str) -> Option<Self> {
        if token.is_empty() || !token.bytes().all(|b| b.is_ascii_uppercase() || b == b'_') {
            return None;
        }
        Some(match token {
            "SEND" => Self::Send,
            "REPORT" => Self::Report,
            "AUTH" => Self::Auth,
            other => Self::Extension(other.to_owned()),
        })
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::Send => "SEND",
            Self::Report => "REPORT",
            Self::Auth => "AUTH",
            Self::Extension(name) => name,
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(self.as_str()) }
}

/// Continuation flag terminating a chunk's end-line.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Flag {
    /// `+`: more chunks of this message follow.
    Continue,
    /// `$`: last chunk of the message.
    End,
    /// `#`: the sender abandoned the message.
    Abort,
}

impl Flag {
    #[must_use]
    pub const fn as_byte(self) -> u8 {
        match self {
            Self::Continue => b'+',
            Self::End => b'$',
            Self::Abort => b'#',
        }
    }

    #[must_use]
    pub const fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            b'+' => Some(Self::Continue),
            b'$' => Some(Self::End),
            b'#' => Some(Self::Abort),
            _ => None,
        }
    }
}

/// Request or response start line.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ChunkKind {
    Request(Method),
    Response {
        status: StatusCode,
        comment: Option<String>,
    },
}

/// One MSRP frame.
///
/// Headers keep their received order so a decoded chunk re-encodes to the
/// same bytes. Builders insert headers in canonical order (see
/// [`Header::rank`]).
///
/// # Examples
///
/// ```
/// use bytes::Bytes;
/// use msrp::chunk::{Chunk, Header, Method, TransactionId};
///
/// let chunk = Chunk::request(TransactionId::new("d93kswow").expect("valid id"), Method::Send)
///     .with_header(Header::ContentType("text/plain".to_owned()))
///     .with_body(Bytes::from_static(b"Hi"));
/// assert!(chunk.is_request());
/// assert_eq!(chunk.content_type(), Some("text/plain"));
/// ```
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Chunk {
    pub transaction_id: TransactionId,
    pub kind: ChunkKind,
    pub headers: Vec<Header>,
    pub body: Option<Bytes>,
    pub flag: Flag,
}

impl Chunk {
    /// Empty request with the END flag.
    #[must_use]
    pub fn request(transaction_id: TransactionId, method: Method) -> Self {
        Self {
            transaction_id,
            kind: ChunkKind::Request(method),
            headers: Vec::new(),
            body: None,
            flag: Flag::End,
        }
    }

    /// Bare response. Responses always carry the END flag.
    #[must_use]
    pub fn response(
        transaction_id: TransactionId,
        status: StatusCode,
        comment: Option<String>,
    ) -> Self {
        Self {
            transaction_id,
            kind: ChunkKind::Response { status, comment },
            headers: Vec::new(),
            body: None,
            flag: Flag::End,
        }
    }

    /// Add a header at its canonical position, after existing headers of the
    /// same rank.
    #[must_use]
    pub fn with_header(mut self, header: Header) -> Self {
        self.insert_header(header);
        self
    }

    #[must_use]
    pub fn with_body(mut self, body: Bytes) -> Self {
        self.body = Some(body);
        self
    }

    #[must_use]
    pub fn with_flag(mut self, flag: Flag) -> Self {
        self.flag = flag;
        self
    }

    /// Insert a header at its canonical position.
    pub fn insert_header(&mut self, header: Header) {
        let rank = header.rank();
        let position = self
            .headers
            .iter()
            .position(|existing| existing.rank() > rank)
            .unwrap_or(self.headers.len());
        self.headers.insert(position, header);
    }

    /// Replace the first header with the same name, or insert it.
    pub fn set_header(&mut self, header: Header) {
        match self.headers.iter_mut().find(|existing| existing.is(header.name())) {
            Some(existing) => *existing = header,
            None => self.insert_header(header),
        }
    }

    /// Remove every header with the given name.
    pub fn remove_header(&mut self, name: &str) { self.headers.retain(|h| !h.is(name)); }

    /// First header with the given name.
    #[must_use]
    pub fn header(&self, name: &str) -> Option<&Header> {
        self.headers.iter().find(|h| h.is(name))
    }

    #[must_use]
    pub fn is_request(&self) -> bool { matches!(self.kind, ChunkKind::Request(_)) }

    #[must_use]
    pub fn method(&self) -> Option<&Method> {
        match &self.kind {
            ChunkKind::Request(method) => Some(method),
            ChunkKind::Response { .. } => None,
        }
    }

    /// Response status, for responses only.
    #[must_use]
    pub fn response_status(&self) -> Option<StatusCode> {
        match &self.kind {
            ChunkKind::Response { status, .. } => Some(*status),
            ChunkKind::Request(_) => None,
        }
    }

    #[must_use]
    pub fn to_path(&self) -> Option<&Path> {
        self.headers.iter().find_map(|h| match h {
            Header::ToPath(path) => Some(path),
            _ => None,
        })
    }

    #[must_use]
    pub fn from_path(&self) -> Option<&Path> {
        self.headers.iter().find_map(|h| match h {
            Header::FromPath(path) => Some(path),
            _ => None,
        })
    }

    #[must_use]
    pub fn message_id(&self) -> Option<&MessageId> {
        self.headers.iter().find_map(|h| match h {
            Header::MessageId(id) => Some(id),
            _ => None,
        })
    }

    #[must_use]
    pub fn byte_range(&self) -> Option<ByteRange> {
        self.headers.iter().find_map(|h| match h {
            Header::ByteRange(range) => Some(*range),
            _ => None,
        })
    }

    #[must_use]
    pub fn content_type(&self) -> Option<&str> {
        self.headers.iter().find_map(|h| match h {
            Header::ContentType(value) => Some(value.as_str()),
            _ => None,
        })
    }

    #[must_use]
    pub fn status(&self) -> Option<&Status> {
        self.headers.iter().find_map(|h| match h {
            Header::Status(status) => Some(status),
            _ => None,
        })
    }

    /// `Success-Report` policy, defaulting to `no`.
    #[must_use]
    pub fn success_report(&self) -> SuccessReport {
        self.headers
            .iter()
            .find_map(|h| match h {
                Header::SuccessReport(policy) => Some(*policy),
                _ => None,
            })
            .unwrap_or_default()
    }

    /// `Failure-Report` policy, defaulting to `yes`.
    #[must_use]
    pub fn failure_report(&self) -> FailureReport {
        self.headers
            .iter()
            .find_map(|h| match h {
                Header::FailureReport(policy) => Some(*policy),
                _ => None,
            })
            .unwrap_or_default()
    }

    /// Body length, zero when absent.
    #[must_use]
    pub fn body_len(&self) -> usize { self.body.as_ref().map_or(0, Bytes::len) }
}

impl fmt::Display for Chunk {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            ChunkKind::Request(method) => write!(f, "{} {method}", self.transaction_id),
            ChunkKind::Response { status, .. } => write!(f, "{} {status}", self.transaction_id),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tid() -> TransactionId { TransactionId::new("abcd1234").expect("valid id") }

    #[test]
    fn builder_orders_headers_canonically() {
        let path: Path = "msrp://a.example.com:1/s;tcp".parse().expect("valid path");
        let chunk = Chunk::request(tid(), Method::Send)
            .with_header(Header::ContentType("text/plain".to_owned()))
            .with_header(Header::ByteRange(ByteRange::from_span(0, 2, Some(2), false)))
            .with_header(Header::FromPath(path.clone()))
            .with_header(Header::ToPath(path));
        let names: Vec<_> = chunk.headers.iter().map(Header::name).collect();
        assert_eq!(names, ["To-Path", "From-Path", "Byte-Range", "Content-Type"]);
    }

    #[test]
    fn report_policy_defaults() {
        let chunk = Chunk::request(tid(), Method::Send);
        assert_eq!(chunk.success_report(), SuccessReport::No);
        assert_eq!(chunk.failure_report(), FailureReport::Yes);
    }

    #[test]
    fn set_header_replaces_existing() {
        let mut chunk = Chunk::request(tid(), Method::Send)
            .with_header(Header::FailureReport(FailureReport::No));
        chunk.set_header(Header::FailureReport(FailureReport::Partial));
        assert_eq!(chunk.failure_report(), FailureReport::Partial);
        assert_eq!(chunk.headers.len(), 1);
        chunk.remove_header("failure-report");
        assert!(chunk.headers.is_empty());
    }

    #[test]
    fn method_tokens() {
        assert_eq!(Method::parse("SEND"), Some(Method::Send));
        assert_eq!(
            Method::parse("FILE_OFFSET"),
            Some(Method::Extension("FILE_OFFSET".to_owned()))
        );
        assert_eq!(Method::parse("send"), None);
        assert_eq!(Method::parse(""), None);
    }

    #[test]
    fn flags_map_to_bytes() {
        for flag in [Flag::Continue, Flag::End, Flag::Abort] {
            assert_eq!(Flag::from_byte(flag.as_byte()), Some(flag));
        }
        assert_eq!(Flag::from_byte(b'x'), None);
    }
}
