//! Header enumeration.
//!
//! Headers the protocol defines are decoded into typed variants; anything
//! else is kept as [`Header::Other`] so relays forward it verbatim. Header
//! names are matched case-insensitively.

use std::fmt;

use thiserror::Error;

use super::{
    id::{InvalidId, MessageId},
    values::{
        ByteRange,
        ContentDisposition,
        Digest,
        FailureReport,
        Parameters,
        Status,
        SuccessReport,
        ValueError,
    },
};
use crate::path::{Path, PathError};

/// A header value that failed to decode.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
#[error("invalid {name} header: {reason}")]
pub struct HeaderError {
    /// Canonical header name.
    pub name: &'static str,
    /// Human readable failure description.
    pub reason: String,
}

/// One decoded header line.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Header {
    ToPath(Path),
    FromPath(Path),
    MessageId(MessageId),
    ByteRange(ByteRange),
    ContentType(String),
    SuccessReport(SuccessReport),
    FailureReport(FailureReport),
    Status(Status),
    Expires(u32),
    MinExpires(u32),
    MaxExpires(u32),
    UsePath(Path),
    WwwAuthenticate(Digest),
    Authorization(Digest),
    AuthenticationInfo(Parameters),
    ContentId(String),
    ContentDescription(String),
    ContentDisposition(ContentDisposition),
    UseNickname(String),
    /// Header this crate does not interpret.
    Other { name: String, value: String },
}

/// Every header name with a typed variant, in canonical spelling.
pub const KNOWN_HEADERS: &[&str] = &[
    "To-Path",
    "From-Path",
    "Message-ID",
    "Byte-Range",
    "Content-Type",
    "Success-Report",
    "Failure-Report",
    "Status",
    "Expires",
    "Min-Expires",
    "Max-Expires",
    "Use-Path",
    "WWW-Authenticate",
    "Authorization",
    "Authentication-Info",
    "Content-ID",
    "Content-Description",
    "Content-Disposition",
    "Use-Nickname",
];

fn canonical_name(name: &str) -> Option<&'static str> {
    KNOWN_HEADERS
        .iter()
        .copied()
        .find(|known| known.eq_ignore_ascii_case(name))
}

fn value_error(name: &'static str) -> impl FnOnce(ValueError) -> HeaderError {
    move |err| HeaderError {
        name,
        reason: err.0,
    }
}

fn path_error(name: &'static str) -> impl FnOnce(PathError) -> HeaderError {
    move |err| HeaderError {
        name,
        reason: err.to_string(),
    }
}

fn id_error(name: &'static str) -> impl FnOnce(InvalidId) -> HeaderError {
    move |err| HeaderError {
        name,
        reason: err.to_string(),
    }
}

fn parse_seconds(name: &'static str, value: &str) -> Result<u32, HeaderError> {
    value.parse().map_err(|_| HeaderError {
        name,
        reason: format!("expected an integer, got {value:?}"),
    })
}

fn non_empty(name: &'static str, value: &str) -> Result<String, HeaderError> {
    if value.is_empty() {
        return Err(HeaderError {
            name,
            reason: "value is empty".to_owned(),
        });
    }
    Ok(value.to_owned())
}

impl Header {
    /// Decode a header line's name and value.
    ///
    /// # Errors
    ///
    /// Returns [`HeaderError`] when a known header carries a malformed value.
    pub fn decode(name: &str, value: &str) -> Result<Self, HeaderError> {
        let Some(canonical) = canonical_name(name) else {
            return Ok(Self::Other {
                name: name.to_owned(),
                value: value.to_owned(),
            });
        };
        let header = match canonical {
            "To-Path" => Self::ToPath(value.parse().map_err(path_error(canonical))?),
            "From-Path" => Self::FromPath(value.parse().map_err(path_error(canonical))?),
            "Use-Path" => Self::UsePath(value.parse().map_err(path_error(canonical))?),
            "Message-ID" => Self::MessageId(value.parse().map_err(id_error(canonical))?),
            "Byte-Range" => Self::ByteRange(value.parse().map_err(value_error(canonical))?),
            "Content-Type" => Self::ContentType(non_empty(canonical, value)?),
            "Success-Report" => {
                Self::SuccessReport(value.parse().map_err(value_error(canonical))?)
            }
            "Failure-Report" => {
                Self::FailureReport(value.parse().map_err(value_error(canonical))?)
            }
            "Status" => Self::Status(value.parse().map_err(value_error(canonical))?),
            "Expires" => Self::Expires(parse_seconds(canonical, value)?),
            "Min-Expires" => Self::MinExpires(parse_seconds(canonical, value)?),
            "Max-Expires" => Self::MaxExpires(parse_seconds(canonical, value)?),
            "WWW-Authenticate" => {
                Self::WwwAuthenticate(value.parse().map_err(value_error(canonical))?)
            }
            "Authorization" => Self::Authorization(value.parse().map_err(value_error(canonical))?),
            "Authentication-Info" => {
                Self::AuthenticationInfo(value.parse().map_err(value_error(canonical))?)
            }
            "Content-ID" => Self::ContentId(non_empty(canonical, value)?),
            "Content-Description" => Self::ContentDescription(value.to_owned()),
            "Content-Disposition" => {
                Self::ContentDisposition(value.parse().map_err(value_error(canonical))?)
            }
            _ => Self::UseNickname(value.to_owned()),
        };
        Ok(header)
    }

    /// Header name as written on the wire.
    #[must_use]
    pub fn name(&self) -> &str {
        match self {
            Self::ToPath(_) => "To-Path",
            Self::FromPath(_) => "From-Path",
            Self::MessageId(_) => "Message-ID",
            Self::ByteRange(_) => "Byte-Range",
            Self::ContentType(_) => "Content-Type",
            Self::SuccessReport(_) => "Success-Report",
            Self::FailureReport(_) => "Failure-Report",
            Self::Status(_) => "Status",
            Self::Expires(_) => "Expires",
            Self::MinExpires(_) => "Min-Expires",
            Self::MaxExpires(_) => "Max-Expires",
            Self::UsePath(_) => "Use-Path",
            Self::WwwAuthenticate(_) => "WWW-Authenticate",
            Self::Authorization(_) => "Authorization",
            Self::AuthenticationInfo(_) => "Authentication-Info",
            Self::ContentId(_) => "Content-ID",
            Self::ContentDescription(_) => "Content-Description",
            Self::ContentDisposition(_) => "Content-Disposition",
            Self::UseNickname(_) => "Use-Nickname",
            Self::Other { name, .. } => name,
        }
    }

    /// Whether this header has the given name, ignoring case.
    #[must_use]
    pub fn is(&self, name: &str) -> bool { self.name().eq_ignore_ascii_case(name) }

    /// Position in the canonical emission order used when building chunks:
    /// To-Path, From-Path, transaction metadata, content descriptors, and
    /// Content-Type last.
    #[must_use]
    pub fn rank(&self) -> u8 {
        match self {
            Self::ToPath(_) => 0,
            Self::FromPath(_) => 1,
            Self::ContentId(_) | Self::ContentDescription(_) | Self::ContentDisposition(_) => 3,
            Self::ContentType(_) => 4,
            Self::Other { name, .. }
                if name
                    .get(..8)
                    .is_some_and(|prefix| prefix.eq_ignore_ascii_case("Content-")) =>
            {
                3
            }
            _ => 2,
        }
    }
}

/// Writes the header value (without the name).
impl fmt::Display for Header {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ToPath(path) | Self::FromPath(path) | Self::UsePath(path) => write!(f, "{path}"),
            Self::MessageId(id) => write!(f, "{id}"),
            Self::ByteRange(range) => write!(f, "{range}"),
            Self::ContentType(value)
            | Self::ContentId(value)
            | Self::ContentDescription(value)
            | Self::UseNickname(value)
            | Self::Other { value, .. } => f.write_str(value),
            Self::SuccessReport(policy) => write!(f, "{policy}"),
            Self::FailureReport(policy) => write!(f, "{policy}"),
            Self::Status(status) => write!(f, "{status}"),
            Self::Expires(secs) | Self::MinExpires(secs) | Self::MaxExpires(secs) => {
                write!(f, "{secs}")
            }
            Self::WwwAuthenticate(digest) | Self::Authorization(digest) => write!(f, "{digest}"),
            Self::AuthenticationInfo(params) => write!(f, "{params}"),
            Self::ContentDisposition(value) => write!(f, "{value}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    #[rstest]
    #[case("to-path", "msrp://a.example.com:1/s;tcp", "To-Path")]
    #[case("MESSAGE-ID", "abc123", "Message-ID")]
    #[case("byte-range", "1-*/*", "Byte-Range")]
    #[case("Expires", "900", "Expires")]
    #[case("Use-Nickname", "alice", "Use-Nickname")]
    fn known_headers_match_case_insensitively(
        #[case] name: &str,
        #[case] value: &str,
        #[case] canonical: &str,
    ) {
        let header = Header::decode(name, value).expect("valid header");
        assert_eq!(header.name(), canonical);
        assert!(!matches!(header, Header::Other { .. }));
        assert_eq!(header.to_string(), value);
    }

    #[test]
    fn unknown_headers_are_opaque() {
        let header = Header::decode("X-Custom", "anything: at all").expect("opaque header");
        assert_eq!(
            header,
            Header::Other {
                name: "X-Custom".to_owned(),
                value: "anything: at all".to_owned(),
            }
        );
        assert_eq!(header.rank(), 2);
    }

    #[rstest]
    #[case("Byte-Range", "nonsense")]
    #[case("Status", "200")]
    #[case("Message-ID", "")]
    #[case("To-Path", "http://example.com")]
    #[case("Expires", "soon")]
    #[case("Content-Type", "")]
    fn malformed_known_headers_fail(#[case] name: &str, #[case] value: &str) {
        assert!(Header::decode(name, value).is_err());
    }

    #[test]
    fn content_headers_rank_after_metadata() {
        let other = Header::decode("Content-Language", "en").expect("opaque header");
        assert_eq!(other.rank(), 3);
        let ctype = Header::decode("Content-Type", "text/plain").expect("valid header");
        assert_eq!(ctype.rank(), 4);
    }
}
