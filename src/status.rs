//! Transaction status codes.

use std::fmt;

/// Three-digit status code carried by responses and `Status` headers.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct StatusCode(u16);

impl StatusCode {
    pub const OK: Self = Self(200);
    pub const BAD_REQUEST: Self = Self(400);
    pub const UNAUTHORIZED: Self = Self(401);
    pub const FORBIDDEN: Self = Self(403);
    pub const REQUEST_TIMEOUT: Self = Self(408);
    pub const MESSAGE_TOO_LARGE: Self = Self(413);
    pub const UNSUPPORTED_MEDIA_TYPE: Self = Self(415);
    pub const INTERVAL_OUT_OF_BOUNDS: Self = Self(423);
    pub const SESSION_DOES_NOT_EXIST: Self = Self(481);
    pub const NOT_IMPLEMENTED: Self = Self(501);
    pub const WRONG_CONNECTION: Self = Self(506);

    /// Wrap a raw code, rejecting values outside `100..=999`.
    #[must_use]
    pub const fn new(code: u16) -> Option<Self> {
        if code >= 100 && code <= 999 {
            Some(Self(code))
        } else {
            None
        }
    }

    #[must_use]
    pub const fn get(self) -> u16 { self.0 }

    /// `2xx` codes.
    #[must_use]
    pub const fn is_success(self) -> bool { self.0 >= 200 && self.0 < 300 }

    /// Canonical reason phrase for the codes RFC 4975 and RFC 4976 define.
    #[must_use]
    pub const fn reason(self) -> Option<&'static str> {
        Some(match self.0 {
            200 => "OK",
            400 => "Bad Request",
            401 => "Unauthorized",
            403 => "Forbidden",
            408 => "Request Timeout",
            413 => "Message Too Large",
            415 => "Unsupported Media Type",
            423 => "Interval Out-of-Bounds",
            481 => "Session Does Not Exist",
            501 => "Not Implemented",
            506 => "Wrong Connection",
            _ => return None,
        })
    }
}

impl fmt::Display for StatusCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { write!(f, "{:03}", self.0) }
}
