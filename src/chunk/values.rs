//! Typed header values and their wire encodings.

use std::{fmt, ops::Range, str::FromStr};

use thiserror::Error;

use crate::status::StatusCode;

/// Reason a header value failed to decode.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
#[error("{0}")]
pub struct ValueError(pub(crate) String);

impl ValueError {
    fn new(message: impl fmt::Display) -> Self { Self(message.to_string()) }
}

/// `Byte-Range` value as it appears on the wire.
///
/// Positions are 1-based and inclusive: `1-2/2` covers the first two bytes
/// of a two byte message. `end` and `total` are `None` when the sender wrote
/// `*`. An empty chunk at offset `n` is written `n+1-n/total`.
///
/// # Examples
///
/// ```
/// use msrp::chunk::ByteRange;
///
/// let range: ByteRange = "1-2/2".parse().expect("valid range");
/// assert_eq!(range.offset(), 0);
/// assert_eq!(range.span(2), 0..2);
/// assert_eq!(range.to_string(), "1-2/2");
/// ```
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ByteRange {
    start: u64,
    end: Option<u64>,
    total: Option<u64>,
}

impl ByteRange {
    /// Build a range from wire values.
    ///
    /// # Errors
    ///
    /// Returns [`ValueError`] when `start` is zero, `end` precedes
    /// `start - 1`, `end` exceeds a known `total`, or `start` lies more than
    /// one past a known `total`.
    pub fn new(start: u64, end: Option<u64>, total: Option<u64>) -> Result<Self, ValueError> {
        if start == 0 {
            return Err(ValueError::new("byte range start must be at least 1"));
        }
        if let Some(total) = total
            && start - 1 > total
        {
            return Err(ValueError::new(format!(
                "byte range start {start} lies beyond total {total}"
            )));
        }
        if let Some(end) = end {
            if end < start - 1 {
                return Err(ValueError::new(format!(
                    "byte range end {end} precedes start {start}"
                )));
            }
            if let Some(total) = total
                && end > total
            {
                return Err(ValueError::new(format!(
                    "byte range end {end} exceeds total {total}"
                )));
            }
        }
        Ok(Self { start, end, total })
    }

    /// Range describing `len` bytes at 0-based `offset`.
    ///
    /// When `open_ended` is set the end is written as `*`, which lets a
    /// sender truncate the chunk after the header has gone out. Positions
    /// saturate at `u64::MAX`.
    #[must_use]
    pub fn from_span(offset: u64, len: u64, total: Option<u64>, open_ended: bool) -> Self {
        Self {
            start: offset.saturating_add(1),
            end: (!open_ended).then_some(offset.saturating_add(len)),
            total,
        }
    }

    #[must_use]
    pub fn start(&self) -> u64 { self.start }

    #[must_use]
    pub fn end(&self) -> Option<u64> { self.end }

    #[must_use]
    pub fn total(&self) -> Option<u64> { self.total }

    /// 0-based offset of the first byte.
    #[must_use]
    pub fn offset(&self) -> u64 { self.start - 1 }

    /// 0-based half-open span, falling back to `body_len` when the end is
    /// unknown. An end past `u64::MAX` saturates.
    #[must_use]
    pub fn span(&self, body_len: u64) -> Range<u64> {
        let offset = self.offset();
        offset..self.end.unwrap_or(offset.saturating_add(body_len))
    }
}

impl fmt::Display for ByteRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-", self.start)?;
        match self.end {
            Some(end) => write!(f, "{end}")?,
            None => f.write_str("*")?,
        }
        match self.total {
            Some(total) => write!(f, "/{total}"),
            None => f.write_str("/*"),
        }
    }
}

fn parse_optional(field: &str, what: &str) -> Result<Option<u64>, ValueError> {
    if field == "*" {
        return Ok(None);
    }
    field
        .parse()
        .map(Some)
        .map_err(|_| ValueError::new(format!("invalid byte range {what}: {field:?}")))
}

impl FromStr for ByteRange {
    type Err = ValueError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let invalid = || ValueError::new(format!("invalid byte range value: {value:?}"));
        let (range, total) = value.split_once('/').ok_or_else(invalid)?;
        let (start, end) = range.split_once('-').ok_or_else(invalid)?;
        let start = start.parse().map_err(|_| invalid())?;
        Self::new(
            start,
            parse_optional(end, "end")?,
            parse_optional(total, "total")?,
        )
    }
}

/// `Status` header value: `000 <code> [comment]`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Status {
    pub code: StatusCode,
    pub comment: Option<String>,
}

impl Status {
    #[must_use]
    pub fn new(code: StatusCode, comment: Option<String>) -> Self { Self { code, comment } }

    /// Status using the code's reason phrase as comment.
    #[must_use]
    pub fn with_reason(code: StatusCode) -> Self {
        Self::new(code, code.reason().map(str::to_owned))
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "000 {}", self.code)?;
        if let Some(comment) = &self.comment {
            write!(f, " {comment}")?;
        }
        Ok(())
    }
}

impl FromStr for Status {
    type Err = ValueError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let rest = value
            .strip_prefix("000 ")
            .ok_or_else(|| ValueError::new(format!("invalid status value: {value:?}")))?;
        let (code, comment) = match rest.split_once(' ') {
            Some((code, comment)) => (code, Some(comment).filter(|c| !c.is_empty())),
            None => (rest, None),
        };
        let code = parse_status_code(code)
            .ok_or_else(|| ValueError::new(format!("invalid status code: {code:?}")))?;
        Ok(Self::new(code, comment.map(str::to_owned)))
    }
}

/// Parse exactly three ASCII digits into a [`StatusCode`].
#[must_use]
pub fn parse_status_code(value: &str) -> Option<StatusCode> {
    if value.len() != 3 || !value.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    value.parse().ok().and_then(StatusCode::new)
}

/// `Success-Report` policy. Absent means [`SuccessReport::No`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum SuccessReport {
    Yes,
    #[default]
    No,
}

/// `Failure-Report` policy. Absent means [`FailureReport::Yes`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum FailureReport {
    #[default]
    Yes,
    No,
    Partial,
}

impl FailureReport {
    /// Whether a locally detected failure should be reported back.
    #[must_use]
    pub fn wants_report(self) -> bool { !matches!(self, Self::No) }
}

impl fmt::Display for SuccessReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Yes => "yes",
            Self::No => "no",
        })
    }
}

impl FromStr for SuccessReport {
    type Err = ValueError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "yes" => Ok(Self::Yes),
            "no" => Ok(Self::No),
            other => Err(ValueError::new(format!(
                "invalid Success-Report value: {other:?}"
            ))),
        }
    }
}

impl fmt::Display for FailureReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Yes => "yes",
            Self::No => "no",
            Self::Partial => "partial",
        })
    }
}

impl FromStr for FailureReport {
    type Err = ValueError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "yes" => Ok(Self::Yes),
            "no" => Ok(Self::No),
            "partial" => Ok(Self::Partial),
            other => Err(ValueError::new(format!(
                "invalid Failure-Report value: {other:?}"
            ))),
        }
    }
}

/// Ordered `name="value"` list used by the authentication headers.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Parameters(pub Vec<(String, String)>);

impl Parameters {
    /// Look up a parameter by name.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&str> {
        self.0
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    fn parse_list(value: &str, separator: char) -> Result<Self, ValueError> {
        let mut params = Vec::new();
        for item in split_outside_quotes(value, separator) {
            let item = item.trim();
            if item.is_empty() {
                continue;
            }
            let (name, raw) = item
                .split_once('=')
                .ok_or_else(|| ValueError::new(format!("invalid parameter: {item:?}")))?;
            let name = name.trim();
            if name.is_empty() || !name.bytes().all(|b| b.is_ascii_alphanumeric() || b == b'_') {
                return Err(ValueError::new(format!("invalid parameter name: {name:?}")));
            }
            params.push((name.to_owned(), raw.trim().trim_matches('"').to_owned()));
        }
        Ok(Self(params))
    }

    fn write_list(&self, f: &mut fmt::Formatter<'_>, separator: &str) -> fmt::Result {
        for (index, (name, value)) in self.0.iter().enumerate() {
            if index > 0 {
                f.write_str(separator)?;
            }
            write!(f, "{name}=\"{value}\"")?;
        }
        Ok(())
    }
}

fn split_outside_quotes(value: &str, separator: char) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut quoted = false;
    let mut begin = 0;
    for (index, ch) in value.char_indices() {
        if ch == '"' {
            quoted = !quoted;
        } else if ch == separator && !quoted {
            parts.push(&value[begin..index]);
            begin = index + ch.len_utf8();
        }
    }
    parts.push(&value[begin..]);
    parts
}

impl fmt::Display for Parameters {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { self.write_list(f, ", ") }
}

impl FromStr for Parameters {
    type Err = ValueError;

    fn from_str(value: &str) -> Result<Self, Self::Err> { Self::parse_list(value, ',') }
}

/// `Digest` credentials or challenge (`WWW-Authenticate`, `Authorization`).
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Digest(pub Parameters);

impl fmt::Display for Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { write!(f, "Digest {}", self.0) }
}

impl FromStr for Digest {
    type Err = ValueError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let params = value
            .strip_prefix("Digest ")
            .ok_or_else(|| ValueError::new("invalid Digest header value"))?;
        params.parse().map(Self)
    }
}

/// `Content-Disposition` value.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ContentDisposition {
    pub disposition: String,
    pub parameters: Parameters,
}

impl fmt::Display for ContentDisposition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.disposition)?;
        if !self.parameters.0.is_empty() {
            f.write_str("; ")?;
            self.parameters.write_list(f, "; ")?;
        }
        Ok(())
    }
}

impl FromStr for ContentDisposition {
    type Err = ValueError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let (disposition, parameters) = value.split_once(';').unwrap_or((value, ""));
        let disposition = disposition.trim();
        if disposition.is_empty() {
            return Err(ValueError::new(format!(
                "invalid content disposition: {value:?}"
            )));
        }
        Ok(Self {
            disposition: disposition.to_owned(),
            parameters: Parameters::parse_list(parameters, ';')?,
        })
    }
}
