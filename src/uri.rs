//! MSRP URIs and their comparison rules.
//!
//! An MSRP URI names one endpoint or relay of a session:
//! `msrp[s]://[user@]host[:port][/session-id];transport[;name=value...]`.
//! Two URIs are equal when their scheme, host (case-insensitively), port,
//! session identifier and transport (case-insensitively) agree. The user part
//! and any URI parameters are ignored for comparison.

use std::{
    fmt,
    hash::{Hash, Hasher},
    str::FromStr,
};

use rand::{Rng, distributions::Alphanumeric};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Port assumed when a URI does not carry one.
pub const DEFAULT_PORT: u16 = 2855;

/// The only transport this crate speaks.
pub const TCP_TRANSPORT: &str = "tcp";

const SESSION_ID_LENGTH: usize = 20;

/// Errors raised while parsing an MSRP URI.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum UriError {
    /// The scheme was neither `msrp` nor `msrps`.
    #[error("invalid URI scheme: {0:?}")]
    InvalidScheme(String),
    /// The `://` separator is missing.
    #[error("missing scheme separator in {0:?}")]
    MissingScheme(String),
    /// The host part is empty or malformed.
    #[error("invalid host in {0:?}")]
    InvalidHost(String),
    /// The port is not a number in range.
    #[error("invalid port: {0:?}")]
    InvalidPort(String),
    /// The `;transport` suffix is missing.
    #[error("missing transport in {0:?}")]
    MissingTransport(String),
    /// A transport other than TCP was requested.
    #[error("unsupported transport: {0:?} (only 'tcp' is accepted)")]
    UnsupportedTransport(String),
    /// A URI parameter was not of the form `name=value`.
    #[error("cannot parse URI parameter {0:?}")]
    InvalidParameter(String),
}

/// Network location used to pick a connection for a URI.
///
/// Relays and connectors route by authority: every URI reachable over the
/// same connection shares it.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Authority {
    secure: bool,
    host: String,
    port: u16,
}

impl Authority {
    /// Whether the authority requires TLS (`msrps`).
    #[must_use]
    pub fn is_secure(&self) -> bool { self.secure }

    /// Lower-cased host name or address literal.
    #[must_use]
    pub fn host(&self) -> &str { &self.host }

    /// Port number, with [`DEFAULT_PORT`] substituted when absent.
    #[must_use]
    pub fn port(&self) -> u16 { self.port }
}

impl fmt::Display for Authority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let scheme = if self.secure { "msrps" } else { "msrp" };
        write!(f, "{scheme}://{}:{}", self.host, self.port)
    }
}

/// A parsed MSRP URI.
///
/// # Examples
///
/// ```
/// use msrp::uri::MsrpUri;
///
/// let uri: MsrpUri = "msrp://Alice.Example.com:7654/session1;tcp"
///     .parse()
///     .expect("valid uri");
/// let same: MsrpUri = "msrp://alice.example.com:7654/session1;TCP"
///     .parse()
///     .expect("valid uri");
/// assert_eq!(uri, same);
/// assert_eq!(uri.session_id(), Some("session1"));
/// ```
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct MsrpUri {
    secure: bool,
    user: Option<String>,
    host: String,
    port: Option<u16>,
    session_id: Option<String>,
    transport: String,
    parameters: Vec<(String, String)>,
}

impl MsrpUri {
    /// Build a TCP URI for `host` with a freshly generated session identifier.
    #[must_use]
    pub fn new(host: impl Into<String>, port: Option<u16>, secure: bool) -> Self {
        Self {
            secure,
            user: None,
            host: host.into(),
            port,
            session_id: Some(generate_session_id()),
            transport: TCP_TRANSPORT.to_owned(),
            parameters: Vec::new(),
        }
    }

    /// Replace the session identifier.
    #[must_use]
    pub fn with_session_id(mut self, session_id: Option<String>) -> Self {
        self.session_id = session_id;
        self
    }

    /// Attach a user part.
    #[must_use]
    pub fn with_user(mut self, user: impl Into<String>) -> Self {
        self.user = Some(user.into());
        self
    }

    /// Append a URI parameter.
    #[must_use]
    pub fn with_parameter(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.parameters.push((name.into(), value.into()));
        self
    }

    #[must_use]
    pub fn is_secure(&self) -> bool { self.secure }

    #[must_use]
    pub fn scheme(&self) -> &'static str { if self.secure { "msrps" } else { "msrp" } }

    #[must_use]
    pub fn user(&self) -> Option<&str> { self.user.as_deref() }

    #[must_use]
    pub fn host(&self) -> &str { &self.host }

    #[must_use]
    pub fn port(&self) -> Option<u16> { self.port }

    #[must_use]
    pub fn session_id(&self) -> Option<&str> { self.session_id.as_deref() }

    #[must_use]
    pub fn transport(&self) -> &str { &self.transport }

    #[must_use]
    pub fn parameters(&self) -> &[(String, String)] { &self.parameters }

    /// Connection authority for routing.
    #[must_use]
    pub fn authority(&self) -> Authority {
        Authority {
            secure: self.secure,
            host: self.host.to_ascii_lowercase(),
            port: self.port.unwrap_or(DEFAULT_PORT),
        }
    }

    fn comparison_key(&self) -> (bool, String, Option<u16>, Option<&str>, String) {
        (
            self.secure,
            self.host.to_ascii_lowercase(),
            self.port,
            self.session_id.as_deref(),
            self.transport.to_ascii_lowercase(),
        )
    }
}

/// Generate a random session identifier suitable for the URI path.
#[must_use]
pub fn generate_session_id() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(SESSION_ID_LENGTH)
        .map(char::from)
        .collect()
}

impl PartialEq for MsrpUri {
    fn eq(&self, other: &Self) -> bool { self.comparison_key() == other.comparison_key() }
}

impl Eq for MsrpUri {}

impl Hash for MsrpUri {
    fn hash<H: Hasher>(&self, state: &mut H) { self.comparison_key().hash(state); }
}

impl fmt::Display for MsrpUri {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}://", self.scheme())?;
        if let Some(user) = &self.user {
            write!(f, "{user}@")?;
        }
        f.write_str(&self.host)?;
        if let Some(port) = self.port {
            write!(f, ":{port}")?;
        }
        if let Some(session_id) = &self.session_id {
            write!(f, "/{session_id}")?;
        }
        write!(f, ";{}", self.transport)?;
        for (name, value) in &self.parameters {
            write!(f, ";{name}={value}")?;
        }
        Ok(())
    }
}

impl FromStr for MsrpUri {
    type Err = UriError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let (scheme, rest) = value
            .split_once("://")
            .ok_or_else(|| UriError::MissingScheme(value.to_owned()))?;
        let secure = match scheme {
            "msrp" => false,
            "msrps" => true,
            other => return Err(UriError::InvalidScheme(other.to_owned())),
        };

        let (location, suffix) = rest
            .split_once(';')
            .ok_or_else(|| UriError::MissingTransport(value.to_owned()))?;
        let mut suffix_parts = suffix.split(';');
        let transport = suffix_parts.next().unwrap_or_default();
        if transport.is_empty() {
            return Err(UriError::MissingTransport(value.to_owned()));
        }
        if !transport.eq_ignore_ascii_case(TCP_TRANSPORT) {
            return Err(UriError::UnsupportedTransport(transport.to_owned()));
        }
        let parameters = suffix_parts
            .map(|param| {
                param
                    .split_once('=')
                    .map(|(name, value)| (name.to_owned(), value.to_owned()))
                    .ok_or_else(|| UriError::InvalidParameter(param.to_owned()))
            })
            .collect::<Result<Vec<_>, _>>()?;

        let (authority, session_id) = match location.split_once('/') {
            Some((authority, session)) => {
                (authority, Some(session).filter(|s| !s.is_empty()))
            }
            None => (location, None),
        };
        let (user, host_port) = match authority.split_once('@') {
            Some((user, host_port)) => (Some(user.to_owned()), host_port),
            None => (None, authority),
        };
        let (host, port) = split_host_port(host_port, value)?;

        Ok(Self {
            secure,
            user,
            host,
            port,
            session_id: session_id.map(str::to_owned),
            transport: transport.to_owned(),
            parameters,
        })
    }
}

fn split_host_port(host_port: &str, whole: &str) -> Result<(String, Option<u16>), UriError> {
    let (host, port) = if let Some(literal) = host_port.strip_prefix('[') {
        let (address, tail) = literal
            .split_once(']')
            .ok_or_else(|| UriError::InvalidHost(whole.to_owned()))?;
        let port = match tail {
            "" => None,
            tail => Some(
                tail.strip_prefix(':')
                    .ok_or_else(|| UriError::InvalidHost(whole.to_owned()))?,
            ),
        };
        (format!("[{address}]"), port)
    } else {
        match host_port.rsplit_once(':') {
            Some((host, port)) => (host.to_owned(), Some(port)),
            None => (host_port.to_owned(), None),
        }
    };
    if host.is_empty() || host == "[]" {
        return Err(UriError::InvalidHost(whole.to_owned()));
    }
    let port = port
        .map(|p| p.parse::<u16>().map_err(|_| UriError::InvalidPort(p.to_owned())))
        .transpose()?;
    Ok((host, port))
}

impl TryFrom<String> for MsrpUri {
    type Error = UriError;

    fn try_from(value: String) -> Result<Self, Self::Error> { value.parse() }
}

impl From<MsrpUri> for String {
    fn from(uri: MsrpUri) -> Self { uri.to_string() }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    #[test]
    fn parses_all_components() {
        let uri: MsrpUri = "msrps://bob@relay.example.net:2856/abc123;tcp;ttl=5"
            .parse()
            .expect("valid uri");
        assert!(uri.is_secure());
        assert_eq!(uri.user(), Some("bob"));
        assert_eq!(uri.host(), "relay.example.net");
        assert_eq!(uri.port(), Some(2856));
        assert_eq!(uri.session_id(), Some("abc123"));
        assert_eq!(uri.transport(), "tcp");
        assert_eq!(uri.parameters(), &[("ttl".to_owned(), "5".to_owned())]);
        assert_eq!(
            uri.to_string(),
            "msrps://bob@relay.example.net:2856/abc123;tcp;ttl=5"
        );
    }

    #[test]
    fn relay_uri_without_session_id() {
        let uri: MsrpUri = "msrps://relay.example.net;tcp".parse().expect("valid uri");
        assert_eq!(uri.session_id(), None);
        assert_eq!(uri.port(), None);
        assert_eq!(uri.authority().port(), DEFAULT_PORT);
        assert_eq!(uri.to_string(), "msrps://relay.example.net;tcp");
    }

    #[test]
    fn ipv6_literal_host() {
        let uri: MsrpUri = "msrp://[2001:db8::1]:7777/s;tcp".parse().expect("valid uri");
        assert_eq!(uri.host(), "[2001:db8::1]");
        assert_eq!(uri.port(), Some(7777));
    }

    #[rstest]
    #[case::user_ignored("msrp://a@host:1/s;tcp", "msrp://host:1/s;tcp")]
    #[case::host_case("msrp://HOST:1/s;tcp", "msrp://host:1/s;tcp")]
    #[case::transport_case("msrp://host:1/s;TCP", "msrp://host:1/s;tcp")]
    #[case::params_ignored("msrp://host:1/s;tcp;a=b", "msrp://host:1/s;tcp")]
    fn equal_uris(#[case] left: &str, #[case] right: &str) {
        let left: MsrpUri = left.parse().expect("valid uri");
        let right: MsrpUri = right.parse().expect("valid uri");
        assert_eq!(left, right);
    }

    #[rstest]
    #[case::scheme("msrps://host:1/s;tcp", "msrp://host:1/s;tcp")]
    #[case::port("msrp://host:2/s;tcp", "msrp://host:1/s;tcp")]
    #[case::session_case("msrp://host:1/S;tcp", "msrp://host:1/s;tcp")]
    #[case::missing_port("msrp://host/s;tcp", "msrp://host:2855/s;tcp")]
    fn distinct_uris(#[case] left: &str, #[case] right: &str) {
        let left: MsrpUri = left.parse().expect("valid uri");
        let right: MsrpUri = right.parse().expect("valid uri");
        assert_ne!(left, right);
    }

    #[rstest]
    #[case::scheme("sip://host/s;tcp")]
    #[case::no_separator("msrp:host;tcp")]
    #[case::no_transport("msrp://host:1/s")]
    #[case::udp("msrp://host:1/s;udp")]
    #[case::port("msrp://host:http/s;tcp")]
    #[case::empty_host("msrp://:1/s;tcp")]
    #[case::parameter("msrp://host/s;tcp;novalue")]
    fn rejects_malformed(#[case] input: &str) {
        assert!(input.parse::<MsrpUri>().is_err(), "{input} should be rejected");
    }

    #[test]
    fn generated_uris_are_distinct() {
        let a = MsrpUri::new("host", Some(1), false);
        let b = MsrpUri::new("host", Some(1), false);
        assert_ne!(a, b);
    }
}
