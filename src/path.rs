//! To-Path and From-Path handling.
//!
//! A [`Path`] is the ordered list of URIs a chunk must still traverse
//! (To-Path) or has already traversed (From-Path). Relays consume the head of
//! To-Path and push their own URI onto From-Path; nobody reorders the rest.

use std::{fmt, str::FromStr};

use thiserror::Error;

use crate::{
    status::StatusCode,
    uri::{MsrpUri, UriError},
};

/// Errors raised while building or authorising a path.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum PathError {
    /// A path header carried no URIs.
    #[error("path is empty")]
    Empty,
    /// The same URI appeared twice.
    #[error("duplicate path entry {0}")]
    Duplicate(MsrpUri),
    /// A path entry failed to parse.
    #[error("invalid path entry: {0}")]
    InvalidUri(#[from] UriError),
    /// A request lacked a required path header.
    #[error("missing {0} header")]
    Missing(&'static str),
    /// The first To-Path entry does not name this node.
    #[error("To-Path head {found} does not match local URI {expected}")]
    NotLocal {
        /// URI of this node.
        expected: MsrpUri,
        /// URI found at the head of To-Path.
        found: MsrpUri,
    },
    /// The last From-Path entry is not the expected peer.
    #[error("From-Path origin {found} does not match remote URI {expected}")]
    UnexpectedSender {
        /// URI negotiated for the peer.
        expected: MsrpUri,
        /// URI found at the end of From-Path.
        found: MsrpUri,
    },
}

impl PathError {
    /// Status code used to answer a request rejected with this error.
    #[must_use]
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::NotLocal { .. } => StatusCode::SESSION_DOES_NOT_EXIST,
            Self::UnexpectedSender { .. } => StatusCode::FORBIDDEN,
            Self::Empty | Self::Duplicate(_) | Self::InvalidUri(_) | Self::Missing(_) => {
                StatusCode::BAD_REQUEST
            }
        }
    }
}

/// Non-empty ordered URI list without duplicates.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Path(Vec<MsrpUri>);

impl Path {
    /// Build a path from `uris`.
    ///
    /// # Errors
    ///
    /// Returns [`PathError::Empty`] for an empty list and
    /// [`PathError::Duplicate`] when a URI repeats.
    pub fn new(uris: Vec<MsrpUri>) -> Result<Self, PathError> {
        if uris.is_empty() {
            return Err(PathError::Empty);
        }
        for (index, uri) in uris.iter().enumerate() {
            if uris[..index].contains(uri) {
                return Err(PathError::Duplicate(uri.clone()));
            }
        }
        Ok(Self(uris))
    }

    /// Path with a single entry.
    #[must_use]
    pub fn single(uri: MsrpUri) -> Self { Self(vec![uri]) }

    /// First entry: the next hop of a To-Path, the latest hop of a From-Path.
    #[must_use]
    pub fn head(&self) -> &MsrpUri { &self.0[0] }

    /// Last entry: the destination of a To-Path, the originator of a From-Path.
    #[must_use]
    pub fn last(&self) -> &MsrpUri { &self.0[self.0.len() - 1] }

    #[must_use]
    pub fn uris(&self) -> &[MsrpUri] { &self.0 }

    #[expect(clippy::len_without_is_empty, reason = "paths are never empty")]
    #[must_use]
    pub fn len(&self) -> usize { self.0.len() }

    /// Remove the head, returning the remainder if any entries are left.
    #[must_use]
    pub fn pop_head(self) -> (MsrpUri, Option<Self>) {
        let mut uris = self.0;
        let head = uris.remove(0);
        let rest = if uris.is_empty() { None } else { Some(Self(uris)) };
        (head, rest)
    }

    /// Insert `uri` in front of the existing entries.
    ///
    /// # Errors
    ///
    /// Returns [`PathError::Duplicate`] if `uri` is already on the path.
    pub fn prepend(&mut self, uri: MsrpUri) -> Result<(), PathError> {
        if self.0.contains(&uri) {
            return Err(PathError::Duplicate(uri));
        }
        self.0.insert(0, uri);
        Ok(())
    }

    /// The reverse route, used to address a REPORT back to the originator.
    #[must_use]
    pub fn reversed(&self) -> Self { Self(self.0.iter().rev().cloned().collect()) }
}

impl fmt::Display for Path {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (index, uri) in self.0.iter().enumerate() {
            if index > 0 {
                f.write_str(" ")?;
            }
            write!(f, "{uri}")?;
        }
        Ok(())
    }
}

impl FromStr for Path {
    type Err = PathError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let uris = value
            .split_ascii_whitespace()
            .map(str::parse)
            .collect::<Result<Vec<MsrpUri>, UriError>>()?;
        Self::new(uris)
    }
}

impl From<MsrpUri> for Path {
    fn from(uri: MsrpUri) -> Self { Self::single(uri) }
}

/// Check a request's paths against the session's URIs.
///
/// The head of `to_path` must be `local` and the last entry of `from_path`
/// must be `remote`.
///
/// # Errors
///
/// Returns [`PathError::Missing`] when either header is absent,
/// [`PathError::NotLocal`] (answered 481) or
/// [`PathError::UnexpectedSender`] (answered 403) on a mismatch.
pub fn authorize(
    to_path: Option<&Path>,
    from_path: Option<&Path>,
    local: &MsrpUri,
    remote: &MsrpUri,
) -> Result<(), PathError> {
    let to_path = to_path.ok_or(PathError::Missing("To-Path"))?;
    let from_path = from_path.ok_or(PathError::Missing("From-Path"))?;
    if to_path.head() != local {
        return Err(PathError::NotLocal {
            expected: local.clone(),
            found: to_path.head().clone(),
        });
    }
    if from_path.last() != remote {
        return Err(PathError::UnexpectedSender {
            expected: remote.clone(),
            found: from_path.last().clone(),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use rstest::{fixture, rstest};

    use super::*;

    fn uri(value: &str) -> MsrpUri { value.parse().expect("valid uri") }

    #[fixture]
    fn local() -> MsrpUri { uri("msrp://alice.example.com:7654/session1;tcp") }

    #[fixture]
    fn remote() -> MsrpUri { uri("msrp://bob.example.com:8765/session2;tcp") }

    #[test]
    fn parses_space_separated_entries() {
        let path: Path = "msrps://relay.example.net;tcp msrp://bob.example.com:8765/s;tcp"
            .parse()
            .expect("valid path");
        assert_eq!(path.len(), 2);
        assert_eq!(path.head().host(), "relay.example.net");
        assert_eq!(path.last().host(), "bob.example.com");
        assert_eq!(
            path.to_string(),
            "msrps://relay.example.net;tcp msrp://bob.example.com:8765/s;tcp"
        );
    }

    #[test]
    fn rejects_duplicates() {
        let err = "msrp://a:1/s;tcp msrp://A:1/s;tcp"
            .parse::<Path>()
            .expect_err("duplicate entries");
        assert!(matches!(err, PathError::Duplicate(_)));
    }

    #[test]
    fn rejects_empty() {
        assert_eq!("  ".parse::<Path>(), Err(PathError::Empty));
    }

    #[test]
    fn pop_and_prepend_keep_order() {
        let path: Path = "msrp://r1:1;tcp msrp://r2:2;tcp msrp://b:3/s;tcp"
            .parse()
            .expect("valid path");
        let (head, rest) = path.pop_head();
        assert_eq!(head, uri("msrp://r1:1;tcp"));
        let rest = rest.expect("entries remain");
        assert_eq!(rest.to_string(), "msrp://r2:2;tcp msrp://b:3/s;tcp");

        let mut from = Path::single(uri("msrp://a:4/s;tcp"));
        from.prepend(head).expect("new entry");
        assert_eq!(from.to_string(), "msrp://r1:1;tcp msrp://a:4/s;tcp");
        assert_eq!(from.last(), &uri("msrp://a:4/s;tcp"));
    }

    #[rstest]
    fn authorizes_matching_paths(local: MsrpUri, remote: MsrpUri) {
        let to = Path::single(local.clone());
        let from = Path::single(remote.clone());
        assert_eq!(authorize(Some(&to), Some(&from), &local, &remote), Ok(()));
    }

    #[rstest]
    fn foreign_to_path_is_481(local: MsrpUri, remote: MsrpUri) {
        let to = Path::single(uri("msrp://alice.example.com:7654/other;tcp"));
        let from = Path::single(remote.clone());
        let err = authorize(Some(&to), Some(&from), &local, &remote).expect_err("mismatch");
        assert_eq!(err.status_code(), StatusCode::SESSION_DOES_NOT_EXIST);
    }

    #[rstest]
    fn foreign_sender_is_403(local: MsrpUri, remote: MsrpUri) {
        let to = Path::single(local.clone());
        let from = Path::single(uri("msrp://mallory.example.com:1/x;tcp"));
        let err = authorize(Some(&to), Some(&from), &local, &remote).expect_err("mismatch");
        assert_eq!(err.status_code(), StatusCode::FORBIDDEN);
    }

    #[rstest]
    fn relayed_sender_validated_by_origin(local: MsrpUri, remote: MsrpUri) {
        let to = Path::single(local.clone());
        let from = Path::new(vec![uri("msrps://relay.example.net;tcp"), remote.clone()])
            .expect("valid path");
        assert_eq!(authorize(Some(&to), Some(&from), &local, &remote), Ok(()));
    }

    #[rstest]
    fn missing_header_is_400(local: MsrpUri, remote: MsrpUri) {
        let from = Path::single(remote.clone());
        let err = authorize(None, Some(&from), &local, &remote).expect_err("missing");
        assert_eq!(err, PathError::Missing("To-Path"));
        assert_eq!(err.status_code(), StatusCode::BAD_REQUEST);
    }
}
