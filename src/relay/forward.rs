//! Path rewriting applied by a relay to every SEND and REPORT it receives.

use crate::{
    chunk::{Chunk, Header},
    path::PathError,
    uri::MsrpUri,
};

/// Where a request goes after the relay consumed its To-Path head.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Route {
    /// To-Path ended at the relay; the chunk is for a local consumer.
    Local(Chunk),
    /// The chunk was rewritten for the next hop, whose URI is `next`.
    Next { next: MsrpUri, chunk: Chunk },
}

/// Consume `relay` from the head of the chunk's To-Path.
///
/// When more entries remain, `relay` is inserted at the front of From-Path
/// so the last entry keeps naming the originating endpoint. Every other
/// header and the body are left untouched.
///
/// # Errors
///
/// Returns [`PathError::Missing`] for a request without To-Path or
/// From-Path, [`PathError::NotLocal`] when the To-Path head is not `relay`,
/// and [`PathError::Duplicate`] when `relay` already appears in From-Path.
///
/// # Examples
///
/// ```
/// use msrp::{
///     chunk::{Chunk, Header, Method, TransactionId},
///     path::Path,
///     relay::{Route, route_request},
///     uri::MsrpUri,
/// };
///
/// let relay: MsrpUri = "msrp://relay.example.net:2855/r;tcp".parse().expect("valid uri");
/// let to_path: Path = "msrp://relay.example.net:2855/r;tcp msrp://bob.example.com:8888/s;tcp"
///     .parse()
///     .expect("valid path");
/// let from_path: Path = "msrp://alice.example.com:7777/a;tcp".parse().expect("valid path");
/// let chunk = Chunk::request(TransactionId::new("abcd1234").expect("valid id"), Method::Send)
///     .with_header(Header::ToPath(to_path))
///     .with_header(Header::FromPath(from_path));
///
/// let Route::Next { next, chunk } = route_request(&relay, chunk).expect("routable") else {
///     panic!("expected a next hop");
/// };
/// assert_eq!(next.host(), "bob.example.com");
/// assert_eq!(chunk.from_path().map(|p| p.len()), Some(2));
/// ```
pub fn route_request(relay: &MsrpUri, mut chunk: Chunk) -> Result<Route, PathError> {
    let to_path = chunk.to_path().cloned().ok_or(PathError::Missing("To-Path"))?;
    let mut from_path = chunk
        .from_path()
        .cloned()
        .ok_or(PathError::Missing("From-Path"))?;
    if to_path.head() != relay {
        return Err(PathError::NotLocal {
            expected: relay.clone(),
            found: to_path.head().clone(),
        });
    }
    let (_, rest) = to_path.pop_head();
    let Some(rest) = rest else {
        return Ok(Route::Local(chunk));
    };
    from_path.prepend(relay.clone())?;
    let next = rest.head().clone();
    chunk.set_header(Header::ToPath(rest));
    chunk.set_header(Header::FromPath(from_path));
    Ok(Route::Next { next, chunk })
}
