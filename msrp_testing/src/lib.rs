//! Utilities for exercising `msrp` sessions and relays over in-memory
//! transports during tests.
//!
//! [`RawPeer`] stands in for a remote endpoint speaking raw MSRP on one end
//! of a `tokio::io::duplex` pair, while [`LoggerHandle`] serialises log
//! capture between tests.
//!
//! ```rust
//! use msrp::chunk::Chunk;
//! use msrp_testing::{RawPeer, send_chunk};
//!
//! # async fn demo() {
//! let (_local, mut peer) = RawPeer::pair();
//! let chunk: Chunk = send_chunk(
//!     "d93kswow",
//!     "msrp://bob.example.com:8888/s;tcp",
//!     "msrp://alice.example.com:7654/a;tcp",
//!     "12339sdqwer",
//!     b"Hi",
//! );
//! peer.send(&chunk).await;
//! # }
//! ```

pub mod logging;
pub mod peer;

pub use logging::{LoggerHandle, logger};
pub use peer::{DEFAULT_CAPACITY, RawPeer, send_chunk, tid, uri};
