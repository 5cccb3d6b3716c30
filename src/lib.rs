#![doc(html_root_url = "https://docs.rs/msrp/latest")]
//! Public API for the `msrp` library.
//!
//! This crate implements the Message Session Relay Protocol (RFC 4975) and
//! its relay extension (RFC 4976): chunk framing, transaction correlation,
//! per-session state, message chunking and reassembly, delivery reporting,
//! and To-Path/From-Path validation and forwarding.
//!
//! A [`Session`](session::Session) owns one transport and exchanges whole
//! messages with a peer. A [`Relay`](relay::Relay) forwards chunks between
//! hop connections.

pub mod chunk;
pub mod codec;
pub mod connection;
pub mod error;
pub mod message;
pub mod metrics;
pub mod path;
pub mod push;
pub mod relay;
pub mod report;
pub mod session;
pub mod status;
pub mod traffic;
pub mod transaction;
pub mod uri;

pub use chunk::{Chunk, MessageId, TransactionId};
pub use error::{MsrpError, Result};
pub use metrics::{CHUNKS_PROCESSED, CONNECTIONS_ACTIVE, Direction, ERRORS_TOTAL};
pub use path::Path;
pub use relay::{Relay, RelayServer};
pub use session::{Session, SessionConfig, SessionEvent, SessionHandle, SessionParams};
pub use status::StatusCode;
pub use uri::MsrpUri;
