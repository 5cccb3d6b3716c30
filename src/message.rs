//! Message chunking and reassembly.
//!
//! Outbound bodies are cut into byte-ranged slices by [`Chunker`] (whole
//! bodies) or [`OutgoingMessage`] (incrementally, resuming after an
//! interrupted write). Inbound SEND chunks are fed to [`Reassembler`], which
//! validates contiguous byte-range coverage and yields a message only once it
//! is complete.

pub mod chunker;
pub mod error;
pub mod reassembler;

pub use chunker::{Chunker, OutgoingMessage, Slice};
pub use error::ReassemblyError;
pub use reassembler::{AbortedMessage, ChunkOutcome, ExpiredMessage, Reassembler, ReceivedMessage};
