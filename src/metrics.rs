//! Metric helpers for `msrp`.
//!
//! This module defines metric names and simple helper functions wrapping the
//! [`metrics`](https://docs.rs/metrics) crate. Without the `metrics` feature
//! every helper is a no-op.

#[cfg(feature = "metrics")]
use metrics::{counter, gauge};

/// Name of the gauge tracking open connections.
pub const CONNECTIONS_ACTIVE: &str = "msrp_connections_active";
/// Name of the counter tracking chunks read and written.
pub const CHUNKS_PROCESSED: &str = "msrp_chunks_processed_total";
/// Name of the counter tracking error occurrences.
pub const ERRORS_TOTAL: &str = "msrp_errors_total";
/// Name of the counter tracking messages handed to the application.
pub const MESSAGES_DELIVERED: &str = "msrp_messages_delivered_total";
/// Name of the counter tracking messages aborted or expired.
pub const MESSAGES_ABORTED: &str = "msrp_messages_aborted_total";
/// Name of the counter tracking transactions that never saw a response.
pub const TRANSACTIONS_TIMED_OUT: &str = "msrp_transactions_timed_out_total";

/// Direction of chunk processing.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Direction {
    /// Chunks received from the peer.
    Inbound,
    /// Chunks sent to the peer.
    Outbound,
}

impl Direction {
    #[cfg_attr(not(feature = "metrics"), allow(dead_code))]
    fn as_str(self) -> &'static str {
        match self {
            Direction::Inbound => "inbound",
            Direction::Outbound => "outbound",
        }
    }
}

/// Error classes recorded under [`ERRORS_TOTAL`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ErrorKind {
    /// Frame could not be parsed.
    Parse,
    /// To-Path or From-Path rejected.
    Path,
    /// Byte-range accounting failed.
    Reassembly,
    /// Transport failed.
    Transport,
}

impl ErrorKind {
    #[cfg_attr(not(feature = "metrics"), allow(dead_code))]
    fn as_str(self) -> &'static str {
        match self {
            ErrorKind::Parse => "parse",
            ErrorKind::Path => "path",
            ErrorKind::Reassembly => "reassembly",
            ErrorKind::Transport => "transport",
        }
    }
}

/// Increment the active connections gauge.
pub fn inc_connections() {
    #[cfg(feature = "metrics")]
    gauge!(CONNECTIONS_ACTIVE).increment(1.0);
}

/// Decrement the active connections gauge.
pub fn dec_connections() {
    #[cfg(feature = "metrics")]
    gauge!(CONNECTIONS_ACTIVE).decrement(1.0);
}

/// Record a processed chunk for the given direction.
pub fn inc_chunks(direction: Direction) {
    #[cfg(feature = "metrics")]
    counter!(CHUNKS_PROCESSED, "direction" => direction.as_str()).increment(1);
    #[cfg(not(feature = "metrics"))]
    let _ = direction;
}

/// Record an error occurrence.
pub fn inc_errors(kind: ErrorKind) {
    #[cfg(feature = "metrics")]
    counter!(ERRORS_TOTAL, "kind" => kind.as_str()).increment(1);
    #[cfg(not(feature = "metrics"))]
    let _ = kind;
}

/// Record a message delivered to the application.
pub fn inc_delivered() {
    #[cfg(feature = "metrics")]
    counter!(MESSAGES_DELIVERED).increment(1);
}

/// Record an aborted or expired inbound message.
pub fn inc_aborted() {
    #[cfg(feature = "metrics")]
    counter!(MESSAGES_ABORTED).increment(1);
}

/// Record a transaction that timed out.
pub fn inc_timeouts() {
    #[cfg(feature = "metrics")]
    counter!(TRANSACTIONS_TIMED_OUT).increment(1);
}
