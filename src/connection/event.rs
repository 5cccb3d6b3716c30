//! Notifications emitted by the chunk writer.

use std::io;

use crate::chunk::TransactionId;

/// Outcome of writing one queued frame.
///
/// Only data chunks report `Written` and `Interrupted`; control chunks are
/// fire-and-forget unless they cannot be encoded.
#[derive(Debug)]
pub enum WriteEvent {
    /// The data chunk went out completely.
    Written { transaction_id: TransactionId },
    /// The data chunk was cut short after `sent` body bytes and terminated
    /// with the `+` flag.
    Interrupted {
        transaction_id: TransactionId,
        sent: u64,
    },
    /// The chunk was not written because its body contains its own end-line.
    Rejected { transaction_id: TransactionId },
    /// The transport failed; the writer has stopped.
    Failed(io::Error),
}
