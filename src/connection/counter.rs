//! Open transport accounting.

use std::sync::atomic::{AtomicU64, Ordering};

use log::debug;

static OPEN: AtomicU64 = AtomicU64::new(0);

/// Counts a transport as open for as long as it lives.
///
/// Both sessions and relay hops hold one; the total is mirrored into the
/// [`CONNECTIONS_ACTIVE`](crate::metrics::CONNECTIONS_ACTIVE) gauge.
#[derive(Debug)]
pub struct ActiveConnection {
    label: String,
}

impl ActiveConnection {
    /// Count a transport identified by `label` in logs.
    #[must_use]
    pub fn open(label: impl Into<String>) -> Self {
        let label = label.into();
        let open = OPEN.fetch_add(1, Ordering::Relaxed) + 1;
        crate::metrics::inc_connections();
        debug!("transport opened: peer={label}, open={open}");
        Self { label }
    }
}

impl Drop for ActiveConnection {
    fn drop(&mut self) {
        let open = OPEN.fetch_sub(1, Ordering::Relaxed).saturating_sub(1);
        crate::metrics::dec_connections();
        debug!("transport closed: peer={}, open={open}", self.label);
    }
}

/// Number of transports currently open in this process.
#[must_use]
pub fn active_connection_count() -> u64 { OPEN.load(Ordering::Relaxed) }

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn guard_counts_while_alive() {
        let guard = ActiveConnection::open("test-peer");
        assert!(active_connection_count() >= 1);
        drop(guard);
    }
}
