//! Relay tuning knobs.

use std::num::NonZeroUsize;

use serde::{Deserialize, Serialize};
use tokio::time::Duration;

use crate::{codec::CodecConfig, connection::DEFAULT_WRITE_SLICE};

/// Configuration of a [`Relay`](super::Relay).
///
/// ```
/// use std::time::Duration;
///
/// use msrp::relay::RelayConfig;
///
/// let config = RelayConfig::default().with_transaction_timeout(Duration::from_secs(10));
/// assert_eq!(config.expires, 600);
/// ```
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RelayConfig {
    /// How long a forwarded request may wait for the next hop's response.
    pub transaction_timeout: Duration,
    /// How long to wait for an on-demand connection to the next hop.
    pub connect_timeout: Duration,
    /// Lifetime in seconds granted to clients in AUTH responses.
    pub expires: u32,
    /// Body bytes written between checks for waiting responses.
    pub write_slice: usize,
    pub high_queue_capacity: usize,
    pub low_queue_capacity: usize,
    pub codec: CodecConfig,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            transaction_timeout: Duration::from_secs(30),
            connect_timeout: Duration::from_secs(10),
            expires: 600,
            write_slice: DEFAULT_WRITE_SLICE,
            high_queue_capacity: 256,
            low_queue_capacity: 64,
            codec: CodecConfig::default(),
        }
    }
}

impl RelayConfig {
    #[must_use]
    pub fn with_transaction_timeout(mut self, timeout: Duration) -> Self {
        self.transaction_timeout = timeout;
        self
    }

    #[must_use]
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    #[must_use]
    pub fn with_expires(mut self, seconds: u32) -> Self {
        self.expires = seconds;
        self
    }

    #[must_use]
    pub fn with_codec(mut self, codec: CodecConfig) -> Self {
        self.codec = codec;
        self
    }

    pub(crate) fn write_slice_size(&self) -> NonZeroUsize {
        NonZeroUsize::new(self.write_slice).unwrap_or(NonZeroUsize::MIN)
    }
}
