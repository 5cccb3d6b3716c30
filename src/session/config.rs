//! Session tuning knobs.

use std::num::NonZeroUsize;

use serde::{Deserialize, Serialize};
use tokio::time::Duration;

use crate::{
    chunk::IdGenerator,
    codec::CodecConfig,
    connection::DEFAULT_WRITE_SLICE,
};

/// Default upper bound on a chunk body written by a session (64 KiB).
pub const DEFAULT_MAX_CHUNK_SIZE: usize = 64 * 1024;

/// Default upper bound on a reassembled message (16 MiB).
pub const DEFAULT_MAX_MESSAGE_SIZE: usize = 16 * 1024 * 1024;

/// Configuration shared by every session a process opens.
///
/// # Examples
///
/// ```
/// use std::time::Duration;
///
/// use msrp::session::SessionConfig;
///
/// let config = SessionConfig::default()
///     .with_transaction_timeout(Duration::from_secs(5))
///     .with_accept_types(["text/*"]);
/// assert!(config.accepts("text/plain; charset=utf-8"));
/// assert!(!config.accepts("image/png"));
/// ```
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// How long a request may wait for its response.
    pub transaction_timeout: Duration,
    /// How long a partial inbound message may sit idle.
    pub reassembly_timeout: Duration,
    /// How long an ending session waits for outstanding transactions.
    pub close_grace: Duration,
    /// How long to wait for the transport to connect.
    pub connect_timeout: Duration,
    /// Largest body carried by one outbound chunk.
    pub max_chunk_size: usize,
    /// Body bytes written between checks for waiting responses.
    pub write_slice: usize,
    /// Largest inbound message accepted.
    pub max_message_size: usize,
    /// Length of generated transaction and message identifiers.
    pub id_length: usize,
    /// Accepted inbound content types; `*` and `type/*` wildcards allowed.
    pub accept_types: Vec<String>,
    pub high_queue_capacity: usize,
    pub low_queue_capacity: usize,
    pub codec: CodecConfig,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            transaction_timeout: Duration::from_secs(30),
            reassembly_timeout: Duration::from_secs(60),
            close_grace: Duration::from_secs(5),
            connect_timeout: Duration::from_secs(10),
            max_chunk_size: DEFAULT_MAX_CHUNK_SIZE,
            write_slice: DEFAULT_WRITE_SLICE,
            max_message_size: DEFAULT_MAX_MESSAGE_SIZE,
            id_length: 16,
            accept_types: vec!["*".to_owned()],
            high_queue_capacity: 64,
            low_queue_capacity: 4,
            codec: CodecConfig::default(),
        }
    }
}

impl SessionConfig {
    #[must_use]
    pub fn with_transaction_timeout(mut self, timeout: Duration) -> Self {
        self.transaction_timeout = timeout;
        self
    }

    #[must_use]
    pub fn with_reassembly_timeout(mut self, timeout: Duration) -> Self {
        self.reassembly_timeout = timeout;
        self
    }

    #[must_use]
    pub fn with_close_grace(mut self, grace: Duration) -> Self {
        self.close_grace = grace;
        self
    }

    #[must_use]
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    #[must_use]
    pub fn with_max_chunk_size(mut self, size: usize) -> Self {
        self.max_chunk_size = size;
        self
    }

    #[must_use]
    pub fn with_write_slice(mut self, size: usize) -> Self {
        self.write_slice = size;
        self
    }

    #[must_use]
    pub fn with_max_message_size(mut self, size: usize) -> Self {
        self.max_message_size = size;
        self
    }

    #[must_use]
    pub fn with_id_length(mut self, length: usize) -> Self {
        self.id_length = length;
        self
    }

    #[must_use]
    pub fn with_accept_types<I, S>(mut self, types: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.accept_types = types.into_iter().map(Into::into).collect();
        self
    }

    #[must_use]
    pub fn with_codec(mut self, codec: CodecConfig) -> Self {
        self.codec = codec;
        self
    }

    /// Whether an inbound body of `content_type` is accepted.
    #[must_use]
    pub fn accepts(&self, content_type: &str) -> bool {
        let media = content_type
            .split(';')
            .next()
            .unwrap_or_default()
            .trim();
        let (kind, _) = media.split_once('/').unwrap_or((media, ""));
        self.accept_types.iter().any(|pattern| {
            let pattern = pattern.trim();
            pattern == "*"
                || pattern.eq_ignore_ascii_case(media)
                || pattern
                    .strip_suffix("/*")
                    .is_some_and(|prefix| prefix.eq_ignore_ascii_case(kind))
        })
    }

    pub(crate) fn chunk_size(&self) -> NonZeroUsize { non_zero(self.max_chunk_size) }

    pub(crate) fn write_slice_size(&self) -> NonZeroUsize { non_zero(self.write_slice) }

    pub(crate) fn message_limit(&self) -> NonZeroUsize { non_zero(self.max_message_size) }

    pub(crate) fn id_generator(&self) -> IdGenerator { IdGenerator::new(non_zero(self.id_length)) }
}

fn non_zero(value: usize) -> NonZeroUsize { NonZeroUsize::new(value).unwrap_or(NonZeroUsize::MIN) }

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    #[rstest]
    #[case(&["*"], "application/octet-stream", true)]
    #[case(&["text/plain"], "TEXT/PLAIN", true)]
    #[case(&["text/plain"], "text/html", false)]
    #[case(&["message/cpim", "text/*"], "text/html; charset=utf-8", true)]
    #[case(&["image/*"], "text/plain", false)]
    fn content_type_filter(#[case] accept: &[&str], #[case] offered: &str, #[case] expected: bool) {
        let config = SessionConfig::default().with_accept_types(accept.iter().copied());
        assert_eq!(config.accepts(offered), expected);
    }

    #[test]
    fn zero_sizes_fall_back_to_one() {
        let config = SessionConfig::default().with_max_chunk_size(0);
        assert_eq!(config.chunk_size().get(), 1);
    }
}
