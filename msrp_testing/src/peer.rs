//! Raw MSRP endpoint over an in-memory duplex stream.

use std::time::Duration;

use bytes::Bytes;
use futures::StreamExt;
use msrp::{
    chunk::{ByteRange, Chunk, Header, MessageId, Method, TransactionId},
    codec::{self, Decoded, MsrpCodec},
    path::Path,
    uri::MsrpUri,
};
use tokio::{
    io::{AsyncWriteExt, DuplexStream, ReadHalf, WriteHalf, duplex},
    time::timeout,
};
use tokio_util::codec::FramedRead;

/// Buffer size used for duplex pairs created by [`RawPeer::pair`].
pub const DEFAULT_CAPACITY: usize = 64 * 1024;

const READ_TIMEOUT: Duration = Duration::from_secs(5);

/// Remote side of a transport, reading and writing whole chunks.
pub struct RawPeer {
    reader: FramedRead<ReadHalf<DuplexStream>, MsrpCodec>,
    writer: WriteHalf<DuplexStream>,
}

impl RawPeer {
    /// Wrap one end of a duplex stream.
    #[must_use]
    pub fn new(stream: DuplexStream) -> Self {
        let (read, writer) = tokio::io::split(stream);
        Self {
            reader: FramedRead::new(read, MsrpCodec::default()),
            writer,
        }
    }

    /// Create a duplex pair, returning the local end and a peer on the
    /// other.
    #[must_use]
    pub fn pair() -> (DuplexStream, Self) {
        let (local, remote) = duplex(DEFAULT_CAPACITY);
        (local, Self::new(remote))
    }

    /// Next decoded chunk, panicking after five seconds or on a malformed
    /// frame.
    pub async fn next_chunk(&mut self) -> Chunk {
        match self.try_next().await {
            Some(Decoded::Chunk(chunk)) => chunk,
            Some(Decoded::Malformed(bad)) => panic!("malformed chunk: {bad:?}"),
            None => panic!("transport closed"),
        }
    }

    /// Next decoded frame, or `None` once the other end closed.
    pub async fn try_next(&mut self) -> Option<Decoded> {
        timeout(READ_TIMEOUT, self.reader.next())
            .await
            .expect("chunk in time")
            .map(|item| item.expect("decodable"))
    }

    /// Encode and write `chunk`.
    pub async fn send(&mut self, chunk: &Chunk) {
        let bytes = codec::to_bytes(chunk).expect("encodable");
        self.send_raw(&bytes).await;
    }

    /// Write `bytes` verbatim.
    pub async fn send_raw(&mut self, bytes: &[u8]) {
        self.writer.write_all(bytes).await.expect("write");
    }

    /// Answer `request` with `status`.
    pub async fn respond(&mut self, request: &Chunk, status: msrp::StatusCode) {
        self.send(&msrp::report::response_for(request, status)).await;
    }
}

/// Parse `value` as an MSRP URI.
#[must_use]
pub fn uri(value: &str) -> MsrpUri { value.parse().expect("valid uri") }

/// Build a transaction id.
#[must_use]
pub fn tid(value: &str) -> TransactionId { TransactionId::new(value).expect("valid id") }

/// Complete single-chunk text SEND from `from` to `to`.
#[must_use]
pub fn send_chunk(transaction_id: &str, to: &str, from: &str, message_id: &str, body: &'static [u8]) -> Chunk {
    let len = body.len() as u64;
    Chunk::request(tid(transaction_id), Method::Send)
        .with_header(Header::ToPath(to.parse::<Path>().expect("valid path")))
        .with_header(Header::FromPath(from.parse::<Path>().expect("valid path")))
        .with_header(Header::MessageId(MessageId::new(message_id).expect("valid id")))
        .with_header(Header::ByteRange(ByteRange::from_span(0, len, Some(len), false)))
        .with_header(Header::ContentType("text/plain".to_owned()))
        .with_body(Bytes::from_static(body))
}
