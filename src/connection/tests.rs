use std::num::NonZeroUsize;

use bytes::{Bytes, BytesMut};
use rstest::rstest;
use tokio::{
    io::{AsyncReadExt, DuplexStream, duplex},
    sync::mpsc,
    task::JoinHandle,
};
use tokio_util::{codec::Decoder, sync::CancellationToken};

use super::*;
use crate::{
    chunk::{ByteRange, Header, MessageId, Method, TransactionId},
    codec::{Decoded, MsrpCodec},
    push::{PushHandle, PushPriority},
    report::response,
    status::StatusCode,
};

struct Harness {
    handle: PushHandle<Outbound>,
    events: mpsc::UnboundedReceiver<WriteEvent>,
    shutdown: CancellationToken,
    task: JoinHandle<io::Result<()>>,
    peer: DuplexStream,
}

fn spawn_writer(pipe_capacity: usize, write_slice: usize) -> Harness {
    let (local, peer) = duplex(pipe_capacity);
    let (queues, handle) = PushQueues::bounded(8, 8).expect("valid capacities");
    let (events_tx, events) = mpsc::unbounded_channel();
    let shutdown = CancellationToken::new();
    let writer = ChunkWriter::new(
        local,
        queues,
        events_tx,
        shutdown.clone(),
        NonZeroUsize::new(write_slice).expect("non-zero"),
        TrafficLog::new("local", "peer"),
    );
    Harness {
        handle,
        events,
        shutdown,
        task: tokio::spawn(writer.run()),
        peer,
    }
}

fn tid(value: &str) -> TransactionId { TransactionId::new(value).expect("valid id") }

fn data_chunk(transaction_id: &str, body: &'static [u8], open_ended: bool) -> Chunk {
    let len = body.len() as u64;
    Chunk::request(tid(transaction_id), Method::Send)
        .with_header(Header::MessageId(MessageId::new("msg1").expect("valid id")))
        .with_header(Header::ByteRange(ByteRange::from_span(0, len, Some(len), open_ended)))
        .with_header(Header::ContentType("text/plain".to_owned()))
        .with_body(Bytes::from_static(body))
}

fn decode_all(bytes: &[u8]) -> Vec<Chunk> {
    let mut codec = MsrpCodec::default();
    let mut buf = BytesMut::from(bytes);
    let mut chunks = Vec::new();
    while let Some(item) = codec.decode(&mut buf).expect("valid stream") {
        match item {
            Decoded::Chunk(chunk) => chunks.push(chunk),
            Decoded::Malformed(bad) => panic!("malformed chunk: {bad:?}"),
        }
    }
    chunks
}

async fn finish(harness: Harness) -> (Vec<u8>, Vec<WriteEvent>) {
    let Harness {
        handle,
        mut events,
        task,
        mut peer,
        ..
    } = harness;
    drop(handle);
    let mut out = Vec::new();
    peer.read_to_end(&mut out).await.expect("read");
    task.await.expect("writer task").expect("writer result");
    let mut seen = Vec::new();
    while let Ok(event) = events.try_recv() {
        seen.push(event);
    }
    (out, seen)
}

#[tokio::test]
async fn writes_response_bytes_exactly() {
    let harness = spawn_writer(4096, 16);
    harness
        .handle
        .push_high_priority(Outbound::Chunk(response(tid("d93kswow"), StatusCode::OK)))
        .await
        .expect("push");
    let (out, events) = finish(harness).await;
    assert_eq!(out, b"MSRP d93kswow 200 OK\r\n-------d93kswow$\r\n");
    assert!(events.is_empty());
}

#[rstest]
#[case(false)]
#[case(true)]
#[tokio::test]
async fn data_chunk_is_written_whole_without_competition(#[case] interruptible: bool) {
    let harness = spawn_writer(4096, 4);
    let chunk = data_chunk("tx000001", b"0123456789", interruptible);
    harness
        .handle
        .push_low_priority(Outbound::Data {
            chunk: chunk.clone(),
            interruptible,
        })
        .await
        .expect("push");
    let (out, events) = finish(harness).await;
    assert_eq!(decode_all(&out), vec![chunk]);
    assert!(matches!(
        events.as_slice(),
        [WriteEvent::Written { transaction_id }] if transaction_id.as_str() == "tx000001"
    ));
}

#[tokio::test]
async fn waiting_response_interrupts_data_chunk() {
    let harness = spawn_writer(16, 8);
    let body: &'static [u8] = &[b'x'; 64];
    harness
        .handle
        .push_low_priority(Outbound::Data {
            chunk: data_chunk("tx000002", body, true),
            interruptible: true,
        })
        .await
        .expect("push data");
    // Let the writer pick up the data chunk and block on the small pipe.
    for _ in 0..4 {
        tokio::task::yield_now().await;
    }
    harness
        .handle
        .try_push(
            Outbound::Chunk(response(tid("rsp00001"), StatusCode::OK)),
            PushPriority::High,
        )
        .expect("push response");

    let (out, events) = finish(harness).await;

    let chunks = decode_all(&out);
    assert_eq!(chunks.len(), 2);
    assert_eq!(chunks[0].flag, Flag::Continue);
    assert_eq!(chunks[0].body_len(), 8);
    assert_eq!(chunks[0].byte_range().map(|r| r.to_string()).as_deref(), Some("1-*/64"));
    assert_eq!(chunks[1].transaction_id.as_str(), "rsp00001");
    assert!(matches!(
        events.as_slice(),
        [WriteEvent::Interrupted { sent: 8, .. }]
    ));
}

#[tokio::test]
async fn body_with_own_end_line_is_rejected() {
    let harness = spawn_writer(4096, 16);
    harness
        .handle
        .push_low_priority(Outbound::Data {
            chunk: data_chunk("tx000003", b"a\r\n-------tx000003$\r\n", false),
            interruptible: false,
        })
        .await
        .expect("push");
    let (out, events) = finish(harness).await;
    assert!(out.is_empty());
    assert!(matches!(events.as_slice(), [WriteEvent::Rejected { .. }]));
}

#[tokio::test]
async fn cancellation_stops_the_writer() {
    let harness = spawn_writer(4096, 16);
    harness.shutdown.cancel();
    let result = harness.task.await.expect("writer task");
    assert!(result.is_ok());
    assert!(harness.handle.is_closed());
}

#[tokio::test]
async fn transport_failure_is_reported() {
    let mut harness = spawn_writer(16, 16);
    drop(std::mem::replace(&mut harness.peer, duplex(1).0));
    harness
        .handle
        .push_high_priority(Outbound::Chunk(response(tid("d93kswow"), StatusCode::OK)))
        .await
        .expect("push");
    let result = harness.task.await.expect("writer task");
    assert!(result.is_err());
    assert!(matches!(harness.events.recv().await, Some(WriteEvent::Failed(_))));
}
