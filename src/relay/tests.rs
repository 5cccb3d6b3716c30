use std::sync::Mutex;

use async_trait::async_trait;
use bytes::Bytes;
use futures::StreamExt;
use rstest::rstest;
use tokio::{
    io::{AsyncWriteExt, DuplexStream, ReadHalf, WriteHalf, duplex},
    time::{Duration, sleep, timeout},
};
use tokio_util::codec::FramedRead;

use super::*;
use crate::{
    chunk::{ByteRange, Header, MessageId, Method, Status, TransactionId},
    codec::{self, Decoded, MsrpCodec},
    path::Path,
    report,
};

const RELAY: &str = "msrp://relay.example.net:2855/r8d2k;tcp";
const ALICE: &str = "msrp://alice.example.com:7654/iau39soe2843z;tcp";
const BOB: &str = "msrp://bob.example.com:8888/9di4eae923wzd;tcp";

fn uri(value: &str) -> MsrpUri { value.parse().expect("valid uri") }

fn path(value: &str) -> Path { value.parse().expect("valid path") }

fn tid(value: &str) -> TransactionId { TransactionId::new(value).expect("valid id") }

/// Endpoint on the far side of a hop.
struct Peer {
    reader: FramedRead<ReadHalf<DuplexStream>, MsrpCodec>,
    writer: WriteHalf<DuplexStream>,
}

impl Peer {
    fn new(stream: DuplexStream) -> Self {
        let (read, writer) = tokio::io::split(stream);
        Self {
            reader: FramedRead::new(read, MsrpCodec::default()),
            writer,
        }
    }

    async fn next_chunk(&mut self) -> Chunk {
        match timeout(Duration::from_secs(5), self.reader.next())
            .await
            .expect("chunk in time")
            .expect("stream open")
            .expect("decodable")
        {
            Decoded::Chunk(chunk) => chunk,
            Decoded::Malformed(bad) => panic!("malformed chunk: {bad:?}"),
        }
    }

    async fn send(&mut self, chunk: &Chunk) {
        let bytes = codec::to_bytes(chunk).expect("encodable");
        self.writer.write_all(&bytes).await.expect("write");
    }
}

fn attach(relay: &Relay, peer: Option<&str>) -> Peer {
    let (local, remote) = duplex(64 * 1024);
    relay
        .attach(local, peer.map(|p| uri(p).authority()))
        .expect("hop attached");
    Peer::new(remote)
}

fn send(transaction_id: &str, to: &str, from: &str) -> Chunk {
    Chunk::request(tid(transaction_id), Method::Send)
        .with_header(Header::ToPath(path(to)))
        .with_header(Header::FromPath(path(from)))
        .with_header(Header::MessageId(MessageId::new("87652491").expect("valid id")))
        .with_header(Header::ByteRange(ByteRange::from_span(0, 2, Some(2), false)))
        .with_header(Header::ContentType("text/plain".to_owned()))
        .with_body(Bytes::from_static(b"Hi"))
}

fn relay() -> Relay { Relay::builder(uri(RELAY)).build() }

async fn wait_for_hops(relay: &Relay, count: usize) {
    for _ in 0..200 {
        if relay.routes().active_hops().len() == count {
            return;
        }
        sleep(Duration::from_millis(5)).await;
    }
    panic!("expected {count} hops, found {:?}", relay.routes().active_hops());
}

#[tokio::test]
async fn forwards_send_and_relays_the_response() {
    let relay = relay();
    let mut alice = attach(&relay, None);
    let mut bob = attach(&relay, Some(BOB));

    alice
        .send(&send("a1b2c3d4", &format!("{RELAY} {BOB}"), ALICE))
        .await;
    let forwarded = bob.next_chunk().await;
    assert_eq!(forwarded.method(), Some(&Method::Send));
    assert_eq!(forwarded.to_path(), Some(&path(BOB)));
    assert_eq!(forwarded.from_path(), Some(&path(&format!("{RELAY} {ALICE}"))));
    assert_eq!(forwarded.body.as_deref(), Some(&b"Hi"[..]));
    assert_eq!(forwarded.message_id().map(MessageId::as_str), Some("87652491"));
    assert_ne!(forwarded.transaction_id.as_str(), "a1b2c3d4");

    bob.send(&report::response(forwarded.transaction_id.clone(), StatusCode::OK))
        .await;
    let answer = alice.next_chunk().await;
    assert_eq!(answer.transaction_id.as_str(), "a1b2c3d4");
    assert_eq!(answer.response_status(), Some(StatusCode::OK));
    relay.shutdown().await;
}

#[rstest]
#[case::no_route(format!("{RELAY} {BOB}"), 481)]
#[case::not_for_this_relay(format!("msrp://other.example.net:2855/x;tcp {BOB}"), 481)]
#[case::no_local_consumer(RELAY.to_owned(), 481)]
#[tokio::test]
async fn unroutable_sends_are_answered(#[case] to: String, #[case] status: u16) {
    let relay = relay();
    let mut alice = attach(&relay, None);
    alice.send(&send("e5f6a7b8", &to, ALICE)).await;
    let answer = alice.next_chunk().await;
    assert_eq!(answer.transaction_id.as_str(), "e5f6a7b8");
    assert_eq!(answer.response_status().map(StatusCode::get), Some(status));
    relay.shutdown().await;
}

#[tokio::test]
async fn delivers_locally_when_to_path_ends_at_the_relay() {
    let (tx, mut rx) = mpsc::unbounded_channel();
    let relay = Relay::builder(uri(RELAY)).deliver_locally(tx).build();
    let mut alice = attach(&relay, None);
    alice.send(&send("loc12345", RELAY, ALICE)).await;

    let answer = alice.next_chunk().await;
    assert_eq!(answer.response_status(), Some(StatusCode::OK));
    let delivered = rx.recv().await.expect("local chunk");
    assert_eq!(delivered.body.as_deref(), Some(&b"Hi"[..]));
    assert_eq!(delivered.from_path(), Some(&path(ALICE)));
    relay.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn silent_next_hop_times_out_with_408() {
    let relay = Relay::builder(uri(RELAY))
        .config(RelayConfig::default().with_transaction_timeout(Duration::from_secs(1)))
        .build();
    let mut alice = attach(&relay, None);
    let mut bob = attach(&relay, Some(BOB));

    alice
        .send(&send("slow0001", &format!("{RELAY} {BOB}"), ALICE))
        .await;
    let _ignored = bob.next_chunk().await;
    let answer = alice.next_chunk().await;
    assert_eq!(answer.transaction_id.as_str(), "slow0001");
    assert_eq!(answer.response_status(), Some(StatusCode::REQUEST_TIMEOUT));
    relay.shutdown().await;
}

#[tokio::test]
async fn losing_the_next_hop_answers_481() {
    let relay = relay();
    let mut alice = attach(&relay, None);
    let mut bob = attach(&relay, Some(BOB));

    alice
        .send(&send("lost0001", &format!("{RELAY} {BOB}"), ALICE))
        .await;
    let _forwarded = bob.next_chunk().await;
    drop(bob);

    let answer = alice.next_chunk().await;
    assert_eq!(answer.transaction_id.as_str(), "lost0001");
    assert_eq!(
        answer.response_status(),
        Some(StatusCode::SESSION_DOES_NOT_EXIST)
    );
    wait_for_hops(&relay, 1).await;
    assert_eq!(relay.routes().hop_for(&uri(BOB).authority()), None);
    relay.shutdown().await;
}

#[tokio::test]
async fn closing_the_upstream_hop_leaves_the_downstream_usable() {
    let relay = relay();
    let mut alice = attach(&relay, None);
    let mut bob = attach(&relay, Some(BOB));

    alice
        .send(&send("gone0001", &format!("{RELAY} {BOB}"), ALICE))
        .await;
    let forwarded = bob.next_chunk().await;
    drop(alice);
    wait_for_hops(&relay, 1).await;

    bob.send(&report::response(forwarded.transaction_id, StatusCode::OK))
        .await;
    let mut carol = attach(&relay, None);
    carol
        .send(&send("next0001", &format!("{RELAY} {BOB}"), ALICE))
        .await;
    let forwarded = bob.next_chunk().await;
    assert_eq!(forwarded.body.as_deref(), Some(&b"Hi"[..]));
    relay.shutdown().await;
}

#[tokio::test]
async fn reports_follow_learned_routes_back() {
    let relay = relay();
    let mut alice = attach(&relay, None);
    let mut bob = attach(&relay, Some(BOB));

    alice
        .send(&send("rep00001", &format!("{RELAY} {BOB}"), ALICE))
        .await;
    let forwarded = bob.next_chunk().await;
    assert!(relay.routes().hop_for(&uri(ALICE).authority()).is_some());

    let reply_path = forwarded.from_path().expect("from path").clone();
    let report = report::report(
        tid("bobrep01"),
        reply_path,
        Path::single(uri(BOB)),
        MessageId::new("87652491").expect("valid id"),
        ByteRange::from_span(0, 2, Some(2), false),
        Status::with_reason(StatusCode::OK),
    );
    bob.send(&report).await;

    let delivered = alice.next_chunk().await;
    assert_eq!(delivered.method(), Some(&Method::Report));
    assert_eq!(delivered.to_path(), Some(&path(ALICE)));
    assert_eq!(delivered.from_path(), Some(&path(&format!("{RELAY} {BOB}"))));
    assert_eq!(delivered.status().map(|s| s.code), Some(StatusCode::OK));
    relay.shutdown().await;
}

#[tokio::test]
async fn auth_grants_use_of_the_relay() {
    let relay = relay();
    let mut alice = attach(&relay, None);
    let auth = Chunk::request(tid("auth0001"), Method::Auth)
        .with_header(Header::ToPath(path(RELAY)))
        .with_header(Header::FromPath(path(ALICE)));
    alice.send(&auth).await;

    let answer = alice.next_chunk().await;
    assert_eq!(answer.transaction_id.as_str(), "auth0001");
    assert_eq!(answer.response_status(), Some(StatusCode::OK));
    assert_eq!(answer.to_path(), Some(&path(ALICE)));
    assert!(matches!(
        answer.header("Use-Path"),
        Some(Header::UsePath(p)) if *p == path(RELAY)
    ));
    assert!(matches!(answer.header("Expires"), Some(Header::Expires(600))));
    relay.shutdown().await;
}

#[tokio::test]
async fn unknown_methods_get_501() {
    let relay = relay();
    let mut alice = attach(&relay, None);
    let request = Chunk::request(tid("nope0001"), Method::Extension("PING".to_owned()))
        .with_header(Header::ToPath(path(RELAY)))
        .with_header(Header::FromPath(path(ALICE)));
    alice.send(&request).await;
    let answer = alice.next_chunk().await;
    assert_eq!(answer.response_status(), Some(StatusCode::NOT_IMPLEMENTED));
    relay.shutdown().await;
}

/// Hands out one prepared transport.
struct OneShotConnector {
    transport: Mutex<Option<DuplexStream>>,
    requested: Mutex<Vec<MsrpUri>>,
}

#[async_trait]
impl Connector for Arc<OneShotConnector> {
    async fn connect(&self, uri: &MsrpUri) -> io::Result<Box<dyn Transport>> {
        self.requested.lock().expect("lock").push(uri.clone());
        let prepared = self.transport.lock().expect("lock").take();
        match prepared {
            Some(stream) => Ok(Box::new(stream)),
            None => Err(io::Error::from(io::ErrorKind::ConnectionRefused)),
        }
    }
}

#[tokio::test]
async fn connects_to_unknown_next_hops_on_demand() {
    let (local, remote) = duplex(64 * 1024);
    let connector = Arc::new(OneShotConnector {
        transport: Mutex::new(Some(local)),
        requested: Mutex::new(Vec::new()),
    });
    let relay = Relay::builder(uri(RELAY))
        .connector(Arc::clone(&connector))
        .build();
    let mut alice = attach(&relay, None);
    let mut bob = Peer::new(remote);

    alice
        .send(&send("dial0001", &format!("{RELAY} {BOB}"), ALICE))
        .await;
    alice
        .send(&send("dial0002", &format!("{RELAY} {BOB}"), ALICE))
        .await;
    let first = bob.next_chunk().await;
    let second = bob.next_chunk().await;
    assert_eq!(connector.requested.lock().expect("lock").as_slice(), &[uri(BOB)]);
    assert!(relay.routes().hop_for(&uri(BOB).authority()).is_some());

    bob.send(&report::response(second.transaction_id, StatusCode::OK))
        .await;
    bob.send(&report::response(first.transaction_id, StatusCode::OK))
        .await;
    let mut answered = vec![
        alice.next_chunk().await.transaction_id.to_string(),
        alice.next_chunk().await.transaction_id.to_string(),
    ];
    answered.sort();
    assert_eq!(answered, ["dial0001", "dial0002"]);
    relay.shutdown().await;
}

#[tokio::test]
async fn failed_connects_answer_481() {
    let connector = Arc::new(OneShotConnector {
        transport: Mutex::new(None),
        requested: Mutex::new(Vec::new()),
    });
    let relay = Relay::builder(uri(RELAY)).connector(connector).build();
    let mut alice = attach(&relay, None);
    alice
        .send(&send("fail0001", &format!("{RELAY} {BOB}"), ALICE))
        .await;
    let answer = alice.next_chunk().await;
    assert_eq!(
        answer.response_status(),
        Some(StatusCode::SESSION_DOES_NOT_EXIST)
    );
    relay.shutdown().await;
}
