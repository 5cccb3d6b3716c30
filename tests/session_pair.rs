//! Two sessions exchanging messages over an in-memory transport.

use bytes::Bytes;
use msrp::session::{
    DeliveryStatus,
    Role,
    Session,
    SessionConfig,
    SessionError,
    SessionEvent,
    SessionParams,
    SessionState,
};
use msrp_testing::uri;
use rstest::rstest;
use tokio::{
    io::duplex,
    time::{Duration, timeout},
};

const ALICE: &str = "msrp://alice.example.com:7654/iau39soe2843z;tcp";
const BOB: &str = "msrp://bob.example.com:8888/9di4eae923wzd;tcp";

fn pair(alice: SessionConfig, bob: SessionConfig) -> (Session, Session) {
    let (a, b) = duplex(64 * 1024);
    let alice = Session::new(SessionParams::new(uri(ALICE), uri(BOB), Role::Active), alice, a)
        .expect("alice starts");
    let bob = Session::new(SessionParams::new(uri(BOB), uri(ALICE), Role::Passive), bob, b)
        .expect("bob starts");
    (alice, bob)
}

async fn next_matching(
    session: &mut Session,
    mut predicate: impl FnMut(&SessionEvent) -> bool,
) -> SessionEvent {
    loop {
        let event = timeout(Duration::from_secs(5), session.next_event())
            .await
            .expect("event in time")
            .expect("session open");
        if predicate(&event) {
            return event;
        }
    }
}

async fn received(session: &mut Session) -> (Option<String>, Bytes) {
    match next_matching(session, |e| matches!(e, SessionEvent::MessageReceived { .. })).await {
        SessionEvent::MessageReceived {
            content_type, body, ..
        } => (content_type, body),
        _ => unreachable!("filtered above"),
    }
}

async fn delivery(session: &mut Session) -> DeliveryStatus {
    match next_matching(session, |e| matches!(e, SessionEvent::DeliveryStatus { .. })).await {
        SessionEvent::DeliveryStatus { status, .. } => status,
        _ => unreachable!("filtered above"),
    }
}

#[tokio::test]
async fn messages_travel_both_ways() {
    let (mut alice, mut bob) = pair(SessionConfig::default(), SessionConfig::default());
    alice
        .handle()
        .wait_for(SessionState::Active)
        .await
        .expect("binding accepted");

    alice
        .handle()
        .send_message("text/plain", "Hi")
        .await
        .expect("queued");
    let (content_type, body) = received(&mut bob).await;
    assert_eq!(content_type.as_deref(), Some("text/plain"));
    assert_eq!(&body[..], b"Hi");
    assert_eq!(delivery(&mut alice).await, DeliveryStatus::Sent);

    bob.handle()
        .send_message("text/plain", "Hello back")
        .await
        .expect("queued");
    let (_, body) = received(&mut alice).await;
    assert_eq!(&body[..], b"Hello back");
    assert_eq!(delivery(&mut bob).await, DeliveryStatus::Sent);
}

#[rstest]
#[case(1024, 10_000)]
#[case(7, 100)]
#[case(4096, 4096)]
#[tokio::test]
async fn large_messages_are_chunked_and_reassembled(#[case] chunk_size: usize, #[case] len: usize) {
    let config = SessionConfig::default().with_max_chunk_size(chunk_size);
    let (mut alice, mut bob) = pair(config, SessionConfig::default());
    let body: Vec<u8> = (0..len).map(|i| b'a' + (i % 26) as u8).collect();

    alice
        .handle()
        .send_message("text/plain", body.clone())
        .await
        .expect("queued");
    let (_, received_body) = received(&mut bob).await;
    assert_eq!(received_body.len(), len);
    assert_eq!(&received_body[..], &body[..]);
    assert_eq!(delivery(&mut alice).await, DeliveryStatus::Sent);
}

#[tokio::test]
async fn concurrent_messages_interleave_without_mixing() {
    let config = SessionConfig::default().with_max_chunk_size(512);
    let (alice, mut bob) = pair(config, SessionConfig::default());
    let first = vec![b'x'; 5000];
    let second = vec![b'y'; 3000];
    let handle = alice.handle();
    handle
        .send_message("text/plain", first.clone())
        .await
        .expect("queued");
    handle
        .send_message("text/plain", second.clone())
        .await
        .expect("queued");

    let mut bodies = vec![received(&mut bob).await.1, received(&mut bob).await.1];
    bodies.sort_by_key(Bytes::len);
    assert_eq!(&bodies[0][..], &second[..]);
    assert_eq!(&bodies[1][..], &first[..]);
}

#[tokio::test]
async fn streamed_message_arrives_whole() {
    let (alice, mut bob) = pair(SessionConfig::default(), SessionConfig::default());
    let stream = alice.handle().open_stream("text/plain").await.expect("stream");
    stream.write("Hel").await.expect("write");
    stream.write("lo").await.expect("write");
    stream.finish().await.expect("finish");

    let (_, body) = received(&mut bob).await;
    assert_eq!(&body[..], b"Hello");
}

#[tokio::test]
async fn closing_one_side_closes_the_other() {
    let (alice, mut bob) = pair(SessionConfig::default(), SessionConfig::default());
    alice
        .handle()
        .wait_for(SessionState::Active)
        .await
        .expect("binding accepted");
    alice.handle().close().await.expect("close requested");
    assert!(alice.join().await.is_ok());

    let event = next_matching(&mut bob, |e| matches!(e, SessionEvent::Closed { .. })).await;
    assert!(matches!(
        event,
        SessionEvent::Closed {
            error: Some(SessionError::ConnectionClosed)
        }
    ));
    assert_eq!(bob.state(), SessionState::Closed);
}
