//! Byte-level behaviour of a passive session.

use msrp::{
    StatusCode,
    codec::Decoded,
    session::{Role, Session, SessionConfig, SessionEvent, SessionParams},
};
use msrp_testing::{RawPeer, send_chunk, uri};
use tokio::time::{Duration, timeout};

const ALICE: &str = "msrp://alice.example.com:7654/iau39soe2843z;tcp";
const BOB: &str = "msrp://bob.example.com:8888/9di4eae923wzd;tcp";

fn passive() -> (Session, RawPeer) {
    let (local, peer) = RawPeer::pair();
    let session = Session::new(
        SessionParams::new(uri(BOB), uri(ALICE), Role::Passive),
        SessionConfig::default(),
        local,
    )
    .expect("session starts");
    (session, peer)
}

async fn received(session: &mut Session) -> Vec<u8> {
    loop {
        let event = timeout(Duration::from_secs(5), session.next_event())
            .await
            .expect("event in time")
            .expect("session open");
        if let SessionEvent::MessageReceived { body, .. } = event {
            return body.to_vec();
        }
    }
}

#[tokio::test]
async fn rfc_example_send_is_acknowledged_and_delivered() {
    let (mut session, mut peer) = passive();
    peer.send_raw(
        b"MSRP d93kswow SEND\r\n\
          To-Path: msrp://bob.example.com:8888/9di4eae923wzd;tcp\r\n\
          From-Path: msrp://alice.example.com:7654/iau39soe2843z;tcp\r\n\
          Message-ID: 12339sdqwer\r\n\
          Byte-Range: 1-2/2\r\n\
          Content-Type: text/plain\r\n\
          \r\n\
          Hi\r\n\
          -------d93kswow$\r\n",
    )
    .await;

    let answer = peer.next_chunk().await;
    assert_eq!(answer.transaction_id.as_str(), "d93kswow");
    assert_eq!(answer.response_status(), Some(StatusCode::OK));
    assert!(answer.headers.is_empty());
    assert_eq!(received(&mut session).await, b"Hi");
}

#[tokio::test]
async fn malformed_request_gets_400_and_the_session_continues() {
    let (mut session, mut peer) = passive();
    peer.send_raw(
        b"MSRP bad00001 SEND\r\n\
          To-Path: msrp://bob.example.com:8888/9di4eae923wzd;tcp\r\n\
          From-Path: msrp://alice.example.com:7654/iau39soe2843z;tcp\r\n\
          Message-ID: 1\r\n\
          Byte-Range: nonsense\r\n\
          -------bad00001$\r\n",
    )
    .await;
    match peer.try_next().await {
        Some(Decoded::Chunk(answer)) => {
            assert_eq!(answer.transaction_id.as_str(), "bad00001");
            assert_eq!(answer.response_status(), Some(StatusCode::BAD_REQUEST));
        }
        other => panic!("expected a response, got {other:?}"),
    }

    peer.send(&send_chunk("good0001", BOB, ALICE, "m2", b"still here"))
        .await;
    let answer = peer.next_chunk().await;
    assert_eq!(answer.response_status(), Some(StatusCode::OK));
    assert_eq!(received(&mut session).await, b"still here");
}

#[tokio::test]
async fn body_containing_a_foreign_end_line_is_delivered_verbatim() {
    let (mut session, mut peer) = passive();
    let body: &'static [u8] = b"look: -------other00$ inside";
    peer.send(&send_chunk("tx7f3k2p", BOB, ALICE, "m3", body)).await;
    let answer = peer.next_chunk().await;
    assert_eq!(answer.response_status(), Some(StatusCode::OK));
    assert_eq!(received(&mut session).await, body);
}

#[tokio::test]
async fn closing_the_session_ends_the_transport() {
    let (session, mut peer) = passive();
    session.handle().close().await.expect("close requested");
    assert!(session.join().await.is_ok());
    assert!(peer.try_next().await.is_none());
}
