//! Raw wire transcripts under the `msrp::traffic` log target.

use msrp::{
    session::{Role, Session, SessionConfig, SessionEvent, SessionParams},
    traffic,
};
use msrp_testing::{LoggerHandle, RawPeer, logger, send_chunk, uri};
use rstest::rstest;

const ALICE: &str = "msrp://alice.example.com:7654/iau39soe2843z;tcp";
const BOB: &str = "msrp://bob.example.com:8888/9di4eae923wzd;tcp";

#[rstest]
#[tokio::test]
async fn both_directions_are_transcribed(mut logger: LoggerHandle) {
    let (local, mut peer) = RawPeer::pair();
    let mut session = Session::new(
        SessionParams::new(uri(BOB), uri(ALICE), Role::Passive),
        SessionConfig::default(),
        local,
    )
    .expect("session starts");

    peer.send(&send_chunk("a786hjs2", BOB, ALICE, "m1", b"Hi")).await;
    let _ = peer.next_chunk().await;
    while let Some(event) = session.next_event().await {
        if matches!(event, SessionEvent::MessageReceived { .. }) {
            break;
        }
    }
    session.handle().abort();
    let _ = session.join().await;

    let transcript = logger.messages_for(traffic::TARGET);
    assert!(
        transcript
            .iter()
            .any(|m| m.contains("<--") && m.contains("MSRP a786hjs2 SEND")),
        "inbound SEND missing: {transcript:?}"
    );
    assert!(
        transcript
            .iter()
            .any(|m| m.contains("-->") && m.contains("MSRP a786hjs2 200 OK")),
        "outbound response missing: {transcript:?}"
    );
}
