//! Unit tests for the MSRP codec.
//!
//! Covers the canonical SEND example, incremental decoding, body boundary
//! handling, malformed content, fatal framing violations, and EOF handling.

use bytes::{Bytes, BytesMut};
use proptest::prelude::*;
use rstest::{fixture, rstest};
use tokio_util::codec::{Decoder, Encoder};

use super::*;
use crate::{
    chunk::{ByteRange, Header, Method, MessageId},
    status::StatusCode,
};

const EXAMPLE: &[u8] = b"MSRP d93kswow SEND\r\n\
To-Path: msrp://alice.example.com:7654/session1;tcp\r\n\
From-Path: msrp://bob.example.com:8765/session2;tcp\r\n\
Message-ID: 12345\r\n\
Byte-Range: 1-2/2\r\n\
Content-Type: text/plain\r\n\
\r\n\
Hi\r\n\
-------d93kswow$\r\n";

#[fixture]
fn codec() -> MsrpCodec { MsrpCodec::default() }

fn tid(value: &str) -> TransactionId { TransactionId::new(value).expect("valid transaction id") }

fn decode_all(codec: &mut MsrpCodec, bytes: &[u8]) -> Vec<Decoded> {
    let mut buf = BytesMut::from(bytes);
    let mut frames = Vec::new();
    while let Some(frame) = codec.decode(&mut buf).expect("decode should succeed") {
        frames.push(frame);
    }
    frames
}

fn expect_chunk(frame: Decoded) -> Chunk {
    match frame {
        Decoded::Chunk(chunk) => chunk,
        Decoded::Malformed(malformed) => panic!("unexpected malformed frame: {malformed:?}"),
    }
}

#[rstest]
fn decodes_example_send(mut codec: MsrpCodec) {
    let mut frames = decode_all(&mut codec, EXAMPLE);
    assert_eq!(frames.len(), 1);
    let chunk = expect_chunk(frames.remove(0));
    assert_eq!(chunk.transaction_id.as_str(), "d93kswow");
    assert_eq!(chunk.method(), Some(&Method::Send));
    assert_eq!(chunk.message_id().map(MessageId::as_str), Some("12345"));
    assert_eq!(chunk.byte_range().map(|r| r.span(2)), Some(0..2));
    assert_eq!(chunk.content_type(), Some("text/plain"));
    assert_eq!(chunk.body.as_deref(), Some(&b"Hi"[..]));
    assert_eq!(chunk.flag, Flag::End);
    assert_eq!(
        chunk.to_path().map(|p| p.head().to_string()).as_deref(),
        Some("msrp://alice.example.com:7654/session1;tcp")
    );
}

#[rstest]
fn example_re_encodes_byte_for_byte(mut codec: MsrpCodec) {
    let chunk = expect_chunk(decode_all(&mut codec, EXAMPLE).remove(0));
    let encoded = to_bytes(&chunk).expect("encode should succeed");
    assert_eq!(&encoded[..], EXAMPLE);
}

#[rstest]
fn decodes_byte_by_byte(mut codec: MsrpCodec) {
    let mut buf = BytesMut::new();
    let mut frames = Vec::new();
    for byte in EXAMPLE {
        buf.extend_from_slice(&[*byte]);
        if let Some(frame) = codec.decode(&mut buf).expect("decode should succeed") {
            frames.push(frame);
        }
    }
    assert_eq!(frames.len(), 1);
    assert!(buf.is_empty());
    assert_eq!(expect_chunk(frames.remove(0)).body.as_deref(), Some(&b"Hi"[..]));
}

#[rstest]
fn decodes_bodyless_response(mut codec: MsrpCodec) {
    let frames = decode_all(&mut codec, b"MSRP d93kswow 200 OK\r\n-------d93kswow$\r\n");
    let chunk = expect_chunk(frames.into_iter().next().expect("one frame"));
    assert_eq!(chunk.response_status(), Some(StatusCode::OK));
    assert_eq!(
        chunk.kind,
        ChunkKind::Response {
            status: StatusCode::OK,
            comment: Some("OK".to_owned()),
        }
    );
    assert_eq!(chunk.body, None);
}

#[rstest]
fn decodes_back_to_back_frames(mut codec: MsrpCodec) {
    let mut input = EXAMPLE.to_vec();
    input.extend_from_slice(b"MSRP abcd1234 200 OK\r\n-------abcd1234$\r\n");
    let frames = decode_all(&mut codec, &input);
    assert_eq!(frames.len(), 2);
}

#[rstest]
fn foreign_end_line_stays_in_body(mut codec: MsrpCodec) {
    let input = b"MSRP aaaa1111 SEND\r\nMessage-ID: m1\r\n\r\n\
x\r\n-------bbbb2222$\r\ny\r\n-------aaaa1111+\r\n";
    let chunk = expect_chunk(decode_all(&mut codec, input).remove(0));
    assert_eq!(chunk.body.as_deref(), Some(&b"x\r\n-------bbbb2222$\r\ny"[..]));
    assert_eq!(chunk.flag, Flag::Continue);
}

#[rstest]
fn own_tid_without_flag_stays_in_body(mut codec: MsrpCodec) {
    let input = b"MSRP aaaa1111 SEND\r\n\r\n\
a\r\n-------aaaa1111x\r\n-------aaaa1111#\r\n";
    let chunk = expect_chunk(decode_all(&mut codec, input).remove(0));
    assert_eq!(chunk.body.as_deref(), Some(&b"a\r\n-------aaaa1111x"[..]));
    assert_eq!(chunk.flag, Flag::Abort);
}

#[rstest]
fn empty_body_is_distinct_from_no_body(mut codec: MsrpCodec) {
    let input = b"MSRP aaaa1111 SEND\r\n\r\n\r\n-------aaaa1111$\r\n";
    let chunk = expect_chunk(decode_all(&mut codec, input).remove(0));
    assert_eq!(chunk.body, Some(Bytes::new()));
}

#[rstest]
fn skips_blank_lines_between_frames(mut codec: MsrpCodec) {
    let frames = decode_all(&mut codec, b"\r\n\r\nMSRP abcd1234 200\r\n-------abcd1234$\r\n");
    assert_eq!(frames.len(), 1);
}

#[rstest]
#[case::bad_byte_range("Byte-Range: nonsense")]
#[case::no_separator("To-Path msrp://a.example.com/s;tcp")]
#[case::bad_status("Status: 200")]
#[case::end_past_u64("Byte-Range: 1-18446744073709551616/*")]
#[case::end_before_start("Byte-Range: 5-2/*")]
#[case::start_past_total("Byte-Range: 12-*/10")]
#[case::start_zero("Byte-Range: 0-1/1")]
fn malformed_headers_surface_as_malformed(mut codec: MsrpCodec, #[case] line: &str) {
    let input = format!("MSRP abcd1234 SEND\r\n{line}\r\n-------abcd1234$\r\n");
    let frames = decode_all(&mut codec, input.as_bytes());
    let [Decoded::Malformed(malformed)] = frames.as_slice() else {
        panic!("expected a malformed frame, got {frames:?}");
    };
    assert_eq!(malformed.transaction_id.as_str(), "abcd1234");
    assert_eq!(malformed.kind, ChunkKind::Request(Method::Send));
}

#[rstest]
fn extreme_byte_range_decodes_without_panicking(mut codec: MsrpCodec) {
    let input = b"MSRP abcd1234 SEND\r\nByte-Range: 1-18446744073709551615/*\r\n\r\nab\r\n-------abcd1234$\r\n";
    let mut frames = decode_all(&mut codec, input);
    let chunk = expect_chunk(frames.remove(0));
    let range = chunk.byte_range().expect("byte range present");
    assert_eq!(range.end(), Some(u64::MAX));
    assert_eq!(range.span(2), 0..2);
}

#[rstest]
fn decoding_continues_after_malformed_frame(mut codec: MsrpCodec) {
    let mut input = b"MSRP abcd1234 SEND\r\nByte-Range: x\r\n-------abcd1234$\r\n".to_vec();
    input.extend_from_slice(EXAMPLE);
    let frames = decode_all(&mut codec, &input);
    assert!(matches!(frames[0], Decoded::Malformed(_)));
    assert!(matches!(frames[1], Decoded::Chunk(_)));
}

#[rstest]
#[case::not_msrp(&b"HTTP/1.1 200 OK\r\n"[..])]
#[case::short_tid(&b"MSRP abc SEND\r\n"[..])]
#[case::lowercase_method(&b"MSRP abcd1234 send\r\n"[..])]
#[case::method_with_comment(&b"MSRP abcd1234 SEND now\r\n"[..])]
fn invalid_start_lines_are_fatal(mut codec: MsrpCodec, #[case] input: &[u8]) {
    let mut buf = BytesMut::from(input);
    let err = codec.decode(&mut buf).expect_err("start line must be rejected");
    assert!(matches!(
        err,
        CodecError::Framing(FramingError::InvalidStartLine { .. })
    ));
    assert!(err.should_disconnect());
}

#[test]
fn overlong_lines_are_fatal() {
    let mut codec = MsrpCodec::new(CodecConfig {
        max_line_length: 32,
        ..CodecConfig::default()
    });
    let mut buf = BytesMut::from(&[b'M'; 64][..]);
    let err = codec.decode(&mut buf).expect_err("line must be rejected");
    assert!(matches!(
        err,
        CodecError::Framing(FramingError::LineTooLong { max: 32, .. })
    ));
}

#[test]
fn too_many_headers_are_fatal() {
    let mut codec = MsrpCodec::new(CodecConfig {
        max_header_lines: 2,
        ..CodecConfig::default()
    });
    let mut buf = BytesMut::from(&b"MSRP abcd1234 SEND\r\nA: 1\r\nB: 2\r\nC: 3\r\n"[..]);
    let err = codec.decode(&mut buf).expect_err("headers must be rejected");
    assert!(matches!(
        err,
        CodecError::Framing(FramingError::TooManyHeaders { max: 2 })
    ));
}

#[test]
fn unterminated_body_is_fatal() {
    let mut codec = MsrpCodec::new(CodecConfig::default().with_max_body_size(1024));
    let mut buf = BytesMut::from(&b"MSRP abcd1234 SEND\r\n\r\n"[..]);
    buf.extend_from_slice(&[b'x'; 2048]);
    let err = codec.decode(&mut buf).expect_err("body must be rejected");
    assert!(matches!(
        err,
        CodecError::Framing(FramingError::UnterminatedBody { max: 1024 })
    ));
}

#[test]
fn body_limit_is_clamped() {
    assert_eq!(CodecConfig::default().with_max_body_size(1).max_body_size, MIN_BODY_LIMIT);
    assert_eq!(
        CodecConfig::default().with_max_body_size(usize::MAX).max_body_size,
        MAX_BODY_LIMIT
    );
}

#[rstest]
fn eof_between_frames_is_clean(mut codec: MsrpCodec) {
    let mut buf = BytesMut::new();
    assert!(codec.decode_eof(&mut buf).expect("clean eof").is_none());
}

#[rstest]
fn eof_mid_frame_reports_buffered_bytes(mut codec: MsrpCodec) {
    let mut buf = BytesMut::from(&EXAMPLE[..EXAMPLE.len() - 5]);
    let err = codec.decode_eof(&mut buf).expect_err("eof must be premature");
    assert!(matches!(err, CodecError::Eof(EofError::MidFrame { .. })));
}

#[rstest]
fn eof_mid_start_line(mut codec: MsrpCodec) {
    let mut buf = BytesMut::from(&b"MSRP abcd"[..]);
    let err = codec.decode_eof(&mut buf).expect_err("eof must be premature");
    assert_eq!(
        err.to_string(),
        "EOF: premature EOF during start line: 9 bytes buffered"
    );
}

#[rstest]
fn encoder_rejects_body_containing_own_end_line(mut codec: MsrpCodec) {
    let chunk = Chunk::request(tid("abcd1234"), Method::Send)
        .with_body(Bytes::from_static(b"oops\r\n-------abcd1234$"));
    let mut buf = BytesMut::new();
    let err = codec.encode(chunk, &mut buf).expect_err("body must be rejected");
    assert!(matches!(
        err,
        CodecError::Framing(FramingError::BoundaryInBody { .. })
    ));
    assert!(buf.is_empty());
}

#[test]
fn end_line_detection_needs_a_flag() {
    let id = tid("abcd1234");
    assert!(contains_end_line(b"\r\n-------abcd1234+", &id));
    assert!(!contains_end_line(b"\r\n-------abcd1234", &id));
    assert!(!contains_end_line(b"-------abcd1234$", &id));
    assert!(!contains_end_line(b"\r\n-------other123$", &id));
}

#[test]
fn head_and_end_line_frame_a_streamed_body() {
    let chunk = Chunk::request(tid("abcd1234"), Method::Send)
        .with_header(Header::ByteRange(ByteRange::from_span(0, 3, Some(3), true)))
        .with_body(Bytes::new());
    let mut buf = BytesMut::new();
    encode_head(&chunk, &mut buf);
    buf.extend_from_slice(b"abc");
    encode_end_line(&chunk.transaction_id, Flag::End, true, &mut buf);
    assert_eq!(
        &buf[..],
        b"MSRP abcd1234 SEND\r\nByte-Range: 1-*/3\r\n\r\nabc\r\n-------abcd1234$\r\n"
    );
}

fn arb_flag() -> impl Strategy<Value = Flag> {
    prop_oneof![Just(Flag::Continue), Just(Flag::End), Just(Flag::Abort)]
}

proptest! {
    #[test]
    fn encoded_chunks_decode_in_any_split(
        body in proptest::collection::vec(any::<u8>(), 0..256),
        flag in arb_flag(),
        split in 0usize..512,
    ) {
        let chunk = Chunk::request(tid("prop1234"), Method::Send)
            .with_header(Header::MessageId(MessageId::new("m1").expect("valid id")))
            .with_body(Bytes::from(body))
            .with_flag(flag);
        prop_assume!(!contains_end_line(chunk.body.as_deref().unwrap_or_default(), &chunk.transaction_id));
        let encoded = to_bytes(&chunk).expect("encode should succeed");
        let split = split.min(encoded.len());

        let mut codec = MsrpCodec::default();
        let mut buf = BytesMut::from(&encoded[..split]);
        let mut decoded = codec.decode(&mut buf).expect("decode should succeed");
        if decoded.is_none() {
            buf.extend_from_slice(&encoded[split..]);
            decoded = codec.decode(&mut buf).expect("decode should succeed");
        }
        prop_assert_eq!(decoded, Some(Decoded::Chunk(chunk)));
        prop_assert!(buf.is_empty());
    }
}
