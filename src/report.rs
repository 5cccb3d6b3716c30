//! Responses and delivery REPORTs.
//!
//! Every SEND is answered with exactly one bare response on its own
//! transaction. REPORT requests travel back along the SEND's From-Path and
//! summarise the outcome of a whole message.

use crate::{
    chunk::{
        ByteRange,
        Chunk,
        FailureReport,
        Header,
        MessageId,
        Method,
        Status,
        SuccessReport,
        TransactionId,
    },
    path::Path,
    status::StatusCode,
};

/// Bare response to `request` with the code's reason phrase as comment.
#[must_use]
pub fn response_for(request: &Chunk, status: StatusCode) -> Chunk {
    response(request.transaction_id.clone(), status)
}

/// Bare response on `transaction_id`.
///
/// ```
/// use msrp::{chunk::TransactionId, codec, report::response, status::StatusCode};
///
/// let ok = response(TransactionId::new("d93kswow").expect("valid id"), StatusCode::OK);
/// let bytes = codec::to_bytes(&ok).expect("encodable");
/// assert_eq!(&bytes[..], b"MSRP d93kswow 200 OK\r\n-------d93kswow$\r\n");
/// ```
#[must_use]
pub fn response(transaction_id: TransactionId, status: StatusCode) -> Chunk {
    Chunk::response(transaction_id, status, status.reason().map(str::to_owned))
}

/// Whether a completed message should be confirmed with a success REPORT.
#[must_use]
pub fn wants_success_report(policy: SuccessReport) -> bool { policy == SuccessReport::Yes }

/// Whether a failed message should be reported. `partial` counts as `yes`.
#[must_use]
pub fn wants_failure_report(policy: FailureReport) -> bool { policy.wants_report() }

/// Originator details captured from the first chunk of an inbound message.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ReportTarget {
    /// From-Path of the SEND; becomes the REPORT's To-Path.
    pub reply_path: Path,
    pub success_report: SuccessReport,
    pub failure_report: FailureReport,
}

impl ReportTarget {
    /// Capture report routing from an inbound SEND.
    #[must_use]
    pub fn from_send(chunk: &Chunk) -> Option<Self> {
        Some(Self {
            reply_path: chunk.from_path()?.clone(),
            success_report: chunk.success_report(),
            failure_report: chunk.failure_report(),
        })
    }
}

/// Build a REPORT for `message_id`.
///
/// `local` becomes the From-Path. `range` is the portion of the message the
/// status applies to.
#[must_use]
pub fn report(
    transaction_id: TransactionId,
    to_path: Path,
    local: Path,
    message_id: MessageId,
    range: ByteRange,
    status: Status,
) -> Chunk {
    Chunk::request(transaction_id, Method::Report)
        .with_header(Header::ToPath(to_path))
        .with_header(Header::FromPath(local))
        .with_header(Header::MessageId(message_id))
        .with_header(Header::ByteRange(range))
        .with_header(Header::Status(status))
}

/// Success REPORT covering all `total` bytes.
#[must_use]
pub fn success_report(
    transaction_id: TransactionId,
    target: &ReportTarget,
    local: Path,
    message_id: MessageId,
    total: u64,
) -> Chunk {
    report(
        transaction_id,
        target.reply_path.clone(),
        local,
        message_id,
        ByteRange::from_span(0, total, Some(total), false),
        Status::with_reason(StatusCode::OK),
    )
}

/// Failure REPORT covering the `received` bytes that arrived.
#[must_use]
pub fn failure_report(
    transaction_id: TransactionId,
    target: &ReportTarget,
    local: Path,
    message_id: MessageId,
    received: u64,
    total: Option<u64>,
    status: StatusCode,
) -> Chunk {
    report(
        transaction_id,
        target.reply_path.clone(),
        local,
        message_id,
        ByteRange::from_span(0, received, total, false),
        Status::with_reason(status),
    )
}
