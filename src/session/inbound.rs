//! Handling of chunks read from the peer.

use log::{debug, info, warn};
use tokio::time::Instant;

use super::{
    AbortReason,
    DeliveryFailure,
    DeliveryStatus,
    SessionError,
    SessionEvent,
    SessionState,
    actor::{Pending, SessionActor},
};
use crate::{
    chunk::{Chunk, ChunkKind, Flag, MessageId, Method},
    codec::MalformedChunk,
    connection::Outbound,
    error::MsrpError,
    message::ChunkOutcome,
    metrics,
    path,
    push::PushPriority,
    report::{self, ReportTarget},
    status::StatusCode,
};

/// Whether `chunk` is an empty SEND binding the session rather than data.
fn is_binding(chunk: &Chunk) -> bool {
    chunk.body_len() == 0 && chunk.content_type().is_none() && chunk.flag != Flag::Abort
}

impl<R> SessionActor<R> {
    pub(super) fn on_chunk(&mut self, chunk: Chunk, now: Instant) -> Result<(), SessionError> {
        metrics::inc_chunks(metrics::Direction::Inbound);
        match &chunk.kind {
            ChunkKind::Request(Method::Send) => self.on_send(&chunk, now),
            ChunkKind::Request(Method::Report) => self.on_report(&chunk),
            ChunkKind::Request(method) => {
                debug!(
                    "unsupported method: local={}, method={}",
                    self.local,
                    method.as_str()
                );
                self.respond(&chunk, StatusCode::NOT_IMPLEMENTED);
            }
            ChunkKind::Response { status, .. } => return self.on_response(&chunk, *status),
        }
        Ok(())
    }

    /// Answer a malformed request with `400`. REPORTs and responses are
    /// never answered.
    pub(super) fn on_malformed(&mut self, bad: MalformedChunk) {
        metrics::inc_errors(metrics::ErrorKind::Parse);
        warn!(
            "malformed chunk: local={}, transaction_id={}, error={}",
            self.local, bad.transaction_id, bad.error
        );
        if matches!(&bad.kind, ChunkKind::Request(m) if *m != Method::Report) {
            self.push(
                Outbound::Chunk(report::response(bad.transaction_id, StatusCode::BAD_REQUEST)),
                PushPriority::High,
            );
        }
    }

    fn respond(&self, request: &Chunk, status: StatusCode) {
        self.push(
            Outbound::Chunk(report::response_for(request, status)),
            PushPriority::High,
        );
    }

    fn on_send(&mut self, chunk: &Chunk, now: Instant) {
        if let Err(e) = path::authorize(chunk.to_path(), chunk.from_path(), &self.local, &self.remote)
        {
            self.reject(chunk, &MsrpError::Path(e));
            return;
        }
        let Some(message_id) = chunk.message_id().cloned() else {
            self.respond(chunk, StatusCode::BAD_REQUEST);
            return;
        };
        let known = self.reassembler.contains(&message_id);
        if !known && is_binding(chunk) {
            debug!(
                "session binding answered: local={}, message_id={message_id}",
                self.local
            );
            self.respond(chunk, StatusCode::OK);
            return;
        }
        if !known
            && chunk.flag != Flag::Abort
            && let Some(content_type) = chunk.content_type()
            && !self.config.accepts(content_type)
        {
            info!("content type refused: local={}, content_type={content_type}", self.local);
            self.respond(chunk, StatusCode::UNSUPPORTED_MEDIA_TYPE);
            return;
        }
        let Some(target) = ReportTarget::from_send(chunk) else {
            self.respond(chunk, StatusCode::BAD_REQUEST);
            return;
        };

        let received = self.reassembler.received(&message_id);
        match self.reassembler.push_at(chunk, target.clone(), now) {
            Ok(ChunkOutcome::Incomplete { .. }) => self.respond(chunk, StatusCode::OK),
            Ok(ChunkOutcome::Complete(message)) => {
                self.respond(chunk, StatusCode::OK);
                metrics::inc_delivered();
                if report::wants_success_report(message.context.success_report) {
                    let report = report::success_report(
                        self.ids.transaction_id(),
                        &message.context,
                        self.from_path.clone(),
                        message.message_id.clone(),
                        message.body.len() as u64,
                    );
                    self.push(Outbound::Chunk(report), PushPriority::High);
                }
                self.emit(SessionEvent::MessageReceived {
                    message_id: message.message_id,
                    content_type: message.content_type,
                    body: message.body,
                });
            }
            Ok(ChunkOutcome::Aborted(aborted)) => {
                self.respond(chunk, StatusCode::OK);
                metrics::inc_aborted();
                info!(
                    "message aborted by sender: message_id={}, received={}",
                    aborted.message_id, aborted.received
                );
                self.report_failure(
                    &aborted.context,
                    aborted.message_id.clone(),
                    aborted.received,
                    aborted.total,
                    StatusCode::BAD_REQUEST,
                );
                self.emit(SessionEvent::MessageAborted {
                    message_id: aborted.message_id,
                    received: aborted.received,
                    reason: AbortReason::Sender,
                });
            }
            Err(e) => {
                let error = MsrpError::from(e);
                let status = self.reject(chunk, &error);
                let received = received.unwrap_or(0);
                self.report_failure(
                    &target,
                    message_id.clone(),
                    received,
                    chunk.byte_range().and_then(|r| r.total()),
                    status,
                );
                metrics::inc_aborted();
                self.emit(SessionEvent::MessageAborted {
                    message_id,
                    received,
                    reason: AbortReason::Rejected(status),
                });
            }
        }
    }

    /// Count and log `error`, answering `request` with its status code.
    fn reject(&self, request: &Chunk, error: &MsrpError) -> StatusCode {
        metrics::inc_errors(error.kind());
        let status = error.status_code().unwrap_or(StatusCode::BAD_REQUEST);
        warn!(
            "request rejected: local={}, transaction_id={}, status={status}, error={error}",
            self.local, request.transaction_id
        );
        self.respond(request, status);
        status
    }

    /// REPORTs are never answered, even when rejected.
    fn on_report(&mut self, chunk: &Chunk) {
        if let Err(e) = path::authorize(chunk.to_path(), chunk.from_path(), &self.local, &self.remote)
        {
            metrics::inc_errors(metrics::ErrorKind::Path);
            warn!("report ignored: local={}, error={e}", self.local);
            return;
        }
        let (Some(message_id), Some(status)) = (chunk.message_id(), chunk.status()) else {
            debug!(
                "incomplete report ignored: transaction_id={}",
                chunk.transaction_id
            );
            return;
        };
        self.emit(SessionEvent::DeliveryStatus {
            message_id: message_id.clone(),
            status: DeliveryStatus::Report {
                status: status.clone(),
                byte_range: chunk.byte_range(),
            },
        });
    }

    fn on_response(&mut self, chunk: &Chunk, status: StatusCode) -> Result<(), SessionError> {
        let transaction = match self.transactions.match_response(&chunk.transaction_id) {
            Ok(transaction) => transaction,
            Err(e) => {
                debug!("response discarded: local={}, error={e}", self.local);
                return Ok(());
            }
        };
        match transaction.into_context() {
            Pending::Handshake if status.is_success() => self.set_state(SessionState::Active)?,
            Pending::Handshake => return Err(SessionError::SetupRejected(status)),
            Pending::Data { message_id } if status.is_success() => {
                if let Some(message) = self.outgoing.get_mut(&message_id) {
                    message.on_acknowledged();
                }
                self.check_delivered(&message_id);
            }
            Pending::Data { message_id } => {
                warn!(
                    "chunk refused: local={}, message_id={message_id}, status={status}",
                    self.local
                );
                self.fail_message(&message_id, DeliveryFailure::Rejected(status));
            }
            Pending::Abort { message_id } => {
                debug!("abort acknowledged: message_id={message_id}, status={status}");
            }
        }
        Ok(())
    }

    /// Send a failure REPORT for `message_id` if the originator asked for
    /// one.
    pub(super) fn report_failure(
        &self,
        target: &ReportTarget,
        message_id: MessageId,
        received: u64,
        total: Option<u64>,
        status: StatusCode,
    ) {
        if !report::wants_failure_report(target.failure_report) {
            return;
        }
        let report = report::failure_report(
            self.ids.transaction_id(),
            target,
            self.from_path.clone(),
            message_id,
            received,
            total,
            status,
        );
        self.push(Outbound::Chunk(report), PushPriority::High);
    }
}
