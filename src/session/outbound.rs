//! Outbound message scheduling and writer feedback.
//!
//! Messages take turns: each ready message gets one chunk before the next
//! is served. A single data chunk is handed to the writer at a time, so the
//! next chunk always resumes where the writer actually stopped.

use log::{debug, warn};
use tokio::time::Instant;

use super::{
    DeliveryFailure,
    DeliveryStatus,
    SessionError,
    SessionEvent,
    actor::{Pending, SessionActor},
    handle::Command,
};
use crate::{
    chunk::{FailureReport, Header, MessageId, SuccessReport, TransactionId},
    connection::{Outbound, WriteEvent},
    message::{OutgoingMessage, Slice},
    push::PushPriority,
};

impl<R> SessionActor<R> {
    pub(super) fn on_command(&mut self, command: Command) -> Result<(), SessionError> {
        match command {
            Command::Send { message, reply } => {
                let _ = reply.send(self.enqueue(message));
            }
            Command::StreamData { message_id, data } => {
                if let Some(message) = self.outgoing.get_mut(&message_id) {
                    message.push_data(&data);
                }
            }
            Command::StreamEnd { message_id } => {
                if let Some(message) = self.outgoing.get_mut(&message_id) {
                    message.finish();
                }
            }
            Command::Abort { message_id, reply } => {
                let _ = reply.send(self.request_abort(message_id));
            }
            Command::Close => self.begin_close()?,
        }
        Ok(())
    }

    fn enqueue(&mut self, message: OutgoingMessage) -> Result<(), SessionError> {
        if !self.state.accepts_messages() {
            return Err(SessionError::NotAccepting(self.state));
        }
        let message_id = message.message_id().clone();
        debug!(
            "message queued: local={}, message_id={message_id}, total={:?}",
            self.local,
            message.total()
        );
        if self.outgoing.insert(message_id.clone(), message).is_none() {
            self.order.push_back(message_id);
        }
        Ok(())
    }

    fn request_abort(&mut self, message_id: MessageId) -> Result<(), SessionError> {
        let Some(message) = self.outgoing.get(&message_id) else {
            return Err(SessionError::UnknownMessage(message_id));
        };
        if message.all_sent() {
            debug!("abort ignored, message fully sent: message_id={message_id}");
            return Ok(());
        }
        if message.offset() == 0 && message.in_flight().is_none() {
            self.send_abort(message_id);
            return Ok(());
        }
        self.aborting.insert(message_id);
        Ok(())
    }

    /// Hand the next chunk to the writer when it is idle.
    pub(super) fn schedule(&mut self) {
        if !self.state.sends_data() || self.writing.is_some() {
            return;
        }
        let chunk_size = self.config.chunk_size();
        for _ in 0..self.order.len() {
            let Some(message_id) = self.order.pop_front() else {
                return;
            };
            let Some(message) = self.outgoing.get_mut(&message_id) else {
                continue;
            };
            if self.aborting.contains(&message_id) {
                if message.in_flight().is_some() {
                    self.order.push_back(message_id);
                    continue;
                }
                self.send_abort(message_id);
                return;
            }
            let Some(slice) = message.next_slice(chunk_size) else {
                self.order.push_back(message_id);
                continue;
            };
            self.order.push_back(message_id.clone());
            self.send_slice(&message_id, &slice);
            return;
        }
    }

    fn send_slice(&mut self, message_id: &MessageId, slice: &Slice) {
        let Some(message) = self.outgoing.get(message_id) else {
            return;
        };
        let interruptible = slice.body.len() > self.config.write_slice_size().get();
        let mut chunk = self
            .request(message_id.clone())
            .with_header(Header::ByteRange(slice.byte_range(interruptible)));
        if message.success_report() != SuccessReport::default() {
            chunk.insert_header(Header::SuccessReport(message.success_report()));
        }
        if message.failure_report() != FailureReport::default() {
            chunk.insert_header(Header::FailureReport(message.failure_report()));
        }
        if slice.offset == 0 || !slice.body.is_empty() {
            chunk.insert_header(Header::ContentType(message.content_type().to_owned()));
        }
        let mut chunk = chunk.with_body(slice.body.clone()).with_flag(slice.flag);

        let transaction_id = self.transactions.open_queued_at(
            &mut chunk,
            Pending::Data {
                message_id: message_id.clone(),
            },
            Instant::now(),
        );
        if let Some(message) = self.outgoing.get_mut(message_id) {
            message.on_queued(slice, transaction_id.clone());
        }
        if self.push(
            Outbound::Data {
                chunk,
                interruptible,
            },
            PushPriority::Low,
        ) {
            self.writing = Some(transaction_id);
        } else {
            self.fail_message(message_id, DeliveryFailure::Unwritable);
        }
    }

    /// Terminate a partly sent message with the `#` flag, or drop it if
    /// nothing went out yet.
    fn send_abort(&mut self, message_id: MessageId) {
        self.aborting.remove(&message_id);
        let Some(message) = self.outgoing.remove(&message_id) else {
            return;
        };
        self.order.retain(|id| *id != message_id);
        self.transactions.cancel_where(
            |p| matches!(p, Pending::Data { message_id: id } if *id == message_id),
        );
        if message.offset() > 0 {
            self.push_abort_chunk(&message);
        }
        debug!(
            "message aborted: local={}, message_id={message_id}, sent={}",
            self.local,
            message.offset()
        );
        self.emit(SessionEvent::DeliveryStatus {
            message_id,
            status: DeliveryStatus::Failed(DeliveryFailure::Aborted),
        });
    }

    /// Queue a body-less `#` chunk closing `message` at its sent offset.
    fn push_abort_chunk(&mut self, message: &OutgoingMessage) {
        let slice = message.abort_slice();
        let message_id = message.message_id().clone();
        let mut chunk = self
            .request(message_id.clone())
            .with_header(Header::ByteRange(slice.byte_range(false)))
            .with_flag(slice.flag);
        let transaction_id = self.transactions.open_queued_at(
            &mut chunk,
            Pending::Abort { message_id },
            Instant::now(),
        );
        if self.push(
            Outbound::Data {
                chunk,
                interruptible: false,
            },
            PushPriority::Low,
        ) {
            self.writing = Some(transaction_id);
        }
    }

    pub(super) fn on_write_event(&mut self, event: WriteEvent) -> Result<(), SessionError> {
        match event {
            WriteEvent::Written { transaction_id } => {
                self.release_writer(&transaction_id);
                self.transactions.arm_at(&transaction_id, Instant::now());
                let written = self
                    .outgoing
                    .values_mut()
                    .find(|m| m.in_flight() == Some(&transaction_id))
                    .map(|m| {
                        m.on_written(&transaction_id);
                        m.message_id().clone()
                    });
                if let Some(message_id) = written {
                    self.check_delivered(&message_id);
                }
            }
            WriteEvent::Interrupted {
                transaction_id,
                sent,
            } => {
                self.release_writer(&transaction_id);
                self.transactions.arm_at(&transaction_id, Instant::now());
                if let Some(message) = self
                    .outgoing
                    .values_mut()
                    .find(|m| m.in_flight() == Some(&transaction_id))
                {
                    debug!(
                        "chunk interrupted: message_id={}, sent={sent}",
                        message.message_id()
                    );
                    message.on_interrupted(&transaction_id, sent);
                }
            }
            WriteEvent::Rejected { transaction_id } => {
                self.release_writer(&transaction_id);
                let _ = self.transactions.match_response(&transaction_id);
                let rejected = self
                    .outgoing
                    .values()
                    .find(|m| m.in_flight() == Some(&transaction_id))
                    .map(|m| m.message_id().clone());
                if let Some(message_id) = rejected {
                    self.fail_message(&message_id, DeliveryFailure::Unwritable);
                }
            }
            WriteEvent::Failed(e) => return Err(SessionError::Transport(e)),
        }
        Ok(())
    }

    fn release_writer(&mut self, transaction_id: &TransactionId) {
        if self.writing.as_ref() == Some(transaction_id) {
            self.writing = None;
        }
    }

    /// Drop `message_id`, cancel its transactions and report `failure`.
    ///
    /// A message the peer holds in part is closed with a `#` chunk so the
    /// receiver can discard it at once. Writer failures skip this.
    pub(super) fn fail_message(&mut self, message_id: &MessageId, failure: DeliveryFailure) {
        let Some(message) = self.outgoing.remove(message_id) else {
            return;
        };
        self.aborting.remove(message_id);
        self.order.retain(|id| id != message_id);
        self.transactions.cancel_where(
            |p| matches!(p, Pending::Data { message_id: id } if id == message_id),
        );
        if failure != DeliveryFailure::Unwritable
            && message.offset() > 0
            && !message.all_sent()
            && message.in_flight().is_none()
        {
            self.push_abort_chunk(&message);
        }
        warn!(
            "delivery failed: local={}, message_id={message_id}, failure={failure:?}",
            self.local
        );
        self.emit(SessionEvent::DeliveryStatus {
            message_id: message_id.clone(),
            status: DeliveryStatus::Failed(failure),
        });
    }

    /// Report `message_id` as sent once every chunk is written and
    /// acknowledged.
    pub(super) fn check_delivered(&mut self, message_id: &MessageId) {
        if !self.outgoing.get(message_id).is_some_and(OutgoingMessage::is_delivered) {
            return;
        }
        self.outgoing.remove(message_id);
        self.order.retain(|id| id != message_id);
        debug!("message delivered: local={}, message_id={message_id}", self.local);
        self.emit(SessionEvent::DeliveryStatus {
            message_id: message_id.clone(),
            status: DeliveryStatus::Sent,
        });
    }
}
