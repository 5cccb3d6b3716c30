//! Application-facing control of a running session.

use bytes::Bytes;
use tokio::sync::{mpsc, oneshot, watch};
use tokio_util::sync::CancellationToken;

use super::{SessionError, SessionState};
use crate::{
    chunk::{IdGenerator, MessageId},
    message::OutgoingMessage,
};

/// Requests sent from handles to the session worker.
#[derive(Debug)]
pub(crate) enum Command {
    Send {
        message: OutgoingMessage,
        reply: oneshot::Sender<Result<(), SessionError>>,
    },
    StreamData {
        message_id: MessageId,
        data: Bytes,
    },
    StreamEnd {
        message_id: MessageId,
    },
    Abort {
        message_id: MessageId,
        reply: oneshot::Sender<Result<(), SessionError>>,
    },
    Close,
}

/// Cloneable handle to a session worker.
///
/// Dropping every handle closes the session gracefully.
#[derive(Clone, Debug)]
pub struct SessionHandle {
    commands: mpsc::Sender<Command>,
    state: watch::Receiver<SessionState>,
    shutdown: CancellationToken,
    ids: IdGenerator,
}

impl SessionHandle {
    pub(crate) fn new(
        commands: mpsc::Sender<Command>,
        state: watch::Receiver<SessionState>,
        shutdown: CancellationToken,
        ids: IdGenerator,
    ) -> Self {
        Self {
            commands,
            state,
            shutdown,
            ids,
        }
    }

    /// Current lifecycle state.
    #[must_use]
    pub fn state(&self) -> SessionState { *self.state.borrow() }

    /// Receiver observing every state change.
    #[must_use]
    pub fn watch_state(&self) -> watch::Receiver<SessionState> { self.state.clone() }

    /// Wait until the session reaches `target` or closes.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::Closed`] if the session closed without
    /// reaching `target`.
    pub async fn wait_for(&self, target: SessionState) -> Result<(), SessionError> {
        let mut state = self.state.clone();
        let reached = state
            .wait_for(|s| *s == target || *s == SessionState::Closed)
            .await
            .map(|s| *s)
            .unwrap_or(SessionState::Closed);
        if reached == target {
            Ok(())
        } else {
            Err(SessionError::Closed)
        }
    }

    /// Fresh identifier for an [`OutgoingMessage`].
    #[must_use]
    pub fn new_message_id(&self) -> MessageId { self.ids.message_id() }

    /// Queue a complete message for delivery.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::NotAccepting`] once the session is ending and
    /// [`SessionError::Closed`] after it stopped.
    pub async fn send_message(
        &self,
        content_type: impl Into<String>,
        body: impl Into<Bytes>,
    ) -> Result<MessageId, SessionError> {
        self.send(OutgoingMessage::whole(
            self.new_message_id(),
            content_type,
            body.into(),
        ))
        .await
    }

    /// Queue a prepared message.
    ///
    /// # Errors
    ///
    /// See [`send_message`](Self::send_message).
    pub async fn send(&self, message: OutgoingMessage) -> Result<MessageId, SessionError> {
        let message_id = message.message_id().clone();
        let (reply, response) = oneshot::channel();
        self.command(Command::Send { message, reply }).await?;
        response.await.map_err(|_| SessionError::Closed)??;
        Ok(message_id)
    }

    /// Start a message whose size is not known yet.
    ///
    /// # Errors
    ///
    /// See [`send_message`](Self::send_message).
    pub async fn open_stream(
        &self,
        content_type: impl Into<String>,
    ) -> Result<MessageStream, SessionError> {
        let message_id = self
            .send(OutgoingMessage::stream(self.new_message_id(), content_type))
            .await?;
        Ok(MessageStream {
            message_id,
            commands: self.commands.clone(),
        })
    }

    /// Abandon an outbound message, terminating it with the `#` flag if
    /// part of it was already sent.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::UnknownMessage`] if the message is not queued.
    pub async fn abort_message(&self, message_id: &MessageId) -> Result<(), SessionError> {
        let (reply, response) = oneshot::channel();
        self.command(Command::Abort {
            message_id: message_id.clone(),
            reply,
        })
        .await?;
        response.await.map_err(|_| SessionError::Closed)?
    }

    /// Begin a graceful close. Outstanding transactions may finish within
    /// the configured grace period.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::Closed`] if the session already stopped.
    pub async fn close(&self) -> Result<(), SessionError> { self.command(Command::Close).await }

    /// Close immediately, failing everything outstanding.
    pub fn abort(&self) { self.shutdown.cancel(); }

    async fn command(&self, command: Command) -> Result<(), SessionError> {
        self.commands
            .send(command)
            .await
            .map_err(|_| SessionError::Closed)
    }
}

/// Writer for a message of unknown length.
///
/// Data is chunked as it arrives; the total size is announced with the
/// final chunk after [`finish`](Self::finish).
#[derive(Debug)]
pub struct MessageStream {
    message_id: MessageId,
    commands: mpsc::Sender<Command>,
}

impl MessageStream {
    #[must_use]
    pub fn message_id(&self) -> &MessageId { &self.message_id }

    /// Append body bytes.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::Closed`] if the session stopped.
    pub async fn write(&self, data: impl Into<Bytes>) -> Result<(), SessionError> {
        self.commands
            .send(Command::StreamData {
                message_id: self.message_id.clone(),
                data: data.into(),
            })
            .await
            .map_err(|_| SessionError::Closed)
    }

    /// Mark the body complete.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::Closed`] if the session stopped.
    pub async fn finish(self) -> Result<(), SessionError> {
        self.commands
            .send(Command::StreamEnd {
                message_id: self.message_id,
            })
            .await
            .map_err(|_| SessionError::Closed)
    }
}
