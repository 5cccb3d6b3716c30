//! Session worker: owns the transport, the transaction table and the
//! reassembler, and serialises all session state changes.

use std::{
    collections::{HashMap, HashSet, VecDeque},
    io,
};

use futures::StreamExt;
use log::{debug, info, warn};
use tokio::{
    io::{AsyncRead, AsyncWrite, ReadHalf},
    sync::{mpsc, watch},
    task::JoinHandle,
    time::{Instant, sleep_until, timeout},
};
use tokio_util::{codec::FramedRead, sync::CancellationToken};

use super::{
    AbortReason,
    DeliveryFailure,
    DeliveryStatus,
    Role,
    SessionConfig,
    SessionError,
    SessionEvent,
    SessionHandle,
    SessionParams,
    SessionState,
    handle::Command,
};
use crate::{
    chunk::{ByteRange, Chunk, Header, IdGenerator, MessageId, Method, TransactionId},
    codec::{Decoded, MsrpCodec},
    connection::{ActiveConnection, ChunkWriter, Outbound, WriteEvent},
    message::{OutgoingMessage, Reassembler},
    metrics,
    path::Path,
    push::{PushHandle, PushPriority, PushQueues},
    report::ReportTarget,
    status::StatusCode,
    traffic::{LoggedReader, TrafficLog},
    transaction::TransactionManager,
    uri::MsrpUri,
};

/// What an outstanding request is waiting to learn.
#[derive(Clone, Debug, PartialEq, Eq)]
pub(super) enum Pending {
    /// The binding SEND of an active session.
    Handshake,
    Data { message_id: MessageId },
    Abort { message_id: MessageId },
}

/// Pieces returned to [`Session`](super::Session) once the worker runs.
pub(super) struct Started {
    pub handle: SessionHandle,
    pub events: mpsc::UnboundedReceiver<SessionEvent>,
    pub task: JoinHandle<()>,
}

/// Split `transport`, spawn the chunk writer and the session worker.
pub(super) fn start<T>(
    params: SessionParams,
    config: SessionConfig,
    to_path: Path,
    transport: T,
) -> Result<Started, SessionError>
where
    T: AsyncRead + AsyncWrite + Send + 'static,
{
    let (queues, writer) =
        PushQueues::bounded(config.high_queue_capacity, config.low_queue_capacity)?;
    let traffic = TrafficLog::new(params.local.to_string(), params.remote.to_string());
    let (read_half, write_half) = tokio::io::split(transport);
    let shutdown = CancellationToken::new();
    let (write_events_tx, write_events) = mpsc::unbounded_channel();
    let writer_task = tokio::spawn(
        ChunkWriter::new(
            write_half,
            queues,
            write_events_tx,
            shutdown.child_token(),
            config.write_slice_size(),
            traffic.clone(),
        )
        .run(),
    );

    let ids = config.id_generator();
    let (commands_tx, commands) = mpsc::channel(config.high_queue_capacity.max(1));
    let (state_tx, state_rx) = watch::channel(SessionState::Connecting);
    let (events_tx, events) = mpsc::unbounded_channel();
    let handle = SessionHandle::new(commands_tx, state_rx, shutdown.clone(), ids);

    let connection = ActiveConnection::open(params.remote.to_string());
    let actor = SessionActor {
        from_path: Path::single(params.local.clone()),
        local: params.local,
        remote: params.remote,
        role: params.role,
        to_path,
        transactions: TransactionManager::new(config.transaction_timeout).with_id_generator(ids),
        reassembler: Reassembler::new(config.message_limit(), config.reassembly_timeout),
        frames: FramedRead::new(LoggedReader::new(read_half, traffic), MsrpCodec::new(config.codec)),
        config,
        ids,
        state: SessionState::Connecting,
        state_tx,
        events: events_tx,
        commands,
        commands_open: true,
        writer: Some(writer),
        writer_task: Some(writer_task),
        write_events,
        shutdown,
        outgoing: HashMap::new(),
        order: VecDeque::new(),
        aborting: HashSet::new(),
        writing: None,
        close_deadline: None,
        _connection: connection,
    };
    Ok(Started {
        handle,
        events,
        task: tokio::spawn(actor.run()),
    })
}

pub(super) struct SessionActor<R> {
    pub(super) local: MsrpUri,
    pub(super) remote: MsrpUri,
    role: Role,
    pub(super) to_path: Path,
    pub(super) from_path: Path,
    pub(super) config: SessionConfig,
    pub(super) ids: IdGenerator,
    pub(super) state: SessionState,
    state_tx: watch::Sender<SessionState>,
    events: mpsc::UnboundedSender<SessionEvent>,
    commands: mpsc::Receiver<Command>,
    commands_open: bool,
    frames: FramedRead<LoggedReader<ReadHalf<R>>, MsrpCodec>,
    writer: Option<PushHandle<Outbound>>,
    writer_task: Option<JoinHandle<io::Result<()>>>,
    write_events: mpsc::UnboundedReceiver<WriteEvent>,
    shutdown: CancellationToken,
    pub(super) transactions: TransactionManager<Pending>,
    pub(super) reassembler: Reassembler<ReportTarget>,
    pub(super) outgoing: HashMap<MessageId, OutgoingMessage>,
    /// Round-robin order of `outgoing`.
    pub(super) order: VecDeque<MessageId>,
    pub(super) aborting: HashSet<MessageId>,
    /// Data chunk currently owned by the writer.
    pub(super) writing: Option<TransactionId>,
    pub(super) close_deadline: Option<Instant>,
    _connection: ActiveConnection,
}

impl<R> SessionActor<R>
where
    R: AsyncRead + Send + 'static,
{
    async fn run(mut self) {
        let result = self.run_inner().await;
        self.close(result).await;
    }

    async fn run_inner(&mut self) -> Result<(), SessionError> {
        self.start()?;
        loop {
            if self.close_due(Instant::now()) {
                return Ok(());
            }
            self.schedule();
            let deadline = self.next_deadline();
            tokio::select! {
                biased;

                () = self.shutdown.cancelled() => {
                    info!("session aborted: local={}", self.local);
                    return Ok(());
                }
                Some(event) = self.write_events.recv() => self.on_write_event(event)?,
                frame = self.frames.next() => match frame {
                    Some(Ok(Decoded::Chunk(chunk))) => self.on_chunk(chunk, Instant::now())?,
                    Some(Ok(Decoded::Malformed(bad))) => self.on_malformed(bad),
                    Some(Err(e)) => {
                        metrics::inc_errors(metrics::ErrorKind::Parse);
                        return Err(e.into());
                    }
                    None if self.state == SessionState::Ending => return Ok(()),
                    None => return Err(SessionError::ConnectionClosed),
                },
                command = self.commands.recv(), if self.commands_open => match command {
                    Some(command) => self.on_command(command)?,
                    None => {
                        debug!("all session handles dropped: local={}", self.local);
                        self.commands_open = false;
                        self.begin_close()?;
                    }
                },
                () = sleep_until(deadline.unwrap_or_else(Instant::now)), if deadline.is_some() => {
                    self.on_timer(Instant::now())?;
                }
            }
        }
    }
}

impl<R> SessionActor<R> {
    fn start(&mut self) -> Result<(), SessionError> {
        match self.role {
            Role::Passive => self.set_state(SessionState::Active)?,
            Role::Active => {
                self.set_state(SessionState::Handshaking)?;
                self.send_binding();
            }
        }
        Ok(())
    }

    /// Empty SEND announcing this endpoint on the connection.
    fn send_binding(&mut self) {
        let mut chunk = self
            .request(self.ids.message_id())
            .with_header(Header::ByteRange(ByteRange::from_span(0, 0, Some(0), false)));
        self.transactions
            .open_at(&mut chunk, Pending::Handshake, Instant::now());
        debug!(
            "sending session binding: local={}, transaction_id={}",
            self.local, chunk.transaction_id
        );
        self.push(Outbound::Chunk(chunk), PushPriority::High);
    }

    /// SEND skeleton addressed to the peer. The transaction id is replaced
    /// when the transaction is opened.
    pub(super) fn request(&self, message_id: MessageId) -> Chunk {
        Chunk::request(self.ids.transaction_id(), Method::Send)
            .with_header(Header::ToPath(self.to_path.clone()))
            .with_header(Header::FromPath(self.from_path.clone()))
            .with_header(Header::MessageId(message_id))
    }

    pub(super) fn set_state(&mut self, next: SessionState) -> Result<(), SessionError> {
        let previous = self.state;
        self.state.transition(next)?;
        self.state_tx.send_replace(next);
        info!(
            "session state changed: local={}, from={previous}, to={next}",
            self.local
        );
        self.emit(SessionEvent::StateChanged(next));
        Ok(())
    }

    pub(super) fn emit(&self, event: SessionEvent) { let _ = self.events.send(event); }

    /// Queue a frame for the writer.
    pub(super) fn push(&self, frame: Outbound, priority: PushPriority) -> bool {
        let Some(writer) = &self.writer else {
            return false;
        };
        match writer.try_push(frame, priority) {
            Ok(()) => true,
            Err(e) => {
                warn!("chunk not queued: peer={}, error={e}", self.remote);
                false
            }
        }
    }

    /// Start a graceful close.
    pub(super) fn begin_close(&mut self) -> Result<(), SessionError> {
        if !self.state.accepts_messages() {
            return Ok(());
        }
        self.set_state(SessionState::Ending)?;
        self.close_deadline = Some(Instant::now() + self.config.close_grace);
        Ok(())
    }

    fn close_due(&self, now: Instant) -> bool {
        self.state == SessionState::Ending
            && ((self.outgoing.is_empty() && self.transactions.is_empty())
                || self.close_deadline.is_some_and(|d| now >= d))
    }

    fn next_deadline(&self) -> Option<Instant> {
        [
            self.transactions.next_deadline(),
            self.reassembler.next_deadline(),
            self.close_deadline,
        ]
        .into_iter()
        .flatten()
        .min()
    }

    fn on_timer(&mut self, now: Instant) -> Result<(), SessionError> {
        for transaction in self.transactions.expire_at(now) {
            metrics::inc_timeouts();
            warn!(
                "transaction timed out: local={}, transaction_id={}",
                self.local,
                transaction.id()
            );
            match transaction.into_context() {
                Pending::Handshake => return Err(SessionError::SetupTimedOut),
                Pending::Data { message_id } => {
                    self.fail_message(&message_id, DeliveryFailure::TimedOut);
                }
                Pending::Abort { .. } => {}
            }
        }
        for expired in self.reassembler.purge_expired_at(now) {
            metrics::inc_aborted();
            info!(
                "partial message expired: message_id={}, received={}",
                expired.message_id, expired.received
            );
            self.report_failure(
                &expired.context,
                expired.message_id.clone(),
                expired.received,
                expired.total,
                StatusCode::REQUEST_TIMEOUT,
            );
            self.emit(SessionEvent::MessageAborted {
                message_id: expired.message_id,
                received: expired.received,
                reason: AbortReason::TimedOut,
            });
        }
        Ok(())
    }

    async fn close(mut self, result: Result<(), SessionError>) {
        if let Err(e) = &result {
            warn!("session failed: local={}, error={e}", self.local);
        }
        let pending: Vec<MessageId> = self.order.drain(..).collect();
        for message_id in pending {
            if self.outgoing.remove(&message_id).is_some() {
                self.emit(SessionEvent::DeliveryStatus {
                    message_id,
                    status: DeliveryStatus::Failed(DeliveryFailure::SessionClosed),
                });
            }
        }
        self.outgoing.clear();
        self.aborting.clear();
        let abandoned = self.transactions.drain();
        if !abandoned.is_empty() {
            debug!(
                "abandoning transactions: local={}, count={}",
                self.local,
                abandoned.len()
            );
        }
        for partial in self.reassembler.drain() {
            metrics::inc_aborted();
            self.emit(SessionEvent::MessageAborted {
                message_id: partial.message_id,
                received: partial.received,
                reason: AbortReason::SessionClosed,
            });
        }
        self.stop_writer().await;
        if self.state.transition(SessionState::Closed).is_ok() {
            self.state_tx.send_replace(SessionState::Closed);
            self.emit(SessionEvent::StateChanged(SessionState::Closed));
        }
        info!("session closed: local={}, peer={}", self.local, self.remote);
        self.emit(SessionEvent::Closed {
            error: result.err(),
        });
    }

    /// Let the writer flush what is queued, bounded by the close grace.
    async fn stop_writer(&mut self) {
        self.writer = None;
        let Some(mut task) = self.writer_task.take() else {
            return;
        };
        match timeout(self.config.close_grace, &mut task).await {
            Ok(Ok(Ok(()))) => {}
            Ok(Ok(Err(e))) => debug!("chunk writer stopped: local={}, error={e}", self.local),
            Ok(Err(e)) => warn!("chunk writer task failed: local={}, error={e}", self.local),
            Err(_) => {
                warn!("chunk writer did not drain in time: local={}", self.local);
                self.shutdown.cancel();
                let _ = task.await;
            }
        }
    }
}
