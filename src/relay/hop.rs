//! Worker driving one relay connection.
//!
//! A hop reads requests from its peer, consumes the relay's To-Path entry
//! and hands the rewritten chunk to the hop serving the next entry. SENDs
//! forwarded for a peer are tracked by the *downstream* hop as proxy
//! transactions whose context knows how to answer upstream.

use std::{any::Any, io, panic::AssertUnwindSafe, sync::Arc};

use futures::{FutureExt, StreamExt};
use log::{debug, error, info, warn};
use tokio::{
    io::{AsyncRead, AsyncWrite, ReadHalf},
    sync::mpsc,
    task::JoinHandle,
    time::{Instant, sleep_until},
};
use tokio_util::{codec::FramedRead, sync::CancellationToken};

use super::{
    RelayError,
    RelayShared,
    forward::{Route, route_request},
    routing::{HopId, HopLink},
};
use crate::{
    chunk::{Chunk, ChunkKind, Header, Method, TransactionId},
    codec::{Decoded, MalformedChunk, MsrpCodec},
    connection::{ActiveConnection, ChunkWriter, Outbound, WriteEvent},
    error::MsrpError,
    metrics::{self, Direction, ErrorKind},
    path::Path,
    push::{PushHandle, PushPriority, PushQueues},
    report,
    status::StatusCode,
    traffic::{LoggedReader, TrafficLog},
    transaction::TransactionManager,
};

/// Instructions delivered to a hop worker by other hops.
#[derive(Debug)]
pub(crate) enum HopCommand {
    /// Write `chunk` to this hop's peer. SENDs carry the upstream context.
    Forward {
        chunk: Chunk,
        origin: Option<ProxyContext>,
    },
    /// The upstream hop closed; forget the transactions it was waiting on.
    CancelUpstream(HopId),
}

/// Upstream side of a proxied SEND.
#[derive(Debug)]
pub(crate) struct ProxyContext {
    upstream: HopId,
    writer: PushHandle<Outbound>,
    transaction_id: TransactionId,
}

impl ProxyContext {
    pub(crate) fn new(
        upstream: HopId,
        writer: PushHandle<Outbound>,
        transaction_id: TransactionId,
    ) -> Self {
        Self {
            upstream,
            writer,
            transaction_id,
        }
    }

    /// Relay `response` upstream under the original transaction id.
    pub(crate) fn reply(self, mut response: Chunk) {
        response.transaction_id = self.transaction_id;
        if let Err(e) = self
            .writer
            .try_push(Outbound::Chunk(response), PushPriority::High)
        {
            warn!(
                "response not relayed: upstream={}, error={e}",
                self.upstream
            );
        }
    }

    /// Answer upstream with `status`.
    pub(crate) fn fail(self, status: StatusCode) {
        let response = report::response(self.transaction_id.clone(), status);
        self.reply(response);
    }
}

/// Split `transport`, spawn its writer and worker on the relay's tracker.
///
/// The returned link is the only strong reference besides the worker's own;
/// drop it once the caller has registered routes.
pub(super) fn spawn<T>(
    shared: &Arc<RelayShared>,
    transport: T,
    peer: Option<String>,
) -> Result<Arc<HopLink>, RelayError>
where
    T: AsyncRead + AsyncWrite + Send + 'static,
{
    let config = &shared.config;
    let (queues, writer) =
        PushQueues::bounded(config.high_queue_capacity, config.low_queue_capacity)?;
    let id = shared.next_hop_id();
    let peer = peer.unwrap_or_else(|| id.to_string());
    let traffic = TrafficLog::new(shared.uri.to_string(), &peer);
    let (read_half, write_half) = tokio::io::split(transport);
    let shutdown = shared.shutdown.child_token();
    let (write_events_tx, write_events) = mpsc::unbounded_channel();
    let writer_task = shared.tracker.spawn(
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

    let (commands_tx, commands) = mpsc::unbounded_channel();
    let link = Arc::new(HopLink {
        id,
        commands: commands_tx,
        writer,
    });
    shared.routes.register_hop(&link);

    let worker = HopWorker {
        id,
        link: Arc::clone(&link),
        frames: FramedRead::new(LoggedReader::new(read_half, traffic), MsrpCodec::new(config.codec)),
        commands,
        write_events,
        writer_task: Some(writer_task),
        transactions: TransactionManager::new(config.transaction_timeout)
            .with_id_generator(shared.ids),
        shared: Arc::clone(shared),
        shutdown,
        _connection: ActiveConnection::open(peer.as_str()),
    };
    info!("hop attached: hop={id}, peer={peer}");
    shared.tracker.spawn(async move {
        if let Err(panic) = AssertUnwindSafe(worker.run()).catch_unwind().await {
            let message = panic_message(panic.as_ref());
            // Emit via both `log` and `tracing` for tests that capture either.
            error!("hop worker panicked: hop={id}, panic={message}");
            tracing::error!(hop = %id, panic = %message, "hop worker panicked");
        }
    });
    Ok(link)
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&'static str>() {
        (*message).to_owned()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        format!("{payload:?}")
    }
}

struct HopWorker<R> {
    id: HopId,
    shared: Arc<RelayShared>,
    link: Arc<HopLink>,
    frames: FramedRead<LoggedReader<ReadHalf<R>>, MsrpCodec>,
    commands: mpsc::UnboundedReceiver<HopCommand>,
    write_events: mpsc::UnboundedReceiver<WriteEvent>,
    writer_task: Option<JoinHandle<io::Result<()>>>,
    shutdown: CancellationToken,
    /// SENDs forwarded to this hop's peer, awaiting its response.
    transactions: TransactionManager<ProxyContext>,
    _connection: ActiveConnection,
}

impl<R> HopWorker<R>
where
    R: AsyncRead + Send + 'static,
{
    async fn run(mut self) {
        let result = self.run_inner().await;
        self.close(result).await;
    }

    async fn run_inner(&mut self) -> Result<(), MsrpError> {
        loop {
            let deadline = self.transactions.next_deadline();
            tokio::select! {
                biased;

                () = self.shutdown.cancelled() => {
                    debug!("hop cancelled: hop={}", self.id);
                    return Ok(());
                }
                Some(event) = self.write_events.recv() => self.on_write_event(event)?,
                frame = self.frames.next() => match frame {
                    Some(Ok(Decoded::Chunk(chunk))) => self.on_chunk(chunk),
                    Some(Ok(Decoded::Malformed(bad))) => self.on_malformed(bad),
                    Some(Err(e)) => {
                        metrics::inc_errors(ErrorKind::Parse);
                        return Err(e.into());
                    }
                    None => return Ok(()),
                },
                Some(command) = self.commands.recv() => self.on_command(command).await,
                () = sleep_until(deadline.unwrap_or_else(Instant::now)), if deadline.is_some() => {
                    self.on_timer(Instant::now());
                }
            }
        }
    }
}

impl<R> HopWorker<R> {
    fn on_chunk(&mut self, chunk: Chunk) {
        metrics::inc_chunks(Direction::Inbound);
        match chunk.method().cloned() {
            None => self.on_response(chunk),
            Some(Method::Send | Method::Report) => self.on_forwardable(chunk),
            Some(Method::Auth) => self.on_auth(&chunk),
            Some(Method::Extension(name)) => {
                debug!("unsupported method: hop={}, method={name}", self.id);
                self.respond(chunk.transaction_id, StatusCode::NOT_IMPLEMENTED);
            }
        }
    }

    fn on_malformed(&self, bad: MalformedChunk) {
        metrics::inc_errors(ErrorKind::Parse);
        warn!(
            "malformed chunk: hop={}, transaction_id={}, error={}",
            self.id, bad.transaction_id, bad.error
        );
        if matches!(&bad.kind, ChunkKind::Request(m) if *m != Method::Report) {
            self.respond(bad.transaction_id, StatusCode::BAD_REQUEST);
        }
    }

    fn on_response(&mut self, response: Chunk) {
        match self.transactions.match_response(&response.transaction_id) {
            Ok(transaction) => transaction.into_context().reply(response),
            Err(e) => debug!("unmatched response discarded: hop={}, error={e}", self.id),
        }
    }

    fn on_forwardable(&mut self, chunk: Chunk) {
        let is_send = chunk.method() == Some(&Method::Send);
        self.learn_route(&chunk);
        let transaction_id = chunk.transaction_id.clone();
        match route_request(&self.shared.uri, chunk) {
            Ok(Route::Local(chunk)) => {
                let delivered = self.shared.deliver_local(chunk);
                if is_send {
                    let status = if delivered {
                        StatusCode::OK
                    } else {
                        StatusCode::SESSION_DOES_NOT_EXIST
                    };
                    self.respond(transaction_id, status);
                }
            }
            Ok(Route::Next { next, chunk }) => {
                debug!(
                    "forwarding request: hop={}, transaction_id={transaction_id}, next={next}",
                    self.id
                );
                let origin = is_send.then(|| {
                    ProxyContext::new(self.id, self.link.writer.clone(), transaction_id)
                });
                self.shared.forward(&next, chunk, origin);
            }
            Err(e) => {
                metrics::inc_errors(ErrorKind::Path);
                warn!(
                    "request not routed: hop={}, transaction_id={transaction_id}, error={e}",
                    self.id
                );
                if is_send {
                    self.respond(transaction_id, e.status_code());
                }
            }
        }
    }

    /// Requests for the previous hop come back over this connection.
    fn learn_route(&self, chunk: &Chunk) {
        let Some(from_path) = chunk.from_path() else {
            return;
        };
        let authority = from_path.head().authority();
        if authority == self.shared.uri.authority() {
            return;
        }
        if self.shared.routes.learn(&authority, &self.link) {
            debug!("route learned: hop={}, authority={authority}", self.id);
        }
    }

    /// Grant the client use of this relay. Credentials are checked before a
    /// transport is handed to the relay, so no digest challenge is issued.
    fn on_auth(&self, request: &Chunk) {
        let (Some(to_path), Some(from_path)) = (request.to_path(), request.from_path()) else {
            self.respond(request.transaction_id.clone(), StatusCode::BAD_REQUEST);
            return;
        };
        if to_path.head() != &self.shared.uri {
            self.respond(
                request.transaction_id.clone(),
                StatusCode::SESSION_DOES_NOT_EXIST,
            );
            return;
        }
        let relay = Path::single(self.shared.uri.clone());
        let response = report::response_for(request, StatusCode::OK)
            .with_header(Header::ToPath(from_path.clone()))
            .with_header(Header::FromPath(relay.clone()))
            .with_header(Header::UsePath(relay))
            .with_header(Header::Expires(self.shared.config.expires));
        info!(
            "relay use granted: hop={}, client={}, expires={}",
            self.id,
            from_path.last(),
            self.shared.config.expires
        );
        self.push(Outbound::Chunk(response));
    }

    async fn on_command(&mut self, command: HopCommand) {
        match command {
            HopCommand::Forward { mut chunk, origin } => {
                let transaction_id = match origin {
                    Some(origin) => self.transactions.open_at(&mut chunk, origin, Instant::now()),
                    None => {
                        chunk.transaction_id = self.shared.ids.transaction_id();
                        chunk.transaction_id.clone()
                    }
                };
                let pushed = tokio::select! {
                    biased;

                    () = self.shutdown.cancelled() => false,
                    result = self.link.writer.push_low_priority(Outbound::Chunk(chunk)) => {
                        result.is_ok()
                    }
                };
                if !pushed
                    && let Ok(transaction) = self.transactions.match_response(&transaction_id)
                {
                    transaction
                        .into_context()
                        .fail(StatusCode::SESSION_DOES_NOT_EXIST);
                }
            }
            HopCommand::CancelUpstream(upstream) => {
                let cancelled = self
                    .transactions
                    .cancel_where(|origin| origin.upstream == upstream);
                if !cancelled.is_empty() {
                    debug!(
                        "proxied transactions cancelled: hop={}, upstream={upstream}, count={}",
                        self.id,
                        cancelled.len()
                    );
                }
            }
        }
    }

    fn on_write_event(&mut self, event: WriteEvent) -> Result<(), MsrpError> {
        match event {
            WriteEvent::Rejected { transaction_id } => {
                if let Ok(transaction) = self.transactions.match_response(&transaction_id) {
                    transaction.into_context().fail(StatusCode::BAD_REQUEST);
                }
            }
            WriteEvent::Failed(e) => return Err(MsrpError::Transport(e)),
            WriteEvent::Written { .. } | WriteEvent::Interrupted { .. } => {}
        }
        Ok(())
    }

    fn on_timer(&mut self, now: Instant) {
        for transaction in self.transactions.expire_at(now) {
            metrics::inc_timeouts();
            warn!(
                "proxied transaction timed out: hop={}, transaction_id={}",
                self.id,
                transaction.id()
            );
            transaction
                .into_context()
                .fail(StatusCode::REQUEST_TIMEOUT);
        }
    }

    fn respond(&self, transaction_id: TransactionId, status: StatusCode) {
        self.push(Outbound::Chunk(report::response(transaction_id, status)));
    }

    fn push(&self, frame: Outbound) {
        if let Err(e) = self.link.writer.try_push(frame, PushPriority::High) {
            warn!("chunk not queued: hop={}, error={e}", self.id);
        }
    }

    async fn close(mut self, result: Result<(), MsrpError>) {
        if let Err(e) = &result {
            warn!("hop failed: hop={}, error={e}", self.id);
        }
        self.shared.routes.remove_hop(self.id);
        for transaction in self.transactions.drain() {
            transaction
                .into_context()
                .fail(StatusCode::SESSION_DOES_NOT_EXIST);
        }
        for link in self.shared.routes.links() {
            let _ = link.commands.send(HopCommand::CancelUpstream(self.id));
        }
        self.shutdown.cancel();
        if let Some(task) = self.writer_task.take() {
            match task.await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => debug!("chunk writer stopped: hop={}, error={e}", self.id),
                Err(e) => warn!("chunk writer task failed: hop={}, error={e}", self.id),
            }
        }
        info!("hop closed: hop={}", self.id);
    }
}
