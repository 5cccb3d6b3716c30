//! Chunk forwarding between hops.
//!
//! A [`Relay`] owns a [`RoutingTable`] shared by every hop connection
//! attached to it. Each hop consumes the relay's own To-Path entry,
//! prepends the relay to From-Path and hands the chunk to the hop serving the
//! next entry, opening that connection on demand through a [`Connector`].
//! Responses to proxied SENDs travel back to the hop the SEND arrived on.
//!
//! ```no_run
//! use msrp::{
//!     relay::{Relay, RelayServer, TcpConnector},
//!     uri::MsrpUri,
//! };
//!
//! # async fn demo() -> Result<(), msrp::relay::RelayError> {
//! let uri: MsrpUri = "msrp://relay.example.net:2855/r;tcp".parse().expect("valid uri");
//! let relay = Relay::builder(uri).connector(TcpConnector).build();
//! RelayServer::bind("0.0.0.0:2855".parse().expect("valid address"), relay)
//!     .await?
//!     .run()
//!     .await
//! # }
//! ```

mod backoff;
mod config;
mod connector;
mod error;
mod forward;
mod hop;
mod routing;
mod server;

use std::{
    fmt,
    io,
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
};

pub use backoff::BackoffConfig;
pub use config::RelayConfig;
pub use connector::{Connector, TcpConnector, Transport};
use dashmap::{DashMap, mapref::entry::Entry};
pub use error::RelayError;
pub use forward::{Route, route_request};
use hop::{HopCommand, ProxyContext};
use log::{info, warn};
pub use routing::{HopId, RoutingTable};
use routing::HopLink;
pub use server::RelayServer;
use tokio::{
    io::{AsyncRead, AsyncWrite},
    sync::mpsc,
    time::timeout,
};
use tokio_util::{sync::CancellationToken, task::TaskTracker};

use crate::{
    chunk::{Chunk, IdGenerator},
    status::StatusCode,
    uri::{Authority, MsrpUri},
};

type Deferred = (Chunk, Option<ProxyContext>);

pub(crate) struct RelayShared {
    uri: MsrpUri,
    config: RelayConfig,
    routes: RoutingTable,
    connector: Option<Arc<dyn Connector>>,
    local: Option<mpsc::UnboundedSender<Chunk>>,
    ids: IdGenerator,
    next_hop: AtomicU64,
    /// Chunks waiting for a connection that is being opened.
    dialing: DashMap<Authority, Vec<Deferred>>,
    tracker: TaskTracker,
    shutdown: CancellationToken,
}

impl RelayShared {
    fn next_hop_id(&self) -> HopId { HopId::from(self.next_hop.fetch_add(1, Ordering::Relaxed) + 1) }

    /// Hand a chunk addressed to the relay itself to the local consumer.
    fn deliver_local(&self, chunk: Chunk) -> bool {
        self.local.as_ref().is_some_and(|tx| tx.send(chunk).is_ok())
    }

    /// Send `chunk` towards `next`, connecting first when no hop serves it.
    fn forward(self: &Arc<Self>, next: &MsrpUri, chunk: Chunk, origin: Option<ProxyContext>) {
        let authority = next.authority();
        if let Some(link) = self.routes.get(&authority) {
            send_to(&link, chunk, origin);
            return;
        }
        let Some(connector) = self.connector.clone() else {
            warn!("no route to next hop: authority={authority}");
            reject(origin);
            return;
        };
        match self.dialing.entry(authority.clone()) {
            Entry::Occupied(mut waiting) => {
                waiting.get_mut().push((chunk, origin));
                return;
            }
            Entry::Vacant(slot) => {
                // A dial may have finished since the lookup above.
                if let Some(link) = self.routes.get(&authority) {
                    drop(slot);
                    send_to(&link, chunk, origin);
                    return;
                }
                slot.insert(vec![(chunk, origin)]);
            }
        }

        let shared = Arc::clone(self);
        let next = next.clone();
        self.tracker.spawn(async move {
            let result = shared.dial(connector.as_ref(), &next).await;
            let Entry::Occupied(waiting) = shared.dialing.entry(authority.clone()) else {
                return;
            };
            let waiting = match result {
                Ok(link) => {
                    let waiting = waiting.remove();
                    for (chunk, origin) in waiting {
                        send_to(&link, chunk, origin);
                    }
                    shared.routes.insert(authority, &link);
                    return;
                }
                Err(e) => {
                    warn!("next hop unreachable: error={e}");
                    waiting.remove()
                }
            };
            for (_, origin) in waiting {
                reject(origin);
            }
        });
    }

    async fn dial(
        self: &Arc<Self>,
        connector: &dyn Connector,
        next: &MsrpUri,
    ) -> Result<Arc<HopLink>, RelayError> {
        let authority = next.authority();
        let connect = timeout(self.config.connect_timeout, connector.connect(next));
        let result = tokio::select! {
            biased;

            () = self.shutdown.cancelled() => Err(io::Error::new(
                io::ErrorKind::Interrupted,
                "relay shutting down",
            )),
            result = connect => result.unwrap_or_else(|_| {
                Err(io::Error::new(io::ErrorKind::TimedOut, "connect timed out"))
            }),
        };
        let transport = result.map_err(|source| RelayError::Connect {
            authority: authority.clone(),
            source,
        })?;
        info!("connected to next hop: authority={authority}");
        hop::spawn(self, transport, Some(authority.to_string()))
    }
}

fn send_to(link: &HopLink, chunk: Chunk, origin: Option<ProxyContext>) {
    if let Err(mpsc::error::SendError(HopCommand::Forward {
        origin: Some(origin),
        ..
    })) = link.commands.send(HopCommand::Forward { chunk, origin })
    {
        origin.fail(StatusCode::SESSION_DOES_NOT_EXIST);
    }
}

fn reject(origin: Option<ProxyContext>) {
    if let Some(origin) = origin {
        origin.fail(StatusCode::SESSION_DOES_NOT_EXIST);
    }
}

/// Cloneable handle to a running relay.
#[derive(Clone)]
pub struct Relay {
    shared: Arc<RelayShared>,
}

impl fmt::Debug for Relay {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Relay")
            .field("uri", &self.shared.uri)
            .field("hops", &self.shared.routes.active_hops().len())
            .finish_non_exhaustive()
    }
}

impl Relay {
    /// Start configuring a relay reachable as `uri`.
    #[must_use]
    pub fn builder(uri: MsrpUri) -> RelayBuilder { RelayBuilder::new(uri) }

    #[must_use]
    pub fn uri(&self) -> &MsrpUri { &self.shared.uri }

    #[must_use]
    pub fn config(&self) -> &RelayConfig { &self.shared.config }

    #[must_use]
    pub fn routes(&self) -> &RoutingTable { &self.shared.routes }

    /// Run a hop over an accepted or pre-established `transport`.
    ///
    /// When the peer's authority is known, chunks addressed to it are routed
    /// over this connection. Other routes are learned from the From-Path of
    /// requests the peer sends.
    ///
    /// # Errors
    ///
    /// Returns [`RelayError::Config`] when the queue capacities are invalid.
    pub fn attach<T>(&self, transport: T, peer: Option<Authority>) -> Result<HopId, RelayError>
    where
        T: AsyncRead + AsyncWrite + Send + 'static,
    {
        let link = hop::spawn(&self.shared, transport, peer.as_ref().map(ToString::to_string))?;
        if let Some(authority) = peer {
            self.shared.routes.insert(authority, &link);
        }
        Ok(link.id)
    }

    /// Whether [`shutdown`](Self::shutdown) has been requested.
    #[must_use]
    pub fn is_shutting_down(&self) -> bool { self.shared.shutdown.is_cancelled() }

    /// Close every hop and wait for their tasks to finish.
    pub async fn shutdown(&self) {
        self.shared.shutdown.cancel();
        self.shared.tracker.close();
        self.shared.tracker.wait().await;
        info!("relay stopped: uri={}", self.shared.uri);
    }
}

/// Builder for [`Relay`].
pub struct RelayBuilder {
    uri: MsrpUri,
    config: RelayConfig,
    connector: Option<Arc<dyn Connector>>,
    local: Option<mpsc::UnboundedSender<Chunk>>,
}

impl RelayBuilder {
    fn new(uri: MsrpUri) -> Self {
        Self {
            uri,
            config: RelayConfig::default(),
            connector: None,
            local: None,
        }
    }

    #[must_use]
    pub fn config(mut self, config: RelayConfig) -> Self {
        self.config = config;
        self
    }

    /// Open connections to unknown next hops with `connector`.
    ///
    /// Without a connector, chunks for an authority with no attached hop are
    /// answered with 481.
    #[must_use]
    pub fn connector(mut self, connector: impl Connector + 'static) -> Self {
        self.connector = Some(Arc::new(connector));
        self
    }

    /// Deliver requests whose To-Path ends at the relay to `tx`.
    #[must_use]
    pub fn deliver_locally(mut self, tx: mpsc::UnboundedSender<Chunk>) -> Self {
        self.local = Some(tx);
        self
    }

    #[must_use]
    pub fn build(self) -> Relay {
        Relay {
            shared: Arc::new(RelayShared {
                uri: self.uri,
                config: self.config,
                routes: RoutingTable::new(),
                connector: self.connector,
                local: self.local,
                ids: IdGenerator::default(),
                next_hop: AtomicU64::new(0),
                dialing: DashMap::new(),
                tracker: TaskTracker::new(),
                shutdown: CancellationToken::new(),
            }),
        }
    }
}

#[cfg(test)]
mod tests;
