//! TCP front end feeding accepted connections to a [`Relay`].

use std::{future::Future, net::SocketAddr};

use log::{info, warn};
use tokio::{
    net::TcpListener,
    select,
    signal,
    time::{Duration, sleep},
};
use tokio_util::sync::CancellationToken;

use super::{BackoffConfig, Relay, RelayError};

/// Accept loop attaching every inbound connection to a relay as a hop.
#[derive(Debug)]
pub struct RelayServer {
    relay: Relay,
    listener: TcpListener,
    backoff: BackoffConfig,
}

impl RelayServer {
    /// Bind a listener on `addr`.
    ///
    /// # Errors
    ///
    /// Returns [`RelayError::Bind`] if the address cannot be bound.
    pub async fn bind(addr: SocketAddr, relay: Relay) -> Result<Self, RelayError> {
        let listener = TcpListener::bind(addr).await.map_err(RelayError::Bind)?;
        Ok(Self::from_listener(listener, relay))
    }

    /// Serve an already bound listener.
    #[must_use]
    pub fn from_listener(listener: TcpListener, relay: Relay) -> Self {
        Self {
            relay,
            listener,
            backoff: BackoffConfig::default(),
        }
    }

    #[must_use]
    pub fn with_backoff(mut self, backoff: BackoffConfig) -> Self {
        self.backoff = backoff.normalized();
        self
    }

    /// Address the listener is bound to.
    ///
    /// # Errors
    ///
    /// Returns [`RelayError::Bind`] if the socket cannot report its address.
    pub fn local_addr(&self) -> Result<SocketAddr, RelayError> {
        self.listener.local_addr().map_err(RelayError::Bind)
    }

    #[must_use]
    pub fn relay(&self) -> &Relay { &self.relay }

    /// Serve until Ctrl+C.
    ///
    /// # Errors
    ///
    /// Accept failures are retried with back-off and do not surface; the
    /// result is reserved for startup failures.
    pub async fn run(self) -> Result<(), RelayError> {
        self.run_with_shutdown(async {
            let _ = signal::ctrl_c().await;
        })
        .await
    }

    /// Serve until `shutdown` resolves, then close every hop.
    ///
    /// # Errors
    ///
    /// See [`run`](Self::run).
    pub async fn run_with_shutdown<S>(self, shutdown: S) -> Result<(), RelayError>
    where
        S: Future<Output = ()> + Send,
    {
        let Self {
            relay,
            listener,
            backoff,
        } = self;
        let backoff = backoff.normalized();
        let token = CancellationToken::new();
        info!(
            "relay listening: uri={}, addr={:?}",
            relay.uri(),
            listener.local_addr().ok()
        );

        let accept = async {
            let mut delay = backoff.initial_delay;
            while let Some(next) = accept_iteration(&listener, &relay, &token, &backoff, delay).await
            {
                delay = next;
            }
        };
        tokio::pin!(accept);
        select! {
            biased;

            () = shutdown => token.cancel(),
            () = &mut accept => {}
        }
        relay.shutdown().await;
        Ok(())
    }
}

async fn accept_iteration(
    listener: &TcpListener,
    relay: &Relay,
    shutdown: &CancellationToken,
    backoff: &BackoffConfig,
    delay: Duration,
) -> Option<Duration> {
    select! {
        biased;

        () = shutdown.cancelled() => None,
        res = listener.accept() => Some(match res {
            Ok((stream, peer_addr)) => {
                if let Err(e) = stream.set_nodelay(true) {
                    warn!("failed to set TCP_NODELAY: peer_addr={peer_addr}, error={e}");
                }
                match relay.attach(stream, None) {
                    Ok(hop) => info!("connection accepted: hop={hop}, peer_addr={peer_addr}"),
                    Err(e) => warn!("connection dropped: peer_addr={peer_addr}, error={e}"),
                }
                backoff.initial_delay
            }
            Err(e) => {
                let local_addr = listener.local_addr().ok();
                warn!("accept error: error={e:?}, local_addr={local_addr:?}");
                sleep(delay).await;
                backoff.next_delay(delay)
            }
        }),
    }
}
