//! MSRP sessions.
//!
//! A [`Session`] exclusively owns one connection. Its worker task reads and
//! answers chunks, reassembles inbound messages, schedules outbound chunks
//! and drives the lifecycle in [`SessionState`]. The application talks to
//! it through cloneable [`SessionHandle`]s and receives [`SessionEvent`]s.
//!
//! # Examples
//!
//! ```no_run
//! use msrp::{
//!     session::{Role, Session, SessionConfig, SessionEvent, SessionParams},
//!     uri::MsrpUri,
//! };
//! use tokio::net::TcpStream;
//!
//! # async fn demo() -> Result<(), Box<dyn std::error::Error>> {
//! let local: MsrpUri = "msrp://alice.example.com:7654/iau39soe2843z;tcp".parse()?;
//! let remote: MsrpUri = "msrp://bob.example.com:8888/9di4eae923wzd;tcp".parse()?;
//! let params = SessionParams::new(local, remote, Role::Active);
//! let mut session = Session::connect(
//!     params,
//!     SessionConfig::default(),
//!     TcpStream::connect("bob.example.com:8888"),
//! )
//! .await?;
//! session.handle().send_message("text/plain", "Hi").await?;
//! while let Some(event) = session.next_event().await {
//!     if let SessionEvent::MessageReceived { body, .. } = event {
//!         println!("{}", String::from_utf8_lossy(&body));
//!     }
//! }
//! # Ok(())
//! # }
//! ```

mod actor;
pub mod config;
pub mod error;
pub mod event;
mod handle;
mod inbound;
mod outbound;
pub mod state;

use std::{future::Future, io};

pub use config::{DEFAULT_MAX_CHUNK_SIZE, DEFAULT_MAX_MESSAGE_SIZE, SessionConfig};
pub use error::SessionError;
pub use event::{AbortReason, DeliveryFailure, DeliveryStatus, SessionEvent};
pub use handle::{MessageStream, SessionHandle};
pub use state::{Role, SessionState};
use tokio::{
    io::{AsyncRead, AsyncWrite},
    sync::mpsc,
    task::JoinHandle,
};

use crate::{path::Path, uri::MsrpUri};

/// Endpoints of a session.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SessionParams {
    pub local: MsrpUri,
    pub remote: MsrpUri,
    pub role: Role,
    /// Relays between this endpoint and `remote`, nearest first.
    pub relays: Vec<MsrpUri>,
}

impl SessionParams {
    #[must_use]
    pub fn new(local: MsrpUri, remote: MsrpUri, role: Role) -> Self {
        Self {
            local,
            remote,
            role,
            relays: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_relays(mut self, relays: impl IntoIterator<Item = MsrpUri>) -> Self {
        self.relays = relays.into_iter().collect();
        self
    }

    /// To-Path of outbound requests: the relays followed by `remote`.
    ///
    /// # Errors
    ///
    /// Returns [`PathError`](crate::path::PathError) if a URI repeats.
    pub fn to_path(&self) -> Result<Path, crate::path::PathError> {
        let mut uris = self.relays.clone();
        uris.push(self.remote.clone());
        Path::new(uris)
    }
}

/// A running session.
pub struct Session {
    handle: SessionHandle,
    events: mpsc::UnboundedReceiver<SessionEvent>,
    task: JoinHandle<()>,
}

impl Session {
    /// Start a session over an established transport.
    ///
    /// Must be called from within a Tokio runtime.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::Path`] for an invalid relay path and
    /// [`SessionError::Config`] for invalid queue capacities.
    pub fn new<T>(
        params: SessionParams,
        config: SessionConfig,
        transport: T,
    ) -> Result<Self, SessionError>
    where
        T: AsyncRead + AsyncWrite + Send + 'static,
    {
        let to_path = params.to_path()?;
        let started = actor::start(params, config, to_path, transport)?;
        Ok(Self {
            handle: started.handle,
            events: started.events,
            task: started.task,
        })
    }

    /// Await `connect`, bounded by the configured connect timeout, then start
    /// the session.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::ConnectTimedOut`] or the transport error when
    /// connecting fails, and otherwise the errors of [`Session::new`].
    pub async fn connect<F, T>(
        params: SessionParams,
        config: SessionConfig,
        connect: F,
    ) -> Result<Self, SessionError>
    where
        F: Future<Output = io::Result<T>>,
        T: AsyncRead + AsyncWrite + Send + 'static,
    {
        let limit = config.connect_timeout;
        let transport = tokio::time::timeout(limit, connect)
            .await
            .map_err(|_| SessionError::ConnectTimedOut(limit))??;
        Self::new(params, config, transport)
    }

    /// A new handle to the session.
    #[must_use]
    pub fn handle(&self) -> SessionHandle { self.handle.clone() }

    #[must_use]
    pub fn state(&self) -> SessionState { self.handle.state() }

    /// Next event, or `None` after [`SessionEvent::Closed`] was delivered.
    pub async fn next_event(&mut self) -> Option<SessionEvent> { self.events.recv().await }

    /// Split into the handle, the event receiver and the worker task.
    #[must_use]
    pub fn into_parts(
        self,
    ) -> (
        SessionHandle,
        mpsc::UnboundedReceiver<SessionEvent>,
        JoinHandle<()>,
    ) {
        (self.handle, self.events, self.task)
    }

    /// Wait for the session to close, discarding remaining events.
    ///
    /// The session's own handle is dropped first, so the session closes
    /// gracefully once no other handle is alive.
    ///
    /// # Errors
    ///
    /// Returns the error the session closed with.
    pub async fn join(self) -> Result<(), SessionError> {
        let Self {
            handle,
            mut events,
            task,
        } = self;
        drop(handle);
        let mut outcome = Err(SessionError::Closed);
        while let Some(event) = events.recv().await {
            if let SessionEvent::Closed { error } = event {
                outcome = error.map_or(Ok(()), Err);
            }
        }
        let _ = task.await;
        outcome
    }
}
