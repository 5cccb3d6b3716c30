//! Errors raised by the relay.

use std::io;

use thiserror::Error;

use crate::{push::PushConfigError, uri::Authority};

#[derive(Debug, Error)]
pub enum RelayError {
    #[error("failed to bind listener: {0}")]
    Bind(#[source] io::Error),

    /// Accepting a connection failed.
    #[error("accept error: {0}")]
    Accept(#[from] io::Error),

    #[error("invalid queue configuration: {0}")]
    Config(#[from] PushConfigError),

    /// Opening a connection to a next hop failed or timed out.
    #[error("failed to connect to {authority}: {source}")]
    Connect {
        authority: Authority,
        #[source]
        source: io::Error,
    },

    /// No connection reaches the authority and none could be opened.
    #[error("no route to {0}")]
    NoRoute(Authority),
}
