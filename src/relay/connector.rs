//! Outbound connections to next hops.

use std::io;

use async_trait::async_trait;
use tokio::{
    io::{AsyncRead, AsyncWrite},
    net::TcpStream,
};

use crate::uri::MsrpUri;

/// Byte stream a hop can run over.
pub trait Transport: AsyncRead + AsyncWrite + Send + Unpin {}

impl<T> Transport for T where T: AsyncRead + AsyncWrite + Send + Unpin {}

/// Opens connections to next hops that have no route yet.
///
/// Implementations decide how an `msrps` URI is secured. The relay treats
/// whatever transport is returned as already authorised.
#[async_trait]
pub trait Connector: Send + Sync {
    /// Connect to the authority of `uri`.
    ///
    /// # Errors
    ///
    /// Returns the I/O error that prevented the connection.
    async fn connect(&self, uri: &MsrpUri) -> io::Result<Box<dyn Transport>>;
}

/// Plain TCP connector for `msrp` URIs.
#[derive(Clone, Copy, Debug, Default)]
pub struct TcpConnector;

#[async_trait]
impl Connector for TcpConnector {
    async fn connect(&self, uri: &MsrpUri) -> io::Result<Box<dyn Transport>> {
        let authority = uri.authority();
        if authority.is_secure() {
            return Err(io::Error::new(
                io::ErrorKind::Unsupported,
                format!("no TLS connector configured for {authority}"),
            ));
        }
        let stream = TcpStream::connect((authority.host(), authority.port())).await?;
        stream.set_nodelay(true)?;
        Ok(Box::new(stream))
    }
}
