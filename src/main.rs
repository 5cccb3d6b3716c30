//! `msrp-relay`: accept MSRP hop connections and forward chunks between
//! them.

mod cli;

use std::{process::ExitCode, time::Duration};

use clap::Parser;
use log::error;
use msrp::{
    codec::CodecConfig,
    relay::{Relay, RelayConfig, RelayServer, TcpConnector},
    uri::MsrpUri,
};

fn relay_config(cli: &cli::Cli) -> RelayConfig {
    let mut codec = CodecConfig::default();
    if let Some(limit) = cli.max_chunk_size {
        codec = codec.with_max_body_size(limit);
    }
    RelayConfig::default()
        .with_transaction_timeout(Duration::from_millis(cli.transaction_timeout_ms))
        .with_connect_timeout(Duration::from_millis(cli.connect_timeout_ms))
        .with_expires(cli.expires)
        .with_codec(codec)
}

#[cfg(feature = "metrics")]
fn install_metrics(addr: Option<std::net::SocketAddr>) -> Result<(), String> {
    let Some(addr) = addr else {
        return Ok(());
    };
    metrics_exporter_prometheus::PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .map_err(|e| format!("failed to start metrics exporter on {addr}: {e}"))
}

#[cfg(not(feature = "metrics"))]
fn install_metrics(addr: Option<std::net::SocketAddr>) -> Result<(), String> {
    match addr {
        Some(_) => Err("built without the metrics feature".to_owned()),
        None => Ok(()),
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    // Applications embedding the library should install their own subscriber.
    tracing_subscriber::fmt::init();

    let cli = cli::Cli::parse();
    let uri: MsrpUri = match cli.uri.parse() {
        Ok(uri) => uri,
        Err(e) => {
            error!("invalid relay uri: uri={}, error={e}", cli.uri);
            return ExitCode::FAILURE;
        }
    };
    if let Err(e) = install_metrics(cli.metrics) {
        error!("{e}");
        return ExitCode::FAILURE;
    }

    let relay = Relay::builder(uri)
        .config(relay_config(&cli))
        .connector(TcpConnector)
        .build();
    let server = match RelayServer::bind(cli.listen, relay).await {
        Ok(server) => server,
        Err(e) => {
            error!("relay failed to start: listen={}, error={e}", cli.listen);
            return ExitCode::FAILURE;
        }
    };
    match server.run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("relay stopped: error={e}");
            ExitCode::FAILURE
        }
    }
}
