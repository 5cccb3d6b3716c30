//! Command line interface for the `msrp-relay` daemon.
//!
//! Shared with the build script, which renders the manual page from it.

use std::net::SocketAddr;

use clap::Parser;

/// Command line arguments for the `msrp-relay` binary.
#[derive(Debug, Parser)]
#[command(
    name = "msrp-relay",
    version,
    about = "MSRP relay forwarding chunks between hops"
)]
pub struct Cli {
    /// Address to accept hop connections on.
    #[arg(short, long, default_value = "0.0.0.0:2855")]
    pub listen: SocketAddr,

    /// URI identifying this relay in To-Path and From-Path headers.
    #[arg(short, long)]
    pub uri: String,

    /// Milliseconds a forwarded SEND may wait for the next hop's response.
    #[arg(long, default_value_t = 30_000)]
    pub transaction_timeout_ms: u64,

    /// Milliseconds allowed for opening a connection to a next hop.
    #[arg(long, default_value_t = 10_000)]
    pub connect_timeout_ms: u64,

    /// Largest chunk body accepted from a peer, in bytes.
    #[arg(long)]
    pub max_chunk_size: Option<usize>,

    /// Lifetime in seconds granted to clients that AUTH.
    #[arg(long, default_value_t = 600)]
    pub expires: u32,

    /// Serve Prometheus metrics on this address.
    #[arg(long)]
    pub metrics: Option<SocketAddr>,
}

#[cfg(test)]
mod tests {
    use clap::Parser;

    use super::Cli;

    #[test]
    fn parses_relay_options() {
        let cli = Cli::parse_from([
            "msrp-relay",
            "--uri",
            "msrp://relay.example.net:2855/r;tcp",
            "--listen",
            "127.0.0.1:9000",
            "--transaction-timeout-ms",
            "5000",
            "--max-chunk-size",
            "65536",
        ]);
        assert_eq!(cli.uri, "msrp://relay.example.net:2855/r;tcp");
        assert_eq!(cli.listen.port(), 9000);
        assert_eq!(cli.transaction_timeout_ms, 5000);
        assert_eq!(cli.max_chunk_size, Some(65536));
        assert_eq!(cli.expires, 600);
        assert!(cli.metrics.is_none());
    }

    #[test]
    fn uri_is_required() {
        assert!(Cli::try_parse_from(["msrp-relay"]).is_err());
    }
}
