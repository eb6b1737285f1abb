use std::sync::Arc;
use std::time::Duration;

use anyhow::anyhow;
use btc_handshake::{ChecksumPolicy, Client, ClientConfig, Network};
use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, info_span};
use tracing_subscriber::EnvFilter;

/// Connects to a Bitcoin node, completes the version handshake and keeps
/// the connection alive until interrupted.
#[derive(Parser, Debug)]
#[command(name = "btc-handshake", version, about)]
struct Cli {
    /// Host name or IP of the node.
    #[arg(long, default_value = "127.0.0.1")]
    host: String,

    /// Port of the node. Defaults to the network's standard port.
    #[arg(long)]
    port: Option<u16>,

    /// mainnet, testnet3, regtest or signet.
    #[arg(long, default_value_t = Network::Regtest)]
    network: Network,

    /// Seconds to wait for each handshake message. 0 waits forever.
    #[arg(long, default_value_t = 60)]
    handshake_timeout: u64,

    /// Seconds of silence tolerated once connected. 0 waits forever.
    #[arg(long, default_value_t = 20 * 60)]
    read_timeout: u64,

    /// Accept frames without recomputing their checksum.
    #[arg(long)]
    trust_checksum: bool,

    /// Log filter used when RUST_LOG is not set.
    #[arg(long, default_value = "debug")]
    log_level: String,
}

impl Cli {
    fn client_config(&self) -> ClientConfig {
        let checksum = if self.trust_checksum {
            ChecksumPolicy::Trust
        } else {
            ChecksumPolicy::Verify
        };

        ClientConfig::default()
            .with_network(self.network)
            .with_handshake_timeout(seconds(self.handshake_timeout))
            .with_read_timeout(seconds(self.read_timeout))
            .with_checksum(checksum)
    }
}

fn seconds(secs: u64) -> Option<Duration> {
    (secs > 0).then(|| Duration::from_secs(secs))
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&cli.log_level))
        .unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    if let Err(err) = run(cli).await {
        error!("connection error: {err:#}");
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let port = cli.port.unwrap_or(cli.network.default_port());
    let span = info_span!("client", host = %cli.host, port, network = %cli.network);
    let client = Arc::new(Client::new(cli.host.clone(), port, cli.client_config(), span));

    info!("starting bitcoin client");
    let mut connection = tokio::spawn({
        let client = Arc::clone(&client);
        async move { client.connect(CancellationToken::new()).await }
    });

    let err = tokio::select! {
        joined = &mut connection => joined?,
        _ = tokio::signal::ctrl_c() => {
            info!("interrupt signal received");
            info!("shutting down client");
            client.disconnect();
            connection.await?
        }
    };

    if err.is_cancelled() {
        Ok(())
    } else {
        Err(anyhow!(err))
    }
}
