//! Node Subcommand

use crate::flags::{BrokerArgs, GlobalArgs, StorageArgs};
use anyhow::{Context, Result};
use clap::Parser;
use indexer_core::{AlloyChainReader, ConsumerConfig, ListenerConfig, SyncerConfig};
use indexer_service::{Components, IndexerService, ServiceConfig};
use std::{
    net::{IpAddr, Ipv4Addr, SocketAddr},
    sync::Arc,
    time::Duration,
};
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

/// The `node` Subcommand
///
/// Serves the read API and, with `--sync`, follows the chain head and backfills history into
/// storage.
///
/// # Usage
///
/// ```sh
/// evm-indexer node [FLAGS] [OPTIONS]
/// ```
#[derive(Parser, Debug, Clone, PartialEq, Eq)]
#[command(about = "Runs the indexer")]
pub struct NodeCommand {
    /// Port of the read API.
    #[arg(long, default_value_t = ServiceConfig::DEFAULT_PORT, env = "PORT")]
    pub port: u16,
    /// Address the read API binds to.
    #[arg(
        long = "http.addr",
        default_value_t = IpAddr::V4(Ipv4Addr::UNSPECIFIED),
        env = "HTTP_ADDR"
    )]
    pub http_addr: IpAddr,
    /// Run the ingestion workers. Without it only the read API is served.
    #[arg(long, default_value_t = false, env = "SYNC")]
    pub sync: bool,
    /// Websocket URL of the chain node.
    #[arg(long = "node-url", env = "NODE_URL")]
    pub node_url: String,
    /// Storage flags.
    #[command(flatten)]
    pub storage: StorageArgs,
    /// Broker flags.
    #[command(flatten)]
    pub broker: BrokerArgs,
    /// First delay before the head listener resubscribes, in milliseconds.
    #[arg(long = "listener.initial-backoff-ms", default_value_t = 1_000)]
    pub listener_initial_backoff_ms: u64,
    /// Upper bound of the head listener resubscribe delay, in milliseconds.
    #[arg(long = "listener.max-backoff-ms", default_value_t = 30_000)]
    pub listener_max_backoff_ms: u64,
    /// Delay before the historical syncer retries a failed block, in milliseconds.
    #[arg(long = "syncer.retry-interval-ms", default_value_t = 500)]
    pub syncer_retry_interval_ms: u64,
    /// Pause of the event consumer after a broker or storage error, in milliseconds.
    #[arg(long = "consumer.error-backoff-ms", default_value_t = 1_000)]
    pub consumer_error_backoff_ms: u64,
    /// Time the read API gets to finish in-flight requests on shutdown, in seconds.
    #[arg(long = "shutdown.drain-secs", default_value_t = 10)]
    pub drain_secs: u64,
}

impl NodeCommand {
    /// Builds the [`ServiceConfig`] from the flags.
    pub fn service_config(&self) -> ServiceConfig {
        ServiceConfig {
            http_addr: SocketAddr::new(self.http_addr, self.port),
            sync: self.sync,
            listener: ListenerConfig::new(
                Duration::from_millis(self.listener_initial_backoff_ms),
                Duration::from_millis(self.listener_max_backoff_ms),
            ),
            syncer: SyncerConfig {
                retry_interval: Duration::from_millis(self.syncer_retry_interval_ms),
            },
            consumer: ConsumerConfig {
                error_backoff: Duration::from_millis(self.consumer_error_backoff_ms),
            },
            drain_timeout: Duration::from_secs(self.drain_secs),
        }
    }

    /// Runs the subcommand until SIGINT or SIGTERM, or until a task fails.
    pub async fn run(self, args: &GlobalArgs) -> Result<()> {
        let config = self.service_config();
        info!(
            target: "orchestrator",
            addr = %config.http_addr,
            sync = config.sync,
            storage = ?self.storage.kind,
            broker = ?self.broker.kind,
            "Starting indexer"
        );

        let components = self.connect().await?;
        if args.metrics.enabled {
            indexer_service::init_metrics();
        }

        let cancellation = CancellationToken::new();
        let signal = cancellation.clone();
        tokio::spawn(async move {
            match shutdown_signal().await {
                Ok(()) => info!(target: "orchestrator", "Received shutdown signal"),
                Err(err) => error!(target: "orchestrator", %err, "Failed to listen for signals"),
            }
            signal.cancel();
        });

        IndexerService::new(config, components).run(cancellation).await?;
        Ok(())
    }

    /// Connects every external dependency. Any failure aborts startup.
    async fn connect(&self) -> Result<Components> {
        let chain = AlloyChainReader::connect(&self.node_url)
            .await
            .with_context(|| format!("failed to connect to chain node at {}", self.node_url))?;
        let storage = self.storage.connect().await?;
        let (publisher, subscriber) = self.broker.connect()?;
        Ok(Components { chain: Arc::new(chain), storage, publisher, subscriber })
    }
}

/// Resolves on SIGINT, or SIGTERM on unix.
async fn shutdown_signal() -> std::io::Result<()> {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};

        let mut terminate = signal(SignalKind::terminate())?;
        tokio::select! {
            interrupted = tokio::signal::ctrl_c() => interrupted,
            _ = terminate.recv() => Ok(()),
        }
    }

    #[cfg(not(unix))]
    tokio::signal::ctrl_c().await
}
