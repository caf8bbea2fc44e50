use indexer_core::{ConsumerConfig, ListenerConfig, SyncerConfig};
use std::{
    net::{Ipv4Addr, SocketAddr},
    time::Duration,
};

/// Configuration of the [`IndexerService`](crate::IndexerService).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceConfig {
    /// Address the read API listens on.
    pub http_addr: SocketAddr,
    /// Whether to run the ingestion workers. The read API always runs.
    pub sync: bool,
    /// Head listener settings.
    pub listener: ListenerConfig,
    /// Historical syncer settings.
    pub syncer: SyncerConfig,
    /// Event consumer settings.
    pub consumer: ConsumerConfig,
    /// How long the read API may take to finish in-flight requests on shutdown.
    pub drain_timeout: Duration,
}

impl ServiceConfig {
    /// Default read API port.
    pub const DEFAULT_PORT: u16 = 8080;
    /// Default shutdown drain window.
    pub const DEFAULT_DRAIN_TIMEOUT: Duration = Duration::from_secs(10);
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            http_addr: SocketAddr::from((Ipv4Addr::UNSPECIFIED, Self::DEFAULT_PORT)),
            sync: false,
            listener: ListenerConfig::default(),
            syncer: SyncerConfig::default(),
            consumer: ConsumerConfig::default(),
            drain_timeout: Self::DEFAULT_DRAIN_TIMEOUT,
        }
    }
}
