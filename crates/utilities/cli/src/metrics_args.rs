//! Prometheus exporter arguments.

use crate::{PrometheusError, init_prometheus_server};
use clap::Parser;
use std::net::{IpAddr, Ipv4Addr};

/// Prometheus exporter arguments.
#[derive(Parser, Clone, Debug, PartialEq, Eq)]
pub struct MetricsArgs {
    /// Serve Prometheus metrics.
    #[arg(long = "metrics.enabled", default_value_t = false, env = "METRICS_ENABLED")]
    pub enabled: bool,
    /// Address the metrics server listens on.
    #[arg(
        long = "metrics.addr",
        default_value_t = IpAddr::V4(Ipv4Addr::UNSPECIFIED),
        env = "METRICS_ADDR"
    )]
    pub addr: IpAddr,
    /// Port the metrics server listens on.
    #[arg(long = "metrics.port", default_value_t = Self::DEFAULT_PORT, env = "METRICS_PORT")]
    pub port: u16,
}

impl MetricsArgs {
    /// Default metrics port.
    pub const DEFAULT_PORT: u16 = 9090;

    /// Starts the exporter if enabled. Returns whether it was started.
    pub fn init_metrics(&self) -> Result<bool, PrometheusError> {
        if !self.enabled {
            return Ok(false);
        }
        init_prometheus_server(self.addr, self.port)?;
        Ok(true)
    }
}

impl Default for MetricsArgs {
    fn default() -> Self {
        Self { enabled: false, addr: IpAddr::V4(Ipv4Addr::UNSPECIFIED), port: Self::DEFAULT_PORT }
    }
}
