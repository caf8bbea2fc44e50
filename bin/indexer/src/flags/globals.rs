//! Global arguments for the CLI.

use clap::Parser;
use indexer_cli::{LogArgs, MetricsArgs};

/// Global arguments for the CLI.
#[derive(Parser, Default, Clone, Debug, PartialEq, Eq)]
pub struct GlobalArgs {
    /// Logging arguments.
    #[command(flatten)]
    pub log_args: LogArgs,
    /// Prometheus CLI arguments.
    #[command(flatten)]
    pub metrics: MetricsArgs,
}
