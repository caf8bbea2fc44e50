//! Contains the indexer CLI.

use crate::{
    commands::{NodeCommand, SeedCommand},
    flags::GlobalArgs,
};
use anyhow::Result;
use clap::{Parser, Subcommand};
use indexer_cli::cli_styles;
use std::future::Future;

/// Subcommands for the CLI.
#[derive(Debug, Clone, Subcommand)]
pub enum Commands {
    /// Runs the indexer.
    #[command(alias = "n")]
    Node(NodeCommand),
    /// Clears storage and seeds synthetic records.
    Seed(SeedCommand),
}

/// The indexer CLI.
#[derive(Parser, Clone, Debug)]
#[command(author, version, about, styles = cli_styles(), long_about = None)]
pub struct Cli {
    /// Global arguments for the CLI.
    #[command(flatten)]
    pub global: GlobalArgs,
    /// The subcommand to run.
    #[command(subcommand)]
    pub subcommand: Commands,
}

impl Cli {
    /// Runs the CLI.
    pub fn run(self) -> Result<()> {
        // Initialize the telemetry stack.
        self.global.log_args.init_tracing_subscriber(None)?;
        self.global.metrics.init_metrics()?;

        match self.subcommand {
            Commands::Node(node) => Self::run_until_done(node.run(&self.global)),
            Commands::Seed(seed) => Self::run_until_done(seed.run(&self.global)),
        }
    }

    /// Runs `fut` to completion on a fresh runtime.
    pub fn run_until_done<F>(fut: F) -> Result<()>
    where
        F: Future<Output = Result<()>>,
    {
        let rt = Self::tokio_runtime()?;
        rt.block_on(fut)
    }

    /// Creates a new default tokio multi-thread [Runtime](tokio::runtime::Runtime) with all
    /// features enabled
    pub fn tokio_runtime() -> Result<tokio::runtime::Runtime, std::io::Error> {
        tokio::runtime::Builder::new_multi_thread().enable_all().build()
    }
}
