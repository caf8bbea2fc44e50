//! Logging arguments and the global tracing subscriber.

use crate::CliResult;
use clap::{ArgAction, Parser, ValueEnum};
use tracing::level_filters::LevelFilter;
use tracing_subscriber::{
    EnvFilter, Layer, Registry, layer::SubscriberExt, util::SubscriberInitExt,
};

/// Output format of the log lines.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    /// Human readable lines.
    #[default]
    Full,
    /// One JSON object per line.
    Json,
}

/// Logging arguments.
#[derive(Parser, Default, Clone, Debug, PartialEq, Eq)]
pub struct LogArgs {
    /// Verbosity level. `-v` logs debug output, `-vv` traces. `RUST_LOG` takes precedence.
    #[arg(long = "verbosity", short = 'v', action = ArgAction::Count, global = true)]
    pub v: u8,
    /// Log line format.
    #[arg(long = "log.format", default_value = "full", env = "LOG_FORMAT", global = true)]
    pub format: LogFormat,
}

impl LogArgs {
    /// The default level for this verbosity.
    pub const fn level(&self) -> LevelFilter {
        match self.v {
            0 => LevelFilter::INFO,
            1 => LevelFilter::DEBUG,
            _ => LevelFilter::TRACE,
        }
    }

    /// Installs the global tracing subscriber.
    pub fn init_tracing_subscriber(&self, env_filter: Option<EnvFilter>) -> CliResult<()> {
        init_tracing_subscriber(self.level(), self.format, env_filter)
    }
}

/// Installs the global tracing subscriber.
///
/// Without an explicit `env_filter`, `RUST_LOG` is read and falls back to `level`.
pub fn init_tracing_subscriber(
    level: LevelFilter,
    format: LogFormat,
    env_filter: Option<EnvFilter>,
) -> CliResult<()> {
    let filter = env_filter.unwrap_or_else(|| {
        EnvFilter::builder().with_default_directive(level.into()).from_env_lossy()
    });

    let fmt = match format {
        LogFormat::Full => tracing_subscriber::fmt::layer().boxed(),
        LogFormat::Json => tracing_subscriber::fmt::layer().json().boxed(),
    };

    Registry::default().with(fmt).with(filter).try_init()?;
    Ok(())
}
