//! Storage backend flags.

use anyhow::Result;
use clap::{Parser, ValueEnum};
use indexer_storage::{MemoryStorage, Storage};
use std::sync::Arc;
use tracing::warn;

/// The storage backend to run on.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum StorageKind {
    /// A Postgres database reached through `--db-url`.
    #[default]
    Postgres,
    /// Process memory. Everything is lost on exit.
    Memory,
}

/// Storage backend flags.
#[derive(Parser, Clone, Debug, PartialEq, Eq)]
pub struct StorageArgs {
    /// The storage backend.
    #[arg(id = "storage", long = "storage", value_enum, default_value_t = StorageKind::Postgres, env = "STORAGE")]
    pub kind: StorageKind,
    /// Postgres connection string. Required with `--storage postgres`.
    #[arg(long = "db-url", env = "DB_URL")]
    pub db_url: Option<String>,
    /// Size of the Postgres connection pool.
    #[arg(long = "db.max-connections", default_value_t = 10, env = "DB_MAX_CONNECTIONS")]
    pub max_connections: u32,
}

impl Default for StorageArgs {
    fn default() -> Self {
        Self { kind: StorageKind::default(), db_url: None, max_connections: 10 }
    }
}

impl StorageArgs {
    /// Opens the configured backend.
    pub async fn connect(&self) -> Result<Arc<dyn Storage>> {
        match self.kind {
            StorageKind::Memory => {
                warn!(target: "storage", "Using in-memory storage, records are lost on exit");
                Ok(Arc::new(MemoryStorage::new()))
            }
            StorageKind::Postgres => self.connect_postgres().await,
        }
    }

    #[cfg(feature = "postgres")]
    async fn connect_postgres(&self) -> Result<Arc<dyn Storage>> {
        use anyhow::Context;

        let url = self.db_url.as_deref().context("--db-url is required for postgres storage")?;
        let storage = indexer_storage::PostgresStorage::connect(url, self.max_connections)
            .await
            .context("failed to connect to postgres")?;
        Ok(Arc::new(storage))
    }

    #[cfg(not(feature = "postgres"))]
    async fn connect_postgres(&self) -> Result<Arc<dyn Storage>> {
        anyhow::bail!("postgres storage requires the `postgres` feature")
    }
}
