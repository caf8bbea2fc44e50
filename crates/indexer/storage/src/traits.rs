use crate::StorageError;
use async_trait::async_trait;
use indexer_types::{Block, Transaction};
use std::fmt::Debug;

/// Write side of the storage contract, used by the event consumer.
///
/// Both inserts are idempotent: writing a record whose hash is already stored is a no-op and
/// returns `Ok(())`.
#[async_trait]
pub trait StorageWriter: Debug + Send + Sync {
    /// Stores a [`Block`].
    async fn insert_block(&self, block: &Block) -> Result<(), StorageError>;

    /// Stores a [`Transaction`].
    async fn insert_tx(&self, tx: &Transaction) -> Result<(), StorageError>;
}

/// Read side of the storage contract, used by the syncer and the read API.
#[async_trait]
pub trait StorageReader: Debug + Send + Sync {
    /// Returns the lowest-numbered stored block.
    ///
    /// # Returns
    /// * `Err(StorageError::NotFound)` if no block is stored yet.
    async fn first_block(&self) -> Result<Block, StorageError>;

    /// Returns the block with the given number.
    async fn block_by_number(&self, number: u64) -> Result<Block, StorageError>;

    /// Returns every stored block, ordered by number.
    async fn blocks(&self) -> Result<Vec<Block>, StorageError>;

    /// Returns the transaction with the given hash.
    async fn tx_by_hash(&self, hash: &str) -> Result<Transaction, StorageError>;

    /// Returns every stored transaction.
    async fn txs(&self) -> Result<Vec<Transaction>, StorageError>;
}

/// A full storage handle, owned by the orchestrator.
#[async_trait]
pub trait Storage: StorageReader + StorageWriter {
    /// Deletes every block and transaction. Maintenance only, never called by the pipeline.
    async fn clear(&self) -> Result<(), StorageError>;

    /// Releases the underlying connections. Further calls fail with [`StorageError::Closed`].
    async fn close(&self) -> Result<(), StorageError>;
}
