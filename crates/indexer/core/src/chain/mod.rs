//! Access to the chain node.

use alloy_primitives::{Address, B256};
use alloy_transport::TransportError;
use async_trait::async_trait;
use indexer_types::chain::{ChainBlock, ChainHeader, ChainReceipt, ChainTransaction};
use std::fmt::Debug;
use thiserror::Error;

mod rpc;
pub use rpc::AlloyChainReader;

/// Errors returned by a [`ChainReader`].
#[derive(Debug, Error)]
pub enum ChainReaderError {
    /// The RPC call failed.
    #[error(transparent)]
    Transport(#[from] TransportError),
    /// The transport cannot carry subscriptions. Retrying does not help.
    #[error("transport does not support subscriptions")]
    PubsubUnavailable,
    /// The node does not know the requested block.
    #[error("block not found: {0}")]
    BlockNotFound(String),
    /// The node returned no receipt for a transaction.
    #[error("receipt not found for transaction {0}")]
    MissingReceipt(B256),
    /// The node has no transaction at the given position.
    #[error("no transaction at index {index} of block {block_hash}")]
    TransactionNotFound {
        /// The block that was queried.
        block_hash: B256,
        /// The queried position.
        index: u64,
    },
    /// The transaction at the given position is not the expected one.
    #[error("transaction at index {index} is {found}, expected {expected}")]
    SenderMismatch {
        /// The queried position.
        index: u64,
        /// The expected transaction hash.
        expected: B256,
        /// The transaction hash the node returned.
        found: B256,
    },
}

/// A live stream of new chain heads.
///
/// At most one subscription is open per listener. It must be unsubscribed before it is dropped
/// by a well behaved caller; implementations also unsubscribe on drop.
#[async_trait]
pub trait HeadSubscription: Debug + Send {
    /// Waits for the next header.
    ///
    /// # Returns
    /// * `None` once the stream is closed.
    /// * `Some(Err(_))` if the connection failed. The subscription is unusable afterwards.
    async fn next_header(&mut self) -> Option<Result<ChainHeader, ChainReaderError>>;

    /// Cancels the subscription on the node. Idempotent.
    fn unsubscribe(&mut self);
}

/// Read access to a chain node.
#[cfg_attr(any(test, feature = "test-utils"), mockall::automock)]
#[async_trait]
pub trait ChainReader: Debug + Send + Sync {
    /// Opens a new-heads subscription.
    async fn subscribe_new_heads(&self) -> Result<Box<dyn HeadSubscription>, ChainReaderError>;

    /// Fetches a block with its full transactions by hash.
    async fn block_by_hash(&self, hash: B256) -> Result<ChainBlock, ChainReaderError>;

    /// Fetches a block with its full transactions by number. `None` fetches the current head.
    async fn block_by_number(&self, number: Option<u64>) -> Result<ChainBlock, ChainReaderError>;

    /// Fetches the receipts of `hashes` in one batched round trip, in request order.
    async fn batch_receipts(&self, hashes: &[B256]) -> Result<Vec<ChainReceipt>, ChainReaderError>;

    /// Derives the sender of `tx`, the transaction at `index` in block `block_hash`.
    async fn derive_sender(
        &self,
        tx: &ChainTransaction,
        block_hash: B256,
        index: u64,
    ) -> Result<Address, ChainReaderError>;
}
