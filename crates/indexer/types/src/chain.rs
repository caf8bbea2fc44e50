//! Chain-side inputs to the extractor.
//!
//! These mirror the subset of a node's RPC responses the indexer needs. The chain reader builds
//! them, which keeps every other stage independent of the RPC response types.

use alloy_primitives::{Address, B256, Bytes, U256};

/// A new chain head announced by the node.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ChainHeader {
    /// The block hash.
    pub hash: B256,
    /// The block number.
    pub number: u64,
}

/// A full block, with its transactions, as returned by the node.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChainBlock {
    /// The block hash.
    pub hash: B256,
    /// The block number.
    pub number: u64,
    /// The parent block hash.
    pub parent_hash: B256,
    /// The uncles (ommers) hash.
    pub ommers_hash: B256,
    /// The block producer.
    pub beneficiary: Address,
    /// The state root.
    pub state_root: B256,
    /// The transactions root.
    pub transactions_root: B256,
    /// The receipts root.
    pub receipts_root: B256,
    /// The block difficulty.
    pub difficulty: U256,
    /// The gas limit.
    pub gas_limit: u64,
    /// The gas used.
    pub gas_used: u64,
    /// The block timestamp.
    pub timestamp: u64,
    /// The extra data field.
    pub extra_data: Bytes,
    /// The block nonce.
    pub nonce: u64,
    /// The encoded block size in bytes.
    pub size: u64,
    /// The block transactions, in block order.
    pub transactions: Vec<ChainTransaction>,
}

/// A transaction as included in a [`ChainBlock`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChainTransaction {
    /// The transaction hash.
    pub hash: B256,
    /// The sender, when the node reported it alongside the transaction.
    pub sender: Option<Address>,
    /// The recipient, `None` for contract creations.
    pub to: Option<Address>,
    /// The transferred value.
    pub value: U256,
    /// The transaction input.
    pub input: Bytes,
    /// The gas limit.
    pub gas_limit: u64,
    /// The gas price, or the max fee per gas for dynamic fee transactions.
    pub gas_price: u128,
    /// The sender nonce.
    pub nonce: u64,
}

impl ChainTransaction {
    /// The maximum amount of wei this transaction can spend: `gas_limit * gas_price + value`.
    pub fn cost(&self) -> U256 {
        U256::from(self.gas_limit)
            .saturating_mul(U256::from(self.gas_price))
            .saturating_add(self.value)
    }
}

/// The execution receipt of a transaction.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChainReceipt {
    /// The hash of the transaction this receipt belongs to.
    pub transaction_hash: B256,
    /// The position of the transaction in its block.
    pub transaction_index: u64,
    /// The hash of the block containing the transaction.
    pub block_hash: Option<B256>,
    /// The address of the created contract, if any.
    pub contract_address: Option<Address>,
    /// Whether execution succeeded.
    pub status: bool,
}
