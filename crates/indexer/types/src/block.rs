//! The canonical [`Block`] record.

use alloy_primitives::Bytes;
use serde::{Deserialize, Serialize};

/// A mirrored block.
///
/// Blocks are identified by their hash and are never mutated once created. Inserting the same
/// block twice must leave storage unchanged.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Block {
    /// The block hash, 0x-prefixed hex.
    pub hash: String,
    /// The block number.
    pub number: u64,
    /// The gas limit of the block.
    pub gas_limit: u64,
    /// The gas used by all transactions in the block.
    pub gas_used: u64,
    /// The block difficulty, as a decimal string.
    pub difficulty: String,
    /// The block timestamp, in seconds.
    pub time: u64,
    /// The hash of the parent block.
    pub parent_hash: String,
    /// The block nonce, as a 0x-prefixed hex quantity.
    pub nonce: String,
    /// The address of the block producer.
    pub miner: String,
    /// The encoded size of the block, in bytes.
    pub size: u64,
    /// The state root.
    pub root_hash: String,
    /// The uncles (ommers) hash.
    pub uncle_hash: String,
    /// The transactions root.
    pub tx_hash: String,
    /// The receipts root.
    pub receipt_hash: String,
    /// The opaque extra data field.
    pub extra_data: Bytes,
}
