//! The canonical [`Transaction`] record.

use alloy_primitives::Bytes;
use serde::{Deserialize, Serialize};

/// A mirrored transaction.
///
/// `block_hash` references the owning [`crate::Block`] but is not enforced as a foreign key:
/// the transaction may reach storage before its block does.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Transaction {
    /// The transaction hash, 0x-prefixed hex.
    pub hash: String,
    /// The sender, recovered from the transaction signature.
    pub from: String,
    /// The recipient. `None` for contract creations.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub to: Option<String>,
    /// The address of the contract created by this transaction, empty if none.
    pub contract: String,
    /// The transferred value in wei, as a decimal string.
    pub value: String,
    /// The transaction input.
    pub data: Bytes,
    /// The gas limit.
    pub gas: u64,
    /// The gas price (or fee cap for dynamic fee transactions) in wei, as a decimal string.
    pub gas_price: String,
    /// `gas * gas_price + value`, in wei, as a decimal string.
    pub cost: String,
    /// The sender nonce.
    pub nonce: u64,
    /// The execution status, `1` on success and `0` on failure.
    pub status: u64,
    /// The hash of the block containing the transaction.
    pub block_hash: String,
}

impl Transaction {
    /// Returns true if the transaction created a contract.
    pub const fn is_contract_creation(&self) -> bool {
        self.to.is_none()
    }
}
