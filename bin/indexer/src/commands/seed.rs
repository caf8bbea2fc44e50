//! Seed Subcommand

use crate::flags::{GlobalArgs, StorageArgs};
use alloy_primitives::Bytes;
use anyhow::{Context, Result};
use clap::Parser;
use indexer_storage::Storage;
use indexer_types::{Block, Transaction};
use tracing::info;

/// Number of synthetic blocks written by [`SeedCommand`].
pub const SEED_BLOCKS: u64 = 500;

/// Number of synthetic transactions written by [`SeedCommand`].
pub const SEED_TXS: u64 = 2_000;

/// The `seed` Subcommand
///
/// Replaces the content of storage with synthetic blocks and transactions, for working on the
/// read API without a chain node.
///
/// # Usage
///
/// ```sh
/// evm-indexer seed --db-url postgres://localhost/indexer
/// ```
#[derive(Parser, Debug, Clone, PartialEq, Eq)]
#[command(about = "Clears storage and fills it with synthetic records")]
pub struct SeedCommand {
    /// Storage flags.
    #[command(flatten)]
    pub storage: StorageArgs,
}

impl SeedCommand {
    /// Runs the subcommand.
    pub async fn run(self, _args: &GlobalArgs) -> Result<()> {
        let storage = self.storage.connect().await?;
        let seeded = seed(storage.as_ref()).await;
        storage.close().await.context("failed to close storage")?;
        seeded
    }
}

/// Clears `storage` and writes [`SEED_BLOCKS`] blocks and [`SEED_TXS`] transactions.
pub async fn seed(storage: &dyn Storage) -> Result<()> {
    storage.clear().await.context("failed to clear storage")?;
    info!(target: "storage", "Storage cleared");

    for number in 0..SEED_BLOCKS {
        storage.insert_block(&seed_block(number)).await.context("failed to seed blocks")?;
    }
    info!(target: "storage", count = SEED_BLOCKS, "Blocks seeded");

    for index in 0..SEED_TXS {
        storage.insert_tx(&seed_tx(index)).await.context("failed to seed transactions")?;
    }
    info!(target: "storage", count = SEED_TXS, "Transactions seeded");
    Ok(())
}

/// A 32 byte hex string starting with the decimal digits of `n`.
fn seed_hash(n: u64) -> String {
    format!("0x{n:04}{}", "efabcd".repeat(10))
}

/// A 20 byte hex address ending with the decimal digits of `n`.
fn seed_address(n: u64) -> String {
    format!("0x{:036}{n:04}", 0)
}

fn seed_block(number: u64) -> Block {
    Block {
        hash: seed_hash(number),
        number,
        gas_limit: 8_000_000 + number,
        gas_used: 7_500_000 + number,
        difficulty: (1_000_000 + number).to_string(),
        time: 1_627_891_200 + number,
        parent_hash: seed_hash(number.saturating_sub(1)),
        nonce: "0x0000000000000000".to_string(),
        miner: seed_address(number),
        size: 1_000 + number,
        root_hash: seed_hash(number),
        uncle_hash: seed_hash(number),
        tx_hash: seed_hash(number),
        receipt_hash: seed_hash(number),
        extra_data: Bytes::from(format!("extra data {number}").into_bytes()),
    }
}

/// Even transactions are transfers, odd ones create a contract.
fn seed_tx(index: u64) -> Transaction {
    let transfer = index % 2 == 0;
    let value = 200 + index;
    let gas = 500_000 + index;
    let gas_price = 1_000_000 + index;
    Transaction {
        hash: seed_hash(index),
        from: seed_address(index),
        to: transfer.then(|| seed_address(index + 1)),
        contract: if transfer { String::new() } else { seed_address(SEED_TXS + index) },
        value: value.to_string(),
        data: Bytes::from(format!("some data {index}").into_bytes()),
        gas,
        gas_price: gas_price.to_string(),
        cost: (u128::from(gas) * u128::from(gas_price) + u128::from(value)).to_string(),
        nonce: 0,
        status: 1,
        block_hash: seed_hash(index % SEED_BLOCKS),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use indexer_storage::{MemoryStorage, StorageReader, StorageWriter};

    #[test]
    fn test_seed_record_shapes() {
        assert_eq!(seed_hash(7).len(), 66);
        assert!(seed_hash(7).starts_with("0x0007efabcd"));
        assert_eq!(seed_address(42).len(), 42);
        assert!(seed_address(42).ends_with("0042"));

        let transfer = seed_tx(4);
        assert_eq!(transfer.to.as_deref(), Some(seed_address(5).as_str()));
        assert!(transfer.contract.is_empty());
        assert!(seed_tx(5).is_contract_creation());
        assert_eq!(seed_tx(501).block_hash, seed_hash(1));
    }

    #[tokio::test]
    async fn test_seed_replaces_storage_content() {
        let storage = MemoryStorage::new();
        let stale = Block { hash: "0xstale".to_string(), number: 9_999, ..Default::default() };
        storage.insert_block(&stale).await.unwrap();

        seed(&storage).await.unwrap();

        assert_eq!(storage.block_count().await, SEED_BLOCKS as usize);
        assert_eq!(storage.tx_count().await, SEED_TXS as usize);
        assert_eq!(storage.first_block().await.unwrap().number, 0);
        assert!(storage.block_by_number(9_999).await.unwrap_err().is_not_found());

        let tx = storage.tx_by_hash(&seed_hash(10)).await.unwrap();
        assert_eq!(tx.cost, (500_010u128 * 1_000_010 + 210).to_string());
    }
}
