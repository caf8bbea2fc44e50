//! Conversion of chain blocks into indexer records.

use crate::{ChainReader, ChainReaderError};
use alloy_primitives::{Address, B256};
use futures::future::try_join_all;
use indexer_types::{
    Block, Transaction,
    chain::{ChainBlock, ChainReceipt, ChainTransaction},
};
use std::sync::Arc;
use thiserror::Error;
use tracing::debug;

/// Errors that abandon the extraction of a block.
#[derive(Debug, Error)]
pub enum ExtractError {
    /// A chain call failed.
    #[error(transparent)]
    Chain(#[from] ChainReaderError),
    /// The batched receipt call returned the wrong number of receipts.
    #[error("expected {expected} receipts, got {got}")]
    ReceiptCount {
        /// Transactions in the block.
        expected: usize,
        /// Receipts returned.
        got: usize,
    },
    /// A receipt does not belong to the transaction at its position.
    #[error("receipt {index} is for transaction {got}, expected {expected}")]
    ReceiptMismatch {
        /// Position in the block.
        index: usize,
        /// Hash of the transaction at that position.
        expected: B256,
        /// Hash the receipt refers to.
        got: B256,
    },
}

/// The records produced from one block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Extracted {
    /// The block record.
    pub block: Block,
    /// One record per transaction, in block order.
    pub transactions: Vec<Transaction>,
}

/// Builds [`Block`] and [`Transaction`] records from a [`ChainBlock`], resolving receipts and
/// senders through a [`ChainReader`].
#[derive(Debug)]
pub struct BlockExtractor<C: ?Sized> {
    chain: Arc<C>,
}

impl<C: ?Sized> Clone for BlockExtractor<C> {
    fn clone(&self) -> Self {
        Self { chain: Arc::clone(&self.chain) }
    }
}

impl<C> BlockExtractor<C>
where
    C: ChainReader + ?Sized,
{
    /// Creates a new extractor.
    pub const fn new(chain: Arc<C>) -> Self {
        Self { chain }
    }

    /// Extracts every record of `block`. Either all records are produced or none.
    pub async fn extract(&self, block: &ChainBlock) -> Result<Extracted, ExtractError> {
        let hashes: Vec<B256> = block.transactions.iter().map(|tx| tx.hash).collect();

        let receipts = self.chain.batch_receipts(&hashes).await?;
        if receipts.len() != hashes.len() {
            return Err(ExtractError::ReceiptCount { expected: hashes.len(), got: receipts.len() });
        }
        if let Some((index, (expected, receipt))) = hashes
            .iter()
            .zip(&receipts)
            .enumerate()
            .find(|(_, (hash, receipt))| **hash != receipt.transaction_hash)
        {
            return Err(ExtractError::ReceiptMismatch {
                index,
                expected: *expected,
                got: receipt.transaction_hash,
            });
        }

        let senders = try_join_all(
            block
                .transactions
                .iter()
                .zip(0u64..)
                .map(|(tx, index)| self.chain.derive_sender(tx, block.hash, index)),
        )
        .await?;

        let transactions = block
            .transactions
            .iter()
            .zip(receipts.iter().zip(&senders))
            .map(|(tx, (receipt, sender))| transaction_record(tx, receipt, sender, block.hash))
            .collect::<Vec<_>>();

        debug!(
            target: "extractor",
            number = block.number,
            hash = %block.hash,
            transactions = transactions.len(),
            "Extracted block"
        );
        Ok(Extracted { block: block_record(block), transactions })
    }
}

fn block_record(block: &ChainBlock) -> Block {
    Block {
        hash: block.hash.to_string(),
        number: block.number,
        gas_limit: block.gas_limit,
        gas_used: block.gas_used,
        difficulty: block.difficulty.to_string(),
        time: block.timestamp,
        parent_hash: block.parent_hash.to_string(),
        nonce: format!("{:#x}", block.nonce),
        miner: block.beneficiary.to_string(),
        size: block.size,
        root_hash: block.state_root.to_string(),
        uncle_hash: block.ommers_hash.to_string(),
        tx_hash: block.transactions_root.to_string(),
        receipt_hash: block.receipts_root.to_string(),
        extra_data: block.extra_data.clone(),
    }
}

fn transaction_record(
    tx: &ChainTransaction,
    receipt: &ChainReceipt,
    sender: &Address,
    block_hash: B256,
) -> Transaction {
    Transaction {
        hash: tx.hash.to_string(),
        from: sender.to_string(),
        to: tx.to.map(|to| to.to_string()),
        contract: receipt.contract_address.map(|addr| addr.to_string()).unwrap_or_default(),
        value: tx.value.to_string(),
        data: tx.input.clone(),
        gas: tx.gas_limit,
        gas_price: tx.gas_price.to_string(),
        cost: tx.cost().to_string(),
        nonce: tx.nonce,
        status: u64::from(receipt.status),
        block_hash: receipt.block_hash.unwrap_or(block_hash).to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{ChainReaderError, MockChainReader, test_utils};
    use alloy_primitives::{Address, U256, address};
    use rstest::rstest;

    #[tokio::test]
    async fn test_extract_produces_one_record_per_transaction() {
        let block = test_utils::chain_block(100, 3);
        let sender = address!("0x00000000000000000000000000000000000000aa");

        let mut chain = MockChainReader::new();
        chain
            .expect_batch_receipts()
            .times(1)
            .returning(|hashes| Ok(hashes.iter().map(|h| test_utils::receipt(*h)).collect()));
        chain.expect_derive_sender().times(3).returning(move |_, _, _| Ok(sender));

        let extracted = BlockExtractor::new(Arc::new(chain)).extract(&block).await.unwrap();

        assert_eq!(extracted.block.number, 100);
        assert_eq!(extracted.block.hash, block.hash.to_string());
        assert_eq!(extracted.transactions.len(), 3);
        for (record, tx) in extracted.transactions.iter().zip(&block.transactions) {
            assert_eq!(record.hash, tx.hash.to_string());
            assert_eq!(record.from, sender.to_string());
            assert_eq!(record.block_hash, block.hash.to_string());
            assert_eq!(record.status, 1);
        }
    }

    #[tokio::test]
    async fn test_extract_passes_block_hash_and_index_to_sender_derivation() {
        let block = test_utils::chain_block(7, 2);
        let block_hash = block.hash;
        let expected: Vec<_> = block.transactions.iter().map(|tx| tx.hash).collect();

        let mut chain = MockChainReader::new();
        chain
            .expect_batch_receipts()
            .returning(|hashes| Ok(hashes.iter().map(|h| test_utils::receipt(*h)).collect()));
        chain
            .expect_derive_sender()
            .withf(move |tx, hash, index| {
                *hash == block_hash && expected.get(*index as usize) == Some(&tx.hash)
            })
            .times(2)
            .returning(|_, _, _| Ok(Address::ZERO));

        BlockExtractor::new(Arc::new(chain)).extract(&block).await.unwrap();
    }

    #[rstest]
    #[case::too_few(2)]
    #[case::too_many(4)]
    #[tokio::test]
    async fn test_receipt_count_mismatch_produces_nothing(#[case] returned: usize) {
        let block = test_utils::chain_block(5, 3);

        let mut chain = MockChainReader::new();
        chain.expect_batch_receipts().returning(move |_| {
            Ok((0..returned).map(|i| test_utils::receipt(B256::with_last_byte(i as u8))).collect())
        });
        chain.expect_derive_sender().never();

        let err = BlockExtractor::new(Arc::new(chain)).extract(&block).await.unwrap_err();
        assert!(matches!(err, ExtractError::ReceiptCount { expected: 3, got } if got == returned));
    }

    #[tokio::test]
    async fn test_receipt_for_wrong_transaction_is_rejected() {
        let block = test_utils::chain_block(5, 2);

        let mut chain = MockChainReader::new();
        chain.expect_batch_receipts().returning(|hashes| {
            Ok(hashes.iter().rev().map(|h| test_utils::receipt(*h)).collect())
        });
        chain.expect_derive_sender().never();

        let err = BlockExtractor::new(Arc::new(chain)).extract(&block).await.unwrap_err();
        assert!(matches!(err, ExtractError::ReceiptMismatch { index: 0, .. }));
    }

    #[tokio::test]
    async fn test_sender_failure_produces_nothing() {
        let block = test_utils::chain_block(5, 2);

        let mut chain = MockChainReader::new();
        chain
            .expect_batch_receipts()
            .returning(|hashes| Ok(hashes.iter().map(|h| test_utils::receipt(*h)).collect()));
        chain.expect_derive_sender().returning(|_, block_hash, index| {
            Err(ChainReaderError::TransactionNotFound { block_hash, index })
        });

        let err = BlockExtractor::new(Arc::new(chain)).extract(&block).await.unwrap_err();
        assert!(matches!(err, ExtractError::Chain(ChainReaderError::TransactionNotFound { .. })));
    }

    #[tokio::test]
    async fn test_empty_block_yields_block_record_only() {
        let block = test_utils::chain_block(9, 0);

        let mut chain = MockChainReader::new();
        chain.expect_batch_receipts().returning(|_| Ok(Vec::new()));
        chain.expect_derive_sender().never();

        let extracted = BlockExtractor::new(Arc::new(chain)).extract(&block).await.unwrap();
        assert_eq!(extracted.block.number, 9);
        assert!(extracted.transactions.is_empty());
    }

    #[test]
    fn test_transaction_record_fields() {
        let created = address!("0x00000000000000000000000000000000000000cc");
        let tx = ChainTransaction {
            hash: B256::with_last_byte(1),
            to: None,
            value: U256::from(5),
            gas_limit: 21_000,
            gas_price: 2_000_000_000,
            nonce: 3,
            ..Default::default()
        };
        let receipt = ChainReceipt {
            transaction_hash: tx.hash,
            contract_address: Some(created),
            status: false,
            ..Default::default()
        };

        let record = transaction_record(&tx, &receipt, &Address::ZERO, B256::with_last_byte(9));

        assert!(record.is_contract_creation());
        assert_eq!(record.contract, created.to_string());
        assert_eq!(record.value, "5");
        assert_eq!(record.gas_price, "2000000000");
        assert_eq!(record.cost, "42000000000005");
        assert_eq!(record.status, 0);
        assert_eq!(record.block_hash, B256::with_last_byte(9).to_string());
    }

    #[test]
    fn test_block_record_formats_nonce_as_hex() {
        let block =
            ChainBlock { nonce: 0x42, difficulty: U256::from(131_072), ..Default::default() };
        let record = block_record(&block);
        assert_eq!(record.nonce, "0x42");
        assert_eq!(record.difficulty, "131072");
    }
}
