use crate::{Storage, StorageError, StorageReader, StorageWriter};
use async_trait::async_trait;
use indexer_types::{Block, Transaction};
use std::collections::{BTreeMap, HashMap};
use tokio::sync::RwLock;
use tracing::{debug, warn};

/// In-process [`Storage`] implementation.
///
/// Used by tests and by deployments that run with `--storage memory`. Inserts are idempotent on
/// the record hash. A second block with an already stored number is ignored.
#[derive(Debug, Default)]
pub struct MemoryStorage {
    inner: RwLock<Inner>,
}

#[derive(Debug, Default)]
struct Inner {
    closed: bool,
    blocks: HashMap<String, Block>,
    numbers: BTreeMap<u64, String>,
    txs: Vec<Transaction>,
    tx_index: HashMap<String, usize>,
}

impl Inner {
    const fn ensure_open(&self) -> Result<(), StorageError> {
        if self.closed {
            return Err(StorageError::Closed);
        }
        Ok(())
    }
}

impl MemoryStorage {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored blocks.
    pub async fn block_count(&self) -> usize {
        self.inner.read().await.blocks.len()
    }

    /// Number of stored transactions.
    pub async fn tx_count(&self) -> usize {
        self.inner.read().await.txs.len()
    }
}

#[async_trait]
impl StorageWriter for MemoryStorage {
    async fn insert_block(&self, block: &Block) -> Result<(), StorageError> {
        let mut inner = self.inner.write().await;
        inner.ensure_open()?;

        if inner.blocks.contains_key(&block.hash) {
            debug!(target: "storage", hash = %block.hash, "Block already stored");
            return Ok(());
        }
        if let Some(stored) = inner.numbers.get(&block.number) {
            // First write wins. Reorgs are not tracked.
            warn!(
                target: "storage",
                number = block.number,
                stored = %stored,
                incoming = %block.hash,
                "Ignoring block with an already stored number"
            );
            return Ok(());
        }

        inner.numbers.insert(block.number, block.hash.clone());
        inner.blocks.insert(block.hash.clone(), block.clone());
        Ok(())
    }

    async fn insert_tx(&self, tx: &Transaction) -> Result<(), StorageError> {
        let mut inner = self.inner.write().await;
        inner.ensure_open()?;

        if inner.tx_index.contains_key(&tx.hash) {
            debug!(target: "storage", hash = %tx.hash, "Transaction already stored");
            return Ok(());
        }

        let idx = inner.txs.len();
        inner.tx_index.insert(tx.hash.clone(), idx);
        inner.txs.push(tx.clone());
        Ok(())
    }
}

#[async_trait]
impl StorageReader for MemoryStorage {
    async fn first_block(&self) -> Result<Block, StorageError> {
        let inner = self.inner.read().await;
        inner.ensure_open()?;

        inner
            .numbers
            .values()
            .next()
            .and_then(|hash| inner.blocks.get(hash))
            .cloned()
            .ok_or_else(|| StorageError::NotFound("no blocks stored".to_string()))
    }

    async fn block_by_number(&self, number: u64) -> Result<Block, StorageError> {
        let inner = self.inner.read().await;
        inner.ensure_open()?;

        inner
            .numbers
            .get(&number)
            .and_then(|hash| inner.blocks.get(hash))
            .cloned()
            .ok_or_else(|| StorageError::NotFound(format!("block {number}")))
    }

    async fn blocks(&self) -> Result<Vec<Block>, StorageError> {
        let inner = self.inner.read().await;
        inner.ensure_open()?;

        Ok(inner.numbers.values().filter_map(|hash| inner.blocks.get(hash)).cloned().collect())
    }

    async fn tx_by_hash(&self, hash: &str) -> Result<Transaction, StorageError> {
        let inner = self.inner.read().await;
        inner.ensure_open()?;

        inner
            .tx_index
            .get(hash)
            .and_then(|idx| inner.txs.get(*idx))
            .cloned()
            .ok_or_else(|| StorageError::NotFound(format!("transaction {hash}")))
    }

    async fn txs(&self) -> Result<Vec<Transaction>, StorageError> {
        let inner = self.inner.read().await;
        inner.ensure_open()?;
        Ok(inner.txs.clone())
    }
}

#[async_trait]
impl Storage for MemoryStorage {
    async fn clear(&self) -> Result<(), StorageError> {
        let mut inner = self.inner.write().await;
        inner.ensure_open()?;
        inner.blocks.clear();
        inner.numbers.clear();
        inner.txs.clear();
        inner.tx_index.clear();
        Ok(())
    }

    async fn close(&self) -> Result<(), StorageError> {
        self.inner.write().await.closed = true;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn block(number: u64, hash: &str) -> Block {
        Block { number, hash: hash.to_string(), ..Default::default() }
    }

    fn tx(hash: &str) -> Transaction {
        Transaction { hash: hash.to_string(), ..Default::default() }
    }

    #[tokio::test]
    async fn test_insert_block_is_idempotent() {
        let storage = MemoryStorage::new();
        let b = block(100, "0xabc");

        storage.insert_block(&b).await.unwrap();
        storage.insert_block(&b).await.unwrap();

        assert_eq!(storage.block_count().await, 1);
        assert_eq!(storage.block_by_number(100).await.unwrap(), b);
    }

    #[tokio::test]
    async fn test_insert_tx_is_idempotent() {
        let storage = MemoryStorage::new();
        storage.insert_tx(&tx("0x01")).await.unwrap();
        storage.insert_tx(&tx("0x01")).await.unwrap();
        storage.insert_tx(&tx("0x02")).await.unwrap();

        assert_eq!(storage.tx_count().await, 2);
        assert_eq!(storage.tx_by_hash("0x02").await.unwrap().hash, "0x02");
    }

    #[tokio::test]
    async fn test_first_block_at_a_number_wins() {
        let storage = MemoryStorage::new();
        storage.insert_block(&block(7, "0xaa")).await.unwrap();
        storage.insert_block(&block(7, "0xbb")).await.unwrap();

        assert_eq!(storage.block_count().await, 1);
        assert_eq!(storage.block_by_number(7).await.unwrap().hash, "0xaa");
    }

    #[tokio::test]
    async fn test_first_block_is_lowest_number() {
        let storage = MemoryStorage::new();
        assert!(storage.first_block().await.unwrap_err().is_not_found());

        storage.insert_block(&block(10, "0x0a")).await.unwrap();
        storage.insert_block(&block(3, "0x03")).await.unwrap();
        storage.insert_block(&block(5, "0x05")).await.unwrap();

        assert_eq!(storage.first_block().await.unwrap().number, 3);
        let numbers: Vec<_> = storage.blocks().await.unwrap().iter().map(|b| b.number).collect();
        assert_eq!(numbers, vec![3, 5, 10]);
    }

    #[tokio::test]
    async fn test_lookup_misses_are_not_found() {
        let storage = MemoryStorage::new();
        assert!(storage.block_by_number(1).await.unwrap_err().is_not_found());
        assert!(storage.tx_by_hash("0xff").await.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn test_clear_and_close() {
        let storage = MemoryStorage::new();
        storage.insert_block(&block(1, "0x01")).await.unwrap();
        storage.insert_tx(&tx("0x02")).await.unwrap();

        storage.clear().await.unwrap();
        assert!(storage.blocks().await.unwrap().is_empty());
        assert!(storage.txs().await.unwrap().is_empty());

        storage.close().await.unwrap();
        assert!(matches!(storage.insert_tx(&tx("0x03")).await, Err(StorageError::Closed)));
    }
}
