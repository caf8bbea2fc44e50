use super::{ChainReader, ChainReaderError, HeadSubscription};
use alloy_consensus::{Transaction as _, TxReceipt as _};
use alloy_eips::BlockNumberOrTag;
use alloy_primitives::{Address, B256, U64};
use alloy_provider::{Provider, RootProvider};
use alloy_pubsub::Subscription;
use alloy_rpc_client::{BatchRequest, ClientBuilder};
use alloy_rpc_types_eth::{Block, Header, Transaction, TransactionReceipt};
use alloy_transport::{RpcError, TransportErrorKind};
use alloy_transport_ws::WsConnect;
use async_trait::async_trait;
use indexer_types::chain::{ChainBlock, ChainHeader, ChainReceipt, ChainTransaction};
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, info, warn};

/// [`ChainReader`] over an alloy websocket provider.
#[derive(Debug, Clone)]
pub struct AlloyChainReader {
    provider: RootProvider,
}

impl AlloyChainReader {
    /// Opens a websocket connection to the node at `url`.
    pub async fn connect(url: &str) -> Result<Self, ChainReaderError> {
        let client = ClientBuilder::default().pubsub(WsConnect::new(url)).await?;
        info!(target: "chain", url, "Connected to chain node");
        Ok(Self::new(RootProvider::new(client)))
    }

    /// Wraps an existing provider.
    pub const fn new(provider: RootProvider) -> Self {
        Self { provider }
    }
}

#[async_trait]
impl ChainReader for AlloyChainReader {
    async fn subscribe_new_heads(&self) -> Result<Box<dyn HeadSubscription>, ChainReaderError> {
        let subscription = match self.provider.subscribe_blocks().await {
            Ok(subscription) => subscription,
            Err(RpcError::Transport(TransportErrorKind::PubsubUnavailable)) => {
                return Err(ChainReaderError::PubsubUnavailable);
            }
            Err(err) => return Err(err.into()),
        };
        debug!(target: "chain", id = %subscription.local_id(), "Subscribed to new heads");

        Ok(Box::new(AlloyHeadSubscription {
            provider: self.provider.clone(),
            subscription,
            active: true,
        }))
    }

    async fn block_by_hash(&self, hash: B256) -> Result<ChainBlock, ChainReaderError> {
        self.provider
            .get_block_by_hash(hash)
            .full()
            .await?
            .map(chain_block)
            .ok_or_else(|| ChainReaderError::BlockNotFound(hash.to_string()))
    }

    async fn block_by_number(&self, number: Option<u64>) -> Result<ChainBlock, ChainReaderError> {
        let tag = number.map_or(BlockNumberOrTag::Latest, BlockNumberOrTag::Number);
        self.provider
            .get_block_by_number(tag)
            .full()
            .await?
            .map(chain_block)
            .ok_or_else(|| ChainReaderError::BlockNotFound(tag.to_string()))
    }

    async fn batch_receipts(&self, hashes: &[B256]) -> Result<Vec<ChainReceipt>, ChainReaderError> {
        if hashes.is_empty() {
            return Ok(Vec::new());
        }

        let mut batch = BatchRequest::new(self.provider.client());
        let waiters = hashes
            .iter()
            .map(|hash| {
                batch.add_call::<_, Option<TransactionReceipt>>(
                    "eth_getTransactionReceipt",
                    &(*hash,),
                )
            })
            .collect::<Result<Vec<_>, _>>()?;
        batch.send().await?;

        let mut receipts = Vec::with_capacity(waiters.len());
        for (waiter, hash) in waiters.into_iter().zip(hashes) {
            let receipt = waiter.await?.ok_or(ChainReaderError::MissingReceipt(*hash))?;
            receipts.push(chain_receipt(&receipt));
        }
        Ok(receipts)
    }

    async fn derive_sender(
        &self,
        tx: &ChainTransaction,
        block_hash: B256,
        index: u64,
    ) -> Result<Address, ChainReaderError> {
        if let Some(sender) = tx.sender {
            return Ok(sender);
        }

        let found: Transaction = self
            .provider
            .client()
            .request::<_, Option<Transaction>>(
                "eth_getTransactionByBlockHashAndIndex",
                (block_hash, U64::from(index)),
            )
            .await?
            .ok_or(ChainReaderError::TransactionNotFound { block_hash, index })?;

        let found_hash = *found.inner.tx_hash();
        if found_hash != tx.hash {
            return Err(ChainReaderError::SenderMismatch {
                index,
                expected: tx.hash,
                found: found_hash,
            });
        }
        Ok(found.inner.signer())
    }
}

/// A new-heads subscription on an alloy provider.
#[derive(Debug)]
struct AlloyHeadSubscription {
    provider: RootProvider,
    subscription: Subscription<Header>,
    active: bool,
}

#[async_trait]
impl HeadSubscription for AlloyHeadSubscription {
    async fn next_header(&mut self) -> Option<Result<ChainHeader, ChainReaderError>> {
        loop {
            match self.subscription.recv().await {
                Ok(header) => {
                    return Some(Ok(ChainHeader { hash: header.hash, number: header.number }));
                }
                Err(RecvError::Lagged(skipped)) => {
                    warn!(target: "chain", skipped, "Head subscription lagged, headers dropped");
                }
                Err(RecvError::Closed) => return None,
            }
        }
    }

    fn unsubscribe(&mut self) {
        if !std::mem::replace(&mut self.active, false) {
            return;
        }
        let id = *self.subscription.local_id();
        if let Err(err) = self.provider.unsubscribe(id) {
            warn!(target: "chain", %id, %err, "Failed to unsubscribe from new heads");
        }
    }
}

impl Drop for AlloyHeadSubscription {
    fn drop(&mut self) {
        self.unsubscribe();
    }
}

fn chain_block(block: Block) -> ChainBlock {
    let Block { header, transactions, .. } = block;
    let Header { hash, inner, size, .. } = header;

    ChainBlock {
        hash,
        number: inner.number,
        parent_hash: inner.parent_hash,
        ommers_hash: inner.ommers_hash,
        beneficiary: inner.beneficiary,
        state_root: inner.state_root,
        transactions_root: inner.transactions_root,
        receipts_root: inner.receipts_root,
        difficulty: inner.difficulty,
        gas_limit: inner.gas_limit,
        gas_used: inner.gas_used,
        timestamp: inner.timestamp,
        extra_data: inner.extra_data,
        nonce: u64::from_be_bytes(inner.nonce.0),
        size: size.map(|size| size.saturating_to()).unwrap_or_default(),
        transactions: transactions.into_transactions().map(chain_transaction).collect(),
    }
}

fn chain_transaction(tx: Transaction) -> ChainTransaction {
    ChainTransaction {
        hash: *tx.inner.tx_hash(),
        sender: Some(tx.inner.signer()),
        to: tx.to(),
        value: tx.value(),
        input: tx.input().clone(),
        gas_limit: tx.gas_limit(),
        gas_price: tx.gas_price().unwrap_or_else(|| tx.max_fee_per_gas()),
        nonce: tx.nonce(),
    }
}

fn chain_receipt(receipt: &TransactionReceipt) -> ChainReceipt {
    ChainReceipt {
        transaction_hash: receipt.transaction_hash,
        transaction_index: receipt.transaction_index.unwrap_or_default(),
        block_hash: receipt.block_hash,
        contract_address: receipt.contract_address,
        status: receipt.inner.status(),
    }
}
