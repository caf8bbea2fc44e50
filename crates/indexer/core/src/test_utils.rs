//! Shared fixtures for the pipeline tests.

use crate::{ChainReaderError, HeadSubscription};
use alloy_primitives::{B256, U256, keccak256};
use async_trait::async_trait;
use indexer_types::chain::{ChainBlock, ChainHeader, ChainReceipt, ChainTransaction};
use std::{
    collections::VecDeque,
    pin::Pin,
    sync::{
        Arc, Mutex,
        atomic::{AtomicBool, Ordering},
    },
    time::Duration,
};
use tokio_util::sync::CancellationToken;

/// Hash used for block `number` in fixtures.
pub(crate) fn block_hash(number: u64) -> B256 {
    keccak256(format!("block-{number}"))
}

/// A header for block `number`.
pub(crate) fn header(number: u64) -> ChainHeader {
    ChainHeader { hash: block_hash(number), number }
}

/// A block with `txs` transactions, every other one a contract creation.
pub(crate) fn chain_block(number: u64, txs: u64) -> ChainBlock {
    let transactions = (0..txs)
        .map(|i| ChainTransaction {
            hash: keccak256(format!("tx-{number}-{i}")),
            to: (i % 2 == 0).then(|| alloy_primitives::Address::with_last_byte(i as u8 + 1)),
            value: U256::from(i),
            gas_limit: 21_000,
            gas_price: 1_000_000_000,
            nonce: i,
            ..Default::default()
        })
        .collect();

    ChainBlock {
        hash: block_hash(number),
        number,
        parent_hash: block_hash(number.saturating_sub(1)),
        gas_limit: 30_000_000,
        gas_used: 21_000 * txs,
        timestamp: 1_700_000_000 + number * 12,
        transactions,
        ..Default::default()
    }
}

/// A successful receipt for transaction `hash`.
pub(crate) fn receipt(hash: B256) -> ChainReceipt {
    ChainReceipt { transaction_hash: hash, status: true, ..Default::default() }
}

/// A [`HeadSubscription`] that replays a fixed script.
#[derive(Debug)]
pub(crate) struct ScriptedSubscription {
    items: VecDeque<Result<ChainHeader, ChainReaderError>>,
    hang: bool,
    unsubscribed: Arc<AtomicBool>,
}

impl ScriptedSubscription {
    fn build(
        items: VecDeque<Result<ChainHeader, ChainReaderError>>,
        hang: bool,
    ) -> (Box<dyn HeadSubscription>, Arc<AtomicBool>) {
        let unsubscribed = Arc::new(AtomicBool::new(false));
        let subscription = Self { items, hang, unsubscribed: Arc::clone(&unsubscribed) };
        (Box::new(subscription), unsubscribed)
    }

    /// Yields `headers`, then reports the stream as closed.
    pub(crate) fn closing(
        headers: Vec<ChainHeader>,
    ) -> (Box<dyn HeadSubscription>, Arc<AtomicBool>) {
        Self::build(headers.into_iter().map(Ok).collect(), false)
    }

    /// Yields `headers`, then waits forever.
    pub(crate) fn hanging(
        headers: Vec<ChainHeader>,
    ) -> (Box<dyn HeadSubscription>, Arc<AtomicBool>) {
        Self::build(headers.into_iter().map(Ok).collect(), true)
    }

    /// Fails immediately with `err`.
    pub(crate) fn failing(err: ChainReaderError) -> (Box<dyn HeadSubscription>, Arc<AtomicBool>) {
        Self::build(VecDeque::from([Err(err)]), false)
    }
}

#[async_trait]
impl HeadSubscription for ScriptedSubscription {
    async fn next_header(&mut self) -> Option<Result<ChainHeader, ChainReaderError>> {
        if let Some(item) = self.items.pop_front() {
            return Some(item);
        }
        if self.hang {
            std::future::pending::<()>().await;
        }
        None
    }

    fn unsubscribe(&mut self) {
        self.unsubscribed.store(true, Ordering::SeqCst);
    }
}

/// A [`Sleeper`](crate::Sleeper) that records requested durations without waiting.
///
/// Optionally cancels a token once a number of sleeps has been recorded, to end a run loop.
#[derive(Debug, Clone, Default)]
pub(crate) struct RecordingSleeper {
    sleeps: Arc<Mutex<Vec<Duration>>>,
    cancel: Option<(usize, CancellationToken)>,
}

impl RecordingSleeper {
    pub(crate) fn cancel_after(sleeps: usize, cancellation: CancellationToken) -> Self {
        Self { sleeps: Arc::default(), cancel: Some((sleeps, cancellation)) }
    }

    pub(crate) fn sleeps(&self) -> Vec<Duration> {
        self.sleeps.lock().unwrap().clone()
    }
}

impl backon::Sleeper for RecordingSleeper {
    type Sleep = Pin<Box<dyn Future<Output = ()> + Send>>;

    fn sleep(&self, duration: Duration) -> Self::Sleep {
        let recorded = {
            let mut sleeps = self.sleeps.lock().unwrap();
            sleeps.push(duration);
            sleeps.len()
        };
        if let Some((limit, cancellation)) = &self.cancel {
            if recorded >= *limit {
                cancellation.cancel();
            }
        }
        Box::pin(tokio::task::yield_now())
    }
}
