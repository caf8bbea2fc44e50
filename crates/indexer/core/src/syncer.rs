//! The historical syncer.

use crate::{
    BlockProcessor, ChainReader, ChainReaderError, Metrics, PipelineError, Sleeper, TokioSleeper,
    sleeper::sleep_or_cancel,
};
use indexer_storage::{StorageError, StorageReader};
use std::{sync::Arc, time::Duration};
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Configuration of the [`HistoricalSyncer`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SyncerConfig {
    /// Delay before retrying a block that failed.
    pub retry_interval: Duration,
}

impl SyncerConfig {
    /// Default retry delay.
    pub const DEFAULT_RETRY_INTERVAL: Duration = Duration::from_millis(500);
}

impl Default for SyncerConfig {
    fn default() -> Self {
        Self { retry_interval: Self::DEFAULT_RETRY_INTERVAL }
    }
}

/// Errors raised by the [`HistoricalSyncer`].
#[derive(Debug, Error)]
pub enum SyncerError {
    /// A chain call failed.
    #[error(transparent)]
    Chain(#[from] ChainReaderError),
    /// A storage query failed.
    #[error(transparent)]
    Storage(#[from] StorageError),
    /// The block could not be processed.
    #[error(transparent)]
    Pipeline(#[from] PipelineError),
}

/// Walks the chain backwards from the lowest stored block, or from the chain head on a fresh
/// deployment, down to block 1.
///
/// A block that fails is retried after [`SyncerConfig::retry_interval`] until it succeeds. The
/// syncer never skips a number.
#[derive(Debug)]
pub struct HistoricalSyncer<C: ?Sized, R: ?Sized, B: ?Sized, S = TokioSleeper> {
    chain: Arc<C>,
    storage: Arc<R>,
    processor: Arc<B>,
    config: SyncerConfig,
    sleeper: S,
}

impl<C: ?Sized, R: ?Sized, B: ?Sized> HistoricalSyncer<C, R, B> {
    /// Creates a syncer that sleeps on the tokio timer.
    pub const fn new(
        chain: Arc<C>,
        storage: Arc<R>,
        processor: Arc<B>,
        config: SyncerConfig,
    ) -> Self {
        Self { chain, storage, processor, config, sleeper: TokioSleeper }
    }
}

impl<C: ?Sized, R: ?Sized, B: ?Sized, S> HistoricalSyncer<C, R, B, S> {
    /// Replaces the [`Sleeper`] used between retries.
    pub fn with_sleeper<T>(self, sleeper: T) -> HistoricalSyncer<C, R, B, T> {
        HistoricalSyncer {
            chain: self.chain,
            storage: self.storage,
            processor: self.processor,
            config: self.config,
            sleeper,
        }
    }
}

impl<C, R, B, S> HistoricalSyncer<C, R, B, S>
where
    C: ChainReader + ?Sized,
    R: StorageReader + ?Sized,
    B: BlockProcessor + ?Sized,
    S: Sleeper,
{
    /// Runs until block 1 has been processed or `cancellation` fires.
    ///
    /// # Returns
    /// * `Ok(())` once the walk is complete, or on cancellation.
    /// * `Err(_)` if the starting block cannot be determined.
    pub async fn run(&self, cancellation: CancellationToken) -> Result<(), SyncerError> {
        let mut next = tokio::select! {
            biased;
            _ = cancellation.cancelled() => {
                info!(target: "syncer", "Syncer cancellation requested, stopping...");
                return Ok(());
            }
            start = self.resume_point() => start?,
        };
        info!(target: "syncer", start = next, "Starting historical sync");

        while next > 0 {
            metrics::gauge!(Metrics::SYNCER_TARGET_BLOCK).set(next as f64);

            let result = tokio::select! {
                biased;
                _ = cancellation.cancelled() => break,
                result = self.sync_block(next) => result,
            };

            match result {
                Ok(()) => {
                    Metrics::record_block("syncer", true);
                    debug!(target: "syncer", number = next, "Synced block");
                    next -= 1;
                }
                Err(err) => {
                    Metrics::record_block("syncer", false);
                    metrics::counter!(Metrics::SYNCER_RETRIES_TOTAL).increment(1);
                    warn!(target: "syncer", number = next, %err, "Failed to sync block, retrying");

                    if !sleep_or_cancel(&self.sleeper, self.config.retry_interval, &cancellation)
                        .await
                    {
                        break;
                    }
                }
            }
        }

        if next == 0 {
            info!(target: "syncer", "Historical sync complete");
        } else {
            info!(target: "syncer", number = next, "Syncer cancellation requested, stopping...");
        }
        Ok(())
    }

    /// Returns the first block number to sync.
    ///
    /// This is one below the lowest stored block, or the chain head when storage is empty.
    async fn resume_point(&self) -> Result<u64, SyncerError> {
        match self.storage.first_block().await {
            Ok(block) => Ok(block.number.saturating_sub(1)),
            Err(err) if err.is_not_found() => {
                let head = self.chain.block_by_number(None).await?;
                debug!(target: "syncer", head = head.number, "Storage is empty, starting at head");
                Ok(head.number)
            }
            Err(err) => Err(err.into()),
        }
    }

    async fn sync_block(&self, number: u64) -> Result<(), SyncerError> {
        let block = self.chain.block_by_number(Some(number)).await?;
        self.processor.process(block).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        BlockExtractor, BlockPipeline, MockBlockProcessor, MockChainReader,
        test_utils::{self, RecordingSleeper},
    };
    use indexer_broker::{MemoryBroker, PublishError, Subscriber, Topic};
    use indexer_storage::{MemoryStorage, Storage, StorageWriter};
    use indexer_types::Block;
    use std::sync::Mutex;

    fn chain_of(head: u64) -> MockChainReader {
        let mut chain = MockChainReader::new();
        chain.expect_block_by_number().returning(move |number| {
            Ok(test_utils::chain_block(number.unwrap_or(head), 0))
        });
        chain
    }

    fn recording_processor() -> (MockBlockProcessor, Arc<Mutex<Vec<u64>>>) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let recorded = Arc::clone(&seen);
        let mut processor = MockBlockProcessor::new();
        processor.expect_process().returning(move |block| {
            recorded.lock().unwrap().push(block.number);
            Ok(())
        });
        (processor, seen)
    }

    #[tokio::test]
    async fn test_fresh_deployment_walks_down_from_head() {
        let mut chain = chain_of(3);
        chain.expect_batch_receipts().returning(|_| Ok(Vec::new()));
        let chain = Arc::new(chain);
        let broker = Arc::new(MemoryBroker::default());
        let pipeline = BlockPipeline::new(BlockExtractor::new(chain.clone()), broker.clone());

        let syncer = HistoricalSyncer::new(
            chain,
            Arc::new(MemoryStorage::new()),
            Arc::new(pipeline),
            SyncerConfig::default(),
        );
        syncer.run(CancellationToken::new()).await.unwrap();

        let mut published = Vec::new();
        while broker.pending() > 0 {
            let delivery = broker.poll().await.unwrap().unwrap();
            assert_eq!(delivery.topic, Topic::Blocks);
            let block: Block = serde_json::from_slice(&delivery.payload).unwrap();
            published.push(block.number);
            broker.commit(&delivery).unwrap();
        }
        assert_eq!(published, vec![3, 2, 1]);
    }

    #[tokio::test]
    async fn test_resumes_below_lowest_stored_block() {
        let storage = MemoryStorage::new();
        for (hash, number) in [("0x0a", 4), ("0x0b", 9)] {
            let block = Block { hash: hash.to_string(), number, ..Default::default() };
            storage.insert_block(&block).await.unwrap();
        }

        let mut chain = MockChainReader::new();
        chain
            .expect_block_by_number()
            .withf(|number| number.is_some())
            .returning(|number| Ok(test_utils::chain_block(number.unwrap_or_default(), 0)));
        let (processor, seen) = recording_processor();

        let syncer = HistoricalSyncer::new(
            Arc::new(chain),
            Arc::new(storage),
            Arc::new(processor),
            SyncerConfig::default(),
        );
        syncer.run(CancellationToken::new()).await.unwrap();
        assert_eq!(*seen.lock().unwrap(), vec![3, 2, 1]);
    }

    #[tokio::test]
    async fn test_failed_block_is_retried_not_skipped() {
        let mut failures = 2;
        let seen = Arc::new(Mutex::new(Vec::new()));
        let recorded = Arc::clone(&seen);
        let mut processor = MockBlockProcessor::new();
        processor.expect_process().returning(move |block| {
            recorded.lock().unwrap().push(block.number);
            if block.number == 2 && failures > 0 {
                failures -= 1;
                return Err(PipelineError::Publish(PublishError::QueueFull));
            }
            Ok(())
        });

        let sleeper = RecordingSleeper::default();
        let syncer = HistoricalSyncer::new(
            Arc::new(chain_of(3)),
            Arc::new(MemoryStorage::new()),
            Arc::new(processor),
            SyncerConfig { retry_interval: Duration::from_millis(250) },
        )
        .with_sleeper(sleeper.clone());

        syncer.run(CancellationToken::new()).await.unwrap();
        assert_eq!(*seen.lock().unwrap(), vec![3, 2, 2, 2, 1]);
        assert_eq!(sleeper.sleeps(), vec![Duration::from_millis(250); 2]);
    }

    #[tokio::test]
    async fn test_chain_failure_is_retried() {
        let mut calls = 0;
        let mut chain = MockChainReader::new();
        chain.expect_block_by_number().returning(move |number| {
            calls += 1;
            match number {
                Some(1) if calls == 2 => Err(ChainReaderError::BlockNotFound("1".to_string())),
                number => Ok(test_utils::chain_block(number.unwrap_or(1), 0)),
            }
        });
        let (processor, seen) = recording_processor();

        let sleeper = RecordingSleeper::default();
        let syncer = HistoricalSyncer::new(
            Arc::new(chain),
            Arc::new(MemoryStorage::new()),
            Arc::new(processor),
            SyncerConfig::default(),
        )
        .with_sleeper(sleeper.clone());

        syncer.run(CancellationToken::new()).await.unwrap();
        assert_eq!(*seen.lock().unwrap(), vec![1]);
        assert_eq!(sleeper.sleeps(), vec![SyncerConfig::DEFAULT_RETRY_INTERVAL]);
    }

    #[tokio::test]
    async fn test_resume_point_failure_is_fatal() {
        let storage = MemoryStorage::new();
        storage.close().await.unwrap();

        let mut chain = MockChainReader::new();
        chain.expect_block_by_number().never();

        let syncer = HistoricalSyncer::new(
            Arc::new(chain),
            Arc::new(storage),
            Arc::new(MockBlockProcessor::new()),
            SyncerConfig::default(),
        );
        let err = syncer.run(CancellationToken::new()).await.unwrap_err();
        assert!(matches!(err, SyncerError::Storage(StorageError::Closed)));
    }

    #[tokio::test]
    async fn test_chain_head_failure_is_fatal() {
        let mut chain = MockChainReader::new();
        chain
            .expect_block_by_number()
            .times(1)
            .returning(|_| Err(ChainReaderError::BlockNotFound("latest".to_string())));

        let syncer = HistoricalSyncer::new(
            Arc::new(chain),
            Arc::new(MemoryStorage::new()),
            Arc::new(MockBlockProcessor::new()),
            SyncerConfig::default(),
        );
        let err = syncer.run(CancellationToken::new()).await.unwrap_err();
        assert!(matches!(err, SyncerError::Chain(ChainReaderError::BlockNotFound(_))));
    }

    #[tokio::test]
    async fn test_cancellation_during_retry_stops() {
        let cancellation = CancellationToken::new();
        let mut processor = MockBlockProcessor::new();
        processor
            .expect_process()
            .times(1)
            .returning(|_| Err(PipelineError::Publish(PublishError::Closed)));

        let sleeper = RecordingSleeper::cancel_after(1, cancellation.clone());
        let syncer = HistoricalSyncer::new(
            Arc::new(chain_of(50)),
            Arc::new(MemoryStorage::new()),
            Arc::new(processor),
            SyncerConfig::default(),
        )
        .with_sleeper(sleeper.clone());

        syncer.run(cancellation).await.unwrap();
        assert_eq!(sleeper.sleeps().len(), 1);
    }
}
