//! The live chain head listener.

use crate::{
    BlockProcessor, ChainReader, ChainReaderError, HeadSubscription, Metrics, Sleeper,
    TokioSleeper, sleeper::sleep_or_cancel,
};
use indexer_types::chain::ChainHeader;
use std::{sync::Arc, time::Duration};
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

mod backoff;
pub use backoff::resubscribe_backoff;

/// Configuration of the [`HeadListener`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ListenerConfig {
    /// First delay before resubscribing.
    pub initial_backoff: Duration,
    /// Upper bound of the resubscribe delay.
    pub max_backoff: Duration,
}

impl ListenerConfig {
    /// Default first resubscribe delay.
    pub const DEFAULT_INITIAL_BACKOFF: Duration = Duration::from_secs(1);
    /// Default resubscribe delay cap.
    pub const DEFAULT_MAX_BACKOFF: Duration = Duration::from_secs(30);

    /// Creates a config, falling back to the defaults for zero durations.
    pub fn new(initial_backoff: Duration, max_backoff: Duration) -> Self {
        let or_default = |value: Duration, default| if value.is_zero() { default } else { value };
        Self {
            initial_backoff: or_default(initial_backoff, Self::DEFAULT_INITIAL_BACKOFF),
            max_backoff: or_default(max_backoff, Self::DEFAULT_MAX_BACKOFF),
        }
    }
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            initial_backoff: Self::DEFAULT_INITIAL_BACKOFF,
            max_backoff: Self::DEFAULT_MAX_BACKOFF,
        }
    }
}

/// Unrecoverable listener failures.
#[derive(Debug, Error)]
pub enum ListenerError {
    /// The chain reader cannot open subscriptions at all.
    #[error("chain reader does not support new-heads subscriptions")]
    PubsubUnavailable,
}

/// How a streaming phase ended.
#[derive(Debug)]
enum StreamEnd {
    Cancelled,
    Closed,
    Failed(ChainReaderError),
}

/// Follows the chain head and hands every new block to a [`BlockProcessor`].
///
/// Subscription failures and dropped streams are retried after a doubling
/// [`resubscribe_backoff`] delay that starts over once a subscription succeeds.
#[derive(Debug)]
pub struct HeadListener<C: ?Sized, B: ?Sized, S = TokioSleeper> {
    chain: Arc<C>,
    processor: Arc<B>,
    config: ListenerConfig,
    sleeper: S,
}

impl<C: ?Sized, B: ?Sized> HeadListener<C, B> {
    /// Creates a listener that sleeps on the tokio timer.
    pub const fn new(chain: Arc<C>, processor: Arc<B>, config: ListenerConfig) -> Self {
        Self { chain, processor, config, sleeper: TokioSleeper }
    }
}

impl<C: ?Sized, B: ?Sized, S> HeadListener<C, B, S> {
    /// Replaces the [`Sleeper`] used for backoff delays.
    pub fn with_sleeper<T>(self, sleeper: T) -> HeadListener<C, B, T> {
        HeadListener { chain: self.chain, processor: self.processor, config: self.config, sleeper }
    }
}

impl<C, B, S> HeadListener<C, B, S>
where
    C: ChainReader + ?Sized,
    B: BlockProcessor + ?Sized,
    S: Sleeper,
{
    /// Runs until `cancellation` fires.
    ///
    /// # Returns
    /// * `Ok(())` on cancellation.
    /// * `Err(ListenerError::PubsubUnavailable)` if the chain reader cannot subscribe at all.
    pub async fn run(&self, cancellation: CancellationToken) -> Result<(), ListenerError> {
        let new_backoff =
            || resubscribe_backoff(self.config.initial_backoff, self.config.max_backoff);
        let mut backoff = new_backoff();
        let mut first_attempt = true;

        loop {
            if cancellation.is_cancelled() {
                info!(target: "listener", "Listener cancellation requested, stopping...");
                return Ok(());
            }
            if !first_attempt {
                metrics::counter!(Metrics::LISTENER_RECONNECTS_TOTAL).increment(1);
            }
            first_attempt = false;

            let subscribed = tokio::select! {
                biased;
                _ = cancellation.cancelled() => continue,
                subscribed = self.chain.subscribe_new_heads() => subscribed,
            };

            match subscribed {
                Ok(mut subscription) => {
                    backoff = new_backoff();
                    info!(target: "listener", "Subscribed to new chain heads");

                    let end = self.stream(subscription.as_mut(), &cancellation).await;
                    subscription.unsubscribe();

                    match end {
                        StreamEnd::Cancelled => continue,
                        StreamEnd::Closed => {
                            warn!(target: "listener", "Head subscription closed by the node");
                        }
                        StreamEnd::Failed(err) => {
                            warn!(target: "listener", %err, "Head subscription dropped");
                        }
                    }
                }
                Err(ChainReaderError::PubsubUnavailable) => {
                    return Err(ListenerError::PubsubUnavailable);
                }
                Err(err) => {
                    warn!(target: "listener", %err, "Failed to subscribe to new chain heads");
                }
            }

            let delay = backoff.next().unwrap_or(self.config.max_backoff);
            debug!(target: "listener", ?delay, "Backing off before resubscribing");
            sleep_or_cancel(&self.sleeper, delay, &cancellation).await;
        }
    }

    async fn stream(
        &self,
        subscription: &mut dyn HeadSubscription,
        cancellation: &CancellationToken,
    ) -> StreamEnd {
        loop {
            let next = tokio::select! {
                biased;
                _ = cancellation.cancelled() => return StreamEnd::Cancelled,
                next = subscription.next_header() => next,
            };

            let header = match next {
                Some(Ok(header)) => header,
                Some(Err(err)) => return StreamEnd::Failed(err),
                None => return StreamEnd::Closed,
            };

            tokio::select! {
                biased;
                _ = cancellation.cancelled() => return StreamEnd::Cancelled,
                _ = self.handle_header(header) => {}
            }
        }
    }

    async fn handle_header(&self, header: ChainHeader) {
        metrics::counter!(Metrics::LISTENER_HEADERS_TOTAL).increment(1);
        debug!(target: "listener", number = header.number, hash = %header.hash, "New chain head");

        let block = match self.chain.block_by_hash(header.hash).await {
            Ok(block) => block,
            Err(err) => {
                warn!(
                    target: "listener",
                    number = header.number,
                    hash = %header.hash,
                    %err,
                    "Failed to fetch block for new head"
                );
                Metrics::record_block("listener", false);
                return;
            }
        };

        let result = self.processor.process(block).await;
        if let Err(err) = &result {
            warn!(target: "listener", number = header.number, %err, "Failed to process new head");
        }
        Metrics::record_block("listener", result.is_ok());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        MockBlockProcessor, MockChainReader, PipelineError,
        test_utils::{self, RecordingSleeper, ScriptedSubscription},
    };
    use alloy_transport::TransportErrorKind;
    use indexer_types::chain::ChainBlock;
    use std::sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    };

    fn refused() -> ChainReaderError {
        ChainReaderError::Transport(TransportErrorKind::custom_str("connection refused"))
    }

    fn secs(values: &[u64]) -> Vec<Duration> {
        values.iter().copied().map(Duration::from_secs).collect()
    }

    #[tokio::test]
    async fn test_drop_and_failures_back_off_then_reset() {
        let cancellation = CancellationToken::new();
        let sleeper = RecordingSleeper::cancel_after(5, cancellation.clone());

        let mut chain = MockChainReader::new();
        let mut attempt = 0;
        chain.expect_subscribe_new_heads().times(5).returning(move || {
            attempt += 1;
            match attempt {
                1 | 5 => Ok(ScriptedSubscription::closing(Vec::new()).0),
                _ => Err(refused()),
            }
        });

        let listener = HeadListener::new(
            Arc::new(chain),
            Arc::new(MockBlockProcessor::new()),
            ListenerConfig::new(Duration::from_secs(1), Duration::from_secs(5)),
        )
        .with_sleeper(sleeper.clone());

        listener.run(cancellation).await.unwrap();
        assert_eq!(sleeper.sleeps(), secs(&[1, 2, 4, 5, 1]));
    }

    #[tokio::test]
    async fn test_consecutive_failures_are_capped() {
        let cancellation = CancellationToken::new();
        let sleeper = RecordingSleeper::cancel_after(6, cancellation.clone());

        let mut chain = MockChainReader::new();
        chain.expect_subscribe_new_heads().times(6).returning(|| Err(refused()));

        let listener = HeadListener::new(
            Arc::new(chain),
            Arc::new(MockBlockProcessor::new()),
            ListenerConfig::new(Duration::from_secs(1), Duration::from_secs(10)),
        )
        .with_sleeper(sleeper.clone());

        listener.run(cancellation).await.unwrap();
        assert_eq!(sleeper.sleeps(), secs(&[1, 2, 4, 8, 10, 10]));
    }

    #[tokio::test]
    async fn test_cancelled_before_start_never_subscribes() {
        let cancellation = CancellationToken::new();
        cancellation.cancel();

        let mut chain = MockChainReader::new();
        chain.expect_subscribe_new_heads().never();

        let listener = HeadListener::new(
            Arc::new(chain),
            Arc::new(MockBlockProcessor::new()),
            ListenerConfig::default(),
        );
        listener.run(cancellation).await.unwrap();
    }

    #[tokio::test]
    async fn test_no_processing_after_cancellation_and_unsubscribes() {
        let cancellation = CancellationToken::new();
        let headers = (1..=3).map(test_utils::header).collect();
        let (subscription, unsubscribed) = ScriptedSubscription::hanging(headers);

        let mut chain = MockChainReader::new();
        chain.expect_subscribe_new_heads().times(1).return_once(move || Ok(subscription));
        chain
            .expect_block_by_hash()
            .returning(|hash| Ok(ChainBlock { hash, ..Default::default() }));

        let trigger = cancellation.clone();
        let mut processor = MockBlockProcessor::new();
        processor.expect_process().times(1).returning(move |_| {
            trigger.cancel();
            Ok(())
        });

        let listener = HeadListener::new(
            Arc::new(chain),
            Arc::new(processor),
            ListenerConfig::default(),
        );
        listener.run(cancellation).await.unwrap();
        assert!(unsubscribed.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_fetch_and_pipeline_errors_keep_streaming() {
        let cancellation = CancellationToken::new();
        let headers = (1..=4).map(test_utils::header).collect();
        let (subscription, unsubscribed) = ScriptedSubscription::hanging(headers);

        let mut chain = MockChainReader::new();
        chain.expect_subscribe_new_heads().times(1).return_once(move || Ok(subscription));
        chain.expect_block_by_hash().times(4).returning(|hash| {
            if hash == test_utils::header(2).hash {
                Err(ChainReaderError::BlockNotFound(hash.to_string()))
            } else {
                Ok(ChainBlock { hash, ..Default::default() })
            }
        });

        let calls = Arc::new(AtomicUsize::new(0));
        let seen = Arc::clone(&calls);
        let trigger = cancellation.clone();
        let mut processor = MockBlockProcessor::new();
        processor.expect_process().times(3).returning(move |block| {
            let count = seen.fetch_add(1, Ordering::SeqCst) + 1;
            if count == 3 {
                trigger.cancel();
            }
            if block.hash == test_utils::header(3).hash {
                return Err(PipelineError::Publish(indexer_broker::PublishError::QueueFull));
            }
            Ok(())
        });

        let listener = HeadListener::new(
            Arc::new(chain),
            Arc::new(processor),
            ListenerConfig::default(),
        );
        listener.run(cancellation).await.unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert!(unsubscribed.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_stream_error_resubscribes() {
        let cancellation = CancellationToken::new();
        let sleeper = RecordingSleeper::cancel_after(1, cancellation.clone());
        let (subscription, unsubscribed) = ScriptedSubscription::failing(refused());

        let mut chain = MockChainReader::new();
        chain.expect_subscribe_new_heads().times(1).return_once(move || Ok(subscription));

        let listener = HeadListener::new(
            Arc::new(chain),
            Arc::new(MockBlockProcessor::new()),
            ListenerConfig::default(),
        )
        .with_sleeper(sleeper.clone());

        listener.run(cancellation).await.unwrap();
        assert!(unsubscribed.load(Ordering::SeqCst));
        assert_eq!(sleeper.sleeps(), secs(&[1]));
    }

    #[tokio::test]
    async fn test_pubsub_unavailable_is_fatal() {
        let mut chain = MockChainReader::new();
        chain
            .expect_subscribe_new_heads()
            .times(1)
            .returning(|| Err(ChainReaderError::PubsubUnavailable));

        let listener = HeadListener::new(
            Arc::new(chain),
            Arc::new(MockBlockProcessor::new()),
            ListenerConfig::default(),
        );
        let err = listener.run(CancellationToken::new()).await.unwrap_err();
        assert!(matches!(err, ListenerError::PubsubUnavailable));
    }

    #[test]
    fn test_zero_config_falls_back_to_defaults() {
        assert_eq!(ListenerConfig::new(Duration::ZERO, Duration::ZERO), ListenerConfig::default());
        let config = ListenerConfig::new(Duration::from_millis(250), Duration::ZERO);
        assert_eq!(config.initial_backoff, Duration::from_millis(250));
        assert_eq!(config.max_backoff, ListenerConfig::DEFAULT_MAX_BACKOFF);
    }
}
