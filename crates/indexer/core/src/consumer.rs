//! The event consumer, which moves broker records into storage.

use crate::{Metrics, Sleeper, TokioSleeper, sleeper::sleep_or_cancel};
use indexer_broker::{BrokerError, Delivery, Subscriber, Topic};
use indexer_storage::{StorageError, StorageWriter};
use indexer_types::{Block, Transaction};
use std::{sync::Arc, time::Duration};
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

/// Configuration of the [`EventConsumer`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConsumerConfig {
    /// Pause after a broker error or a failed write.
    pub error_backoff: Duration,
}

impl ConsumerConfig {
    /// Default pause after an error.
    pub const DEFAULT_ERROR_BACKOFF: Duration = Duration::from_secs(1);
}

impl Default for ConsumerConfig {
    fn default() -> Self {
        Self { error_backoff: Self::DEFAULT_ERROR_BACKOFF }
    }
}

/// Unrecoverable consumer failures.
#[derive(Debug, Error)]
pub enum ConsumerError {
    /// The subscriber was closed underneath the consumer.
    #[error("subscriber closed")]
    SubscriberClosed,
}

/// What happened to one delivery.
#[derive(Debug)]
enum Outcome {
    Persisted,
    Malformed(serde_json::Error),
    Failed(StorageError),
}

impl Outcome {
    const fn label(&self) -> &'static str {
        match self {
            Self::Persisted => "persisted",
            Self::Malformed(_) => "malformed",
            Self::Failed(_) => "failed",
        }
    }
}

/// Polls a [`Subscriber`] and writes every record into storage.
///
/// A delivery is committed only after its record is stored, or when its payload cannot be
/// decoded. A failed write hands the delivery back to the broker so a later poll retries it.
#[derive(Debug)]
pub struct EventConsumer<Sub: ?Sized, W: ?Sized, S = TokioSleeper> {
    subscriber: Arc<Sub>,
    storage: Arc<W>,
    config: ConsumerConfig,
    sleeper: S,
}

impl<Sub: ?Sized, W: ?Sized> EventConsumer<Sub, W> {
    /// Creates a consumer that sleeps on the tokio timer.
    pub const fn new(subscriber: Arc<Sub>, storage: Arc<W>, config: ConsumerConfig) -> Self {
        Self { subscriber, storage, config, sleeper: TokioSleeper }
    }
}

impl<Sub: ?Sized, W: ?Sized, S> EventConsumer<Sub, W, S> {
    /// Replaces the [`Sleeper`] used after errors.
    pub fn with_sleeper<T>(self, sleeper: T) -> EventConsumer<Sub, W, T> {
        EventConsumer {
            subscriber: self.subscriber,
            storage: self.storage,
            config: self.config,
            sleeper,
        }
    }
}

impl<Sub, W, S> EventConsumer<Sub, W, S>
where
    Sub: Subscriber + ?Sized,
    W: StorageWriter + ?Sized,
    S: Sleeper,
{
    /// Runs until `cancellation` fires.
    ///
    /// # Returns
    /// * `Ok(())` on cancellation.
    /// * `Err(ConsumerError::SubscriberClosed)` if the subscriber stops working for good.
    pub async fn run(&self, cancellation: CancellationToken) -> Result<(), ConsumerError> {
        info!(target: "consumer", "Consuming records");

        loop {
            let polled = tokio::select! {
                biased;
                _ = cancellation.cancelled() => {
                    info!(target: "consumer", "Consumer cancellation requested, stopping...");
                    return Ok(());
                }
                polled = self.subscriber.poll() => polled,
            };

            let pause = match polled {
                Ok(None) => false,
                Ok(Some(delivery)) => self.handle(&delivery, &cancellation).await?,
                Err(BrokerError::Closed) => return Err(ConsumerError::SubscriberClosed),
                Err(err) => {
                    metrics::counter!(Metrics::CONSUMER_BROKER_ERRORS_TOTAL).increment(1);
                    warn!(target: "consumer", %err, "Failed to poll broker");
                    true
                }
            };

            if pause &&
                !sleep_or_cancel(&self.sleeper, self.config.error_backoff, &cancellation).await
            {
                info!(target: "consumer", "Consumer cancellation requested, stopping...");
                return Ok(());
            }
        }
    }

    /// Stores one delivery and moves the cursor accordingly. Returns whether to pause before the
    /// next poll.
    async fn handle(
        &self,
        delivery: &Delivery,
        cancellation: &CancellationToken,
    ) -> Result<bool, ConsumerError> {
        let outcome = self.persist(delivery).await;
        Metrics::record_message(delivery.topic, outcome.label());

        match &outcome {
            Outcome::Persisted => {
                trace!(
                    target: "consumer",
                    topic = %delivery.topic,
                    offset = delivery.offset,
                    "Stored record"
                );
            }
            Outcome::Malformed(err) => {
                warn!(
                    target: "consumer",
                    topic = %delivery.topic,
                    offset = delivery.offset,
                    %err,
                    "Skipping malformed record"
                );
            }
            Outcome::Failed(err) => {
                warn!(
                    target: "consumer",
                    topic = %delivery.topic,
                    offset = delivery.offset,
                    %err,
                    "Failed to store record, handing it back"
                );
                self.hand_back(delivery, cancellation).await?;
                return Ok(true);
            }
        }

        match self.subscriber.commit(delivery) {
            Ok(()) => Ok(false),
            Err(BrokerError::Closed) => Err(ConsumerError::SubscriberClosed),
            Err(err) => {
                // A later commit covers this offset too.
                metrics::counter!(Metrics::CONSUMER_BROKER_ERRORS_TOTAL).increment(1);
                warn!(target: "consumer", offset = delivery.offset, %err, "Failed to commit record");
                Ok(true)
            }
        }
    }

    /// Rewinds the subscriber to an unstored `delivery`, retrying after every failure.
    ///
    /// Nothing is polled until the rewind succeeds, so no later record can be committed past it.
    /// Returns early on cancellation, leaving the record uncommitted.
    async fn hand_back(
        &self,
        delivery: &Delivery,
        cancellation: &CancellationToken,
    ) -> Result<(), ConsumerError> {
        loop {
            let err = match self.subscriber.redeliver(delivery).await {
                Ok(()) => return Ok(()),
                Err(BrokerError::Closed) => return Err(ConsumerError::SubscriberClosed),
                Err(err) => err,
            };

            metrics::counter!(Metrics::CONSUMER_BROKER_ERRORS_TOTAL).increment(1);
            warn!(
                target: "consumer",
                topic = %delivery.topic,
                offset = delivery.offset,
                %err,
                "Failed to hand record back, retrying"
            );
            if !sleep_or_cancel(&self.sleeper, self.config.error_backoff, cancellation).await {
                return Ok(());
            }
        }
    }

    async fn persist(&self, delivery: &Delivery) -> Outcome {
        let written = match delivery.topic {
            Topic::Blocks => match serde_json::from_slice::<Block>(&delivery.payload) {
                Ok(block) => {
                    debug!(target: "consumer", number = block.number, hash = %block.hash, "Block");
                    self.storage.insert_block(&block).await
                }
                Err(err) => return Outcome::Malformed(err),
            },
            Topic::Transactions => match serde_json::from_slice::<Transaction>(&delivery.payload) {
                Ok(tx) => self.storage.insert_tx(&tx).await,
                Err(err) => return Outcome::Malformed(err),
            },
        };

        written.map_or_else(Outcome::Failed, |()| Outcome::Persisted)
    }
}
