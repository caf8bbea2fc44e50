//! [IndexerActor] trait and its implementations for the pipeline workers.

use crate::{
    BlockProcessor, ChainReader, ConsumerError, EventConsumer, HeadListener, HistoricalSyncer,
    ListenerError, Sleeper, SyncerError,
};
use async_trait::async_trait;
use indexer_broker::{Publisher, Subscriber};
use indexer_storage::{StorageReader, StorageWriter};
use std::{convert::Infallible, fmt::Display, sync::Arc};
use tokio_util::sync::CancellationToken;

/// A long-running worker of the indexer.
///
/// The orchestrator builds every actor up front, then hands each one a clone of the shared
/// [`CancellationToken`] when it starts it. An actor returns `Ok(())` when it is cancelled or when
/// its work is complete, and an error when it cannot go on.
#[async_trait]
pub trait IndexerActor: Send + 'static {
    /// The error type for the actor.
    type Error: std::fmt::Debug + Display + Send;

    /// Name used in logs and in task failure reports.
    const NAME: &'static str;

    /// Starts the actor.
    async fn start(self, cancellation: CancellationToken) -> Result<(), Self::Error>;
}

#[async_trait]
impl<C, B, S> IndexerActor for HeadListener<C, B, S>
where
    C: ChainReader + ?Sized + 'static,
    B: BlockProcessor + ?Sized + 'static,
    S: Sleeper + 'static,
{
    type Error = ListenerError;

    const NAME: &'static str = "listener";

    async fn start(self, cancellation: CancellationToken) -> Result<(), Self::Error> {
        self.run(cancellation).await
    }
}

#[async_trait]
impl<C, R, B, S> IndexerActor for HistoricalSyncer<C, R, B, S>
where
    C: ChainReader + ?Sized + 'static,
    R: StorageReader + ?Sized + 'static,
    B: BlockProcessor + ?Sized + 'static,
    S: Sleeper + 'static,
{
    type Error = SyncerError;

    const NAME: &'static str = "syncer";

    async fn start(self, cancellation: CancellationToken) -> Result<(), Self::Error> {
        self.run(cancellation).await
    }
}

#[async_trait]
impl<Sub, W, S> IndexerActor for EventConsumer<Sub, W, S>
where
    Sub: Subscriber + ?Sized + 'static,
    W: StorageWriter + ?Sized + 'static,
    S: Sleeper + 'static,
{
    type Error = ConsumerError;

    const NAME: &'static str = "consumer";

    async fn start(self, cancellation: CancellationToken) -> Result<(), Self::Error> {
        self.run(cancellation).await
    }
}

/// Drains the delivery reports of a [`Publisher`] until cancelled.
#[derive(Debug)]
pub struct DeliveryActor<P: ?Sized> {
    publisher: Arc<P>,
}

impl<P: ?Sized> DeliveryActor<P> {
    /// Creates a new delivery actor.
    pub const fn new(publisher: Arc<P>) -> Self {
        Self { publisher }
    }
}

#[async_trait]
impl<P> IndexerActor for DeliveryActor<P>
where
    P: Publisher + ?Sized + 'static,
{
    type Error = Infallible;

    const NAME: &'static str = "delivery";

    async fn start(self, cancellation: CancellationToken) -> Result<(), Self::Error> {
        self.publisher.run_delivery_loop(cancellation).await;
        Ok(())
    }
}
