use crate::{BrokerError, PublishError, Topic};
use async_trait::async_trait;
use std::fmt::Debug;
use tokio_util::sync::CancellationToken;

/// The producing side of the broker.
#[cfg_attr(any(test, feature = "test-utils"), mockall::automock)]
#[async_trait]
pub trait Publisher: Debug + Send + Sync {
    /// Enqueues `payload` on `topic` and returns without waiting for the broker.
    ///
    /// # Returns
    /// * `Err(PublishError::QueueFull)` if the local send buffer has no room. Transient.
    /// * `Err(PublishError::Closed)` once [`Publisher::close`] has run.
    fn publish(&self, topic: Topic, payload: Vec<u8>) -> Result<(), PublishError>;

    /// Drains delivery reports until `cancellation` fires. Failures are logged, never returned.
    async fn run_delivery_loop(&self, cancellation: CancellationToken);

    /// Flushes outstanding records, then releases the connection.
    async fn close(&self) -> Result<(), BrokerError>;
}

/// Channel-specific helpers over any [`Publisher`].
pub trait PublisherExt: Publisher {
    /// Enqueues an encoded block record.
    fn publish_block(&self, payload: Vec<u8>) -> Result<(), PublishError> {
        self.publish(Topic::Blocks, payload)
    }

    /// Enqueues an encoded transaction record.
    fn publish_tx(&self, payload: Vec<u8>) -> Result<(), PublishError> {
        self.publish(Topic::Transactions, payload)
    }
}

impl<P: Publisher + ?Sized> PublisherExt for P {}

/// A message handed out by a [`Subscriber`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delivery {
    /// The channel the message arrived on.
    pub topic: Topic,
    /// Broker partition.
    pub partition: i32,
    /// Position of the message in its partition.
    pub offset: i64,
    /// The raw payload.
    pub payload: Vec<u8>,
}

/// The consuming side of the broker.
///
/// The cursor only moves past a message once it is committed. A message that is neither committed
/// nor handed back stays pending until the subscriber is closed.
#[cfg_attr(any(test, feature = "test-utils"), mockall::automock)]
#[async_trait]
pub trait Subscriber: Debug + Send + Sync {
    /// Waits for the next message on either channel.
    ///
    /// # Returns
    /// * `Ok(None)` if nothing arrived within the poll timeout.
    async fn poll(&self) -> Result<Option<Delivery>, BrokerError>;

    /// Marks `delivery` as processed so it is never handed out again.
    fn commit(&self, delivery: &Delivery) -> Result<(), BrokerError>;

    /// Hands `delivery` back so a later poll returns it again.
    ///
    /// Until this succeeds the cursor may still sit past `delivery`, so callers must not commit a
    /// later message in the meantime.
    async fn redeliver(&self, delivery: &Delivery) -> Result<(), BrokerError>;

    /// Leaves the consumer group and releases the connection.
    async fn close(&self) -> Result<(), BrokerError>;
}
