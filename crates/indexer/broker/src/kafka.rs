//! Kafka implementations of [`Publisher`] and [`Subscriber`].

use crate::{BrokerError, Delivery, Metrics, PublishError, Publisher, Subscriber, Topic, Topics};
use async_trait::async_trait;
use rdkafka::{
    ClientConfig, ClientContext, Message, Offset, TopicPartitionList,
    consumer::{Consumer, StreamConsumer},
    error::{KafkaError, RDKafkaErrorCode},
    producer::{BaseProducer, BaseRecord, DeliveryResult, Producer, ProducerContext},
};
use std::{
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    time::Duration,
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace, warn};

/// Upper bound of a single rewind on [`Subscriber::redeliver`].
const SEEK_TIMEOUT: Duration = Duration::from_secs(1);

/// Connection settings shared by [`KafkaPublisher`] and [`KafkaSubscriber`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KafkaConfig {
    /// Comma separated `host:port` bootstrap list.
    pub brokers: String,
    /// Consumer group id. Fixed per deployment.
    pub group_id: String,
    /// Channel names.
    pub topics: Topics,
    /// Timeout of a single flush attempt on close.
    pub flush_timeout: Duration,
    /// Number of flush attempts on close before giving up.
    pub max_flush_attempts: u32,
    /// How long a subscriber poll waits for a message.
    pub poll_timeout: Duration,
    /// Consumer group session timeout.
    pub session_timeout: Duration,
    /// Maximum number of messages buffered by the producer before publishing fails with
    /// [`PublishError::QueueFull`].
    pub queue_capacity: usize,
}

impl KafkaConfig {
    /// Default consumer group id.
    pub const DEFAULT_GROUP_ID: &'static str = "evm-indexer";

    /// Creates a config for `brokers` with default timeouts.
    pub fn new(brokers: impl Into<String>, topics: Topics) -> Self {
        Self {
            brokers: brokers.into(),
            group_id: Self::DEFAULT_GROUP_ID.to_string(),
            topics,
            flush_timeout: Duration::from_secs(15),
            max_flush_attempts: 4,
            poll_timeout: Duration::from_millis(100),
            session_timeout: Duration::from_millis(6000),
            queue_capacity: 100_000,
        }
    }

    fn producer_config(&self) -> ClientConfig {
        let mut config = ClientConfig::new();
        config
            .set("bootstrap.servers", &self.brokers)
            .set("queue.buffering.max.messages", self.queue_capacity.to_string());
        config
    }

    fn consumer_config(&self) -> ClientConfig {
        let mut config = ClientConfig::new();
        config
            .set("bootstrap.servers", &self.brokers)
            .set("group.id", &self.group_id)
            .set("auto.offset.reset", "earliest")
            .set("enable.auto.offset.store", "false")
            .set("enable.partition.eof", "false")
            .set("session.timeout.ms", self.session_timeout.as_millis().to_string());
        config
    }
}

/// Producer context that reports delivery outcomes.
#[derive(Debug, Default, Clone, Copy)]
struct DeliveryReporter;

impl ClientContext for DeliveryReporter {}

impl ProducerContext for DeliveryReporter {
    type DeliveryOpaque = ();

    fn delivery(&self, result: &DeliveryResult<'_>, _: Self::DeliveryOpaque) {
        match result {
            Ok(message) => trace!(
                target: "publisher",
                topic = message.topic(),
                partition = message.partition(),
                offset = message.offset(),
                "Record delivered"
            ),
            Err((err, message)) => {
                error!(
                    target: "publisher",
                    topic = message.topic(),
                    partition = message.partition(),
                    %err,
                    "Record delivery failed"
                );
                metrics::counter!(Metrics::DELIVERY_FAILURE_TOTAL).increment(1);
            }
        }
    }
}

/// [`Publisher`] backed by an rdkafka [`BaseProducer`].
///
/// Delivery reports are only processed while [`Publisher::run_delivery_loop`] is running.
pub struct KafkaPublisher {
    producer: Arc<BaseProducer<DeliveryReporter>>,
    topics: Topics,
    flush_timeout: Duration,
    max_flush_attempts: u32,
    closed: AtomicBool,
}

impl std::fmt::Debug for KafkaPublisher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KafkaPublisher")
            .field("topics", &self.topics)
            .field("in_flight", &self.producer.in_flight_count())
            .field("closed", &self.closed.load(Ordering::Relaxed))
            .finish()
    }
}

impl KafkaPublisher {
    /// Creates the producer. Fails if the client configuration is rejected.
    pub fn new(config: &KafkaConfig) -> Result<Self, BrokerError> {
        let producer = config.producer_config().create_with_context(DeliveryReporter)?;
        info!(target: "publisher", brokers = %config.brokers, "Kafka producer created");
        Ok(Self {
            producer: Arc::new(producer),
            topics: config.topics.clone(),
            flush_timeout: config.flush_timeout,
            max_flush_attempts: config.max_flush_attempts.max(1),
            closed: AtomicBool::new(false),
        })
    }
}

#[async_trait]
impl Publisher for KafkaPublisher {
    fn publish(&self, topic: Topic, payload: Vec<u8>) -> Result<(), PublishError> {
        let result = if self.closed.load(Ordering::Acquire) {
            Err(PublishError::Closed)
        } else {
            let record = BaseRecord::<(), [u8]>::to(self.topics.name(topic)).payload(&payload);
            self.producer.send(record).map_err(|(err, _)| match err {
                KafkaError::MessageProduction(RDKafkaErrorCode::QueueFull) => {
                    PublishError::QueueFull
                }
                other => PublishError::Broker(other.to_string()),
            })
        };
        Metrics::record_publish(topic, &result);
        result
    }

    async fn run_delivery_loop(&self, cancellation: CancellationToken) {
        let mut interval = tokio::time::interval(Duration::from_millis(100));
        loop {
            tokio::select! {
                _ = cancellation.cancelled() => {
                    debug!(target: "publisher", "Delivery loop stopped");
                    return;
                }
                _ = interval.tick() => {
                    // Non-blocking: serves every queued delivery callback.
                    self.producer.poll(Duration::ZERO);
                }
            }
        }
    }

    async fn close(&self) -> Result<(), BrokerError> {
        self.closed.store(true, Ordering::Release);

        for attempt in 1..=self.max_flush_attempts {
            let producer = Arc::clone(&self.producer);
            let timeout = self.flush_timeout;
            let flushed = tokio::task::spawn_blocking(move || producer.flush(timeout))
                .await
                .map_err(|err| BrokerError::Task(err.to_string()))?;

            match flushed {
                Ok(()) => {
                    info!(target: "publisher", attempt, "Flushed outstanding records");
                    return Ok(());
                }
                Err(err) => warn!(
                    target: "publisher",
                    attempt,
                    in_flight = self.producer.in_flight_count(),
                    %err,
                    "Flush incomplete"
                ),
            }
        }

        Err(BrokerError::FlushIncomplete {
            in_flight: self.producer.in_flight_count(),
            attempts: self.max_flush_attempts,
        })
    }
}

/// [`Subscriber`] backed by an rdkafka [`StreamConsumer`].
///
/// Offsets are stored only on [`Subscriber::commit`]; the client commits stored offsets in the
/// background.
pub struct KafkaSubscriber {
    consumer: Arc<StreamConsumer>,
    topics: Topics,
    poll_timeout: Duration,
    closed: AtomicBool,
}

impl std::fmt::Debug for KafkaSubscriber {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KafkaSubscriber")
            .field("topics", &self.topics)
            .field("poll_timeout", &self.poll_timeout)
            .finish_non_exhaustive()
    }
}

impl KafkaSubscriber {
    /// Creates the consumer and subscribes to both channels.
    pub fn new(config: &KafkaConfig) -> Result<Self, BrokerError> {
        let consumer: StreamConsumer = config.consumer_config().create()?;
        consumer.subscribe(&config.topics.names())?;
        info!(
            target: "consumer",
            brokers = %config.brokers,
            group_id = %config.group_id,
            "Kafka consumer subscribed"
        );
        Ok(Self {
            consumer: Arc::new(consumer),
            topics: config.topics.clone(),
            poll_timeout: config.poll_timeout,
            closed: AtomicBool::new(false),
        })
    }

    fn ensure_open(&self) -> Result<(), BrokerError> {
        if self.closed.load(Ordering::Acquire) {
            return Err(BrokerError::Closed);
        }
        Ok(())
    }
}

#[async_trait]
impl Subscriber for KafkaSubscriber {
    async fn poll(&self) -> Result<Option<Delivery>, BrokerError> {
        self.ensure_open()?;
        let Ok(received) = tokio::time::timeout(self.poll_timeout, self.consumer.recv()).await
        else {
            return Ok(None);
        };

        let message = received?;
        let topic = self
            .topics
            .resolve(message.topic())
            .ok_or_else(|| BrokerError::UnknownTopic(message.topic().to_string()))?;

        Ok(Some(Delivery {
            topic,
            partition: message.partition(),
            offset: message.offset(),
            payload: message.payload().map(<[u8]>::to_vec).unwrap_or_default(),
        }))
    }

    fn commit(&self, delivery: &Delivery) -> Result<(), BrokerError> {
        self.ensure_open()?;
        let mut list = TopicPartitionList::new();
        list.add_partition_offset(
            self.topics.name(delivery.topic),
            delivery.partition,
            Offset::Offset(delivery.offset + 1),
        )?;
        self.consumer.store_offsets(&list)?;
        Ok(())
    }

    async fn redeliver(&self, delivery: &Delivery) -> Result<(), BrokerError> {
        self.ensure_open()?;
        let consumer = Arc::clone(&self.consumer);
        let topic = self.topics.name(delivery.topic).to_string();
        let (partition, offset) = (delivery.partition, delivery.offset);

        // `seek` blocks until the fetcher acknowledges or the timeout passes.
        tokio::task::spawn_blocking(move || {
            consumer.seek(&topic, partition, Offset::Offset(offset), SEEK_TIMEOUT)
        })
        .await
        .map_err(|err| BrokerError::Task(err.to_string()))??;

        metrics::counter!(Metrics::REDELIVERED_TOTAL).increment(1);
        Ok(())
    }

    async fn close(&self) -> Result<(), BrokerError> {
        if self.closed.swap(true, Ordering::AcqRel) {
            return Ok(());
        }
        self.consumer.unsubscribe();
        info!(target: "consumer", "Kafka consumer unsubscribed");
        Ok(())
    }
}
