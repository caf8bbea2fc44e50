//! Error types for the broker crate.

use thiserror::Error;

/// Errors a caller can see when enqueueing a record.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PublishError {
    /// The local send buffer is full. Transient, the caller may retry.
    #[error("publisher queue is full")]
    QueueFull,
    /// The publisher was closed.
    #[error("publisher is closed")]
    Closed,
    /// The broker client rejected the record.
    #[error("broker rejected record: {0}")]
    Broker(String),
}

/// Errors raised by broker connections outside the publish hot path.
#[derive(Debug, Error)]
pub enum BrokerError {
    /// The handle was closed.
    #[error("broker handle is closed")]
    Closed,
    /// A message arrived on a channel the subscriber does not know.
    #[error("message on unknown topic {0}")]
    UnknownTopic(String),
    /// Outstanding records could not be flushed before the attempts ran out.
    #[error("{in_flight} records still in flight after {attempts} flush attempts")]
    FlushIncomplete {
        /// Records that were never acknowledged.
        in_flight: i32,
        /// Flush attempts made.
        attempts: u32,
    },
    /// A blocking broker call could not be joined.
    #[error("broker task failed: {0}")]
    Task(String),
    /// Kafka client error.
    #[cfg(feature = "kafka")]
    #[error(transparent)]
    Kafka(#[from] rdkafka::error::KafkaError),
}
