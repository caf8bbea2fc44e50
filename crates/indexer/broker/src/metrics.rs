//! Metrics for the broker crate.

use crate::{PublishError, Topic};

/// Container for broker metric names and recording helpers.
#[derive(Debug, Clone)]
pub struct Metrics;

impl Metrics {
    /// Records accepted into the send buffer, labeled by topic.
    pub const PUBLISHED_TOTAL: &'static str = "indexer_broker_published_total";
    /// Records rejected on enqueue, labeled by topic and reason.
    pub const PUBLISH_ERROR_TOTAL: &'static str = "indexer_broker_publish_error_total";
    /// Records the broker failed to acknowledge after enqueue.
    pub const DELIVERY_FAILURE_TOTAL: &'static str = "indexer_broker_delivery_failure_total";
    /// Deliveries handed back for redelivery.
    pub const REDELIVERED_TOTAL: &'static str = "indexer_broker_redelivered_total";

    /// Describes and zeroes every broker metric.
    pub fn init() {
        Self::describe();
        Self::zero();
    }

    fn describe() {
        metrics::describe_counter!(
            Self::PUBLISHED_TOTAL,
            metrics::Unit::Count,
            "Records accepted into the publisher send buffer"
        );
        metrics::describe_counter!(
            Self::PUBLISH_ERROR_TOTAL,
            metrics::Unit::Count,
            "Records rejected by the publisher on enqueue"
        );
        metrics::describe_counter!(
            Self::DELIVERY_FAILURE_TOTAL,
            metrics::Unit::Count,
            "Records the broker failed to acknowledge"
        );
        metrics::describe_counter!(
            Self::REDELIVERED_TOTAL,
            metrics::Unit::Count,
            "Deliveries handed back to the broker for redelivery"
        );
    }

    fn zero() {
        for topic in [Topic::Blocks, Topic::Transactions] {
            metrics::counter!(Self::PUBLISHED_TOTAL, "topic" => topic.to_string()).increment(0);
        }
        metrics::counter!(Self::DELIVERY_FAILURE_TOTAL).increment(0);
        metrics::counter!(Self::REDELIVERED_TOTAL).increment(0);
    }

    /// Records the outcome of a single enqueue.
    pub fn record_publish(topic: Topic, result: &Result<(), PublishError>) {
        match result {
            Ok(()) => {
                metrics::counter!(Self::PUBLISHED_TOTAL, "topic" => topic.to_string())
                    .increment(1);
            }
            Err(err) => {
                let reason = match err {
                    PublishError::QueueFull => "queue_full",
                    PublishError::Closed => "closed",
                    PublishError::Broker(_) => "broker",
                };
                metrics::counter!(
                    Self::PUBLISH_ERROR_TOTAL,
                    "topic" => topic.to_string(),
                    "reason" => reason
                )
                .increment(1);
            }
        }
    }
}
