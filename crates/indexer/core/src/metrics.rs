//! Metrics for the ingestion pipeline.

use indexer_broker::Topic;

/// Container for pipeline metric names and recording helpers.
#[derive(Debug, Clone)]
pub struct Metrics;

impl Metrics {
    /// Blocks extracted and published, labeled by source (`listener` or `syncer`).
    pub const BLOCKS_PROCESSED_TOTAL: &'static str = "indexer_pipeline_blocks_processed_total";
    /// Blocks whose extraction or publishing failed, labeled by source.
    pub const BLOCKS_FAILED_TOTAL: &'static str = "indexer_pipeline_blocks_failed_total";
    /// New-heads subscription attempts after the first one.
    pub const LISTENER_RECONNECTS_TOTAL: &'static str = "indexer_listener_reconnects_total";
    /// Headers received from the node.
    pub const LISTENER_HEADERS_TOTAL: &'static str = "indexer_listener_headers_total";
    /// Syncer retries of the same block number.
    pub const SYNCER_RETRIES_TOTAL: &'static str = "indexer_syncer_retries_total";
    /// Block number the syncer is working on.
    pub const SYNCER_TARGET_BLOCK: &'static str = "indexer_syncer_target_block";
    /// Consumer messages, labeled by topic and outcome.
    pub const CONSUMER_MESSAGES_TOTAL: &'static str = "indexer_consumer_messages_total";
    /// Broker errors seen by the consumer.
    pub const CONSUMER_BROKER_ERRORS_TOTAL: &'static str = "indexer_consumer_broker_errors_total";

    /// Describes and zeroes every pipeline metric.
    pub fn init() {
        Self::describe();
        Self::zero();
    }

    fn describe() {
        metrics::describe_counter!(
            Self::BLOCKS_PROCESSED_TOTAL,
            metrics::Unit::Count,
            "Blocks extracted and published"
        );
        metrics::describe_counter!(
            Self::BLOCKS_FAILED_TOTAL,
            metrics::Unit::Count,
            "Blocks whose extraction or publishing failed"
        );
        metrics::describe_counter!(
            Self::LISTENER_RECONNECTS_TOTAL,
            metrics::Unit::Count,
            "New-heads resubscription attempts"
        );
        metrics::describe_counter!(
            Self::LISTENER_HEADERS_TOTAL,
            metrics::Unit::Count,
            "Headers received from the new-heads subscription"
        );
        metrics::describe_counter!(
            Self::SYNCER_RETRIES_TOTAL,
            metrics::Unit::Count,
            "Historical syncer retries of the same block number"
        );
        metrics::describe_gauge!(
            Self::SYNCER_TARGET_BLOCK,
            "Block number the historical syncer is working on"
        );
        metrics::describe_counter!(
            Self::CONSUMER_MESSAGES_TOTAL,
            metrics::Unit::Count,
            "Messages handled by the event consumer"
        );
        metrics::describe_counter!(
            Self::CONSUMER_BROKER_ERRORS_TOTAL,
            metrics::Unit::Count,
            "Broker errors seen by the event consumer"
        );
    }

    fn zero() {
        for source in ["listener", "syncer"] {
            metrics::counter!(Self::BLOCKS_PROCESSED_TOTAL, "source" => source).increment(0);
            metrics::counter!(Self::BLOCKS_FAILED_TOTAL, "source" => source).increment(0);
        }
        metrics::counter!(Self::LISTENER_RECONNECTS_TOTAL).increment(0);
        metrics::counter!(Self::LISTENER_HEADERS_TOTAL).increment(0);
        metrics::counter!(Self::SYNCER_RETRIES_TOTAL).increment(0);
        metrics::counter!(Self::CONSUMER_BROKER_ERRORS_TOTAL).increment(0);
    }

    /// Records the outcome of processing one block.
    pub(crate) fn record_block(source: &'static str, ok: bool) {
        let name = if ok { Self::BLOCKS_PROCESSED_TOTAL } else { Self::BLOCKS_FAILED_TOTAL };
        metrics::counter!(name, "source" => source).increment(1);
    }

    /// Records one consumed message.
    pub(crate) fn record_message(topic: Topic, outcome: &'static str) {
        metrics::counter!(
            Self::CONSUMER_MESSAGES_TOTAL,
            "topic" => topic.to_string(),
            "outcome" => outcome
        )
        .increment(1);
    }
}
