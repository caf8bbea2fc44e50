//! Message broker flags.

use anyhow::Result;
use clap::{Parser, ValueEnum};
use indexer_broker::{MemoryBroker, MemoryBrokerConfig, Publisher, Subscriber, Topics};
use std::sync::Arc;
use tracing::warn;

/// The broker the pipeline publishes through.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum BrokerKind {
    /// A Kafka cluster reached through `--broker-url`.
    #[default]
    Kafka,
    /// An in-process queue. Undelivered records are lost on exit.
    Memory,
}

/// Message broker flags.
#[derive(Parser, Clone, Debug, PartialEq, Eq)]
pub struct BrokerArgs {
    /// The broker backend.
    #[arg(id = "broker", long = "broker", value_enum, default_value_t = BrokerKind::Kafka, env = "BROKER")]
    pub kind: BrokerKind,
    /// Kafka bootstrap servers, comma separated. Required with `--broker kafka`.
    #[arg(long = "broker-url", env = "MSG_BROKER_URL")]
    pub url: Option<String>,
    /// Channel carrying block records.
    #[arg(long = "topic.blocks", default_value = "blocks", env = "TOPIC_BLOCKS")]
    pub blocks_topic: String,
    /// Channel carrying transaction records.
    #[arg(
        long = "topic.transactions",
        default_value = "transactions",
        env = "TOPIC_TRANSACTIONS"
    )]
    pub transactions_topic: String,
    /// Consumer group of the event consumer.
    #[arg(long = "consumer.group-id", default_value = "evm-indexer", env = "CONSUMER_GROUP_ID")]
    pub group_id: String,
    /// Records buffered by the publisher before publishing reports a full queue.
    #[arg(
        long = "broker.queue-capacity",
        default_value_t = 100_000,
        env = "BROKER_QUEUE_CAPACITY"
    )]
    pub queue_capacity: usize,
}

impl Default for BrokerArgs {
    fn default() -> Self {
        let topics = Topics::default();
        Self {
            kind: BrokerKind::default(),
            url: None,
            blocks_topic: topics.blocks,
            transactions_topic: topics.transactions,
            group_id: "evm-indexer".to_string(),
            queue_capacity: 100_000,
        }
    }
}

impl BrokerArgs {
    /// The channel names.
    pub fn topics(&self) -> Topics {
        Topics::new(&self.blocks_topic, &self.transactions_topic)
    }

    /// Connects both sides of the configured broker.
    pub fn connect(&self) -> Result<(Arc<dyn Publisher>, Arc<dyn Subscriber>)> {
        match self.kind {
            BrokerKind::Memory => {
                warn!(target: "publisher", "Using the in-memory broker, records are lost on exit");
                let broker = Arc::new(MemoryBroker::new(MemoryBrokerConfig {
                    capacity: self.queue_capacity,
                    ..Default::default()
                }));
                let publisher: Arc<dyn Publisher> = broker.clone();
                let subscriber: Arc<dyn Subscriber> = broker;
                Ok((publisher, subscriber))
            }
            BrokerKind::Kafka => self.connect_kafka(),
        }
    }

    #[cfg(feature = "kafka")]
    fn connect_kafka(&self) -> Result<(Arc<dyn Publisher>, Arc<dyn Subscriber>)> {
        use anyhow::Context;
        use indexer_broker::{KafkaConfig, KafkaPublisher, KafkaSubscriber};

        let url = self.url.as_deref().context("--broker-url is required for the kafka broker")?;
        let config = KafkaConfig {
            group_id: self.group_id.clone(),
            queue_capacity: self.queue_capacity,
            ..KafkaConfig::new(url, self.topics())
        };
        let publisher: Arc<dyn Publisher> = Arc::new(
            KafkaPublisher::new(&config).context("failed to create kafka producer")?,
        );
        let subscriber: Arc<dyn Subscriber> = Arc::new(
            KafkaSubscriber::new(&config).context("failed to create kafka consumer")?,
        );
        Ok((publisher, subscriber))
    }

    #[cfg(not(feature = "kafka"))]
    fn connect_kafka(&self) -> Result<(Arc<dyn Publisher>, Arc<dyn Subscriber>)> {
        anyhow::bail!("the kafka broker requires the `kafka` feature")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use indexer_broker::Topic;

    #[test]
    fn test_broker_defaults() {
        let args = BrokerArgs::try_parse_from(["test"]).unwrap();
        assert_eq!(args, BrokerArgs::default());
        assert_eq!(args.topics(), Topics::default());
    }

    #[test]
    fn test_topic_names() {
        let args = BrokerArgs::try_parse_from([
            "test",
            "--topic.blocks",
            "chain.blocks",
            "--topic.transactions",
            "chain.txs",
        ])
        .unwrap();
        let topics = args.topics();
        assert_eq!(topics.name(Topic::Blocks), "chain.blocks");
        assert_eq!(topics.name(Topic::Transactions), "chain.txs");
    }

    #[test]
    fn test_memory_broker_connects() {
        let args = BrokerArgs { kind: BrokerKind::Memory, ..Default::default() };
        assert!(args.connect().is_ok());
    }

    #[cfg(feature = "kafka")]
    #[test]
    fn test_kafka_requires_url() {
        let err = BrokerArgs::default().connect().err().unwrap();
        assert!(err.to_string().contains("--broker-url"));
    }
}
