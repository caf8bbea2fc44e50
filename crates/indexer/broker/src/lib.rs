#![doc = include_str!("../README.md")]
#![doc(issue_tracker_base_url = "https://github.com/evm-indexer/evm-indexer/issues/")]
#![cfg_attr(docsrs, feature(doc_cfg, doc_auto_cfg))]

mod topics;
pub use topics::{Topic, Topics};

mod errors;
pub use errors::{BrokerError, PublishError};

mod traits;
pub use traits::{Delivery, Publisher, PublisherExt, Subscriber};
#[cfg(any(test, feature = "test-utils"))]
pub use traits::{MockPublisher, MockSubscriber};

mod metrics;
pub use metrics::Metrics;

mod memory;
pub use memory::{MemoryBroker, MemoryBrokerConfig};

#[cfg(feature = "kafka")]
mod kafka;
#[cfg(feature = "kafka")]
pub use kafka::{KafkaConfig, KafkaPublisher, KafkaSubscriber};
