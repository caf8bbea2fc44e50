#![doc = include_str!("../README.md")]
#![doc(issue_tracker_base_url = "https://github.com/evm-indexer/evm-indexer/issues/")]
#![cfg_attr(docsrs, feature(doc_cfg, doc_auto_cfg))]
#![cfg_attr(not(test), warn(unused_crate_dependencies))]

mod chain;
#[cfg(any(test, feature = "test-utils"))]
pub use chain::MockChainReader;
pub use chain::{AlloyChainReader, ChainReader, ChainReaderError, HeadSubscription};

mod extractor;
pub use extractor::{BlockExtractor, ExtractError, Extracted};

mod pipeline;
#[cfg(any(test, feature = "test-utils"))]
pub use pipeline::MockBlockProcessor;
pub use pipeline::{BlockPipeline, BlockProcessor, PipelineError};

mod sleeper;
pub use sleeper::{Sleeper, TokioSleeper};

mod metrics;
pub use metrics::Metrics;

mod listener;
pub use listener::{HeadListener, ListenerConfig, ListenerError, resubscribe_backoff};

mod syncer;
pub use syncer::{HistoricalSyncer, SyncerConfig, SyncerError};

mod consumer;
pub use consumer::{ConsumerConfig, ConsumerError, EventConsumer};

mod actor;
pub use actor::{DeliveryActor, IndexerActor};

#[cfg(test)]
pub(crate) mod test_utils;
