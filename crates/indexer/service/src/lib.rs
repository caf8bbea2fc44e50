#![doc = include_str!("../README.md")]
#![doc(issue_tracker_base_url = "https://github.com/evm-indexer/evm-indexer/issues/")]
#![cfg_attr(docsrs, feature(doc_cfg, doc_auto_cfg))]
#![cfg_attr(not(test), warn(unused_crate_dependencies))]

mod config;
pub use config::ServiceConfig;

mod error;
pub use error::{ServiceError, TaskFailure};

mod service;
pub use service::{Components, IndexerService};

/// Describes and zeroes the metrics of every indexer component.
pub fn init_metrics() {
    indexer_core::Metrics::init();
    indexer_broker::Metrics::init();
}
