//! Extract-then-publish processing of a single block.

use crate::{BlockExtractor, ChainReader, ExtractError};
use async_trait::async_trait;
use indexer_broker::{PublishError, Publisher, PublisherExt};
use indexer_types::chain::ChainBlock;
use std::{fmt::Debug, sync::Arc};
use thiserror::Error;
use tracing::debug;

/// Errors raised while processing a block.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// The block could not be extracted.
    #[error(transparent)]
    Extract(#[from] ExtractError),
    /// A record could not be encoded.
    #[error("failed to encode record: {0}")]
    Encode(#[from] serde_json::Error),
    /// A record could not be enqueued.
    #[error(transparent)]
    Publish(#[from] PublishError),
}

/// Handles one full block on behalf of the listener and the syncer.
#[cfg_attr(any(test, feature = "test-utils"), mockall::automock)]
#[async_trait]
pub trait BlockProcessor: Debug + Send + Sync {
    /// Processes `block`.
    async fn process(&self, block: ChainBlock) -> Result<(), PipelineError>;
}

/// [`BlockProcessor`] that extracts a block's records and publishes them.
///
/// Records are encoded before anything is published, so an encoding failure publishes nothing.
/// A publish failure part way through leaves earlier records enqueued; reprocessing the block
/// republishes them, which storage tolerates.
#[derive(Debug)]
pub struct BlockPipeline<C: ?Sized, P: ?Sized> {
    extractor: BlockExtractor<C>,
    publisher: Arc<P>,
}

impl<C, P> BlockPipeline<C, P>
where
    C: ChainReader + ?Sized,
    P: Publisher + ?Sized,
{
    /// Creates a new pipeline.
    pub const fn new(extractor: BlockExtractor<C>, publisher: Arc<P>) -> Self {
        Self { extractor, publisher }
    }
}

#[async_trait]
impl<C, P> BlockProcessor for BlockPipeline<C, P>
where
    C: ChainReader + ?Sized,
    P: Publisher + ?Sized,
{
    async fn process(&self, block: ChainBlock) -> Result<(), PipelineError> {
        let extracted = self.extractor.extract(&block).await?;

        let block_payload = serde_json::to_vec(&extracted.block)?;
        let tx_payloads = extracted
            .transactions
            .iter()
            .map(serde_json::to_vec)
            .collect::<Result<Vec<_>, _>>()?;

        self.publisher.publish_block(block_payload)?;
        for payload in tx_payloads {
            self.publisher.publish_tx(payload)?;
        }

        debug!(
            target: "pipeline",
            number = block.number,
            transactions = extracted.transactions.len(),
            "Published block"
        );
        Ok(())
    }
}
