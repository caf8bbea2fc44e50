//! The [`IndexerService`] orchestrator.

use crate::{ServiceConfig, ServiceError, TaskFailure};
use indexer_api::ApiState;
use indexer_broker::{Publisher, Subscriber};
use indexer_core::{
    BlockExtractor, BlockPipeline, ChainReader, DeliveryActor, EventConsumer, HeadListener,
    HistoricalSyncer, IndexerActor,
};
use indexer_storage::{Storage, StorageReader};
use std::{collections::HashMap, io, sync::Arc};
use tokio::{
    net::TcpListener,
    task::{Id, JoinError, JoinSet},
};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

/// The external handles the service runs on. All of them are connected before the service starts.
#[derive(Debug, Clone)]
pub struct Components {
    /// Chain node access.
    pub chain: Arc<dyn ChainReader>,
    /// Record storage.
    pub storage: Arc<dyn Storage>,
    /// Producing side of the broker.
    pub publisher: Arc<dyn Publisher>,
    /// Consuming side of the broker.
    pub subscriber: Arc<dyn Subscriber>,
}

/// Runs the read API and, in sync mode, the ingestion workers, then tears everything down.
///
/// The service stops when `cancellation` fires or when any task fails. Every task outcome is
/// collected, and every failure is reported in [`ServiceError::Tasks`]. A worker that finishes
/// its job, like the syncer reaching block 1, is not a failure.
#[derive(Debug)]
pub struct IndexerService {
    config: ServiceConfig,
    components: Components,
}

type Outcome = (&'static str, Result<(), String>);

/// Worker tasks and their names.
#[derive(Debug, Default)]
struct Workers {
    set: JoinSet<Outcome>,
    names: HashMap<Id, &'static str>,
}

impl Workers {
    fn spawn<A: IndexerActor>(&mut self, actor: A, cancellation: CancellationToken) {
        let handle = self.set.spawn(async move {
            let result = actor.start(cancellation).await.map_err(|err| err.to_string());
            (A::NAME, result)
        });
        self.names.insert(handle.id(), A::NAME);
        info!(target: "orchestrator", task = A::NAME, "Started task");
    }

    /// Converts a joined task into a failure, if it failed.
    fn failure(&mut self, joined: Result<(Id, Outcome), JoinError>) -> Option<TaskFailure> {
        match joined {
            Ok((id, (task, result))) => {
                self.names.remove(&id);
                match result {
                    Ok(()) => {
                        info!(target: "orchestrator", task, "Task finished");
                        None
                    }
                    Err(error) => {
                        error!(target: "orchestrator", task, %error, "Task failed");
                        Some(TaskFailure { task, error })
                    }
                }
            }
            Err(err) => {
                let task = self.names.remove(&err.id()).unwrap_or("unknown");
                error!(target: "orchestrator", task, %err, "Task aborted");
                Some(TaskFailure { task, error: err.to_string() })
            }
        }
    }
}

impl IndexerService {
    /// Creates a new service.
    pub const fn new(config: ServiceConfig, components: Components) -> Self {
        Self { config, components }
    }

    /// Runs the service until `cancellation` fires or a task fails.
    pub async fn run(self, cancellation: CancellationToken) -> Result<(), ServiceError> {
        let Self { config, components } = self;

        let listener = TcpListener::bind(config.http_addr).await.map_err(ServiceError::Bind)?;
        let http_shutdown = CancellationToken::new();
        let reader: Arc<dyn StorageReader> = components.storage.clone();
        let mut http = tokio::spawn(indexer_api::serve(
            listener,
            ApiState::new(reader),
            http_shutdown.clone().cancelled_owned(),
        ));

        let mut workers = Workers::default();
        if config.sync {
            Self::spawn_workers(&mut workers, &config, &components, &cancellation);
        } else {
            info!(target: "orchestrator", "Sync disabled, serving the read API only");
        }

        let mut failures = Vec::new();
        let mut http_running = true;
        loop {
            tokio::select! {
                biased;
                _ = cancellation.cancelled() => {
                    info!(target: "orchestrator", "Shutdown requested");
                    break;
                }
                served = &mut http => {
                    http_running = false;
                    failures.push(
                        api_failure(served)
                            .unwrap_or_else(|| failure("api", "stopped unexpectedly")),
                    );
                    break;
                }
                Some(joined) = workers.set.join_next_with_id() => {
                    if let Some(failure) = workers.failure(joined) {
                        failures.push(failure);
                        break;
                    }
                }
            }
        }

        cancellation.cancel();
        while let Some(joined) = workers.set.join_next_with_id().await {
            failures.extend(workers.failure(joined));
        }

        http_shutdown.cancel();
        if http_running {
            match tokio::time::timeout(config.drain_timeout, &mut http).await {
                Ok(served) => failures.extend(api_failure(served)),
                Err(_) => {
                    warn!(
                        target: "orchestrator",
                        drain = ?config.drain_timeout,
                        "Read API did not drain in time, aborting"
                    );
                    http.abort();
                }
            }
        }

        Self::close(components).await;

        if failures.is_empty() {
            info!(target: "orchestrator", "Service stopped");
            Ok(())
        } else {
            Err(ServiceError::Tasks(failures))
        }
    }

    fn spawn_workers(
        workers: &mut Workers,
        config: &ServiceConfig,
        components: &Components,
        cancellation: &CancellationToken,
    ) {
        let Components { chain, storage, publisher, subscriber } = components;
        let pipeline =
            Arc::new(BlockPipeline::new(BlockExtractor::new(chain.clone()), publisher.clone()));

        workers.spawn(DeliveryActor::new(publisher.clone()), cancellation.clone());
        workers.spawn(
            HeadListener::new(chain.clone(), pipeline.clone(), config.listener),
            cancellation.clone(),
        );
        workers.spawn(
            HistoricalSyncer::new(chain.clone(), storage.clone(), pipeline, config.syncer),
            cancellation.clone(),
        );
        workers.spawn(
            EventConsumer::new(subscriber.clone(), storage.clone(), config.consumer),
            cancellation.clone(),
        );
    }

    /// Releases every handle, in dependency order. Errors are logged.
    async fn close(components: Components) {
        let Components { chain, storage, publisher, subscriber } = components;

        if let Err(err) = publisher.close().await {
            warn!(target: "orchestrator", %err, "Failed to close publisher");
        }
        if let Err(err) = subscriber.close().await {
            warn!(target: "orchestrator", %err, "Failed to close subscriber");
        }
        drop(chain);
        info!(target: "orchestrator", "Released chain connection");
        if let Err(err) = storage.close().await {
            warn!(target: "orchestrator", %err, "Failed to close storage");
        }
    }
}

fn failure(task: &'static str, error: impl ToString) -> TaskFailure {
    TaskFailure { task, error: error.to_string() }
}

/// Converts the outcome of the read API task into a failure, if it failed.
fn api_failure(served: Result<io::Result<()>, JoinError>) -> Option<TaskFailure> {
    match served {
        Ok(Ok(())) => None,
        Ok(Err(err)) => Some(failure("api", err)),
        Err(err) => Some(failure("api", err)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy_primitives::{Address, B256};
    use alloy_transport::TransportErrorKind;
    use indexer_broker::MemoryBroker;
    use indexer_core::{ChainReaderError, MockChainReader};
    use indexer_storage::{MemoryStorage, StorageError};
    use indexer_types::chain::{ChainBlock, ChainReceipt, ChainTransaction};
    use std::{
        net::{Ipv4Addr, SocketAddr},
        time::Duration,
    };

    fn chain_block(number: u64) -> ChainBlock {
        ChainBlock {
            hash: B256::with_last_byte(number as u8),
            number,
            transactions: vec![ChainTransaction {
                hash: B256::with_last_byte(0x80 | number as u8),
                ..Default::default()
            }],
            ..Default::default()
        }
    }

    fn config(sync: bool) -> ServiceConfig {
        ServiceConfig {
            http_addr: SocketAddr::from((Ipv4Addr::LOCALHOST, 0)),
            sync,
            drain_timeout: Duration::from_secs(1),
            ..Default::default()
        }
    }

    fn components(chain: MockChainReader, storage: Arc<MemoryStorage>) -> Components {
        let broker = Arc::new(MemoryBroker::default());
        Components {
            chain: Arc::new(chain),
            storage,
            publisher: broker.clone(),
            subscriber: broker,
        }
    }

    #[tokio::test]
    async fn test_sync_mode_indexes_history() {
        let mut chain = MockChainReader::new();
        chain.expect_subscribe_new_heads().returning(|| {
            Err(ChainReaderError::Transport(TransportErrorKind::custom_str("refused")))
        });
        chain
            .expect_block_by_number()
            .returning(|number| Ok(chain_block(number.unwrap_or(2))));
        chain.expect_batch_receipts().returning(|hashes| {
            Ok(hashes
                .iter()
                .map(|hash| ChainReceipt {
                    transaction_hash: *hash,
                    status: true,
                    ..Default::default()
                })
                .collect())
        });
        chain.expect_derive_sender().returning(|_, _, _| Ok(Address::ZERO));

        let storage = Arc::new(MemoryStorage::new());
        let service = IndexerService::new(config(true), components(chain, storage.clone()));
        let cancellation = CancellationToken::new();
        let handle = tokio::spawn(service.run(cancellation.clone()));

        tokio::time::timeout(Duration::from_secs(5), async {
            while storage.block_count().await < 2 || storage.tx_count().await < 2 {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .unwrap();

        cancellation.cancel();
        handle.await.unwrap().unwrap();
        assert!(matches!(storage.first_block().await, Err(StorageError::Closed)));
    }

    #[tokio::test]
    async fn test_first_failure_stops_every_task() {
        let mut chain = MockChainReader::new();
        chain
            .expect_subscribe_new_heads()
            .returning(|| Err(ChainReaderError::PubsubUnavailable));
        chain.expect_block_by_number().returning(|_| Ok(ChainBlock::default()));

        let storage = Arc::new(MemoryStorage::new());
        let service = IndexerService::new(config(true), components(chain, storage.clone()));

        let run = service.run(CancellationToken::new());
        let err = tokio::time::timeout(Duration::from_secs(5), run).await.unwrap().unwrap_err();
        let failures = match err {
            ServiceError::Tasks(failures) => failures,
            other => panic!("unexpected error: {other}"),
        };
        assert_eq!(failures.len(), 1);
        assert_eq!(failures[0].task, "listener");
        assert!(matches!(storage.first_block().await, Err(StorageError::Closed)));
    }

    #[tokio::test]
    async fn test_read_only_mode_stops_on_cancellation() {
        let storage = Arc::new(MemoryStorage::new());
        let service =
            IndexerService::new(config(false), components(MockChainReader::new(), storage));

        let cancellation = CancellationToken::new();
        cancellation.cancel();
        service.run(cancellation).await.unwrap();
    }

    #[tokio::test]
    async fn test_bind_failure_starts_nothing() {
        let taken = TcpListener::bind((Ipv4Addr::LOCALHOST, 0)).await.unwrap();
        let mut config = config(true);
        config.http_addr = taken.local_addr().unwrap();

        let mut chain = MockChainReader::new();
        chain.expect_subscribe_new_heads().never();

        let service =
            IndexerService::new(config, components(chain, Arc::new(MemoryStorage::new())));
        let err = service.run(CancellationToken::new()).await.unwrap_err();
        assert!(matches!(err, ServiceError::Bind(_)));
    }
}
