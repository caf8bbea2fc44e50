//! An in-process broker.
//!
//! Used by tests and by single-process deployments that run with `--broker memory`. It keeps a
//! single ordered log shared by both channels, bounded by the number of uncommitted messages.

use crate::{BrokerError, Delivery, Metrics, PublishError, Publisher, Subscriber, Topic};
use async_trait::async_trait;
use std::{
    collections::VecDeque,
    sync::{Arc, Mutex, MutexGuard, PoisonError},
    time::Duration,
};
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

/// Configuration of a [`MemoryBroker`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MemoryBrokerConfig {
    /// Maximum number of uncommitted messages before publishing fails with
    /// [`PublishError::QueueFull`].
    pub capacity: usize,
    /// How long [`Subscriber::poll`] waits for a message before returning `None`.
    pub poll_timeout: Duration,
}

impl Default for MemoryBrokerConfig {
    fn default() -> Self {
        Self { capacity: 100_000, poll_timeout: Duration::from_millis(100) }
    }
}

/// Bounded in-process broker implementing both [`Publisher`] and [`Subscriber`].
///
/// Clones share the same log.
#[derive(Debug, Clone)]
pub struct MemoryBroker {
    shared: Arc<Shared>,
}

#[derive(Debug)]
struct Shared {
    config: MemoryBrokerConfig,
    state: Mutex<State>,
    notify: Notify,
}

#[derive(Debug, Default)]
struct State {
    log: VecDeque<Entry>,
    /// Offset of the first entry in `log`.
    base: i64,
    /// Offset of the next entry to hand out.
    next: i64,
    /// Entries in `log` that are not committed yet.
    uncommitted: usize,
    publisher_closed: bool,
    subscriber_closed: bool,
}

#[derive(Debug)]
struct Entry {
    topic: Topic,
    payload: Vec<u8>,
    committed: bool,
}

impl State {
    fn entry_mut(&mut self, offset: i64) -> Option<&mut Entry> {
        let idx = usize::try_from(offset.checked_sub(self.base)?).ok()?;
        self.log.get_mut(idx)
    }

    /// Hands out the next uncommitted entry, if any.
    fn take_next(&mut self) -> Option<Delivery> {
        loop {
            let offset = self.next;
            let entry = self.entry_mut(offset)?;
            let committed = entry.committed;
            let delivery = Delivery {
                topic: entry.topic,
                partition: 0,
                offset,
                payload: entry.payload.clone(),
            };
            self.next += 1;
            if !committed {
                return Some(delivery);
            }
        }
    }

    /// Drops committed entries from the front of the log.
    fn compact(&mut self) {
        while self.log.front().is_some_and(|e| e.committed) {
            self.log.pop_front();
            self.base += 1;
        }
        self.next = self.next.max(self.base);
    }
}

impl Default for MemoryBroker {
    fn default() -> Self {
        Self::new(MemoryBrokerConfig::default())
    }
}

impl MemoryBroker {
    /// Creates an empty broker.
    pub fn new(config: MemoryBrokerConfig) -> Self {
        Self {
            shared: Arc::new(Shared {
                config,
                state: Mutex::new(State::default()),
                notify: Notify::new(),
            }),
        }
    }

    /// Number of messages that were published but not yet committed.
    pub fn pending(&self) -> usize {
        self.state().uncommitted
    }

    fn state(&self) -> MutexGuard<'_, State> {
        // The state is never left half-updated, so a poisoned lock is still usable.
        self.shared.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl Publisher for MemoryBroker {
    fn publish(&self, topic: Topic, payload: Vec<u8>) -> Result<(), PublishError> {
        let result = {
            let mut state = self.state();
            if state.publisher_closed {
                Err(PublishError::Closed)
            } else if state.uncommitted >= self.shared.config.capacity {
                Err(PublishError::QueueFull)
            } else {
                state.log.push_back(Entry { topic, payload, committed: false });
                state.uncommitted += 1;
                Ok(())
            }
        };

        if result.is_ok() {
            trace!(target: "publisher", %topic, "Enqueued record");
            self.shared.notify.notify_one();
        }
        Metrics::record_publish(topic, &result);
        result
    }

    async fn run_delivery_loop(&self, cancellation: CancellationToken) {
        // Enqueued records are delivered synchronously; there are no reports to drain.
        cancellation.cancelled().await;
        debug!(target: "publisher", "Delivery loop stopped");
    }

    async fn close(&self) -> Result<(), BrokerError> {
        self.state().publisher_closed = true;
        debug!(target: "publisher", "Memory publisher closed");
        Ok(())
    }
}

#[async_trait]
impl Subscriber for MemoryBroker {
    async fn poll(&self) -> Result<Option<Delivery>, BrokerError> {
        let deadline = tokio::time::Instant::now() + self.shared.config.poll_timeout;
        loop {
            {
                let mut state = self.state();
                if state.subscriber_closed {
                    return Err(BrokerError::Closed);
                }
                if let Some(delivery) = state.take_next() {
                    return Ok(Some(delivery));
                }
            }

            if tokio::time::timeout_at(deadline, self.shared.notify.notified()).await.is_err() {
                return Ok(None);
            }
        }
    }

    fn commit(&self, delivery: &Delivery) -> Result<(), BrokerError> {
        let mut state = self.state();
        if state.subscriber_closed {
            return Err(BrokerError::Closed);
        }
        if let Some(entry) = state.entry_mut(delivery.offset).filter(|e| !e.committed) {
            entry.committed = true;
            state.uncommitted -= 1;
        }
        state.compact();
        Ok(())
    }

    async fn redeliver(&self, delivery: &Delivery) -> Result<(), BrokerError> {
        {
            let mut state = self.state();
            if state.subscriber_closed {
                return Err(BrokerError::Closed);
            }
            state.next = state.next.min(delivery.offset).max(state.base);
        }
        metrics::counter!(Metrics::REDELIVERED_TOTAL).increment(1);
        self.shared.notify.notify_one();
        Ok(())
    }

    async fn close(&self) -> Result<(), BrokerError> {
        self.state().subscriber_closed = true;
        self.shared.notify.notify_waiters();
        debug!(target: "consumer", "Memory subscriber closed");
        Ok(())
    }
}
