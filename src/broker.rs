//! Broker — topic registry, consumer lifecycle, publish fan-out
//!
//! The broker owns the set of topics and their wakeup signals, creates
//! consumer sessions, and serializes every mutation through the backing
//! store. Publish appends first, then wakes the topic's waiters, so a
//! consumer that subscribed before publish returned either observes the
//! value on its next poll or is woken. The registry lock is held for
//! membership changes only, never across a store call or a park.

use crate::consumer::Consumer;
use crate::error::{QueueError, Result};
use crate::signal::TopicSignals;
use crate::store::Store;
use crate::types::{BrokerInfo, Value};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;

/// Process-wide queue hub backed by a pluggable store
pub struct Broker {
    store: Arc<dyn Store>,
    signals: Arc<TopicSignals>,

    /// Live consumer sessions (consumer id → entry)
    consumers: Arc<RwLock<HashMap<String, ConsumerEntry>>>,

    /// Root cancellation; every consumer gets a child token
    shutdown: CancellationToken,
}

struct ConsumerEntry {
    topic: String,
    cancel: CancellationToken,
}

impl Broker {
    /// Create a broker over a store
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self {
            store,
            signals: Arc::new(TopicSignals::new()),
            consumers: Arc::new(RwLock::new(HashMap::new())),
            shutdown: CancellationToken::new(),
        }
    }

    /// The per-topic wakeup registry, shared with the delayed sweeper
    pub fn signals(&self) -> Arc<TopicSignals> {
        self.signals.clone()
    }

    /// The backing store
    pub fn store(&self) -> Arc<dyn Store> {
        self.store.clone()
    }

    /// Append a value to a topic and wake its waiters
    pub async fn publish(&self, topic: &str, value: Value) -> Result<u64> {
        if topic.is_empty() {
            return Err(QueueError::Protocol("topic name must not be empty".into()));
        }

        let offset = self.store.append(topic, value).await?;
        self.signals.notify(topic);

        tracing::debug!(topic, offset, "value published");
        Ok(offset)
    }

    /// Create a consumer session on a topic
    ///
    /// The caller drives delivery with `Consumer::next`; no background
    /// work starts here.
    pub async fn subscribe(&self, topic: &str) -> Result<Arc<Consumer>> {
        if topic.is_empty() {
            return Err(QueueError::Protocol("topic name must not be empty".into()));
        }

        let id = format!("con-{}", uuid::Uuid::new_v4());
        let cancel = self.shutdown.child_token();

        let consumer = Arc::new(Consumer::new(
            id.clone(),
            topic.to_string(),
            self.store.clone(),
            self.signals.clone(),
            cancel.clone(),
        ));

        {
            let mut consumers = self.consumers.write().await;
            consumers.insert(
                id.clone(),
                ConsumerEntry {
                    topic: topic.to_string(),
                    cancel,
                },
            );
        }

        tracing::info!(consumer = %id, topic, "consumer subscribed");
        Ok(consumer)
    }

    /// Remove a consumer session
    ///
    /// Idempotent. Clears the consumer from every waiter set and cancels
    /// its token, so a parked `next` returns `Cancelled` promptly.
    pub async fn unsubscribe(&self, topic: &str, consumer_id: &str) -> Result<()> {
        let entry = {
            let mut consumers = self.consumers.write().await;
            consumers.remove(consumer_id)
        };

        self.signals.remove_waiter(consumer_id);

        if let Some(entry) = entry {
            entry.cancel.cancel();
            tracing::info!(consumer = %consumer_id, topic, "consumer unsubscribed");
        } else {
            tracing::debug!(consumer = %consumer_id, topic, "unsubscribe for unknown consumer");
        }
        Ok(())
    }

    /// Snapshot of topic names known to the store
    pub async fn topics(&self) -> Result<Vec<String>> {
        self.store.topics().await
    }

    /// Store totals plus the live consumer count
    pub async fn info(&self) -> Result<BrokerInfo> {
        let store = self.store.info().await?;
        let consumers = self.consumers.read().await.len();
        Ok(BrokerInfo { store, consumers })
    }

    /// Number of live consumer sessions
    pub async fn consumer_count(&self) -> usize {
        self.consumers.read().await.len()
    }

    /// Cancel every consumer and release all waiters
    pub async fn shutdown(&self) {
        self.shutdown.cancel();
        self.signals.notify_all();

        let mut consumers = self.consumers.write().await;
        let drained = consumers.len();
        consumers.clear();

        tracing::info!(consumers = drained, "broker shut down");
    }
}
