//! Per-topic wakeup signalling
//!
//! Each topic owns one [`TopicSignal`]: a broadcast condition that Publish
//! (and the delayed sweeper) fire after appending, plus the set of consumer
//! ids currently parked on the topic. Waiters must register before the
//! store-empty check and re-check after wakeup; spurious wakeups are
//! handled by the consumer loop.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, RwLock};

use tokio::sync::futures::Notified;
use tokio::sync::Notify;

/// Registry of per-topic wakeup signals, created lazily on first use
#[derive(Default)]
pub struct TopicSignals {
    topics: RwLock<HashMap<String, Arc<TopicSignal>>>,
}

impl TopicSignals {
    pub fn new() -> Self {
        Self::default()
    }

    /// Get or create the signal for a topic
    pub fn topic(&self, name: &str) -> Arc<TopicSignal> {
        if let Some(signal) = self
            .topics
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(name)
        {
            return signal.clone();
        }

        let mut topics = self.topics.write().unwrap_or_else(|e| e.into_inner());
        topics
            .entry(name.to_string())
            .or_insert_with(|| Arc::new(TopicSignal::default()))
            .clone()
    }

    /// Wake every consumer parked on a topic
    ///
    /// A no-op for topics no consumer has touched yet: a waiter always
    /// creates the signal entry before parking, and re-checks the store
    /// after enabling its wakeup future, so nothing is lost.
    pub fn notify(&self, name: &str) {
        let signal = self
            .topics
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(name)
            .cloned();
        if let Some(signal) = signal {
            signal.notify.notify_waiters();
        }
    }

    /// Wake every consumer on every topic (shutdown path)
    pub fn notify_all(&self) {
        let signals: Vec<Arc<TopicSignal>> = self
            .topics
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .values()
            .cloned()
            .collect();
        for signal in signals {
            signal.notify.notify_waiters();
        }
    }

    /// Remove a consumer id from every topic's waiter set
    pub fn remove_waiter(&self, consumer_id: &str) {
        let signals: Vec<Arc<TopicSignal>> = self
            .topics
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .values()
            .cloned()
            .collect();
        for signal in signals {
            signal.remove(consumer_id);
        }
    }

    /// Number of consumers currently parked on a topic
    pub fn waiter_count(&self, name: &str) -> usize {
        self.topics
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(name)
            .map(|s| s.waiters.lock().unwrap_or_else(|e| e.into_inner()).len())
            .unwrap_or(0)
    }
}

/// One topic's condition and waiter set
#[derive(Default)]
pub struct TopicSignal {
    notify: Notify,
    waiters: Mutex<HashSet<String>>,
}

impl TopicSignal {
    /// Future that resolves on the next `notify`.
    ///
    /// Callers must `enable()` the pinned future before their final
    /// store-empty re-check, otherwise a publish landing between check
    /// and await is lost.
    pub fn notified(&self) -> Notified<'_> {
        self.notify.notified()
    }

    /// Register a consumer as parked; deregistered when the guard drops
    pub fn register(self: &Arc<Self>, consumer_id: &str) -> WaiterGuard {
        self.waiters
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(consumer_id.to_string());
        WaiterGuard {
            signal: self.clone(),
            consumer_id: consumer_id.to_string(),
        }
    }

    fn remove(&self, consumer_id: &str) {
        self.waiters
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove(consumer_id);
    }
}

/// Removes the consumer from the waiter set on drop
pub struct WaiterGuard {
    signal: Arc<TopicSignal>,
    consumer_id: String,
}

impl Drop for WaiterGuard {
    fn drop(&mut self) {
        self.signal.remove(&self.consumer_id);
    }
}
