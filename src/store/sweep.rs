//! Delayed-partition sweeper
//!
//! A scheduled task that periodically promotes due delayed entries back
//! onto their topic's main partition and wakes any consumers parked on
//! those topics. Promotion itself is a store primitive; the sweep only
//! supplies cadence and wakeups.

use crate::signal::TopicSignals;
use crate::store::Store;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Handle to the background sweep task
pub struct Sweeper {
    shutdown: CancellationToken,
    handle: JoinHandle<()>,
}

impl Sweeper {
    /// Spawn a sweep loop over `store`, waking `signals` for every topic
    /// that receives promotions
    pub fn spawn(
        store: Arc<dyn Store>,
        signals: Arc<TopicSignals>,
        interval: Duration,
    ) -> Self {
        let shutdown = CancellationToken::new();
        let token = shutdown.clone();

        let handle = tokio::spawn(async move {
            let mut tick = tokio::time::interval(interval);
            tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = tick.tick() => {
                        match store.promote_due().await {
                            Ok(topics) => {
                                for topic in topics {
                                    tracing::debug!(topic = %topic, "promoted delayed entries");
                                    signals.notify(&topic);
                                }
                            }
                            Err(e) => {
                                tracing::warn!(error = %e, "delayed sweep failed");
                            }
                        }
                    }
                }
            }
        });

        Self { shutdown, handle }
    }

    /// Stop the sweep loop and wait for it to finish
    pub async fn stop(self) {
        self.shutdown.cancel();
        let _ = self.handle.await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use crate::types::Value;

    #[tokio::test]
    async fn test_sweeper_promotes_and_notifies() {
        let store: Arc<dyn Store> = Arc::new(MemoryStore::new());
        let signals = Arc::new(TopicSignals::new());

        store.append("t", Value::from("v")).await.unwrap();
        store
            .dack("t", Value::from("v"), Duration::from_millis(10))
            .await
            .unwrap();

        // Park a waiter before spawning the sweep
        let signal = signals.topic("t");
        let notified = signal.notified();
        tokio::pin!(notified);
        notified.as_mut().enable();

        let sweeper = Sweeper::spawn(store.clone(), signals.clone(), Duration::from_millis(20));

        tokio::time::timeout(Duration::from_secs(2), notified)
            .await
            .expect("sweep should wake the waiter");

        let (head, _) = store.get_next("t").await.unwrap();
        assert_eq!(head, Value::from("v"));

        sweeper.stop().await;
    }

    #[tokio::test]
    async fn test_sweeper_stops_cleanly() {
        let store: Arc<dyn Store> = Arc::new(MemoryStore::new());
        let signals = Arc::new(TopicSignals::new());

        let sweeper = Sweeper::spawn(store, signals, Duration::from_millis(5));
        tokio::time::sleep(Duration::from_millis(20)).await;
        sweeper.stop().await;
    }
}
