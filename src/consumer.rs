//! Consumer session — the one-in-flight state machine
//!
//! A consumer is bound to one topic and holds at most one undelivered
//! value. `next` blocks until a value is available or the consumer is
//! cancelled; the resolution calls (`ack`, `nack`, `back`, `dack`) route
//! the held value back into store offsets. Callers serialize their own
//! `next` calls — one session, one loop.

use crate::error::{QueueError, Result};
use crate::signal::TopicSignals;
use crate::store::Store;
use crate::types::Value;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// A single subscriber session on one topic
pub struct Consumer {
    id: String,
    topic: String,
    store: Arc<dyn Store>,
    signals: Arc<TopicSignals>,
    cancel: CancellationToken,
    in_flight: Mutex<Option<Value>>,
}

impl Consumer {
    pub(crate) fn new(
        id: String,
        topic: String,
        store: Arc<dyn Store>,
        signals: Arc<TopicSignals>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            id,
            topic,
            store,
            signals,
            cancel,
            in_flight: Mutex::new(None),
        }
    }

    /// Unique consumer id, generated at subscribe time
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Topic this consumer is bound to
    pub fn topic(&self) -> &str {
        &self.topic
    }

    /// True once the consumer has been cancelled or the broker shut down
    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Next value on the topic, blocking until one is available
    ///
    /// Fast path returns the value at the main cursor. When the store is
    /// empty the consumer registers as a waiter and parks on the topic's
    /// signal until a publish (or delayed promotion) wakes it, re-polling
    /// on every wakeup. Returns `Cancelled` promptly when the consumer is
    /// unsubscribed or the broker shuts down, without touching the store.
    pub async fn next(&self) -> Result<Value> {
        if self.held().is_some() {
            return Err(QueueError::AlreadyInFlight);
        }

        let signal = self.signals.topic(&self.topic);
        loop {
            if self.cancel.is_cancelled() {
                return Err(QueueError::Cancelled);
            }

            match self.store.get_next(&self.topic).await {
                Ok((value, offset)) => return Ok(self.hold(value, offset)),
                Err(e) if e.is_empty() => {}
                Err(e) => return Err(e),
            }

            // Arm the wakeup before the final empty re-check: a publish
            // landing after the check then finds the waiter armed.
            let notified = signal.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();
            let _guard = signal.register(&self.id);

            match self.store.get_next(&self.topic).await {
                Ok((value, offset)) => return Ok(self.hold(value, offset)),
                Err(e) if e.is_empty() => {}
                Err(e) => return Err(e),
            }

            tokio::select! {
                _ = &mut notified => {}
                _ = self.cancel.cancelled() => return Err(QueueError::Cancelled),
            }
        }
    }

    /// Commit the held value: the cursor advances past it
    pub async fn ack(&self) -> Result<()> {
        self.held().ok_or(QueueError::NoInFlight)?;
        self.store.ack(&self.topic).await?;
        self.release();
        Ok(())
    }

    /// Reject the held value; the head stays and re-delivers on `next`
    pub async fn nack(&self) -> Result<()> {
        self.held().ok_or(QueueError::NoInFlight)?;
        self.store.nack(&self.topic).await?;
        self.release();
        Ok(())
    }

    /// Rewind the cursor one value; the previous value becomes
    /// deliverable again
    pub async fn back(&self) -> Result<()> {
        self.held().ok_or(QueueError::NoInFlight)?;
        self.store.back(&self.topic).await?;
        self.release();
        Ok(())
    }

    /// Reschedule the held value to reappear after `delay`
    pub async fn dack(&self, delay: Duration) -> Result<()> {
        let value = self.held().ok_or(QueueError::NoInFlight)?;
        self.store.dack(&self.topic, value, delay).await?;
        self.release();
        Ok(())
    }

    pub(crate) fn cancel_token(&self) -> &CancellationToken {
        &self.cancel
    }

    fn held(&self) -> Option<Value> {
        self.in_flight
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    fn hold(&self, value: Value, offset: u64) -> Value {
        tracing::debug!(
            consumer = %self.id,
            topic = %self.topic,
            offset,
            "value delivered"
        );
        *self.in_flight.lock().unwrap_or_else(|e| e.into_inner()) = Some(value.clone());
        value
    }

    fn release(&self) {
        *self.in_flight.lock().unwrap_or_else(|e| e.into_inner()) = None;
    }
}
