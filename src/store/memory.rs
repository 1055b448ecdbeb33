//! In-memory store for testing and single-process use

use crate::error::{QueueError, Result};
use crate::store::{Store, StoreOptions};
use crate::types::{now_millis, DelayedEntry, StoreInfo, Value};
use async_trait::async_trait;
use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::RwLock;

/// In-memory implementation of [`Store`]
///
/// Holds every partition in process memory. Contents are lost on drop,
/// which is exactly what tests want; durability guarantees are trivially
/// satisfied.
#[derive(Default)]
pub struct MemoryStore {
    options: StoreOptions,
    inner: RwLock<Inner>,
}

#[derive(Default)]
struct Inner {
    topics: HashMap<String, TopicState>,
    closed: bool,
}

#[derive(Default)]
struct TopicState {
    main: Vec<Value>,
    cursor: usize,
    delayed: Vec<DelayedEntry>,
    dlq: Vec<Value>,
    head_nacks: u32,
}

impl MemoryStore {
    /// Create a store with default options
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store with explicit options
    pub fn with_options(options: StoreOptions) -> Self {
        Self {
            options,
            ..Default::default()
        }
    }

    /// Number of dead-lettered values on a topic (test/inspection hook)
    pub async fn dead_letter_count(&self, topic: &str) -> usize {
        let inner = self.inner.read().await;
        inner.topics.get(topic).map(|t| t.dlq.len()).unwrap_or(0)
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn append(&self, topic: &str, value: Value) -> Result<u64> {
        let mut inner = self.inner.write().await;
        inner.ensure_open()?;
        let state = inner.topics.entry(topic.to_string()).or_default();
        state.main.push(value);
        Ok((state.main.len() - 1) as u64)
    }

    async fn get_next(&self, topic: &str) -> Result<(Value, u64)> {
        let inner = self.inner.read().await;
        inner.ensure_open()?;
        let state = inner
            .topics
            .get(topic)
            .ok_or_else(|| QueueError::Empty(topic.to_string()))?;
        match state.main.get(state.cursor) {
            Some(value) => Ok((value.clone(), state.cursor as u64)),
            None => Err(QueueError::Empty(topic.to_string())),
        }
    }

    async fn ack(&self, topic: &str) -> Result<()> {
        let mut inner = self.inner.write().await;
        inner.ensure_open()?;
        let state = inner.head_state(topic)?;
        state.cursor += 1;
        state.head_nacks = 0;
        Ok(())
    }

    async fn nack(&self, topic: &str) -> Result<()> {
        let max_nacks = self.options.max_nacks;
        let mut inner = self.inner.write().await;
        inner.ensure_open()?;
        let state = inner.head_state(topic)?;
        state.head_nacks += 1;

        if let Some(max) = max_nacks {
            if state.head_nacks >= max {
                let value = state.main[state.cursor].clone();
                state.dlq.push(value);
                state.cursor += 1;
                state.head_nacks = 0;
                tracing::warn!(topic, "head value dead-lettered after {} nacks", max);
            }
        }
        Ok(())
    }

    async fn back(&self, topic: &str) -> Result<()> {
        let mut inner = self.inner.write().await;
        inner.ensure_open()?;
        if let Some(state) = inner.topics.get_mut(topic) {
            state.cursor = state.cursor.saturating_sub(1);
            state.head_nacks = 0;
        }
        Ok(())
    }

    async fn dack(&self, topic: &str, value: Value, delay: Duration) -> Result<()> {
        let mut inner = self.inner.write().await;
        inner.ensure_open()?;
        let state = inner.head_state(topic)?;
        state.delayed.push(DelayedEntry::new(value, delay));
        state.cursor += 1;
        state.head_nacks = 0;
        Ok(())
    }

    async fn dead_letter(&self, topic: &str) -> Result<()> {
        let mut inner = self.inner.write().await;
        inner.ensure_open()?;
        let state = inner.head_state(topic)?;
        let value = state.main[state.cursor].clone();
        state.dlq.push(value);
        state.cursor += 1;
        state.head_nacks = 0;
        Ok(())
    }

    async fn promote_due(&self) -> Result<Vec<String>> {
        let now = now_millis();
        let mut inner = self.inner.write().await;
        inner.ensure_open()?;

        let mut promoted_topics = Vec::new();
        for (name, state) in inner.topics.iter_mut() {
            let mut due: Vec<DelayedEntry> = Vec::new();
            state.delayed.retain(|entry| {
                if entry.is_due(now) {
                    due.push(entry.clone());
                    false
                } else {
                    true
                }
            });
            if due.is_empty() {
                continue;
            }
            due.sort_by_key(|entry| entry.due_at);
            state.main.extend(due.into_iter().map(|entry| entry.value));
            promoted_topics.push(name.clone());
        }
        Ok(promoted_topics)
    }

    async fn topics(&self) -> Result<Vec<String>> {
        let inner = self.inner.read().await;
        inner.ensure_open()?;
        let mut names: Vec<String> = inner.topics.keys().cloned().collect();
        names.sort();
        Ok(names)
    }

    async fn info(&self) -> Result<StoreInfo> {
        let inner = self.inner.read().await;
        inner.ensure_open()?;
        let mut info = StoreInfo {
            topics: inner.topics.len(),
            ..Default::default()
        };
        for state in inner.topics.values() {
            info.messages += (state.main.len() - state.cursor.min(state.main.len())) as u64;
            info.delayed += state.delayed.len() as u64;
            info.dead_lettered += state.dlq.len() as u64;
        }
        Ok(info)
    }

    async fn close(&self) -> Result<()> {
        let mut inner = self.inner.write().await;
        inner.closed = true;
        Ok(())
    }
}

impl Inner {
    fn ensure_open(&self) -> Result<()> {
        if self.closed {
            return Err(QueueError::Closed);
        }
        Ok(())
    }

    /// Topic state with a value guaranteed at the cursor
    fn head_state(&mut self, topic: &str) -> Result<&mut TopicState> {
        let state = self.topics.entry(topic.to_string()).or_default();
        if state.cursor >= state.main.len() {
            return Err(QueueError::Empty(topic.to_string()));
        }
        Ok(state)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn value(s: &str) -> Value {
        Value::from(s)
    }

    #[tokio::test]
    async fn test_append_assigns_sequential_offsets() {
        let store = MemoryStore::new();
        assert_eq!(store.append("t", value("a")).await.unwrap(), 0);
        assert_eq!(store.append("t", value("b")).await.unwrap(), 1);
        assert_eq!(store.append("other", value("c")).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_get_next_redelivers_until_ack() {
        let store = MemoryStore::new();
        store.append("t", value("a")).await.unwrap();

        let (first, offset) = store.get_next("t").await.unwrap();
        assert_eq!(first, value("a"));
        assert_eq!(offset, 0);

        // No cursor movement without an ack
        let (again, _) = store.get_next("t").await.unwrap();
        assert_eq!(again, value("a"));

        store.ack("t").await.unwrap();
        assert!(store.get_next("t").await.unwrap_err().is_empty());
    }

    #[tokio::test]
    async fn test_get_next_empty_topic() {
        let store = MemoryStore::new();
        let err = store.get_next("nothing").await.unwrap_err();
        assert!(err.is_empty());
    }

    #[tokio::test]
    async fn test_ack_at_tail_is_empty() {
        let store = MemoryStore::new();
        assert!(store.ack("t").await.unwrap_err().is_empty());
    }

    #[tokio::test]
    async fn test_nack_keeps_head_by_default() {
        let store = MemoryStore::new();
        store.append("t", value("a")).await.unwrap();

        for _ in 0..10 {
            store.nack("t").await.unwrap();
        }
        let (head, _) = store.get_next("t").await.unwrap();
        assert_eq!(head, value("a"));
        assert_eq!(store.dead_letter_count("t").await, 0);
    }

    #[tokio::test]
    async fn test_nack_policy_dead_letters_head() {
        let store = MemoryStore::with_options(StoreOptions {
            max_nacks: Some(3),
        });
        store.append("t", value("poison")).await.unwrap();
        store.append("t", value("good")).await.unwrap();

        store.nack("t").await.unwrap();
        store.nack("t").await.unwrap();
        assert_eq!(store.dead_letter_count("t").await, 0);

        store.nack("t").await.unwrap();
        assert_eq!(store.dead_letter_count("t").await, 1);

        let (head, _) = store.get_next("t").await.unwrap();
        assert_eq!(head, value("good"));
    }

    #[tokio::test]
    async fn test_back_rewinds_and_clamps() {
        let store = MemoryStore::new();
        store.append("t", value("a")).await.unwrap();
        store.append("t", value("b")).await.unwrap();

        store.ack("t").await.unwrap();
        store.back("t").await.unwrap();
        let (head, offset) = store.get_next("t").await.unwrap();
        assert_eq!(head, value("a"));
        assert_eq!(offset, 0);

        // Clamped at zero, silently
        store.back("t").await.unwrap();
        store.back("t").await.unwrap();
        let (head, offset) = store.get_next("t").await.unwrap();
        assert_eq!(head, value("a"));
        assert_eq!(offset, 0);
    }

    #[tokio::test]
    async fn test_dack_advances_cursor_and_parks_value() {
        let store = MemoryStore::new();
        store.append("t", value("a")).await.unwrap();

        store
            .dack("t", value("a"), Duration::from_secs(60))
            .await
            .unwrap();

        // Cursor moved past the head; nothing due yet
        assert!(store.get_next("t").await.unwrap_err().is_empty());
        assert!(store.promote_due().await.unwrap().is_empty());

        let info = store.info().await.unwrap();
        assert_eq!(info.delayed, 1);
    }

    #[tokio::test]
    async fn test_promote_due_preserves_due_order() {
        let store = MemoryStore::new();
        store.append("t", value("x")).await.unwrap();
        store.append("t", value("y")).await.unwrap();

        // Later-due first, to prove the sweep sorts the batch
        store
            .dack("t", value("x"), Duration::from_millis(20))
            .await
            .unwrap();
        store
            .dack("t", value("y"), Duration::from_millis(1))
            .await
            .unwrap();

        tokio::time::sleep(Duration::from_millis(40)).await;
        let promoted = store.promote_due().await.unwrap();
        assert_eq!(promoted, vec!["t".to_string()]);

        let (first, _) = store.get_next("t").await.unwrap();
        assert_eq!(first, value("y"));
        store.ack("t").await.unwrap();
        let (second, _) = store.get_next("t").await.unwrap();
        assert_eq!(second, value("x"));
    }

    #[tokio::test]
    async fn test_dead_letter_moves_head() {
        let store = MemoryStore::new();
        store.append("t", value("bad")).await.unwrap();
        store.append("t", value("ok")).await.unwrap();

        store.dead_letter("t").await.unwrap();
        assert_eq!(store.dead_letter_count("t").await, 1);

        let (head, _) = store.get_next("t").await.unwrap();
        assert_eq!(head, value("ok"));
    }

    #[tokio::test]
    async fn test_topics_sorted() {
        let store = MemoryStore::new();
        store.append("zeta", value("1")).await.unwrap();
        store.append("alpha", value("2")).await.unwrap();
        assert_eq!(
            store.topics().await.unwrap(),
            vec!["alpha".to_string(), "zeta".to_string()]
        );
    }

    #[tokio::test]
    async fn test_info_counts_undelivered_only() {
        let store = MemoryStore::new();
        store.append("t", value("a")).await.unwrap();
        store.append("t", value("b")).await.unwrap();
        store.ack("t").await.unwrap();

        let info = store.info().await.unwrap();
        assert_eq!(info.topics, 1);
        assert_eq!(info.messages, 1);
    }

    #[tokio::test]
    async fn test_closed_store_rejects_operations() {
        let store = MemoryStore::new();
        store.append("t", value("a")).await.unwrap();
        store.close().await.unwrap();

        assert!(matches!(
            store.append("t", value("b")).await,
            Err(QueueError::Closed)
        ));
        assert!(matches!(
            store.get_next("t").await,
            Err(QueueError::Closed)
        ));
        assert!(matches!(store.topics().await, Err(QueueError::Closed)));
    }
}
