//! Core types for the miniqueue system

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// A single message payload
///
/// Payloads are opaque to the queue — the broker never inspects `raw`.
/// `Bytes` keeps clones cheap when a value is handed to a consumer while
/// the store retains its own copy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Value {
    /// The raw payload bytes
    pub raw: Bytes,
}

impl Value {
    /// Create a value from anything convertible to `Bytes`
    pub fn new(raw: impl Into<Bytes>) -> Self {
        Self { raw: raw.into() }
    }

    /// Payload length in bytes
    pub fn len(&self) -> usize {
        self.raw.len()
    }

    /// True if the payload is empty
    pub fn is_empty(&self) -> bool {
        self.raw.is_empty()
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Self::new(s.as_bytes().to_vec())
    }
}

impl From<Vec<u8>> for Value {
    fn from(v: Vec<u8>) -> Self {
        Self::new(v)
    }
}

impl From<Bytes> for Value {
    fn from(b: Bytes) -> Self {
        Self { raw: b }
    }
}

/// A value parked in a topic's delayed partition
///
/// Created by Dack; promoted back onto the main partition once
/// `due_at` has passed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DelayedEntry {
    /// Unix timestamp in milliseconds at which the value becomes due
    pub due_at: u64,

    /// The delayed payload
    pub value: Value,
}

impl DelayedEntry {
    /// Create an entry due `delay` from now
    pub fn new(value: Value, delay: Duration) -> Self {
        Self {
            due_at: now_millis() + delay.as_millis() as u64,
            value,
        }
    }

    /// True once the entry's due-time has passed
    pub fn is_due(&self, now: u64) -> bool {
        self.due_at <= now
    }
}

/// Store-level totals, served by the INFO command
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoreInfo {
    /// Number of known topics
    pub topics: usize,

    /// Messages currently in main partitions (at or past the cursor)
    pub messages: u64,

    /// Entries waiting in delayed partitions
    pub delayed: u64,

    /// Entries resting in dead-letter partitions
    pub dead_lettered: u64,
}

/// Broker-level status: store totals plus live consumer count
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BrokerInfo {
    /// Totals from the backing store
    #[serde(flatten)]
    pub store: StoreInfo,

    /// Live consumer sessions
    pub consumers: usize,
}

/// Current time in Unix milliseconds
pub(crate) fn now_millis() -> u64 {
    chrono::Utc::now().timestamp_millis().max(0) as u64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_value_from_str() {
        let v = Value::from("hello");
        assert_eq!(v.raw.as_ref(), b"hello");
        assert_eq!(v.len(), 5);
        assert!(!v.is_empty());
    }

    #[test]
    fn test_value_from_vec() {
        let v = Value::from(vec![1u8, 2, 3]);
        assert_eq!(v.raw.as_ref(), &[1, 2, 3]);
    }

    #[test]
    fn test_value_clone_is_cheap_alias() {
        let v = Value::from("payload");
        let c = v.clone();
        assert_eq!(v, c);
    }

    #[test]
    fn test_delayed_entry_due() {
        let entry = DelayedEntry::new(Value::from("x"), Duration::from_secs(30));
        let now = now_millis();
        assert!(!entry.is_due(now));
        assert!(entry.is_due(now + 31_000));
    }

    #[test]
    fn test_delayed_entry_zero_delay_is_due() {
        let entry = DelayedEntry::new(Value::from("x"), Duration::ZERO);
        assert!(entry.is_due(now_millis() + 1));
    }

    #[test]
    fn test_store_info_serialization() {
        let info = StoreInfo {
            topics: 2,
            messages: 10,
            delayed: 3,
            dead_lettered: 1,
        };

        let json = serde_json::to_string(&info).unwrap();
        assert!(json.contains("\"topics\":2"));
        assert!(json.contains("\"deadLettered\":1"));

        let parsed: StoreInfo = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.messages, 10);
        assert_eq!(parsed.delayed, 3);
    }

    #[test]
    fn test_broker_info_flattens_store() {
        let info = BrokerInfo {
            store: StoreInfo {
                topics: 1,
                messages: 4,
                ..Default::default()
            },
            consumers: 2,
        };

        let json = serde_json::to_string(&info).unwrap();
        assert!(json.contains("\"messages\":4"));
        assert!(json.contains("\"consumers\":2"));
    }
}
