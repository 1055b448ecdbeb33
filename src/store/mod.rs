//! Store trait — the durability contract behind the broker
//!
//! A store persists per-topic message logs in three partitions (`main`,
//! `delayed`, `dlq`) with one main cursor per topic. All primitives are
//! blocking-free; the broker layers waiting on top. Two implementations:
//! [`MemoryStore`] for tests and single-process experiments, and
//! [`FileStore`] for crash-safe on-disk operation.

use crate::error::Result;
use crate::types::{StoreInfo, Value};
use async_trait::async_trait;
use std::time::Duration;

pub mod file;
pub mod memory;
pub mod sweep;

pub use file::FileStore;
pub use memory::MemoryStore;
pub use sweep::Sweeper;

/// Core trait for queue storage backends
///
/// Topics are created lazily by the first operation that touches them.
/// Implementations must make `append` and every cursor mutation durable
/// before returning (a memory store trivially satisfies this).
#[async_trait]
pub trait Store: Send + Sync {
    /// Append a value to a topic's main partition, returning its offset
    async fn append(&self, topic: &str, value: Value) -> Result<u64>;

    /// Value and offset at the topic's main cursor
    ///
    /// Returns `QueueError::Empty` when the cursor is at the tail.
    /// Does not advance the cursor; repeated calls re-deliver the head.
    async fn get_next(&self, topic: &str) -> Result<(Value, u64)>;

    /// Advance the main cursor past the head
    ///
    /// Returns `QueueError::Empty` when the cursor is already at the tail.
    async fn ack(&self, topic: &str) -> Result<()>;

    /// Record a negative acknowledgement; the cursor stays put
    ///
    /// When a `max_nacks` policy is configured and the head has been
    /// nacked that many times, the head moves to the dead-letter
    /// partition and the cursor advances. The default policy never
    /// dead-letters.
    async fn nack(&self, topic: &str) -> Result<()>;

    /// Rewind the main cursor by one, clamped at zero
    async fn back(&self, topic: &str) -> Result<()>;

    /// Move the head into the delayed partition with due = now + `delay`
    /// and advance the main cursor
    async fn dack(&self, topic: &str, value: Value, delay: Duration) -> Result<()>;

    /// Administratively move the head to the dead-letter partition and
    /// advance the main cursor
    async fn dead_letter(&self, topic: &str) -> Result<()>;

    /// Promote all due delayed entries onto the tail of their topic's
    /// main partition, preserving due-time order within the batch
    ///
    /// Returns the topics that received promotions so the caller can
    /// wake their parked consumers. Driven by the [`Sweeper`].
    async fn promote_due(&self) -> Result<Vec<String>>;

    /// Names of all known topics
    async fn topics(&self) -> Result<Vec<String>>;

    /// Store-wide totals
    async fn info(&self) -> Result<StoreInfo>;

    /// Flush and release resources; the store rejects further calls
    async fn close(&self) -> Result<()>;
}

/// Tunables shared by store implementations
#[derive(Debug, Clone, Default)]
pub struct StoreOptions {
    /// Nacks tolerated for one head value before it is dead-lettered.
    /// `None` (the default) never dead-letters automatically.
    pub max_nacks: Option<u32>,
}
