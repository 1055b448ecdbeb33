//! Error types for miniqueue

use thiserror::Error;

/// Errors that can occur in the queue
#[derive(Debug, Error)]
pub enum QueueError {
    /// Ack/Nack/Back/Dack called with no value currently held
    #[error("no value in flight")]
    NoInFlight,

    /// Next called while a value is already held
    #[error("a value is already in flight")]
    AlreadyInFlight,

    /// Store has no value at the topic's cursor
    ///
    /// Internal to the delivery path — the consumer converts this
    /// into a park on the topic's wakeup signal.
    #[error("no value at cursor for topic '{0}'")]
    Empty(String),

    /// Next returned because the consumer was cancelled or the broker
    /// is shutting down
    #[error("consumer cancelled")]
    Cancelled,

    /// Durability layer failure
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Persisted state failed signature or framing checks
    #[error("corrupt store data: {0}")]
    Corrupted(String),

    /// Malformed client command
    #[error("protocol error: {0}")]
    Protocol(String),

    /// Configuration error
    #[error("configuration error: {0}")]
    Config(String),

    /// Operation on a store that has been closed
    #[error("store is closed")]
    Closed,

    /// Serialization/deserialization failure
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// TOML configuration parse failure
    #[error("TOML error: {0}")]
    TomlDe(#[from] toml::de::Error),

    /// TOML configuration write failure
    #[error("TOML error: {0}")]
    TomlSer(#[from] toml::ser::Error),
}

impl QueueError {
    /// True for the internal store-empty signal
    pub fn is_empty(&self) -> bool {
        matches!(self, QueueError::Empty(_))
    }
}

/// Result type alias for queue operations
pub type Result<T> = std::result::Result<T, QueueError>;
