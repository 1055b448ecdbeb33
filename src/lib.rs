//! # miniqueue
//!
//! Durable single-node message queue with ordered, at-least-once,
//! per-consumer delivery.
//!
//! ## Overview
//!
//! `miniqueue` accepts published byte payloads on named topics and
//! delivers them one at a time to subscribers, each of whom must
//! positively acknowledge a delivery before the next one is served.
//! A durable FIFO log backs every topic; consumers park on a per-topic
//! signal when the log is drained and wake on the next publish.
//!
//! ## Quick Start
//!
//! ```rust
//! use miniqueue::{Broker, MemoryStore, Value};
//! use std::sync::Arc;
//!
//! # async fn example() -> miniqueue::Result<()> {
//! // Create a broker over the in-memory store
//! let broker = Broker::new(Arc::new(MemoryStore::new()));
//!
//! // Publish a payload
//! broker.publish("orders", Value::from("order-1")).await?;
//!
//! // Subscribe and consume it
//! let consumer = broker.subscribe("orders").await?;
//! let value = consumer.next().await?;
//! assert_eq!(value, Value::from("order-1"));
//! consumer.ack().await?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Stores
//!
//! - **memory** — In-memory store for testing and single-process use
//! - **file** — Crash-safe file-backed store with fsync'd appends
//!
//! ## Architecture
//!
//! - **Store** trait — durability contract all backends implement
//! - **Broker** — topic registry, consumer lifecycle, publish fan-out
//! - **Consumer** — one-in-flight session with Ack/Nack/Back/Dack
//! - **Sweeper** — promotes delayed values back onto the main partition
//! - **Server** — line-protocol TCP front-end over the broker

pub mod broker;
pub mod config;
pub mod consumer;
pub mod error;
pub mod server;
pub mod signal;
pub mod store;
pub mod types;

// Re-export core types
pub use broker::Broker;
pub use config::QueueConfig;
pub use consumer::Consumer;
pub use error::{QueueError, Result};
pub use server::Server;
pub use signal::TopicSignals;
pub use types::{BrokerInfo, DelayedEntry, StoreInfo, Value};

// Re-export stores for convenience
pub use store::{FileStore, MemoryStore, Store, StoreOptions, Sweeper};
