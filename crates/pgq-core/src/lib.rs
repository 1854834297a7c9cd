//! pgq Core - Transactional client for pgmq queues
//!
//! This crate contains the client surface:
//! - Client: one transaction per call
//! - BoundClient: many operations on one transaction
//! - Transaction scopes with commit on success and rollback on failure

pub mod bound;
pub mod client;
pub mod config;
pub mod ops;
pub mod scope;

// Re-exports
pub use bound::BoundClient;
pub use client::Client;
pub use config::ClientConfig;

pub use pgq_engine::{Clock, Engine, ManualClock, MemoryEngine, SystemClock, Transaction};
pub use pgq_types::{
    Delay, Error, Message, MessageId, QueueInfo, QueueKind, QueueMetrics, Result, Value,
};

#[cfg(feature = "postgres")]
pub use pgq_engine::{PgEngine, PostgresConfig};
