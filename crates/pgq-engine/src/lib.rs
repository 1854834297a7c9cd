//! pgq Engine - The boundary to the queue engine
//!
//! This crate provides the engine traits and pluggable backends.
//! Currently supports:
//! - In-memory engine (default, for development/testing)
//! - PostgreSQL with the `pgmq` extension (feature `postgres`)

pub mod call;
pub mod clock;
pub mod traits;

#[cfg(feature = "memory")]
pub mod memory;

#[cfg(feature = "postgres")]
pub mod postgres;

// Re-exports
pub use call::{Call, Row};
pub use clock::{Clock, ManualClock, SystemClock};
pub use traits::{Engine, Transaction};

#[cfg(feature = "memory")]
pub use memory::MemoryEngine;

#[cfg(feature = "postgres")]
pub use postgres::{PgEngine, PostgresConfig};
