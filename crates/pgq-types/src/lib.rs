//! pgq Types - Domain types for the pgq queue client
//!
//! This crate contains the types shared by the engine boundary and the client.

pub mod document;
pub mod error;
pub mod message;
pub mod queue;

// Re-export commonly used types
pub use error::{Error, Result};
pub use message::{Delay, Message, MessageId};
pub use queue::{QueueInfo, QueueKind, QueueMetrics};
pub use serde_json::Value;
