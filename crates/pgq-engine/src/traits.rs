//! Engine trait definitions
//!
//! Defines the boundary every queue engine backend implements.

use async_trait::async_trait;
use pgq_types::Result;

use crate::call::{Call, Row};

/// A queue engine: the only way in is a transaction
#[async_trait]
pub trait Engine: Send + Sync {
    /// Open a new transaction
    async fn begin(&self) -> Result<Box<dyn Transaction>>;
}

/// An open transaction against the engine.
///
/// Dropping a transaction without committing discards its effects.
#[async_trait]
pub trait Transaction: Send {
    /// Issue one call to the engine within this transaction
    async fn execute(&mut self, call: Call) -> Result<Vec<Row>>;

    /// Make every effect of this transaction visible to other observers
    async fn commit(self: Box<Self>) -> Result<()>;

    /// Discard every effect of this transaction
    async fn rollback(self: Box<Self>) -> Result<()>;
}
