//! Queue types for pgq
//!
//! Queue metadata and metrics snapshots as reported by the engine.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Creation mode of a queue, fixed at creation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QueueKind {
    Standard,
    /// Partitioned by message id or time; intervals are passed through to the engine
    Partitioned {
        partition_interval: String,
        retention_interval: String,
    },
    /// Backed by an unlogged table: faster, not crash-safe
    Unlogged,
}

impl QueueKind {
    pub fn is_partitioned(&self) -> bool {
        matches!(self, Self::Partitioned { .. })
    }

    pub fn is_unlogged(&self) -> bool {
        matches!(self, Self::Unlogged)
    }
}

/// One row of `list_queues`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueInfo {
    /// Queue name (unique)
    pub queue_name: String,

    /// When the queue was created
    pub created_at: DateTime<Utc>,

    pub is_partitioned: bool,

    pub is_unlogged: bool,
}

/// Point-in-time queue metrics. Recomputed by the engine on every query.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueMetrics {
    pub queue_name: String,

    /// Messages currently in the queue, visible or not
    pub queue_length: i64,

    /// Age of the newest message in seconds; `None` when the queue is empty
    pub newest_msg_age_sec: Option<i64>,

    /// Age of the oldest message in seconds; `None` when the queue is empty
    pub oldest_msg_age_sec: Option<i64>,

    /// Messages ever sent to the queue
    pub total_messages: i64,

    /// When the snapshot was taken
    pub scrape_time: DateTime<Utc>,
}

impl QueueMetrics {
    pub fn is_empty(&self) -> bool {
        self.queue_length == 0
    }
}
