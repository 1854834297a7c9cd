//! Client configuration
//!
//! Defaults for the parameters most callers do not want to repeat.

use pgq_types::{Error, Result};
use serde::{Deserialize, Serialize};

/// Client configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientConfig {
    /// Visibility window in seconds for the default read helpers
    #[serde(default = "default_visibility_timeout")]
    pub visibility_timeout_secs: i32,

    /// Messages per default read
    #[serde(default = "default_read_limit")]
    pub read_limit: i32,

    /// Wait budget in seconds for the default polling read
    #[serde(default = "default_poll_max_wait")]
    pub poll_max_wait_secs: i32,

    /// Poll cadence in milliseconds for the default polling read
    #[serde(default = "default_poll_interval")]
    pub poll_interval_ms: i32,

    /// Partition interval for partitioned queues
    #[serde(default = "default_partition_interval")]
    pub partition_interval: String,

    /// Retention interval for partitioned queues
    #[serde(default = "default_retention_interval")]
    pub retention_interval: String,
}

fn default_visibility_timeout() -> i32 {
    30 // 30 seconds
}

fn default_read_limit() -> i32 {
    1
}

fn default_poll_max_wait() -> i32 {
    5
}

fn default_poll_interval() -> i32 {
    100
}

fn default_partition_interval() -> String {
    "10000".to_string()
}

fn default_retention_interval() -> String {
    "100000".to_string()
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            visibility_timeout_secs: default_visibility_timeout(),
            read_limit: default_read_limit(),
            poll_max_wait_secs: default_poll_max_wait(),
            poll_interval_ms: default_poll_interval(),
            partition_interval: default_partition_interval(),
            retention_interval: default_retention_interval(),
        }
    }
}

impl ClientConfig {
    /// Reject settings the engine would loop or fail on
    pub fn validate(&self) -> Result<()> {
        if self.read_limit <= 0 {
            return Err(Error::Config("read_limit must be positive".to_string()));
        }
        if self.poll_interval_ms <= 0 {
            return Err(Error::Config("poll_interval_ms must be positive".to_string()));
        }
        if self.poll_max_wait_secs < 0 {
            return Err(Error::Config("poll_max_wait_secs must not be negative".to_string()));
        }
        if self.partition_interval.trim().is_empty() || self.retention_interval.trim().is_empty() {
            return Err(Error::Config(
                "partition and retention intervals must not be empty".to_string(),
            ));
        }
        Ok(())
    }
}
