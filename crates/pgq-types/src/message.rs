//! Message types for pgq
//!
//! A message record as the engine returns it, plus the delay specification
//! accepted at enqueue time.

use chrono::{DateTime, Utc};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::Value;

/// Engine-assigned message identifier, monotonically increasing within a queue
pub type MessageId = i64;

/// A message record returned by read, pop and set-visibility
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    /// Identifier assigned at enqueue time
    pub msg_id: MessageId,

    /// Number of times the message has been read
    pub read_ct: i64,

    /// When the message was enqueued
    pub enqueued_at: DateTime<Utc>,

    /// Visibility deadline; the message is hidden from readers before it
    pub vt: DateTime<Utc>,

    /// Message payload
    pub message: Value,
}

impl Message {
    /// Deserialize the payload into a typed value
    pub fn payload_as<T: DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        T::deserialize(&self.message)
    }

    /// Whether the message is visible to readers at `now`
    pub fn is_visible_at(&self, now: DateTime<Utc>) -> bool {
        now >= self.vt
    }
}

/// When a newly sent message first becomes visible
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Delay {
    /// Seconds from the time of enqueue
    Seconds(u32),
    /// An absolute point in time
    At(DateTime<Utc>),
}

impl Delay {
    /// Resolve the initial visibility deadline for a message enqueued at `now`.
    ///
    /// No delay means the deadline equals the enqueue time.
    pub fn resolve(delay: Option<Delay>, now: DateTime<Utc>) -> DateTime<Utc> {
        match delay {
            None => now,
            Some(Delay::Seconds(secs)) => now + chrono::Duration::seconds(i64::from(secs)),
            Some(Delay::At(at)) => at,
        }
    }
}

impl From<u32> for Delay {
    fn from(secs: u32) -> Self {
        Delay::Seconds(secs)
    }
}

impl From<DateTime<Utc>> for Delay {
    fn from(at: DateTime<Utc>) -> Self {
        Delay::At(at)
    }
}
