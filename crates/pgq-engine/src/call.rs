//! Engine calls and result rows
//!
//! A [`Call`] is one invocation of a named engine primitive with its
//! positional arguments. Every backend answers a call with zero or more
//! [`Row`]s; interpreting how many rows a call must produce is the client's
//! job, not the backend's.

use pgq_types::{Delay, Message, MessageId, QueueInfo, QueueKind, QueueMetrics, Value};

/// One invocation of an engine primitive
#[derive(Debug, Clone, PartialEq)]
pub enum Call {
    Send {
        queue: String,
        payload: Value,
        delay: Option<Delay>,
    },
    SendBatch {
        queue: String,
        payloads: Vec<Value>,
        delay: Option<Delay>,
    },
    Read {
        queue: String,
        vt: i32,
        limit: i32,
        filter: Value,
    },
    ReadWithPoll {
        queue: String,
        vt: i32,
        limit: i32,
        max_poll_seconds: i32,
        poll_interval_ms: i32,
        filter: Value,
    },
    Pop {
        queue: String,
    },
    Delete {
        queue: String,
        msg_id: MessageId,
    },
    DeleteBatch {
        queue: String,
        msg_ids: Vec<MessageId>,
    },
    PurgeQueue {
        queue: String,
    },
    Archive {
        queue: String,
        msg_id: MessageId,
    },
    ArchiveBatch {
        queue: String,
        msg_ids: Vec<MessageId>,
    },
    Create {
        queue: String,
        kind: QueueKind,
    },
    DropQueue {
        queue: String,
    },
    DetachArchive {
        queue: String,
    },
    SetVt {
        queue: String,
        msg_id: MessageId,
        vt_offset: i32,
    },
    ListQueues,
    Metrics {
        queue: String,
    },
    MetricsAll,
}

impl Call {
    /// Name of the engine primitive this call invokes
    pub fn primitive(&self) -> &'static str {
        match self {
            Call::Send { .. } => "send",
            Call::SendBatch { .. } => "send_batch",
            Call::Read { .. } => "read",
            Call::ReadWithPoll { .. } => "read_with_poll",
            Call::Pop { .. } => "pop",
            Call::Delete { .. } | Call::DeleteBatch { .. } => "delete",
            Call::PurgeQueue { .. } => "purge_queue",
            Call::Archive { .. } | Call::ArchiveBatch { .. } => "archive",
            Call::Create { kind, .. } => match kind {
                QueueKind::Standard => "create",
                QueueKind::Partitioned { .. } => "create_partitioned",
                QueueKind::Unlogged => "create_unlogged",
            },
            Call::DropQueue { .. } => "drop_queue",
            Call::DetachArchive { .. } => "detach_archive",
            Call::SetVt { .. } => "set_vt",
            Call::ListQueues => "list_queues",
            Call::Metrics { .. } => "metrics",
            Call::MetricsAll => "metrics_all",
        }
    }

    /// Queue the call targets, if any
    pub fn queue(&self) -> Option<&str> {
        match self {
            Call::Send { queue, .. }
            | Call::SendBatch { queue, .. }
            | Call::Read { queue, .. }
            | Call::ReadWithPoll { queue, .. }
            | Call::Pop { queue }
            | Call::Delete { queue, .. }
            | Call::DeleteBatch { queue, .. }
            | Call::PurgeQueue { queue }
            | Call::Archive { queue, .. }
            | Call::ArchiveBatch { queue, .. }
            | Call::Create { queue, .. }
            | Call::DropQueue { queue }
            | Call::DetachArchive { queue }
            | Call::SetVt { queue, .. }
            | Call::Metrics { queue } => Some(queue),
            Call::ListQueues | Call::MetricsAll => None,
        }
    }
}

/// One row of engine output
#[derive(Debug, Clone, PartialEq)]
pub enum Row {
    /// A message id (send, send_batch, batch delete/archive)
    Id(MessageId),
    /// A boolean outcome (single delete/archive, drop_queue)
    Bool(bool),
    /// A count (purge_queue)
    Count(i64),
    /// A message record (read, read_with_poll, pop, set_vt)
    Message(Message),
    /// A queue info row (list_queues)
    Queue(QueueInfo),
    /// A metrics snapshot (metrics, metrics_all)
    Metrics(QueueMetrics),
}

impl Row {
    /// Short name of the row shape, used in protocol error messages
    pub fn shape(&self) -> &'static str {
        match self {
            Row::Id(_) => "id",
            Row::Bool(_) => "bool",
            Row::Count(_) => "count",
            Row::Message(_) => "message",
            Row::Queue(_) => "queue",
            Row::Metrics(_) => "metrics",
        }
    }
}
