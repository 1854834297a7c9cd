//! Operation layer
//!
//! Stateless queue operations. Each takes an open transaction, issues exactly
//! one engine call and normalizes the returned rows. Zero rows is a valid
//! result for reads, batches and boolean removals; it is a protocol error only
//! where the operation promises exactly one row.

use pgq_engine::{Call, Row, Transaction};
use pgq_types::document;
use pgq_types::{
    Delay, Error, Message, MessageId, QueueInfo, QueueKind, QueueMetrics, Result, Value,
};
use tracing::{debug, info};

// ==================== Row normalization ====================

fn exactly_one(operation: &'static str, rows: Vec<Row>) -> Result<Row> {
    let mut rows = rows.into_iter();
    match (rows.next(), rows.next()) {
        (Some(row), None) => Ok(row),
        (None, _) => Err(Error::protocol(operation, "engine returned no row")),
        (Some(_), Some(_)) => Err(Error::protocol(
            operation,
            "engine returned more than one row",
        )),
    }
}

fn unexpected(operation: &'static str, row: &Row) -> Error {
    Error::protocol(operation, format!("unexpected {} row", row.shape()))
}

fn to_id(operation: &'static str, row: Row) -> Result<MessageId> {
    match row {
        Row::Id(id) => Ok(id),
        other => Err(unexpected(operation, &other)),
    }
}

fn to_bool(operation: &'static str, row: Row) -> Result<bool> {
    match row {
        Row::Bool(flag) => Ok(flag),
        other => Err(unexpected(operation, &other)),
    }
}

fn to_count(operation: &'static str, row: Row) -> Result<i64> {
    match row {
        Row::Count(count) => Ok(count),
        other => Err(unexpected(operation, &other)),
    }
}

fn to_message(operation: &'static str, row: Row) -> Result<Message> {
    match row {
        Row::Message(message) => Ok(message),
        other => Err(unexpected(operation, &other)),
    }
}

fn to_queue(operation: &'static str, row: Row) -> Result<QueueInfo> {
    match row {
        Row::Queue(info) => Ok(info),
        other => Err(unexpected(operation, &other)),
    }
}

fn to_metrics(operation: &'static str, row: Row) -> Result<QueueMetrics> {
    match row {
        Row::Metrics(metrics) => Ok(metrics),
        other => Err(unexpected(operation, &other)),
    }
}

fn all<T>(
    operation: &'static str,
    rows: Vec<Row>,
    convert: fn(&'static str, Row) -> Result<T>,
) -> Result<Vec<T>> {
    rows.into_iter().map(|row| convert(operation, row)).collect()
}

fn filter_or_empty(filter: Option<Value>) -> Value {
    match filter {
        Some(filter) if !document::is_empty_filter(&filter) => filter,
        _ => document::empty_filter(),
    }
}

// ==================== Message Operations ====================

/// Enqueue one message. Returns the engine-assigned id.
pub async fn send(
    tx: &mut dyn Transaction,
    queue: &str,
    payload: Value,
    delay: Option<Delay>,
) -> Result<MessageId> {
    let rows = tx
        .execute(Call::Send {
            queue: queue.to_string(),
            payload,
            delay,
        })
        .await?;
    let msg_id = to_id("send", exactly_one("send", rows)?)?;
    debug!(queue = %queue, msg_id, "Message sent");
    Ok(msg_id)
}

/// Enqueue any number of messages in one round trip.
///
/// Ids come back in the engine's return order, which in practice mirrors
/// insertion order. An empty input yields an empty output.
pub async fn send_batch(
    tx: &mut dyn Transaction,
    queue: &str,
    payloads: Vec<Value>,
    delay: Option<Delay>,
) -> Result<Vec<MessageId>> {
    let rows = tx
        .execute(Call::SendBatch {
            queue: queue.to_string(),
            payloads,
            delay,
        })
        .await?;
    let ids = all("send_batch", rows, to_id)?;
    debug!(queue = %queue, count = ids.len(), "Batch sent");
    Ok(ids)
}

/// Read up to `limit` visible messages, hiding each for `vt` seconds.
///
/// `filter` restricts candidates to payloads that structurally contain it.
pub async fn read(
    tx: &mut dyn Transaction,
    queue: &str,
    vt: i32,
    limit: i32,
    filter: Option<Value>,
) -> Result<Vec<Message>> {
    let rows = tx
        .execute(Call::Read {
            queue: queue.to_string(),
            vt,
            limit,
            filter: filter_or_empty(filter),
        })
        .await?;
    let messages = all("read", rows, to_message)?;
    debug!(queue = %queue, count = messages.len(), "Messages read");
    Ok(messages)
}

/// Like [`read`], but when nothing is visible the engine keeps retrying every
/// `poll_interval_ms` for up to `max_poll_seconds`. An exhausted budget
/// yields an empty list.
///
/// The transaction stays occupied for the whole wait.
pub async fn read_with_poll(
    tx: &mut dyn Transaction,
    queue: &str,
    vt: i32,
    limit: i32,
    max_poll_seconds: i32,
    poll_interval_ms: i32,
    filter: Option<Value>,
) -> Result<Vec<Message>> {
    let rows = tx
        .execute(Call::ReadWithPoll {
            queue: queue.to_string(),
            vt,
            limit,
            max_poll_seconds,
            poll_interval_ms,
            filter: filter_or_empty(filter),
        })
        .await?;
    let messages = all("read_with_poll", rows, to_message)?;
    debug!(queue = %queue, count = messages.len(), "Messages read after polling");
    Ok(messages)
}

/// Read and delete the oldest visible message in one step
pub async fn pop(tx: &mut dyn Transaction, queue: &str) -> Result<Vec<Message>> {
    let rows = tx
        .execute(Call::Pop {
            queue: queue.to_string(),
        })
        .await?;
    all("pop", rows, to_message)
}

/// Delete one message. `false` if it was not there.
pub async fn delete_message(
    tx: &mut dyn Transaction,
    queue: &str,
    msg_id: MessageId,
) -> Result<bool> {
    let rows = tx
        .execute(Call::Delete {
            queue: queue.to_string(),
            msg_id,
        })
        .await?;
    let deleted = to_bool("delete", exactly_one("delete", rows)?)?;
    debug!(queue = %queue, msg_id, deleted, "Message delete");
    Ok(deleted)
}

/// Delete several messages. Returns the ids that were present and removed.
pub async fn delete_batch(
    tx: &mut dyn Transaction,
    queue: &str,
    msg_ids: Vec<MessageId>,
) -> Result<Vec<MessageId>> {
    let rows = tx
        .execute(Call::DeleteBatch {
            queue: queue.to_string(),
            msg_ids,
        })
        .await?;
    all("delete", rows, to_id)
}

/// Remove every message. Returns how many were removed.
pub async fn purge_queue(tx: &mut dyn Transaction, queue: &str) -> Result<i64> {
    let rows = tx
        .execute(Call::PurgeQueue {
            queue: queue.to_string(),
        })
        .await?;
    let count = to_count("purge_queue", exactly_one("purge_queue", rows)?)?;
    info!(queue = %queue, count, "Queue purged");
    Ok(count)
}

/// Move one message to the archive. `false` if it was not there.
pub async fn archive(tx: &mut dyn Transaction, queue: &str, msg_id: MessageId) -> Result<bool> {
    let rows = tx
        .execute(Call::Archive {
            queue: queue.to_string(),
            msg_id,
        })
        .await?;
    to_bool("archive", exactly_one("archive", rows)?)
}

/// Archive several messages. Returns the ids that were present and moved.
pub async fn archive_batch(
    tx: &mut dyn Transaction,
    queue: &str,
    msg_ids: Vec<MessageId>,
) -> Result<Vec<MessageId>> {
    let rows = tx
        .execute(Call::ArchiveBatch {
            queue: queue.to_string(),
            msg_ids,
        })
        .await?;
    all("archive", rows, to_id)
}

/// Move a message's visibility deadline to now + `vt_offset` seconds.
///
/// A negative offset makes the message visible immediately. Fails with a
/// protocol error when the message does not exist.
pub async fn set_visibility(
    tx: &mut dyn Transaction,
    queue: &str,
    msg_id: MessageId,
    vt_offset: i32,
) -> Result<Message> {
    let rows = tx
        .execute(Call::SetVt {
            queue: queue.to_string(),
            msg_id,
            vt_offset,
        })
        .await?;
    to_message("set_vt", exactly_one("set_vt", rows)?)
}

// ==================== Queue Operations ====================

async fn create(tx: &mut dyn Transaction, queue: &str, kind: QueueKind) -> Result<()> {
    tx.execute(Call::Create {
        queue: queue.to_string(),
        kind,
    })
    .await?;
    info!(queue = %queue, "Queue created");
    Ok(())
}

/// Create a standard queue. Creating an existing queue is an engine error.
pub async fn create_queue(tx: &mut dyn Transaction, queue: &str) -> Result<()> {
    create(tx, queue, QueueKind::Standard).await
}

/// Create a partitioned queue
pub async fn create_partitioned_queue(
    tx: &mut dyn Transaction,
    queue: &str,
    partition_interval: &str,
    retention_interval: &str,
) -> Result<()> {
    create(
        tx,
        queue,
        QueueKind::Partitioned {
            partition_interval: partition_interval.to_string(),
            retention_interval: retention_interval.to_string(),
        },
    )
    .await
}

/// Create an unlogged queue
pub async fn create_unlogged_queue(tx: &mut dyn Transaction, queue: &str) -> Result<()> {
    create(tx, queue, QueueKind::Unlogged).await
}

/// Drop a queue and all its messages. Returns whether the queue existed.
pub async fn drop_queue(tx: &mut dyn Transaction, queue: &str) -> Result<bool> {
    let rows = tx
        .execute(Call::DropQueue {
            queue: queue.to_string(),
        })
        .await?;
    let existed = to_bool("drop_queue", exactly_one("drop_queue", rows)?)?;
    info!(queue = %queue, existed, "Queue dropped");
    Ok(existed)
}

/// Detach a queue's archive from the engine's lifecycle management
pub async fn detach_archive(tx: &mut dyn Transaction, queue: &str) -> Result<()> {
    tx.execute(Call::DetachArchive {
        queue: queue.to_string(),
    })
    .await?;
    Ok(())
}

pub async fn list_queues(tx: &mut dyn Transaction) -> Result<Vec<QueueInfo>> {
    let rows = tx.execute(Call::ListQueues).await?;
    all("list_queues", rows, to_queue)
}

/// Metrics for one queue. A missing queue is a protocol error.
pub async fn metrics(tx: &mut dyn Transaction, queue: &str) -> Result<QueueMetrics> {
    let rows = tx
        .execute(Call::Metrics {
            queue: queue.to_string(),
        })
        .await?;
    to_metrics("metrics", exactly_one("metrics", rows)?)
}

pub async fn metrics_all(tx: &mut dyn Transaction) -> Result<Vec<QueueMetrics>> {
    let rows = tx.execute(Call::MetricsAll).await?;
    all("metrics_all", rows, to_metrics)
}
