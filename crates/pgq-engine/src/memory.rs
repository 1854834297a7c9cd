//! In-memory engine backend
//!
//! Fast, non-persistent emulation of the queue engine for development and
//! testing. All data is lost when the process exits.
//!
//! Every statement runs against the latest committed state with the
//! transaction's own pending queue changes laid over it, so a polling read
//! sees messages committed by others in the meantime. Commit publishes the
//! changed queues. It fails only when another transaction committed a change
//! to one of those same queues after this transaction first changed it.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use pgq_types::document;
use pgq_types::error::{
    DUPLICATE_TABLE, INVALID_PARAMETER, IN_FAILED_TRANSACTION, SERIALIZATION_FAILURE,
    UNDEFINED_TABLE,
};
use pgq_types::{
    Delay, Error, Message, MessageId, QueueInfo, QueueKind, QueueMetrics, Result, Value,
};
use tracing::{debug, info};

use crate::call::{Call, Row};
use crate::clock::{Clock, SystemClock};
use crate::traits::{Engine, Transaction};

/// Longest queue name the engine accepts
pub const MAX_QUEUE_NAME_LEN: usize = 47;

/// Internal queue data structure
#[derive(Clone)]
struct QueueData {
    kind: QueueKind,
    created_at: DateTime<Utc>,
    /// Last id handed out; ids are never reused, even after purge
    last_id: MessageId,
    /// Live messages by id
    messages: BTreeMap<MessageId, Message>,
    /// Archived messages with the time they were archived
    archive: BTreeMap<MessageId, (Message, DateTime<Utc>)>,
    archive_detached: bool,
}

impl QueueData {
    fn new(kind: QueueKind, created_at: DateTime<Utc>) -> Self {
        Self {
            kind,
            created_at,
            last_id: 0,
            messages: BTreeMap::new(),
            archive: BTreeMap::new(),
            archive_detached: false,
        }
    }

    fn enqueue(&mut self, payload: Value, now: DateTime<Utc>, vt: DateTime<Utc>) -> MessageId {
        self.last_id += 1;
        let msg_id = self.last_id;
        self.messages.insert(
            msg_id,
            Message {
                msg_id,
                read_ct: 0,
                enqueued_at: now,
                vt,
                message: payload,
            },
        );
        msg_id
    }

    /// Ids of visible messages matching `filter`, oldest first
    fn visible(&self, now: DateTime<Utc>, filter: &Value) -> impl Iterator<Item = MessageId> + '_ {
        let match_all = document::is_empty_filter(filter);
        let filter = filter.clone();
        self.messages
            .values()
            .filter(move |m| m.is_visible_at(now))
            .filter(move |m| match_all || document::contains(&m.message, &filter))
            .map(|m| m.msg_id)
    }

    fn archive_one(&mut self, msg_id: MessageId, now: DateTime<Utc>) -> bool {
        match self.messages.remove(&msg_id) {
            Some(message) => {
                self.archive.insert(msg_id, (message, now));
                true
            }
            None => false,
        }
    }

    fn metrics(&self, name: &str, now: DateTime<Utc>) -> QueueMetrics {
        let age = |at: DateTime<Utc>| (now - at).num_seconds();
        QueueMetrics {
            queue_name: name.to_string(),
            queue_length: self.messages.len() as i64,
            newest_msg_age_sec: self.messages.values().map(|m| m.enqueued_at).max().map(age),
            oldest_msg_age_sec: self.messages.values().map(|m| m.enqueued_at).min().map(age),
            total_messages: self.last_id,
            scrape_time: now,
        }
    }
}

/// The whole engine state. Cloned per transaction.
#[derive(Clone, Default)]
struct State {
    queues: BTreeMap<String, QueueData>,
}

/// Result of applying one call: rows plus whether state changed
type Applied = (Vec<Row>, bool);

fn undefined_queue(name: &str) -> Error {
    Error::engine(
        UNDEFINED_TABLE,
        format!("relation \"pgmq.q_{name}\" does not exist"),
    )
}

fn validate_queue_name(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(Error::engine(INVALID_PARAMETER, "queue name must not be empty"));
    }
    if name.len() > MAX_QUEUE_NAME_LEN {
        return Err(Error::engine(
            INVALID_PARAMETER,
            format!("queue name is too long, maximum length is {MAX_QUEUE_NAME_LEN} characters"),
        ));
    }
    if !name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
        return Err(Error::engine(
            INVALID_PARAMETER,
            format!("queue name contains invalid characters: {name}"),
        ));
    }
    Ok(())
}

impl State {
    fn queue(&self, name: &str) -> Result<&QueueData> {
        self.queues.get(name).ok_or_else(|| undefined_queue(name))
    }

    fn queue_mut(&mut self, name: &str) -> Result<&mut QueueData> {
        self.queues.get_mut(name).ok_or_else(|| undefined_queue(name))
    }

    /// Select up to `limit` visible messages and hide them for `vt` seconds
    fn read(
        &mut self,
        name: &str,
        vt: i32,
        limit: i32,
        filter: &Value,
        now: DateTime<Utc>,
    ) -> Result<Applied> {
        if limit < 0 {
            return Err(Error::engine(INVALID_PARAMETER, "LIMIT must not be negative"));
        }
        let queue = self.queue_mut(name)?;
        let ids: Vec<MessageId> = queue.visible(now, filter).take(limit as usize).collect();
        let deadline = now + chrono::Duration::seconds(i64::from(vt));

        let mut rows = Vec::with_capacity(ids.len());
        for id in &ids {
            if let Some(message) = queue.messages.get_mut(id) {
                message.vt = deadline;
                message.read_ct += 1;
                rows.push(Row::Message(message.clone()));
            }
        }

        let changed = !rows.is_empty();
        Ok((rows, changed))
    }

    fn apply(&mut self, call: Call, now: DateTime<Utc>) -> Result<Applied> {
        match call {
            Call::Send {
                queue,
                payload,
                delay,
            } => {
                let vt = Delay::resolve(delay, now);
                let msg_id = self.queue_mut(&queue)?.enqueue(payload, now, vt);
                debug!(queue = %queue, msg_id, "Message sent");
                Ok((vec![Row::Id(msg_id)], true))
            }

            Call::SendBatch {
                queue,
                payloads,
                delay,
            } => {
                let vt = Delay::resolve(delay, now);
                let data = self.queue_mut(&queue)?;
                let rows: Vec<Row> = payloads
                    .into_iter()
                    .map(|payload| Row::Id(data.enqueue(payload, now, vt)))
                    .collect();
                debug!(queue = %queue, count = rows.len(), "Batch sent");
                let changed = !rows.is_empty();
                Ok((rows, changed))
            }

            Call::Read {
                queue,
                vt,
                limit,
                filter,
            } => self.read(&queue, vt, limit, &filter, now),

            // The polling loop lives in the transaction; a single attempt here.
            Call::ReadWithPoll {
                queue,
                vt,
                limit,
                filter,
                ..
            } => self.read(&queue, vt, limit, &filter, now),

            Call::Pop { queue } => {
                let data = self.queue_mut(&queue)?;
                let next = data.visible(now, &Value::Null).next();
                match next.and_then(|id| data.messages.remove(&id)) {
                    Some(message) => {
                        debug!(queue = %queue, msg_id = message.msg_id, "Message popped");
                        Ok((vec![Row::Message(message)], true))
                    }
                    None => Ok((Vec::new(), false)),
                }
            }

            Call::Delete { queue, msg_id } => {
                let removed = self.queue_mut(&queue)?.messages.remove(&msg_id).is_some();
                Ok((vec![Row::Bool(removed)], removed))
            }

            Call::DeleteBatch { queue, msg_ids } => {
                let data = self.queue_mut(&queue)?;
                let rows: Vec<Row> = msg_ids
                    .into_iter()
                    .filter(|id| data.messages.remove(id).is_some())
                    .map(Row::Id)
                    .collect();
                let changed = !rows.is_empty();
                Ok((rows, changed))
            }

            Call::PurgeQueue { queue } => {
                let data = self.queue_mut(&queue)?;
                let count = data.messages.len() as i64;
                data.messages.clear();
                info!(queue = %queue, count, "Queue purged");
                Ok((vec![Row::Count(count)], count > 0))
            }

            Call::Archive { queue, msg_id } => {
                let archived = self.queue_mut(&queue)?.archive_one(msg_id, now);
                Ok((vec![Row::Bool(archived)], archived))
            }

            Call::ArchiveBatch { queue, msg_ids } => {
                let data = self.queue_mut(&queue)?;
                let rows: Vec<Row> = msg_ids
                    .into_iter()
                    .filter(|id| data.archive_one(*id, now))
                    .map(Row::Id)
                    .collect();
                let changed = !rows.is_empty();
                Ok((rows, changed))
            }

            Call::Create { queue, kind } => {
                validate_queue_name(&queue)?;
                if let QueueKind::Partitioned {
                    partition_interval,
                    retention_interval,
                } = &kind
                {
                    if partition_interval.trim().is_empty() || retention_interval.trim().is_empty()
                    {
                        return Err(Error::engine(
                            INVALID_PARAMETER,
                            "partition and retention intervals are required",
                        ));
                    }
                }
                if self.queues.contains_key(&queue) {
                    return Err(Error::engine(
                        DUPLICATE_TABLE,
                        format!("relation \"q_{queue}\" already exists"),
                    ));
                }
                self.queues.insert(queue.clone(), QueueData::new(kind, now));
                info!(queue = %queue, "Queue created");
                Ok((Vec::new(), true))
            }

            Call::DropQueue { queue } => {
                let existed = self.queues.remove(&queue).is_some();
                if existed {
                    info!(queue = %queue, "Queue dropped");
                }
                Ok((vec![Row::Bool(existed)], existed))
            }

            Call::DetachArchive { queue } => {
                self.queue_mut(&queue)?.archive_detached = true;
                info!(queue = %queue, "Archive detached");
                Ok((Vec::new(), true))
            }

            Call::SetVt {
                queue,
                msg_id,
                vt_offset,
            } => {
                let data = self.queue_mut(&queue)?;
                match data.messages.get_mut(&msg_id) {
                    Some(message) => {
                        message.vt = now + chrono::Duration::seconds(i64::from(vt_offset));
                        Ok((vec![Row::Message(message.clone())], true))
                    }
                    None => Ok((Vec::new(), false)),
                }
            }

            Call::ListQueues => {
                let rows = self
                    .queues
                    .iter()
                    .map(|(name, data)| {
                        Row::Queue(QueueInfo {
                            queue_name: name.clone(),
                            created_at: data.created_at,
                            is_partitioned: data.kind.is_partitioned(),
                            is_unlogged: data.kind.is_unlogged(),
                        })
                    })
                    .collect();
                Ok((rows, false))
            }

            Call::Metrics { queue } => {
                let rows = self
                    .queues
                    .get(&queue)
                    .map(|data| Row::Metrics(data.metrics(&queue, now)))
                    .into_iter()
                    .collect();
                Ok((rows, false))
            }

            Call::MetricsAll => {
                let rows = self
                    .queues
                    .iter()
                    .map(|(name, data)| Row::Metrics(data.metrics(name, now)))
                    .collect();
                Ok((rows, false))
            }
        }
    }
}

/// Committed state plus a per-queue commit counter.
///
/// `versions` keeps an entry for every queue name ever committed, dropped
/// queues included, so a drop racing a write on the same name conflicts.
#[derive(Default)]
struct Committed {
    commits: u64,
    versions: BTreeMap<String, u64>,
    state: State,
}

impl Committed {
    fn version_of(&self, queue: &str) -> u64 {
        self.versions.get(queue).copied().unwrap_or(0)
    }
}

/// In-memory engine implementation
#[derive(Clone)]
pub struct MemoryEngine {
    committed: Arc<Mutex<Committed>>,
    clock: Arc<dyn Clock>,
}

impl MemoryEngine {
    /// Create a new in-memory engine on the system clock
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    /// Create a new in-memory engine reading time from `clock`
    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        info!("Initializing in-memory engine");
        Self {
            committed: Arc::new(Mutex::new(Committed::default())),
            clock,
        }
    }

    /// Committed archive of a queue, oldest first. Empty if the queue is unknown.
    pub fn archived(&self, queue: &str) -> Vec<Message> {
        self.committed
            .lock()
            .state
            .queues
            .get(queue)
            .map(|data| data.archive.values().map(|(m, _)| m.clone()).collect())
            .unwrap_or_default()
    }

    /// Whether a queue's archive has been detached
    pub fn is_archive_detached(&self, queue: &str) -> bool {
        self.committed
            .lock()
            .state
            .queues
            .get(queue)
            .is_some_and(|data| data.archive_detached)
    }
}

impl Default for MemoryEngine {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Engine for MemoryEngine {
    async fn begin(&self) -> Result<Box<dyn Transaction>> {
        Ok(Box::new(MemoryTransaction {
            committed: Arc::clone(&self.committed),
            clock: Arc::clone(&self.clock),
            writes: BTreeMap::new(),
            aborted: false,
        }))
    }
}

/// A queue this transaction changed
struct Write {
    /// Committed version of the queue when this transaction first changed it
    base: u64,
    /// Content after this transaction's changes; `None` once dropped
    data: Option<QueueData>,
}

/// A transaction on a [`MemoryEngine`]
pub struct MemoryTransaction {
    committed: Arc<Mutex<Committed>>,
    clock: Arc<dyn Clock>,
    writes: BTreeMap<String, Write>,
    /// Set after an engine error; every later call fails
    aborted: bool,
}

impl MemoryTransaction {
    /// Run one statement against the latest committed state overlaid with
    /// this transaction's own changes.
    fn apply(&mut self, call: Call) -> Result<Vec<Row>> {
        let queue = call.queue().map(str::to_string);
        let now = self.clock.now();
        let committed = self.committed.lock();

        let mut working = committed.state.clone();
        for (name, write) in &self.writes {
            match &write.data {
                Some(data) => working.queues.insert(name.clone(), data.clone()),
                None => working.queues.remove(name),
            };
        }

        let (rows, changed) = working.apply(call, now)?;
        if let (true, Some(name)) = (changed, queue) {
            let base = committed.version_of(&name);
            let data = working.queues.remove(&name);
            self.writes
                .entry(name)
                .and_modify(|write| write.data = data.clone())
                .or_insert(Write { base, data });
        }
        Ok(rows)
    }

    async fn read_with_poll(
        &mut self,
        queue: String,
        vt: i32,
        limit: i32,
        max_poll_seconds: i32,
        poll_interval_ms: i32,
        filter: Value,
    ) -> Result<Vec<Row>> {
        if poll_interval_ms <= 0 {
            return Err(Error::engine(
                INVALID_PARAMETER,
                "poll interval must be a positive number of milliseconds",
            ));
        }
        let interval = Duration::from_millis(poll_interval_ms as u64);
        let budget = Duration::from_secs(max_poll_seconds.max(0) as u64);
        let deadline = tokio::time::Instant::now() + budget;

        loop {
            let rows = self.apply(Call::Read {
                queue: queue.clone(),
                vt,
                limit,
                filter: filter.clone(),
            })?;
            if !rows.is_empty() {
                return Ok(rows);
            }

            let now = tokio::time::Instant::now();
            if now >= deadline {
                debug!(queue = %queue, "Poll budget exhausted");
                return Ok(Vec::new());
            }
            tokio::time::sleep(interval.min(deadline - now)).await;
        }
    }
}

#[async_trait]
impl Transaction for MemoryTransaction {
    async fn execute(&mut self, call: Call) -> Result<Vec<Row>> {
        if self.aborted {
            return Err(Error::engine(
                IN_FAILED_TRANSACTION,
                "current transaction is aborted, commands ignored until end of transaction block",
            ));
        }

        let result = match call {
            Call::ReadWithPoll {
                queue,
                vt,
                limit,
                max_poll_seconds,
                poll_interval_ms,
                filter,
            } => {
                self.read_with_poll(queue, vt, limit, max_poll_seconds, poll_interval_ms, filter)
                    .await
            }
            call => self.apply(call),
        };

        if matches!(result, Err(Error::Engine { .. })) {
            self.aborted = true;
        }
        result
    }

    async fn commit(self: Box<Self>) -> Result<()> {
        let this = *self;
        if this.aborted {
            return Err(Error::engine(
                IN_FAILED_TRANSACTION,
                "current transaction is aborted, changes rolled back",
            ));
        }
        if this.writes.is_empty() {
            return Ok(());
        }

        let mut committed = this.committed.lock();
        if let Some(name) = this
            .writes
            .iter()
            .find(|(name, write)| committed.version_of(name) != write.base)
            .map(|(name, _)| name)
        {
            debug!(queue = %name, "Concurrent update on queue");
            return Err(Error::engine(
                SERIALIZATION_FAILURE,
                "could not serialize access due to concurrent update",
            ));
        }

        committed.commits += 1;
        let version = committed.commits;
        for (name, write) in this.writes {
            match write.data {
                Some(data) => committed.state.queues.insert(name.clone(), data),
                None => committed.state.queues.remove(&name),
            };
            committed.versions.insert(name, version);
        }
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> Result<()> {
        // Pending writes are simply dropped
        Ok(())
    }
}
